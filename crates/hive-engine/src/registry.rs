//! The entity registry: ownership, grouping and per-type spatial indices.
//!
//! ```text
//!   records ─── key ──► Record { handle, id, type, parent, children }
//!   ids     ─── type ─► id ─► key
//!   roles   ─── controllables: [key]   media: name ─► [key]
//!   indices ─── type ─► policy          view.indices: type ─► SpaceHash<key>
//! ```
//!
//! The registry is the only owner of entities. Everything else, from
//! spatial grids to engine partitions, refers to entities by
//! [`EntityKey`] or holds a clone of the shared handle.

use std::sync::Arc;

use hive_core::{EntityKey, TickId, Vector3};
use hive_space::{ExtentUpdater, Filtered, PointUpdater, SpaceError, SpaceHash, SpaceHashUpdater};
use indexmap::IndexMap;
use thiserror::Error;

use crate::entity::{handle, Entity, EntityHandle};
use crate::physics::TransferError;
use crate::view::WorldView;

// ── RegistryError ──────────────────────────────────────────────────

/// Errors from adding, removing or indexing entities.
#[derive(Clone, Debug, PartialEq, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Another entity of the same type already uses this id.
    #[error("duplicate {type_name} id '{id}'")]
    DuplicateId {
        /// Entity type.
        type_name: String,
        /// The repeated id.
        id: String,
    },
    /// The requested parent is not registered.
    #[error("parent {parent} is not registered")]
    UnknownParent {
        /// The missing parent.
        parent: EntityKey,
    },
    /// The entity is not registered.
    #[error("entity {key} is not registered")]
    UnknownEntity {
        /// The missing entity.
        key: EntityKey,
    },
    /// The type already has a spatial index.
    #[error("type '{type_name}' is already indexed")]
    AlreadyIndexed {
        /// Entity type.
        type_name: String,
    },
    /// The index geometry is invalid.
    #[error("spatial index: {0}")]
    Space(#[from] SpaceError),
    /// An embodied entity could not be given to a physics engine.
    #[error("placement: {0}")]
    Placement(#[from] TransferError),
}

// ── Index policies over dyn Entity ─────────────────────────────────

/// Policy type stored for each indexed entity type.
pub type IndexPolicy = Box<dyn SpaceHashUpdater<dyn Entity, EntityKey>>;

/// Indexes an entity at the cell of its position. Entities without a
/// position are skipped.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntityPoint;

impl SpaceHashUpdater<dyn Entity, EntityKey> for EntityPoint {
    fn update(&self, hash: &mut SpaceHash<EntityKey>, item: EntityKey, entity: &(dyn Entity + 'static)) {
        if let Some(p) = entity.as_positioned() {
            PointUpdater.update(hash, item, p);
        }
    }
}

/// Indexes an entity in every cell its bounding box overlaps, falling
/// back to its position cell when it has no volume.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntityExtent;

impl SpaceHashUpdater<dyn Entity, EntityKey> for EntityExtent {
    fn update(&self, hash: &mut SpaceHash<EntityKey>, item: EntityKey, entity: &(dyn Entity + 'static)) {
        match entity.as_bounded() {
            Some(b) => ExtentUpdater.update(hash, item, b),
            None => EntityPoint.update(hash, item, entity),
        }
    }
}

/// Predicate used by [`enabled_only`].
pub type EnabledPredicate = fn(&(dyn Entity + 'static)) -> bool;

fn entity_enabled(entity: &(dyn Entity + 'static)) -> bool {
    entity.is_enabled()
}

/// Wrap `inner` so that disabled entities are not indexed.
pub fn enabled_only<U>(inner: U) -> Filtered<EnabledPredicate, U>
where
    U: SpaceHashUpdater<dyn Entity, EntityKey>,
{
    Filtered::new(entity_enabled as EnabledPredicate, inner)
}

// ── EntityRegistry ─────────────────────────────────────────────────

struct Record {
    handle: EntityHandle,
    id: String,
    type_name: String,
    parent: Option<EntityKey>,
    children: Vec<EntityKey>,
}

/// Owns every entity and groups them by type and role.
pub struct EntityRegistry {
    next_key: u64,
    records: IndexMap<EntityKey, Record>,
    ids: IndexMap<String, IndexMap<String, EntityKey>>,
    roots: Vec<EntityKey>,
    controllables: Vec<EntityKey>,
    media: IndexMap<String, Vec<EntityKey>>,
    policies: IndexMap<String, IndexPolicy>,
    generation: u64,
    controllable_cache: Option<Arc<[(EntityKey, EntityHandle)]>>,
    view: Arc<WorldView>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            next_key: 0,
            records: IndexMap::new(),
            ids: IndexMap::new(),
            roots: Vec::new(),
            controllables: Vec::new(),
            media: IndexMap::new(),
            policies: IndexMap::new(),
            generation: 0,
            controllable_cache: None,
            view: Arc::new(WorldView::default()),
        }
    }

    // ── Membership ──────────────────────────────────────────────

    /// Register a top-level entity.
    pub fn add<E: Entity>(&mut self, entity: E) -> Result<EntityKey, RegistryError> {
        self.insert(handle(entity), None)
    }

    /// Register an entity composed into `parent`.
    pub fn add_child<E: Entity>(
        &mut self,
        parent: EntityKey,
        entity: E,
    ) -> Result<EntityKey, RegistryError> {
        self.insert(handle(entity), Some(parent))
    }

    /// Register an already-wrapped entity.
    pub fn insert(
        &mut self,
        entity: EntityHandle,
        parent: Option<EntityKey>,
    ) -> Result<EntityKey, RegistryError> {
        let (id, type_name, controllable, medium) = {
            let e = entity.lock();
            (
                e.id().to_owned(),
                e.type_name().to_owned(),
                e.as_controllable().is_some(),
                e.medium().map(str::to_owned),
            )
        };
        if let Some(p) = parent {
            if !self.records.contains_key(&p) {
                return Err(RegistryError::UnknownParent { parent: p });
            }
        }
        if self.ids.get(&type_name).is_some_and(|m| m.contains_key(&id)) {
            return Err(RegistryError::DuplicateId { type_name, id });
        }

        let key = EntityKey(self.next_key);
        self.next_key += 1;
        self.ids
            .entry(type_name.clone())
            .or_default()
            .insert(id.clone(), key);
        match parent {
            Some(p) => {
                if let Some(parent) = self.records.get_mut(&p) {
                    parent.children.push(key);
                }
            }
            None => self.roots.push(key),
        }
        if controllable {
            self.controllables.push(key);
        }
        if let Some(m) = medium {
            self.media.entry(m).or_default().push(key);
        }
        self.records.insert(
            key,
            Record {
                handle: entity,
                id,
                type_name,
                parent,
                children: Vec::new(),
            },
        );
        self.touch();
        Ok(key)
    }

    /// Remove an entity and everything composed into it.
    ///
    /// Removed entities are destroyed. Returns the removed keys and
    /// handles, descendants first, so the caller can release them from
    /// physics engines.
    pub fn remove(&mut self, key: EntityKey) -> Result<Vec<(EntityKey, EntityHandle)>, RegistryError> {
        if !self.records.contains_key(&key) {
            return Err(RegistryError::UnknownEntity { key });
        }
        let mut order = Vec::new();
        self.collect_subtree(key, &mut order);

        if let Some(parent) = self.records.get(&key).and_then(|r| r.parent) {
            if let Some(p) = self.records.get_mut(&parent) {
                p.children.retain(|c| *c != key);
            }
        } else {
            self.roots.retain(|r| *r != key);
        }

        let mut removed = Vec::with_capacity(order.len());
        for k in order {
            let Some(record) = self.records.shift_remove(&k) else {
                continue;
            };
            if let Some(ids) = self.ids.get_mut(&record.type_name) {
                ids.shift_remove(&record.id);
            }
            self.controllables.retain(|c| *c != k);
            for members in self.media.values_mut() {
                members.retain(|m| *m != k);
            }
            record.handle.lock().destroy();
            removed.push((k, record.handle));
        }
        self.touch();
        Ok(removed)
    }

    /// Enable or disable an entity and everything composed into it.
    pub fn set_enabled(&mut self, key: EntityKey, enabled: bool) -> Result<(), RegistryError> {
        if !self.records.contains_key(&key) {
            return Err(RegistryError::UnknownEntity { key });
        }
        let mut subtree = Vec::new();
        self.collect_subtree(key, &mut subtree);
        for k in subtree {
            if let Some(r) = self.records.get(&k) {
                r.handle.lock().set_enabled(enabled);
            }
        }
        Ok(())
    }

    fn collect_subtree(&self, key: EntityKey, out: &mut Vec<EntityKey>) {
        if let Some(record) = self.records.get(&key) {
            for child in &record.children {
                self.collect_subtree(*child, out);
            }
            out.push(key);
        }
    }

    fn touch(&mut self) {
        self.generation += 1;
        self.controllable_cache = None;
    }

    // ── Lookup ──────────────────────────────────────────────────

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no entity is registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Membership version. Changes whenever an entity is added or removed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Handle of a registered entity.
    pub fn get(&self, key: EntityKey) -> Option<&EntityHandle> {
        self.records.get(&key).map(|r| &r.handle)
    }

    /// Key of the entity with `id` among entities of `type_name`.
    pub fn find(&self, type_name: &str, id: &str) -> Option<EntityKey> {
        self.ids.get(type_name)?.get(id).copied()
    }

    /// Id of a registered entity.
    pub fn id_of(&self, key: EntityKey) -> Option<&str> {
        self.records.get(&key).map(|r| r.id.as_str())
    }

    /// Type name of a registered entity.
    pub fn type_of(&self, key: EntityKey) -> Option<&str> {
        self.records.get(&key).map(|r| r.type_name.as_str())
    }

    /// Parent of a registered entity.
    pub fn parent_of(&self, key: EntityKey) -> Option<EntityKey> {
        self.records.get(&key)?.parent
    }

    /// Entities composed directly into `key`.
    pub fn children(&self, key: EntityKey) -> &[EntityKey] {
        self.records
            .get(&key)
            .map_or(&[][..], |r| r.children.as_slice())
    }

    /// Top-level entities, in insertion order.
    pub fn roots(&self) -> &[EntityKey] {
        &self.roots
    }

    /// Every entity, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &EntityHandle)> {
        self.records.iter().map(|(k, r)| (*k, &r.handle))
    }

    /// Keys of every entity of `type_name`, in insertion order.
    pub fn entities_of_type<'a>(&'a self, type_name: &str) -> impl Iterator<Item = EntityKey> + 'a {
        self.ids
            .get(type_name)
            .into_iter()
            .flat_map(|ids| ids.values().copied())
    }

    /// Registered type names, in first-seen order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }

    /// Keys of the controllable entities, in insertion order.
    pub fn controllables(&self) -> &[EntityKey] {
        &self.controllables
    }

    /// Keys of the entities participating in `medium`, in insertion order.
    pub fn medium_members(&self, medium: &str) -> &[EntityKey] {
        self.media.get(medium).map_or(&[][..], Vec::as_slice)
    }

    /// Embodied entities, in insertion order.
    pub fn embodied(&self) -> Vec<(EntityKey, EntityHandle)> {
        self.records
            .iter()
            .filter(|(_, r)| r.handle.lock().as_embodied().is_some())
            .map(|(k, r)| (*k, Arc::clone(&r.handle)))
            .collect()
    }

    /// Shared snapshot of the controllable entities.
    ///
    /// Rebuilt only after membership changes, so steady-state ticks reuse
    /// the same allocation.
    pub fn controllable_snapshot(&mut self) -> Arc<[(EntityKey, EntityHandle)]> {
        if let Some(cached) = &self.controllable_cache {
            return Arc::clone(cached);
        }
        let snapshot: Arc<[(EntityKey, EntityHandle)]> = self
            .controllables
            .iter()
            .filter_map(|k| self.records.get(k).map(|r| (*k, Arc::clone(&r.handle))))
            .collect();
        self.controllable_cache = Some(Arc::clone(&snapshot));
        snapshot
    }

    // ── Spatial indices ─────────────────────────────────────────

    /// Give `type_name` its own spatial grid, rebuilt each tick with
    /// `policy`.
    pub fn index_type<P>(
        &mut self,
        type_name: impl Into<String>,
        cell_size: Vector3<f64>,
        policy: P,
    ) -> Result<(), RegistryError>
    where
        P: SpaceHashUpdater<dyn Entity, EntityKey> + 'static,
    {
        let type_name = type_name.into();
        if self.policies.contains_key(&type_name) {
            return Err(RegistryError::AlreadyIndexed { type_name });
        }
        let grid = SpaceHash::new(cell_size)?;
        Arc::make_mut(&mut self.view)
            .indices
            .insert(type_name.clone(), grid);
        self.policies.insert(type_name, Box::new(policy));
        Ok(())
    }

    /// Whether `type_name` has a spatial grid.
    pub fn is_indexed(&self, type_name: &str) -> bool {
        self.policies.contains_key(type_name)
    }

    /// Rebuild the world view for `tick`: snapshot every pose, then clear
    /// and repopulate every indexed grid.
    pub fn refresh_view(&mut self, tick: TickId) {
        let view = Arc::make_mut(&mut self.view);
        view.tick = tick;
        view.poses.clear();
        for (key, record) in &self.records {
            let entity = record.handle.lock();
            if let Some(p) = entity.as_positioned() {
                view.poses.insert(*key, p.pose());
            }
        }
        for (type_name, policy) in &self.policies {
            let Some(grid) = view.indices.get_mut(type_name) else {
                continue;
            };
            grid.clear();
            let Some(ids) = self.ids.get(type_name) else {
                continue;
            };
            for key in ids.values() {
                if let Some(record) = self.records.get(key) {
                    let entity = record.handle.lock();
                    policy.update(grid, *key, &*entity);
                }
            }
        }
    }

    /// The current world view.
    pub fn view(&self) -> Arc<WorldView> {
        Arc::clone(&self.view)
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Reset every entity.
    pub fn reset(&mut self) {
        for record in self.records.values() {
            record.handle.lock().reset();
        }
    }

    /// Destroy every entity and empty the registry.
    pub fn destroy(&mut self) {
        for record in self.records.values() {
            record.handle.lock().destroy();
        }
        self.records.clear();
        self.ids.clear();
        self.roots.clear();
        self.controllables.clear();
        self.media.clear();
        self.touch();
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entities", &self.records.len())
            .field("controllables", &self.controllables.len())
            .field("indexed_types", &self.policies.keys().collect::<Vec<_>>())
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Controllable, StepContext};
    use hive_core::{ControllerError, Positioned};

    struct Beacon {
        id: String,
        at: Vector3<f64>,
        enabled: bool,
    }

    impl Positioned for Beacon {
        fn position(&self) -> Vector3<f64> {
            self.at
        }
    }

    impl Entity for Beacon {
        fn id(&self) -> &str {
            &self.id
        }
        fn type_name(&self) -> &str {
            "beacon"
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
        fn medium(&self) -> Option<&str> {
            Some("light")
        }
        fn as_positioned(&self) -> Option<&dyn Positioned> {
            Some(self)
        }
    }

    struct Brain {
        id: String,
        enabled: bool,
    }

    impl Controllable for Brain {
        fn sense(&mut self, _: &StepContext<'_>) -> Result<(), ControllerError> {
            Ok(())
        }
        fn control_step(&mut self, _: &StepContext<'_>) -> Result<(), ControllerError> {
            Ok(())
        }
        fn act(&mut self, _: &StepContext<'_>) -> Result<(), ControllerError> {
            Ok(())
        }
    }

    impl Entity for Brain {
        fn id(&self) -> &str {
            &self.id
        }
        fn type_name(&self) -> &str {
            "brain"
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
        fn as_controllable(&self) -> Option<&dyn Controllable> {
            Some(self)
        }
        fn as_controllable_mut(&mut self) -> Option<&mut dyn Controllable> {
            Some(self)
        }
    }

    fn beacon(id: &str, x: f64) -> Beacon {
        Beacon {
            id: id.into(),
            at: Vector3::new(x, 0.0, 0.0),
            enabled: true,
        }
    }

    fn brain(id: &str) -> Brain {
        Brain {
            id: id.into(),
            enabled: true,
        }
    }

    #[test]
    fn ids_unique_per_type() {
        let mut r = EntityRegistry::new();
        r.add(beacon("a", 0.0)).unwrap();
        r.add(brain("a")).unwrap();
        let err = r.add(beacon("a", 1.0)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateId {
                type_name: "beacon".into(),
                id: "a".into(),
            }
        );
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn roles_are_grouped() {
        let mut r = EntityRegistry::new();
        let b = r.add(beacon("b0", 0.0)).unwrap();
        let c = r.add(brain("fb0")).unwrap();
        assert_eq!(r.controllables(), &[c]);
        assert_eq!(r.medium_members("light"), &[b]);
        assert!(r.medium_members("radio").is_empty());
        assert_eq!(r.entities_of_type("beacon").collect::<Vec<_>>(), vec![b]);
        assert_eq!(r.find("brain", "fb0"), Some(c));
    }

    #[test]
    fn removing_parent_removes_children() {
        let mut r = EntityRegistry::new();
        let robot = r.add(brain("fb0")).unwrap();
        let led = r.add_child(robot, beacon("fb0.led", 0.0)).unwrap();
        assert_eq!(r.children(robot), &[led]);
        assert_eq!(r.parent_of(led), Some(robot));
        assert_eq!(r.roots(), &[robot]);

        let removed: Vec<_> = r.remove(robot).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(removed, vec![led, robot]);
        assert!(r.is_empty());
        assert!(r.roots().is_empty());
        assert!(r.controllables().is_empty());
        assert!(r.medium_members("light").is_empty());
        assert_eq!(r.find("beacon", "fb0.led"), None);
    }

    #[test]
    fn unknown_parent_rejected() {
        let mut r = EntityRegistry::new();
        assert_eq!(
            r.add_child(EntityKey(99), beacon("x", 0.0)),
            Err(RegistryError::UnknownParent {
                parent: EntityKey(99)
            })
        );
    }

    #[test]
    fn keys_are_not_reused() {
        let mut r = EntityRegistry::new();
        let a = r.add(beacon("a", 0.0)).unwrap();
        r.remove(a).unwrap();
        let b = r.add(beacon("a", 0.0)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn generation_tracks_membership() {
        let mut r = EntityRegistry::new();
        let g0 = r.generation();
        let k = r.add(brain("a")).unwrap();
        let first = r.controllable_snapshot();
        assert!(r.generation() > g0);
        assert!(Arc::ptr_eq(&first, &r.controllable_snapshot()));

        r.remove(k).unwrap();
        assert!(r.controllable_snapshot().is_empty());
    }

    #[test]
    fn disabling_cascades_to_children() {
        let mut r = EntityRegistry::new();
        let robot = r.add(brain("fb0")).unwrap();
        let led = r.add_child(robot, beacon("fb0.led", 0.0)).unwrap();
        r.set_enabled(robot, false).unwrap();
        assert!(!r.get(led).unwrap().lock().is_enabled());
        assert!(!r.get(robot).unwrap().lock().is_enabled());
    }

    #[test]
    fn view_indexes_positions_each_refresh() {
        let mut r = EntityRegistry::new();
        r.index_type("beacon", Vector3::new(1.0, 1.0, 1.0), EntityPoint)
            .unwrap();
        let near = r.add(beacon("near", 0.4)).unwrap();
        let far = r.add(beacon("far", 5.0)).unwrap();
        r.refresh_view(TickId(3));

        let view = r.view();
        assert_eq!(view.tick(), TickId(3));
        assert_eq!(view.within("beacon", &Vector3::zeros(), 1.0), vec![near]);
        assert_eq!(view.index("beacon").unwrap().len(), 2);
        drop(view);

        r.remove(far).unwrap();
        r.refresh_view(TickId(4));
        assert_eq!(r.view().index("beacon").unwrap().len(), 1);
    }

    #[test]
    fn enabled_only_skips_disabled() {
        let mut r = EntityRegistry::new();
        r.index_type("beacon", Vector3::new(1.0, 1.0, 1.0), enabled_only(EntityPoint))
            .unwrap();
        let on = r.add(beacon("on", 0.2)).unwrap();
        let off = r.add(beacon("off", 0.3)).unwrap();
        r.set_enabled(off, false).unwrap();
        r.refresh_view(TickId(0));
        assert_eq!(r.view().within("beacon", &Vector3::zeros(), 1.0), vec![on]);
    }

    #[test]
    fn double_index_rejected() {
        let mut r = EntityRegistry::new();
        r.index_type("beacon", Vector3::new(1.0, 1.0, 1.0), EntityPoint)
            .unwrap();
        assert!(matches!(
            r.index_type("beacon", Vector3::new(1.0, 1.0, 1.0), EntityExtent),
            Err(RegistryError::AlreadyIndexed { .. })
        ));
        assert!(matches!(
            r.index_type("other", Vector3::new(0.0, 1.0, 1.0), EntityPoint),
            Err(RegistryError::Space(SpaceError::InvalidCellSize { .. }))
        ));
    }
}
