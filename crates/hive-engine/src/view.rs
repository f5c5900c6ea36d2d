//! The per-tick frozen world snapshot.

use hive_core::{EntityKey, Pose, TickId, Vector3};
use hive_space::SpaceHash;
use indexmap::IndexMap;

/// Poses and spatial indices captured at the start of a tick.
///
/// Every controllable entity senses against the same view, so no entity
/// can observe another's mid-tick update. The view is rebuilt by the
/// registry on the coordinating thread and shared read-only with the
/// workers for the rest of the tick.
#[derive(Clone, Debug, Default)]
pub struct WorldView {
    pub(crate) tick: TickId,
    pub(crate) poses: IndexMap<EntityKey, Pose>,
    pub(crate) indices: IndexMap<String, SpaceHash<EntityKey>>,
}

impl WorldView {
    /// Tick this view was taken for.
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// Pose of a positioned entity.
    pub fn pose(&self, key: EntityKey) -> Option<&Pose> {
        self.poses.get(&key)
    }

    /// Number of positioned entities in the view.
    pub fn positioned_count(&self) -> usize {
        self.poses.len()
    }

    /// The spatial index of an entity type, if that type is indexed.
    pub fn index(&self, type_name: &str) -> Option<&SpaceHash<EntityKey>> {
        self.indices.get(type_name)
    }

    /// Visit every entity of `type_name` within `radius` of `center`.
    ///
    /// The grid narrows the candidates; the exact distance is checked
    /// against the snapshot pose. An entity indexed into several cells is
    /// reported once.
    pub fn for_each_within<F>(&self, type_name: &str, center: &Vector3<f64>, radius: f64, mut visitor: F)
    where
        F: FnMut(EntityKey, &Pose),
    {
        for key in self.within(type_name, center, radius) {
            if let Some(pose) = self.poses.get(&key) {
                visitor(key, pose);
            }
        }
    }

    /// Keys of the entities of `type_name` within `radius` of `center`,
    /// in ascending key order.
    pub fn within(&self, type_name: &str, center: &Vector3<f64>, radius: f64) -> Vec<EntityKey> {
        let Some(grid) = self.indices.get(type_name) else {
            return Vec::new();
        };
        let radius_sq = radius * radius;
        let mut found = Vec::new();
        grid.for_each_near(center, radius, |key| {
            let near = self
                .poses
                .get(key)
                .is_some_and(|pose| (pose.position - center).norm_squared() <= radius_sq);
            if near {
                found.push(*key);
            }
        });
        found.sort_unstable();
        found.dedup();
        found
    }
}
