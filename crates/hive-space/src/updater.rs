//! Per-entity-type policies that place entities into a [`SpaceHash`].
//!
//! A grid is rebuilt every tick by clearing it and running the type's
//! policy once per entity. The policy decides which cell or cells the
//! entity occupies and may decline to index it at all.

use hive_core::{Bounded, Positioned};

use crate::hash::SpaceHash;

/// Places one entity into a grid.
///
/// `item` is the non-owning reference stored in the grid (usually the
/// entity's key); `entity` is what the policy inspects to decide where
/// the item goes.
pub trait SpaceHashUpdater<E: ?Sized, T>: Send + Sync {
    /// Insert `item` into the cell(s) `entity` currently occupies, or
    /// skip it.
    fn update(&self, hash: &mut SpaceHash<T>, item: T, entity: &E);
}

impl<E: ?Sized, T, U> SpaceHashUpdater<E, T> for Box<U>
where
    U: SpaceHashUpdater<E, T> + ?Sized,
{
    fn update(&self, hash: &mut SpaceHash<T>, item: T, entity: &E) {
        (**self).update(hash, item, entity);
    }
}

/// Indexes an entity in the single cell containing its position.
#[derive(Clone, Copy, Debug, Default)]
pub struct PointUpdater;

impl<E: Positioned + ?Sized, T> SpaceHashUpdater<E, T> for PointUpdater {
    fn update(&self, hash: &mut SpaceHash<T>, item: T, entity: &E) {
        let cell = hash.space_to_cell(&entity.position());
        hash.insert(cell, item);
    }
}

/// Most cells [`ExtentUpdater`] will fill for a single entity.
pub const MAX_EXTENT_CELLS: u64 = 1 << 16;

/// Indexes an entity in every cell its bounding box overlaps.
///
/// Suited to bodies larger than a cell, so that a neighbourhood query
/// around any part of the body finds it. A box with a non-finite corner
/// is not indexed. A box covering more than [`MAX_EXTENT_CELLS`] cells
/// is indexed in the cell of its centre only.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtentUpdater;

impl<E: Bounded + ?Sized, T: Clone> SpaceHashUpdater<E, T> for ExtentUpdater {
    fn update(&self, hash: &mut SpaceHash<T>, item: T, entity: &E) {
        let aabb = entity.bounding_box();
        if !aabb.min.iter().chain(aabb.max.iter()).all(|v| v.is_finite()) {
            return;
        }
        let range = hash.cells_in_box(&aabb);
        if range.cell_count() > MAX_EXTENT_CELLS {
            let cell = hash.space_to_cell(&aabb.center());
            hash.insert(cell, item);
            return;
        }
        for cell in range.iter() {
            hash.insert(cell, item.clone());
        }
    }
}

/// Policy for types with no spatial relevance.
#[derive(Clone, Copy, Debug, Default)]
pub struct SkipUpdater;

impl<E: ?Sized, T> SpaceHashUpdater<E, T> for SkipUpdater {
    fn update(&self, _hash: &mut SpaceHash<T>, _item: T, _entity: &E) {}
}

/// Runs `inner` only for entities accepted by `predicate`.
///
/// ```
/// use hive_core::Positioned;
/// use hive_space::{Filtered, PointUpdater, SpaceHash, SpaceHashUpdater};
/// use nalgebra::Vector3;
///
/// struct Led { at: Vector3<f64>, lit: bool }
/// impl Positioned for Led {
///     fn position(&self) -> Vector3<f64> { self.at }
/// }
///
/// let policy = Filtered::new(|led: &Led| led.lit, PointUpdater);
/// let mut grid = SpaceHash::new(Vector3::new(1.0, 1.0, 1.0)).unwrap();
/// policy.update(&mut grid, 0u32, &Led { at: Vector3::zeros(), lit: false });
/// policy.update(&mut grid, 1u32, &Led { at: Vector3::zeros(), lit: true });
/// assert_eq!(grid.len(), 1);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Filtered<P, U> {
    predicate: P,
    inner: U,
}

impl<P, U> Filtered<P, U> {
    /// Wrap `inner` so that it only sees entities for which `predicate`
    /// returns `true`.
    pub fn new(predicate: P, inner: U) -> Self {
        Self { predicate, inner }
    }
}

impl<E, T, P, U> SpaceHashUpdater<E, T> for Filtered<P, U>
where
    E: ?Sized,
    P: Fn(&E) -> bool + Send + Sync,
    U: SpaceHashUpdater<E, T>,
{
    fn update(&self, hash: &mut SpaceHash<T>, item: T, entity: &E) {
        if (self.predicate)(entity) {
            self.inner.update(hash, item, entity);
        }
    }
}
