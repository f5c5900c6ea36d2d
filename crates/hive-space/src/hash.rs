//! The per-tick spatial hash grid.
//!
//! ```text
//!   world position ──floor(p / cell_size)──► CellCoord (i, j, k)
//!                                                │
//!                       73856093·i ^ 19349663·j ^ 83492791·k  mod  buckets
//!                                                │
//!                                                ▼
//!   buckets: [ Bucket { stamp, [(cell, item), ...] } ; N ]
//! ```
//!
//! Several cells may share a bucket, so every entry remembers its exact
//! cell and lookups filter on it. Clearing the grid only bumps the grid
//! stamp; a bucket whose stamp is stale is treated as empty and is reset
//! the next time something is inserted into it. This keeps `clear()`
//! O(1) regardless of bucket count, which matters because every grid is
//! cleared once per tick.

use std::fmt;

use hive_core::Aabb;
use nalgebra::Vector3;
use smallvec::SmallVec;

use crate::cell::{CellCoord, CellRange};
use crate::error::SpaceError;

/// Bucket count used by [`SpaceHash::new`].
///
/// Prime, so that the coordinate hash spreads well for typical arena sizes.
pub const DEFAULT_BUCKET_COUNT: usize = 10_007;

/// Relative distance from a cell boundary below which a position counts
/// as lying on it.
///
/// `p / c` carries a few ulps of rounding error, and so does `p - c`.
/// Without snapping, `0.3 / 0.1` lands in cell 2 while `0.4 / 0.1` lands
/// in cell 4, and shifting a position by one cell size can move it by
/// two cells.
const BOUNDARY_SNAP: f64 = 1e-9;

#[derive(Clone)]
struct Bucket<T> {
    stamp: u64,
    entries: SmallVec<[(CellCoord, T); 4]>,
}

impl<T> Default for Bucket<T> {
    fn default() -> Self {
        Self {
            stamp: 0,
            entries: SmallVec::new(),
        }
    }
}

/// A uniform-cell 3D bucketing grid.
///
/// Items are non-owning references (entity keys, indices, small copies);
/// the grid never owns the entities it indexes. The same item may be
/// inserted into the same cell more than once and will then be visited
/// once per insertion.
#[derive(Clone)]
pub struct SpaceHash<T> {
    cell_size: Vector3<f64>,
    buckets: Vec<Bucket<T>>,
    stamp: u64,
    len: usize,
}

fn validate_cell_size(size: &Vector3<f64>) -> Result<(), SpaceError> {
    if size.iter().all(|v| v.is_finite() && *v > 0.0) {
        Ok(())
    } else {
        Err(SpaceError::InvalidCellSize {
            x: size.x,
            y: size.y,
            z: size.z,
        })
    }
}

impl<T> SpaceHash<T> {
    /// Create a grid with the given per-axis cell size and
    /// [`DEFAULT_BUCKET_COUNT`] buckets.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::InvalidCellSize`] if any dimension is
    /// non-positive or not finite.
    pub fn new(cell_size: Vector3<f64>) -> Result<Self, SpaceError> {
        Self::with_buckets(cell_size, DEFAULT_BUCKET_COUNT)
    }

    /// Create a grid with an explicit bucket count.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::InvalidCellSize`] for a bad cell size and
    /// [`SpaceError::InvalidBucketCount`] when `buckets` is zero.
    pub fn with_buckets(cell_size: Vector3<f64>, buckets: usize) -> Result<Self, SpaceError> {
        validate_cell_size(&cell_size)?;
        if buckets == 0 {
            return Err(SpaceError::InvalidBucketCount);
        }
        let mut table = Vec::with_capacity(buckets);
        table.resize_with(buckets, Bucket::default);
        Ok(Self {
            cell_size,
            buckets: table,
            stamp: 1,
            len: 0,
        })
    }

    /// Change the cell dimensions.
    ///
    /// Only allowed while the grid is empty (after construction or a
    /// [`clear`](Self::clear)).
    ///
    /// # Errors
    ///
    /// [`SpaceError::InvalidCellSize`] for a bad size,
    /// [`SpaceError::AlreadyPopulated`] if the grid holds entries.
    pub fn configure(&mut self, x: f64, y: f64, z: f64) -> Result<(), SpaceError> {
        let size = Vector3::new(x, y, z);
        validate_cell_size(&size)?;
        if self.len > 0 {
            return Err(SpaceError::AlreadyPopulated { len: self.len });
        }
        self.cell_size = size;
        Ok(())
    }

    /// Per-axis cell size.
    pub fn cell_size(&self) -> Vector3<f64> {
        self.cell_size
    }

    /// Number of buckets in the table.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of entries inserted since the last clear.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the grid holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Empty every bucket.
    pub fn clear(&mut self) {
        self.stamp += 1;
        self.len = 0;
    }

    /// Map a world position to the cell containing it.
    ///
    /// Uses floor division, so cells are contiguous across the origin:
    /// with unit cells, `-0.5` maps to `-1` and `0.5` maps to `0`. A
    /// position within rounding error of a cell boundary belongs to the
    /// cell starting there. Coordinates beyond the `i32` range saturate.
    pub fn space_to_cell(&self, position: &Vector3<f64>) -> CellCoord {
        CellCoord::new(
            floor_div(position.x, self.cell_size.x),
            floor_div(position.y, self.cell_size.y),
            floor_div(position.z, self.cell_size.z),
        )
    }

    /// World position of the minimum corner of `cell`.
    pub fn cell_to_space(&self, cell: CellCoord) -> Vector3<f64> {
        Vector3::new(
            f64::from(cell.i) * self.cell_size.x,
            f64::from(cell.j) * self.cell_size.y,
            f64::from(cell.k) * self.cell_size.z,
        )
    }

    /// The block of cells overlapped by a sphere's bounding box.
    pub fn cells_around(&self, center: &Vector3<f64>, radius: f64) -> CellRange {
        let r = Vector3::repeat(radius.abs());
        CellRange::new(
            self.space_to_cell(&(center - r)),
            self.space_to_cell(&(center + r)),
        )
    }

    /// The block of cells overlapped by a bounding box.
    pub fn cells_in_box(&self, aabb: &Aabb) -> CellRange {
        CellRange::new(self.space_to_cell(&aabb.min), self.space_to_cell(&aabb.max))
    }

    /// Add `item` to `cell`.
    pub fn insert(&mut self, cell: CellCoord, item: T) {
        let index = self.bucket_index(cell);
        let stamp = self.stamp;
        let bucket = &mut self.buckets[index];
        if bucket.stamp != stamp {
            bucket.entries.clear();
            bucket.stamp = stamp;
        }
        bucket.entries.push((cell, item));
        self.len += 1;
    }

    /// Visit every item stored in `cell`.
    pub fn for_each_in_cell<F>(&self, cell: CellCoord, mut visitor: F)
    where
        F: FnMut(&T),
    {
        self.visit_cell(cell, &mut visitor);
    }

    /// Visit every item stored in any cell of the inclusive range
    /// `min..=max`.
    ///
    /// Corners may be given in any order. Each stored entry is visited
    /// exactly once. When the range covers more cells than the table has
    /// buckets, the live buckets are scanned instead of the cells.
    pub fn for_each_in_cell_range<F>(&self, min: CellCoord, max: CellCoord, mut visitor: F)
    where
        F: FnMut(&T),
    {
        let range = CellRange::new(min, max);
        if range.cell_count() > self.buckets.len() as u64 {
            for bucket in self.buckets.iter().filter(|b| b.stamp == self.stamp) {
                for (cell, item) in &bucket.entries {
                    if range.contains(*cell) {
                        visitor(item);
                    }
                }
            }
        } else {
            for cell in range.iter() {
                self.visit_cell(cell, &mut visitor);
            }
        }
    }

    /// Visit every item in cells overlapped by a sphere's bounding box.
    ///
    /// This is a coarse query; callers that need exact distances filter
    /// the results themselves.
    pub fn for_each_near<F>(&self, center: &Vector3<f64>, radius: f64, visitor: F)
    where
        F: FnMut(&T),
    {
        let range = self.cells_around(center, radius);
        self.for_each_in_cell_range(range.min, range.max, visitor);
    }

    fn visit_cell<F>(&self, cell: CellCoord, visitor: &mut F)
    where
        F: FnMut(&T),
    {
        let bucket = &self.buckets[self.bucket_index(cell)];
        if bucket.stamp != self.stamp {
            return;
        }
        for (stored, item) in &bucket.entries {
            if *stored == cell {
                visitor(item);
            }
        }
    }

    fn bucket_index(&self, cell: CellCoord) -> usize {
        // Sign-extend before mixing so negative cells hash like the
        // two's-complement values they are.
        let h = (i64::from(cell.i) as u64).wrapping_mul(73_856_093)
            ^ (i64::from(cell.j) as u64).wrapping_mul(19_349_663)
            ^ (i64::from(cell.k) as u64).wrapping_mul(83_492_791);
        (h % self.buckets.len() as u64) as usize
    }
}

fn floor_div(value: f64, size: f64) -> i32 {
    let q = value / size;
    let nearest = q.round();
    if (q - nearest).abs() <= BOUNDARY_SNAP * q.abs().max(1.0) {
        nearest as i32
    } else {
        q.floor() as i32
    }
}

impl<T> fmt::Debug for SpaceHash<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceHash")
            .field("cell_size", &self.cell_size)
            .field("buckets", &self.buckets.len())
            .field("len", &self.len)
            .finish()
    }
}
