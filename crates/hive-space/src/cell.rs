//! Integer cell coordinates and inclusive cell ranges.

use std::fmt;

/// Integer coordinate of a grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    /// Index along X.
    pub i: i32,
    /// Index along Y.
    pub j: i32,
    /// Index along Z.
    pub k: i32,
}

impl CellCoord {
    /// Create a new cell coordinate.
    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    /// Component-wise minimum.
    pub fn min(self, other: Self) -> Self {
        Self::new(
            self.i.min(other.i),
            self.j.min(other.j),
            self.k.min(other.k),
        )
    }

    /// Component-wise maximum.
    pub fn max(self, other: Self) -> Self {
        Self::new(
            self.i.max(other.i),
            self.j.max(other.j),
            self.k.max(other.k),
        )
    }

    /// The cell displaced by `(di, dj, dk)`, saturating at the `i32` limits.
    pub fn offset(self, di: i32, dj: i32, dk: i32) -> Self {
        Self::new(
            self.i.saturating_add(di),
            self.j.saturating_add(dj),
            self.k.saturating_add(dk),
        )
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.i, self.j, self.k)
    }
}

impl From<(i32, i32, i32)> for CellCoord {
    fn from((i, j, k): (i32, i32, i32)) -> Self {
        Self::new(i, j, k)
    }
}

/// An inclusive block of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// Lowest corner, inclusive.
    pub min: CellCoord,
    /// Highest corner, inclusive.
    pub max: CellCoord,
}

impl CellRange {
    /// Create a range spanning two corners given in any order.
    pub fn new(a: CellCoord, b: CellCoord) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// A range covering exactly one cell.
    pub fn single(cell: CellCoord) -> Self {
        Self {
            min: cell,
            max: cell,
        }
    }

    /// Whether `cell` lies inside the range.
    pub fn contains(&self, cell: CellCoord) -> bool {
        (self.min.i..=self.max.i).contains(&cell.i)
            && (self.min.j..=self.max.j).contains(&cell.j)
            && (self.min.k..=self.max.k).contains(&cell.k)
    }

    /// Number of cells in the range, saturating at `u64::MAX`.
    pub fn cell_count(&self) -> u64 {
        let span = |lo: i32, hi: i32| (i64::from(hi) - i64::from(lo) + 1) as u64;
        span(self.min.i, self.max.i)
            .saturating_mul(span(self.min.j, self.max.j))
            .saturating_mul(span(self.min.k, self.max.k))
    }

    /// Iterate every cell in the range, `k` varying fastest.
    pub fn iter(&self) -> impl Iterator<Item = CellCoord> {
        let CellRange { min, max } = *self;
        (min.i..=max.i).flat_map(move |i| {
            (min.j..=max.j).flat_map(move |j| (min.k..=max.k).map(move |k| CellCoord::new(i, j, k)))
        })
    }
}

impl From<CellCoord> for CellRange {
    fn from(cell: CellCoord) -> Self {
        Self::single(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(i: i32, j: i32, k: i32) -> CellCoord {
        CellCoord::new(i, j, k)
    }

    #[test]
    fn range_normalises_corners() {
        let r = CellRange::new(c(2, -1, 0), c(-2, 1, 0));
        assert_eq!(r.min, c(-2, -1, 0));
        assert_eq!(r.max, c(2, 1, 0));
        assert_eq!(r.cell_count(), 5 * 3);
    }

    #[test]
    fn range_iter_visits_every_cell_once() {
        let r = CellRange::new(c(0, 0, 0), c(1, 2, 1));
        let cells: Vec<_> = r.iter().collect();
        assert_eq!(cells.len() as u64, r.cell_count());
        assert_eq!(cells.first(), Some(&c(0, 0, 0)));
        assert_eq!(cells.last(), Some(&c(1, 2, 1)));
        assert!(cells.iter().all(|&cell| r.contains(cell)));
    }

    #[test]
    fn offset_saturates() {
        assert_eq!(c(i32::MAX, 0, 0).offset(1, 0, 0).i, i32::MAX);
        assert_eq!(c(0, 0, 0).offset(-1, 2, 0), c(-1, 2, 0));
    }
}
