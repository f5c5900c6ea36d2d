//! Spatial indexing for Hive simulations.
//!
//! The central type is [`SpaceHash`], a uniform-cell 3D bucketing grid
//! that is cleared and repopulated every tick. Grids store cheap,
//! non-owning items (typically an entity key) and answer "what is in this
//! cell / this block of cells" without scanning the whole population.
//!
//! Which cells an entity lands in is decided by a [`SpaceHashUpdater`]
//! policy chosen per entity type:
//!
//! - [`PointUpdater`]: the single cell containing the entity's position
//! - [`ExtentUpdater`]: every cell overlapped by the entity's bounding box
//! - [`SkipUpdater`]: types with no spatial relevance
//! - [`Filtered`]: wraps another policy and skips entities that fail a
//!   predicate (an LED that is switched off, say)
//!
//! # Example
//!
//! ```
//! use hive_space::{CellCoord, SpaceHash};
//! use nalgebra::Vector3;
//!
//! let mut grid = SpaceHash::new(Vector3::new(1.0, 1.0, 1.0)).unwrap();
//! let cell = grid.space_to_cell(&Vector3::new(-0.5, 0.2, 3.7));
//! assert_eq!(cell, CellCoord::new(-1, 0, 3));
//!
//! grid.insert(cell, "led-0");
//! let mut found = Vec::new();
//! grid.for_each_in_cell(cell, |item| found.push(*item));
//! assert_eq!(found, vec!["led-0"]);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cell;
pub mod error;
pub mod hash;
pub mod updater;

pub use cell::{CellCoord, CellRange};
pub use error::SpaceError;
pub use hash::{SpaceHash, DEFAULT_BUCKET_COUNT};
pub use updater::{
    ExtentUpdater, Filtered, PointUpdater, SkipUpdater, SpaceHashUpdater, MAX_EXTENT_CELLS,
};
