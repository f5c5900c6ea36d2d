//! Error types for spatial hash configuration.

use thiserror::Error;

/// Errors arising from spatial hash construction or reconfiguration.
#[derive(Clone, Debug, PartialEq, Error)]
#[non_exhaustive]
pub enum SpaceError {
    /// A cell dimension is zero, negative, NaN or infinite.
    #[error("cell size must be finite and positive on every axis, got ({x}, {y}, {z})")]
    InvalidCellSize {
        /// Requested size along X.
        x: f64,
        /// Requested size along Y.
        y: f64,
        /// Requested size along Z.
        z: f64,
    },
    /// The bucket table would have no buckets.
    #[error("bucket count must be at least 1")]
    InvalidBucketCount,
    /// The grid was reconfigured while it still held entries.
    ///
    /// This is a logic error: cell geometry is fixed for as long as the
    /// grid is populated, otherwise existing entries would sit in cells
    /// that no longer mean anything.
    #[error("cannot reconfigure a grid holding {len} entries")]
    AlreadyPopulated {
        /// Number of entries currently stored.
        len: usize,
    },
}
