//! Core types and traits for the Hive multi-robot simulator.
//!
//! This is the leaf crate with no internal dependencies. It defines
//! the vocabulary shared by the spatial index and the engine: entity
//! keys, the tick counter, scheduler phases, poses and bounding boxes,
//! the spatial capabilities an entity may expose, and the errors raised
//! by user code.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod phase;
pub mod pose;
pub mod traits;

pub use error::{ControllerError, MediumError, PhysicsError};
pub use id::{EntityKey, TickId};
pub use nalgebra::{UnitQuaternion, Vector2, Vector3};
pub use phase::Phase;
pub use pose::{Aabb, Pose};
pub use traits::{Bounded, Positioned};
