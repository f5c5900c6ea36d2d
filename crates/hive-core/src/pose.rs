//! Position/orientation pairs and axis-aligned bounding boxes.

use nalgebra::{UnitQuaternion, Vector3};

/// Where an entity is and which way it faces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    /// World-space position in metres.
    pub position: Vector3<f64>,
    /// World-space orientation.
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    /// A pose at `position` with identity orientation.
    pub fn at(position: Vector3<f64>) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::identity(),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::at(Vector3::zeros())
    }
}

/// Axis-aligned bounding box with inclusive corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vector3<f64>,
    /// Maximum corner.
    pub max: Vector3<f64>,
}

impl Aabb {
    /// Create a box from two opposite corners, in any order.
    pub fn new(a: Vector3<f64>, b: Vector3<f64>) -> Self {
        Self {
            min: a.inf(&b),
            max: a.sup(&b),
        }
    }

    /// Create a box centred on `center` extending `half_extents` along each axis.
    pub fn around(center: Vector3<f64>, half_extents: Vector3<f64>) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Whether `point` lies inside the box, boundaries included.
    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }

    /// Centre of the box.
    pub fn center(&self) -> Vector3<f64> {
        (self.min + self.max) * 0.5
    }
}
