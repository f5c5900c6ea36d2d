//! Spatial capabilities an entity may expose.
//!
//! These traits are deliberately small: the spatial hash policies only
//! need to know where something is, or how much room it takes.

use nalgebra::{UnitQuaternion, Vector3};

use crate::pose::{Aabb, Pose};

/// Something that can report where it is.
pub trait Positioned {
    /// Current world-space position.
    fn position(&self) -> Vector3<f64>;

    /// Current world-space orientation. Identity unless overridden.
    fn orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::identity()
    }

    /// Position and orientation together.
    fn pose(&self) -> Pose {
        Pose {
            position: self.position(),
            orientation: self.orientation(),
        }
    }
}

/// Something that occupies a volume.
pub trait Bounded {
    /// Current axis-aligned bounding box in world space.
    fn bounding_box(&self) -> Aabb;
}

impl<T: Positioned + ?Sized> Positioned for &T {
    fn position(&self) -> Vector3<f64> {
        (**self).position()
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        (**self).orientation()
    }
}

impl<T: Bounded + ?Sized> Bounded for &T {
    fn bounding_box(&self) -> Aabb {
        (**self).bounding_box()
    }
}

impl Positioned for Vector3<f64> {
    fn position(&self) -> Vector3<f64> {
        *self
    }
}

impl Positioned for Pose {
    fn position(&self) -> Vector3<f64> {
        self.position
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        self.orientation
    }
}

impl Bounded for Aabb {
    fn bounding_box(&self) -> Aabb {
        *self
    }
}
