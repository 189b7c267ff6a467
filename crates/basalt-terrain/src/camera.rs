use basalt_core::geometry::{Aabb, Frustum};
use basalt_core::glam::{Mat4, Vec3, Vec3A};

/// Which mesh a camera renders into. The shadow pass tessellates its own grid.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CameraKind {
    Player,
    Shadow,
}

pub trait Camera {
    fn kind(&self) -> CameraKind;

    fn position(&self) -> Vec3A;

    /// Unit view direction.
    fn direction(&self) -> Vec3A;

    fn is_box_visible(&self, aabb: &Aabb) -> bool;
}

/// A camera culling against the frustum of a view-projection matrix.
#[derive(Clone, Copy, Debug)]
pub struct FrustumCamera {
    kind: CameraKind,
    position: Vec3A,
    direction: Vec3A,
    frustum: Frustum,
}

impl FrustumCamera {
    pub fn from_view_projection(
        kind: CameraKind,
        position: Vec3A,
        direction: Vec3A,
        view_proj: Mat4,
    ) -> Self {
        Self {
            kind,
            position,
            direction: direction.normalize(),
            frustum: Frustum::from_view_projection(view_proj),
        }
    }

    /// A perspective camera at `eye` looking at `target`.
    pub fn look_at(
        kind: CameraKind,
        eye: Vec3,
        target: Vec3,
        fov_y_radians: f32,
        aspect_ratio: f32,
        z_near: f32,
        z_far: f32,
    ) -> Self {
        let direction = (target - eye).normalize();
        // `look_at` degenerates when the up vector is parallel to the view direction.
        let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(eye, target, up);
        let proj = Mat4::perspective_rh_gl(fov_y_radians, aspect_ratio, z_near, z_far);
        Self::from_view_projection(kind, eye.into(), direction.into(), proj * view)
    }
}

impl Camera for FrustumCamera {
    fn kind(&self) -> CameraKind {
        self.kind
    }

    fn position(&self) -> Vec3A {
        self.position
    }

    fn direction(&self) -> Vec3A {
        self.direction
    }

    fn is_box_visible(&self, aabb: &Aabb) -> bool {
        self.frustum.intersects_aabb(aabb)
    }
}
