use crate::glam::{Mat4, Vec3A, Vec4};

/// An axis-aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3A,
    pub max: Vec3A,
}

impl Aabb {
    pub fn new(min: Vec3A, max: Vec3A) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec3A {
        0.5 * (self.min + self.max)
    }

    pub fn half_extents(&self) -> Vec3A {
        0.5 * (self.max - self.min)
    }

    pub fn contains_point(&self, p: Vec3A) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}

/// The set of points `p` with `normal.dot(p) + d == 0`. Points on the side the normal faces have positive distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3A,
    pub d: f32,
}

impl Plane {
    /// Normalizes the plane equation `v.x * x + v.y * y + v.z * z + v.w = 0`.
    pub fn from_coefficients(v: Vec4) -> Self {
        let normal = Vec3A::from(v.truncate());
        let inv_len = 1.0 / normal.length();
        Self {
            normal: normal * inv_len,
            d: v.w * inv_len,
        }
    }

    #[inline]
    pub fn signed_distance(&self, p: Vec3A) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// Six inward-facing planes extracted from a view-projection matrix.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the planes of `view_proj`, assuming OpenGL clip space (`-w <= z <= w`).
    pub fn from_view_projection(view_proj: Mat4) -> Self {
        // The columns of the transpose are the rows of the matrix.
        let rows = view_proj.transpose();
        let (r0, r1, r2, r3) = (rows.x_axis, rows.y_axis, rows.z_axis, rows.w_axis);
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    pub fn contains_point(&self, p: Vec3A) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(p) >= 0.0)
    }

    /// Conservative: may report boxes that straddle two planes just outside a frustum corner as visible.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let center = aabb.center();
        let half = aabb.half_extents();
        self.planes.iter().all(|plane| {
            let radius = half.dot(plane.normal.abs());
            plane.signed_distance(center) + radius >= 0.0
        })
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
