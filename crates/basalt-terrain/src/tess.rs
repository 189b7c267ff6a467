//! GPU level of detail with hardware tessellation.
//!
//! Instead of refining binary triangle trees on the CPU, each patch is drawn once as a coarse grid of quads through the
//! tessellation stages, with rasterization disabled, and the triangles the tessellator emits are captured into a
//! per-patch buffer. Regular drawing then just replays the captured triangles. Tessellation factors come from the view
//! distance and a precomputed pyramid of local height variance, so patches are recaptured when they are explicitly
//! invalidated or when the camera moves far enough to change the factors.

mod cache;
mod drawer;
mod variance_pass;

pub use cache::*;
pub use drawer::*;
pub use variance_pass::*;
