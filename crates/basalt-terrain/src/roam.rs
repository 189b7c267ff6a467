//! CPU level of detail with ROAM (Real-time Optimally Adapting Meshes).
//!
//! The map is cut into square [`Patch`]es. Each patch is covered by two right isosceles "base" triangles, and each
//! triangle can be split along the altitude to its hypotenuse into two children, forming a binary triangle tree. A
//! triangle is split when its precomputed height variance, scaled by its size and the viewer's distance, exceeds the
//! split threshold of the pass (one for the player camera, higher for shadows).
//!
//! Trees are rebuilt from scratch on every retessellation pass: the node pool is rewound in O(1), base triangles are
//! relinked to their neighbors across patch borders, and visible patches split their way down again. Neighbor links
//! cross patches, so splitting a triangle may force splits in an adjacent patch to keep the mesh free of T-junctions.
//! Parallel tessellation avoids racing on those links by only running patches that are at least two patches apart.

mod drawer;
mod grid;
mod patch;
mod pool;

pub use drawer::*;
pub use grid::*;
pub use patch::*;
pub use pool::*;
