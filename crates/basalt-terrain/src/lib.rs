//! Level-of-detail meshing for heightmap terrain.
//!
//! # Drawers
//!
//! A [`MeshDrawer`] turns a [`GroundSource`] into triangles each frame. Two strategies are provided:
//!
//! - [`RoamMeshDrawer`] refines binary triangle trees on the CPU (ROAM), one [`MeshGrid`] per camera kind. Trees are
//!   rebuilt from a bump-allocated node pool whenever the camera or the heights change, optionally in parallel.
//! - [`TessMeshDrawer`] leaves refinement to the GPU's tessellation stages and caches the captured triangles per patch,
//!   recapturing only what an edit or a camera move invalidated.
//!
//! Both cut the map into square patches whose side is a power of two, measured in heightmap squares.
//!
//! # GPU Access
//!
//! Drawers never talk to a graphics API directly. They issue calls through the object-safe [`GpuDevice`] trait, which
//! [`RecordingDevice`](crate::gpu::recording::RecordingDevice) implements in host memory for headless runs and tests.
//!
//! # Invalidation
//!
//! Height edits, view resizes and light changes arrive as [`TerrainEvent`]s through an [`EventHub`]. Each drawer
//! subscribes with the [`EventMask`] of the kinds it reacts to.

mod camera;
mod config;
mod drawer;
mod error;
mod events;
mod heightmap;
mod roam;
mod tess;

pub mod gpu;

pub use camera::*;
pub use config::*;
pub use drawer::*;
pub use error::*;
pub use events::*;
pub use heightmap::*;
pub use roam::*;
pub use tess::*;

pub use basalt_core;
