use basalt_core::allocator::Exhausted;
use basalt_core::glam::IVec2;

/// Everything that can go wrong while building a mesh drawer.
///
/// Per-frame work never fails: running out of tessellation nodes only coarsens the mesh until the next pass.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("patch size {0} is not a power of two")]
    PatchSizeNotPowerOfTwo(u32),
    #[error("tessellation level {tess_level} must be a power of two no larger than min(64, patch size {patch_size})")]
    InvalidTessLevel { tess_level: u32, patch_size: u32 },
    #[error("node pool capacity must be nonzero")]
    ZeroPoolCapacity,
    #[error("map dimensions {dims} are not a positive multiple of the patch size {patch_size}")]
    MapNotDivisible { dims: IVec2, patch_size: u32 },
    #[error("device lacks capabilities required by the tessellation drawer: {0:?}")]
    UnsupportedDevice(Vec<&'static str>),
    #[error("node pool too small for the base triangles")]
    PoolExhausted(#[from] Exhausted),
}
