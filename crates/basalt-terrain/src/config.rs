use crate::error::TerrainError;

use serde::{Deserialize, Serialize};

/// Parameters of the CPU (ROAM) mesh drawer. Both the normal and shadow grids are built from the same config.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RoamConfig {
    /// Side length of a patch in heightmap squares. Must be a power of two.
    pub patch_size: u32,
    /// Depth of the stored variance tree. Triangles below this depth are never split.
    pub variance_depth: u8,
    /// Number of tessellation nodes available to each grid per pass, not counting the base triangles.
    pub pool_capacity: u32,
    /// World units per heightmap square.
    pub square_size: f32,
    /// Grids with at least this many patches along both axes tessellate in parallel.
    pub min_parallel_patches: u32,
    pub lod_distance_scale: f32,
    /// Cap on the per-node variance used by the split test, so cliffs don't tessellate regardless of distance.
    pub max_variance: f32,
    /// World height of the bottom edge of the map border skirts.
    pub skirt_height: f32,
    /// Split-error cutoff of shadow passes. Player passes split triangles whose error exceeds one.
    pub shadow_split_threshold: f32,
}

impl Default for RoamConfig {
    fn default() -> Self {
        Self {
            patch_size: 128,
            variance_depth: 12,
            pool_capacity: 1 << 20,
            square_size: 8.0,
            min_parallel_patches: 4,
            lod_distance_scale: 300.0,
            max_variance: 256.0,
            skirt_height: -400.0,
            shadow_split_threshold: 2.0,
        }
    }
}

impl RoamConfig {
    pub fn validate(&self) -> Result<(), TerrainError> {
        if !self.patch_size.is_power_of_two() {
            return Err(TerrainError::PatchSizeNotPowerOfTwo(self.patch_size));
        }
        if self.pool_capacity == 0 {
            return Err(TerrainError::ZeroPoolCapacity);
        }
        Ok(())
    }

    /// `variance_depth`, clamped so that every stored node still has a whole-sample hypotenuse midpoint.
    pub fn effective_variance_depth(&self) -> u8 {
        let deepest = 2 * self.patch_size.trailing_zeros();
        (self.variance_depth as u32).min(deepest) as u8
    }
}

/// Parameters of the GPU tessellation mesh drawer.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct TessConfig {
    pub patch_size: u32,
    /// Heightmap squares per template quad edge. The hardware tessellator subdivides each quad up to this level.
    pub tess_level: u32,
    pub square_size: f32,
    /// Camera translation, in world units, that invalidates every patch.
    pub camera_move_distance: f32,
    /// The camera counts as turned when `|dot(last_dir, dir)|` falls below this.
    pub camera_turn_cosine: f32,
    /// Compute workgroup size of the height variance pass.
    pub variance_local_size: [u32; 3],
    pub max_tess_value: f32,
}

impl Default for TessConfig {
    fn default() -> Self {
        Self {
            patch_size: 128,
            tess_level: 32,
            square_size: 8.0,
            camera_move_distance: 64.0,
            camera_turn_cosine: 0.995,
            variance_local_size: [32, 32, 1],
            max_tess_value: 64.0,
        }
    }
}

impl TessConfig {
    pub fn validate(&self) -> Result<(), TerrainError> {
        if !self.patch_size.is_power_of_two() {
            return Err(TerrainError::PatchSizeNotPowerOfTwo(self.patch_size));
        }
        if !self.tess_level.is_power_of_two()
            || self.tess_level > 64
            || self.tess_level > self.patch_size
        {
            return Err(TerrainError::InvalidTessLevel {
                tess_level: self.tess_level,
                patch_size: self.patch_size,
            });
        }
        Ok(())
    }

    /// Template quads along one edge of a patch.
    pub fn quads_per_side(&self) -> u32 {
        self.patch_size / self.tess_level
    }

    /// Corners in the shared template patch list.
    pub fn template_vertex_count(&self) -> u32 {
        4 * self.quads_per_side() * self.quads_per_side()
    }

    /// Upper bound on the triangles the tessellator can emit for one patch.
    pub fn max_triangles_per_patch(&self) -> u32 {
        2 * self.patch_size * self.patch_size
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn variance_depth_is_clamped_to_splittable_levels() {
        let config = RoamConfig {
            patch_size: 8,
            variance_depth: 12,
            ..Default::default()
        };
        assert_eq!(config.effective_variance_depth(), 6);
        assert_eq!(RoamConfig::default().effective_variance_depth(), 12);
    }

    #[test]
    fn rejects_bad_sizes() {
        let roam = RoamConfig {
            patch_size: 100,
            ..Default::default()
        };
        assert!(matches!(
            roam.validate(),
            Err(TerrainError::PatchSizeNotPowerOfTwo(100))
        ));

        let tess = TessConfig {
            tess_level: 24,
            ..Default::default()
        };
        assert!(tess.validate().is_err());
        assert!(TessConfig::default().validate().is_ok());
    }

    #[test]
    fn template_size() {
        let tess = TessConfig::default();
        assert_eq!(tess.quads_per_side(), 4);
        assert_eq!(tess.template_vertex_count(), 64);
        assert_eq!(tess.max_triangles_per_patch(), 2 * 128 * 128);
    }
}
