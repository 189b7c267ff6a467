use super::patch::{Patch, PatchLinks, PatchParams};
use super::pool::TriNodePool;
use crate::camera::Camera;
use crate::config::RoamConfig;
use crate::error::TerrainError;
use crate::gpu::GpuDevice;
use crate::heightmap::{height_rect, GroundSource, HeightRect};

use basalt_core::bitset::Bitset;
use basalt_core::glam::{IVec2, Vec3A};
use basalt_core::work_timer::WorkTimer;
use itertools::iproduct;
use rayon::prelude::*;

/// Patches closer than this many heightmap samples to an edit are also refreshed, since patches share border samples.
pub const BORDER_MARGIN: i32 = 2;

/// Number of residue classes used to run tessellation in parallel.
pub const NUM_SUB_BLOCKS: usize = 9;

/// Patches with the same `(x mod 3, z mod 3)` are never adjacent, so they can split their trees concurrently.
#[inline]
pub fn sub_block_index(x: i32, z: i32) -> usize {
    (x.rem_euclid(3) + 3 * z.rem_euclid(3)) as usize
}

/// Indices of the patches on the outer ring of an `nx * nz` grid: the corners first, then the remaining left and right
/// edge patches, then the remaining top and bottom edge patches.
pub fn border_patch_indices(nx: usize, nz: usize) -> Vec<usize> {
    let mut indices = Vec::new();
    indices.push(0);
    if nx > 1 {
        indices.push(nx - 1);
    }
    if nz > 1 {
        indices.push((nz - 1) * nx);
    }
    if nx > 1 && nz > 1 {
        indices.push(nz * nx - 1);
    }
    for z in 1..nz.saturating_sub(1) {
        indices.push(z * nx);
        if nx > 1 {
            indices.push(z * nx + nx - 1);
        }
    }
    for x in 1..nx.saturating_sub(1) {
        indices.push(x);
        if nz > 1 {
            indices.push((nz - 1) * nx + x);
        }
    }
    indices
}

/// What the last retessellation pass of a grid did.
#[derive(Clone, Debug, Default)]
pub struct TessellationStats {
    pub nodes_used: u32,
    pub node_capacity: u32,
    pub visible_patches: usize,
    pub exhausted: bool,
    pub timer: WorkTimer,
}

/// A row-major grid of [`Patch`]es sharing one [`TriNodePool`].
///
/// Each camera kind renders from its own grid, so the player and shadow meshes retessellate independently.
pub struct MeshGrid {
    num_patches: IVec2,
    patches: Vec<Patch>,
    border_patches: Vec<usize>,
    pool: TriNodePool,
    use_threads: bool,

    vis_flags: Bitset,
    force_tessellation: bool,
    last_ground_detail: Option<f32>,
    stats: TessellationStats,
}

impl MeshGrid {
    pub fn new(ground: &dyn GroundSource, config: &RoamConfig) -> Result<Self, TerrainError> {
        config.validate()?;

        let dims = ground.dimensions();
        let size = config.patch_size as i32;
        if dims.x < size || dims.y < size || dims.x % size != 0 || dims.y % size != 0 {
            return Err(TerrainError::MapNotDivisible {
                dims,
                patch_size: config.patch_size,
            });
        }

        let num_patches = dims / size;
        let count = (num_patches.x * num_patches.y) as usize;
        let pool = TriNodePool::new(count as u32, config.pool_capacity)?;
        let params = PatchParams::from(config);

        let patches = iproduct!(0..num_patches.y, 0..num_patches.x)
            .enumerate()
            .map(|(i, (z, x))| Patch::new(IVec2::new(x, z) * size, ground, pool.base_pair(i), params))
            .collect();

        let min_parallel = config.min_parallel_patches as i32;
        let use_threads = num_patches.x >= min_parallel && num_patches.y >= min_parallel;

        Ok(Self {
            num_patches,
            patches,
            border_patches: border_patch_indices(num_patches.x as usize, num_patches.y as usize),
            pool,
            use_threads,
            vis_flags: Bitset::new(count),
            force_tessellation: true,
            last_ground_detail: None,
            stats: TessellationStats::default(),
        })
    }

    pub fn num_patches(&self) -> IVec2 {
        self.num_patches
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    #[inline]
    pub fn patch_index(&self, x: i32, z: i32) -> usize {
        (z * self.num_patches.x + x) as usize
    }

    pub fn patch(&self, x: i32, z: i32) -> &Patch {
        &self.patches[self.patch_index(x, z)]
    }

    pub fn border_patches(&self) -> impl Iterator<Item = &Patch> {
        self.border_patches.iter().map(move |&i| &self.patches[i])
    }

    pub fn pool(&self) -> &TriNodePool {
        &self.pool
    }

    pub fn stats(&self) -> &TessellationStats {
        &self.stats
    }

    pub fn uses_threads(&self) -> bool {
        self.use_threads
    }

    pub fn set_use_threads(&mut self, use_threads: bool) {
        self.use_threads = use_threads;
    }

    /// Makes the next [`update`](Self::update) retessellate regardless of what changed.
    pub fn force_next_tessellation(&mut self) {
        self.force_tessellation = true;
    }

    pub fn update_visibility(&mut self, camera: &dyn Camera) {
        for patch in self.patches.iter_mut() {
            patch.update_visibility(camera);
        }
    }

    /// Retessellates the grid for `camera` if anything that affects the mesh changed. Returns true if it did.
    ///
    /// Shadow passes refine against [`RoamConfig::shadow_split_threshold`].
    pub fn update(
        &mut self,
        ground: &dyn GroundSource,
        camera: &dyn Camera,
        device: &mut dyn GpuDevice,
        is_shadow_pass: bool,
    ) -> bool {
        let mut tessel_mesh = std::mem::take(&mut self.force_tessellation);

        self.update_visibility(camera);
        for (i, patch) in self.patches.iter_mut().enumerate() {
            let visible = patch.visible();
            if visible != self.vis_flags.bit_is_set(i) {
                self.vis_flags.assign_bit(i, visible);
                tessel_mesh = true;
            }
            if visible && patch.is_dirty() {
                patch.compute_variance(ground);
                tessel_mesh = true;
            }
        }

        let ground_detail = ground.ground_detail();
        tessel_mesh |= self.last_ground_detail != Some(ground_detail);

        if !tessel_mesh {
            return false;
        }

        let viewer = camera.position();
        let mut timer = std::mem::take(&mut self.stats.timer);
        let converged = timer.time(|| {
            self.reset();
            self.tessellate(viewer, ground_detail, is_shadow_pass)
        });
        self.stats.timer = timer;

        if !converged {
            log::warn!(
                "Tessellation node pool exhausted ({} nodes); retessellating next update",
                self.pool.capacity()
            );
            self.force_tessellation = true;
        }

        self.generate_indices();
        let uploaded = self.upload(device);

        self.stats.nodes_used = self.pool.nodes_used();
        self.stats.node_capacity = self.pool.capacity();
        self.stats.visible_patches = self.vis_flags.count_ones();
        self.stats.exhausted = !converged;
        log::debug!(
            "Retessellated {} visible patches with {} / {} nodes, uploaded {}",
            self.stats.visible_patches,
            self.stats.nodes_used,
            self.stats.node_capacity,
            uploaded
        );

        self.last_ground_detail = Some(ground_detail);
        true
    }

    /// Empties the pool and relinks every patch's base triangles to their neighbors.
    pub fn reset(&mut self) {
        self.pool.reset_all();

        let n = self.num_patches;
        let base_pair = |x: i32, z: i32| self.pool.base_pair((z * n.x + x) as usize);
        for (z, x) in iproduct!(0..n.y, 0..n.x) {
            let links = PatchLinks {
                left: (x > 0).then(|| base_pair(x - 1, z).1),
                top: (z > 0).then(|| base_pair(x, z - 1).1),
                right: (x < n.x - 1).then(|| base_pair(x + 1, z).0),
                bottom: (z < n.y - 1).then(|| base_pair(x, z + 1).0),
            };
            self.patches[(z * n.x + x) as usize].reset(&self.pool, links);
        }
    }

    /// Tessellates every visible patch, with the ground detail acting as view radius. Returns false if the pool ran
    /// out, in which case the remaining patches are skipped.
    pub fn tessellate(&self, viewer: Vec3A, view_radius: f32, is_shadow_pass: bool) -> bool {
        if self.use_threads {
            self.tessellate_sub_blocks(viewer, view_radius, is_shadow_pass)
        } else {
            self.patches
                .iter()
                .filter(|p| p.visible())
                .all(|p| p.tessellate(&self.pool, viewer, view_radius, is_shadow_pass))
        }
    }

    fn tessellate_sub_blocks(&self, viewer: Vec3A, view_radius: f32, is_shadow_pass: bool) -> bool {
        let nx = self.num_patches.x as usize;
        for block in 0..NUM_SUB_BLOCKS {
            let converged = self
                .patches
                .par_iter()
                .enumerate()
                .filter(|(i, p)| p.visible() && sub_block_index((i % nx) as i32, (i / nx) as i32) == block)
                .all(|(_, p)| p.tessellate(&self.pool, viewer, view_radius, is_shadow_pass));
            if !converged {
                return false;
            }
        }
        true
    }

    pub fn generate_indices(&mut self) {
        let pool = &self.pool;
        self.patches
            .par_iter_mut()
            .filter(|p| p.visible())
            .for_each(|p| p.generate_indices(pool));
    }

    /// Uploads the visible patches. Returns how many had something to upload.
    pub fn upload(&mut self, device: &mut dyn GpuDevice) -> usize {
        let mut uploaded = 0;
        for patch in self.patches.iter_mut().filter(|p| p.visible()) {
            if patch.upload(device) {
                uploaded += 1;
            }
        }
        uploaded
    }

    /// Draws the visible patches, binding each patch's ground texture unless `textured` is false.
    pub fn draw(&self, device: &mut dyn GpuDevice, textured: bool) {
        for patch in self.patches.iter().filter(|p| p.visible()) {
            if textured {
                device.bind_square_texture(patch.square());
            }
            patch.draw(device);
        }
    }

    pub fn draw_border(&self, device: &mut dyn GpuDevice, textured: bool) {
        for patch in self.border_patches().filter(|p| p.visible()) {
            if textured {
                device.bind_square_texture(patch.square());
            }
            patch.draw_border(device);
        }
    }

    /// Forwards a height change to every patch within [`BORDER_MARGIN`] samples of `rect`.
    pub fn update_height_map(&mut self, ground: &dyn GroundSource, rect: HeightRect) {
        let size = self.patches.first().map_or(1, Patch::size);
        let min = rect.minimum - IVec2::splat(BORDER_MARGIN);
        let max = rect.max() + IVec2::splat(BORDER_MARGIN);

        let start = IVec2::new(min.x.div_euclid(size), min.y.div_euclid(size)).max(IVec2::ZERO);
        // Exclusive: ceil(max / size).
        let end = IVec2::new(
            (max.x + size - 1).div_euclid(size),
            (max.y + size - 1).div_euclid(size),
        )
        .min(self.num_patches);

        for (z, x) in iproduct!(start.y..end.y, start.x..end.x) {
            let i = self.patch_index(x, z);
            let patch = &mut self.patches[i];
            let local_min = (min - patch.coords()).max(IVec2::ZERO);
            let local_max = (max - patch.coords()).min(IVec2::splat(size));
            patch.update_height_map(ground, height_rect(local_min, local_max));
        }
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for patch in self.patches.iter_mut() {
            patch.release(device);
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
