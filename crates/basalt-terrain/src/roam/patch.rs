mod render;
mod tessellate;
mod variance;

pub use render::BorderVertex;
pub use tessellate::{split, split_error};

use super::pool::{NodeId, TriNodePool};
use crate::camera::Camera;
use crate::config::RoamConfig;
use crate::gpu::{upload_buffer, BufferHandle, BufferUsage, GpuDevice, Primitive};
use crate::heightmap::{GroundSource, HeightRect};

use basalt_core::geometry::Aabb;
use basalt_core::glam::{IVec2, Vec3A};

/// The subset of [`RoamConfig`] a single patch needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchParams {
    pub size: i32,
    pub square_size: f32,
    pub variance_depth: u8,
    pub lod_distance_scale: f32,
    pub max_variance: f32,
    pub skirt_height: f32,
    pub shadow_split_threshold: f32,
}

impl From<&RoamConfig> for PatchParams {
    fn from(config: &RoamConfig) -> Self {
        Self {
            size: config.patch_size as i32,
            square_size: config.square_size,
            variance_depth: config.effective_variance_depth(),
            lod_distance_scale: config.lod_distance_scale,
            max_variance: config.max_variance,
            skirt_height: config.skirt_height,
            shadow_split_threshold: config.shadow_split_threshold,
        }
    }
}

/// Which sides of a patch lie on the map border.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BorderEdges(u8);

impl BorderEdges {
    pub const NONE: Self = Self(0);
    /// `x == 0`
    pub const LEFT: Self = Self(1);
    /// `x == map width`
    pub const RIGHT: Self = Self(2);
    /// `z == 0`
    pub const TOP: Self = Self(4);
    /// `z == map height`
    pub const BOTTOM: Self = Self(8);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn any(self) -> bool {
        self.0 != 0
    }

    fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// The base triangles of the four patches around one patch, used to link trees across patch borders. `None` along the
/// grid border.
///
/// `left` and `top` are the neighbors' base right triangles; `right` and `bottom` are their base left triangles.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PatchLinks {
    pub left: Option<NodeId>,
    pub top: Option<NodeId>,
    pub right: Option<NodeId>,
    pub bottom: Option<NodeId>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PatchBuffers {
    pub vertices: BufferHandle,
    pub indices: BufferHandle,
    pub border: BufferHandle,
}

impl PatchBuffers {
    fn create(device: &mut dyn GpuDevice) -> Self {
        Self {
            vertices: device.create_buffer(),
            indices: device.create_buffer(),
            border: device.create_buffer(),
        }
    }
}

/// One `size x size` square tile of the map and its pair of binary triangle trees.
///
/// ```text
/// (x, z) +-------+ (x + size, z)
///        |     / |
///        | BL /  |
///        |   / BR|
///        |  /    |
///        | /     |
/// (x, z + size) -+ (x + size, z + size)
/// ```
///
/// The base left triangle has its right angle at `(x, z)` and the base right triangle at `(x + size, z + size)`. Both
/// share the diagonal as their hypotenuse.
///
/// A patch keeps a world-space copy of its `(size + 1)^2` height samples. Index lists refer to those vertices by
/// `local_x + local_z * (size + 1)`.
pub struct Patch {
    coords: IVec2,
    params: PatchParams,
    base_left: NodeId,
    base_right: NodeId,
    border_edges: BorderEdges,

    variance_left: Vec<f32>,
    variance_right: Vec<f32>,
    min_height: f32,
    max_height: f32,

    vertices: Vec<[f32; 3]>,
    indices: Vec<u32>,
    border_vertices: Vec<BorderVertex>,

    is_dirty: bool,
    visible: bool,
    vertices_changed: bool,
    indices_changed: bool,

    buffers: Option<PatchBuffers>,
    num_indices: u32,
    num_border_vertices: u32,
}

impl Patch {
    /// Binds a patch to the tile at `coords` (in heightmap squares) and to its base triangles, then computes its
    /// variance so it is ready to tessellate.
    pub fn new(
        coords: IVec2,
        ground: &dyn GroundSource,
        (base_left, base_right): (NodeId, NodeId),
        params: PatchParams,
    ) -> Self {
        let size = params.size;
        let map = ground.dimensions();

        let mut border_edges = BorderEdges::NONE;
        if coords.x == 0 {
            border_edges.insert(BorderEdges::LEFT);
        }
        if coords.x + size == map.x {
            border_edges.insert(BorderEdges::RIGHT);
        }
        if coords.y == 0 {
            border_edges.insert(BorderEdges::TOP);
        }
        if coords.y + size == map.y {
            border_edges.insert(BorderEdges::BOTTOM);
        }

        let mut vertices = Vec::with_capacity(((size + 1) * (size + 1)) as usize);
        for z in 0..=size {
            for x in 0..=size {
                let p = coords + IVec2::new(x, z);
                vertices.push([
                    p.x as f32 * params.square_size,
                    ground.height(p.x, p.y),
                    p.y as f32 * params.square_size,
                ]);
            }
        }

        let mut patch = Self {
            coords,
            params,
            base_left,
            base_right,
            border_edges,
            variance_left: Vec::new(),
            variance_right: Vec::new(),
            min_height: 0.0,
            max_height: 0.0,
            vertices,
            indices: Vec::new(),
            border_vertices: Vec::new(),
            is_dirty: true,
            visible: false,
            vertices_changed: true,
            indices_changed: false,
            buffers: None,
            num_indices: 0,
            num_border_vertices: 0,
        };
        patch.compute_variance(ground);
        patch
    }

    /// Heightmap coordinates of the top left corner.
    pub fn coords(&self) -> IVec2 {
        self.coords
    }

    /// Coordinates in units of patches.
    pub fn square(&self) -> IVec2 {
        self.coords / self.params.size
    }

    pub fn size(&self) -> i32 {
        self.params.size
    }

    pub fn base_left(&self) -> NodeId {
        self.base_left
    }

    pub fn base_right(&self) -> NodeId {
        self.base_right
    }

    pub fn border_edges(&self) -> BorderEdges {
        self.border_edges
    }

    pub fn variance_left(&self) -> &[f32] {
        &self.variance_left
    }

    pub fn variance_right(&self) -> &[f32] {
        &self.variance_right
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Result of the last [`update_visibility`](Self::update_visibility).
    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn border_vertices(&self) -> &[BorderVertex] {
        &self.border_vertices
    }

    pub fn buffers(&self) -> Option<PatchBuffers> {
        self.buffers
    }

    /// World-space bounds over the current vertex heights.
    pub fn bounds(&self) -> Aabb {
        let s = self.params.square_size;
        let min = self.coords.as_vec2() * s;
        let max = (self.coords + IVec2::splat(self.params.size)).as_vec2() * s;
        Aabb::new(
            Vec3A::new(min.x, self.min_height, min.y),
            Vec3A::new(max.x, self.max_height, max.y),
        )
    }

    pub fn is_visible(&self, camera: &dyn Camera) -> bool {
        camera.is_box_visible(&self.bounds())
    }

    pub fn update_visibility(&mut self, camera: &dyn Camera) -> bool {
        self.visible = self.is_visible(camera);
        self.visible
    }

    /// Unlinks the base triangles from any previous tessellation and links them to each other and to the adjacent
    /// patches.
    ///
    /// Every patch of a grid must be reset, right after the pool, before any of them tessellates.
    pub fn reset(&self, pool: &TriNodePool, links: PatchLinks) {
        let left = pool.node(self.base_left);
        let right = pool.node(self.base_right);
        left.clear();
        right.clear();

        left.set_base_neighbor(Some(self.base_right));
        right.set_base_neighbor(Some(self.base_left));

        left.set_left_neighbor(links.left);
        left.set_right_neighbor(links.top);
        right.set_left_neighbor(links.right);
        right.set_right_neighbor(links.bottom);
    }

    /// Refreshes the vertex heights inside `local_rect` (patch-local, inclusive, clamped to the patch) and the bounds,
    /// and marks the patch dirty. Variance is recomputed lazily by the next update that finds this patch visible.
    pub fn update_height_map(&mut self, ground: &dyn GroundSource, local_rect: HeightRect) {
        let size = self.params.size;
        let min = local_rect.minimum.max(IVec2::ZERO);
        let max = local_rect.max().min(IVec2::splat(size));
        for z in min.y..=max.y {
            for x in min.x..=max.x {
                let p = self.coords + IVec2::new(x, z);
                self.vertices[Self::vertex_index(size, x, z) as usize][1] = ground.height(p.x, p.y);
            }
        }
        self.refresh_height_range();
        self.vertices_changed = true;
        self.is_dirty = true;
    }

    fn refresh_height_range(&mut self) {
        let (min, max) = self
            .vertices
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v[1]), hi.max(v[1])));
        self.min_height = min;
        self.max_height = max;
    }

    /// Pushes whatever changed since the last upload. Returns false if there was nothing to do.
    pub fn upload(&mut self, device: &mut dyn GpuDevice) -> bool {
        if !self.vertices_changed && !self.indices_changed {
            return false;
        }

        let buffers = *self
            .buffers
            .get_or_insert_with(|| PatchBuffers::create(device));

        if self.vertices_changed {
            upload_buffer(
                device,
                buffers.vertices,
                BufferUsage::StaticDraw,
                bytemuck::cast_slice(&self.vertices),
            );
            self.vertices_changed = false;
        }
        if self.indices_changed {
            upload_buffer(
                device,
                buffers.indices,
                BufferUsage::DynamicDraw,
                bytemuck::cast_slice(&self.indices),
            );
            upload_buffer(
                device,
                buffers.border,
                BufferUsage::DynamicDraw,
                bytemuck::cast_slice(&self.border_vertices),
            );
            self.num_indices = self.indices.len() as u32;
            self.num_border_vertices = self.border_vertices.len() as u32;
            self.indices_changed = false;
        }
        true
    }

    pub fn draw(&self, device: &mut dyn GpuDevice) {
        if let Some(buffers) = self.buffers {
            if self.num_indices > 0 {
                device.draw_indexed(
                    Primitive::Triangles,
                    buffers.vertices,
                    buffers.indices,
                    self.num_indices,
                );
            }
        }
    }

    pub fn draw_border(&self, device: &mut dyn GpuDevice) {
        if let Some(buffers) = self.buffers {
            if self.num_border_vertices > 0 {
                device.draw_arrays(Primitive::Triangles, buffers.border, 0, self.num_border_vertices);
            }
        }
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(buffers) = self.buffers.take() {
            device.delete_buffer(buffers.vertices);
            device.delete_buffer(buffers.indices);
            device.delete_buffer(buffers.border);
        }
    }

    #[inline]
    fn vertex_index(size: i32, x: i32, z: i32) -> u32 {
        (x + z * (size + 1)) as u32
    }

    /// Corners `[left, right, apex]` of the base left triangle, patch-local.
    fn base_left_corners(&self) -> [IVec2; 3] {
        let s = self.params.size;
        [IVec2::new(0, s), IVec2::new(s, 0), IVec2::new(0, 0)]
    }

    /// Corners `[left, right, apex]` of the base right triangle, patch-local.
    fn base_right_corners(&self) -> [IVec2; 3] {
        let s = self.params.size;
        [IVec2::new(s, 0), IVec2::new(0, s), IVec2::new(s, s)]
    }
}
