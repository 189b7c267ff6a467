use super::variance_pass::HeightVariancePass;
use crate::config::TessConfig;
use crate::gpu::{
    upload_buffer, write_buffer, BufferHandle, BufferTarget, BufferUsage, DrawArraysIndirectCommand, FeedbackHandle,
    GpuCapabilities, GpuDevice, MemoryBarrier, Primitive, ProgramHandle, TextureHandle, Uniform,
};

use basalt_core::bitset::Bitset;
use basalt_core::glam::IVec2;

/// Storage binding the tessellation evaluation stage appends triangles to.
pub const TRIANGLE_SLOT: u32 = 0;
/// Atomic counter binding for the captured vertex count.
pub const COUNTER_SLOT: u32 = 0;
pub const HEIGHT_MAP_UNIT: u32 = 0;
pub const VARIANCE_UNIT: u32 = 1;

const VERTEX_SIZE: usize = std::mem::size_of::<[f32; 3]>();
const TRIANGLE_SIZE: usize = 3 * VERTEX_SIZE;
const QUAD_PATCH: Primitive = Primitive::Patches { vertices_per_patch: 4 };

/// How tessellated triangles get from the GPU into the per-patch buffers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureBackendKind {
    /// Shader storage appends counted by an atomic counter, which doubles as the indirect draw arguments.
    Storage,
    /// Transform feedback objects.
    Feedback,
}

impl CaptureBackendKind {
    pub fn select(caps: &GpuCapabilities) -> Option<Self> {
        if caps.shader_storage_buffers && caps.atomic_counters {
            Some(Self::Storage)
        } else if caps.transform_feedback {
            Some(Self::Feedback)
        } else {
            None
        }
    }
}

enum CaptureBackend {
    Storage {
        commands: Vec<BufferHandle>,
        draw_indirect: bool,
    },
    Feedback {
        feedbacks: Vec<FeedbackHandle>,
    },
}

/// GPU objects owned by the renderer that the cache draws with.
#[derive(Clone, Copy, Debug)]
pub struct TessResources {
    /// Template quads in, tessellated triangles captured out.
    pub tessellation_program: ProgramHandle,
    /// Compute program building one level of the height variance pyramid.
    pub variance_program: ProgramHandle,
    /// Heightmap samples as an `R32Float` texture.
    pub height_texture: TextureHandle,
}

/// Per-patch captures of hardware-tessellated terrain.
///
/// Tessellation requests only set flags. [`update`](Self::update) re-runs the tessellator for the flagged patches (or all
/// of them if the camera moved) and [`draw_mesh`](Self::draw_mesh) replays a patch's last capture.
pub struct TessMeshCache {
    num_patches: IVec2,
    template: BufferHandle,
    template_vertices: u32,
    triangles: Vec<BufferHandle>,
    backend: CaptureBackend,
    variance: HeightVariancePass,
    resources: TessResources,
    dirty: Bitset,
    camera_moved: bool,
    heights_changed: bool,
    screen_dims: Option<[i32; 2]>,
}

impl TessMeshCache {
    pub fn new(
        device: &mut dyn GpuDevice,
        num_patches: IVec2,
        config: &TessConfig,
        resources: TessResources,
        backend: CaptureBackendKind,
    ) -> Self {
        let template_vertices = template_quads(config);
        let template = device.create_buffer();
        upload_buffer(
            device,
            template,
            BufferUsage::StaticDraw,
            bytemuck::cast_slice(&template_vertices),
        );

        let total = (num_patches.x * num_patches.y) as usize;
        let capture_size = config.max_triangles_per_patch() as usize * TRIANGLE_SIZE;
        let triangles: Vec<BufferHandle> = (0..total)
            .map(|_| {
                let buffer = device.create_buffer();
                device.allocate_buffer(buffer, capture_size, BufferUsage::DynamicCopy);
                buffer
            })
            .collect();

        let caps = device.capabilities();
        let backend = match backend {
            CaptureBackendKind::Storage => CaptureBackend::Storage {
                commands: (0..total)
                    .map(|_| {
                        let buffer = device.create_buffer();
                        upload_buffer(
                            device,
                            buffer,
                            BufferUsage::DynamicDraw,
                            bytemuck::bytes_of(&DrawArraysIndirectCommand::EMPTY),
                        );
                        buffer
                    })
                    .collect(),
                draw_indirect: caps.draw_indirect,
            },
            CaptureBackendKind::Feedback => CaptureBackend::Feedback {
                feedbacks: triangles.iter().map(|&t| device.create_feedback(t)).collect(),
            },
        };

        let map_dims = num_patches * config.patch_size as i32;
        let variance = HeightVariancePass::new(
            device,
            resources.variance_program,
            map_dims,
            config.tess_level,
            config.variance_local_size,
        );

        device.use_program(resources.tessellation_program);
        device.set_uniform("mapDims", Uniform::IVec2([map_dims.x, map_dims.y]));
        device.set_uniform("heightMap", Uniform::Int(HEIGHT_MAP_UNIT as i32));
        device.set_uniform("varianceMap", Uniform::Int(VARIANCE_UNIT as i32));
        device.set_uniform("maxTessValue", Uniform::Float(config.max_tess_value));
        device.release_program();

        log::info!(
            "Built tessellation cache: {}x{} patches, {} template corners, {} KiB of capture storage per patch, {:?} backend",
            num_patches.x,
            num_patches.y,
            template_vertices.len(),
            capture_size / 1024,
            backend_kind(&backend),
        );

        Self {
            num_patches,
            template,
            template_vertices: template_vertices.len() as u32,
            triangles,
            backend,
            variance,
            resources,
            dirty: Bitset::all_set(total),
            camera_moved: false,
            heights_changed: true,
            screen_dims: None,
        }
    }

    pub fn num_patches(&self) -> IVec2 {
        self.num_patches
    }

    pub fn backend_kind(&self) -> CaptureBackendKind {
        backend_kind(&self.backend)
    }

    pub fn variance_pass(&self) -> &HeightVariancePass {
        &self.variance
    }

    #[inline]
    fn patch_index(&self, x: i32, z: i32) -> usize {
        (z * self.num_patches.x + x) as usize
    }

    pub fn request_tessellation(&mut self) {
        self.dirty.set_all();
    }

    pub fn request_patch_tessellation(&mut self, x: i32, z: i32) {
        let i = self.patch_index(x, z);
        self.dirty.set_bit(i);
    }

    /// The height texture changed; rebuild the variance pyramid before the next capture.
    pub fn request_variance_rebuild(&mut self) {
        self.heights_changed = true;
    }

    /// Every patch is recaptured on the next update.
    pub fn set_camera_moved(&mut self) {
        self.camera_moved = true;
    }

    pub fn set_screen_dims(&mut self, width: u32, height: u32) {
        self.screen_dims = Some([width as i32, height as i32]);
    }

    pub fn is_dirty(&self, x: i32, z: i32) -> bool {
        self.dirty.bit_is_set(self.patch_index(x, z))
    }

    pub fn triangle_buffer(&self, x: i32, z: i32) -> BufferHandle {
        self.triangles[self.patch_index(x, z)]
    }

    /// Recaptures every stale patch. Returns the number of patches captured.
    pub fn update(&mut self, device: &mut dyn GpuDevice) -> usize {
        if !self.camera_moved && !self.dirty.any() {
            return 0;
        }

        if self.heights_changed {
            self.variance.run(device, self.resources.height_texture);
            self.heights_changed = false;
        }

        device.use_program(self.resources.tessellation_program);
        device.bind_texture(HEIGHT_MAP_UNIT, self.resources.height_texture);
        device.bind_texture(VARIANCE_UNIT, self.variance.texture());
        if let Some(dims) = self.screen_dims.take() {
            device.set_uniform("screenDims", Uniform::IVec2(dims));
        }
        device.set_rasterizer_discard(true);

        let mut captured = 0;
        for z in 0..self.num_patches.y {
            for x in 0..self.num_patches.x {
                let i = self.patch_index(x, z);
                if !self.camera_moved && !self.dirty.bit_is_set(i) {
                    continue;
                }
                device.set_uniform("texSquare", Uniform::IVec2([x, z]));
                self.capture(device, i);
                captured += 1;
            }
        }

        device.set_rasterizer_discard(false);
        device.release_program();

        self.dirty.unset_all();
        self.camera_moved = false;
        log::trace!("Captured {} tessellated patches", captured);

        captured
    }

    fn capture(&self, device: &mut dyn GpuDevice, i: usize) {
        let triangles = self.triangles[i];
        match &self.backend {
            CaptureBackend::Storage { commands, .. } => {
                write_buffer(
                    device,
                    commands[i],
                    0,
                    bytemuck::bytes_of(&DrawArraysIndirectCommand::EMPTY),
                );
                device.bind_buffer(triangles, BufferTarget::Storage(TRIANGLE_SLOT));
                device.bind_buffer(commands[i], BufferTarget::AtomicCounter(COUNTER_SLOT));
                device.draw_arrays(QUAD_PATCH, self.template, 0, self.template_vertices);
                device.unbind_buffer(BufferTarget::Storage(TRIANGLE_SLOT));
                device.unbind_buffer(BufferTarget::AtomicCounter(COUNTER_SLOT));
                device.memory_barrier(&[MemoryBarrier::ShaderStorage, MemoryBarrier::Command]);
            }
            CaptureBackend::Feedback { feedbacks } => {
                device.begin_feedback(feedbacks[i]);
                device.draw_arrays(QUAD_PATCH, self.template, 0, self.template_vertices);
                device.end_feedback();
            }
        }
    }

    /// Draws the last capture of patch `(x, z)`.
    pub fn draw_mesh(&self, device: &mut dyn GpuDevice, x: i32, z: i32) {
        let i = self.patch_index(x, z);
        let triangles = self.triangles[i];
        match &self.backend {
            CaptureBackend::Storage {
                commands,
                draw_indirect: true,
            } => {
                device.bind_buffer(commands[i], BufferTarget::DrawIndirect);
                device.draw_arrays_indirect(Primitive::Triangles, triangles);
                device.unbind_buffer(BufferTarget::DrawIndirect);
            }
            CaptureBackend::Storage {
                commands,
                draw_indirect: false,
            } => {
                // Stalls until the capture is done.
                let mut count = [0; 4];
                device.read_buffer(commands[i], 0, &mut count);
                device.draw_arrays(Primitive::Triangles, triangles, 0, u32::from_ne_bytes(count));
            }
            CaptureBackend::Feedback { feedbacks } => {
                device.draw_feedback(Primitive::Triangles, feedbacks[i]);
            }
        }
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        match &self.backend {
            CaptureBackend::Storage { commands, .. } => {
                for &buffer in commands {
                    device.delete_buffer(buffer);
                }
            }
            CaptureBackend::Feedback { feedbacks } => {
                for &feedback in feedbacks {
                    device.delete_feedback(feedback);
                }
            }
        }
        for &buffer in &self.triangles {
            device.delete_buffer(buffer);
        }
        device.delete_buffer(self.template);
        self.variance.release(device);
    }
}

fn backend_kind(backend: &CaptureBackend) -> CaptureBackendKind {
    match backend {
        CaptureBackend::Storage { .. } => CaptureBackendKind::Storage,
        CaptureBackend::Feedback { .. } => CaptureBackendKind::Feedback,
    }
}

/// Corners of the template quads in patch-local world units, counter-clockwise seen from above.
fn template_quads(config: &TessConfig) -> Vec<[f32; 3]> {
    let quads = config.quads_per_side() as i32;
    let step = config.square_size * config.tess_level as f32;
    let corner = |i: i32, j: i32| [i as f32 * step, 0.0, j as f32 * step];

    let mut corners = Vec::with_capacity(config.template_vertex_count() as usize);
    for j in 0..quads {
        for i in 0..quads {
            corners.extend_from_slice(&[
                corner(i, j),
                corner(i, j + 1),
                corner(i + 1, j + 1),
                corner(i + 1, j),
            ]);
        }
    }
    corners
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

    use crate::gpu::recording::{GpuCommand, RecordingDevice};
    use crate::gpu::{TextureDesc, TextureFormat};

    // 4x4 patches of 8 squares, 2x2 template quads per patch.
    fn config() -> TessConfig {
        TessConfig {
            patch_size: 8,
            tess_level: 4,
            square_size: 4.0,
            ..Default::default()
        }
    }

    fn resources(device: &mut RecordingDevice) -> TessResources {
        let height_texture = device.create_texture(TextureDesc {
            width: 33,
            height: 33,
            levels: 1,
            format: TextureFormat::R32Float,
        });
        TessResources {
            tessellation_program: ProgramHandle(1),
            variance_program: ProgramHandle(2),
            height_texture,
        }
    }

    fn cache(device: &mut RecordingDevice, backend: CaptureBackendKind) -> TessMeshCache {
        let resources = resources(device);
        TessMeshCache::new(device, IVec2::splat(4), &config(), resources, backend)
    }

    fn captures(device: &RecordingDevice) -> Vec<IVec2> {
        device
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Capture { square, .. } => Some(*square),
                _ => None,
            })
            .collect()
    }

    fn dispatches(device: &RecordingDevice) -> usize {
        device.count_commands(|c| matches!(c, GpuCommand::DispatchCompute(_)))
    }

    #[test]
    fn template_quads_cover_the_patch() {
        let corners = template_quads(&config());
        assert_eq!(corners.len(), 16);
        assert_eq!(&corners[..4], &[[0.0, 0.0, 0.0], [0.0, 0.0, 16.0], [16.0, 0.0, 16.0], [16.0, 0.0, 0.0]]);
        assert_eq!(corners[15], [32.0, 0.0, 16.0]);
        assert!(corners.iter().all(|c| c[0] <= 32.0 && c[2] <= 32.0));
    }

    #[test]
    fn backend_selection_prefers_storage() {
        assert_eq!(
            CaptureBackendKind::select(&GpuCapabilities::all()),
            Some(CaptureBackendKind::Storage)
        );
        let caps = GpuCapabilities {
            atomic_counters: false,
            ..GpuCapabilities::all()
        };
        assert_eq!(CaptureBackendKind::select(&caps), Some(CaptureBackendKind::Feedback));
        assert_eq!(CaptureBackendKind::select(&GpuCapabilities::default()), None);
    }

    #[test]
    fn first_update_captures_everything_then_early_outs() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut cache = cache(&mut device, CaptureBackendKind::Storage);
        assert_eq!(device.uniform("mapDims"), Some(Uniform::IVec2([32, 32])));
        assert_eq!(device.uniform("maxTessValue"), Some(Uniform::Float(64.0)));

        device.clear_commands();
        assert_eq!(cache.update(&mut device), 16);
        assert_eq!(captures(&device).len(), 16);
        // 32 -> 16 -> 8 squares across.
        assert_eq!(dispatches(&device), 3);
        assert_eq!(device.current_program(), None);
        assert!(device.bound_buffer(BufferTarget::Storage(TRIANGLE_SLOT)).is_none());

        device.clear_commands();
        assert_eq!(cache.update(&mut device), 0);
        assert!(device.commands().is_empty());
    }

    #[test]
    fn single_patch_request_only_touches_that_patch() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut cache = cache(&mut device, CaptureBackendKind::Storage);
        cache.update(&mut device);

        let before: Vec<Vec<u8>> = (0..4)
            .flat_map(|z| (0..4).map(move |x| (x, z)))
            .map(|(x, z)| device.buffer_contents(cache.triangle_buffer(x, z)).to_vec())
            .collect();

        cache.request_patch_tessellation(1, 2);
        assert!(cache.is_dirty(1, 2));
        device.clear_commands();
        assert_eq!(cache.update(&mut device), 1);

        assert_eq!(captures(&device), vec![IVec2::new(1, 2)]);
        assert!(!cache.is_dirty(1, 2));
        assert_eq!(dispatches(&device), 0);
        for z in 0..4 {
            for x in 0..4 {
                let i = (z * 4 + x) as usize;
                assert_eq!(device.buffer_contents(cache.triangle_buffer(x, z)), &before[i][..]);
            }
        }
        // The only buffer write resets the patch's counter.
        assert_eq!(device.count_commands(|c| matches!(c, GpuCommand::WriteBuffer { .. })), 1);
    }

    #[test]
    fn variance_is_rebuilt_only_after_height_changes() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut cache = cache(&mut device, CaptureBackendKind::Storage);
        cache.update(&mut device);

        cache.request_tessellation();
        device.clear_commands();
        cache.update(&mut device);
        assert_eq!(dispatches(&device), 0);

        cache.request_variance_rebuild();
        cache.request_patch_tessellation(0, 0);
        device.clear_commands();
        cache.update(&mut device);
        assert_eq!(dispatches(&device), 3);
    }

    #[test]
    fn camera_move_recaptures_every_patch() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut cache = cache(&mut device, CaptureBackendKind::Storage);
        cache.update(&mut device);

        cache.set_camera_moved();
        cache.set_screen_dims(800, 600);
        device.clear_commands();
        assert_eq!(cache.update(&mut device), 16);
        assert_eq!(device.uniform("screenDims"), Some(Uniform::IVec2([800, 600])));

        device.clear_commands();
        assert_eq!(cache.update(&mut device), 0);
    }

    #[test]
    fn indirect_draw_uses_captured_vertex_count() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut cache = cache(&mut device, CaptureBackendKind::Storage);
        cache.update(&mut device);

        device.clear_commands();
        cache.draw_mesh(&mut device, 1, 0);
        // Level 2 at (1, 0): 2 * 4 quads * 2^2 triangles.
        assert_eq!(
            device.commands(),
            &[GpuCommand::DrawIndirect {
                primitive: Primitive::Triangles,
                vertices: cache.triangle_buffer(1, 0),
                count: 3 * 32,
            }]
        );
    }

    #[test]
    fn read_back_substitutes_for_indirect_draw() {
        let caps = GpuCapabilities {
            draw_indirect: false,
            ..GpuCapabilities::all()
        };
        let mut device = RecordingDevice::new(caps);
        let mut cache = cache(&mut device, CaptureBackendKind::Storage);
        cache.update(&mut device);

        device.clear_commands();
        cache.draw_mesh(&mut device, 0, 0);
        assert_eq!(device.count_commands(|c| matches!(c, GpuCommand::ReadBuffer { .. })), 1);
        assert!(device.commands().contains(&GpuCommand::DrawArrays {
            primitive: Primitive::Triangles,
            vertices: cache.triangle_buffer(0, 0),
            first: 0,
            count: 3 * 8,
        }));
    }

    #[test]
    fn feedback_backend_captures_and_draws() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut cache = cache(&mut device, CaptureBackendKind::Feedback);
        assert_eq!(cache.backend_kind(), CaptureBackendKind::Feedback);
        assert_eq!(cache.update(&mut device), 16);
        assert_eq!(device.count_commands(|c| matches!(c, GpuCommand::MemoryBarrier(b) if b.contains(&MemoryBarrier::Command))), 0);

        device.clear_commands();
        cache.draw_mesh(&mut device, 2, 0);
        assert!(matches!(
            device.commands(),
            [GpuCommand::DrawFeedback { count, .. }] if *count == 3 * 2 * 4 * 9
        ));
    }

    #[test]
    fn release_frees_every_buffer() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut cache = cache(&mut device, CaptureBackendKind::Storage);
        assert_eq!(device.num_live_buffers(), 1 + 16 + 16);
        cache.release(&mut device);
        assert_eq!(device.num_live_buffers(), 0);
    }
}
