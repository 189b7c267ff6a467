use super::cache::{CaptureBackendKind, TessMeshCache, TessResources};
use crate::camera::{Camera, CameraKind};
use crate::config::TessConfig;
use crate::drawer::{DrawPass, MeshDrawer, MiniMapOverlay};
use crate::error::TerrainError;
use crate::events::{EventMask, TerrainEvent};
use crate::gpu::{GpuCapabilities, GpuDevice};
use crate::heightmap::{GroundSource, HeightRect};

use basalt_core::glam::{IVec2, Vec3A};

/// Names of the capabilities the tessellation drawer needs but `caps` lacks.
pub fn missing_capabilities(caps: &GpuCapabilities) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !caps.tessellation_shaders {
        missing.push("tessellation_shaders");
    }
    if !caps.compute_shaders {
        missing.push("compute_shaders");
    }
    if !caps.float_textures {
        missing.push("float_textures");
    }
    if CaptureBackendKind::select(caps).is_none() {
        missing.push("shader_storage_buffers + atomic_counters or transform_feedback");
    }
    missing
}

#[derive(Clone, Copy, Debug)]
struct CameraPose {
    position: Vec3A,
    direction: Vec3A,
}

/// The GPU-tessellated terrain mesh.
///
/// Every patch is recaptured whenever the player camera moves or turns past the configured thresholds, since the
/// tessellation factors depend on view distance. Height edits only recapture the patches they touch.
pub struct TessMeshDrawer {
    cache: TessMeshCache,
    config: TessConfig,
    last_pose: Option<CameraPose>,
}

impl TessMeshDrawer {
    pub fn supported(caps: &GpuCapabilities) -> bool {
        missing_capabilities(caps).is_empty()
    }

    pub fn new(
        ground: &dyn GroundSource,
        device: &mut dyn GpuDevice,
        config: &TessConfig,
        resources: TessResources,
    ) -> Result<Self, TerrainError> {
        config.validate()?;

        let dims = ground.dimensions();
        let patch_size = config.patch_size as i32;
        if dims.x <= 0 || dims.y <= 0 || dims.x % patch_size != 0 || dims.y % patch_size != 0 {
            return Err(TerrainError::MapNotDivisible {
                dims,
                patch_size: config.patch_size,
            });
        }

        let caps = device.capabilities();
        let missing = missing_capabilities(&caps);
        let backend = match CaptureBackendKind::select(&caps) {
            Some(backend) if missing.is_empty() => backend,
            _ => return Err(TerrainError::UnsupportedDevice(missing)),
        };

        let cache = TessMeshCache::new(device, dims / patch_size, config, resources, backend);

        Ok(Self {
            cache,
            config: *config,
            last_pose: None,
        })
    }

    pub fn cache(&self) -> &TessMeshCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TessMeshCache {
        &mut self.cache
    }

    /// Records the pose of a player camera. Returns true if it moved or turned far enough to change tessellation
    /// factors since the last recorded pose.
    pub fn check_camera_moved(&mut self, camera: &dyn Camera) -> bool {
        if camera.kind() != CameraKind::Player {
            return false;
        }

        let pose = CameraPose {
            position: camera.position(),
            direction: camera.direction(),
        };
        let moved = match self.last_pose {
            None => true,
            Some(last) => {
                last.position.distance(pose.position) > self.config.camera_move_distance
                    || last.direction.dot(pose.direction).abs() < self.config.camera_turn_cosine
            }
        };
        if moved {
            self.last_pose = Some(pose);
        }

        moved
    }

    /// Returns the number of patches recaptured.
    pub fn update_cache(&mut self, camera: &dyn Camera, device: &mut dyn GpuDevice) -> usize {
        if self.check_camera_moved(camera) {
            self.cache.set_camera_moved();
        }
        self.cache.update(device)
    }

    /// Patches whose samples include any square of `rect`, as an inclusive range per axis.
    fn touched_patches(&self, rect: HeightRect) -> (IVec2, IVec2) {
        let patch_size = self.config.patch_size as i32;
        let last = self.cache.num_patches() - IVec2::ONE;
        let ceil_div = |a: i32| -((-a).div_euclid(patch_size));
        let min = rect.minimum;
        let max = rect.max();

        let first = IVec2::new(ceil_div(min.x) - 1, ceil_div(min.y) - 1).max(IVec2::ZERO);
        let end = IVec2::new(max.x.div_euclid(patch_size), max.y.div_euclid(patch_size)).min(last);
        (first, end)
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        self.cache.release(device);
    }
}

impl MeshDrawer for TessMeshDrawer {
    fn update(&mut self, _ground: &dyn GroundSource, camera: &dyn Camera, device: &mut dyn GpuDevice) {
        self.update_cache(camera, device);
    }

    fn draw_mesh(
        &mut self,
        _ground: &dyn GroundSource,
        _camera: &dyn Camera,
        device: &mut dyn GpuDevice,
        pass: DrawPass,
    ) {
        let n = self.cache.num_patches();
        for z in 0..n.y {
            for x in 0..n.x {
                if pass != DrawPass::Shadow {
                    device.bind_square_texture(IVec2::new(x, z));
                }
                self.cache.draw_mesh(device, x, z);
            }
        }
    }

    // Captured triangles reach the map edge; there is no border geometry.
    fn draw_border_mesh(&mut self, _device: &mut dyn GpuDevice, _pass: DrawPass) {}

    fn draw_in_minimap(&self) -> MiniMapOverlay {
        MiniMapOverlay::default()
    }

    fn unsynced_height_map_update(&mut self, _ground: &dyn GroundSource, rect: HeightRect) {
        let (first, end) = self.touched_patches(rect);
        for z in first.y..=end.y {
            for x in first.x..=end.x {
                self.cache.request_patch_tessellation(x, z);
            }
        }
        self.cache.request_variance_rebuild();
    }

    fn event_mask(&self) -> EventMask {
        EventMask::HEIGHT_MAP_CHANGED | EventMask::VIEW_RESIZED | EventMask::SUN_CHANGED
    }

    fn handle_event(&mut self, ground: &dyn GroundSource, event: &TerrainEvent) {
        match event {
            TerrainEvent::HeightMapChanged(rect) => self.unsynced_height_map_update(ground, *rect),
            TerrainEvent::ViewResized { width, height } => {
                self.cache.set_screen_dims(*width, *height);
                self.cache.request_tessellation();
            }
            TerrainEvent::SunChanged(_) => self.cache.request_tessellation(),
        }
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

    use crate::camera::FrustumCamera;
    use crate::gpu::recording::{GpuCommand, RecordingDevice};
    use crate::gpu::{ProgramHandle, TextureHandle, Uniform};
    use crate::heightmap::{height_rect, HeightMap};

    use basalt_core::glam::Vec3;

    fn config() -> TessConfig {
        TessConfig {
            patch_size: 8,
            tess_level: 4,
            square_size: 4.0,
            ..Default::default()
        }
    }

    fn resources() -> TessResources {
        TessResources {
            tessellation_program: ProgramHandle(1),
            variance_program: ProgramHandle(2),
            height_texture: TextureHandle(0),
        }
    }

    fn drawer(device: &mut RecordingDevice) -> TessMeshDrawer {
        let map = HeightMap::flat(IVec2::splat(32), 0.0);
        TessMeshDrawer::new(&map, device, &config(), resources()).unwrap()
    }

    fn camera(kind: CameraKind, eye: Vec3, target: Vec3) -> FrustumCamera {
        FrustumCamera::look_at(kind, eye, target, 1.0, 1.0, 1.0, 10_000.0)
    }

    fn captures(device: &RecordingDevice) -> usize {
        device.count_commands(|c| matches!(c, GpuCommand::Capture { .. }))
    }

    #[test]
    fn rejects_devices_without_tessellation() {
        let map = HeightMap::flat(IVec2::splat(32), 0.0);
        let caps = GpuCapabilities {
            tessellation_shaders: false,
            transform_feedback: false,
            atomic_counters: false,
            ..GpuCapabilities::all()
        };
        assert!(!TessMeshDrawer::supported(&caps));

        let mut device = RecordingDevice::new(caps);
        match TessMeshDrawer::new(&map, &mut device, &config(), resources()) {
            Err(TerrainError::UnsupportedDevice(missing)) => {
                assert_eq!(missing.len(), 2);
                assert_eq!(missing[0], "tessellation_shaders");
            }
            _ => panic!("expected UnsupportedDevice"),
        }
    }

    #[test]
    fn rejects_maps_that_do_not_tile() {
        let map = HeightMap::flat(IVec2::new(32, 20), 0.0);
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        assert!(matches!(
            TessMeshDrawer::new(&map, &mut device, &config(), resources()),
            Err(TerrainError::MapNotDivisible { .. })
        ));
    }

    #[test]
    fn camera_moves_past_thresholds_recapture_everything() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut drawer = drawer(&mut device);
        let eye = Vec3::new(64.0, 500.0, 64.0);
        let down = Vec3::new(0.0, -500.0, 0.0);

        assert_eq!(drawer.update_cache(&camera(CameraKind::Player, eye, eye + down), &mut device), 16);

        // Small move.
        let nudged = eye + Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(drawer.update_cache(&camera(CameraKind::Player, nudged, nudged + down), &mut device), 0);

        // The shadow camera never counts.
        let far = eye + Vec3::new(1000.0, 0.0, 0.0);
        assert_eq!(drawer.update_cache(&camera(CameraKind::Shadow, far, far + down), &mut device), 0);

        // Large move relative to the last recorded pose.
        let moved = eye + Vec3::new(100.0, 0.0, 0.0);
        assert_eq!(drawer.update_cache(&camera(CameraKind::Player, moved, moved + down), &mut device), 16);

        // Turning in place.
        let tilted = moved + Vec3::new(300.0, -500.0, 0.0);
        assert_eq!(drawer.update_cache(&camera(CameraKind::Player, moved, tilted), &mut device), 16);
    }

    #[test]
    fn height_edit_recaptures_touched_patches_only() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut drawer = drawer(&mut device);
        let map = HeightMap::flat(IVec2::splat(32), 0.0);
        let player = camera(CameraKind::Player, Vec3::new(64.0, 500.0, 64.0), Vec3::new(64.0, 0.0, 64.0));
        drawer.update(&map, &player, &mut device);

        // Inside patch (1, 1).
        drawer.unsynced_height_map_update(&map, height_rect(IVec2::new(11, 11), IVec2::new(13, 13)));
        assert!(drawer.cache().is_dirty(1, 1));
        assert!(!drawer.cache().is_dirty(2, 1));

        device.clear_commands();
        assert_eq!(drawer.update_cache(&player, &mut device), 1);
        assert_eq!(device.count_commands(|c| matches!(c, GpuCommand::DispatchCompute(_))), 3);

        // On the line shared by patches 1 and 2 in both axes.
        drawer.unsynced_height_map_update(&map, height_rect(IVec2::new(16, 16), IVec2::new(16, 16)));
        device.clear_commands();
        assert_eq!(drawer.update_cache(&player, &mut device), 4);

        // Clamped at the map corner.
        drawer.unsynced_height_map_update(&map, height_rect(IVec2::new(0, 0), IVec2::new(0, 0)));
        assert!(drawer.cache().is_dirty(0, 0));
        assert_eq!(drawer.update_cache(&player, &mut device), 1);
    }

    #[test]
    fn events_request_tessellation() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut drawer = drawer(&mut device);
        let map = HeightMap::flat(IVec2::splat(32), 0.0);
        let player = camera(CameraKind::Player, Vec3::new(64.0, 500.0, 64.0), Vec3::new(64.0, 0.0, 64.0));
        drawer.update(&map, &player, &mut device);

        let mask = drawer.event_mask();
        assert!(mask.contains(crate::events::EventKind::SunChanged));
        assert!(mask.contains(crate::events::EventKind::ViewResized));

        drawer.handle_event(&map, &TerrainEvent::SunChanged(Vec3::Y));
        assert_eq!(drawer.update_cache(&player, &mut device), 16);

        drawer.handle_event(&map, &TerrainEvent::ViewResized { width: 1280, height: 720 });
        device.clear_commands();
        assert_eq!(drawer.update_cache(&player, &mut device), 16);
        assert_eq!(device.uniform("screenDims"), Some(Uniform::IVec2([1280, 720])));
        // Heights did not change.
        assert_eq!(device.count_commands(|c| matches!(c, GpuCommand::DispatchCompute(_))), 0);
    }

    #[test]
    fn shadow_pass_skips_ground_textures() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let mut drawer = drawer(&mut device);
        let map = HeightMap::flat(IVec2::splat(32), 0.0);
        let player = camera(CameraKind::Player, Vec3::new(64.0, 500.0, 64.0), Vec3::new(64.0, 0.0, 64.0));
        drawer.update(&map, &player, &mut device);

        device.clear_commands();
        drawer.draw_mesh(&map, &player, &mut device, DrawPass::Normal);
        assert_eq!(device.count_commands(|c| matches!(c, GpuCommand::BindSquareTexture(_))), 16);
        assert_eq!(device.count_commands(|c| matches!(c, GpuCommand::DrawIndirect { .. })), 16);
        assert_eq!(captures(&device), 0);

        device.clear_commands();
        drawer.draw_mesh(&map, &player, &mut device, DrawPass::Shadow);
        drawer.draw_border_mesh(&mut device, DrawPass::Shadow);
        assert_eq!(device.count_commands(|c| matches!(c, GpuCommand::BindSquareTexture(_))), 0);
        assert_eq!(device.count_commands(|c| c.is_draw()), 16);
        assert!(drawer.draw_in_minimap().darkened.is_empty());
    }
}
