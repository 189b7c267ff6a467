use super::grid::{MeshGrid, TessellationStats};
use crate::camera::{Camera, CameraKind};
use crate::config::RoamConfig;
use crate::drawer::{DrawPass, MeshDrawer, MiniMapOverlay, MiniMapRect};
use crate::error::TerrainError;
use crate::events::{EventMask, TerrainEvent};
use crate::gpu::GpuDevice;
use crate::heightmap::{GroundSource, HeightRect};

use basalt_core::glam::IVec2;

/// The CPU-tessellated terrain mesh: one [`MeshGrid`] for the player camera and another for the shadow camera.
pub struct RoamMeshDrawer {
    grids: [MeshGrid; 2],
    map_dimensions: IVec2,
}

#[inline]
fn grid_slot(kind: CameraKind) -> usize {
    match kind {
        CameraKind::Player => 0,
        CameraKind::Shadow => 1,
    }
}

impl RoamMeshDrawer {
    pub fn new(ground: &dyn GroundSource, config: &RoamConfig) -> Result<Self, TerrainError> {
        let normal = MeshGrid::new(ground, config)?;
        let shadow = MeshGrid::new(ground, config)?;
        log::info!(
            "Built ROAM mesh drawer: {} patches of {} squares, {} nodes per grid, threaded = {}",
            normal.num_patches(),
            config.patch_size,
            config.pool_capacity,
            normal.uses_threads()
        );
        Ok(Self {
            grids: [normal, shadow],
            map_dimensions: ground.dimensions(),
        })
    }

    pub fn grid(&self, kind: CameraKind) -> &MeshGrid {
        &self.grids[grid_slot(kind)]
    }

    pub fn grid_mut(&mut self, kind: CameraKind) -> &mut MeshGrid {
        &mut self.grids[grid_slot(kind)]
    }

    pub fn stats(&self, kind: CameraKind) -> &TessellationStats {
        self.grid(kind).stats()
    }

    /// Brings the grid of `camera`'s kind up to date. Returns true if it was retessellated.
    pub fn update_mesh(
        &mut self,
        ground: &dyn GroundSource,
        camera: &dyn Camera,
        device: &mut dyn GpuDevice,
    ) -> bool {
        self.update_grid(ground, camera, device, camera.kind() == CameraKind::Shadow)
    }

    fn update_grid(
        &mut self,
        ground: &dyn GroundSource,
        camera: &dyn Camera,
        device: &mut dyn GpuDevice,
        is_shadow_pass: bool,
    ) -> bool {
        let kind = if is_shadow_pass {
            CameraKind::Shadow
        } else {
            CameraKind::Player
        };
        self.grid_mut(kind).update(ground, camera, device, is_shadow_pass)
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for grid in self.grids.iter_mut() {
            grid.release(device);
        }
    }

    fn pass_grid(&self, pass: DrawPass) -> &MeshGrid {
        if pass == DrawPass::Shadow {
            self.grid(CameraKind::Shadow)
        } else {
            self.grid(CameraKind::Player)
        }
    }
}

impl MeshDrawer for RoamMeshDrawer {
    fn update(&mut self, ground: &dyn GroundSource, camera: &dyn Camera, device: &mut dyn GpuDevice) {
        self.update_mesh(ground, camera, device);
    }

    fn draw_mesh(
        &mut self,
        ground: &dyn GroundSource,
        camera: &dyn Camera,
        device: &mut dyn GpuDevice,
        pass: DrawPass,
    ) {
        if pass.retessellates() {
            self.update_grid(ground, camera, device, pass == DrawPass::Shadow);
        } else {
            // Reflection and refraction passes draw the normal mesh as seen from their own camera.
            self.grid_mut(CameraKind::Player).update_visibility(camera);
        }
        self.pass_grid(pass).draw(device, pass != DrawPass::Shadow);
    }

    fn draw_border_mesh(&mut self, device: &mut dyn GpuDevice, pass: DrawPass) {
        self.pass_grid(pass)
            .draw_border(device, pass != DrawPass::Shadow);
    }

    fn draw_in_minimap(&self) -> MiniMapOverlay {
        let map = self.map_dimensions.as_vec2();
        let darkened = self
            .grid(CameraKind::Player)
            .patches()
            .iter()
            .filter(|p| !p.visible())
            .map(|p| {
                let min = p.coords().as_vec2() / map;
                let max = (p.coords() + IVec2::splat(p.size())).as_vec2() / map;
                MiniMapRect {
                    min: min.to_array(),
                    max: max.to_array(),
                }
            })
            .collect();
        MiniMapOverlay { darkened }
    }

    fn unsynced_height_map_update(&mut self, ground: &dyn GroundSource, rect: HeightRect) {
        for grid in self.grids.iter_mut() {
            grid.update_height_map(ground, rect);
        }
    }

    fn event_mask(&self) -> EventMask {
        EventMask::HEIGHT_MAP_CHANGED
    }

    fn handle_event(&mut self, ground: &dyn GroundSource, event: &TerrainEvent) {
        if let TerrainEvent::HeightMapChanged(rect) = event {
            self.unsynced_height_map_update(ground, *rect);
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
