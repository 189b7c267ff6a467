//! Basalt draws heightmap terrain with a level-of-detail mesh.
//!
//! [`TerrainMesh`] picks one of the [`basalt_terrain`] drawers from a [`Config`] and the capabilities of the device, and
//! forwards the [`MeshDrawer`] calls of the ground renderer to it.

mod config;

pub use config::{Config, MeshDrawerKind};

pub use basalt_terrain;

use basalt_terrain::gpu::GpuDevice;
use basalt_terrain::{
    missing_capabilities, Camera, DrawPass, EventMask, GroundSource, HeightRect, MeshDrawer, MiniMapOverlay,
    RoamMeshDrawer, TerrainError, TerrainEvent, TessMeshDrawer, TessResources,
};

pub enum TerrainMesh {
    Roam(RoamMeshDrawer),
    Tessellated(TessMeshDrawer),
}

impl TerrainMesh {
    /// Builds the drawer `config` asks for. A tessellated mesh needs `resources` and a device that supports it;
    /// otherwise the ROAM drawer is used instead.
    pub fn new(
        config: &Config,
        ground: &dyn GroundSource,
        device: &mut dyn GpuDevice,
        resources: Option<TessResources>,
    ) -> Result<Self, TerrainError> {
        if config.drawer == MeshDrawerKind::Tessellated {
            let missing = missing_capabilities(&device.capabilities());
            match resources {
                Some(resources) if missing.is_empty() => {
                    return Ok(Self::Tessellated(TessMeshDrawer::new(
                        ground,
                        device,
                        &config.tess,
                        resources,
                    )?));
                }
                Some(_) => log::warn!("Device cannot tessellate (missing {:?}); using ROAM", missing),
                None => log::warn!("No tessellation programs provided; using ROAM"),
            }
        }

        Ok(Self::Roam(RoamMeshDrawer::new(ground, &config.roam)?))
    }

    pub fn kind(&self) -> MeshDrawerKind {
        match self {
            Self::Roam(_) => MeshDrawerKind::Roam,
            Self::Tessellated(_) => MeshDrawerKind::Tessellated,
        }
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        match self {
            Self::Roam(d) => d.release(device),
            Self::Tessellated(d) => d.release(device),
        }
    }

    fn drawer(&self) -> &dyn MeshDrawer {
        match self {
            Self::Roam(d) => d,
            Self::Tessellated(d) => d,
        }
    }

    fn drawer_mut(&mut self) -> &mut dyn MeshDrawer {
        match self {
            Self::Roam(d) => d,
            Self::Tessellated(d) => d,
        }
    }
}

impl MeshDrawer for TerrainMesh {
    fn update(&mut self, ground: &dyn GroundSource, camera: &dyn Camera, device: &mut dyn GpuDevice) {
        self.drawer_mut().update(ground, camera, device)
    }

    fn draw_mesh(
        &mut self,
        ground: &dyn GroundSource,
        camera: &dyn Camera,
        device: &mut dyn GpuDevice,
        pass: DrawPass,
    ) {
        self.drawer_mut().draw_mesh(ground, camera, device, pass)
    }

    fn draw_border_mesh(&mut self, device: &mut dyn GpuDevice, pass: DrawPass) {
        self.drawer_mut().draw_border_mesh(device, pass)
    }

    fn draw_in_minimap(&self) -> MiniMapOverlay {
        self.drawer().draw_in_minimap()
    }

    fn unsynced_height_map_update(&mut self, ground: &dyn GroundSource, rect: HeightRect) {
        self.drawer_mut().unsynced_height_map_update(ground, rect)
    }

    fn event_mask(&self) -> EventMask {
        self.drawer().event_mask()
    }

    fn handle_event(&mut self, ground: &dyn GroundSource, event: &TerrainEvent) {
        self.drawer_mut().handle_event(ground, event)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
