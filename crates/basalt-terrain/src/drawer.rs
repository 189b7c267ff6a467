use crate::camera::Camera;
use crate::events::{EventMask, TerrainEvent};
use crate::gpu::GpuDevice;
use crate::heightmap::{GroundSource, HeightRect};

/// The kind of render pass a mesh is drawn for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DrawPass {
    Normal,
    Shadow,
    WaterReflection,
    WaterRefraction,
    TerrainReflection,
}

impl DrawPass {
    /// Passes that retessellate before drawing. The others reuse the normal mesh.
    pub fn retessellates(self) -> bool {
        matches!(self, Self::Normal | Self::Shadow)
    }
}

/// A rectangle on the minimap, in `[0, 1]` map-relative coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MiniMapRect {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

/// Debug geometry to draw over the minimap. Each rectangle marks a patch that is not visible.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MiniMapOverlay {
    pub darkened: Vec<MiniMapRect>,
}

/// A strategy for turning the ground into a level-of-detail mesh, owned and driven by the ground renderer.
pub trait MeshDrawer {
    /// Once per frame, before any drawing.
    fn update(&mut self, ground: &dyn GroundSource, camera: &dyn Camera, device: &mut dyn GpuDevice);

    fn draw_mesh(
        &mut self,
        ground: &dyn GroundSource,
        camera: &dyn Camera,
        device: &mut dyn GpuDevice,
        pass: DrawPass,
    );

    /// Draws the skirts hiding the gap under the map edge.
    fn draw_border_mesh(&mut self, device: &mut dyn GpuDevice, pass: DrawPass);

    fn draw_in_minimap(&self) -> MiniMapOverlay;

    /// Heights inside `rect` changed. Called from whichever thread owns the ground, never concurrently with drawing.
    fn unsynced_height_map_update(&mut self, ground: &dyn GroundSource, rect: HeightRect);

    fn event_mask(&self) -> EventMask;

    fn handle_event(&mut self, ground: &dyn GroundSource, event: &TerrainEvent);
}
