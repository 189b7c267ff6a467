use crate::gpu::{GpuDevice, MemoryBarrier, ProgramHandle, TextureDesc, TextureFormat, TextureHandle, Uniform};

use basalt_core::glam::IVec2;

/// Builds a mip pyramid of local height variance that the tessellation control stage samples for its factors.
///
/// Level 0 has one texel per heightmap square. Every further level halves the resolution, down to one texel per
/// `tess_level` squares, so the coarsest level matches one template quad. Each level is one compute dispatch that reads
/// the height map (or the level below) and writes the level as an image.
pub struct HeightVariancePass {
    program: ProgramHandle,
    texture: TextureHandle,
    level_dims: Vec<IVec2>,
    local_size: [u32; 3],
}

impl HeightVariancePass {
    pub fn new(
        device: &mut dyn GpuDevice,
        program: ProgramHandle,
        map_dims: IVec2,
        tess_level: u32,
        local_size: [u32; 3],
    ) -> Self {
        let num_levels = tess_level.trailing_zeros() + 1;
        let level_dims: Vec<IVec2> = (0..num_levels)
            .map(|level| IVec2::new((map_dims.x >> level).max(1), (map_dims.y >> level).max(1)))
            .collect();

        let texture = device.create_texture(TextureDesc {
            width: level_dims[0].x as u32,
            height: level_dims[0].y as u32,
            levels: num_levels,
            format: TextureFormat::R32Float,
        });

        Self {
            program,
            texture,
            level_dims,
            local_size,
        }
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn level_dims(&self) -> &[IVec2] {
        &self.level_dims
    }

    /// Workgroups needed to cover mip `level`.
    pub fn group_counts(&self, level: usize) -> [u32; 3] {
        let dims = self.level_dims[level];
        let [lx, ly, _] = self.local_size;
        [
            (dims.x as u32 + lx - 1) / lx,
            (dims.y as u32 + ly - 1) / ly,
            1,
        ]
    }

    pub fn run(&self, device: &mut dyn GpuDevice, height_texture: TextureHandle) {
        device.use_program(self.program);
        device.bind_texture(0, height_texture);
        device.set_uniform("heightMap", Uniform::Int(0));
        device.bind_texture(1, self.texture);
        device.set_uniform("varianceMap", Uniform::Int(1));

        for (level, dims) in self.level_dims.iter().enumerate() {
            device.bind_image(0, self.texture, level as u32);
            device.set_uniform("mipLevel", Uniform::Int(level as i32));
            device.set_uniform("mipDims", Uniform::IVec2([dims.x, dims.y]));
            device.dispatch_compute(self.group_counts(level));
            // The next level reads this one.
            device.memory_barrier(&[MemoryBarrier::ShaderImageAccess, MemoryBarrier::TextureFetch]);
        }

        device.release_program();
        log::debug!("Rebuilt height variance pyramid with {} levels", self.level_dims.len());
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        device.delete_texture(self.texture);
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
