use super::*;

use basalt_core::SmallKeyHashMap;
use slab::Slab;

/// One call made on a [`RecordingDevice`], or a capture performed by its simulated tessellator.
#[derive(Clone, Debug, PartialEq)]
pub enum GpuCommand {
    AllocateBuffer { buffer: BufferHandle, size: usize, usage: BufferUsage },
    WriteBuffer { buffer: BufferHandle, offset: usize, len: usize },
    ReadBuffer { buffer: BufferHandle, len: usize },
    DeleteBuffer(BufferHandle),
    UseProgram(ProgramHandle),
    ReleaseProgram,
    SetUniform { name: String, value: Uniform },
    BindTexture { unit: u32, texture: TextureHandle },
    BindImage { unit: u32, texture: TextureHandle, level: u32 },
    BindSquareTexture(IVec2),
    DrawArrays { primitive: Primitive, vertices: BufferHandle, first: u32, count: u32 },
    DrawIndexed { primitive: Primitive, vertices: BufferHandle, indices: BufferHandle, count: u32 },
    DrawIndirect { primitive: Primitive, vertices: BufferHandle, count: u32 },
    DrawFeedback { primitive: Primitive, feedback: FeedbackHandle, count: u32 },
    DispatchCompute([u32; 3]),
    MemoryBarrier(Vec<MemoryBarrier>),
    /// The simulated tessellator wrote `triangles` triangles for `square` into `buffer`.
    Capture { square: IVec2, buffer: BufferHandle, triangles: u32 },
}

impl GpuCommand {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::DrawArrays { .. }
                | Self::DrawIndexed { .. }
                | Self::DrawIndirect { .. }
                | Self::DrawFeedback { .. }
        )
    }
}

struct Feedback {
    capture: BufferHandle,
    vertices: u32,
}

/// A [`GpuDevice`] that keeps every buffer in host memory and logs each call.
///
/// Drawing a patch list with rasterization discarded runs a deterministic stand-in for the hardware tessellator: it
/// emits `2 * quads * level^2` triangles, where `level` is derived from the `texSquare` uniform, and appends them to the
/// bound capture target. That is either storage slot 0 paired with the vertex counter at atomic counter slot 0, or the
/// active transform feedback object.
///
/// Uniform values are tracked in one table shared by all programs.
pub struct RecordingDevice {
    capabilities: GpuCapabilities,
    buffers: Slab<Vec<u8>>,
    textures: Slab<TextureDesc>,
    feedbacks: Slab<Feedback>,
    bindings: SmallKeyHashMap<BufferTarget, BufferHandle>,
    uniforms: SmallKeyHashMap<String, Uniform>,
    program: Option<ProgramHandle>,
    active_feedback: Option<FeedbackHandle>,
    discard: bool,
    commands: Vec<GpuCommand>,
}

impl RecordingDevice {
    pub const VERTEX_SIZE: usize = 3 * std::mem::size_of::<f32>();

    pub fn new(capabilities: GpuCapabilities) -> Self {
        Self {
            capabilities,
            buffers: Slab::new(),
            textures: Slab::new(),
            feedbacks: Slab::new(),
            bindings: SmallKeyHashMap::default(),
            uniforms: SmallKeyHashMap::default(),
            program: None,
            active_feedback: None,
            discard: false,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn count_commands(&self, f: impl Fn(&GpuCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| f(c)).count()
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> &[u8] {
        &self.buffers[buffer.0 as usize]
    }

    pub fn num_live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn bound_buffer(&self, target: BufferTarget) -> Option<BufferHandle> {
        self.bindings.get(&target).copied()
    }

    pub fn uniform(&self, name: &str) -> Option<Uniform> {
        self.uniforms.get(name).copied()
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.program
    }

    pub fn read_u32(&self, buffer: BufferHandle, offset: usize) -> u32 {
        let bytes = &self.buffers[buffer.0 as usize][offset..offset + 4];
        u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn write_u32(&mut self, buffer: BufferHandle, offset: usize, value: u32) {
        self.buffers[buffer.0 as usize][offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn simulated_triangles(square: IVec2, num_quads: u32) -> Vec<[[f32; 3]; 3]> {
        let level = 1 + (square.x + square.y).rem_euclid(3) as u32;
        let count = 2 * num_quads * level * level;
        (0..count)
            .map(|t| {
                let x = square.x as f32 + t as f32;
                let z = square.y as f32;
                [[x, 0.0, z], [x, 0.0, z + 1.0], [x + 1.0, 0.0, z]]
            })
            .collect()
    }

    fn tessellate_and_capture(&mut self, num_quads: u32) {
        let square = match self.uniforms.get("texSquare") {
            Some(Uniform::IVec2([x, z])) => IVec2::new(*x, *z),
            _ => IVec2::ZERO,
        };
        let triangles = Self::simulated_triangles(square, num_quads);
        let bytes: &[u8] = bytemuck::cast_slice(&triangles);
        let triangle_size = 3 * Self::VERTEX_SIZE;

        let storage = self.bound_buffer(BufferTarget::Storage(0));
        let counter = self.bound_buffer(BufferTarget::AtomicCounter(0));
        if let (Some(storage), Some(counter)) = (storage, counter) {
            let first_vertex = self.read_u32(counter, 0) as usize;
            let offset = first_vertex * Self::VERTEX_SIZE;
            let room = self.buffers[storage.0 as usize].len().saturating_sub(offset) / triangle_size;
            let written = room.min(triangles.len());
            self.buffers[storage.0 as usize][offset..offset + written * triangle_size]
                .copy_from_slice(&bytes[..written * triangle_size]);
            self.write_u32(counter, 0, (first_vertex + 3 * written) as u32);
            self.commands.push(GpuCommand::Capture {
                square,
                buffer: storage,
                triangles: written as u32,
            });
        } else if let Some(feedback) = self.active_feedback {
            let capture = self.feedbacks[feedback.0 as usize].capture;
            let room = self.buffers[capture.0 as usize].len() / triangle_size;
            let written = room.min(triangles.len());
            self.buffers[capture.0 as usize][..written * triangle_size]
                .copy_from_slice(&bytes[..written * triangle_size]);
            self.feedbacks[feedback.0 as usize].vertices = 3 * written as u32;
            self.commands.push(GpuCommand::Capture {
                square,
                buffer: capture,
                triangles: written as u32,
            });
        }
    }
}

impl GpuDevice for RecordingDevice {
    fn capabilities(&self) -> GpuCapabilities {
        self.capabilities
    }

    fn create_buffer(&mut self) -> BufferHandle {
        BufferHandle(self.buffers.insert(Vec::new()) as u32)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer.0 as usize);
        self.bindings.retain(|_, b| *b != buffer);
        self.commands.push(GpuCommand::DeleteBuffer(buffer));
    }

    fn allocate_buffer(&mut self, buffer: BufferHandle, size: usize, usage: BufferUsage) {
        self.buffers[buffer.0 as usize] = vec![0; size];
        self.commands
            .push(GpuCommand::AllocateBuffer { buffer, size, usage });
    }

    fn buffer_size(&self, buffer: BufferHandle) -> usize {
        self.buffers[buffer.0 as usize].len()
    }

    fn bind_buffer(&mut self, buffer: BufferHandle, target: BufferTarget) {
        self.bindings.insert(target, buffer);
    }

    fn unbind_buffer(&mut self, target: BufferTarget) {
        self.bindings.remove(&target);
    }

    fn map_buffer(&mut self, buffer: BufferHandle, offset: usize, len: usize) -> &mut [u8] {
        self.commands
            .push(GpuCommand::WriteBuffer { buffer, offset, len });
        &mut self.buffers[buffer.0 as usize][offset..offset + len]
    }

    fn unmap_buffer(&mut self, _buffer: BufferHandle) {}

    fn read_buffer(&mut self, buffer: BufferHandle, offset: usize, dst: &mut [u8]) {
        dst.copy_from_slice(&self.buffers[buffer.0 as usize][offset..offset + dst.len()]);
        self.commands.push(GpuCommand::ReadBuffer {
            buffer,
            len: dst.len(),
        });
    }

    fn create_texture(&mut self, desc: TextureDesc) -> TextureHandle {
        TextureHandle(self.textures.insert(desc) as u32)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(texture.0 as usize);
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.commands
            .push(GpuCommand::BindTexture { unit, texture });
    }

    fn bind_image(&mut self, unit: u32, texture: TextureHandle, level: u32) {
        self.commands.push(GpuCommand::BindImage {
            unit,
            texture,
            level,
        });
    }

    fn bind_square_texture(&mut self, square: IVec2) {
        self.commands.push(GpuCommand::BindSquareTexture(square));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.program = Some(program);
        self.commands.push(GpuCommand::UseProgram(program));
    }

    fn release_program(&mut self) {
        self.program = None;
        self.commands.push(GpuCommand::ReleaseProgram);
    }

    fn set_uniform(&mut self, name: &str, value: Uniform) {
        self.uniforms.insert(name.to_owned(), value);
        self.commands.push(GpuCommand::SetUniform {
            name: name.to_owned(),
            value,
        });
    }

    fn draw_arrays(&mut self, primitive: Primitive, vertices: BufferHandle, first: u32, count: u32) {
        self.commands.push(GpuCommand::DrawArrays {
            primitive,
            vertices,
            first,
            count,
        });
        if let Primitive::Patches { vertices_per_patch } = primitive {
            if self.discard {
                self.tessellate_and_capture(count / vertices_per_patch.max(1));
            }
        }
    }

    fn draw_indexed(&mut self, primitive: Primitive, vertices: BufferHandle, indices: BufferHandle, count: u32) {
        self.commands.push(GpuCommand::DrawIndexed {
            primitive,
            vertices,
            indices,
            count,
        });
    }

    fn draw_arrays_indirect(&mut self, primitive: Primitive, vertices: BufferHandle) {
        let count = self
            .bound_buffer(BufferTarget::DrawIndirect)
            .map_or(0, |command| self.read_u32(command, 0));
        self.commands.push(GpuCommand::DrawIndirect {
            primitive,
            vertices,
            count,
        });
    }

    fn create_feedback(&mut self, capture: BufferHandle) -> FeedbackHandle {
        FeedbackHandle(self.feedbacks.insert(Feedback {
            capture,
            vertices: 0,
        }) as u32)
    }

    fn delete_feedback(&mut self, feedback: FeedbackHandle) {
        self.feedbacks.remove(feedback.0 as usize);
    }

    fn begin_feedback(&mut self, feedback: FeedbackHandle) {
        self.active_feedback = Some(feedback);
    }

    fn end_feedback(&mut self) {
        self.active_feedback = None;
    }

    fn draw_feedback(&mut self, primitive: Primitive, feedback: FeedbackHandle) {
        let count = self.feedbacks[feedback.0 as usize].vertices;
        self.commands.push(GpuCommand::DrawFeedback {
            primitive,
            feedback,
            count,
        });
    }

    fn set_rasterizer_discard(&mut self, discard: bool) {
        self.discard = discard;
    }

    fn dispatch_compute(&mut self, groups: [u32; 3]) {
        self.commands.push(GpuCommand::DispatchCompute(groups));
    }

    fn memory_barrier(&mut self, barriers: &[MemoryBarrier]) {
        self.commands
            .push(GpuCommand::MemoryBarrier(barriers.to_vec()));
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
    fn storage_capture_appends_and_counts_vertices() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let triangles = device.create_buffer();
        device.allocate_buffer(triangles, 64 * 36, BufferUsage::DynamicCopy);
        let counter = device.create_buffer();
        device.allocate_buffer(counter, 16, BufferUsage::DynamicDraw);
        write_buffer(
            &mut device,
            counter,
            0,
            bytemuck::bytes_of(&DrawArraysIndirectCommand::EMPTY),
        );

        device.bind_buffer(triangles, BufferTarget::Storage(0));
        device.bind_buffer(counter, BufferTarget::AtomicCounter(0));
        device.set_uniform("texSquare", Uniform::IVec2([1, 0]));
        device.set_rasterizer_discard(true);
        let template = device.create_buffer();
        device.draw_arrays(Primitive::Patches { vertices_per_patch: 4 }, template, 0, 8);

        // Two quads at level 2.
        assert_eq!(device.read_u32(counter, 0), 3 * 16);
        assert_eq!(device.read_u32(counter, 4), 1);
        assert!(device.commands().contains(&GpuCommand::Capture {
            square: IVec2::new(1, 0),
            buffer: triangles,
            triangles: 16,
        }));
    }

    #[test]
    fn capture_stops_at_buffer_capacity() {
        let mut device = RecordingDevice::new(GpuCapabilities::all());
        let triangles = device.create_buffer();
        device.allocate_buffer(triangles, 5 * 36, BufferUsage::DynamicCopy);
        let feedback = device.create_feedback(triangles);

        device.set_rasterizer_discard(true);
        device.begin_feedback(feedback);
        let template = device.create_buffer();
        device.draw_arrays(Primitive::Patches { vertices_per_patch: 4 }, template, 0, 16);
        device.end_feedback();
        device.set_rasterizer_discard(false);

        device.draw_feedback(Primitive::Triangles, feedback);
        assert_eq!(
            device.commands().last(),
            Some(&GpuCommand::DrawFeedback {
                primitive: Primitive::Triangles,
                feedback,
                count: 15,
            })
        );
    }
}
