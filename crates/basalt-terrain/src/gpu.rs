//! The slice of a GL-style graphics API that the mesh drawers talk to.
//!
//! Objects are referred to by opaque handles owned by the device. Every call is issued from the render thread; nothing
//! here is `Send`. [`recording::RecordingDevice`] is an in-memory implementation for headless runs and tests.

pub mod recording;

use basalt_core::glam::IVec2;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BufferHandle(pub u32);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ProgramHandle(pub u32);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FeedbackHandle(pub u32);

/// Binding points a buffer can be attached to. Indexed targets carry their binding slot.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BufferTarget {
    DrawIndirect,
    Storage(u32),
    AtomicCounter(u32),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BufferUsage {
    StaticDraw,
    DynamicDraw,
    DynamicCopy,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Primitive {
    Triangles,
    /// Input for the tessellation stages.
    Patches { vertices_per_patch: u32 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemoryBarrier {
    ShaderStorage,
    Command,
    AtomicCounter,
    ShaderImageAccess,
    TextureFetch,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextureFormat {
    R32Float,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: TextureFormat,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Uniform {
    Int(i32),
    IVec2([i32; 2]),
    Float(f32),
}

/// Optional features, queried once when a drawer is built.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GpuCapabilities {
    pub tessellation_shaders: bool,
    pub compute_shaders: bool,
    pub shader_storage_buffers: bool,
    pub atomic_counters: bool,
    pub transform_feedback: bool,
    pub draw_indirect: bool,
    pub float_textures: bool,
}

impl GpuCapabilities {
    pub fn all() -> Self {
        Self {
            tessellation_shaders: true,
            compute_shaders: true,
            shader_storage_buffers: true,
            atomic_counters: true,
            transform_feedback: true,
            draw_indirect: true,
            float_textures: true,
        }
    }
}

/// Argument block of an indirect array draw, laid out as the GPU reads it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawArraysIndirectCommand {
    pub count: u32,
    pub instance_count: u32,
    pub first: u32,
    pub base_instance: u32,
}

impl DrawArraysIndirectCommand {
    /// No vertices yet, one instance. Written before every capture so the atomic counter starts at zero.
    pub const EMPTY: Self = Self {
        count: 0,
        instance_count: 1,
        first: 0,
        base_instance: 0,
    };
}

pub trait GpuDevice {
    fn capabilities(&self) -> GpuCapabilities;

    fn create_buffer(&mut self) -> BufferHandle;
    fn delete_buffer(&mut self, buffer: BufferHandle);
    /// (Re)allocates storage for `buffer`. Previous contents are discarded.
    fn allocate_buffer(&mut self, buffer: BufferHandle, size: usize, usage: BufferUsage);
    fn buffer_size(&self, buffer: BufferHandle) -> usize;
    fn bind_buffer(&mut self, buffer: BufferHandle, target: BufferTarget);
    fn unbind_buffer(&mut self, target: BufferTarget);
    /// Maps `len` bytes at `offset` for writing. The mapping is flushed by [`unmap_buffer`](Self::unmap_buffer).
    fn map_buffer(&mut self, buffer: BufferHandle, offset: usize, len: usize) -> &mut [u8];
    fn unmap_buffer(&mut self, buffer: BufferHandle);
    /// Synchronous read-back. Stalls until the GPU has finished writing `buffer`.
    fn read_buffer(&mut self, buffer: BufferHandle, offset: usize, dst: &mut [u8]);

    fn create_texture(&mut self, desc: TextureDesc) -> TextureHandle;
    fn delete_texture(&mut self, texture: TextureHandle);
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);
    fn bind_image(&mut self, unit: u32, texture: TextureHandle, level: u32);
    /// Binds the diffuse texture of the map square at `square` (in patch units).
    fn bind_square_texture(&mut self, square: IVec2);

    fn use_program(&mut self, program: ProgramHandle);
    fn release_program(&mut self);
    /// Sets a uniform of the program currently in use.
    fn set_uniform(&mut self, name: &str, value: Uniform);

    fn draw_arrays(&mut self, primitive: Primitive, vertices: BufferHandle, first: u32, count: u32);
    fn draw_indexed(&mut self, primitive: Primitive, vertices: BufferHandle, indices: BufferHandle, count: u32);
    /// Draws with the arguments held in the buffer bound to [`BufferTarget::DrawIndirect`].
    fn draw_arrays_indirect(&mut self, primitive: Primitive, vertices: BufferHandle);

    fn create_feedback(&mut self, capture: BufferHandle) -> FeedbackHandle;
    fn delete_feedback(&mut self, feedback: FeedbackHandle);
    fn begin_feedback(&mut self, feedback: FeedbackHandle);
    fn end_feedback(&mut self);
    /// Draws however many vertices were last captured by `feedback`.
    fn draw_feedback(&mut self, primitive: Primitive, feedback: FeedbackHandle);
    fn set_rasterizer_discard(&mut self, discard: bool);

    fn dispatch_compute(&mut self, groups: [u32; 3]);
    fn memory_barrier(&mut self, barriers: &[MemoryBarrier]);
}

/// Copies `bytes` into `buffer` at `offset` through a temporary mapping.
pub fn write_buffer(device: &mut dyn GpuDevice, buffer: BufferHandle, offset: usize, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    device.map_buffer(buffer, offset, bytes.len()).copy_from_slice(bytes);
    device.unmap_buffer(buffer);
}

/// Replaces the contents of `buffer` with `bytes`, reallocating only when the size changes.
pub fn upload_buffer(device: &mut dyn GpuDevice, buffer: BufferHandle, usage: BufferUsage, bytes: &[u8]) {
    if device.buffer_size(buffer) != bytes.len() {
        device.allocate_buffer(buffer, bytes.len(), usage);
    }
    write_buffer(device, buffer, 0, bytes);
}
