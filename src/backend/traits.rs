//! Core backend abstraction traits
//!
//! These traits define the interface the render graph records through. A
//! backend owns the device resources behind the opaque handles and one
//! command stream per frame.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create texture view: {0}")]
    TextureViewCreationFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Barrier transitioning a texture between two kinds of access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBarrier {
    pub texture: TextureHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    /// Set when ownership moves between queue families
    pub queue_transfer: Option<(QueueFamily, QueueFamily)>,
}

/// Memory barrier between a buffer write and a later access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub queue_transfer: Option<(QueueFamily, QueueFamily)>,
}

/// A single synchronization command issued ahead of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    Texture(TextureBarrier),
    Buffer(BufferBarrier),
}

/// Device capabilities optional fast paths probe before scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub compute_subgroups: bool,
    pub subgroup_quad_ops: bool,
    pub storage_rw_without_format: bool,
    pub max_compute_workgroup_size: u32,
}

impl DeviceFeatures {
    /// Everything available; what the null backend reports by default.
    pub fn all() -> Self {
        Self {
            compute_subgroups: true,
            subgroup_quad_ops: true,
            storage_rw_without_format: true,
            max_compute_workgroup_size: 1024,
        }
    }

    /// Nothing available beyond the baseline.
    pub fn none() -> Self {
        Self {
            compute_subgroups: false,
            subgroup_quad_ops: false,
            storage_rw_without_format: false,
            max_compute_workgroup_size: 256,
        }
    }
}

/// Color attachment for render pass
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub view: TextureViewHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

/// Depth stencil attachment for render pass
#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilAttachment {
    pub view: TextureViewHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
    pub stencil_clear_value: u32,
    pub read_only: bool,
}

/// Render pass descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

/// Main graphics backend trait
pub trait GraphicsBackend: Sized {
    /// Capability bits for optional accelerated paths
    fn device_features(&self) -> DeviceFeatures;

    // Resource creation

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Write data to a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a view covering the whole texture
    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle>;

    /// Create a view of a single mip level
    fn create_texture_view_for_mip(
        &mut self,
        texture: TextureHandle,
        level: u32,
    ) -> BackendResult<TextureViewHandle>;

    // Command recording

    /// Begin the per-frame command stream
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// Submit the per-frame command stream
    fn end_frame(&mut self) -> BackendResult<()>;

    /// Issue one scheduled barrier
    fn cmd_barrier(&mut self, barrier: &Barrier);

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Begin a compute pass
    fn begin_compute_pass(&mut self, label: Option<&str>);

    /// End the current compute pass
    fn end_compute_pass(&mut self);

    /// Set viewport
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32);

    /// Draw primitives
    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>);

    /// Dispatch compute work
    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32);

    // Resource cleanup

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a texture and any views derived from it
    fn destroy_texture(&mut self, texture: TextureHandle);
}
