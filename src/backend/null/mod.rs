//! Null backend
//!
//! Creates no device objects; every command is appended to a log instead.
//! Tests assert on the recorded stream, and `RenderGraph::log()` dry runs
//! can execute against it without a GPU.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{HashMap, HashSet};

/// One recorded backend command
#[derive(Debug, Clone, PartialEq)]
pub enum NullCommand {
    BeginFrame,
    EndFrame,
    Barrier(Barrier),
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    BeginComputePass(Option<String>),
    EndComputePass,
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Draw {
        vertices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

/// Backend that records commands instead of executing them
pub struct NullBackend {
    features: DeviceFeatures,
    commands: Vec<NullCommand>,

    live_textures: HashSet<u64>,
    live_buffers: HashSet<u64>,
    texture_descs: HashMap<u64, TextureDescriptor>,
    /// view id -> (texture id, mip level or None for full views)
    views: HashMap<u64, (u64, Option<u32>)>,

    next_texture_id: u64,
    next_buffer_id: u64,
    next_view_id: u64,

    textures_created: usize,
    textures_destroyed: usize,
    buffers_created: usize,
    buffers_destroyed: usize,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::with_features(DeviceFeatures::all())
    }

    pub fn with_features(features: DeviceFeatures) -> Self {
        Self {
            features,
            commands: Vec::new(),
            live_textures: HashSet::new(),
            live_buffers: HashSet::new(),
            texture_descs: HashMap::new(),
            views: HashMap::new(),
            next_texture_id: 1,
            next_buffer_id: 1,
            next_view_id: 1,
            textures_created: 0,
            textures_destroyed: 0,
            buffers_created: 0,
            buffers_destroyed: 0,
        }
    }

    /// Recorded command stream since the last [`Self::clear_commands`]
    pub fn commands(&self) -> &[NullCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn live_texture_count(&self) -> usize {
        self.live_textures.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.live_buffers.len()
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created
    }

    pub fn textures_destroyed(&self) -> usize {
        self.textures_destroyed
    }

    pub fn buffers_created(&self) -> usize {
        self.buffers_created
    }

    pub fn buffers_destroyed(&self) -> usize {
        self.buffers_destroyed
    }

    /// Descriptor the given texture was created with
    pub fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.texture_descs.get(&texture.0)
    }

    /// The texture a view was derived from
    pub fn view_texture(&self, view: TextureViewHandle) -> Option<TextureHandle> {
        self.views.get(&view.0).map(|&(tex, _)| TextureHandle(tex))
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for NullBackend {
    fn device_features(&self) -> DeviceFeatures {
        self.features
    }

    fn create_buffer(&mut self, _desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.live_buffers.insert(id);
        self.buffers_created += 1;
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, _buffer: BufferHandle, _offset: u64, _data: &[u8]) {}

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.live_textures.insert(id);
        self.texture_descs.insert(id, desc.clone());
        self.textures_created += 1;
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.live_textures.contains(&texture.0) {
            return Err(BackendError::TextureViewCreationFailed(
                "texture not found".into(),
            ));
        }
        let id = self.next_view_id;
        self.next_view_id += 1;
        self.views.insert(id, (texture.0, None));
        Ok(TextureViewHandle(id))
    }

    fn create_texture_view_for_mip(
        &mut self,
        texture: TextureHandle,
        level: u32,
    ) -> BackendResult<TextureViewHandle> {
        let levels = self
            .texture_descs
            .get(&texture.0)
            .ok_or_else(|| BackendError::TextureViewCreationFailed("texture not found".into()))?
            .mip_levels;
        if level >= levels {
            return Err(BackendError::TextureViewCreationFailed(format!(
                "mip level {} out of range ({} levels)",
                level, levels
            )));
        }
        let id = self.next_view_id;
        self.next_view_id += 1;
        self.views.insert(id, (texture.0, Some(level)));
        Ok(TextureViewHandle(id))
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.commands.push(NullCommand::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.commands.push(NullCommand::EndFrame);
        Ok(())
    }

    fn cmd_barrier(&mut self, barrier: &Barrier) {
        self.commands.push(NullCommand::Barrier(*barrier));
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.commands.push(NullCommand::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&mut self) {
        self.commands.push(NullCommand::EndRenderPass);
    }

    fn begin_compute_pass(&mut self, label: Option<&str>) {
        self.commands
            .push(NullCommand::BeginComputePass(label.map(|s| s.to_string())));
    }

    fn end_compute_pass(&mut self) {
        self.commands.push(NullCommand::EndComputePass);
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.commands.push(NullCommand::SetViewport {
            x,
            y,
            width,
            height,
        });
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        self.commands.push(NullCommand::Draw {
            vertices,
            instances,
        });
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(NullCommand::Dispatch { x, y, z });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.live_buffers.remove(&buffer.0) {
            self.buffers_destroyed += 1;
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.live_textures.remove(&texture.0) {
            self.textures_destroyed += 1;
            self.texture_descs.remove(&texture.0);
            self.views.retain(|_, &mut (tex, _)| tex != texture.0);
        }
    }
}
