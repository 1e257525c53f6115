//! Logical resources for the render graph
//!
//! Resources are declared by name as passes reference them. Nothing is
//! allocated here; sizes are policies that resolve against the backbuffer
//! during `bake()`, and physical storage is assigned afterwards.

use crate::backend::types::*;
use crate::render_graph::error::{GraphError, GraphResult};
use std::collections::HashMap;

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub(crate) u32);

impl ResourceId {
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

/// How an attachment's extent is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeClass {
    /// `size_x`/`size_y` are absolute pixel counts
    Absolute,
    /// `size_x`/`size_y` scale the backbuffer extent
    #[default]
    SwapchainRelative,
    /// `size_x`/`size_y` scale another resource's resolved extent
    InputRelative,
}

/// Declaration of a texture attachment
#[derive(Debug, Clone)]
pub struct AttachmentInfo {
    pub size_class: SizeClass,
    pub size_x: f32,
    pub size_y: f32,
    /// `None` inherits the backbuffer format
    pub format: Option<TextureFormat>,
    /// Mip level count; 0 derives the full chain from the resolved extent
    pub levels: u32,
    /// Referenced resource for [`SizeClass::InputRelative`]
    pub size_relative_name: Option<String>,
}

impl Default for AttachmentInfo {
    fn default() -> Self {
        Self {
            size_class: SizeClass::SwapchainRelative,
            size_x: 1.0,
            size_y: 1.0,
            format: None,
            levels: 1,
            size_relative_name: None,
        }
    }
}

/// Declaration of a buffer resource
#[derive(Debug, Clone, Default)]
pub struct BufferInfo {
    pub size: u64,
    pub usage: BufferUsage,
}

/// Resolved size/format of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDimensions {
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: TextureFormat,
    /// Byte size for buffers; 0 for textures
    pub buffer_size: u64,
}

impl Default for ResourceDimensions {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            levels: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            buffer_size: 0,
        }
    }
}

/// Full mip chain length for an extent, stopping before either axis
/// drops below one texel.
pub fn full_mip_levels(width: u32, height: u32) -> u32 {
    let smallest = width.min(height).max(1);
    32 - smallest.leading_zeros()
}

/// Kind-specific declaration data
#[derive(Debug, Clone)]
pub enum ResourceInfo {
    Texture(AttachmentInfo),
    Buffer(BufferInfo),
}

/// A named logical resource accumulated from all declaring passes
#[derive(Debug)]
pub struct RenderResource {
    pub(crate) name: String,
    pub(crate) info: ResourceInfo,
    /// Usage merged from every pass touching this resource
    pub(crate) texture_usage: TextureUsage,
    /// Pass indices writing this resource, in declaration order
    pub(crate) written_in: Vec<usize>,
    /// Pass indices reading this resource, in declaration order
    pub(crate) read_in: Vec<usize>,
    /// Set when this resource is a read-modify-write color output reusing
    /// the named input's storage
    pub(crate) alias_of: Option<usize>,
    /// Bound per-frame from outside; never aliased, never allocated
    pub(crate) external: bool,
}

impl RenderResource {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_texture(&self) -> bool {
        matches!(self.info, ResourceInfo::Texture(_))
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self.info, ResourceInfo::Buffer(_))
    }

    fn record_write(&mut self, pass: usize) {
        if self.written_in.last() != Some(&pass) {
            self.written_in.push(pass);
        }
    }

    fn record_read(&mut self, pass: usize) {
        if self.read_in.last() != Some(&pass) {
            self.read_in.push(pass);
        }
    }
}

/// Name-keyed registry of logical resources
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Vec<RenderResource>,
    lookup: HashMap<String, usize>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn clear(&mut self) {
        self.resources.clear();
        self.lookup.clear();
    }

    pub fn get(&self, id: ResourceId) -> Option<&RenderResource> {
        self.resources.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: ResourceId) -> Option<&mut RenderResource> {
        self.resources.get_mut(id.index())
    }

    pub fn find(&self, name: &str) -> Option<ResourceId> {
        self.lookup.get(name).map(|&i| ResourceId(i as u32))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RenderResource> {
        self.resources.iter()
    }

    pub(crate) fn by_index(&self, index: usize) -> &RenderResource {
        &self.resources[index]
    }

    /// Declare a texture, or return the existing declaration for `name`.
    ///
    /// When `info` is given and the resource already exists, the explicit
    /// attachment info replaces the auto-declared default; usage keeps
    /// accumulating either way.
    pub(crate) fn declare_texture(
        &mut self,
        name: &str,
        info: Option<AttachmentInfo>,
    ) -> ResourceId {
        if let Some(&index) = self.lookup.get(name) {
            if let Some(info) = info {
                self.resources[index].info = ResourceInfo::Texture(info);
            }
            return ResourceId(index as u32);
        }
        let index = self.resources.len();
        self.resources.push(RenderResource {
            name: name.to_string(),
            info: ResourceInfo::Texture(info.unwrap_or_default()),
            texture_usage: TextureUsage::empty(),
            written_in: Vec::new(),
            read_in: Vec::new(),
            alias_of: None,
            external: false,
        });
        self.lookup.insert(name.to_string(), index);
        ResourceId(index as u32)
    }

    /// Declare a buffer, or return the existing declaration for `name`.
    pub(crate) fn declare_buffer(&mut self, name: &str, info: Option<BufferInfo>) -> ResourceId {
        if let Some(&index) = self.lookup.get(name) {
            if let Some(info) = info {
                self.resources[index].info = ResourceInfo::Buffer(info);
            }
            return ResourceId(index as u32);
        }
        let index = self.resources.len();
        self.resources.push(RenderResource {
            name: name.to_string(),
            info: ResourceInfo::Buffer(info.unwrap_or_default()),
            texture_usage: TextureUsage::empty(),
            written_in: Vec::new(),
            read_in: Vec::new(),
            alias_of: None,
            external: false,
        });
        self.lookup.insert(name.to_string(), index);
        ResourceId(index as u32)
    }

    pub(crate) fn add_texture_usage(&mut self, id: ResourceId, usage: TextureUsage) {
        self.resources[id.index()].texture_usage |= usage;
    }

    pub(crate) fn add_buffer_usage(&mut self, id: ResourceId, usage: BufferUsage) {
        if let ResourceInfo::Buffer(info) = &mut self.resources[id.index()].info {
            info.usage |= usage;
        }
    }

    pub(crate) fn record_write(&mut self, id: ResourceId, pass: usize) {
        self.resources[id.index()].record_write(pass);
    }

    pub(crate) fn record_read(&mut self, id: ResourceId, pass: usize) {
        self.resources[id.index()].record_read(pass);
    }

    pub(crate) fn clear_external_flags(&mut self) {
        for res in &mut self.resources {
            res.external = false;
        }
    }

    pub(crate) fn set_external(&mut self, id: ResourceId) {
        self.resources[id.index()].external = true;
    }

    /// Resolve one resource's dimensions against the backbuffer, following
    /// input-relative references. References must point at resources
    /// declared earlier.
    pub fn resolve_dimensions(
        &self,
        id: ResourceId,
        backbuffer: &ResourceDimensions,
    ) -> GraphResult<ResourceDimensions> {
        let res = &self.resources[id.index()];
        match &res.info {
            ResourceInfo::Buffer(info) => Ok(ResourceDimensions {
                buffer_size: info.size,
                width: 0,
                height: 0,
                levels: 1,
                format: backbuffer.format,
            }),
            ResourceInfo::Texture(info) => {
                let (base_w, base_h) = match info.size_class {
                    SizeClass::Absolute => {
                        return Ok(self.finish_texture_dimensions(
                            info,
                            info.size_x as u32,
                            info.size_y as u32,
                            backbuffer,
                        ));
                    }
                    SizeClass::SwapchainRelative => (backbuffer.width, backbuffer.height),
                    SizeClass::InputRelative => {
                        let relative_to = info.size_relative_name.as_deref().unwrap_or_default();
                        let other = self.lookup.get(relative_to).copied().filter(|&other| {
                            // only references declared before this resource resolve
                            other < id.index()
                        });
                        let Some(other) = other else {
                            return Err(GraphError::DependencyOrder {
                                resource: res.name.clone(),
                                relative_to: relative_to.to_string(),
                            });
                        };
                        let dims =
                            self.resolve_dimensions(ResourceId(other as u32), backbuffer)?;
                        (dims.width, dims.height)
                    }
                };
                let width = ((base_w as f32) * info.size_x).max(1.0) as u32;
                let height = ((base_h as f32) * info.size_y).max(1.0) as u32;
                Ok(self.finish_texture_dimensions(info, width, height, backbuffer))
            }
        }
    }

    fn finish_texture_dimensions(
        &self,
        info: &AttachmentInfo,
        width: u32,
        height: u32,
        backbuffer: &ResourceDimensions,
    ) -> ResourceDimensions {
        let levels = if info.levels == 0 {
            full_mip_levels(width, height)
        } else {
            info.levels
        };
        ResourceDimensions {
            width,
            height,
            levels,
            format: info.format.unwrap_or(backbuffer.format),
            buffer_size: 0,
        }
    }

    /// Resolve every resource in declaration order.
    pub(crate) fn resolve_all(
        &self,
        backbuffer: &ResourceDimensions,
    ) -> GraphResult<Vec<ResourceDimensions>> {
        (0..self.resources.len())
            .map(|i| self.resolve_dimensions(ResourceId(i as u32), backbuffer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backbuffer(width: u32, height: u32) -> ResourceDimensions {
        ResourceDimensions {
            width,
            height,
            ..Default::default()
        }
    }

    #[test]
    fn full_mip_levels_match_log2_floor() {
        assert_eq!(full_mip_levels(1, 1), 1);
        assert_eq!(full_mip_levels(2, 2), 2);
        assert_eq!(full_mip_levels(513, 300), 9);
        assert_eq!(full_mip_levels(1920, 1080), 11);
    }

    #[test]
    fn swapchain_relative_scales_backbuffer() {
        let mut registry = ResourceRegistry::new();
        let id = registry.declare_texture(
            "half-res",
            Some(AttachmentInfo {
                size_x: 0.5,
                size_y: 0.5,
                ..Default::default()
            }),
        );
        let dims = registry
            .resolve_dimensions(id, &backbuffer(1920, 1080))
            .unwrap();
        assert_eq!((dims.width, dims.height), (960, 540));
    }

    #[test]
    fn input_relative_requires_earlier_declaration() {
        let mut registry = ResourceRegistry::new();
        let id = registry.declare_texture(
            "hierarchy",
            Some(AttachmentInfo {
                size_class: SizeClass::InputRelative,
                size_relative_name: Some("depth".to_string()),
                ..Default::default()
            }),
        );
        // "depth" declared after "hierarchy"
        registry.declare_texture("depth", None);

        let err = registry
            .resolve_dimensions(id, &backbuffer(1280, 720))
            .unwrap_err();
        assert!(matches!(err, GraphError::DependencyOrder { .. }));
    }

    #[test]
    fn input_relative_copies_resolved_extent() {
        let mut registry = ResourceRegistry::new();
        registry.declare_texture(
            "depth",
            Some(AttachmentInfo {
                size_x: 0.5,
                size_y: 0.5,
                ..Default::default()
            }),
        );
        let id = registry.declare_texture(
            "hierarchy",
            Some(AttachmentInfo {
                size_class: SizeClass::InputRelative,
                size_relative_name: Some("depth".to_string()),
                ..Default::default()
            }),
        );
        let dims = registry
            .resolve_dimensions(id, &backbuffer(1280, 720))
            .unwrap();
        assert_eq!((dims.width, dims.height), (640, 360));
    }
}
