//! Logical passes for the render graph

use crate::backend::types::PipelineStages;
use crate::render_graph::executor::RecordContext;
use crate::render_graph::resource::ResourceId;

/// Unique identifier for a render graph pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(pub(crate) u32);

/// Per-frame recording callback attached to a pass
pub type RecordCallback = Box<dyn FnMut(&mut RecordContext<'_>)>;

/// Externally defined pass logic.
///
/// An implementation can volunteer clear values for its attachments; the
/// defaults mean "load whatever is there".
pub trait PassImplementation {
    fn get_clear_color(&self, _index: usize) -> Option<[f32; 4]> {
        None
    }

    fn get_clear_depth_stencil(&self) -> Option<(f32, u32)> {
        None
    }

    fn build_render_pass(&mut self, ctx: &mut RecordContext<'_>);
}

/// How a pass records its commands
pub(crate) enum PassRecorder {
    Unset,
    Callback(RecordCallback),
    Implementation(Box<dyn PassImplementation>),
}

impl PassRecorder {
    pub(crate) fn is_set(&self) -> bool {
        !matches!(self, PassRecorder::Unset)
    }
}

/// A declared pass: its stage mask and everything it reads or writes
pub struct RenderGraphPass {
    pub(crate) name: String,
    pub(crate) stages: PipelineStages,

    pub(crate) color_outputs: Vec<ResourceId>,
    /// Parallel to `color_outputs`; a read-modify-write source whose storage
    /// the output reuses
    pub(crate) color_inputs: Vec<Option<ResourceId>>,
    pub(crate) depth_stencil_output: Option<ResourceId>,
    pub(crate) depth_stencil_input: Option<ResourceId>,
    pub(crate) attachment_inputs: Vec<ResourceId>,
    pub(crate) texture_inputs: Vec<ResourceId>,
    pub(crate) storage_texture_outputs: Vec<ResourceId>,
    pub(crate) storage_outputs: Vec<ResourceId>,

    pub(crate) recorder: PassRecorder,
    /// Both recorder kinds were set; rejected at bake
    pub(crate) recorder_conflict: bool,
}

impl RenderGraphPass {
    pub(crate) fn new(name: &str, stages: PipelineStages) -> Self {
        Self {
            name: name.to_string(),
            stages,
            color_outputs: Vec::new(),
            color_inputs: Vec::new(),
            depth_stencil_output: None,
            depth_stencil_input: None,
            attachment_inputs: Vec::new(),
            texture_inputs: Vec::new(),
            storage_texture_outputs: Vec::new(),
            storage_outputs: Vec::new(),
            recorder: PassRecorder::Unset,
            recorder_conflict: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> PipelineStages {
        self.stages
    }

    /// True when this pass renders through framebuffer attachments
    pub(crate) fn has_attachments(&self) -> bool {
        !self.color_outputs.is_empty()
            || self.depth_stencil_output.is_some()
            || self.depth_stencil_input.is_some()
    }

    pub(crate) fn get_clear_color(&self, index: usize) -> Option<[f32; 4]> {
        match &self.recorder {
            PassRecorder::Implementation(imp) => imp.get_clear_color(index),
            _ => None,
        }
    }

    pub(crate) fn get_clear_depth_stencil(&self) -> Option<(f32, u32)> {
        match &self.recorder {
            PassRecorder::Implementation(imp) => imp.get_clear_depth_stencil(),
            _ => None,
        }
    }
}
