//! Tonemapping post-processing

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::PipelineStages;
use crate::render_graph::{
    AttachmentInfo, PassImplementation, RecordContext, RenderGraph, ResourceId,
};
use std::marker::PhantomData;

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TonemapOperator {
    Reinhard,
    #[default]
    Aces,
    Uncharted2,
    None,
}

/// HDR -> LDR resolve pass
pub struct TonemappingPass<B> {
    pub operator: TonemapOperator,
    pub exposure: f32,
    pub gamma: f32,
    _backend: PhantomData<B>,
}

impl<B> TonemappingPass<B> {
    pub fn new() -> Self {
        Self {
            operator: TonemapOperator::Aces,
            exposure: 1.0,
            gamma: 2.2,
            _backend: PhantomData,
        }
    }
}

impl<B> Default for TonemappingPass<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GraphicsBackend + 'static> PassImplementation for TonemappingPass<B> {
    fn get_clear_color(&self, _index: usize) -> Option<[f32; 4]> {
        Some([0.0, 0.0, 0.0, 1.0])
    }

    fn build_render_pass(&mut self, ctx: &mut RecordContext<'_>) {
        let width = ctx.width();
        let height = ctx.height();

        let Some(backend) = ctx.backend::<B>() else {
            return;
        };

        backend.set_viewport(0.0, 0.0, width as f32, height as f32);
        backend.draw(0..3, 0..1);
    }
}

/// Declare the HDR post-processing chain: a tonemap pass sampling `input`
/// and writing the LDR result to `output`.
pub fn setup_hdr_postprocess<B: GraphicsBackend + 'static>(
    graph: &mut RenderGraph,
    input: &str,
    output: &str,
) -> ResourceId {
    let mut pass = graph.add_pass("tonemap", PipelineStages::GRAPHICS);
    pass.add_texture_input(input);
    let out = pass.add_color_output(output, AttachmentInfo::default(), None);
    pass.set_implementation(Box::new(TonemappingPass::<B>::new()));
    out
}
