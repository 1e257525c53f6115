//! G-Buffer generation pass for deferred shading

use crate::backend::traits::GraphicsBackend;
use crate::render_graph::{PassImplementation, RecordContext};
use std::marker::PhantomData;

/// Renders scene geometry into the g-buffer targets.
///
/// Scene traversal itself lives with the caller; this implementation clears
/// the targets and hands the attachment-bound pass to the supplied geometry
/// recorder.
pub struct GBufferPass<B> {
    geometry: Option<Box<dyn FnMut(&mut RecordContext<'_>)>>,
    _backend: PhantomData<B>,
}

impl<B> GBufferPass<B> {
    pub fn new() -> Self {
        Self {
            geometry: None,
            _backend: PhantomData,
        }
    }

    /// Recorder invoked inside the pass to draw the visible geometry
    pub fn with_geometry(mut self, geometry: impl FnMut(&mut RecordContext<'_>) + 'static) -> Self {
        self.geometry = Some(Box::new(geometry));
        self
    }
}

impl<B> Default for GBufferPass<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GraphicsBackend + 'static> PassImplementation for GBufferPass<B> {
    fn get_clear_color(&self, _index: usize) -> Option<[f32; 4]> {
        Some([0.0, 0.0, 0.0, 0.0])
    }

    fn get_clear_depth_stencil(&self) -> Option<(f32, u32)> {
        Some((1.0, 0))
    }

    fn build_render_pass(&mut self, ctx: &mut RecordContext<'_>) {
        let width = ctx.width();
        let height = ctx.height();

        if let Some(backend) = ctx.backend::<B>() {
            backend.set_viewport(0.0, 0.0, width as f32, height as f32);
        }

        if let Some(geometry) = self.geometry.as_mut() {
            geometry(ctx);
        }
    }
}
