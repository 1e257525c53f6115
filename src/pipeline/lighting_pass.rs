//! Deferred lighting pass
//!
//! Fullscreen pass reading the g-buffer through attachment inputs and
//! accumulating light into the HDR target, which reuses the emissive
//! buffer's storage in place.

use crate::backend::traits::GraphicsBackend;
use crate::render_graph::{PassImplementation, RecordContext};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use std::marker::PhantomData;

/// Directional light parameters pushed to the lighting shader
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DirectionalLight {
    pub inv_view_proj: Mat4,
    pub direction: Vec4,
    pub color: Vec4,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            inv_view_proj: Mat4::IDENTITY,
            direction: Vec4::new(0.8, 0.4, 0.9, 0.0).normalize(),
            color: Vec4::new(3.0, 2.5, 2.5, 0.0),
        }
    }
}

pub struct LightingPass<B> {
    pub light: DirectionalLight,
    _backend: PhantomData<B>,
}

impl<B> LightingPass<B> {
    pub fn new() -> Self {
        Self {
            light: DirectionalLight::default(),
            _backend: PhantomData,
        }
    }
}

impl<B> Default for LightingPass<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GraphicsBackend + 'static> PassImplementation for LightingPass<B> {
    // No clear: the HDR output loads the emissive contents it aliases

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
