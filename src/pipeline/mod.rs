//! Deferred shading pipeline
//!
//! Declares the standard pass chain on a render graph:
//! 1. G-Buffer pass - geometry into multiple render targets
//! 2. Lighting pass - fullscreen accumulation into an HDR target that
//!    reuses the emissive buffer in place
//! 3. Optional depth hierarchy reduction for occlusion consumers
//! 4. Tonemapping and final composite into the backbuffer

pub mod depth_hierarchy;
pub mod gbuffer_pass;
pub mod lighting_pass;
pub mod postprocess;

pub use gbuffer_pass::GBufferPass;
pub use lighting_pass::LightingPass;

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{PipelineStages, TextureFormat};
use crate::render_graph::{AttachmentInfo, GraphError, GraphResult, RenderGraph, ResourceId};
use self::depth_hierarchy::DepthHierarchyParams;

/// Configuration for the deferred pipeline
#[derive(Debug, Clone)]
pub struct DeferredConfig {
    pub depth_format: TextureFormat,
    /// Build a depth hierarchy for occlusion consumers
    pub enable_depth_hierarchy: bool,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            depth_format: TextureFormat::Depth32Float,
            enable_depth_hierarchy: true,
        }
    }
}

/// Resources declared by the deferred pipeline
pub struct DeferredResources {
    pub emissive: ResourceId,
    pub albedo: ResourceId,
    pub normal: ResourceId,
    pub pbr: ResourceId,
    pub depth: ResourceId,
    pub hdr: ResourceId,
    pub tonemapped: ResourceId,
    pub backbuffer: ResourceId,
}

/// Declare the deferred pass chain on `graph`.
///
/// The graph still needs `bake()` afterwards; call this again after every
/// `reset()`.
pub fn setup_deferred_graph<B: GraphicsBackend + 'static>(
    graph: &mut RenderGraph,
    backend: &B,
    config: &DeferredConfig,
) -> GraphResult<DeferredResources> {
    let emissive = AttachmentInfo {
        format: Some(TextureFormat::Rg11b10Float),
        ..Default::default()
    };
    let albedo = AttachmentInfo {
        format: Some(TextureFormat::Rgba8UnormSrgb),
        ..Default::default()
    };
    let normal = AttachmentInfo {
        format: Some(TextureFormat::Rgb10a2Unorm),
        ..Default::default()
    };
    let pbr = AttachmentInfo {
        format: Some(TextureFormat::Rg8Unorm),
        ..Default::default()
    };
    let depth = AttachmentInfo {
        format: Some(config.depth_format),
        ..Default::default()
    };

    let mut gbuffer = graph.add_pass("gbuffer", PipelineStages::GRAPHICS);
    let emissive = gbuffer.add_color_output("emissive", emissive, None);
    let albedo = gbuffer.add_color_output("albedo", albedo, None);
    let normal = gbuffer.add_color_output("normal", normal, None);
    let pbr = gbuffer.add_color_output("pbr", pbr, None);
    let depth = gbuffer.set_depth_stencil_output("depth", depth);
    gbuffer.set_implementation(Box::new(GBufferPass::<B>::new()));

    let mut lighting = graph.add_pass("lighting", PipelineStages::GRAPHICS);
    let hdr = lighting.add_color_output("hdr", emissive_info_for_hdr(), Some("emissive"));
    lighting.add_attachment_input("albedo");
    lighting.add_attachment_input("normal");
    lighting.add_attachment_input("pbr");
    lighting.add_attachment_input("depth");
    lighting.set_depth_stencil_input("depth");
    lighting.set_implementation(Box::new(LightingPass::<B>::new()));

    if config.enable_depth_hierarchy {
        // Prefer the single-dispatch reduction; devices without it get the
        // serialized per-level chain instead of a failed frame
        match depth_hierarchy::setup_depth_hierarchy_pass(
            graph,
            backend,
            "depth",
            "depth-hierarchy",
            DepthHierarchyParams::default(),
        ) {
            Ok(()) => {}
            Err(GraphError::DeviceCapability { pass, capability }) => {
                log::warn!("pass '{pass}' falling back to multi-pass reduction: {capability}");
                depth_hierarchy::setup_depth_hierarchy_fallback::<B>(
                    graph,
                    "depth",
                    "depth-hierarchy",
                )?;
            }
            Err(err) => return Err(err),
        }
    }

    let tonemapped = postprocess::setup_hdr_postprocess::<B>(graph, "hdr", "tonemapped");

    // Final composite writes the backbuffer in place over the tonemapped
    // image; overlays hook in here
    let mut composite = graph.add_pass("composite", PipelineStages::GRAPHICS);
    let backbuffer =
        composite.add_color_output("backbuffer", AttachmentInfo::default(), Some("tonemapped"));
    composite.set_build_render_pass(move |ctx| {
        let width = ctx.width();
        let height = ctx.height();
        let Some(backend) = ctx.backend::<B>() else {
            return;
        };
        backend.set_viewport(0.0, 0.0, width as f32, height as f32);
        backend.draw(0..3, 0..1);
    });

    Ok(DeferredResources {
        emissive,
        albedo,
        normal,
        pbr,
        depth,
        hdr,
        tonemapped,
        backbuffer,
    })
}

/// The HDR target shares the emissive buffer's storage, so it must match
/// its declaration exactly.
fn emissive_info_for_hdr() -> AttachmentInfo {
    AttachmentInfo {
        format: Some(TextureFormat::Rg11b10Float),
        ..Default::default()
    }
}
