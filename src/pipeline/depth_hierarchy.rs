//! Depth hierarchy generation
//!
//! Builds a full mip pyramid of a depth-derived image for occlusion and
//! screen-space traversal passes. The fast path reduces every level in one
//! compute dispatch; it needs subgroup quad operations and formatless
//! storage access, so callers probe first and fall back to the serialized
//! per-level chain when the device cannot do it.

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{BufferUsage, PipelineStages, TextureFormat};
use crate::render_graph::{
    full_mip_levels, AttachmentInfo, BufferInfo, GraphError, GraphResult, RenderGraph, SizeClass,
};
use bytemuck::{Pod, Zeroable};
use glam::Mat2;

/// Upper bound on reduced levels in one dispatch
pub const MAX_DOWNSAMPLE_MIPS: u32 = 12;

/// Parameters of the hierarchy reduction
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthHierarchyParams {
    /// Applied to sampled depth before reduction, e.g. the lower-right block
    /// of the inverse projection to linearize reverse-Z
    pub z_transform: Option<Mat2>,
}

/// Push data consumed by the reduction kernel
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ReduceRegisters {
    base_resolution: [u32; 2],
    inv_resolution: [f32; 2],
    mips: u32,
    num_workgroups: u32,
    z_transform: [f32; 4],
}

/// Whether the device can reduce the whole pyramid in a single dispatch.
pub fn supports_single_pass_downsample<B: GraphicsBackend>(
    backend: &B,
    format: TextureFormat,
) -> bool {
    let features = backend.device_features();
    !format.is_depth()
        && features.compute_subgroups
        && features.subgroup_quad_ops
        && features.storage_rw_without_format
        && features.max_compute_workgroup_size >= 256
}

/// Declare the single-dispatch depth hierarchy pass.
///
/// `output` becomes an input-relative storage texture with one level per
/// power-of-two step of the input's smaller axis. Fails with
/// [`GraphError::DeviceCapability`] when the device lacks the fast path;
/// callers then use [`setup_depth_hierarchy_fallback`] instead of failing
/// the frame.
pub fn setup_depth_hierarchy_pass<B: GraphicsBackend + 'static>(
    graph: &mut RenderGraph,
    backend: &B,
    input: &str,
    output: &str,
    params: DepthHierarchyParams,
) -> GraphResult<()> {
    if !supports_single_pass_downsample(backend, TextureFormat::R16Float) {
        return Err(GraphError::DeviceCapability {
            pass: output.to_string(),
            capability: "single-pass downsample (subgroup quads, formatless storage)".to_string(),
        });
    }

    let mut pass = graph.add_pass(output, PipelineStages::COMPUTE);
    let input_tex = pass.add_texture_input(input);

    let dim = pass.get_resource_dimensions(input_tex)?;
    let levels = full_mip_levels(dim.width, dim.height).min(MAX_DOWNSAMPLE_MIPS);

    let output_tex = pass.add_storage_texture_output(
        output,
        AttachmentInfo {
            size_class: SizeClass::InputRelative,
            size_relative_name: Some(input.to_string()),
            format: Some(TextureFormat::R16Float),
            levels,
            ..Default::default()
        },
    );
    let counter = pass.add_storage_output(
        &format!("{output}-counter"),
        BufferInfo {
            size: 4,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        },
    );
    let registers = pass.add_storage_output(
        &format!("{output}-registers"),
        BufferInfo {
            size: std::mem::size_of::<ReduceRegisters>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        },
    );

    let z_transform = params.z_transform.unwrap_or(Mat2::IDENTITY);
    pass.set_build_render_pass(move |ctx| {
        // Per-mip views are built once per bake and cached with the pass
        let num_mips = {
            let Ok(views) = ctx.mip_views::<B>(output_tex) else {
                return;
            };
            views.len() as u32
        };

        let Some(out_dims) = ctx.get_resource_dimensions(output_tex) else {
            return;
        };
        let Some(in_dims) = ctx.get_resource_dimensions(input_tex) else {
            return;
        };
        let Some(counter_buffer) = ctx.get_physical_buffer_resource(counter) else {
            return;
        };
        let Some(register_buffer) = ctx.get_physical_buffer_resource(registers) else {
            return;
        };

        let wg_x = (out_dims.width + 31) / 32;
        let wg_y = (out_dims.height + 31) / 32;
        let push = ReduceRegisters {
            base_resolution: [out_dims.width, out_dims.height],
            inv_resolution: [
                1.0 / in_dims.width.max(1) as f32,
                1.0 / in_dims.height.max(1) as f32,
            ],
            mips: num_mips,
            num_workgroups: wg_x * wg_y,
            z_transform: z_transform.to_cols_array(),
        };

        let Some(backend) = ctx.backend::<B>() else {
            return;
        };
        backend.write_buffer(register_buffer, 0, bytemuck::bytes_of(&push));
        // The cross-workgroup completion counter starts at zero every frame
        backend.write_buffer(counter_buffer, 0, &[0u8; 4]);
        backend.dispatch_compute(wg_x, wg_y, 1);
    });

    Ok(())
}

/// Serialized per-level fallback for devices without the fast path.
///
/// Declares one compute pass per mip level, all writing the same hierarchy
/// resource; same-resource writes are ordered by the graph, which puts a
/// barrier between every two levels.
pub fn setup_depth_hierarchy_fallback<B: GraphicsBackend + 'static>(
    graph: &mut RenderGraph,
    input: &str,
    output: &str,
) -> GraphResult<()> {
    let levels = {
        let mut first = graph.add_pass(&format!("{output}-mip0"), PipelineStages::COMPUTE);
        let input_tex = first.add_texture_input(input);
        let dim = first.get_resource_dimensions(input_tex)?;
        full_mip_levels(dim.width, dim.height).min(MAX_DOWNSAMPLE_MIPS)
    };

    for level in 0..levels {
        let mut pass = graph.add_pass(&format!("{output}-mip{level}"), PipelineStages::COMPUTE);
        if level > 0 {
            // Previous level is read through the same storage image
            pass.add_texture_input(output);
        }
        let output_tex = pass.add_storage_texture_output(
            output,
            AttachmentInfo {
                size_class: SizeClass::InputRelative,
                size_relative_name: Some(input.to_string()),
                format: Some(TextureFormat::R16Float),
                levels,
                ..Default::default()
            },
        );

        pass.set_build_render_pass(move |ctx| {
            let view = {
                let Ok(views) = ctx.mip_views::<B>(output_tex) else {
                    return;
                };
                views.get(level as usize).copied()
            };
            if view.is_none() {
                return;
            }

            let Some(dims) = ctx.get_resource_dimensions(output_tex) else {
                return;
            };
            let mip_w = (dims.width >> level).max(1);
            let mip_h = (dims.height >> level).max(1);

            let Some(backend) = ctx.backend::<B>() else {
                return;
            };
            backend.dispatch_compute((mip_w + 7) / 8, (mip_h + 7) / 8, 1);
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::NullBackend;
    use crate::backend::traits::DeviceFeatures;
    use crate::render_graph::ResourceDimensions;

    fn graph_with_depth(width: u32, height: u32) -> RenderGraph {
        let mut graph = RenderGraph::new();
        graph.set_backbuffer_dimensions(ResourceDimensions {
            width,
            height,
            format: TextureFormat::Bgra8UnormSrgb,
            ..Default::default()
        });
        let mut gbuffer = graph.add_pass("gbuffer", PipelineStages::GRAPHICS);
        gbuffer.add_color_output("backbuffer", AttachmentInfo::default(), None);
        gbuffer.set_depth_stencil_output(
            "depth",
            AttachmentInfo {
                format: Some(TextureFormat::Depth32Float),
                ..Default::default()
            },
        );
        gbuffer.set_build_render_pass(|_| {});
        graph
    }

    #[test]
    fn capability_probe_gates_the_fast_path() {
        let capable = NullBackend::new();
        assert!(supports_single_pass_downsample(
            &capable,
            TextureFormat::R16Float
        ));

        let limited = NullBackend::with_features(DeviceFeatures::none());
        assert!(!supports_single_pass_downsample(
            &limited,
            TextureFormat::R16Float
        ));
    }

    #[test]
    fn fast_path_refusal_is_a_capability_error() {
        let mut graph = graph_with_depth(1920, 1080);
        let backend = NullBackend::with_features(DeviceFeatures::none());
        let err = setup_depth_hierarchy_pass::<NullBackend>(
            &mut graph,
            &backend,
            "depth",
            "depth-hierarchy",
            DepthHierarchyParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::DeviceCapability { .. }));

        // The caller's recovery: declare the serialized chain instead
        setup_depth_hierarchy_fallback::<NullBackend>(&mut graph, "depth", "depth-hierarchy")
            .unwrap();
        graph.bake().unwrap();
    }

    #[test]
    fn hierarchy_levels_follow_the_input_extent() {
        let mut graph = graph_with_depth(513, 300);
        let backend = NullBackend::new();
        setup_depth_hierarchy_pass::<NullBackend>(
            &mut graph,
            &backend,
            "depth",
            "depth-hierarchy",
            DepthHierarchyParams::default(),
        )
        .unwrap();
        graph.bake().unwrap();

        let id = graph.find_resource("depth-hierarchy").unwrap();
        let dims = graph.get_resource_dimensions(id).unwrap();
        assert_eq!(dims.levels, 9);
    }
}
