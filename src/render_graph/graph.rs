//! Render graph definition and baking
//!
//! Passes declare what they read and write; `bake()` compiles those
//! declarations into an execution plan (order, physical assignment,
//! barriers) that frames replay until the topology changes.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::dependency::build_dependencies;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::executor::{Executor, RecordContext};
use crate::render_graph::pass::{
    PassId, PassImplementation, PassRecorder, RenderGraphPass,
};
use crate::render_graph::physical::{assign_physical, compute_lifetimes, PhysicalSlotKind};
use crate::render_graph::resource::{
    AttachmentInfo, BufferInfo, ResourceDimensions, ResourceId, ResourceRegistry,
};
use crate::render_graph::schedule::{plan_barriers, topological_order, ExecutionPlan};
use std::collections::HashMap;

/// Deployment-time override for the backbuffer's logical source name
pub const BACKBUFFER_SOURCE_ENV: &str = "FRAME_GRAPH_SURFACE";

const DEFAULT_BACKBUFFER_SOURCE: &str = "backbuffer";

/// The main render graph structure
pub struct RenderGraph {
    resources: ResourceRegistry,
    passes: Vec<RenderGraphPass>,
    pass_lookup: HashMap<String, usize>,
    backbuffer_dimensions: ResourceDimensions,
    backbuffer_source: String,
    plan: Option<ExecutionPlan>,
    bake_counter: u64,
    executor: Executor,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            resources: ResourceRegistry::new(),
            passes: Vec::new(),
            pass_lookup: HashMap::new(),
            backbuffer_dimensions: ResourceDimensions::default(),
            backbuffer_source: DEFAULT_BACKBUFFER_SOURCE.to_string(),
            plan: None,
            bake_counter: 0,
            executor: Executor::new(),
        }
    }

    /// Extent and format the swapchain-relative size policy resolves against
    pub fn set_backbuffer_dimensions(&mut self, dimensions: ResourceDimensions) {
        self.backbuffer_dimensions = dimensions;
    }

    pub fn backbuffer_dimensions(&self) -> ResourceDimensions {
        self.backbuffer_dimensions
    }

    /// Name of the logical resource presented to the swapchain. The
    /// `FRAME_GRAPH_SURFACE` environment variable overrides this at bake.
    pub fn set_backbuffer_source(&mut self, name: &str) {
        self.backbuffer_source = name.to_string();
    }

    /// Add a pass, or return a builder for the existing pass of that name.
    pub fn add_pass(&mut self, name: &str, stages: PipelineStages) -> PassBuilder<'_> {
        let index = match self.pass_lookup.get(name) {
            Some(&index) => index,
            None => {
                let index = self.passes.len();
                self.passes.push(RenderGraphPass::new(name, stages));
                self.pass_lookup.insert(name.to_string(), index);
                index
            }
        };
        PassBuilder { graph: self, index }
    }

    pub fn find_pass(&self, name: &str) -> Option<PassId> {
        self.pass_lookup.get(name).map(|&i| PassId(i as u32))
    }

    pub fn find_resource(&self, name: &str) -> Option<ResourceId> {
        self.resources.find(name)
    }

    /// Resolve a resource's dimensions against the current backbuffer.
    /// Usable during graph construction, before `bake()`.
    pub fn get_resource_dimensions(&self, id: ResourceId) -> GraphResult<ResourceDimensions> {
        self.resources
            .resolve_dimensions(id, &self.backbuffer_dimensions)
    }

    /// The baked plan, if the last `bake()` succeeded
    pub fn execution_plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    /// Physical slot a logical resource was assigned by the last bake
    pub fn physical_slot(&self, id: ResourceId) -> Option<usize> {
        self.plan
            .as_ref()?
            .assignments
            .get(id.index())
            .copied()
            .flatten()
    }

    /// Scheduled lifetime interval of a logical resource, as positions in
    /// the execution order
    pub fn resource_lifetime(&self, id: ResourceId) -> Option<(usize, usize)> {
        self.plan
            .as_ref()?
            .lifetimes
            .get(id.index())
            .copied()
            .flatten()
    }

    /// Scheduled pass names in execution order
    pub fn scheduled_passes(&self) -> Option<Vec<&str>> {
        self.plan.as_ref().map(|plan| {
            plan.steps
                .iter()
                .map(|step| self.passes[step.pass].name())
                .collect()
        })
    }

    /// Compile declarations into an execution plan.
    ///
    /// Runs dependency analysis, scheduling, physical assignment and barrier
    /// planning. On failure the previously baked plan stays in place.
    pub fn bake(&mut self) -> GraphResult<()> {
        for pass in &self.passes {
            if pass.recorder_conflict || !pass.recorder.is_set() {
                return Err(GraphError::InvalidPassRecorder {
                    pass: pass.name().to_string(),
                });
            }
        }

        let source = std::env::var(BACKBUFFER_SOURCE_ENV)
            .unwrap_or_else(|_| self.backbuffer_source.clone());
        let backbuffer = self
            .resources
            .find(&source)
            .filter(|&id| {
                self.resources
                    .get(id)
                    .map(|res| !res.written_in.is_empty())
                    .unwrap_or(false)
            })
            .ok_or_else(|| GraphError::MissingBackbufferSource {
                backbuffer: source.clone(),
            })?;

        self.resources.clear_external_flags();
        self.resources.set_external(backbuffer);

        let dimensions = self.resources.resolve_all(&self.backbuffer_dimensions)?;
        let deps = build_dependencies(&self.passes, &self.resources);
        let order = topological_order(&self.passes, &deps)?;
        let lifetimes = compute_lifetimes(&self.resources, &order);
        let physical = assign_physical(&self.resources, &dimensions, &lifetimes)?;
        let steps = plan_barriers(
            &self.passes,
            &order,
            &physical.assignments,
            &physical.roots,
            physical.slots.len(),
        );

        self.bake_counter += 1;
        self.plan = Some(ExecutionPlan {
            steps,
            assignments: physical.assignments,
            slots: physical.slots,
            lifetimes: physical.lifetimes,
            dimensions,
            backbuffer: backbuffer.index(),
            generation: self.bake_counter,
        });
        Ok(())
    }

    /// Discard all declarations, the plan, physical allocations and
    /// pass-cached transient state. Required when backbuffer geometry or
    /// format changes; redeclare and `bake()` again afterwards.
    pub fn reset(&mut self) {
        self.passes.clear();
        self.pass_lookup.clear();
        self.resources.clear();
        self.plan = None;
        self.executor.reset();
    }

    /// Bind the frame's external view (the swap-chain image) and make sure
    /// physical storage matches the current plan. Cheap when nothing
    /// changed; expected every frame.
    pub fn setup_attachments<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        external_view: TextureViewHandle,
    ) -> GraphResult<()> {
        let Some(plan) = self.plan.as_ref() else {
            return Err(GraphError::NotBaked);
        };
        self.executor
            .setup_attachments(backend, plan, self.passes.len(), external_view)
    }

    /// Execute the plan: issue recorded barriers, bind attachments and call
    /// back into each pass's recording logic, in scheduled order.
    pub fn enqueue_render_passes<B: GraphicsBackend + 'static>(
        &mut self,
        backend: &mut B,
    ) -> GraphResult<()> {
        let Some(plan) = self.plan.as_ref() else {
            return Err(GraphError::NotBaked);
        };
        self.executor.enqueue(backend, plan, &mut self.passes)
    }

    /// Destroy every physical allocation this graph holds on the device.
    pub fn release_resources<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.executor.destroy(backend);
    }

    /// Dump the resolved plan through the logging facade.
    pub fn log(&self) {
        let Some(plan) = self.plan.as_ref() else {
            log::info!("render graph: not baked");
            return;
        };

        log::info!("render graph: {} scheduled passes", plan.steps.len());
        for (position, step) in plan.steps.iter().enumerate() {
            let pass = &self.passes[step.pass];
            log::info!(
                "  [{position}] {} ({:?} queue)",
                pass.name(),
                pass.stages().queue_family()
            );
            for barrier in &step.barriers {
                log::info!(
                    "    barrier: {} {:?} src={:?} dst={:?} transfer={:?}",
                    self.resources.by_index(barrier.resource).name(),
                    barrier.kind,
                    barrier.src_stages,
                    barrier.dst_stages,
                    barrier.queue_transfer
                );
            }
        }

        log::info!("render graph: {} physical slots", plan.slots.len());
        for (index, slot) in plan.slots.iter().enumerate() {
            let aliases: Vec<&str> = plan
                .assignments
                .iter()
                .enumerate()
                .filter(|&(_, &assigned)| assigned == Some(index))
                .map(|(resource, _)| self.resources.by_index(resource).name())
                .collect();
            match &slot.kind {
                PhysicalSlotKind::Texture(desc) => log::info!(
                    "  [{index}] texture {}x{} levels={} {:?}{} <- {}",
                    desc.width,
                    desc.height,
                    desc.mip_levels,
                    desc.format,
                    if slot.external { " (external)" } else { "" },
                    aliases.join(", ")
                ),
                PhysicalSlotKind::Buffer(desc) => log::info!(
                    "  [{index}] buffer {} bytes <- {}",
                    desc.size,
                    aliases.join(", ")
                ),
            }
        }
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Declares one pass's inputs, outputs and recording logic
pub struct PassBuilder<'a> {
    graph: &'a mut RenderGraph,
    index: usize,
}

impl<'a> PassBuilder<'a> {
    pub fn id(&self) -> PassId {
        PassId(self.index as u32)
    }

    /// Resolve a declared resource's dimensions mid-construction, e.g. to
    /// size a hierarchical output from its input's extent.
    pub fn get_resource_dimensions(&self, id: ResourceId) -> GraphResult<ResourceDimensions> {
        self.graph.get_resource_dimensions(id)
    }

    /// Declare a color output. With `alias_input`, the output reuses the
    /// named input's storage: the pass reads the old contents and writes the
    /// result in place (e.g. in-place tonemapping).
    pub fn add_color_output(
        &mut self,
        name: &str,
        info: AttachmentInfo,
        alias_input: Option<&str>,
    ) -> ResourceId {
        let id = self.graph.resources.declare_texture(name, Some(info));
        self.graph
            .resources
            .add_texture_usage(id, TextureUsage::RENDER_ATTACHMENT);
        self.graph.resources.record_write(id, self.index);

        let alias = alias_input.map(|input| {
            let input_id = self.graph.resources.declare_texture(input, None);
            self.graph
                .resources
                .add_texture_usage(input_id, TextureUsage::RENDER_ATTACHMENT);
            self.graph.resources.record_read(input_id, self.index);
            // Same-name in-place writes need no alias link; distinct names
            // are pinned to one storage
            if input_id != id {
                if let Some(res) = self.graph.resources.get_mut(id) {
                    res.alias_of = Some(input_id.index());
                }
            }
            input_id
        });

        let pass = &mut self.graph.passes[self.index];
        pass.color_outputs.push(id);
        pass.color_inputs.push(alias);
        id
    }

    pub fn set_depth_stencil_output(&mut self, name: &str, info: AttachmentInfo) -> ResourceId {
        let id = self.graph.resources.declare_texture(name, Some(info));
        self.graph
            .resources
            .add_texture_usage(id, TextureUsage::RENDER_ATTACHMENT);
        self.graph.resources.record_write(id, self.index);
        self.graph.passes[self.index].depth_stencil_output = Some(id);
        id
    }

    pub fn set_depth_stencil_input(&mut self, name: &str) -> ResourceId {
        let id = self.graph.resources.declare_texture(name, None);
        self.graph
            .resources
            .add_texture_usage(id, TextureUsage::RENDER_ATTACHMENT);
        self.graph.resources.record_read(id, self.index);
        self.graph.passes[self.index].depth_stencil_input = Some(id);
        id
    }

    /// Read-only attachment binding to another pass's output, for
    /// subpass-style fusion without an intermediate copy
    pub fn add_attachment_input(&mut self, name: &str) -> ResourceId {
        let id = self.graph.resources.declare_texture(name, None);
        self.graph
            .resources
            .add_texture_usage(id, TextureUsage::INPUT_ATTACHMENT);
        self.graph.resources.record_read(id, self.index);
        self.graph.passes[self.index].attachment_inputs.push(id);
        id
    }

    pub fn add_texture_input(&mut self, name: &str) -> ResourceId {
        let id = self.graph.resources.declare_texture(name, None);
        self.graph
            .resources
            .add_texture_usage(id, TextureUsage::TEXTURE_BINDING);
        self.graph.resources.record_read(id, self.index);
        self.graph.passes[self.index].texture_inputs.push(id);
        id
    }

    pub fn add_storage_texture_output(&mut self, name: &str, info: AttachmentInfo) -> ResourceId {
        let id = self.graph.resources.declare_texture(name, Some(info));
        self.graph
            .resources
            .add_texture_usage(id, TextureUsage::STORAGE_BINDING);
        self.graph.resources.record_write(id, self.index);
        self.graph.passes[self.index]
            .storage_texture_outputs
            .push(id);
        id
    }

    pub fn add_storage_output(&mut self, name: &str, info: BufferInfo) -> ResourceId {
        let id = self.graph.resources.declare_buffer(name, Some(info));
        self.graph
            .resources
            .add_buffer_usage(id, BufferUsage::STORAGE);
        self.graph.resources.record_write(id, self.index);
        self.graph.passes[self.index].storage_outputs.push(id);
        id
    }

    /// Attach the per-frame recording callback. Mutually exclusive with
    /// [`Self::set_implementation`]; exactly one must be set before `bake()`.
    pub fn set_build_render_pass(
        &mut self,
        callback: impl FnMut(&mut RecordContext<'_>) + 'static,
    ) {
        let pass = &mut self.graph.passes[self.index];
        if pass.recorder.is_set() {
            pass.recorder_conflict = true;
        }
        pass.recorder = PassRecorder::Callback(Box::new(callback));
    }

    /// Attach an externally defined implementation. Mutually exclusive with
    /// [`Self::set_build_render_pass`].
    pub fn set_implementation(&mut self, implementation: Box<dyn PassImplementation>) {
        let pass = &mut self.graph.passes[self.index];
        if pass.recorder.is_set() {
            pass.recorder_conflict = true;
        }
        pass.recorder = PassRecorder::Implementation(implementation);
    }
}
