//! Render graph executor
//!
//! Owns the device side of a baked plan: physical allocations, the per-frame
//! external binding, and per-pass transient state. Frame execution is one
//! sequential walk over the plan; all decisions were made at bake.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::pass::{PassRecorder, RenderGraphPass};
use crate::render_graph::physical::PhysicalSlotKind;
use crate::render_graph::resource::{ResourceDimensions, ResourceId};
use crate::render_graph::schedule::{ExecutionPlan, PlannedBarrierKind};
use std::any::Any;
use std::collections::HashMap;

/// Pass-local state rebuilt lazily after each bake
pub(crate) struct PassTransientState {
    /// Per-mip views derived from a resource's physical texture, keyed by
    /// logical resource index
    mip_views: HashMap<usize, Vec<TextureViewHandle>>,
}

impl PassTransientState {
    fn new() -> Self {
        Self {
            mip_views: HashMap::new(),
        }
    }
}

/// Physical storage materialized for one bake generation
struct PhysicalStorage {
    /// 0 marks "nothing allocated"; valid plans start at generation 1
    generation: u64,
    textures: Vec<Option<TextureHandle>>,
    views: Vec<Option<TextureViewHandle>>,
    buffers: Vec<Option<BufferHandle>>,
}

impl PhysicalStorage {
    fn empty() -> Self {
        Self {
            generation: 0,
            textures: Vec::new(),
            views: Vec::new(),
            buffers: Vec::new(),
        }
    }
}

/// Device-facing half of the render graph
pub(crate) struct Executor {
    storage: PhysicalStorage,
    transient: Vec<PassTransientState>,
    /// Handles whose plan went away before a device was available to
    /// destroy them; flushed on the next device touchpoint
    stale_textures: Vec<TextureHandle>,
    stale_buffers: Vec<BufferHandle>,
}

impl Executor {
    pub(crate) fn new() -> Self {
        Self {
            storage: PhysicalStorage::empty(),
            transient: Vec::new(),
            stale_textures: Vec::new(),
            stale_buffers: Vec::new(),
        }
    }

    /// Forget the current allocations; they are destroyed at the next
    /// device touchpoint.
    pub(crate) fn reset(&mut self) {
        let storage = std::mem::replace(&mut self.storage, PhysicalStorage::empty());
        self.stale_textures
            .extend(storage.textures.into_iter().flatten());
        self.stale_buffers
            .extend(storage.buffers.into_iter().flatten());
        self.transient.clear();
    }

    /// Destroy everything this executor still holds on the device.
    pub(crate) fn destroy<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.reset();
        self.flush_stale(backend);
    }

    fn flush_stale<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for texture in self.stale_textures.drain(..) {
            backend.destroy_texture(texture);
        }
        for buffer in self.stale_buffers.drain(..) {
            backend.destroy_buffer(buffer);
        }
    }

    /// Bind frame-varying externals and (re)materialize physical storage if
    /// the plan changed since the last call.
    pub(crate) fn setup_attachments<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        plan: &ExecutionPlan,
        pass_count: usize,
        external_view: TextureViewHandle,
    ) -> GraphResult<()> {
        self.flush_stale(backend);

        if self.storage.generation != plan.generation {
            self.reset();
            self.flush_stale(backend);

            let count = plan.slots.len();
            let mut textures = vec![None; count];
            let mut views = vec![None; count];
            let mut buffers = vec![None; count];

            for (index, slot) in plan.slots.iter().enumerate() {
                if slot.external {
                    continue;
                }
                match &slot.kind {
                    PhysicalSlotKind::Texture(desc) => {
                        let texture = backend.create_texture(desc)?;
                        let view = backend.create_texture_view(texture)?;
                        textures[index] = Some(texture);
                        views[index] = Some(view);
                    }
                    PhysicalSlotKind::Buffer(desc) => {
                        buffers[index] = Some(backend.create_buffer(desc)?);
                    }
                }
            }

            self.storage = PhysicalStorage {
                generation: plan.generation,
                textures,
                views,
                buffers,
            };
            self.transient = (0..pass_count).map(|_| PassTransientState::new()).collect();
        }

        for (index, slot) in plan.slots.iter().enumerate() {
            if slot.external {
                self.storage.views[index] = Some(external_view);
            }
        }

        Ok(())
    }

    /// Walk the plan: issue recorded barriers, bind attachments and invoke
    /// each pass's recording logic.
    pub(crate) fn enqueue<B: GraphicsBackend + 'static>(
        &mut self,
        backend: &mut B,
        plan: &ExecutionPlan,
        passes: &mut [RenderGraphPass],
    ) -> GraphResult<()> {
        if self.storage.generation != plan.generation {
            return Err(GraphError::AttachmentsNotBound);
        }

        for step in &plan.steps {
            for barrier in &step.barriers {
                // External images arrive through the per-frame binding and
                // carry no texture handle; their initialization is covered
                // by attachment load ops
                let resolved = match barrier.kind {
                    PlannedBarrierKind::Texture {
                        old_layout,
                        new_layout,
                    } => {
                        let Some(texture) = self.storage.textures[barrier.physical] else {
                            continue;
                        };
                        Barrier::Texture(TextureBarrier {
                            texture,
                            old_layout,
                            new_layout,
                            src_stages: barrier.src_stages,
                            dst_stages: barrier.dst_stages,
                            queue_transfer: barrier.queue_transfer,
                        })
                    }
                    PlannedBarrierKind::Buffer => {
                        let Some(buffer) = self.storage.buffers[barrier.physical] else {
                            continue;
                        };
                        Barrier::Buffer(BufferBarrier {
                            buffer,
                            src_stages: barrier.src_stages,
                            dst_stages: barrier.dst_stages,
                            queue_transfer: barrier.queue_transfer,
                        })
                    }
                };
                backend.cmd_barrier(&resolved);
            }

            let pass = &mut passes[step.pass];
            let (width, height) = render_area(pass, plan);

            let descriptor = if pass.has_attachments() {
                Some(self.render_pass_descriptor(pass, plan)?)
            } else {
                None
            };

            match &descriptor {
                Some(desc) => backend.begin_render_pass(desc),
                None => backend.begin_compute_pass(Some(pass.name())),
            }

            {
                let mut ctx = RecordContext {
                    backend: backend as &mut dyn Any,
                    width,
                    height,
                    plan,
                    textures: &self.storage.textures,
                    views: &self.storage.views,
                    buffers: &self.storage.buffers,
                    transient: &mut self.transient[step.pass],
                };
                match &mut pass.recorder {
                    PassRecorder::Callback(callback) => callback(&mut ctx),
                    PassRecorder::Implementation(imp) => imp.build_render_pass(&mut ctx),
                    PassRecorder::Unset => {}
                }
            }

            match &descriptor {
                Some(_) => backend.end_render_pass(),
                None => backend.end_compute_pass(),
            }
        }

        Ok(())
    }

    fn view_for(&self, plan: &ExecutionPlan, id: ResourceId) -> GraphResult<TextureViewHandle> {
        plan.assignments[id.index()]
            .and_then(|slot| self.storage.views[slot])
            .ok_or_else(|| {
                GraphError::Backend(BackendError::TextureViewCreationFailed(format!(
                    "no bound view for resource at index {}",
                    id.index()
                )))
            })
    }

    fn render_pass_descriptor(
        &self,
        pass: &RenderGraphPass,
        plan: &ExecutionPlan,
    ) -> GraphResult<RenderPassDescriptor> {
        let mut color_attachments = Vec::with_capacity(pass.color_outputs.len());
        for (index, id) in pass.color_outputs.iter().enumerate() {
            let view = self.view_for(plan, *id)?;
            let load_op = match pass.get_clear_color(index) {
                Some(color) => LoadOp::Clear(color),
                // A read-modify-write output starts from the aliased input's
                // contents; a fresh target starts cleared
                None if pass.color_inputs[index].is_some() => LoadOp::Load,
                None => LoadOp::Clear([0.0, 0.0, 0.0, 0.0]),
            };
            color_attachments.push(ColorAttachment {
                view,
                load_op,
                store_op: StoreOp::Store,
            });
        }

        let depth_stencil_attachment = match (pass.depth_stencil_output, pass.depth_stencil_input)
        {
            (Some(out), input) => {
                let view = self.view_for(plan, out)?;
                let (load_op, depth_clear, stencil_clear) = match pass.get_clear_depth_stencil() {
                    Some((depth, stencil)) => (LoadOp::Clear([depth; 4]), depth, stencil),
                    None if input.is_some() => (LoadOp::Load, 1.0, 0),
                    None => (LoadOp::Clear([1.0; 4]), 1.0, 0),
                };
                Some(DepthStencilAttachment {
                    view,
                    depth_load_op: load_op,
                    depth_store_op: StoreOp::Store,
                    depth_clear_value: depth_clear,
                    stencil_clear_value: stencil_clear,
                    read_only: false,
                })
            }
            (None, Some(input)) => {
                let view = self.view_for(plan, input)?;
                Some(DepthStencilAttachment {
                    view,
                    depth_load_op: LoadOp::Load,
                    depth_store_op: StoreOp::Store,
                    depth_clear_value: 1.0,
                    stencil_clear_value: 0,
                    read_only: true,
                })
            }
            (None, None) => None,
        };

        Ok(RenderPassDescriptor {
            label: Some(pass.name().to_string()),
            color_attachments,
            depth_stencil_attachment,
        })
    }
}

fn render_area(pass: &RenderGraphPass, plan: &ExecutionPlan) -> (u32, u32) {
    let attachment = pass
        .color_outputs
        .first()
        .copied()
        .or(pass.depth_stencil_output)
        .or(pass.depth_stencil_input);
    match attachment {
        Some(id) => {
            let dims = &plan.dimensions[id.index()];
            (dims.width, dims.height)
        }
        None => (0, 0),
    }
}

/// Command-recording context handed to a pass's callback or implementation.
///
/// Resolved physical handles looked up here are only valid for the duration
/// of the callback; the same storage may back a different logical resource
/// after the next bake.
pub struct RecordContext<'a> {
    backend: &'a mut dyn Any,
    width: u32,
    height: u32,
    plan: &'a ExecutionPlan,
    textures: &'a [Option<TextureHandle>],
    views: &'a [Option<TextureViewHandle>],
    buffers: &'a [Option<BufferHandle>],
    transient: &'a mut PassTransientState,
}

impl<'a> RecordContext<'a> {
    /// The concrete backend, when the caller knows which one is running
    pub fn backend<B: GraphicsBackend + 'static>(&mut self) -> Option<&mut B> {
        self.backend.downcast_mut::<B>()
    }

    /// Render area width of the current pass
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Render area height of the current pass
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The view bound for a logical texture this frame
    pub fn get_physical_texture_resource(&self, id: ResourceId) -> Option<TextureViewHandle> {
        plan_slot(self.plan, id).and_then(|slot| self.views[slot])
    }

    /// The buffer bound for a logical buffer this frame
    pub fn get_physical_buffer_resource(&self, id: ResourceId) -> Option<BufferHandle> {
        plan_slot(self.plan, id).and_then(|slot| self.buffers[slot])
    }

    /// Resolved dimensions of a logical resource
    pub fn get_resource_dimensions(&self, id: ResourceId) -> Option<ResourceDimensions> {
        self.plan.dimensions.get(id.index()).copied()
    }

    /// Per-mip views of a resource's physical texture, created on first use
    /// after a bake and cached for the plan's lifetime.
    pub fn mip_views<B: GraphicsBackend + 'static>(
        &mut self,
        id: ResourceId,
    ) -> GraphResult<&[TextureViewHandle]> {
        let index = id.index();
        if !self.transient.mip_views.contains_key(&index) {
            let texture = plan_slot(self.plan, id)
                .and_then(|slot| self.textures[slot])
                .ok_or_else(|| {
                    BackendError::TextureViewCreationFailed(format!(
                        "no physical texture for resource at index {index}"
                    ))
                })?;
            let levels = self.plan.dimensions[index].levels;
            let backend = self.backend.downcast_mut::<B>().ok_or_else(|| {
                BackendError::InitializationFailed("backend type mismatch".into())
            })?;
            let views = (0..levels)
                .map(|level| backend.create_texture_view_for_mip(texture, level))
                .collect::<BackendResult<Vec<_>>>()?;
            self.transient.mip_views.insert(index, views);
        }
        Ok(self
            .transient
            .mip_views
            .get(&index)
            .map(|views| views.as_slice())
            .unwrap_or(&[]))
    }
}

fn plan_slot(plan: &ExecutionPlan, id: ResourceId) -> Option<usize> {
    plan.assignments.get(id.index()).copied().flatten()
}
