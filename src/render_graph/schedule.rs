//! Pass scheduling and barrier planning
//!
//! Turns the dependency DAG into one linear execution order and decides,
//! per scheduled pass, which layout transitions, memory barriers and
//! queue-ownership transfers must be issued immediately before it. All of
//! this happens once at bake; frame time only replays the plan.

use crate::backend::types::*;
use crate::render_graph::dependency::PassDependencies;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::pass::RenderGraphPass;
use crate::render_graph::physical::PhysicalSlot;
use crate::render_graph::resource::ResourceDimensions;
use std::collections::{BinaryHeap, HashSet};

/// One resource access a pass performs, in plan terms
#[derive(Debug, Clone, Copy)]
pub(crate) struct Access {
    pub resource: usize,
    pub layout: ImageLayout,
    pub write: bool,
    pub is_buffer: bool,
}

/// Enumerate a pass's accesses in a fixed canonical order so replanning an
/// unchanged graph reproduces identical barrier lists.
pub(crate) fn pass_accesses(pass: &RenderGraphPass) -> Vec<Access> {
    let mut accesses = Vec::new();
    let mut covered: HashSet<usize> = HashSet::new();

    // Color outputs; a read-modify-write output loads the aliased input
    // through the same attachment, so one write access covers both names
    for (slot, id) in pass.color_outputs.iter().enumerate() {
        accesses.push(Access {
            resource: id.index(),
            layout: ImageLayout::ColorAttachment,
            write: true,
            is_buffer: false,
        });
        covered.insert(id.index());
        if let Some(alias) = pass.color_inputs[slot] {
            covered.insert(alias.index());
        }
    }

    match (pass.depth_stencil_output, pass.depth_stencil_input) {
        (Some(out), _) => {
            accesses.push(Access {
                resource: out.index(),
                layout: ImageLayout::DepthStencilAttachment,
                write: true,
                is_buffer: false,
            });
            covered.insert(out.index());
            if let Some(input) = pass.depth_stencil_input {
                covered.insert(input.index());
            }
        }
        (None, Some(input)) => {
            accesses.push(Access {
                resource: input.index(),
                layout: ImageLayout::DepthStencilReadOnly,
                write: false,
                is_buffer: false,
            });
            covered.insert(input.index());
        }
        (None, None) => {}
    }

    // Storage writes take precedence: a pass reading and writing the same
    // texture through storage accesses it in one read-write layout
    for id in &pass.storage_texture_outputs {
        if covered.insert(id.index()) {
            accesses.push(Access {
                resource: id.index(),
                layout: ImageLayout::StorageReadWrite,
                write: true,
                is_buffer: false,
            });
        }
    }

    for id in &pass.storage_outputs {
        if covered.insert(id.index()) {
            accesses.push(Access {
                resource: id.index(),
                layout: ImageLayout::Undefined,
                write: true,
                is_buffer: true,
            });
        }
    }

    for id in pass
        .attachment_inputs
        .iter()
        .chain(pass.texture_inputs.iter())
    {
        if covered.insert(id.index()) {
            accesses.push(Access {
                resource: id.index(),
                layout: ImageLayout::ShaderSampled,
                write: false,
                is_buffer: false,
            });
        }
    }

    accesses
}

/// One topological order over the DAG, breaking ties by declaration index.
///
/// Stability matters: re-baking an unchanged graph must reproduce the same
/// order because passes cache per-bake state keyed on it.
pub(crate) fn topological_order(
    passes: &[RenderGraphPass],
    deps: &PassDependencies,
) -> GraphResult<Vec<usize>> {
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); passes.len()];
    let mut in_degree: Vec<usize> = vec![0; passes.len()];
    for (pass, prerequisites) in deps.iter().enumerate() {
        in_degree[pass] = prerequisites.len();
        for &p in prerequisites {
            dependents[p].push(pass);
        }
    }

    // Min-heap on declaration index keeps ties deterministic
    let mut ready: BinaryHeap<std::cmp::Reverse<usize>> = (0..passes.len())
        .filter(|&p| in_degree[p] == 0)
        .map(std::cmp::Reverse)
        .collect();

    let mut order = Vec::with_capacity(passes.len());
    while let Some(std::cmp::Reverse(pass)) = ready.pop() {
        order.push(pass);
        for &dep in &dependents[pass] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                ready.push(std::cmp::Reverse(dep));
            }
        }
    }

    if order.len() < passes.len() {
        return Err(GraphError::GraphCycle {
            pass: passes[find_cycle_member(deps, &order)].name().to_string(),
        });
    }

    Ok(order)
}

/// Walk the unscheduled remainder until a pass repeats; that pass sits on a
/// cycle.
fn find_cycle_member(deps: &PassDependencies, scheduled: &[usize]) -> usize {
    let done: HashSet<usize> = scheduled.iter().copied().collect();
    let mut current = (0..deps.len())
        .find(|p| !done.contains(p))
        .unwrap_or_default();

    let mut seen = HashSet::new();
    while seen.insert(current) {
        match deps[current].iter().find(|p| !done.contains(p)) {
            Some(&next) => current = next,
            None => break,
        }
    }
    current
}

/// Synchronization point recorded ahead of a scheduled pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedBarrier {
    /// Logical resource whose access forced the barrier
    pub resource: usize,
    /// Physical slot the barrier applies to
    pub physical: usize,
    pub kind: PlannedBarrierKind,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub queue_transfer: Option<(QueueFamily, QueueFamily)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedBarrierKind {
    Texture {
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    },
    Buffer,
}

/// One entry of the execution plan: a pass and the barriers to issue
/// immediately before it runs
#[derive(Debug, Clone)]
pub struct ScheduledPass {
    pub pass: usize,
    pub barriers: Vec<PlannedBarrier>,
}

/// The baked, read-only execution plan
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub steps: Vec<ScheduledPass>,
    /// Logical resource index -> physical slot
    pub assignments: Vec<Option<usize>>,
    pub slots: Vec<PhysicalSlot>,
    /// Logical resource index -> [first, last] scheduled position
    pub lifetimes: Vec<Option<(usize, usize)>>,
    /// Logical resource index -> resolved size/format
    pub dimensions: Vec<ResourceDimensions>,
    /// Logical index of the backbuffer source resource
    pub backbuffer: usize,
    /// Bake counter this plan was produced by; tags physical allocations
    /// and pass-cached transient state
    pub generation: u64,
}

/// Tracked state of one physical slot while planning barriers
struct SlotState {
    accessed: bool,
    written: bool,
    layout: ImageLayout,
    stages: PipelineStages,
    queue: QueueFamily,
    /// Logical resource currently occupying the slot; a change of occupant
    /// discards contents
    owner: usize,
}

impl SlotState {
    fn fresh() -> Self {
        Self {
            accessed: false,
            written: false,
            layout: ImageLayout::Undefined,
            stages: PipelineStages::empty(),
            queue: QueueFamily::Graphics,
            owner: usize::MAX,
        }
    }
}

/// Walk the scheduled order once and record the minimal synchronization in
/// front of each pass.
pub(crate) fn plan_barriers(
    passes: &[RenderGraphPass],
    order: &[usize],
    assignments: &[Option<usize>],
    roots: &[usize],
    slot_count: usize,
) -> Vec<ScheduledPass> {
    let mut states: Vec<SlotState> = (0..slot_count).map(|_| SlotState::fresh()).collect();
    let mut steps = Vec::with_capacity(order.len());

    for &pass_index in order {
        let pass = &passes[pass_index];
        let queue = pass.stages.queue_family();
        let mut barriers = Vec::new();

        for access in pass_accesses(pass) {
            let Some(physical) = assignments[access.resource] else {
                continue;
            };
            // Accesses within one read-modify-write alias group inherit the
            // contents; only a genuinely different occupant discards them
            let root = roots[access.resource];
            let state = &mut states[physical];
            let handoff = state.accessed && state.owner != root;
            let crosses_queue = state.accessed && state.queue != queue;

            if access.is_buffer {
                if state.written || (access.write && state.accessed) || crosses_queue {
                    barriers.push(PlannedBarrier {
                        resource: access.resource,
                        physical,
                        kind: PlannedBarrierKind::Buffer,
                        src_stages: state.stages,
                        dst_stages: pass.stages,
                        queue_transfer: crosses_queue.then_some((state.queue, queue)),
                    });
                }
            } else {
                // Alias handoffs re-enter through Undefined: the incoming
                // logical resource must not inherit the old contents
                let old_layout = if !state.accessed || handoff {
                    ImageLayout::Undefined
                } else {
                    state.layout
                };
                let needs_transition = old_layout != access.layout || handoff || !state.accessed;
                let needs_memory =
                    state.written || (access.write && state.accessed) || crosses_queue;
                if needs_transition || needs_memory {
                    barriers.push(PlannedBarrier {
                        resource: access.resource,
                        physical,
                        kind: PlannedBarrierKind::Texture {
                            old_layout,
                            new_layout: access.layout,
                        },
                        src_stages: state.stages,
                        dst_stages: pass.stages,
                        queue_transfer: crosses_queue.then_some((state.queue, queue)),
                    });
                }
            }

            state.accessed = true;
            state.written = access.write;
            state.layout = access.layout;
            state.stages = pass.stages;
            state.queue = queue;
            state.owner = root;
        }

        steps.push(ScheduledPass {
            pass: pass_index,
            barriers,
        });
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::dependency::build_dependencies;
    use crate::render_graph::resource::ResourceRegistry;

    fn pass(name: &str) -> RenderGraphPass {
        RenderGraphPass::new(name, PipelineStages::GRAPHICS)
    }

    #[test]
    fn declaration_order_breaks_ties() {
        // No dependencies at all: the schedule must be declaration order
        let passes = vec![pass("c"), pass("a"), pass("b")];
        let deps: PassDependencies = vec![Default::default(); 3];
        let order = topological_order(&passes, &deps).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn cycle_is_reported_with_a_pass_on_it() {
        let passes = vec![pass("a"), pass("b")];
        let mut resources = ResourceRegistry::new();
        let x = resources.declare_texture("x", None);
        let y = resources.declare_texture("y", None);
        // a: reads y, writes x; b: reads x, writes y
        resources.record_read(y, 0);
        resources.record_write(x, 0);
        resources.record_read(x, 1);
        resources.record_write(y, 1);

        let deps = build_dependencies(&passes, &resources);
        let err = topological_order(&passes, &deps).unwrap_err();
        match err {
            GraphError::GraphCycle { pass } => assert!(pass == "a" || pass == "b"),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn write_then_read_gets_a_layout_transition() {
        let mut writer = pass("writer");
        writer.color_outputs.push(crate::render_graph::ResourceId(0));
        writer.color_inputs.push(None);
        let mut reader = pass("reader");
        reader.texture_inputs.push(crate::render_graph::ResourceId(0));

        let passes = vec![writer, reader];
        let steps = plan_barriers(&passes, &[0, 1], &[Some(0)], &[0], 1);

        // Initialization transition in front of the writer
        assert_eq!(steps[0].barriers.len(), 1);
        assert_eq!(
            steps[0].barriers[0].kind,
            PlannedBarrierKind::Texture {
                old_layout: ImageLayout::Undefined,
                new_layout: ImageLayout::ColorAttachment,
            }
        );

        // Write -> read transition in front of the reader
        assert_eq!(steps[1].barriers.len(), 1);
        assert_eq!(
            steps[1].barriers[0].kind,
            PlannedBarrierKind::Texture {
                old_layout: ImageLayout::ColorAttachment,
                new_layout: ImageLayout::ShaderSampled,
            }
        );
    }

    #[test]
    fn back_to_back_reads_need_no_barrier() {
        let mut writer = pass("writer");
        writer.color_outputs.push(crate::render_graph::ResourceId(0));
        writer.color_inputs.push(None);
        let mut first = pass("first-reader");
        first.texture_inputs.push(crate::render_graph::ResourceId(0));
        let mut second = pass("second-reader");
        second.texture_inputs.push(crate::render_graph::ResourceId(0));

        let passes = vec![writer, first, second];
        let steps = plan_barriers(&passes, &[0, 1, 2], &[Some(0)], &[0], 1);
        assert!(steps[2].barriers.is_empty());
    }

    #[test]
    fn compute_to_graphics_records_queue_transfer() {
        let mut producer = RenderGraphPass::new("cull", PipelineStages::COMPUTE);
        producer
            .storage_outputs
            .push(crate::render_graph::ResourceId(0));
        let mut consumer = pass("draw");
        consumer
            .storage_outputs
            .push(crate::render_graph::ResourceId(0));

        let passes = vec![producer, consumer];
        let steps = plan_barriers(&passes, &[0, 1], &[Some(0)], &[0], 1);
        assert_eq!(
            steps[1].barriers[0].queue_transfer,
            Some((QueueFamily::Compute, QueueFamily::Graphics))
        );
    }
}
