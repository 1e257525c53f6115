//! Physical resource assignment
//!
//! Maps logical resources onto a minimal set of physical allocations.
//! Two logicals share a slot when their scheduled lifetimes never overlap
//! and their resolved requirements are compatible; read-modify-write
//! aliases are pinned to one slot up front.

use crate::backend::types::*;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::resource::{
    ResourceDimensions, ResourceInfo, ResourceRegistry,
};

/// Concrete backing requirements for one physical allocation
#[derive(Debug, Clone)]
pub enum PhysicalSlotKind {
    Texture(TextureDescriptor),
    Buffer(BufferDescriptor),
}

/// One physical allocation serving one or more logical resources
#[derive(Debug, Clone)]
pub struct PhysicalSlot {
    pub kind: PhysicalSlotKind,
    /// Bound per-frame from outside instead of being allocated
    pub external: bool,
    pub debug_name: String,
    /// Last scheduled position any current occupant uses this slot
    pub(crate) free_after: usize,
}

/// Result of physical assignment
#[derive(Debug, Clone)]
pub struct PhysicalAssignment {
    /// Logical resource index -> slot index; `None` for resources no
    /// scheduled pass touches
    pub assignments: Vec<Option<usize>>,
    pub slots: Vec<PhysicalSlot>,
    /// Logical resource index -> [first, last] scheduled position
    pub lifetimes: Vec<Option<(usize, usize)>>,
    /// Logical resource index -> root of its read-modify-write alias group.
    /// Barrier planning must not treat accesses within one group as a slot
    /// handoff, since the whole point is to inherit the contents.
    pub(crate) roots: Vec<usize>,
}

/// Compute each logical resource's lifetime interval over the scheduled
/// order: [first scheduled pass touching it, last scheduled pass touching it].
pub(crate) fn compute_lifetimes(
    resources: &ResourceRegistry,
    order: &[usize],
) -> Vec<Option<(usize, usize)>> {
    let mut position_of = vec![usize::MAX; order.len()];
    for (pos, &pass) in order.iter().enumerate() {
        position_of[pass] = pos;
    }

    resources
        .iter()
        .map(|res| {
            let mut interval: Option<(usize, usize)> = None;
            for &pass in res.written_in.iter().chain(res.read_in.iter()) {
                let pos = position_of[pass];
                if pos == usize::MAX {
                    continue;
                }
                interval = Some(match interval {
                    None => (pos, pos),
                    Some((first, last)) => (first.min(pos), last.max(pos)),
                });
            }
            interval
        })
        .collect()
}

/// Follow a read-modify-write alias chain to the resource actually owning
/// the storage. A chain longer than the resource count means the authoring
/// produced a loop of aliases.
fn alias_root(resources: &ResourceRegistry, mut index: usize) -> GraphResult<usize> {
    for _ in 0..=resources.len() {
        match resources.by_index(index).alias_of {
            Some(parent) => index = parent,
            None => return Ok(index),
        }
    }
    Err(GraphError::ResourceConflict {
        resource: resources.by_index(index).name().to_string(),
        reason: "circular chain of aliased outputs".to_string(),
    })
}

pub(crate) fn assign_physical(
    resources: &ResourceRegistry,
    dimensions: &[ResourceDimensions],
    lifetimes: &[Option<(usize, usize)>],
) -> GraphResult<PhysicalAssignment> {
    let count = dimensions.len();
    let all: Vec<_> = resources.iter().collect();

    // Group read-modify-write aliases under their storage root and validate
    // that both ends really can be one allocation
    let mut root_of = vec![0usize; count];
    for index in 0..count {
        let root = alias_root(resources, index)?;
        root_of[index] = root;
        if root == index {
            continue;
        }
        let (res, root_res) = (all[index], all[root]);
        if !res.is_texture() || !root_res.is_texture() {
            return Err(GraphError::ResourceConflict {
                resource: res.name().to_string(),
                reason: format!("aliases '{}', which is not a texture", root_res.name()),
            });
        }
        let (dims, root_dims) = (&dimensions[index], &dimensions[root]);
        if dims.width != root_dims.width
            || dims.height != root_dims.height
            || dims.levels != root_dims.levels
            || dims.format != root_dims.format
        {
            return Err(GraphError::ResourceConflict {
                resource: res.name().to_string(),
                reason: format!(
                    "aliases '{}' with mismatched dimensions or format",
                    root_res.name()
                ),
            });
        }
    }

    // Per-group requirements: union of member lifetimes and usages
    let mut group_lifetime: Vec<Option<(usize, usize)>> = vec![None; count];
    let mut group_texture_usage = vec![TextureUsage::empty(); count];
    let mut group_external = vec![false; count];
    for index in 0..count {
        let root = root_of[index];
        if let Some((first, last)) = lifetimes[index] {
            group_lifetime[root] = Some(match group_lifetime[root] {
                None => (first, last),
                Some((f, l)) => (f.min(first), l.max(last)),
            });
        }
        group_texture_usage[root] |= all[index].texture_usage;
        group_external[root] |= all[index].external;
    }

    let mut assignments: Vec<Option<usize>> = vec![None; count];
    let mut slots: Vec<PhysicalSlot> = Vec::new();

    // Greedy assignment of group roots in declaration order
    for index in 0..count {
        let root = root_of[index];
        if root != index {
            continue;
        }
        let Some((first, last)) = group_lifetime[root] else {
            continue;
        };
        let res = all[root];
        let dims = &dimensions[root];

        if group_external[root] {
            let slot = slots.len();
            slots.push(PhysicalSlot {
                kind: PhysicalSlotKind::Texture(texture_desc(
                    res.name(),
                    dims,
                    group_texture_usage[root],
                )),
                external: true,
                debug_name: res.name().to_string(),
                free_after: last,
            });
            assignments[root] = Some(slot);
            continue;
        }

        let reused = match &res.info {
            ResourceInfo::Texture(_) => slots
                .iter()
                .enumerate()
                .find(|(_, slot)| {
                    !slot.external
                        && slot.free_after < first
                        && matches!(
                            &slot.kind,
                            PhysicalSlotKind::Texture(desc)
                                if desc.width == dims.width
                                    && desc.height == dims.height
                                    && desc.mip_levels == dims.levels
                                    && desc.format == dims.format
                        )
                })
                .map(|(i, _)| i),
            ResourceInfo::Buffer(info) => slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| {
                    !slot.external
                        && slot.free_after < first
                        && matches!(
                            &slot.kind,
                            PhysicalSlotKind::Buffer(desc) if desc.size >= info.size
                        )
                })
                // smallest-fit among the free candidates
                .min_by_key(|(_, slot)| match &slot.kind {
                    PhysicalSlotKind::Buffer(desc) => desc.size,
                    PhysicalSlotKind::Texture(_) => u64::MAX,
                })
                .map(|(i, _)| i),
        };

        let slot = match reused {
            Some(slot) => {
                // The allocation now has to satisfy the union of both
                // occupants' requirements
                match (&mut slots[slot].kind, &res.info) {
                    (PhysicalSlotKind::Texture(desc), ResourceInfo::Texture(_)) => {
                        desc.usage |= group_texture_usage[root];
                    }
                    (PhysicalSlotKind::Buffer(desc), ResourceInfo::Buffer(info)) => {
                        desc.usage |= info.usage;
                    }
                    _ => {}
                }
                slots[slot].free_after = last;
                slot
            }
            None => {
                let slot = slots.len();
                slots.push(PhysicalSlot {
                    kind: match &res.info {
                        ResourceInfo::Texture(_) => PhysicalSlotKind::Texture(texture_desc(
                            res.name(),
                            dims,
                            group_texture_usage[root],
                        )),
                        ResourceInfo::Buffer(info) => {
                            PhysicalSlotKind::Buffer(BufferDescriptor {
                                label: Some(res.name().to_string()),
                                size: info.size,
                                usage: info.usage,
                                mapped_at_creation: false,
                            })
                        }
                    },
                    external: false,
                    debug_name: res.name().to_string(),
                    free_after: last,
                });
                slot
            }
        };
        assignments[root] = Some(slot);
    }

    // Alias members land wherever their root did, regardless of which side
    // of the chain was declared first
    for index in 0..count {
        let root = root_of[index];
        if root != index {
            assignments[index] = assignments[root];
        }
    }

    Ok(PhysicalAssignment {
        assignments,
        slots,
        lifetimes: lifetimes.to_vec(),
        roots: root_of,
    })
}

fn texture_desc(name: &str, dims: &ResourceDimensions, usage: TextureUsage) -> TextureDescriptor {
    TextureDescriptor {
        label: Some(name.to_string()),
        width: dims.width,
        height: dims.height,
        depth: 1,
        mip_levels: dims.levels,
        format: dims.format,
        usage,
    }
}
