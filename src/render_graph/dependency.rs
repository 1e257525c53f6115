//! Dependency analysis between passes
//!
//! Edges are derived purely from declared reads and writes: a pass consuming
//! a resource depends on the pass that produces the version it sees, writes
//! to one resource are serialized in declaration order, and an overwriting
//! pass waits for every reader of the previous version.

use crate::render_graph::pass::RenderGraphPass;
use crate::render_graph::resource::ResourceRegistry;
use std::collections::BTreeSet;

/// `deps[i]` holds the passes that must run before pass `i`
pub(crate) type PassDependencies = Vec<BTreeSet<usize>>;

pub(crate) fn build_dependencies(
    passes: &[RenderGraphPass],
    resources: &ResourceRegistry,
) -> PassDependencies {
    let mut deps: PassDependencies = vec![BTreeSet::new(); passes.len()];

    for res in resources.iter() {
        let writers = &res.written_in;
        let readers = &res.read_in;
        if writers.is_empty() {
            // Externally produced or dead; nothing orders against it
            continue;
        }

        // Write-after-write: serialized in declaration order, regardless of
        // whether the writes could touch disjoint regions
        for pair in writers.windows(2) {
            deps[pair[1]].insert(pair[0]);
        }

        // The version a reader consumes: the last write declared before it,
        // or the first write overall when the resource is read before any
        // pass has produced it
        let producer_of = |reader: usize| -> usize {
            writers
                .iter()
                .copied()
                .filter(|&w| w < reader)
                .last()
                .unwrap_or(writers[0])
        };

        // Read-after-write
        for &r in readers {
            let p = producer_of(r);
            if p != r {
                deps[r].insert(p);
            }
        }

        // Write-after-read: an overwrite waits for every reader of the
        // previous version
        for (wi, &w) in writers.iter().enumerate().skip(1) {
            let prev = writers[wi - 1];
            for &r in readers {
                if r != w && producer_of(r) == prev {
                    deps[w].insert(r);
                }
            }
        }
    }

    deps
}
