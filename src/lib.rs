//! Frame render graph with dependency-driven pass scheduling
//!
//! Passes declare logical GPU work and the named resources each one reads or
//! writes; `bake()` compiles those declarations - once per structural change -
//! into an execution plan: a stable topological order, a minimal set of
//! physical allocations with lifetime-based aliasing, and the barriers to
//! issue in front of every pass. Each frame then binds the swap-chain image
//! through `setup_attachments` and replays the plan with
//! `enqueue_render_passes`.
//!
//! # Structure
//! - [`render_graph`]: declaration, baking and execution of the graph
//! - [`backend`]: the device abstraction the graph records through (wgpu
//!   implementation included, plus a command-recording null backend)
//! - [`pipeline`]: ready-made pass setups (deferred shading chain, depth
//!   hierarchy downsampling, tonemapping)

pub mod backend;
pub mod pipeline;
pub mod render_graph;

pub use backend::null::NullBackend;
pub use backend::wgpu_backend::WgpuBackend;
pub use render_graph::{
    AttachmentInfo, BufferInfo, GraphError, GraphResult, PassImplementation, RecordContext,
    RenderGraph, ResourceDimensions, ResourceId, SizeClass,
};
