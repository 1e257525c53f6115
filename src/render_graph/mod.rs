//! Render Graph System
//!
//! A declarative system for defining render passes as a directed acyclic
//! graph. Passes declare the named resources they read and write; `bake()`
//! derives the execution order, physical resource assignment with
//! lifetime-based aliasing, and the barriers each pass needs.

mod dependency;
pub mod error;
pub mod executor;
pub mod graph;
pub mod pass;
pub mod physical;
pub mod resource;
pub mod schedule;

pub use error::{GraphError, GraphResult};
pub use executor::RecordContext;
pub use graph::{PassBuilder, RenderGraph, BACKBUFFER_SOURCE_ENV};
pub use pass::{PassId, PassImplementation};
pub use physical::{PhysicalSlot, PhysicalSlotKind};
pub use resource::{
    full_mip_levels, AttachmentInfo, BufferInfo, ResourceDimensions, ResourceId, SizeClass,
};
pub use schedule::{ExecutionPlan, PlannedBarrier, PlannedBarrierKind, ScheduledPass};
