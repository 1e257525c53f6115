//! Render graph error types

use crate::backend::traits::BackendError;
use thiserror::Error;

/// Errors surfaced while building, baking or executing a render graph
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Resource '{resource}' is sized relative to '{relative_to}', which is not declared before it")]
    DependencyOrder {
        resource: String,
        relative_to: String,
    },
    #[error("Render graph contains a cycle through pass '{pass}'")]
    GraphCycle { pass: String },
    #[error("Resource '{resource}' cannot share storage: {reason}")]
    ResourceConflict { resource: String, reason: String },
    #[error("Pass '{pass}' requires a missing device capability: {capability}")]
    DeviceCapability { pass: String, capability: String },
    #[error("Pass '{pass}' must set exactly one of a record callback or an implementation")]
    InvalidPassRecorder { pass: String },
    #[error("No pass writes the backbuffer source '{backbuffer}'")]
    MissingBackbufferSource { backbuffer: String },
    #[error("Graph has not been baked")]
    NotBaked,
    #[error("setup_attachments has not run for the current plan")]
    AttachmentsNotBound,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type GraphResult<T> = Result<T, GraphError>;
