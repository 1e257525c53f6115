//! Backend abstraction layer
//!
//! Provides the traits and types the render graph records through, plus the
//! wgpu and null implementations.

pub mod null;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use traits::*;
pub use types::*;
