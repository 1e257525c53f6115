//! Post-processing passes

pub mod tonemapping;

pub use tonemapping::{setup_hdr_postprocess, TonemapOperator, TonemappingPass};
