//! WGPU utility functions and helpers
//!
//! Small wrappers used by the wgpu backend for bind group layouts and the
//! per-draw uniform buffer.

pub mod binding_types;
pub mod uniform_buffer;

pub use binding_types::*;
pub use uniform_buffer::{aligned_stride, DynamicUniformBuffer};
