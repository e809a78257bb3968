// src/lib.rs
//! Ember 3D Engine Core
//!
//! A small real-time rendering core built on wgpu: a reference-counted
//! resource cache, an OBJ mesh importer, and a renderer with forward and
//! deferred paths, bloom and a skybox.
//!
//! The engine never touches a graphics API directly. Everything goes through
//! [`gfx::backend::GpuBackend`], so the same code drives a real device
//! ([`gfx::backend::WgpuBackend`]) or records calls for tests and tools
//! ([`gfx::backend::HeadlessBackend`]).

pub mod config;
pub mod error;
pub mod gfx;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use config::{BloomSettings, RenderPath, RendererConfig};
pub use error::{EmberError, Result};
pub use gfx::{GpuBackend, Renderer, RendererStatistics, ResourceCache};

/// Installs the env_logger backend for the `log` macros used throughout the
/// engine. `RUST_LOG` takes precedence over the `ember=info` default. Calling
/// this more than once is harmless.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("ember=info");
    let _ = env_logger::Builder::from_env(env).try_init();
}
