//! # Graphics Module
//!
//! Everything between a file on disk and a draw call:
//!
//! - **Backend** ([`backend`]) - the narrow GPU surface, with a wgpu and a headless implementation
//! - **Resources** ([`resources`]) - textures, shaders, materials, meshes and the cache that owns them
//! - **Scene** ([`scene`]) - vertices, transforms and lights
//! - **Rendering** ([`rendering`]) - forward and deferred paths, bloom, skybox
//!
//! ## Usage
//!
//! ```no_run
//! use ember::config::RendererConfig;
//! use ember::gfx::backend::HeadlessBackend;
//! use ember::gfx::{Renderer, ResourceCache};
//!
//! let mut gpu = HeadlessBackend::new();
//! let mut cache = ResourceCache::new();
//! let _renderer = Renderer::init(&mut gpu, RendererConfig::default()).unwrap();
//! let _model = cache.create_model(&mut gpu, "assets/crate.obj");
//! ```

pub mod backend;
pub mod rendering;
pub mod resources;
pub mod scene;

pub use backend::GpuBackend;
pub use rendering::{Renderer, RendererStatistics};
pub use resources::ResourceCache;
