//! Frame rendering
//!
//! [`Renderer`] owns the per-frame state and drives one of two paths: a
//! forward pass straight into the HDR scene target, or a G-buffer pass
//! followed by a fullscreen lighting pass. Both end in the bloom composite
//! onto the screen.

pub mod bloom;
pub mod default_textures;
pub mod deferred;
pub mod primitives;
pub mod renderer;
pub mod skybox;
pub mod uniforms;

pub use bloom::BloomPass;
pub use default_textures::DefaultTextures;
pub use deferred::GBuffer;
pub use renderer::{Renderer, RendererStatistics};
pub use skybox::Skybox;
pub use uniforms::{CameraUniform, DrawUniforms, PointLightUniform};
