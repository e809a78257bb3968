//! Error types
//!
//! Loaders inside the engine return [`Result<T>`]. The resource cache and the
//! renderer turn these into `None` plus a log line at their public boundary,
//! so callers only ever see an empty handle for a failed load.

use thiserror::Error;

/// Every recoverable failure the engine can produce.
#[derive(Error, Debug)]
pub enum EmberError {
    /// File could not be read from disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pixel data could not be decoded.
    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The scene importer rejected the file.
    #[error("Error Opening Scene '{path}': {reason}")]
    ModelImport { path: String, reason: String },

    /// The scene was parsed but contains nothing drawable.
    #[error("Error Loading Scene '{0}': there were no meshes to load!")]
    EmptyScene(String),

    /// A `#type` marker named a stage we do not know.
    #[error("Unknown shader stage '{0}'")]
    UnknownShaderStage(String),

    /// A shader file is missing one of its two stages.
    #[error("Shader '{name}' is missing its {stage} stage")]
    MissingShaderStage { name: String, stage: &'static str },

    /// The GPU backend refused to build a program.
    #[error("Shader '{name}' failed to compile: {reason}")]
    ShaderCompile { name: String, reason: String },

    /// No usable adapter or device could be acquired.
    #[error("GPU device error: {0}")]
    Device(String),

    /// Pixel data does not cover the texture it is written to.
    #[error("Texture data size mismatch: expected {expected} bytes, got {actual}")]
    TextureSize { expected: usize, actual: usize },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EmberError>;
