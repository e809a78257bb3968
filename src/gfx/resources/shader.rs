//! Shader programs loaded from single-file sources
//!
//! A shader file holds both stages, each introduced by a marker line:
//!
//! ```text
//! // shared declarations
//! #type VERTEX_SHADER
//! ...
//! #type FRAGMENT_SHADER   (or PIXEL_SHADER)
//! ...
//! ```
//!
//! Everything above the first marker is shared and prepended to both stages.
//! Programs loaded from disk remember the file's modification time and
//! recompile themselves when [`Shader::check_last_modification`] sees it advance.

use std::path::Path;
use std::time::SystemTime;

use crate::error::{EmberError, Result};
use crate::gfx::backend::{GpuBackend, ShaderId, ShaderSource};

const TYPE_TOKEN: &str = "#type";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Vertex,
    Fragment,
}

fn stage_from_token(token: &str) -> Result<Stage> {
    match token {
        "VERTEX_SHADER" => Ok(Stage::Vertex),
        "FRAGMENT_SHADER" | "PIXEL_SHADER" => Ok(Stage::Fragment),
        other => Err(EmberError::UnknownShaderStage(other.to_owned())),
    }
}

impl ShaderSource {
    /// Splits `text` on `#type` markers. `name` is only used in errors.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let mut prelude = String::new();
        let mut vertex: Option<String> = None;
        let mut fragment: Option<String> = None;
        let mut current: Option<Stage> = None;

        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix(TYPE_TOKEN) {
                let stage = stage_from_token(rest.trim())?;
                let body = match stage {
                    Stage::Vertex => &mut vertex,
                    Stage::Fragment => &mut fragment,
                };
                body.get_or_insert_with(|| prelude.clone());
                current = Some(stage);
                continue;
            }

            let target = match current {
                None => &mut prelude,
                Some(Stage::Vertex) => vertex.get_or_insert_with(String::new),
                Some(Stage::Fragment) => fragment.get_or_insert_with(String::new),
            };
            target.push_str(line);
            target.push('\n');
        }

        let vertex = vertex.ok_or_else(|| EmberError::MissingShaderStage {
            name: name.to_owned(),
            stage: "vertex",
        })?;
        let fragment = fragment.ok_or_else(|| EmberError::MissingShaderStage {
            name: name.to_owned(),
            stage: "fragment",
        })?;

        Ok(ShaderSource { vertex, fragment })
    }
}

/// Compiled program plus the file it came from, if any.
#[derive(Debug)]
pub struct Shader {
    id: ShaderId,
    name: String,
    path: Option<String>,
    last_modified: Option<SystemTime>,
}

fn modification_time(path: &str) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl Shader {
    /// Compiles a program from in-memory text. Such shaders never hot reload.
    pub fn from_source(gpu: &mut dyn GpuBackend, name: &str, text: &str) -> Result<Self> {
        let source = ShaderSource::parse(name, text)?;
        let id = gpu.compile_shader(name, &source)?;
        log::debug!("Compiled shader '{}'", name);

        Ok(Self {
            id,
            name: name.to_owned(),
            path: None,
            last_modified: None,
        })
    }

    /// Reads and compiles `path`. The program is named after the file stem.
    pub fn from_file(gpu: &mut dyn GpuBackend, path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let name = Path::new(path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_owned());

        let mut shader = Self::from_source(gpu, &name, &text)?;
        shader.path = Some(path.to_owned());
        shader.last_modified = modification_time(path);
        Ok(shader)
    }

    /// Recompiles when the source file changed on disk since the last compile.
    ///
    /// Returns true when a new program was built. A failed recompile keeps the
    /// previous program bound to this shader.
    pub fn check_last_modification(&mut self, gpu: &mut dyn GpuBackend) -> bool {
        let Some(path) = self.path.clone() else {
            return false;
        };
        let Some(modified) = modification_time(&path) else {
            return false;
        };
        if self.last_modified.is_some_and(|last| modified <= last) {
            return false;
        }
        self.last_modified = Some(modified);

        let rebuilt = std::fs::read_to_string(&path)
            .map_err(EmberError::from)
            .and_then(|text| ShaderSource::parse(&self.name, &text))
            .and_then(|source| gpu.compile_shader(&self.name, &source));

        match rebuilt {
            Ok(id) => {
                gpu.destroy_shader(self.id);
                self.id = id;
                log::info!("Reloaded shader '{}'", self.name);
                true
            }
            Err(err) => {
                log::error!("Failed to reload shader '{}': {}", self.name, err);
                false
            }
        }
    }

    pub fn destroy(&self, gpu: &mut dyn GpuBackend) {
        gpu.destroy_shader(self.id);
    }

    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}
