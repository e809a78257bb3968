//! Renderer configuration
//!
//! [`RendererConfig`] is built the same way pipeline configs are: start from
//! `Default` and chain `with_*` calls. `from_env` overlays a few environment
//! switches for quick debugging without recompiling.

use crate::gfx::backend::ApiVersion;

/// Upper bound on simultaneously uploaded point lights.
pub const MAX_LIGHTS: usize = 10;

/// Which frame composition the renderer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    /// Lighting is evaluated per mesh while it is drawn.
    Forward,
    /// Geometry goes to the G-buffer first, lighting runs as a full-screen pass.
    Deferred,
}

/// Parameters of the bloom post-process chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomSettings {
    pub enabled: bool,
    /// Luminance above which a fragment feeds the blur chain.
    pub threshold: f32,
    /// Number of single-axis blur passes (alternating horizontal/vertical).
    pub iterations: u32,
    /// Texel step multiplier of the blur kernel.
    pub blur_radius: f32,
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1.0,
            iterations: 10,
            blur_radius: 1.0,
            exposure: 1.0,
            gamma: 2.2,
        }
    }
}

/// Everything [`Renderer::init`](crate::gfx::rendering::renderer::Renderer::init) needs to know.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub clear_color: [f32; 4],
    pub max_lights: usize,
    /// Minimum GPU API version the driver must report.
    pub required_api_version: ApiVersion,
    /// Bitmap loaded into the "temp albedo" default slot. A checkerboard is
    /// generated when unset or unreadable.
    pub temp_albedo_path: Option<String>,
    pub render_path: RenderPath,
    pub bloom: BloomSettings,
    /// Right, left, bottom, top, front, back.
    pub skybox_faces: Option<[String; 6]>,
    /// Initial size of the screen and every offscreen target.
    pub viewport: (u32, u32),
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.15, 0.15, 0.15, 1.0],
            max_lights: MAX_LIGHTS,
            required_api_version: ApiVersion::new(1, 0),
            temp_albedo_path: None,
            render_path: RenderPath::Forward,
            bloom: BloomSettings::default(),
            skybox_faces: None,
            viewport: (1280, 720),
        }
    }
}

impl RendererConfig {
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Sets the light bound. Values above [`MAX_LIGHTS`] are clamped since the
    /// shaders size their light loop for that many entries.
    pub fn with_max_lights(mut self, max_lights: usize) -> Self {
        self.max_lights = max_lights.min(MAX_LIGHTS);
        self
    }

    pub fn with_required_api_version(mut self, version: ApiVersion) -> Self {
        self.required_api_version = version;
        self
    }

    pub fn with_temp_albedo(mut self, path: &str) -> Self {
        self.temp_albedo_path = Some(path.to_owned());
        self
    }

    pub fn with_render_path(mut self, path: RenderPath) -> Self {
        self.render_path = path;
        self
    }

    pub fn with_bloom(mut self, bloom: BloomSettings) -> Self {
        self.bloom = bloom;
        self
    }

    /// Sets the six cubemap faces in right, left, bottom, top, front, back order.
    pub fn with_skybox(mut self, faces: [&str; 6]) -> Self {
        self.skybox_faces = Some(faces.map(str::to_owned));
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width.max(1), height.max(1));
        self
    }

    /// Default config with `EMBER_RENDER_PATH`, `EMBER_MAX_LIGHTS` and
    /// `EMBER_BLOOM` applied on top.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("EMBER_RENDER_PATH") {
            match path.to_ascii_lowercase().as_str() {
                "forward" => self.render_path = RenderPath::Forward,
                "deferred" => self.render_path = RenderPath::Deferred,
                other => log::warn!("Ignoring unknown EMBER_RENDER_PATH '{}'", other),
            }
        }

        if let Some(value) = lookup("EMBER_MAX_LIGHTS") {
            match value.parse::<usize>() {
                Ok(n) => self = self.with_max_lights(n),
                Err(_) => log::warn!("Ignoring non-numeric EMBER_MAX_LIGHTS '{}'", value),
            }
        }

        if let Some(value) = lookup("EMBER_BLOOM") {
            self.bloom.enabled = value != "0";
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.clear_color, [0.15, 0.15, 0.15, 1.0]);
        assert_eq!(config.max_lights, MAX_LIGHTS);
        assert_eq!(config.render_path, RenderPath::Forward);
        assert_eq!(config.bloom.iterations, 10);
    }

    #[test]
    fn test_max_lights_is_clamped() {
        let config = RendererConfig::default().with_max_lights(64);
        assert_eq!(config.max_lights, MAX_LIGHTS);

        let config = RendererConfig::default().with_max_lights(3);
        assert_eq!(config.max_lights, 3);
    }

    #[test]
    fn test_env_overrides() {
        let config = RendererConfig::default().with_env_overrides(|key| match key {
            "EMBER_RENDER_PATH" => Some("Deferred".to_string()),
            "EMBER_MAX_LIGHTS" => Some("4".to_string()),
            "EMBER_BLOOM" => Some("0".to_string()),
            _ => None,
        });

        assert_eq!(config.render_path, RenderPath::Deferred);
        assert_eq!(config.max_lights, 4);
        assert!(!config.bloom.enabled);
    }

    #[test]
    fn test_bad_env_values_are_ignored() {
        let config = RendererConfig::default().with_env_overrides(|key| match key {
            "EMBER_RENDER_PATH" => Some("raytraced".to_string()),
            "EMBER_MAX_LIGHTS" => Some("lots".to_string()),
            _ => None,
        });

        assert_eq!(config.render_path, RenderPath::Forward);
        assert_eq!(config.max_lights, MAX_LIGHTS);
    }
}
