//! Render settings and per-frame host inputs.
//!
//! [`RenderSettings`] is the scene-level configuration of every effect. It is
//! plain data, deserialized from TOML with per-section defaults so a settings
//! file only needs to mention what it changes:
//!
//! ```toml
//! debug_value = 0
//!
//! [bloom]
//! enabled = true
//!
//! [temporal]
//! samples = 16
//! reprojection = true
//! ```
//!
//! [`FrameInputs`] bundles the settings with everything else the capability
//! resolver looks at for one frame.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::camera::CameraState;
use crate::error::EffectsResult;

/// Debug value that forces the velocity buffer on.
pub const DEBUG_VELOCITY_BUFFER: i32 = 9;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MotionBlurSettings {
    pub enabled: bool,
    pub samples: u32,
    /// Fraction of the frame the shutter stays open.
    pub shutter: f32,
}

impl Default for MotionBlurSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            samples: 8,
            shutter: 0.5,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BloomSettings {
    pub enabled: bool,
    pub threshold: f32,
    pub intensity: f32,
    /// Number of mip levels the bloom blur walks down.
    pub levels: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.8,
            intensity: 0.05,
            levels: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DepthOfFieldSettings {
    pub enabled: bool,
    /// Largest blur radius in pixels.
    pub max_radius: f32,
}

impl Default for DepthOfFieldSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_radius: 16.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TemporalSettings {
    /// Accumulated samples per pixel. `1` disables temporal sampling in the viewport.
    pub samples: u32,
    pub reprojection: bool,
}

impl Default for TemporalSettings {
    fn default() -> Self {
        Self {
            samples: 16,
            reprojection: false,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcclusionSettings {
    pub enabled: bool,
    pub distance: f32,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubsurfaceSettings {
    pub enabled: bool,
    pub samples: u32,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenRaytraceSettings {
    pub reflections: bool,
    pub refraction: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumetricSettings {
    pub enabled: bool,
}

/// Scene-level configuration of every effect.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    pub motion_blur: MotionBlurSettings,
    pub bloom: BloomSettings,
    pub depth_of_field: DepthOfFieldSettings,
    pub temporal: TemporalSettings,
    pub occlusion: OcclusionSettings,
    pub subsurface: SubsurfaceSettings,
    pub screen_raytrace: ScreenRaytraceSettings,
    pub volumetrics: VolumetricSettings,
    /// Debug switch; [`DEBUG_VELOCITY_BUFFER`] forces the velocity buffer.
    pub debug_value: i32,
    /// Clamp applied by the colour downsample pass to suppress fireflies.
    pub ssr_firefly_factor: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            motion_blur: MotionBlurSettings::default(),
            bloom: BloomSettings::default(),
            depth_of_field: DepthOfFieldSettings::default(),
            temporal: TemporalSettings::default(),
            occlusion: OcclusionSettings::default(),
            subsurface: SubsurfaceSettings::default(),
            screen_raytrace: ScreenRaytraceSettings::default(),
            volumetrics: VolumetricSettings::default(),
            debug_value: 0,
            ssr_firefly_factor: 10.0,
        }
    }
}

impl RenderSettings {
    /// Parses settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> EffectsResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a settings file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> EffectsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut settings = Self::from_toml(&text)?;
        settings.apply_env_overrides();
        log::info!("loaded render settings from {}", path.display());
        Ok(settings)
    }

    /// Like [`load`](Self::load) but falls back to defaults when the file is missing.
    pub fn load_or_default(path: impl AsRef<Path>) -> EffectsResult<Self> {
        let path = path.as_ref();
        if path.is_file() {
            return Self::load(path);
        }
        log::warn!(
            "render settings {} not found, using defaults",
            path.display()
        );
        let mut settings = Self::default();
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// `SCREENFX_DEBUG_VALUE` and `SCREENFX_TAA_SAMPLES` override the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_override("SCREENFX_DEBUG_VALUE") {
            self.debug_value = v;
        }
        if let Some(v) = env_override("SCREENFX_TAA_SAMPLES") {
            self.temporal.samples = v;
        }
    }
}

fn env_override<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|raw| parse_override(key, &raw))
}

/// Parses an override value, warning instead of failing on garbage.
fn parse_override<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}

/// Whether the frame is drawn for an interactive viewport or an offline render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderMode {
    #[default]
    Interactive,
    ImageRender,
}

impl RenderMode {
    pub fn is_image_render(self) -> bool {
        self == RenderMode::ImageRender
    }
}

/// Everything the host hands to the pipeline for one frame.
#[derive(Clone, Debug)]
pub struct FrameInputs {
    /// Viewport size in pixels.
    pub viewport: [u32; 2],
    pub mode: RenderMode,
    pub camera: CameraState,
    pub settings: RenderSettings,
    /// An offline render asked for a normal output pass.
    pub normal_pass: bool,
}

impl FrameInputs {
    pub fn new(viewport: [u32; 2], camera: CameraState, settings: RenderSettings) -> Self {
        Self {
            viewport,
            mode: RenderMode::Interactive,
            camera,
            settings,
            normal_pass: false,
        }
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_normal_pass(mut self, normal_pass: bool) -> Self {
        self.normal_pass = normal_pass;
        self
    }

    pub fn viewport_f32(&self) -> [f32; 2] {
        [self.viewport[0] as f32, self.viewport[1] as f32]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings = RenderSettings::from_toml(
            r#"
            debug_value = 9

            [bloom]
            enabled = true

            [temporal]
            reprojection = true
            "#,
        )
        .unwrap();
        assert!(settings.bloom.enabled);
        assert_eq!(settings.bloom.levels, 5);
        assert_eq!(settings.temporal.samples, 16);
        assert!(settings.temporal.reprojection);
        assert_eq!(settings.debug_value, DEBUG_VELOCITY_BUFFER);
        assert!(!settings.motion_blur.enabled);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = RenderSettings::from_toml("bloom = 3").unwrap_err();
        assert!(matches!(err, crate::EffectsError::Config(_)));
    }

    #[test]
    fn bad_override_values_are_skipped() {
        assert_eq!(parse_override::<u32>("SCREENFX_TAA_SAMPLES", " 8 "), Some(8));
        assert_eq!(parse_override::<u32>("SCREENFX_TAA_SAMPLES", "eight"), None);
        assert_eq!(parse_override::<i32>("SCREENFX_DEBUG_VALUE", ""), None);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RenderSettings::load_or_default("/nonexistent/screenfx.toml").unwrap();
        assert_eq!(settings.ssr_firefly_factor, 10.0);
    }
}
