//! # Runtime Configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is valid:
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "metronome"
//! clear_color = { r = 0.0, g = 0.0, b = 0.0, a = 1.0 }
//!
//! [timing]
//! fixed_step = 0.016666666666666666
//! max_frame_delta = 0.25
//! max_fixed_steps = 8
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};
use crate::window::Color;

/// Default fixed step (60 Hz).
pub const DEFAULT_FIXED_STEP: f64 = 1.0 / 60.0;

/// Default cap on a single frame delta, in seconds.
pub const DEFAULT_MAX_FRAME_DELTA: f64 = 0.25;

/// Default cap on fixed steps per frame.
pub const DEFAULT_MAX_FIXED_STEPS: u32 = 8;

/// Window settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Title bar text.
    pub title: String,
    /// Color the back buffer is cleared to each frame.
    pub clear_color: Color,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "metronome".to_owned(),
            clear_color: Color::BLACK,
        }
    }
}

/// Frame timing settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Length of one fixed step in seconds.
    pub fixed_step: f64,
    /// Largest frame delta accepted from the clock, in seconds.
    pub max_frame_delta: f64,
    /// Most fixed steps run in one frame.
    pub max_fixed_steps: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fixed_step: DEFAULT_FIXED_STEP,
            max_frame_delta: DEFAULT_MAX_FRAME_DELTA,
            max_fixed_steps: DEFAULT_MAX_FIXED_STEPS,
        }
    }
}

/// Complete runtime configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Window settings.
    pub window: WindowConfig,
    /// Timing settings.
    pub timing: TimingConfig,
}

impl RuntimeConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on syntax errors, unknown value types or failed validation.
    pub fn from_toml_str(text: &str) -> RuntimeResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RuntimeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> RuntimeResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> RuntimeResult<()> {
        let timing = &self.timing;
        if !(timing.fixed_step.is_finite() && timing.fixed_step > 0.0) {
            return Err(invalid("timing.fixed_step must be a positive number of seconds"));
        }
        if !(timing.max_frame_delta.is_finite() && timing.max_frame_delta >= timing.fixed_step) {
            return Err(invalid("timing.max_frame_delta must be at least timing.fixed_step"));
        }
        if timing.max_fixed_steps == 0 {
            return Err(invalid("timing.max_fixed_steps must be at least 1"));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(invalid("window.width and window.height must be non-zero"));
        }
        if self.window.title.trim().is_empty() {
            return Err(invalid("window.title must not be empty"));
        }
        if !self.window.clear_color.is_normalized() {
            return Err(invalid("window.clear_color components must be within [0, 1]"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> RuntimeError {
    RuntimeError::InvalidConfig(message.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.max_fixed_steps, 8);
        assert_eq!(config.window.title, "metronome");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        assert_eq!(RuntimeConfig::from_toml_str("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [window]
            title = "demo"

            [timing]
            fixed_step = 0.02
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.timing.fixed_step, 0.02);
        assert_eq!(config.timing.max_frame_delta, DEFAULT_MAX_FRAME_DELTA);
    }

    #[test]
    fn test_rejects_zero_step() {
        let err = RuntimeConfig::from_toml_str("[timing]\nfixed_step = 0.0\n").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig(msg) if msg.contains("fixed_step")));
    }

    #[test]
    fn test_rejects_zero_step_cap() {
        let err = RuntimeConfig::from_toml_str("[timing]\nmax_fixed_steps = 0\n").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig(msg) if msg.contains("max_fixed_steps")));
    }

    #[test]
    fn test_rejects_bad_syntax() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("[window\n"),
            Err(RuntimeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RuntimeConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig(msg) if msg.contains("here.toml")));
    }
}
