//! Configuration for the layerkit daemon
//!
//! Configuration is read once at startup from a TOML or JSON file and is
//! never written back. Every section is optional; missing sections and keys
//! take their defaults.
//!
//! - Device settings (emulation, homing mask)
//! - Speed ramp behaviour and translator limits
//! - Logging

use layerkit_core::{GateMode, DEFAULT_ALL_AXES_MASK};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};

/// Device settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Pretend to be a printer at layer 100 and speed 100%
    pub emulating: bool,
    /// Homing status bits that must all be set for the printer to count as homed
    pub all_axes_mask: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            emulating: false,
            all_axes_mask: DEFAULT_ALL_AXES_MASK,
        }
    }
}

/// Speed ramp settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampSettings {
    /// Gate applied to intermediate ramp steps
    pub gate: GateMode,
    /// Send the target speed when a ramp completes
    pub settle_on_completion: bool,
    /// Lowest speed percentage the printer accepts
    pub min_speed: i32,
    /// Highest speed percentage the printer accepts
    pub max_speed: i32,
    /// Speed used in place of an out-of-range request
    pub fallback_speed: i32,
}

impl Default for RampSettings {
    fn default() -> Self {
        Self {
            gate: GateMode::Literal,
            settle_on_completion: true,
            min_speed: 30,
            max_speed: 180,
            fallback_speed: 100,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Device settings
    pub device: DeviceSettings,
    /// Ramp settings
    pub ramp: RampSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                )
                .into())
            }
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> SettingsResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/layerkit/config.toml` for the current platform
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("layerkit").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("No config directory on this platform".to_string())
            })
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.device.all_axes_mask == 0 {
            return Err(ConfigError::ValueOutOfRange {
                key: "device.all_axes_mask".to_string(),
                value: "0".to_string(),
            });
        }

        let ramp = &self.ramp;
        if ramp.min_speed <= 0 {
            return Err(ConfigError::ValueOutOfRange {
                key: "ramp.min_speed".to_string(),
                value: ramp.min_speed.to_string(),
            });
        }

        if ramp.min_speed >= ramp.max_speed {
            return Err(ConfigError::Inconsistent(format!(
                "ramp.min_speed ({}) must be below ramp.max_speed ({})",
                ramp.min_speed, ramp.max_speed
            )));
        }

        if !(ramp.min_speed..=ramp.max_speed).contains(&ramp.fallback_speed) {
            return Err(ConfigError::ValueOutOfRange {
                key: "ramp.fallback_speed".to_string(),
                value: ramp.fallback_speed.to_string(),
            });
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValueOutOfRange {
                key: "logging.level".to_string(),
                value: String::new(),
            });
        }

        Ok(())
    }
}
