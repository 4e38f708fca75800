//! Layerkit Settings Crate
//!
//! Loads and validates the daemon configuration.

pub mod config;
pub mod error;

pub use config::{Config, DeviceSettings, LoggingSettings, RampSettings};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
