//! Configuration for the SMDK4x12 sensors HAL
//!
//! Describes where the sensor nodes live (character devices, evdev and sysfs
//! directories, uinput), the kernel input node names each backend looks up,
//! which backends are registered, and the magnetometer calibration settings.
//!
//! Configuration is TOML. Every field has a default matching the stock
//! SMDK4x12 (Galaxy S3 family) firmware, so an empty file is a valid config.

mod paths;
mod sensors;

pub use paths::{InputNames, PathsConfig};
pub use sensors::{MagnetometerConfig, SensorSelection};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Layered configuration error: {0}")]
    Layered(#[from] config::ConfigError),
}

/// System configuration location on the device
pub const CONFIG_PATH: &str = "/system/etc/smdk4x12-sensors.toml";

/// Prefix for environment overrides, e.g. `SMDK4X12__PATHS__UINPUT`
pub const ENV_PREFIX: &str = "SMDK4X12";

/// Top-level sensors HAL configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorsConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub inputs: InputNames,

    #[serde(default)]
    pub sensors: SensorSelection,

    #[serde(default)]
    pub magnetometer: MagnetometerConfig,

    /// Pause after creating a virtual input device, in microseconds
    #[serde(default = "default_uinput_settle_us")]
    pub uinput_settle_us: u64,
}

fn default_uinput_settle_us() -> u64 {
    3000
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            inputs: InputNames::default(),
            sensors: SensorSelection::default(),
            magnetometer: MagnetometerConfig::default(),
            uinput_settle_us: default_uinput_settle_us(),
        }
    }
}

impl SensorsConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an optional TOML file with environment overrides layered on top
    pub fn load_layered(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> Result<Self, ConfigError> {
        let system_config = Path::new(CONFIG_PATH);
        if system_config.exists() {
            return Self::load_layered(system_config);
        }

        tracing::warn!("No sensors configuration found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Sensors configuration saved to {}", path.display());
        Ok(())
    }

    /// Check values the type system cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8).contains(&self.magnetometer.layout) {
            return Err(ConfigError::Invalid(format!(
                "magnetometer layout must be between 1 and 8, got {}",
                self.magnetometer.layout
            )));
        }

        if self.magnetometer.averaging == 0 {
            return Err(ConfigError::Invalid(
                "magnetometer averaging window must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
