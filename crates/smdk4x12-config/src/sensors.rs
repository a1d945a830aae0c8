//! Backend selection and magnetometer calibration settings

use serde::{Deserialize, Serialize};

/// Which backends the registry is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSelection {
    #[serde(default = "default_true")]
    pub acceleration: bool,

    #[serde(default = "default_true")]
    pub magnetic: bool,

    /// Derived from acceleration + magnetic; needs both to initialize
    #[serde(default = "default_true")]
    pub orientation: bool,

    #[serde(default = "default_true")]
    pub proximity: bool,

    #[serde(default = "default_true")]
    pub light: bool,

    #[serde(default = "default_true")]
    pub gyroscope: bool,

    #[serde(default = "default_true")]
    pub pressure: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SensorSelection {
    fn default() -> Self {
        Self {
            acceleration: true,
            magnetic: true,
            orientation: true,
            proximity: true,
            light: true,
            gyroscope: true,
            pressure: true,
        }
    }
}

/// AKM8975 calibration settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagnetometerConfig {
    /// Chip mounting pattern (AKM PAT1..PAT8)
    #[serde(default = "default_layout")]
    pub layout: u8,

    /// Moving-average window, in samples
    #[serde(default = "default_averaging")]
    pub averaging: usize,
}

fn default_layout() -> u8 {
    3
}

fn default_averaging() -> usize {
    8
}

impl Default for MagnetometerConfig {
    fn default() -> Self {
        Self {
            layout: default_layout(),
            averaging: default_averaging(),
        }
    }
}
