//! Device node locations and kernel input names

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem locations of the nodes the backends open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding evdev nodes
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// sysfs class directory of input devices (enable / poll_delay files)
    #[serde(default = "default_sysfs_input_class")]
    pub sysfs_input_class: PathBuf,

    /// uinput control node used to create virtual input devices
    #[serde(default = "default_uinput")]
    pub uinput: PathBuf,

    /// LSM330DLC accelerometer character device
    #[serde(default = "default_accelerometer")]
    pub accelerometer: PathBuf,

    /// AKM8975 magnetometer character device
    #[serde(default = "default_magnetometer")]
    pub magnetometer: PathBuf,

    /// Persisted magnetometer offsets
    #[serde(default = "default_magnetometer_params")]
    pub magnetometer_params: PathBuf,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("/dev/input")
}

fn default_sysfs_input_class() -> PathBuf {
    PathBuf::from("/sys/class/input")
}

fn default_uinput() -> PathBuf {
    PathBuf::from("/dev/uinput")
}

fn default_accelerometer() -> PathBuf {
    PathBuf::from("/dev/accelerometer")
}

fn default_magnetometer() -> PathBuf {
    PathBuf::from("/dev/akm8975")
}

fn default_magnetometer_params() -> PathBuf {
    PathBuf::from("/data/misc/akfs.txt")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            sysfs_input_class: default_sysfs_input_class(),
            uinput: default_uinput(),
            accelerometer: default_accelerometer(),
            magnetometer: default_magnetometer(),
            magnetometer_params: default_magnetometer_params(),
        }
    }
}

/// Kernel input device names, as reported by `EVIOCGNAME` and sysfs `name`
///
/// The first three are virtual devices this HAL creates itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputNames {
    #[serde(default = "default_acceleration")]
    pub acceleration: String,

    #[serde(default = "default_magnetic")]
    pub magnetic: String,

    #[serde(default = "default_orientation")]
    pub orientation: String,

    #[serde(default = "default_gyroscope")]
    pub gyroscope: String,

    #[serde(default = "default_light")]
    pub light: String,

    #[serde(default = "default_proximity")]
    pub proximity: String,

    #[serde(default = "default_pressure")]
    pub pressure: String,
}

fn default_acceleration() -> String {
    "acceleration".to_string()
}

fn default_magnetic() -> String {
    "magnetic".to_string()
}

fn default_orientation() -> String {
    "orientation".to_string()
}

fn default_gyroscope() -> String {
    "gyro_sensor".to_string()
}

fn default_light() -> String {
    "light_sensor".to_string()
}

fn default_proximity() -> String {
    "proximity_sensor".to_string()
}

fn default_pressure() -> String {
    "barometer_sensor".to_string()
}

impl Default for InputNames {
    fn default() -> Self {
        Self {
            acceleration: default_acceleration(),
            magnetic: default_magnetic(),
            orientation: default_orientation(),
            gyroscope: default_gyroscope(),
            light: default_light(),
            proximity: default_proximity(),
            pressure: default_pressure(),
        }
    }
}
