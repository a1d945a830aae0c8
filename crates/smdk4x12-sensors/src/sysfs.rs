//! sysfs helpers
//!
//! Event-driven sensors are switched on and paced through the `enable` and
//! `poll_delay` attributes of their input class directory.

use crate::SensorError;
use crate::input::InputStream;
use smdk4x12_config::SensorsConfig;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Find the entry of `class_dir` whose `name` attribute is `name`
pub fn path_prefix(class_dir: &Path, name: &str) -> Result<PathBuf, SensorError> {
    for entry in fs::read_dir(class_dir)? {
        let entry = entry?;
        let path = entry.path();

        let Ok(contents) = fs::read_to_string(path.join("name")) else {
            continue;
        };

        if contents.split('\n').next() == Some(name) {
            return Ok(path);
        }
    }

    Err(SensorError::NodeNotFound(name.to_string()))
}

pub fn string_read(path: &Path) -> Result<String, SensorError> {
    fs::read_to_string(path).map_err(|source| SensorError::Sysfs {
        path: path.to_path_buf(),
        source,
    })
}

pub fn string_write(path: &Path, value: &str) -> Result<(), SensorError> {
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .and_then(|mut file| file.write_all(value.as_bytes()))
        .map_err(|source| SensorError::Sysfs {
            path: path.to_path_buf(),
            source,
        })
}

/// Read a decimal attribute
pub fn value_read(path: &Path) -> Result<i64, SensorError> {
    let contents = string_read(path)?;
    contents.trim().parse().map_err(|_| {
        SensorError::InvalidArgument(format!(
            "{} does not hold a number: {:?}",
            path.display(),
            contents.trim()
        ))
    })
}

pub fn value_write(path: &Path, value: i64) -> Result<(), SensorError> {
    string_write(path, &format!("{}\n", value))
}

/// The `enable` / `poll_delay` pair of one input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsControl {
    enable: PathBuf,
    poll_delay: PathBuf,
}

impl SysfsControl {
    /// Locate the attributes of the input device called `name`
    pub fn locate(class_dir: &Path, name: &str) -> Result<Self, SensorError> {
        let prefix = path_prefix(class_dir, name)?;
        Ok(Self::at(&prefix))
    }

    pub fn at(prefix: &Path) -> Self {
        Self {
            enable: prefix.join("enable"),
            poll_delay: prefix.join("poll_delay"),
        }
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), SensorError> {
        value_write(&self.enable, i64::from(enabled))
    }

    pub fn set_poll_delay(&self, delay: i64) -> Result<(), SensorError> {
        value_write(&self.poll_delay, delay)
    }

    pub fn enable_path(&self) -> &Path {
        &self.enable
    }

    pub fn poll_delay_path(&self) -> &Path {
        &self.poll_delay
    }
}

/// Kernel-fed input node plus its sysfs controls
#[derive(Debug)]
pub struct SysfsInput {
    pub input: InputStream,
    pub control: SysfsControl,
}

impl SysfsInput {
    /// Open the input device `name` and locate its sysfs directory
    pub fn open(config: &SensorsConfig, name: &str) -> Result<Self, SensorError> {
        let input = InputStream::open_by_name(&config.paths.input_dir, name).map_err(|e| {
            tracing::error!("Unable to open {} input: {}", name, e);
            e
        })?;

        let control = SysfsControl::locate(&config.paths.sysfs_input_class, name).map_err(|e| {
            tracing::error!("Unable to find {} sysfs directory: {}", name, e);
            e
        })?;

        Ok(Self { input, control })
    }
}
