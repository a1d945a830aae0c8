//! LSM330DLC gyroscope, read from the kernel's `gyro_sensor` input device

use crate::backend::{BackendKind, SensorBackend};
use crate::event::{SensorEvent, SensorType, SensorVec};
use crate::input::{EV_REL, REL_RX, REL_RY, REL_RZ};
use crate::registry::Registry;
use crate::sysfs::SysfsInput;
use crate::SensorError;
use smdk4x12_config::SensorsConfig;
use std::os::unix::io::{AsRawFd, RawFd};

const PI: f32 = 3.1415926535;

/// Raw input value (70/4000 dps per count) to rad/s
pub fn convert(value: i32) -> f32 {
    value as f32 * (70.0 / 4000.0) * (PI / 180.0)
}

pub struct GyroscopeSensor {
    config: SensorsConfig,
    node: Option<SysfsInput>,
    activated: bool,
    axes: [f32; 3],
}

impl GyroscopeSensor {
    pub fn new(config: &SensorsConfig) -> Self {
        Self {
            config: config.clone(),
            node: None,
            activated: false,
            axes: [0.0; 3],
        }
    }

    fn node(&self) -> Result<&SysfsInput, SensorError> {
        self.node.as_ref().ok_or(SensorError::NotInitialized("gyroscope"))
    }
}

impl SensorBackend for GyroscopeSensor {
    fn name(&self) -> &'static str {
        "LSM330DLC Gyroscope"
    }

    fn sensor_type(&self) -> SensorType {
        SensorType::Gyroscope
    }

    fn kind(&self) -> BackendKind {
        BackendKind::EventDriven
    }

    fn init(&mut self, _registry: &Registry) -> Result<(), SensorError> {
        self.node = Some(SysfsInput::open(&self.config, &self.config.inputs.gyroscope)?);
        Ok(())
    }

    fn deinit(&mut self) {
        self.activated = false;
        self.node = None;
    }

    fn activate(&mut self) -> Result<(), SensorError> {
        self.node()?.control.set_enabled(true)?;
        self.activated = true;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), SensorError> {
        self.node()?.control.set_enabled(false)?;
        self.activated = false;
        Ok(())
    }

    /// Written to `poll_delay` as given
    fn set_delay(&mut self, delay: i64) -> Result<(), SensorError> {
        self.node()?.control.set_poll_delay(delay)
    }

    fn get_data(&mut self) -> Result<SensorEvent, SensorError> {
        let node = self
            .node
            .as_mut()
            .ok_or(SensorError::NotInitialized("gyroscope"))?;

        let packet = node.input.read_packet();
        packet.update_axes(EV_REL, [REL_RX, REL_RY, REL_RZ], convert, &mut self.axes);

        let mut event = SensorEvent::new(SensorType::Gyroscope);
        event.vector = SensorVec::from_axes(self.axes);
        if let Some(timestamp) = packet.report_timestamp() {
            event.timestamp = timestamp;
        }

        Ok(event)
    }

    fn poll_fd(&self) -> Option<RawFd> {
        self.node.as_ref().map(|node| node.input.as_raw_fd())
    }

    fn is_activated(&self) -> bool {
        self.activated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputEvent;
    use crate::mock::{MockFeed, input_pair};
    use crate::sysfs::{SysfsControl, value_read};
    use std::fs;
    use tempfile::TempDir;

    fn attached() -> (GyroscopeSensor, MockFeed, TempDir) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("enable"), "0\n").unwrap();
        fs::write(dir.path().join("poll_delay"), "0\n").unwrap();

        let (input, feed) = input_pair("gyro_sensor").unwrap();
        let mut sensor = GyroscopeSensor::new(&SensorsConfig::default());
        sensor.node = Some(SysfsInput {
            input,
            control: SysfsControl::at(dir.path()),
        });
        (sensor, feed, dir)
    }

    #[test]
    fn test_convert() {
        // 4000 counts = 70 dps
        assert!((convert(4000) - 70.0_f32.to_radians()).abs() < 1e-5);
        assert_eq!(convert(0), 0.0);
    }

    #[test]
    fn test_missing_axes_repeat() {
        let (mut sensor, feed, _dir) = attached();

        feed.send(&[
            InputEvent::new(EV_REL, REL_RX, 4000),
            InputEvent::new(EV_REL, REL_RY, -4000),
            InputEvent::new(EV_REL, REL_RZ, 8000),
            InputEvent::syn_report(),
        ])
        .unwrap();
        let first = sensor.get_data().unwrap();

        feed.send(&[InputEvent::new(EV_REL, REL_RY, 0), InputEvent::syn_report()])
            .unwrap();
        let second = sensor.get_data().unwrap();

        assert_eq!(second.vector.x, first.vector.x);
        assert_eq!(second.vector.y, 0.0);
        assert_eq!(second.vector.z, first.vector.z);
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn test_sysfs_controls() {
        let (mut sensor, _feed, dir) = attached();

        sensor.activate().unwrap();
        assert!(sensor.is_activated());
        assert_eq!(value_read(&dir.path().join("enable")).unwrap(), 1);

        sensor.set_delay(5_000_000).unwrap();
        assert_eq!(value_read(&dir.path().join("poll_delay")).unwrap(), 5_000_000);

        sensor.deactivate().unwrap();
        assert!(!sensor.is_activated());
        assert_eq!(value_read(&dir.path().join("enable")).unwrap(), 0);
    }

    #[test]
    fn test_init_without_nodes() {
        let dir = TempDir::new().unwrap();
        let mut config = SensorsConfig::default();
        config.paths.input_dir = dir.path().join("input");
        config.paths.sysfs_input_class = dir.path().join("class");

        let mut sensor = GyroscopeSensor::new(&config);
        assert!(sensor.init(&Registry::new()).is_err());
        assert_eq!(sensor.poll_fd(), None);
        assert_eq!(sensor.set_delay(1).unwrap_err().errno(), -libc::EINVAL);
    }
}
