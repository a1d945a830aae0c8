//! HAL entry points
//!
//! [`SensorsModule`] is what the sensor service loads: module metadata, the
//! static sensor list and `open`. [`PollDevice`] is the opened poll device
//! with the integer return convention of the HAL interface (0 or a count on
//! success, negative on error).

use crate::descriptors::{SENSOR_LIST, SensorDescriptor};
use crate::device::SensorsDevice;
use crate::event::SensorEvent;
use crate::registry::Registry;
use crate::SensorError;
use smdk4x12_config::SensorsConfig;

/// Module identity (`hw_module_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub author: &'static str,
    pub version_major: u16,
    pub version_minor: u16,
}

pub struct SensorsModule;

impl SensorsModule {
    pub const INFO: ModuleInfo = ModuleInfo {
        id: "sensors",
        name: "SMDK4x12 Sensors",
        author: "SMDK4x12 Sensors Contributors",
        version_major: 1,
        version_minor: 0,
    };

    pub fn info() -> &'static ModuleInfo {
        &Self::INFO
    }

    pub fn get_sensors_list() -> &'static [SensorDescriptor] {
        &SENSOR_LIST
    }

    /// Open the poll device with the backends selected by `config`
    pub fn open(config: &SensorsConfig) -> Result<PollDevice, SensorError> {
        Self::open_with(Registry::from_config(config))
    }

    /// Open the poll device over an explicit backend set
    pub fn open_with(registry: Registry) -> Result<PollDevice, SensorError> {
        tracing::info!(
            "Opening {} v{}.{}",
            Self::INFO.name,
            Self::INFO.version_major,
            Self::INFO.version_minor
        );

        Ok(PollDevice {
            device: SensorsDevice::open(registry)?,
        })
    }
}

/// Opened `sensors_poll_device_t`
pub struct PollDevice {
    device: SensorsDevice,
}

impl PollDevice {
    pub fn device(&self) -> &SensorsDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut SensorsDevice {
        &mut self.device
    }

    pub fn activate(&mut self, handle: i32, enabled: i32) -> i32 {
        status(self.device.activate(handle, enabled != 0))
    }

    pub fn set_delay(&mut self, handle: i32, ns: i64) -> i32 {
        status(self.device.set_delay(handle, ns))
    }

    /// Number of events written to `data`, or a negative error
    pub fn poll(&mut self, data: &mut [SensorEvent]) -> i32 {
        match self.device.poll(data) {
            Ok(count) => i32::try_from(count).unwrap_or(i32::MAX),
            Err(e) => {
                tracing::error!("Unable to poll sensors: {}", e);
                e.errno()
            }
        }
    }

    pub fn close(&mut self) -> i32 {
        self.device.close();
        0
    }
}

fn status(result: Result<(), SensorError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::debug!("Sensor call failed: {}", e);
            e.errno()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SensorType;
    use crate::mock::MockSensor;

    #[test]
    fn test_module_info() {
        let info = SensorsModule::info();
        assert_eq!(info.id, "sensors");
        assert_eq!(info.name, "SMDK4x12 Sensors");
        assert_eq!((info.version_major, info.version_minor), (1, 0));
        assert_eq!(SensorsModule::get_sensors_list().len(), 7);
    }

    #[test]
    fn test_int_conventions() {
        let (light, _feed) = MockSensor::new(SensorType::Light).unwrap();
        let mut device = SensorsModule::open_with(Registry::new().with(light)).unwrap();

        assert_eq!(device.activate(SensorType::Light.handle(), 1), 0);
        assert_eq!(device.activate(99, 1), -1);
        assert_eq!(device.set_delay(99, 1_000_000), 0);
        assert_eq!(device.poll(&mut []), -libc::EINVAL);
        assert_eq!(device.close(), 0);
        assert_eq!(device.activate(SensorType::Light.handle(), 0), -libc::EINVAL);
    }
}
