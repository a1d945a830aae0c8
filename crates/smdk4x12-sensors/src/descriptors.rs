//! Static sensor list reported to the sensor service

use crate::event::{GRAVITY_EARTH, SensorType};
use std::fmt;

pub const SENSOR_FLAG_CONTINUOUS_MODE: u32 = 0;
pub const SENSOR_FLAG_ON_CHANGE_MODE: u32 = 0x2;
pub const SENSOR_FLAG_WAKE_UP: u32 = 0x1;

const PI: f32 = 3.1415926535;

/// One entry of the sensor list (`struct sensor_t`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorDescriptor {
    pub name: &'static str,
    pub vendor: &'static str,
    pub version: i32,
    pub sensor_type: SensorType,
    /// Maximum range, in the sensor's unit
    pub max_range: f32,
    pub resolution: f32,
    /// Power draw, in mA
    pub power: f32,
    /// Shortest period, in µs (0 for on-change sensors)
    pub min_delay: i32,
    /// Longest period, in µs (0 when undefined)
    pub max_delay: i32,
    pub flags: u32,
}

impl SensorDescriptor {
    pub fn handle(&self) -> i32 {
        self.sensor_type.handle()
    }

    pub fn string_type(&self) -> &'static str {
        self.sensor_type.string_type()
    }

    pub fn is_wake_up(&self) -> bool {
        self.flags & SENSOR_FLAG_WAKE_UP != 0
    }

    pub fn is_on_change(&self) -> bool {
        self.flags & SENSOR_FLAG_ON_CHANGE_MODE != 0
    }
}

impl fmt::Display for SensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>2}  {:<32} {:<20} range={} resolution={} power={}mA delay={}..{}us",
            self.handle(),
            self.name,
            self.vendor,
            self.max_range,
            self.resolution,
            self.power,
            self.min_delay,
            self.max_delay
        )
    }
}

pub static SENSOR_LIST: [SensorDescriptor; 7] = [
    SensorDescriptor {
        name: "LSM330DLC Acceleration Sensor",
        vendor: "STMicroelectronics",
        version: 1,
        sensor_type: SensorType::Accelerometer,
        max_range: 2.0 * GRAVITY_EARTH,
        resolution: 0.0096,
        power: 0.23,
        min_delay: 10000,
        max_delay: 0,
        flags: SENSOR_FLAG_ON_CHANGE_MODE,
    },
    SensorDescriptor {
        name: "AKM8975 Magnetic Sensor",
        vendor: "Asahi Kasei",
        version: 1,
        sensor_type: SensorType::MagneticField,
        max_range: 2000.0,
        resolution: 1.0 / 16.0,
        power: 6.8,
        min_delay: 10000,
        max_delay: 0,
        flags: SENSOR_FLAG_ON_CHANGE_MODE,
    },
    SensorDescriptor {
        name: "Orientation Sensor",
        vendor: "Exynos Sensors",
        version: 1,
        sensor_type: SensorType::Orientation,
        max_range: 360.0,
        resolution: 0.1,
        power: 0.0,
        min_delay: 10000,
        max_delay: 0,
        flags: SENSOR_FLAG_CONTINUOUS_MODE,
    },
    SensorDescriptor {
        name: "CM36651 Light Sensor",
        vendor: "Capella",
        version: 1,
        sensor_type: SensorType::Light,
        max_range: 121240.0,
        resolution: 1.0,
        power: 0.2,
        min_delay: 0,
        max_delay: 0,
        flags: SENSOR_FLAG_ON_CHANGE_MODE,
    },
    SensorDescriptor {
        name: "CM36651 Proximity Sensor",
        vendor: "Capella",
        version: 1,
        sensor_type: SensorType::Proximity,
        max_range: 8.0,
        resolution: 8.0,
        power: 1.3,
        min_delay: 0,
        max_delay: 0,
        flags: SENSOR_FLAG_WAKE_UP | SENSOR_FLAG_ON_CHANGE_MODE,
    },
    SensorDescriptor {
        name: "LSM330DLC Gyroscope Sensor",
        vendor: "STMicroelectronics",
        version: 1,
        sensor_type: SensorType::Gyroscope,
        max_range: 500.0 * (PI / 180.0),
        resolution: (70.0 / 4000.0) * (PI / 180.0),
        power: 6.1,
        min_delay: 5000,
        max_delay: 0,
        flags: SENSOR_FLAG_ON_CHANGE_MODE,
    },
    SensorDescriptor {
        name: "LPS331AP Pressure Sensor",
        vendor: "STMicroelectronics",
        version: 1,
        sensor_type: SensorType::Pressure,
        max_range: 1260.0,
        resolution: 1.0 / 4096.0,
        power: 0.045,
        min_delay: 40000,
        max_delay: 20000,
        flags: SENSOR_FLAG_CONTINUOUS_MODE,
    },
];

/// Descriptor for a handle, if the device has that sensor
pub fn find(handle: i32) -> Option<&'static SensorDescriptor> {
    SENSOR_LIST.iter().find(|d| d.handle() == handle)
}
