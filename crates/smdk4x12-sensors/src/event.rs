//! Sensor types and the event record handed to the sensor service
//!
//! [`SensorEvent`] mirrors Android's `sensors_event_t` byte for byte, so a
//! slice of events can be passed across the HAL boundary unchanged.

use std::mem;

/// Standard gravity, in m/s²
pub const GRAVITY_EARTH: f32 = 9.80665;

/// Accuracy reported with every vector sample
pub const SENSOR_STATUS_ACCURACY_MEDIUM: i8 = 2;

/// Sensor handle / type identifiers shared with the sensor list
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    Accelerometer = 1,
    MagneticField = 2,
    Orientation = 3,
    Gyroscope = 4,
    Light = 5,
    Pressure = 6,
    Proximity = 8,
}

impl SensorType {
    /// Numeric handle as seen by the sensor service
    pub const fn handle(self) -> i32 {
        self as i32
    }

    /// Look up a handle coming from the sensor service
    pub fn from_handle(handle: i32) -> Option<Self> {
        match handle {
            1 => Some(SensorType::Accelerometer),
            2 => Some(SensorType::MagneticField),
            3 => Some(SensorType::Orientation),
            4 => Some(SensorType::Gyroscope),
            5 => Some(SensorType::Light),
            6 => Some(SensorType::Pressure),
            8 => Some(SensorType::Proximity),
            _ => None,
        }
    }

    /// Android string type
    pub fn string_type(self) -> &'static str {
        match self {
            SensorType::Accelerometer => "android.sensor.accelerometer",
            SensorType::MagneticField => "android.sensor.magnetic_field",
            SensorType::Orientation => "android.sensor.orientation",
            SensorType::Gyroscope => "android.sensor.gyroscope",
            SensorType::Light => "android.sensor.light",
            SensorType::Pressure => "android.sensor.pressure",
            SensorType::Proximity => "android.sensor.proximity",
        }
    }
}

/// Three-axis sample: (x, y, z) or (azimuth, pitch, roll)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorVec {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub status: i8,
    pub reserved: [u8; 3],
}

impl SensorVec {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::default()
        }
    }

    pub fn from_axes(axes: [f32; 3]) -> Self {
        Self::new(axes[0], axes[1], axes[2])
    }

    pub fn with_status(mut self, status: i8) -> Self {
        self.status = status;
        self
    }

    pub fn axes(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn azimuth(&self) -> f32 {
        self.x
    }

    pub fn pitch(&self) -> f32 {
        self.y
    }

    pub fn roll(&self) -> f32 {
        self.z
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// One sensor reading (`sensors_event_t`)
///
/// The 64-byte data union is laid out as a [`SensorVec`] followed by twelve
/// spare floats. Scalar sensors (light, pressure, distance) store their value
/// in the first float, which is where the union puts them too.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub version: i32,
    pub sensor: i32,
    pub sensor_type: i32,
    pub reserved0: i32,
    /// Nanoseconds, from the input event that closed the packet
    pub timestamp: i64,
    pub vector: SensorVec,
    pub payload: [f32; 12],
    pub flags: u32,
    pub reserved1: [u32; 3],
}

const _: () = assert!(mem::size_of::<SensorEvent>() == 104);

impl SensorEvent {
    /// Fresh event for a sensor, all readings zeroed
    pub fn new(sensor: SensorType) -> Self {
        Self {
            version: mem::size_of::<SensorEvent>() as i32,
            sensor: sensor.handle(),
            sensor_type: sensor.handle(),
            ..Self::empty()
        }
    }

    /// All-zero record, used to size caller buffers
    pub fn empty() -> Self {
        Self {
            version: 0,
            sensor: 0,
            sensor_type: 0,
            reserved0: 0,
            timestamp: 0,
            vector: SensorVec::default(),
            payload: [0.0; 12],
            flags: 0,
            reserved1: [0; 3],
        }
    }

    pub fn sensor_type(&self) -> Option<SensorType> {
        SensorType::from_handle(self.sensor_type)
    }

    /// Scalar reading (light in lux, pressure in hPa, distance in cm)
    pub fn scalar(&self) -> f32 {
        self.vector.x
    }

    pub fn set_scalar(&mut self, value: f32) {
        self.vector.x = value;
    }
}

impl Default for SensorEvent {
    fn default() -> Self {
        Self::empty()
    }
}
