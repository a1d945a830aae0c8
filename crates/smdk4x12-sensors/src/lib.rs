//! Sensors HAL for SMDK4x12 (Exynos 4x12) devices
//!
//! Aggregates the board's sensors behind a single poll device, the way the
//! Android sensor service expects them:
//!
//! - LSM330DLC accelerometer and AKM8975 magnetometer, sampled by our own
//!   threads and republished through uinput virtual devices
//! - CM36651 light and proximity, LSM330DLC gyroscope and LPS331AP barometer,
//!   read straight from their kernel input devices
//! - An orientation sensor fused from the accelerometer and magnetometer
//!
//! # Example
//!
//! ```no_run
//! use smdk4x12_config::SensorsConfig;
//! use smdk4x12_sensors::{SensorEvent, SensorType, SensorsModule};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SensorsConfig::load_default()?;
//!     let mut device = SensorsModule::open(&config)?;
//!
//!     device.activate(SensorType::Light.handle(), 1);
//!     let mut events = [SensorEvent::empty(); 16];
//!     let count = device.poll(&mut events);
//!     println!("{} events", count);
//!     Ok(())
//! }
//! ```

pub mod acceleration;
pub mod backend;
pub mod compass;
pub mod descriptors;
pub mod device;
pub mod event;
pub mod gyroscope;
pub mod hal;
pub mod input;
pub mod light;
pub mod magnetic;
pub mod mock;
pub mod orientation;
pub mod pressure;
pub mod proximity;
pub mod registry;
pub mod sampler;
pub mod sysfs;
pub mod uinput;

pub use backend::{BackendKind, BackendRef, BackendSlot, Needed, SensorBackend};
pub use descriptors::{SENSOR_LIST, SensorDescriptor};
pub use device::{SensorError, SensorsDevice};
pub use event::{GRAVITY_EARTH, SensorEvent, SensorType, SensorVec};
pub use hal::{ModuleInfo, PollDevice, SensorsModule};
pub use orientation::{FusionSink, orientation_calculate};
pub use registry::Registry;
pub use sampler::{Sampler, SamplerState};

/// Sampling period of the threaded backends until the service sets one, in ns
pub const DEFAULT_DELAY_NS: i64 = 200_000_000;

/// Sensors HAL Result type
pub type Result<T> = std::result::Result<T, SensorError>;
