//! LPS331AP barometer
//!
//! Each packet carries a fresh `REL_X` reading in 1/4096 hPa. A sync record
//! that arrives without a non-zero reading rejects the whole packet.

use crate::backend::{BackendKind, SensorBackend};
use crate::event::{SensorEvent, SensorType};
use crate::input::{EV_REL, EV_SYN, REL_X, SYN_REPORT};
use crate::registry::Registry;
use crate::sysfs::SysfsInput;
use crate::SensorError;
use smdk4x12_config::SensorsConfig;
use std::os::unix::io::{AsRawFd, RawFd};

/// Shortest period the driver accepts, in ms
const MIN_DELAY_MS: i64 = 10;

pub fn convert(value: i32) -> f32 {
    value as f32 / 4096.0
}

/// Sampling period in ns to the driver's `poll_delay` in ms
pub fn delay_ms(delay_ns: i64) -> i64 {
    if delay_ns < MIN_DELAY_MS * 1_000_000 {
        MIN_DELAY_MS
    } else {
        delay_ns / 1_000_000
    }
}

pub struct PressureSensor {
    config: SensorsConfig,
    node: Option<SysfsInput>,
    activated: bool,
}

impl PressureSensor {
    pub fn new(config: &SensorsConfig) -> Self {
        Self {
            config: config.clone(),
            node: None,
            activated: false,
        }
    }

    fn node(&self) -> Result<&SysfsInput, SensorError> {
        self.node.as_ref().ok_or(SensorError::NotInitialized("pressure"))
    }
}

impl SensorBackend for PressureSensor {
    fn name(&self) -> &'static str {
        "LPS331AP"
    }

    fn sensor_type(&self) -> SensorType {
        SensorType::Pressure
    }

    fn kind(&self) -> BackendKind {
        BackendKind::EventDriven
    }

    fn init(&mut self, _registry: &Registry) -> Result<(), SensorError> {
        self.node = Some(SysfsInput::open(&self.config, &self.config.inputs.pressure)?);
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

    fn set_delay(&mut self, delay: i64) -> Result<(), SensorError> {
        self.node()?.control.set_poll_delay(delay_ms(delay))
    }

    fn get_data(&mut self) -> Result<SensorEvent, SensorError> {
        let node = self
            .node
            .as_mut()
            .ok_or(SensorError::NotInitialized("pressure"))?;

        let packet = node.input.read_packet();
        let mut event = SensorEvent::new(SensorType::Pressure);

        for input in &packet.events {
            match (input.kind, input.code) {
                (EV_REL, REL_X) => event.set_scalar(convert(input.value)),
                (EV_SYN, SYN_REPORT) if event.scalar() != 0.0 => {
                    event.timestamp = input.timestamp_ns();
                }
                (EV_SYN, _) => return Err(SensorError::IncompletePacket("pressure")),
                _ => {}
            }
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
