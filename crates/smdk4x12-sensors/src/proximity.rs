//! CM36651 proximity sensor
//!
//! The driver reports near/far as `ABS_DISTANCE` 0/1; the service expects
//! centimetres, with the far value equal to the sensor's maximum range.

use crate::backend::{BackendKind, SensorBackend};
use crate::event::{SensorEvent, SensorType};
use crate::input::{ABS_DISTANCE, EV_ABS};
use crate::registry::Registry;
use crate::sysfs::SysfsInput;
use crate::SensorError;
use smdk4x12_config::SensorsConfig;
use std::os::unix::io::{AsRawFd, RawFd};

/// Distance reported for "far", in cm
pub const PROXIMITY_FAR: f32 = 8.0;

pub fn convert(value: i32) -> f32 {
    value as f32 * PROXIMITY_FAR
}

pub struct ProximitySensor {
    config: SensorsConfig,
    node: Option<SysfsInput>,
    activated: bool,
    distance: f32,
}

impl ProximitySensor {
    pub fn new(config: &SensorsConfig) -> Self {
        Self {
            config: config.clone(),
            node: None,
            activated: false,
            distance: 0.0,
        }
    }

    fn node(&self) -> Result<&SysfsInput, SensorError> {
        self.node.as_ref().ok_or(SensorError::NotInitialized("proximity"))
    }
}

impl SensorBackend for ProximitySensor {
    fn name(&self) -> &'static str {
        "CM36651 Proximity"
    }

    fn sensor_type(&self) -> SensorType {
        SensorType::Proximity
    }

    fn kind(&self) -> BackendKind {
        BackendKind::EventDriven
    }

    fn init(&mut self, _registry: &Registry) -> Result<(), SensorError> {
        self.node = Some(SysfsInput::open(&self.config, &self.config.inputs.proximity)?);
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

    fn get_data(&mut self) -> Result<SensorEvent, SensorError> {
        let node = self
            .node
            .as_mut()
            .ok_or(SensorError::NotInitialized("proximity"))?;

        let packet = node.input.read_packet();
        if let Some(value) = packet.last_value(EV_ABS, ABS_DISTANCE) {
            self.distance = convert(value);
        }

        let mut event = SensorEvent::new(SensorType::Proximity);
        event.set_scalar(self.distance);
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
