//! CM36651 ambient light sensor
//!
//! The driver reports the green (`REL_Y`) and white (`REL_MISC`) channels.
//! Lux comes from a calibrated curve keyed on their ratio.

use crate::backend::{BackendKind, SensorBackend};
use crate::event::{SensorEvent, SensorType};
use crate::input::{EV_REL, REL_MISC, REL_Y};
use crate::registry::Registry;
use crate::sysfs::SysfsInput;
use crate::SensorError;
use smdk4x12_config::SensorsConfig;
use std::os::unix::io::{AsRawFd, RawFd};

/// White-channel level above which bright light is scaled down
const WHITE_SATURATION: i32 = 5999;

/// Lux from the white and green channel counts
pub fn convert(white: i32, green: i32) -> f32 {
    if green <= 4 {
        return 0.0;
    }

    let gwrel = if white > 0 {
        green as f32 / white as f32
    } else {
        1.0
    };

    let r1 = ((green as f64).powf(1.3341) * 0.0258) as f32;
    let r1 = r1.floor();

    let aux = ((green as f32 * 0.18 * 9.44) / gwrel).floor();
    let r2 = aux;
    let r3 = aux * 0.77;

    let r4 = (green as f64 * ((gwrel as f64 * 1.546) - 0.46)) as f32;
    let r4 = r4.floor();

    if gwrel <= 0.5 {
        r1
    } else if gwrel >= 0.9 {
        if white <= WHITE_SATURATION { r2 } else { r3 }
    } else {
        r4
    }
}

pub struct LightSensor {
    config: SensorsConfig,
    node: Option<SysfsInput>,
    activated: bool,
}

impl LightSensor {
    pub fn new(config: &SensorsConfig) -> Self {
        Self {
            config: config.clone(),
            node: None,
            activated: false,
        }
    }

    fn node(&self) -> Result<&SysfsInput, SensorError> {
        self.node.as_ref().ok_or(SensorError::NotInitialized("light"))
    }
}

impl SensorBackend for LightSensor {
    fn name(&self) -> &'static str {
        "CM36651 Light"
    }

    fn sensor_type(&self) -> SensorType {
        SensorType::Light
    }

    fn kind(&self) -> BackendKind {
        BackendKind::EventDriven
    }

    fn init(&mut self, _registry: &Registry) -> Result<(), SensorError> {
        self.node = Some(SysfsInput::open(&self.config, &self.config.inputs.light)?);
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
        self.node()?.control.set_poll_delay(delay)
    }

    fn get_data(&mut self) -> Result<SensorEvent, SensorError> {
        let node = self
            .node
            .as_mut()
            .ok_or(SensorError::NotInitialized("light"))?;

        let packet = node.input.read_packet();
        let green = packet.last_value(EV_REL, REL_Y).unwrap_or(0);
        let white = packet.last_value(EV_REL, REL_MISC).unwrap_or(0);

        let mut event = SensorEvent::new(SensorType::Light);
        event.set_scalar(convert(white, green));
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
