//! Ordered collection of the backends a device is opened with

use crate::acceleration::AccelerationSensor;
use crate::backend::{BackendRef, SensorBackend};
use crate::event::SensorType;
use crate::gyroscope::GyroscopeSensor;
use crate::light::LightSensor;
use crate::magnetic::MagneticSensor;
use crate::orientation::OrientationSensor;
use crate::pressure::PressureSensor;
use crate::proximity::ProximitySensor;
use smdk4x12_config::SensorsConfig;
use std::slice;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    backends: Vec<BackendRef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the SMDK4x12 backend set selected by `config`
    ///
    /// Order matters for poll fairness only; it is acceleration, magnetic,
    /// orientation, proximity, light, gyroscope, pressure.
    pub fn from_config(config: &SensorsConfig) -> Self {
        let selection = &config.sensors;
        let mut registry = Self::new();

        if selection.acceleration {
            registry.push(Box::new(AccelerationSensor::new(config)));
        }
        if selection.magnetic {
            registry.push(Box::new(MagneticSensor::new(config)));
        }
        if selection.orientation {
            registry.push(Box::new(OrientationSensor::new(config)));
        }
        if selection.proximity {
            registry.push(Box::new(ProximitySensor::new(config)));
        }
        if selection.light {
            registry.push(Box::new(LightSensor::new(config)));
        }
        if selection.gyroscope {
            registry.push(Box::new(GyroscopeSensor::new(config)));
        }
        if selection.pressure {
            registry.push(Box::new(PressureSensor::new(config)));
        }

        tracing::debug!("Registered {} sensor backends", registry.len());
        registry
    }

    pub fn with<B: SensorBackend + 'static>(mut self, backend: B) -> Self {
        self.push(Box::new(backend));
        self
    }

    pub fn push(&mut self, backend: Box<dyn SensorBackend>) -> BackendRef {
        let backend = BackendRef::new(backend);
        self.backends.push(backend.clone());
        backend
    }

    pub fn find(&self, sensor: SensorType) -> Option<&BackendRef> {
        self.backends.iter().find(|b| b.sensor_type() == sensor)
    }

    pub fn find_handle(&self, handle: i32) -> Option<&BackendRef> {
        self.backends.iter().find(|b| b.handle() == handle)
    }

    pub fn iter(&self) -> slice::Iter<'_, BackendRef> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a BackendRef;
    type IntoIter = slice::Iter<'a, BackendRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;

    #[test]
    fn test_default_order() {
        let registry = Registry::from_config(&SensorsConfig::default());
        let order: Vec<SensorType> = registry.iter().map(BackendRef::sensor_type).collect();

        assert_eq!(
            order,
            vec![
                SensorType::Accelerometer,
                SensorType::MagneticField,
                SensorType::Orientation,
                SensorType::Proximity,
                SensorType::Light,
                SensorType::Gyroscope,
                SensorType::Pressure,
            ]
        );
    }

    #[test]
    fn test_selection_filters() {
        let mut config = SensorsConfig::default();
        config.sensors.orientation = false;
        config.sensors.pressure = false;

        let registry = Registry::from_config(&config);
        assert_eq!(registry.len(), 5);
        assert!(registry.find(SensorType::Orientation).is_none());
        assert!(registry.find_handle(SensorType::Light.handle()).is_some());
        assert!(registry.find_handle(7).is_none());
    }

    #[test]
    fn test_backend_kinds() {
        let registry = Registry::from_config(&SensorsConfig::default());
        let kinds: Vec<BackendKind> = registry.iter().map(|b| b.lock().backend().kind()).collect();

        assert_eq!(
            kinds,
            vec![
                BackendKind::Threaded,
                BackendKind::Threaded,
                BackendKind::Derived,
                BackendKind::EventDriven,
                BackendKind::EventDriven,
                BackendKind::EventDriven,
                BackendKind::EventDriven,
            ]
        );
    }

    #[test]
    fn test_names() {
        let registry = Registry::from_config(&SensorsConfig::default());
        let names: Vec<&str> = registry.iter().map(BackendRef::name).collect();
        assert_eq!(
            names,
            vec![
                "LSM330DLC Acceleration",
                "AKM8975",
                "Orientation",
                "CM36651 Proximity",
                "CM36651 Light",
                "LSM330DLC Gyroscope",
                "LPS331AP",
            ]
        );
    }
}
