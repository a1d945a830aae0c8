//! Orientation sensor, fused from acceleration and magnetic field
//!
//! The acceleration and magnetic backends push every sample they read into a
//! [`FusionSink`]. A sampling thread turns the latest pair into azimuth, pitch
//! and roll (tilt-compensated compass) and publishes it through a virtual
//! input device, so the aggregator reads it like any other sensor.
//!
//! Activating orientation claims both dependencies with
//! [`Needed::ORIENTATION`]; they are only switched on if nobody else already
//! runs them.

use crate::backend::{BackendKind, BackendRef, Needed, SensorBackend};
use crate::event::{SENSOR_STATUS_ACCURACY_MEDIUM, SensorEvent, SensorType, SensorVec};
use crate::input::{EV_REL, InputStream, REL_XYZ};
use crate::registry::Registry;
use crate::sampler::Sampler;
use crate::uinput::{Publish, VirtualInput, scale_milli};
use crate::{DEFAULT_DELAY_NS, SensorError};
use smdk4x12_config::SensorsConfig;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, PoisonError};

const PI: f32 = 3.1415926535;

fn rad2deg(value: f32) -> f32 {
    value * 180.0 / PI
}

/// Latest samples of both dependencies
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FusionSnapshot {
    pub acceleration: SensorVec,
    pub magnetic: SensorVec,
}

/// Shared input of the orientation fusion
#[derive(Debug, Clone, Default)]
pub struct FusionSink {
    inner: Arc<Mutex<FusionSnapshot>>,
}

impl FusionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whichever vectors are given
    pub fn fill(&self, acceleration: Option<&SensorVec>, magnetic: Option<&SensorVec>) {
        let mut snapshot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(acceleration) = acceleration {
            snapshot.acceleration = SensorVec::from_axes(acceleration.axes());
        }
        if let Some(magnetic) = magnetic {
            snapshot.magnetic = SensorVec::from_axes(magnetic.axes());
        }
    }

    pub fn snapshot(&self) -> FusionSnapshot {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Azimuth, pitch and roll in degrees from acceleration `a` and field `m`
///
/// Azimuth is in `[0, 360)`. Samples are used as given: no staleness check,
/// no filtering.
pub fn orientation_calculate(a: &SensorVec, m: &SensorVec) -> SensorVec {
    let la = a.length();
    let pitch = (-a.y / la).asin();
    let roll = (a.x / la).asin();

    let (sinp, cosp) = pitch.sin_cos();
    let (sinr, cosr) = roll.sin_cos();

    let y = -m.x * cosr + m.z * sinr;
    let x = m.x * sinp * sinr + m.y * cosp + m.z * sinp * cosr;

    let mut azimuth = rad2deg(y.atan2(x));
    if azimuth < 0.0 {
        azimuth += 360.0;
    }
    // -0.00001 + 360 rounds to 360 in f32
    if azimuth >= 360.0 {
        azimuth -= 360.0;
    }

    SensorVec::new(azimuth, rad2deg(pitch), rad2deg(roll))
}

/// Decode one packet of fused angles, published in thousandths of a degree
fn next_event(input: &mut InputStream) -> SensorEvent {
    let packet = input.read_packet();

    let mut event = SensorEvent::new(SensorType::Orientation);
    event.vector = SensorVec::from_axes(packet.axes(EV_REL, REL_XYZ, |v| v as f32 / 1000.0))
        .with_status(SENSOR_STATUS_ACCURACY_MEDIUM);
    if let Some(timestamp) = packet.report_timestamp() {
        event.timestamp = timestamp;
    }

    event
}

struct Dependencies {
    acceleration: BackendRef,
    magnetic: BackendRef,
}

impl Dependencies {
    fn resolve(registry: &Registry) -> Result<Self, SensorError> {
        let find = |sensor: SensorType, dependency: &'static str| {
            registry
                .find(sensor)
                .cloned()
                .ok_or(SensorError::MissingDependency {
                    backend: "orientation",
                    dependency,
                })
        };

        Ok(Self {
            acceleration: find(SensorType::Accelerometer, "acceleration")?,
            magnetic: find(SensorType::MagneticField, "magnetic field")?,
        })
    }

    fn both(&self) -> [&BackendRef; 2] {
        [&self.acceleration, &self.magnetic]
    }
}

/// Where fused samples are written and read back from
enum Output {
    Virtual(VirtualInput),
    /// Writer and node handed in by the caller, taken by the first `init`
    Attached(Option<(Box<dyn Publish>, InputStream)>),
}

struct Io {
    sampler: Sampler,
    input: InputStream,
}

pub struct OrientationSensor {
    output: Output,
    sink: FusionSink,
    dependencies: Option<Dependencies>,
    io: Option<Io>,
    activated: bool,
    delay: i64,
}

impl OrientationSensor {
    pub fn new(config: &SensorsConfig) -> Self {
        Self::with(Output::Virtual(VirtualInput::from_config(
            config,
            &config.inputs.orientation,
        )))
    }

    /// Publish through `publisher` and read the samples back from `input`
    /// instead of creating a uinput device
    pub fn with_output(publisher: impl Publish + 'static, input: InputStream) -> Self {
        let publisher: Box<dyn Publish> = Box::new(publisher);
        Self::with(Output::Attached(Some((publisher, input))))
    }

    fn with(output: Output) -> Self {
        Self {
            output,
            sink: FusionSink::new(),
            dependencies: None,
            io: None,
            activated: false,
            delay: DEFAULT_DELAY_NS,
        }
    }

    fn open_output(&mut self) -> Result<(Box<dyn Publish>, InputStream), SensorError> {
        match &mut self.output {
            Output::Virtual(virtual_input) => {
                let (device, input) = virtual_input.create()?;
                let device: Box<dyn Publish> = Box::new(device);
                Ok((device, input))
            }
            Output::Attached(attached) => attached
                .take()
                .ok_or_else(|| SensorError::NodeNotFound("orientation".to_string())),
        }
    }

    fn spawn_io(&mut self) -> Result<Io, SensorError> {
        let (device, input) = self.open_output()?;
        let sink = self.sink.clone();

        let sampler = Sampler::spawn("orientation", self.delay, move || {
            let snapshot = sink.snapshot();
            let orientation = orientation_calculate(&snapshot.acceleration, &snapshot.magnetic);

            if let Err(e) = device.publish(orientation.axes().map(scale_milli)) {
                tracing::warn!("Unable to publish orientation: {}", e);
            }
            Ok(())
        })?;

        Ok(Io { sampler, input })
    }

    fn dependencies(&self) -> Result<&Dependencies, SensorError> {
        self.dependencies
            .as_ref()
            .ok_or(SensorError::NotInitialized("orientation"))
    }
}

impl SensorBackend for OrientationSensor {
    fn name(&self) -> &'static str {
        "Orientation"
    }

    fn sensor_type(&self) -> SensorType {
        SensorType::Orientation
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Derived
    }

    fn init(&mut self, registry: &Registry) -> Result<(), SensorError> {
        let dependencies = Dependencies::resolve(registry).map_err(|e| {
            tracing::error!("Missing sensors for orientation: {}", e);
            e
        })?;

        self.io = Some(self.spawn_io()?);
        self.dependencies = Some(dependencies);
        Ok(())
    }

    fn deinit(&mut self) {
        if self.activated
            && let Err(e) = self.deactivate()
        {
            tracing::error!("Unable to deactivate orientation: {}", e);
        }

        self.activated = false;
        self.io = None;
        self.dependencies = None;
    }

    fn activate(&mut self) -> Result<(), SensorError> {
        tracing::debug!("Activating orientation");

        for dependency in self.dependencies()?.both() {
            if let Err(e) = dependency.lock().request(Needed::ORIENTATION) {
                tracing::error!("Unable to activate {} for orientation: {}", dependency.name(), e);
            }
        }

        self.activated = true;
        if let Some(io) = &self.io {
            io.sampler.start();
        }
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), SensorError> {
        tracing::debug!("Deactivating orientation");

        for dependency in self.dependencies()?.both() {
            if let Err(e) = dependency.lock().release(Needed::ORIENTATION) {
                tracing::error!("Unable to deactivate {} for orientation: {}", dependency.name(), e);
            }
        }

        self.activated = false;
        if let Some(io) = &self.io {
            io.sampler.pause();
        }
        Ok(())
    }

    /// Also paces dependencies that only run for orientation
    fn set_delay(&mut self, delay: i64) -> Result<(), SensorError> {
        tracing::debug!("Orientation delay {}", delay);

        for dependency in self.dependencies()?.both() {
            let mut slot = dependency.lock();
            if slot.needed() == Needed::ORIENTATION
                && let Err(e) = slot.set_delay(delay)
            {
                tracing::error!("Unable to set {} delay: {}", dependency.name(), e);
            }
        }

        self.delay = delay;
        if let Some(io) = &self.io {
            io.sampler.set_delay(delay);
        }
        Ok(())
    }

    fn get_data(&mut self) -> Result<SensorEvent, SensorError> {
        let io = self
            .io
            .as_mut()
            .ok_or(SensorError::NotInitialized("orientation"))?;

        Ok(next_event(&mut io.input))
    }

    fn poll_fd(&self) -> Option<RawFd> {
        self.io.as_ref().map(|io| io.input.as_raw_fd())
    }

    fn is_activated(&self) -> bool {
        self.activated
    }

    fn fusion_sink(&self) -> Option<FusionSink> {
        Some(self.sink.clone())
    }
}

#[cfg(test)]
impl OrientationSensor {
    /// Orientation wired to its dependencies, without a virtual device
    fn detached(acceleration: BackendRef, magnetic: BackendRef) -> Self {
        let mut sensor = Self::new(&SensorsConfig::default());
        sensor.dependencies = Some(Dependencies {
            acceleration,
            magnetic,
        });
        sensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{InputEvent, REL_X};
    use crate::mock::{MockCalls, MockSensor, input_pair};

    const B: f32 = 40.0;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    fn dependency(sensor: SensorType) -> (BackendRef, MockCalls) {
        let (mock, _feed) = MockSensor::new(sensor).unwrap();
        let calls = mock.calls();
        let backend = BackendRef::new(Box::new(mock));
        backend.lock().init(&Registry::new()).unwrap();
        (backend, calls)
    }

    #[test]
    fn test_flat_facing_north() {
        let a = SensorVec::new(0.0, 0.0, 9.81);
        let m = SensorVec::new(0.0, B, 0.0);
        let o = orientation_calculate(&a, &m);

        assert_close(o.azimuth(), 0.0);
        assert_close(o.pitch(), 0.0);
        assert_close(o.roll(), 0.0);
    }

    #[test]
    fn test_azimuth_wrapped() {
        let a = SensorVec::new(0.0, 0.0, 9.81);

        // atan2(-B, 0) is -90 degrees before wrapping
        let o = orientation_calculate(&a, &SensorVec::new(B, 0.0, 0.0));
        assert_close(o.azimuth(), 270.0);

        let o = orientation_calculate(&a, &SensorVec::new(-B, 0.0, 0.0));
        assert_close(o.azimuth(), 90.0);

        let o = orientation_calculate(&a, &SensorVec::new(B, -0.001, 0.0));
        assert!((0.0..360.0).contains(&o.azimuth()));
    }

    #[test]
    fn test_tilt() {
        let g = 9.81_f32;
        let half = 30.0_f32.to_radians().sin() * g;
        let rest = 30.0_f32.to_radians().cos() * g;

        let o = orientation_calculate(&SensorVec::new(0.0, -half, rest), &SensorVec::new(0.0, B, 0.0));
        assert_close(o.pitch(), 30.0);
        assert_close(o.roll(), 0.0);

        let o = orientation_calculate(&SensorVec::new(half, 0.0, rest), &SensorVec::new(0.0, B, 0.0));
        assert_close(o.roll(), 30.0);
    }

    #[test]
    fn test_next_event_level_angles() {
        let (mut input, feed) = input_pair("orientation").unwrap();

        feed.push([90_000, 12_500, -3_000]).unwrap();
        assert_eq!(next_event(&mut input).vector.axes(), [90.0, 12.5, -3.0]);

        // Pitch and roll back to level
        feed.send(&[InputEvent::new(EV_REL, REL_X, 91_000), InputEvent::syn_report()])
            .unwrap();
        let event = next_event(&mut input);
        assert_eq!(event.vector.axes(), [91.0, 0.0, 0.0]);
        assert_eq!(event.vector.status, SENSOR_STATUS_ACCURACY_MEDIUM);
    }

    #[test]
    fn test_attached_output_used_once() {
        let (input, feed) = input_pair("orientation").unwrap();

        let mut sensor = OrientationSensor::with_output(feed, input);
        sensor.io = Some(sensor.spawn_io().unwrap());
        assert!(sensor.poll_fd().is_some());

        assert!(matches!(sensor.spawn_io(), Err(SensorError::NodeNotFound(_))));
    }

    #[test]
    fn test_fusion_sink_fill() {
        let sink = FusionSink::new();
        let acceleration = SensorVec::new(1.0, 2.0, 3.0).with_status(SENSOR_STATUS_ACCURACY_MEDIUM);

        sink.fill(Some(&acceleration), None);
        sink.fill(None, Some(&SensorVec::new(4.0, 5.0, 6.0)));
        sink.fill(None, None);

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.acceleration.axes(), [1.0, 2.0, 3.0]);
        assert_eq!(snapshot.magnetic.axes(), [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_init_requires_dependencies() {
        let registry = Registry::new().with(MockSensor::inert(SensorType::Light));

        let mut sensor = OrientationSensor::new(&SensorsConfig::default());
        let err = sensor.init(&registry).unwrap_err();
        assert!(matches!(err, SensorError::MissingDependency { .. }));
        assert_eq!(sensor.poll_fd(), None);
        assert_eq!(sensor.activate().unwrap_err().errno(), -libc::EINVAL);
    }

    #[test]
    fn test_dependencies_activated_once() {
        let (accel, accel_calls) = dependency(SensorType::Accelerometer);
        let (magnetic, magnetic_calls) = dependency(SensorType::MagneticField);

        // Acceleration already running for the sensor service
        accel.lock().request(Needed::API).unwrap();

        let mut orientation = OrientationSensor::detached(accel.clone(), magnetic.clone());
        orientation.activate().unwrap();
        orientation.activate().unwrap();

        assert_eq!(accel_calls.activations(), 1);
        assert_eq!(magnetic_calls.activations(), 1);
        assert_eq!(accel.lock().needed(), Needed::API | Needed::ORIENTATION);

        orientation.deactivate().unwrap();
        assert_eq!(accel.lock().needed(), Needed::API);
        assert!(accel.lock().is_activated());
        assert_eq!(magnetic.lock().needed(), Needed::NONE);
        assert_eq!(magnetic_calls.deactivations(), 1);
        assert!(!orientation.is_activated());
    }

    #[test]
    fn test_delay_forwarded_to_orientation_only_dependencies() {
        let (accel, accel_calls) = dependency(SensorType::Accelerometer);
        let (magnetic, magnetic_calls) = dependency(SensorType::MagneticField);

        let mut orientation = OrientationSensor::detached(accel.clone(), magnetic.clone());
        orientation.activate().unwrap();
        accel.lock().request(Needed::API).unwrap();

        orientation.set_delay(20_000_000).unwrap();
        assert_eq!(accel_calls.delays(), Vec::<i64>::new());
        assert_eq!(magnetic_calls.delays(), vec![20_000_000]);
    }

    #[test]
    fn test_deinit_releases_claims() {
        let (accel, _accel_calls) = dependency(SensorType::Accelerometer);
        let (magnetic, _magnetic_calls) = dependency(SensorType::MagneticField);

        let mut orientation = OrientationSensor::detached(accel.clone(), magnetic.clone());
        orientation.activate().unwrap();
        orientation.deinit();

        assert_eq!(accel.lock().needed(), Needed::NONE);
        assert_eq!(magnetic.lock().needed(), Needed::NONE);
        assert!(orientation.fusion_sink().is_some());
    }
}
