//! LSM330DLC accelerometer
//!
//! The driver exposes a character device read through ioctls. A sampling
//! thread reads the three axes and republishes them on the `acceleration`
//! virtual input device.

use crate::backend::{BackendKind, SensorBackend};
use crate::event::{
    GRAVITY_EARTH, SENSOR_STATUS_ACCURACY_MEDIUM, SensorEvent, SensorType, SensorVec,
};
use crate::input::{EV_REL, InputStream, REL_XYZ};
use crate::orientation::FusionSink;
use crate::registry::Registry;
use crate::sampler::Sampler;
use crate::uinput::VirtualInput;
use crate::{DEFAULT_DELAY_NS, SensorError};
use nix::{ioctl_read, ioctl_write_ptr};
use smdk4x12_config::SensorsConfig;
use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::Arc;

/// One READ_XYZ sample, in 1/1024 g
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct AccelSample {
    x: libc::c_int,
    y: libc::c_int,
    z: libc::c_int,
}

ioctl_write_ptr!(accel_set_delay, b'a', 0, i64);
ioctl_read!(accel_read_xyz, b'a', 8, AccelSample);
ioctl_write_ptr!(accel_set_enable, b'a', 9, libc::c_int);

/// Raw input value (milli-units of 1/1024 g) to m/s²
pub fn convert(value: i32) -> f32 {
    (value as f32 / 1000.0) * (GRAVITY_EARTH / 1024.0)
}

struct Io {
    device: Arc<File>,
    sampler: Sampler,
    input: InputStream,
}

pub struct AccelerationSensor {
    device_path: PathBuf,
    virtual_input: VirtualInput,
    io: Option<Io>,
    sink: Option<FusionSink>,
    activated: bool,
}

impl AccelerationSensor {
    pub fn new(config: &SensorsConfig) -> Self {
        Self {
            device_path: config.paths.accelerometer.clone(),
            virtual_input: VirtualInput::from_config(config, &config.inputs.acceleration),
            io: None,
            sink: None,
            activated: false,
        }
    }

    fn io(&self) -> Result<&Io, SensorError> {
        self.io
            .as_ref()
            .ok_or(SensorError::NotInitialized("acceleration"))
    }

    fn set_enable(&self, enable: bool) -> Result<(), SensorError> {
        let io = self.io()?;
        let value = libc::c_int::from(enable);

        // SAFETY: the driver reads one int through the pointer.
        unsafe { accel_set_enable(io.device.as_raw_fd(), &value) }.map_err(|source| {
            tracing::error!("Unable to set lsm330dlc acceleration enable");
            SensorError::Ioctl {
                op: "LSM330DLC_ACCEL_IOCTL_SET_ENABLE",
                source,
            }
        })?;
        Ok(())
    }
}

fn read_sample(device: &File) -> Result<[i32; 3], SensorError> {
    let mut sample = AccelSample::default();

    // SAFETY: the driver fills one AccelSample.
    unsafe { accel_read_xyz(device.as_raw_fd(), &mut sample) }.map_err(|source| {
        SensorError::Ioctl {
            op: "LSM330DLC_ACCEL_IOCTL_READ_XYZ",
            source,
        }
    })?;

    Ok([sample.x, sample.y, sample.z])
}

/// Decode one packet of the virtual node and hand the sample to `sink`
fn next_event(input: &mut InputStream, sink: Option<&FusionSink>) -> SensorEvent {
    let packet = input.read_packet();

    let mut event = SensorEvent::new(SensorType::Accelerometer);
    event.vector = SensorVec::from_axes(packet.axes(EV_REL, REL_XYZ, convert))
        .with_status(SENSOR_STATUS_ACCURACY_MEDIUM);
    if let Some(timestamp) = packet.report_timestamp() {
        event.timestamp = timestamp;
    }

    if let Some(sink) = sink {
        sink.fill(Some(&event.vector), None);
    }

    event
}

impl SensorBackend for AccelerationSensor {
    fn name(&self) -> &'static str {
        "LSM330DLC Acceleration"
    }

    fn sensor_type(&self) -> SensorType {
        SensorType::Accelerometer
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Threaded
    }

    fn init(&mut self, registry: &Registry) -> Result<(), SensorError> {
        self.sink = registry
            .find(SensorType::Orientation)
            .and_then(|orientation| orientation.lock().backend().fusion_sink());

        let device = OpenOptions::new()
            .read(true)
            .open(&self.device_path)
            .map_err(|e| {
                tracing::error!("Unable to open {}: {}", self.device_path.display(), e);
                SensorError::Io(e)
            })?;
        let device = Arc::new(device);

        let (uinput, input) = self.virtual_input.create()?;

        let sampler_device = Arc::clone(&device);
        let sampler = Sampler::spawn("acceleration", DEFAULT_DELAY_NS, move || {
            let raw = read_sample(&sampler_device).map_err(|e| {
                tracing::error!("Unable to get lsm330dlc acceleration data");
                e
            })?;

            if let Err(e) = uinput.publish(raw.map(|v| v.saturating_mul(1000))) {
                tracing::warn!("Unable to publish acceleration: {}", e);
            }
            Ok(())
        })?;

        self.io = Some(Io {
            device,
            sampler,
            input,
        });
        Ok(())
    }

    fn deinit(&mut self) {
        self.activated = false;
        self.io = None;
        self.sink = None;
    }

    fn activate(&mut self) -> Result<(), SensorError> {
        self.set_enable(true)?;

        self.activated = true;
        self.io()?.sampler.start();
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), SensorError> {
        self.set_enable(false)?;

        self.activated = false;
        self.io()?.sampler.pause();
        Ok(())
    }

    /// Nanoseconds, handed to the driver and the sampler
    fn set_delay(&mut self, delay: i64) -> Result<(), SensorError> {
        let io = self.io()?;

        // SAFETY: the driver reads one int64 through the pointer.
        unsafe { accel_set_delay(io.device.as_raw_fd(), &delay) }.map_err(|source| {
            tracing::error!("Unable to set lsm330dlc acceleration delay");
            SensorError::Ioctl {
                op: "LSM330DLC_ACCEL_IOCTL_SET_DELAY",
                source,
            }
        })?;

        io.sampler.set_delay(delay);
        Ok(())
    }

    fn get_data(&mut self) -> Result<SensorEvent, SensorError> {
        let io = self
            .io
            .as_mut()
            .ok_or(SensorError::NotInitialized("acceleration"))?;

        Ok(next_event(&mut io.input, self.sink.as_ref()))
    }

    fn poll_fd(&self) -> Option<RawFd> {
        self.io.as_ref().map(|io| io.input.as_raw_fd())
    }

    fn is_activated(&self) -> bool {
        self.activated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{InputEvent, REL_X, REL_Z};
    use crate::mock::input_pair;

    #[test]
    fn test_convert() {
        // 1024 thousandths of a count per g
        assert!((convert(1_024_000) - GRAVITY_EARTH).abs() < 1e-4);
        assert!((convert(-512_000) + GRAVITY_EARTH / 2.0).abs() < 1e-4);
        assert_eq!(convert(0), 0.0);
    }

    #[test]
    fn test_zero_axis_not_carried_over() {
        let (mut input, feed) = input_pair("acceleration").unwrap();
        let sink = FusionSink::new();

        feed.send(&[InputEvent::new(EV_REL, REL_X, 1_024_000), InputEvent::syn_report()])
            .unwrap();
        let first = next_event(&mut input, Some(&sink));
        assert!((first.vector.x - GRAVITY_EARTH).abs() < 1e-4);
        assert_eq!(first.vector.status, SENSOR_STATUS_ACCURACY_MEDIUM);

        // X back at 0: the input core swallows that record
        feed.send(&[InputEvent::new(EV_REL, REL_Z, 1_024_000), InputEvent::syn_report()])
            .unwrap();
        let second = next_event(&mut input, Some(&sink));
        assert_eq!(second.vector.x, 0.0);
        assert_eq!(second.vector.y, 0.0);
        assert!((second.vector.z - GRAVITY_EARTH).abs() < 1e-4);
        assert!(second.timestamp > 0);

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.acceleration.axes(), second.vector.axes());
        assert_eq!(snapshot.magnetic.axes(), [0.0; 3]);
    }

    #[test]
    fn test_sample_layout() {
        assert_eq!(std::mem::size_of::<AccelSample>(), 12);
    }

    #[test]
    fn test_init_without_device() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SensorsConfig::default();
        config.paths.accelerometer = dir.path().join("accelerometer");

        let mut sensor = AccelerationSensor::new(&config);
        assert!(matches!(sensor.init(&Registry::new()), Err(SensorError::Io(_))));
        assert_eq!(sensor.poll_fd(), None);
        assert_eq!(sensor.activate().unwrap_err().errno(), -libc::EINVAL);
        assert_eq!(sensor.set_delay(10).unwrap_err().errno(), -libc::EINVAL);
        assert!(!sensor.is_activated());
    }
}
