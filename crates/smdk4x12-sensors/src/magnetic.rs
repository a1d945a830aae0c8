//! AKM8975 magnetometer
//!
//! The chip is driven in single-measurement mode from a sampling thread. Each
//! sample is calibrated (see [`crate::compass`]) and republished in µT × 1000
//! on the `magnetic` virtual input device.

use crate::backend::{BackendKind, SensorBackend};
use crate::compass::Compass;
use crate::event::{SENSOR_STATUS_ACCURACY_MEDIUM, SensorEvent, SensorType, SensorVec};
use crate::input::{EV_REL, InputStream, REL_XYZ};
use crate::orientation::FusionSink;
use crate::registry::Registry;
use crate::sampler::Sampler;
use crate::uinput::{VirtualInput, scale_milli};
use crate::{DEFAULT_DELAY_NS, SensorError};
use nix::{ioctl_read, ioctl_readwrite_bad, ioctl_write_ptr, request_code_readwrite};
use smdk4x12_config::{MagnetometerConfig, SensorsConfig};
use std::fs::{File, OpenOptions};
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const AKMIO: u8 = 0xA1;
const SENSOR_DATA_SIZE: usize = 8;
const RWBUF_SIZE: usize = 16;

// Operating modes
const AK8975_MODE_SNG_MEASURE: libc::c_short = 0x01;
const AK8975_MODE_FUSE_ACCESS: libc::c_short = 0x0F;
const AK8975_MODE_POWER_DOWN: libc::c_short = 0x00;

// Registers
const AK8975_REG_WIA: u8 = 0x00;
const AK8975_FUSE_ASAX: u8 = 0x10;

ioctl_readwrite_bad!(
    ecs_read,
    request_code_readwrite!(AKMIO, 0x02, mem::size_of::<*mut u8>()),
    [u8; RWBUF_SIZE]
);
ioctl_write_ptr!(ecs_set_mode, AKMIO, 0x04, libc::c_short);
ioctl_read!(ecs_get_data, AKMIO, 0x05, [u8; SENSOR_DATA_SIZE]);

/// Why a measurement block was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFault {
    NotReady,
    ReadErrorOrOverflow,
}

/// Decode an ST1..ST2 measurement block into raw X/Y/Z counts
pub fn decode_sample(data: &[u8; SENSOR_DATA_SIZE]) -> Result<[i16; 3], SampleFault> {
    if data[0] & 0x01 == 0 {
        return Err(SampleFault::NotReady);
    }
    if data[7] & (1 << 2) != 0 || data[7] & (1 << 3) != 0 {
        return Err(SampleFault::ReadErrorOrOverflow);
    }

    Ok([
        i16::from_le_bytes([data[1], data[2]]),
        i16::from_le_bytes([data[3], data[4]]),
        i16::from_le_bytes([data[5], data[6]]),
    ])
}

/// Raw input value (µT × 1000) to µT
pub fn convert(value: i32) -> f32 {
    value as f32 / 1000.0
}

fn set_mode(device: &File, mode: libc::c_short) -> Result<(), SensorError> {
    // SAFETY: the driver reads one short through the pointer.
    unsafe { ecs_set_mode(device.as_raw_fd(), &mode) }.map_err(|source| {
        tracing::error!("Unable to set akm8975 mode {:#x}", mode);
        SensorError::Ioctl {
            op: "ECS_IOCTL_SET_MODE",
            source,
        }
    })?;
    Ok(())
}

/// Read `len` registers starting at `register`
fn read_registers(device: &File, register: u8, len: u8) -> Result<Vec<u8>, SensorError> {
    let mut buffer = [0u8; RWBUF_SIZE];
    buffer[0] = len;
    buffer[1] = register;

    // SAFETY: the driver reads the request from and writes the registers back
    // into this RWBUF_SIZE buffer.
    unsafe { ecs_read(device.as_raw_fd(), &mut buffer) }.map_err(|source| {
        tracing::error!("Unable to read akm8975 register {:#x}", register);
        SensorError::Ioctl {
            op: "ECS_IOCTL_READ",
            source,
        }
    })?;

    Ok(buffer[1..1 + len as usize].to_vec())
}

fn measure(device: &File) -> Result<[u8; SENSOR_DATA_SIZE], SensorError> {
    set_mode(device, AK8975_MODE_SNG_MEASURE)?;

    let mut data = [0u8; SENSOR_DATA_SIZE];
    // SAFETY: the driver fills one SENSOR_DATA_SIZE block.
    unsafe { ecs_get_data(device.as_raw_fd(), &mut data) }.map_err(|source| {
        tracing::error!("Unable to get akm8975 data");
        SensorError::Ioctl {
            op: "ECS_IOCTL_GETDATA",
            source,
        }
    })?;

    Ok(data)
}

/// Power down, read the fuse ROM sensitivity values, power down again
fn read_asa(device: &File) -> Result<[u8; 3], SensorError> {
    set_mode(device, AK8975_MODE_POWER_DOWN)?;
    set_mode(device, AK8975_MODE_FUSE_ACCESS)?;

    let fuse = read_registers(device, AK8975_FUSE_ASAX, 3)?;
    let asa = [fuse[0], fuse[1], fuse[2]];
    tracing::debug!(
        "AKM8975 ASA (sensitivity adjustment) values are: ({}, {}, {})",
        asa[0],
        asa[1],
        asa[2]
    );

    let wia = read_registers(device, AK8975_REG_WIA, 1)?;
    tracing::debug!("AKM8975 WIA (device ID) value is: {:#x}", wia[0]);

    set_mode(device, AK8975_MODE_POWER_DOWN)?;
    Ok(asa)
}

/// Decode one packet of the virtual node and hand the field to `sink`
fn next_event(input: &mut InputStream, sink: Option<&FusionSink>) -> SensorEvent {
    let packet = input.read_packet();

    let mut event = SensorEvent::new(SensorType::MagneticField);
    event.vector = SensorVec::from_axes(packet.axes(EV_REL, REL_XYZ, convert))
        .with_status(SENSOR_STATUS_ACCURACY_MEDIUM);
    if let Some(timestamp) = packet.report_timestamp() {
        event.timestamp = timestamp;
    }

    if let Some(sink) = sink {
        sink.fill(None, Some(&event.vector));
    }

    event
}

fn lock(compass: &Mutex<Compass>) -> MutexGuard<'_, Compass> {
    compass.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Io {
    device: Arc<File>,
    compass: Arc<Mutex<Compass>>,
    sampler: Sampler,
    input: InputStream,
}

pub struct MagneticSensor {
    device_path: PathBuf,
    params_path: PathBuf,
    calibration: MagnetometerConfig,
    virtual_input: VirtualInput,
    io: Option<Io>,
    sink: Option<FusionSink>,
    activated: bool,
}

impl MagneticSensor {
    pub fn new(config: &SensorsConfig) -> Self {
        Self {
            device_path: config.paths.magnetometer.clone(),
            params_path: config.paths.magnetometer_params.clone(),
            calibration: config.magnetometer,
            virtual_input: VirtualInput::from_config(config, &config.inputs.magnetic),
            io: None,
            sink: None,
            activated: false,
        }
    }

    fn io(&self) -> Result<&Io, SensorError> {
        self.io.as_ref().ok_or(SensorError::NotInitialized("magnetic"))
    }
}

impl SensorBackend for MagneticSensor {
    fn name(&self) -> &'static str {
        "AKM8975"
    }

    fn sensor_type(&self) -> SensorType {
        SensorType::MagneticField
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

        let asa = read_asa(&device)?;
        let compass = Arc::new(Mutex::new(Compass::new(
            asa,
            self.calibration.layout,
            self.calibration.averaging,
        )));

        let (uinput, input) = self.virtual_input.create()?;
        let device = Arc::new(device);

        let sampler_device = Arc::clone(&device);
        let sampler_compass = Arc::clone(&compass);
        let sampler = Sampler::spawn("magnetic", DEFAULT_DELAY_NS, move || {
            let data = measure(&sampler_device)?;

            let raw = match decode_sample(&data) {
                Ok(raw) => raw,
                Err(fault) => {
                    tracing::warn!("Skipping akm8975 sample: {:?}", fault);
                    return Ok(());
                }
            };

            let field = lock(&sampler_compass).process(raw);
            if let Err(e) = uinput.publish(field.map(scale_milli)) {
                tracing::warn!("Unable to publish magnetic field: {}", e);
            }
            Ok(())
        })?;

        self.io = Some(Io {
            device,
            compass,
            sampler,
            input,
        });
        Ok(())
    }

    fn deinit(&mut self) {
        self.activated = false;

        if let Some(mut io) = self.io.take() {
            io.sampler.stop();
            if let Err(e) = set_mode(&io.device, AK8975_MODE_POWER_DOWN) {
                tracing::error!("Unable to power down akm8975: {}", e);
            }
        }
        self.sink = None;
    }

    /// Restore the persisted offset and start over with empty buffers
    fn activate(&mut self) -> Result<(), SensorError> {
        let io = self.io()?;

        {
            let mut compass = lock(&io.compass);
            if let Err(e) = compass.load(&self.params_path) {
                tracing::error!("Unable to read magnetic parameters: {}", e);
            }
            compass.reset();
        }

        io.sampler.start();
        self.activated = true;
        Ok(())
    }

    /// Persist a learned offset and power the chip down
    fn deactivate(&mut self) -> Result<(), SensorError> {
        let io = self.io()?;

        {
            let compass = lock(&io.compass);
            if compass.has_offset()
                && let Err(e) = compass.save(&self.params_path)
            {
                tracing::error!("Unable to write magnetic parameters: {}", e);
            }
        }

        io.sampler.pause();
        if let Err(e) = set_mode(&io.device, AK8975_MODE_POWER_DOWN) {
            tracing::error!("Unable to power down akm8975: {}", e);
        }

        self.activated = false;
        Ok(())
    }

    /// Nanoseconds between measurements
    fn set_delay(&mut self, delay: i64) -> Result<(), SensorError> {
        self.io()?.sampler.set_delay(delay);
        Ok(())
    }

    fn get_data(&mut self) -> Result<SensorEvent, SensorError> {
        let io = self
            .io
            .as_mut()
            .ok_or(SensorError::NotInitialized("magnetic"))?;

        Ok(next_event(&mut io.input, self.sink.as_ref()))
    }

    fn poll_fd(&self) -> Option<RawFd> {
        self.io.as_ref().map(|io| io.input.as_raw_fd())
    }

    fn is_activated(&self) -> bool {
        self.activated
    }
}
