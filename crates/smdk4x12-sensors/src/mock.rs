//! Mock backends for testing without sensor hardware
//!
//! A [`MockSensor`] reads real `input_event` records from one end of a Unix
//! socket pair, so `poll(2)` readiness behaves exactly as with an evdev node.
//! The other end is a [`MockFeed`] the test writes samples into. A
//! [`MockCalls`] records every call the aggregator makes.
//!
//! # Usage
//!
//! ```no_run
//! use smdk4x12_sensors::mock::MockSensor;
//! use smdk4x12_sensors::{Registry, SensorType, SensorsDevice};
//!
//! let (light, feed) = MockSensor::new(SensorType::Light).unwrap();
//! let calls = light.calls();
//! let mut device = SensorsDevice::open(Registry::new().with(light)).unwrap();
//!
//! device.activate(SensorType::Light.handle(), true).unwrap();
//! feed.push([120, 0, 0]).unwrap();
//! assert_eq!(calls.activations(), 1);
//! ```

use crate::backend::{BackendKind, SensorBackend};
use crate::event::{SENSOR_STATUS_ACCURACY_MEDIUM, SensorEvent, SensorType, SensorVec};
use crate::input::{EV_REL, EV_SYN, InputEvent, InputStream, REL_XYZ, SYN_REPORT};
use crate::registry::Registry;
use crate::uinput::Publish;
use crate::SensorError;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Non-blocking input stream plus the writer feeding it
pub fn input_pair(name: &str) -> io::Result<(InputStream, MockFeed)> {
    let (reader, writer) = UnixStream::pair()?;
    reader.set_nonblocking(true)?;

    let file = File::from(OwnedFd::from(reader));
    Ok((InputStream::from_file(file, name), MockFeed { stream: writer }))
}

/// Writing end of a mock input node
#[derive(Debug)]
pub struct MockFeed {
    stream: UnixStream,
}

impl MockFeed {
    pub fn write(&self, event: &InputEvent) -> io::Result<()> {
        (&self.stream).write_all(event.as_bytes())
    }

    pub fn send(&self, events: &[InputEvent]) -> io::Result<()> {
        events.iter().try_for_each(|event| self.write(event))
    }

    /// One relative X/Y/Z sample closed by a sync record
    pub fn push(&self, values: [i32; 3]) -> io::Result<()> {
        for (code, value) in REL_XYZ.into_iter().zip(values) {
            self.write(&InputEvent::new(EV_REL, code, value))?;
        }
        self.write(&InputEvent::new(EV_SYN, SYN_REPORT, 0))
    }
}

impl Publish for MockFeed {
    fn publish(&self, values: [i32; 3]) -> io::Result<()> {
        self.push(values)
    }
}

#[derive(Debug, Default)]
struct CallsState {
    activations: usize,
    deactivations: usize,
    deinits: usize,
    delays: Vec<i64>,
    failing_reads: usize,
}

/// Call counters shared with a [`MockSensor`]
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    state: Arc<Mutex<CallsState>>,
}

impl MockCalls {
    fn lock(&self) -> MutexGuard<'_, CallsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn activations(&self) -> usize {
        self.lock().activations
    }

    pub fn deactivations(&self) -> usize {
        self.lock().deactivations
    }

    pub fn deinits(&self) -> usize {
        self.lock().deinits
    }

    pub fn delays(&self) -> Vec<i64> {
        self.lock().delays.clone()
    }

    /// Make the next `count` reads drain their packet and fail
    pub fn fail_next_reads(&self, count: usize) {
        self.lock().failing_reads = count;
    }
}

/// Three-axis backend fed through a [`MockFeed`]
#[derive(Debug)]
pub struct MockSensor {
    sensor: SensorType,
    input: Option<InputStream>,
    calls: MockCalls,
    initialized: bool,
    activated: bool,
    axes: [f32; 3],
}

impl MockSensor {
    pub fn new(sensor: SensorType) -> io::Result<(Self, MockFeed)> {
        let (input, feed) = input_pair(sensor.string_type())?;
        Ok((Self::with_input(sensor, Some(input)), feed))
    }

    /// A backend whose node is missing: `init` always fails
    pub fn inert(sensor: SensorType) -> Self {
        Self::with_input(sensor, None)
    }

    fn with_input(sensor: SensorType, input: Option<InputStream>) -> Self {
        Self {
            sensor,
            input,
            calls: MockCalls::default(),
            initialized: false,
            activated: false,
            axes: [0.0; 3],
        }
    }

    pub fn calls(&self) -> MockCalls {
        self.calls.clone()
    }

    fn ensure_initialized(&self) -> Result<(), SensorError> {
        if self.initialized {
            Ok(())
        } else {
            Err(SensorError::NotInitialized("mock"))
        }
    }
}

impl SensorBackend for MockSensor {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn sensor_type(&self) -> SensorType {
        self.sensor
    }

    fn kind(&self) -> BackendKind {
        BackendKind::EventDriven
    }

    fn init(&mut self, _registry: &Registry) -> Result<(), SensorError> {
        if self.input.is_none() {
            return Err(SensorError::NodeNotFound(self.sensor.string_type().to_string()));
        }
        self.initialized = true;
        Ok(())
    }

    fn deinit(&mut self) {
        self.calls.lock().deinits += 1;
        self.initialized = false;
        self.activated = false;
    }

    fn activate(&mut self) -> Result<(), SensorError> {
        self.ensure_initialized()?;
        self.calls.lock().activations += 1;
        self.activated = true;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), SensorError> {
        self.ensure_initialized()?;
        self.calls.lock().deactivations += 1;
        self.activated = false;
        Ok(())
    }

    fn set_delay(&mut self, delay: i64) -> Result<(), SensorError> {
        self.ensure_initialized()?;
        self.calls.lock().delays.push(delay);
        Ok(())
    }

    fn get_data(&mut self) -> Result<SensorEvent, SensorError> {
        self.ensure_initialized()?;
        let input = self
            .input
            .as_mut()
            .ok_or(SensorError::NotInitialized("mock"))?;

        let packet = input.read_packet();

        {
            let mut state = self.calls.lock();
            if state.failing_reads > 0 {
                state.failing_reads -= 1;
                return Err(SensorError::IncompletePacket("mock"));
            }
        }

        packet.update_axes(EV_REL, REL_XYZ, |v| v as f32, &mut self.axes);

        let mut event = SensorEvent::new(self.sensor);
        event.vector = SensorVec::from_axes(self.axes).with_status(SENSOR_STATUS_ACCURACY_MEDIUM);
        if let Some(timestamp) = packet.report_timestamp() {
            event.timestamp = timestamp;
        }
        Ok(event)
    }

    fn poll_fd(&self) -> Option<RawFd> {
        if !self.initialized {
            return None;
        }
        self.input.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn is_activated(&self) -> bool {
        self.activated
    }
}
