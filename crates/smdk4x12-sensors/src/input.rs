//! Kernel input (evdev) access
//!
//! Sensor data reaches userspace as `struct input_event` records on an evdev
//! node: a run of `EV_REL`/`EV_ABS` records closed by an `EV_SYN` record.
//! Nodes are found by the name the driver (or our own uinput device) reports
//! through `EVIOCGNAME`.

use crate::SensorError;
use nix::ioctl_read_buf;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::ptr;
use std::slice;
use std::time::{SystemTime, UNIX_EPOCH};

// Event types
pub const EV_SYN: u16 = 0x00;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;

// Event codes
pub const SYN_REPORT: u16 = 0x00;
pub const REL_X: u16 = 0x00;
pub const REL_Y: u16 = 0x01;
pub const REL_Z: u16 = 0x02;
pub const REL_RX: u16 = 0x03;
pub const REL_RY: u16 = 0x04;
pub const REL_RZ: u16 = 0x05;
pub const REL_MISC: u16 = 0x09;
pub const ABS_DISTANCE: u16 = 0x19;

/// Axis codes of a three-axis relative device
pub const REL_XYZ: [u16; 3] = [REL_X, REL_Y, REL_Z];

/// Longest name `EVIOCGNAME` is asked for
const INPUT_NAME_SIZE: usize = 80;

ioctl_read_buf!(eviocgname, b'E', 0x06, u8);

/// Raw input event (`struct input_event`)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct InputEvent {
    pub time: libc::timeval,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub const SIZE: usize = mem::size_of::<InputEvent>();

    /// Event stamped with the current wall-clock time
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Self::with_time(now.as_secs() as i64, now.subsec_micros() as i64, kind, code, value)
    }

    pub fn with_time(sec: i64, usec: i64, kind: u16, code: u16, value: i32) -> Self {
        Self {
            time: libc::timeval {
                tv_sec: sec as libc::time_t,
                tv_usec: usec as libc::suseconds_t,
            },
            kind,
            code,
            value,
        }
    }

    /// Closing `SYN_REPORT` record
    pub fn syn_report() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }

    pub fn timestamp_ns(&self) -> i64 {
        timestamp_ns(&self.time)
    }

    pub fn is_syn(&self) -> bool {
        self.kind == EV_SYN
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: InputEvent is repr(C) with no padding (timeval is followed by
        // 2 + 2 + 4 bytes), so every byte of it is initialized.
        unsafe { slice::from_raw_parts(self as *const Self as *const u8, Self::SIZE) }
    }

    /// Decode one record; `None` if the buffer is too short
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }

        // SAFETY: the buffer holds at least SIZE bytes and every bit pattern is
        // a valid InputEvent.
        Some(unsafe { ptr::read_unaligned(buf.as_ptr() as *const InputEvent) })
    }
}

impl fmt::Debug for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputEvent")
            .field("sec", &self.time.tv_sec)
            .field("usec", &self.time.tv_usec)
            .field("kind", &self.kind)
            .field("code", &self.code)
            .field("value", &self.value)
            .finish()
    }
}

/// Convert a `timeval` to nanoseconds
pub fn timestamp_ns(time: &libc::timeval) -> i64 {
    time.tv_sec as i64 * 1_000_000_000 + time.tv_usec as i64 * 1000
}

/// Records read for one sample
#[derive(Debug, Default)]
pub struct Packet {
    pub events: Vec<InputEvent>,
    /// True when the run ended on an `EV_SYN` record rather than a short read
    pub complete: bool,
}

impl Packet {
    /// Timestamp of the closing `SYN_REPORT`, if there was one
    pub fn report_timestamp(&self) -> Option<i64> {
        self.events
            .iter()
            .rev()
            .find(|e| e.kind == EV_SYN && e.code == SYN_REPORT)
            .map(InputEvent::timestamp_ns)
    }

    /// Three axes of `kind`, with an axis missing from the packet read as 0
    ///
    /// The input core drops relative events whose value is 0, so on a node
    /// fed through uinput an absent axis means zero.
    pub fn axes(&self, kind: u16, codes: [u16; 3], convert: impl Fn(i32) -> f32) -> [f32; 3] {
        let mut axes = [0.0; 3];
        self.update_axes(kind, codes, convert, &mut axes);
        axes
    }

    /// Fold the three axis codes of `kind` into `axes`, leaving missing axes untouched
    pub fn update_axes(
        &self,
        kind: u16,
        codes: [u16; 3],
        convert: impl Fn(i32) -> f32,
        axes: &mut [f32; 3],
    ) {
        for event in self.events.iter().filter(|e| e.kind == kind) {
            if let Some(axis) = codes.iter().position(|&c| c == event.code) {
                axes[axis] = convert(event.value);
            }
        }
    }

    /// Last value reported for a code, if any
    pub fn last_value(&self, kind: u16, code: u16) -> Option<i32> {
        self.events
            .iter()
            .rev()
            .find(|e| e.kind == kind && e.code == code)
            .map(|e| e.value)
    }
}

/// An open evdev node
#[derive(Debug)]
pub struct InputStream {
    file: File,
    name: String,
}

impl InputStream {
    /// Find the node in `dir` whose device name is `name` and open it non-blocking
    pub fn open_by_name(dir: &Path, name: &str) -> Result<Self, SensorError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            let Ok(file) = OpenOptions::new()
                .read(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&path)
            else {
                continue;
            };

            if let Ok(device_name) = device_name(&file)
                && device_name == name
            {
                tracing::debug!("Found input {} at {}", name, path.display());
                return Ok(Self::from_file(file, name));
            }
        }

        Err(SensorError::NodeNotFound(name.to_string()))
    }

    /// Wrap an already open node
    pub fn from_file(file: File, name: &str) -> Self {
        Self {
            file,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read one record; `None` on a short read or when nothing is queued
    pub fn read_event(&mut self) -> io::Result<Option<InputEvent>> {
        let mut buffer = [0u8; InputEvent::SIZE];

        match self.file.read(&mut buffer) {
            Ok(size) if size == buffer.len() => Ok(InputEvent::from_bytes(&buffer)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read records up to and including the next `EV_SYN`
    pub fn read_packet(&mut self) -> Packet {
        let mut packet = Packet::default();

        loop {
            match self.read_event() {
                Ok(Some(event)) => {
                    packet.events.push(event);
                    if event.is_syn() {
                        packet.complete = true;
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Unable to read {} input: {}", self.name, e);
                    break;
                }
            }
        }

        if !packet.complete {
            tracing::warn!(
                "Short read on {} input ({} records, no sync)",
                self.name,
                packet.events.len()
            );
        }

        packet
    }
}

impl AsRawFd for InputStream {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Device name reported by `EVIOCGNAME`, cut at the first newline
fn device_name(file: &File) -> Result<String, SensorError> {
    let mut buffer = [0u8; INPUT_NAME_SIZE];

    // SAFETY: the buffer outlives the call and its length bounds the kernel write.
    unsafe { eviocgname(file.as_raw_fd(), &mut buffer[..INPUT_NAME_SIZE - 1]) }.map_err(
        |source| SensorError::Ioctl {
            op: "EVIOCGNAME",
            source,
        },
    )?;

    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    let name = String::from_utf8_lossy(&buffer[..end]);
    Ok(name.split('\n').next().unwrap_or_default().to_string())
}
