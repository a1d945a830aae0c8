//! Virtual input devices
//!
//! Backends that sample hardware themselves (or synthesize data, like
//! orientation) publish through a uinput device of their own, so the
//! aggregator reads every sensor the same way: from an evdev node.

use crate::SensorError;
use crate::input::{EV_REL, EV_SYN, InputEvent, InputStream, REL_X, REL_XYZ, REL_Y, REL_Z};
use nix::{ioctl_none, ioctl_write_int};
use smdk4x12_config::SensorsConfig;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::slice;
use std::thread;
use std::time::Duration;

const UINPUT_MAX_NAME_SIZE: usize = 80;
const ABS_CNT: usize = 64;
const BUS_I2C: u16 = 0x18;

ioctl_none!(ui_dev_create, b'U', 1);
ioctl_none!(ui_dev_destroy, b'U', 2);
ioctl_write_int!(ui_set_evbit, b'U', 100);
ioctl_write_int!(ui_set_relbit, b'U', 102);

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct InputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

/// `struct uinput_user_dev`
#[repr(C)]
#[derive(Clone, Copy)]
struct UinputUserDev {
    name: [u8; UINPUT_MAX_NAME_SIZE],
    id: InputId,
    ff_effects_max: u32,
    absmax: [i32; ABS_CNT],
    absmin: [i32; ABS_CNT],
    absfuzz: [i32; ABS_CNT],
    absflat: [i32; ABS_CNT],
}

impl UinputUserDev {
    fn new(name: &str) -> Self {
        let mut dev = Self {
            name: [0; UINPUT_MAX_NAME_SIZE],
            id: InputId {
                bustype: BUS_I2C,
                ..InputId::default()
            },
            ff_effects_max: 0,
            absmax: [0; ABS_CNT],
            absmin: [0; ABS_CNT],
            absfuzz: [0; ABS_CNT],
            absflat: [0; ABS_CNT],
        };

        // Keep a terminating NUL
        let len = name.len().min(UINPUT_MAX_NAME_SIZE - 1);
        dev.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        dev
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C) struct of integer fields with no padding.
        unsafe { slice::from_raw_parts(self as *const Self as *const u8, mem::size_of::<Self>()) }
    }
}

/// Scale a physical value to the integer carried by a relative event
pub fn scale_milli(value: f32) -> i32 {
    (value * 1000.0) as i32
}

/// Destination of three-axis samples that reappear on an evdev node
pub trait Publish: Send {
    fn publish(&self, values: [i32; 3]) -> std::io::Result<()>;
}

/// A uinput device reporting `REL_X/Y/Z`
#[derive(Debug)]
pub struct UinputDevice {
    file: File,
    name: String,
}

impl UinputDevice {
    /// Create a relative-axis device called `name` through the uinput node at `path`
    pub fn create_rel(path: &Path, name: &str, settle: Duration) -> Result<Self, SensorError> {
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| {
                tracing::error!("Unable to open uinput device {}: {}", path.display(), e);
                SensorError::Io(e)
            })?;

        let fd = file.as_raw_fd();
        let set_bits = || -> nix::Result<()> {
            // SAFETY: plain integer ioctls on an open uinput fd.
            unsafe {
                ui_set_evbit(fd, EV_REL as _)?;
                ui_set_relbit(fd, REL_X as _)?;
                ui_set_relbit(fd, REL_Y as _)?;
                ui_set_relbit(fd, REL_Z as _)?;
                ui_set_evbit(fd, EV_SYN as _)?;
            }
            Ok(())
        };
        set_bits().map_err(|source| {
            tracing::error!("Unable to set uinput bits for {}", name);
            SensorError::Ioctl {
                op: "UI_SET_EVBIT/UI_SET_RELBIT",
                source,
            }
        })?;

        (&file)
            .write_all(UinputUserDev::new(name).as_bytes())
            .map_err(|e| {
                tracing::error!("Unable to write uinput device {}: {}", name, e);
                SensorError::Io(e)
            })?;

        // SAFETY: argument-less ioctl on an open uinput fd.
        unsafe { ui_dev_create(fd) }.map_err(|source| {
            tracing::error!("Unable to create uinput device {}", name);
            SensorError::Ioctl {
                op: "UI_DEV_CREATE",
                source,
            }
        })?;

        // Give udev time to create the evdev node
        thread::sleep(settle);

        Ok(Self {
            file,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn write_event(&self, event: &InputEvent) -> std::io::Result<()> {
        (&self.file).write_all(event.as_bytes())
    }

    /// Publish one sample: three relative events and a sync
    pub fn publish(&self, values: [i32; 3]) -> std::io::Result<()> {
        for (code, value) in REL_XYZ.into_iter().zip(values) {
            self.write_event(&InputEvent::new(EV_REL, code, value))?;
        }
        self.write_event(&InputEvent::syn_report())
    }
}

impl Publish for UinputDevice {
    fn publish(&self, values: [i32; 3]) -> std::io::Result<()> {
        UinputDevice::publish(self, values)
    }
}

impl Drop for UinputDevice {
    fn drop(&mut self) {
        // SAFETY: argument-less ioctl on a still-open uinput fd.
        if let Err(e) = unsafe { ui_dev_destroy(self.file.as_raw_fd()) } {
            tracing::warn!("Unable to destroy uinput device {}: {}", self.name, e);
        }
    }
}

/// Where a backend's virtual device comes from and how it is read back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualInput {
    pub uinput: PathBuf,
    pub input_dir: PathBuf,
    pub name: String,
    pub settle: Duration,
}

impl VirtualInput {
    /// Virtual device `name` at the locations of `config`
    pub fn from_config(config: &SensorsConfig, name: &str) -> Self {
        Self {
            uinput: config.paths.uinput.clone(),
            input_dir: config.paths.input_dir.clone(),
            name: name.to_string(),
            settle: Duration::from_micros(config.uinput_settle_us),
        }
    }

    /// Create the uinput device, then open the evdev node it produced
    pub fn create(&self) -> Result<(UinputDevice, InputStream), SensorError> {
        let device = UinputDevice::create_rel(&self.uinput, &self.name, self.settle)?;

        let input = InputStream::open_by_name(&self.input_dir, &self.name).map_err(|e| {
            tracing::error!("Unable to open {} input: {}", self.name, e);
            e
        })?;

        Ok((device, input))
    }
}
