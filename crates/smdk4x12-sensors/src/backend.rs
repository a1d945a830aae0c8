//! Backend contract and activation bookkeeping
//!
//! Every sensor implements [`SensorBackend`]. The aggregator never calls
//! `activate`/`deactivate` directly: it goes through [`BackendSlot`], which
//! tracks who needs the sensor and only switches the hardware on the first
//! request and off after the last release.

use crate::event::{SensorEvent, SensorType};
use crate::orientation::FusionSink;
use crate::registry::Registry;
use crate::SensorError;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How a backend produces its samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Own sampling thread publishing through a virtual input device
    Threaded,
    /// Reads an input device fed by the kernel driver
    EventDriven,
    /// Computed from other backends
    Derived,
}

/// Bitmask of reasons a backend has to be running
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Needed(u32);

impl Needed {
    pub const NONE: Needed = Needed(0);
    /// Requested by the sensor service
    pub const API: Needed = Needed(1 << 0);
    /// Feeding the orientation sensor
    pub const ORIENTATION: Needed = Needed(1 << 1);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Needed) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn without(self, other: Needed) -> Needed {
        Needed(self.0 & !other.0)
    }
}

impl BitOr for Needed {
    type Output = Needed;

    fn bitor(self, rhs: Needed) -> Needed {
        Needed(self.0 | rhs.0)
    }
}

impl BitOrAssign for Needed {
    fn bitor_assign(&mut self, rhs: Needed) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Needed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Needed::API) {
            names.push("API");
        }
        if self.contains(Needed::ORIENTATION) {
            names.push("ORIENTATION");
        }
        write!(f, "Needed({})", names.join(" | "))
    }
}

/// One sensor's driver-facing implementation
pub trait SensorBackend: Send {
    fn name(&self) -> &'static str;

    fn sensor_type(&self) -> SensorType;

    fn kind(&self) -> BackendKind;

    /// Acquire nodes and start the (parked) sampler; on failure the backend
    /// stays inert
    fn init(&mut self, registry: &Registry) -> Result<(), SensorError>;

    /// Release everything `init` acquired
    fn deinit(&mut self);

    fn activate(&mut self) -> Result<(), SensorError>;

    fn deactivate(&mut self) -> Result<(), SensorError>;

    /// Sampling period, in backend-specific units
    fn set_delay(&mut self, _delay: i64) -> Result<(), SensorError> {
        Ok(())
    }

    /// Drain one packet from the poll fd
    fn get_data(&mut self) -> Result<SensorEvent, SensorError>;

    fn poll_fd(&self) -> Option<RawFd>;

    fn is_activated(&self) -> bool;

    /// Where dependencies push their samples, for derived sensors
    fn fusion_sink(&self) -> Option<FusionSink> {
        None
    }
}

/// A backend plus its activation bookkeeping
pub struct BackendSlot {
    backend: Box<dyn SensorBackend>,
    needed: Needed,
    initialized: bool,
}

impl BackendSlot {
    pub fn new(backend: Box<dyn SensorBackend>) -> Self {
        Self {
            backend,
            needed: Needed::NONE,
            initialized: false,
        }
    }

    pub fn backend(&self) -> &dyn SensorBackend {
        self.backend.as_ref()
    }

    pub fn needed(&self) -> Needed {
        self.needed
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_activated(&self) -> bool {
        self.backend.is_activated()
    }

    pub fn poll_fd(&self) -> Option<RawFd> {
        if self.initialized {
            self.backend.poll_fd()
        } else {
            None
        }
    }

    pub fn init(&mut self, registry: &Registry) -> Result<(), SensorError> {
        tracing::debug!("Initializing {} sensor", self.backend.name());

        self.backend.init(registry)?;
        self.initialized = true;
        Ok(())
    }

    /// Tear the backend down once; later calls do nothing
    pub fn deinit(&mut self) {
        if !self.initialized {
            return;
        }
        tracing::debug!("Deinitializing {} sensor", self.backend.name());

        self.backend.deinit();
        self.needed = Needed::NONE;
        self.initialized = false;
    }

    /// Add a reason; the backend is activated on the first one
    pub fn request(&mut self, reason: Needed) -> Result<(), SensorError> {
        let before = self.needed;
        self.needed |= reason;

        if before.is_empty() && !self.needed.is_empty() {
            tracing::debug!("Activating {} sensor ({:?})", self.backend.name(), reason);
            if let Err(e) = self.backend.activate() {
                self.needed = before;
                return Err(e);
            }
        }

        Ok(())
    }

    /// Drop a reason; the backend is deactivated after the last one
    pub fn release(&mut self, reason: Needed) -> Result<(), SensorError> {
        let before = self.needed;
        self.needed = before.without(reason);

        if !before.is_empty() && self.needed.is_empty() {
            tracing::debug!("Deactivating {} sensor ({:?})", self.backend.name(), reason);
            self.backend.deactivate()?;
        }

        Ok(())
    }

    pub fn set_delay(&mut self, delay: i64) -> Result<(), SensorError> {
        self.backend.set_delay(delay)
    }

    pub fn get_data(&mut self) -> Result<SensorEvent, SensorError> {
        self.backend.get_data()
    }
}

impl fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSlot")
            .field("name", &self.backend.name())
            .field("needed", &self.needed)
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// Shared handle to a registered backend
#[derive(Clone)]
pub struct BackendRef {
    sensor_type: SensorType,
    name: &'static str,
    slot: Arc<Mutex<BackendSlot>>,
}

impl BackendRef {
    pub fn new(backend: Box<dyn SensorBackend>) -> Self {
        Self {
            sensor_type: backend.sensor_type(),
            name: backend.name(),
            slot: Arc::new(Mutex::new(BackendSlot::new(backend))),
        }
    }

    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    pub fn handle(&self) -> i32 {
        self.sensor_type.handle()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Lock the slot; a panic in another holder does not leave it unusable
    pub fn lock(&self) -> MutexGuard<'_, BackendSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for BackendRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRef")
            .field("name", &self.name)
            .field("handle", &self.handle())
            .finish()
    }
}
