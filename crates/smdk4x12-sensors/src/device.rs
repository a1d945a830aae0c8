//! Sensors device: the aggregator behind the HAL poll device
//!
//! Owns the backend registry and the poll set built from the backends' input
//! fds. `activate` and `set_delay` are routed by handle; `poll` blocks on every
//! fd at once and drains one event per ready backend.

use crate::backend::{BackendRef, Needed};
use crate::event::SensorEvent;
use crate::registry::Registry;
use std::io;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown sensor handle: {0}")]
    UnknownHandle(i32),

    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    #[error("Input node not found: {0}")]
    NodeNotFound(String),

    #[error("{backend} needs {dependency}, which is not registered")]
    MissingDependency {
        backend: &'static str,
        dependency: &'static str,
    },

    #[error("{op} failed: {source}")]
    Ioctl {
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("sysfs access to {} failed: {source}", path.display())]
    Sysfs {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Incomplete input packet from {0}")]
    IncompletePacket(&'static str),

    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SensorError {
    /// Integer code handed back across the HAL boundary
    pub fn errno(&self) -> i32 {
        match self {
            SensorError::InvalidArgument(_) | SensorError::NotInitialized(_) => -libc::EINVAL,
            _ => -1,
        }
    }
}

/// Backends sharing one poll fd
struct PollEntry {
    owners: Vec<BackendRef>,
}

/// The opened sensors device
pub struct SensorsDevice {
    registry: Registry,
    poll_fds: Vec<libc::pollfd>,
    entries: Vec<PollEntry>,
    closed: bool,
}

impl SensorsDevice {
    /// Initialize every registered backend and build the poll set
    ///
    /// A backend that fails to initialize stays registered but inert; the
    /// device opens with whatever is left.
    pub fn open(registry: Registry) -> Result<Self, SensorError> {
        tracing::debug!("Opening sensors device ({} backends)", registry.len());

        if registry.is_empty() {
            return Err(SensorError::InvalidArgument(
                "no sensor backends registered".to_string(),
            ));
        }

        for backend in registry.iter() {
            let mut slot = backend.lock();
            match slot.init(&registry) {
                Ok(()) => tracing::debug!(
                    "{} sensor ready ({:?})",
                    backend.name(),
                    slot.backend().kind()
                ),
                Err(e) => tracing::error!("Unable to init {} sensor: {}", backend.name(), e),
            }
        }

        let mut poll_fds: Vec<libc::pollfd> = Vec::new();
        let mut entries: Vec<PollEntry> = Vec::new();

        for backend in registry.iter() {
            let Some(fd) = backend.lock().poll_fd() else {
                continue;
            };

            match poll_fds.iter().position(|p| p.fd == fd) {
                Some(index) => entries[index].owners.push(backend.clone()),
                None => {
                    poll_fds.push(pollfd(fd));
                    entries.push(PollEntry {
                        owners: vec![backend.clone()],
                    });
                }
            }
        }

        tracing::info!(
            "Sensors device opened: {} of {} backends pollable",
            poll_fds.len(),
            registry.len()
        );

        Ok(Self {
            registry,
            poll_fds,
            entries,
            closed: false,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of fds in the poll set
    pub fn poll_fd_count(&self) -> usize {
        self.poll_fds.len()
    }

    /// Enable or disable a sensor on behalf of the sensor service
    pub fn activate(&mut self, handle: i32, enabled: bool) -> Result<(), SensorError> {
        tracing::debug!("activate({}, {})", handle, enabled);
        self.ensure_open()?;

        let Some(backend) = self.registry.find_handle(handle) else {
            return Err(SensorError::UnknownHandle(handle));
        };

        let mut slot = backend.lock();
        if enabled {
            slot.request(Needed::API)
        } else {
            slot.release(Needed::API)
        }
    }

    /// Forward a sampling period; unknown handles are accepted
    pub fn set_delay(&mut self, handle: i32, delay_ns: i64) -> Result<(), SensorError> {
        tracing::debug!("set_delay({}, {})", handle, delay_ns);
        self.ensure_open()?;

        match self.registry.find_handle(handle) {
            Some(backend) => backend.lock().set_delay(delay_ns),
            None => Ok(()),
        }
    }

    /// Block until at least one event is available and fill `events`
    ///
    /// After the first wake, fds that are already ready are drained with a
    /// zero timeout until nothing more is ready or `events` is full.
    pub fn poll(&mut self, events: &mut [SensorEvent]) -> Result<usize, SensorError> {
        self.ensure_open()?;

        if events.is_empty() {
            return Err(SensorError::InvalidArgument(
                "empty event buffer".to_string(),
            ));
        }
        if self.poll_fds.is_empty() {
            return Err(SensorError::InvalidArgument(
                "no pollable sensors".to_string(),
            ));
        }

        let mut count = 0;

        loop {
            let timeout = if count > 0 { 0 } else { -1 };

            // SAFETY: poll_fds is a live, correctly sized array of pollfd.
            let rc = unsafe {
                libc::poll(
                    self.poll_fds.as_mut_ptr(),
                    self.poll_fds.len() as libc::nfds_t,
                    timeout,
                )
            };
            if rc < 0 {
                return Err(SensorError::Poll(io::Error::last_os_error()));
            }

            let mut round_failed = false;

            'scan: for (pfd, entry) in self.poll_fds.iter_mut().zip(&self.entries) {
                if pfd.revents & libc::POLLIN == 0 {
                    continue;
                }

                for owner in &entry.owners {
                    if count == events.len() {
                        break 'scan;
                    }

                    match owner.lock().get_data() {
                        Ok(event) => {
                            events[count] = event;
                            count += 1;
                        }
                        Err(e) => {
                            tracing::debug!("No data from {}: {}", owner.name(), e);
                            pfd.revents = 0;
                            round_failed = true;
                        }
                    }
                }
            }

            let more_ready = rc > 0 && !round_failed;
            if !((more_ready || count < 1) && count < events.len()) {
                break;
            }
        }

        Ok(count)
    }

    /// Deinitialize every initialized backend
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        tracing::debug!("Closing sensors device");

        for backend in self.registry.iter() {
            backend.lock().deinit();
        }

        self.poll_fds.clear();
        self.entries.clear();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), SensorError> {
        if self.closed {
            return Err(SensorError::InvalidArgument(
                "sensors device is closed".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for SensorsDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn pollfd(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}
