//! Sampling thread of a threaded backend
//!
//! The thread is created parked. `start` lets it run a tick every delay,
//! `pause` parks it again at the next tick boundary, and `stop` ends and
//! joins it, so nothing the tick owns outlives the backend.

use crate::SensorError;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Parked,
    Running,
    Stopped,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SamplerState>,
    wake: Condvar,
    delay_ns: AtomicI64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SamplerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: SamplerState) {
        *self.lock() = state;
        self.wake.notify_all();
    }
}

#[derive(Debug)]
pub struct Sampler {
    name: String,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Sampler {
    /// Spawn a parked sampling thread running `tick` once per period
    pub fn spawn<F>(name: &str, delay_ns: i64, tick: F) -> Result<Self, SensorError>
    where
        F: FnMut() -> Result<(), SensorError> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(SamplerState::Parked),
            wake: Condvar::new(),
            delay_ns: AtomicI64::new(delay_ns),
        });

        let thread_shared = Arc::clone(&shared);
        let thread_name = name.to_string();
        let thread = thread::Builder::new()
            .name(format!("{}-sampler", name))
            .spawn(move || run(&thread_name, &thread_shared, tick))?;

        tracing::debug!("Spawned {} sampler", name);

        Ok(Self {
            name: name.to_string(),
            shared,
            thread: Some(thread),
        })
    }

    pub fn start(&self) {
        let mut state = self.shared.lock();
        if *state != SamplerState::Stopped {
            *state = SamplerState::Running;
            self.shared.wake.notify_all();
        }
    }

    pub fn pause(&self) {
        let mut state = self.shared.lock();
        if *state == SamplerState::Running {
            *state = SamplerState::Parked;
            self.shared.wake.notify_all();
        }
    }

    pub fn set_delay(&self, delay_ns: i64) {
        self.shared.delay_ns.store(delay_ns, Ordering::Relaxed);
    }

    pub fn delay(&self) -> i64 {
        self.shared.delay_ns.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> SamplerState {
        *self.shared.lock()
    }

    /// Stop the thread and wait for it
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.shared.set(SamplerState::Stopped);

        if thread.join().is_err() {
            tracing::error!("{} sampler panicked", self.name);
        }
        tracing::debug!("Stopped {} sampler", self.name);
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<F>(name: &str, shared: &Shared, mut tick: F)
where
    F: FnMut() -> Result<(), SensorError>,
{
    loop {
        {
            let mut state = shared.lock();
            while *state == SamplerState::Parked {
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if *state == SamplerState::Stopped {
                return;
            }
        }

        let started = Instant::now();

        if let Err(e) = tick() {
            tracing::error!("{} sampler stopped: {}", name, e);
            *shared.lock() = SamplerState::Stopped;
            return;
        }

        let delay = Duration::from_nanos(shared.delay_ns.load(Ordering::Relaxed).max(0) as u64);
        if let Some(remaining) = delay.checked_sub(started.elapsed())
            && !remaining.is_zero()
        {
            let state = shared.lock();
            let _ = shared
                .wake
                .wait_timeout_while(state, remaining, |s| *s == SamplerState::Running)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(delay_ns: i64) -> (Sampler, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let sampler = Sampler::spawn("test", delay_ns, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        (sampler, ticks)
    }

    fn wait_for(ticks: &AtomicUsize, at_least: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < at_least {
            assert!(Instant::now() < deadline, "sampler did not tick");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_spawned_parked() {
        let (sampler, ticks) = counting(1_000_000);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sampler.state(), SamplerState::Parked);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_pause_stop() {
        let (mut sampler, ticks) = counting(1_000_000);

        sampler.start();
        wait_for(&ticks, 3);

        sampler.pause();
        assert_eq!(sampler.state(), SamplerState::Parked);
        thread::sleep(Duration::from_millis(20));
        let paused_at = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), paused_at);

        sampler.stop();
        assert_eq!(sampler.state(), SamplerState::Stopped);

        // A stopped sampler cannot be restarted
        sampler.start();
        assert_eq!(sampler.state(), SamplerState::Stopped);
    }

    #[test]
    fn test_stop_interrupts_long_delay() {
        let (mut sampler, ticks) = counting(60_000_000_000);
        sampler.start();
        wait_for(&ticks, 1);

        let begin = Instant::now();
        sampler.stop();
        assert!(begin.elapsed() < Duration::from_secs(5));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tick_error_ends_thread() {
        let mut sampler = Sampler::spawn("failing", 0, || {
            Err(SensorError::NotInitialized("failing"))
        })
        .unwrap();

        sampler.start();
        let deadline = Instant::now() + Duration::from_secs(5);
        while sampler.state() != SamplerState::Stopped {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        sampler.stop();
    }

    #[test]
    fn test_set_delay() {
        let (sampler, _ticks) = counting(5);
        sampler.set_delay(200_000_000);
        assert_eq!(sampler.delay(), 200_000_000);
    }
}
