//! SMDK4x12 sensors diagnostic daemon
//!
//! Opens the sensors HAL the way the sensor service would, enables every
//! sensor and logs the events it polls. Useful to check a board's sensor
//! nodes without booting Android.

use anyhow::{Context, Result, bail};
use clap::Parser;
use smdk4x12_config::{CONFIG_PATH, SensorsConfig};
use smdk4x12_sensors::{PollDevice, SensorEvent, SensorType, SensorsModule};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Events fetched per poll call
const EVENT_BUFFER: usize = 16;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "smdk4x12-sensord")]
#[command(about = "Poll the SMDK4x12 sensors HAL and log every event", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Sampling period requested from every sensor
    #[arg(short, long = "delay-ms", default_value_t = 200)]
    delay_ms: u64,

    /// Stop after this many events (0 = until interrupted)
    #[arg(short = 'n', long, default_value_t = 0)]
    count: u64,

    /// Print the sensor list and exit
    #[arg(short, long)]
    list: bool,
}

fn main() -> Result<()> {
    setup_logging();

    let args = Args::parse();

    if args.list {
        print_sensor_list();
        return Ok(());
    }

    setup_signal_handlers()?;

    let config = SensorsConfig::load_layered(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    info!("Sensors daemon starting (config {})", args.config.display());

    let mut device = SensorsModule::open(&config).context("Failed to open sensors device")?;
    let enabled = enable_all(&mut device, args.delay_ms);
    if enabled.is_empty() {
        warn!("No sensor could be enabled");
    }

    let result = poll_loop(&mut device, args.count);

    for handle in enabled {
        device.activate(handle, 0);
    }
    device.close();

    info!("Sensors daemon stopped");
    result
}

fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

fn setup_signal_handlers() -> Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    // SAFETY: the handler only stores to an atomic.
    unsafe {
        sigaction(Signal::SIGTERM, &action)?;
        sigaction(Signal::SIGINT, &action)?;
    }

    Ok(())
}

extern "C" fn handle_signal(sig: i32) {
    if sig == libc::SIGTERM || sig == libc::SIGINT {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }
}

fn print_sensor_list() {
    let info = SensorsModule::info();
    println!(
        "{} v{}.{} ({})",
        info.name, info.version_major, info.version_minor, info.id
    );
    for descriptor in SensorsModule::get_sensors_list() {
        println!("{}", descriptor);
    }
}

/// Set the delay on and enable every listed sensor; returns the handles that came up
fn enable_all(device: &mut PollDevice, delay_ms: u64) -> Vec<i32> {
    let delay_ns = i64::try_from(delay_ms.saturating_mul(1_000_000)).unwrap_or(i64::MAX);
    let mut enabled = Vec::new();

    for descriptor in SensorsModule::get_sensors_list() {
        let handle = descriptor.handle();

        let rc = device.set_delay(handle, delay_ns);
        if rc < 0 {
            debug!("set_delay({}) returned {}", descriptor.name, rc);
        }

        match device.activate(handle, 1) {
            0 => {
                info!("Enabled {}", descriptor.name);
                enabled.push(handle);
            }
            rc => warn!("Unable to enable {} ({})", descriptor.name, rc),
        }
    }

    enabled
}

fn poll_loop(device: &mut PollDevice, limit: u64) -> Result<()> {
    let mut events = [SensorEvent::empty(); EVENT_BUFFER];
    let mut received: u64 = 0;

    while !SHUTDOWN.load(Ordering::SeqCst) {
        let rc = device.poll(&mut events);
        if rc < 0 {
            // poll(2) interrupted by our own signal
            if SHUTDOWN.load(Ordering::SeqCst) {
                break;
            }
            bail!("Sensors poll failed ({})", rc);
        }

        for event in &events[..rc as usize] {
            log_event(event);
            received += 1;

            if limit > 0 && received >= limit {
                info!("Received {} events", received);
                return Ok(());
            }
        }
    }

    info!("Interrupted after {} events", received);
    Ok(())
}

fn log_event(event: &SensorEvent) {
    let Some(sensor) = event.sensor_type() else {
        warn!("Event for unknown sensor {}", event.sensor);
        return;
    };

    match sensor {
        SensorType::Light | SensorType::Pressure | SensorType::Proximity => {
            info!("[{}] {:?}: {}", event.timestamp, sensor, event.scalar());
        }
        _ => {
            let v = &event.vector;
            info!(
                "[{}] {:?}: {:.3} {:.3} {:.3} (status {})",
                event.timestamp, sensor, v.x, v.y, v.z, v.status
            );
        }
    }
}
