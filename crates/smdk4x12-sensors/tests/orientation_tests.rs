//! Orientation wired through a real registry and the aggregator

use smdk4x12_sensors::mock::{MockFeed, MockCalls, MockSensor, input_pair};
use smdk4x12_sensors::orientation::OrientationSensor;
use smdk4x12_sensors::{
    BackendRef, Needed, Registry, SensorEvent, SensorType, SensorVec, SensorsDevice,
};

const ORIENTATION: i32 = SensorType::Orientation.handle();
const ACCELEROMETER: i32 = SensorType::Accelerometer.handle();

struct Fused {
    device: SensorsDevice,
    accel_calls: MockCalls,
    magnetic_calls: MockCalls,
    _feeds: [MockFeed; 2],
}

/// Mock acceleration and magnetic backends plus orientation publishing into a socket pair
fn fused() -> Fused {
    let (accel, accel_feed) = MockSensor::new(SensorType::Accelerometer).unwrap();
    let (magnetic, magnetic_feed) = MockSensor::new(SensorType::MagneticField).unwrap();
    let (input, publisher) = input_pair("orientation").unwrap();

    let accel_calls = accel.calls();
    let magnetic_calls = magnetic.calls();

    let registry = Registry::new()
        .with(accel)
        .with(magnetic)
        .with(OrientationSensor::with_output(publisher, input));

    Fused {
        device: SensorsDevice::open(registry).unwrap(),
        accel_calls,
        magnetic_calls,
        _feeds: [accel_feed, magnetic_feed],
    }
}

fn backend(device: &SensorsDevice, sensor: SensorType) -> BackendRef {
    device.registry().find(sensor).cloned().unwrap()
}

#[test]
fn test_orientation_resolves_dependencies() {
    let Fused { device, _feeds, .. } = fused();

    // Acceleration, magnetic and orientation nodes
    assert_eq!(device.poll_fd_count(), 3);
    assert!(backend(&device, SensorType::Orientation).lock().is_initialized());
}

#[test]
fn test_orientation_first_then_api() {
    let Fused {
        mut device,
        accel_calls,
        magnetic_calls,
        _feeds,
    } = fused();
    let accel = backend(&device, SensorType::Accelerometer);
    let magnetic = backend(&device, SensorType::MagneticField);

    device.activate(ORIENTATION, true).unwrap();
    assert_eq!(accel.lock().needed(), Needed::ORIENTATION);
    assert_eq!(magnetic.lock().needed(), Needed::ORIENTATION);
    assert_eq!(accel_calls.activations(), 1);
    assert_eq!(magnetic_calls.activations(), 1);

    // Already running: the service request only adds a reason
    device.activate(ACCELEROMETER, true).unwrap();
    assert_eq!(accel.lock().needed(), Needed::API | Needed::ORIENTATION);
    assert_eq!(accel_calls.activations(), 1);

    device.activate(ORIENTATION, false).unwrap();
    assert_eq!(accel.lock().needed(), Needed::API);
    assert!(accel.lock().is_activated());
    assert_eq!(accel_calls.deactivations(), 0);
    assert_eq!(magnetic.lock().needed(), Needed::NONE);
    assert_eq!(magnetic_calls.deactivations(), 1);

    device.activate(ACCELEROMETER, false).unwrap();
    assert_eq!(accel.lock().needed(), Needed::NONE);
    assert_eq!(accel_calls.deactivations(), 1);

    device.close();
}

#[test]
fn test_orientation_delay_reaches_idle_dependencies() {
    let Fused {
        mut device,
        accel_calls,
        magnetic_calls,
        _feeds,
    } = fused();

    device.activate(ACCELEROMETER, true).unwrap();
    device.activate(ORIENTATION, true).unwrap();
    device.set_delay(ORIENTATION, 50_000_000).unwrap();

    assert_eq!(accel_calls.delays(), Vec::<i64>::new());
    assert_eq!(magnetic_calls.delays(), vec![50_000_000]);

    device.activate(ORIENTATION, false).unwrap();
    device.close();
}

#[test]
fn test_fused_angles_polled() {
    // Both feeds stay open, so only orientation becomes readable
    let Fused {
        mut device, _feeds, ..
    } = fused();

    let sink = backend(&device, SensorType::Orientation)
        .lock()
        .backend()
        .fusion_sink()
        .unwrap();
    // Flat, with the field pointing along -X: facing east
    sink.fill(
        Some(&SensorVec::new(0.0, 0.0, 9.81)),
        Some(&SensorVec::new(-40.0, 0.0, 0.0)),
    );

    device.set_delay(ORIENTATION, 10_000_000).unwrap();
    device.activate(ORIENTATION, true).unwrap();

    let mut events = [SensorEvent::empty(); 4];
    let count = device.poll(&mut events).unwrap();
    assert!(count >= 1);

    let event = &events[0];
    assert_eq!(event.sensor_type(), Some(SensorType::Orientation));
    assert!((event.vector.azimuth() - 90.0).abs() < 0.01);
    assert_eq!(event.vector.pitch(), 0.0);
    assert_eq!(event.vector.roll(), 0.0);
    assert!(event.timestamp > 0);

    device.activate(ORIENTATION, false).unwrap();
    device.close();
}
