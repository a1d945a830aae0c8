//! Poll loop and activation routing, driven through mock backends

use smdk4x12_sensors::mock::{MockFeed, MockCalls, MockSensor};
use smdk4x12_sensors::{Needed, Registry, SensorEvent, SensorType, SensorsDevice, SensorsModule};

struct Fixture {
    registry: Registry,
    feeds: Vec<MockFeed>,
    calls: Vec<MockCalls>,
}

fn fixture(sensors: &[SensorType]) -> Fixture {
    let mut fixture = Fixture {
        registry: Registry::new(),
        feeds: Vec::new(),
        calls: Vec::new(),
    };

    for &sensor in sensors {
        let (mock, feed) = MockSensor::new(sensor).unwrap();
        fixture.calls.push(mock.calls());
        fixture.registry.push(Box::new(mock));
        fixture.feeds.push(feed);
    }

    fixture
}

#[test]
fn test_poll_single_ready_backend() {
    let Fixture {
        registry, feeds, ..
    } = fixture(&[SensorType::Light, SensorType::Pressure]);
    let mut device = SensorsDevice::open(registry).unwrap();

    feeds[1].push([1013, 0, 0]).unwrap();

    let mut events = [SensorEvent::empty(); 4];
    assert_eq!(device.poll(&mut events).unwrap(), 1);
    assert_eq!(events[0].sensor_type(), Some(SensorType::Pressure));
    assert_eq!(events[0].scalar(), 1013.0);
    assert!(events[0].timestamp > 0);
}

#[test]
fn test_poll_drains_every_ready_backend() {
    let Fixture {
        registry, feeds, ..
    } = fixture(&[SensorType::Gyroscope, SensorType::Light, SensorType::Proximity]);
    let mut device = SensorsDevice::open(registry).unwrap();

    for feed in &feeds {
        feed.push([1, 2, 3]).unwrap();
    }

    let mut events = [SensorEvent::empty(); 8];
    assert_eq!(device.poll(&mut events).unwrap(), 3);

    let mut handles: Vec<i32> = events[..3].iter().map(|e| e.sensor).collect();
    handles.sort();
    assert_eq!(handles, vec![4, 5, 8]);
}

#[test]
fn test_poll_respects_buffer_length() {
    let Fixture {
        registry, feeds, ..
    } = fixture(&[SensorType::Light, SensorType::Pressure]);
    let mut device = SensorsDevice::open(registry).unwrap();

    feeds[0].push([10, 0, 0]).unwrap();
    feeds[1].push([20, 0, 0]).unwrap();

    let mut events = [SensorEvent::empty(); 1];
    assert_eq!(device.poll(&mut events).unwrap(), 1);
    assert_eq!(events[0].sensor_type(), Some(SensorType::Light));

    // The pressure sample is still queued
    assert_eq!(device.poll(&mut events).unwrap(), 1);
    assert_eq!(events[0].sensor_type(), Some(SensorType::Pressure));
    assert_eq!(events[0].scalar(), 20.0);
}

#[test]
fn test_poll_failed_read_ends_round() {
    let Fixture {
        registry,
        feeds,
        calls,
    } = fixture(&[SensorType::Light, SensorType::Pressure]);
    let mut device = SensorsDevice::open(registry).unwrap();

    calls[0].fail_next_reads(1);
    feeds[0].push([10, 0, 0]).unwrap();
    feeds[1].push([20, 0, 0]).unwrap();

    let mut events = [SensorEvent::empty(); 4];
    assert_eq!(device.poll(&mut events).unwrap(), 1);
    assert_eq!(events[0].sensor_type(), Some(SensorType::Pressure));

    // The failed packet was consumed; the next one comes through
    feeds[0].push([11, 0, 0]).unwrap();
    assert_eq!(device.poll(&mut events).unwrap(), 1);
    assert_eq!(events[0].sensor_type(), Some(SensorType::Light));
    assert_eq!(events[0].scalar(), 11.0);
}

#[test]
fn test_activation_is_reference_counted() {
    let Fixture {
        registry, calls, ..
    } = fixture(&[SensorType::Accelerometer]);
    let backend = registry.find(SensorType::Accelerometer).unwrap().clone();
    let mut device = SensorsDevice::open(registry).unwrap();
    let handle = SensorType::Accelerometer.handle();

    // Orientation holds the sensor, then the service asks for it too
    backend.lock().request(Needed::ORIENTATION).unwrap();
    device.activate(handle, true).unwrap();
    device.activate(handle, true).unwrap();
    assert_eq!(calls[0].activations(), 1);
    assert_eq!(backend.lock().needed(), Needed::API | Needed::ORIENTATION);

    // Service lets go; orientation still needs it
    device.activate(handle, false).unwrap();
    assert_eq!(calls[0].deactivations(), 0);
    assert!(backend.lock().is_activated());

    backend.lock().release(Needed::ORIENTATION).unwrap();
    assert_eq!(calls[0].deactivations(), 1);
    assert_eq!(backend.lock().needed(), Needed::NONE);
}

#[test]
fn test_unknown_handles() {
    let Fixture { registry, .. } = fixture(&[SensorType::Light]);
    let mut device = SensorsModule::open_with(registry).unwrap();

    // activate refuses, set_delay quietly accepts
    assert_eq!(device.activate(42, 1), -1);
    assert_eq!(device.activate(42, 0), -1);
    assert_eq!(device.set_delay(42, 10_000_000), 0);
}

#[test]
fn test_set_delay_is_routed() {
    let Fixture {
        registry, calls, ..
    } = fixture(&[SensorType::Light, SensorType::Gyroscope]);
    let mut device = SensorsModule::open_with(registry).unwrap();

    assert_eq!(device.set_delay(SensorType::Gyroscope.handle(), 5_000_000), 0);
    assert!(calls[0].delays().is_empty());
    assert_eq!(calls[1].delays(), vec![5_000_000]);
}

#[test]
fn test_close_deinitializes_once() {
    let Fixture {
        registry, calls, ..
    } = fixture(&[SensorType::Light, SensorType::Pressure]);
    let mut device = SensorsModule::open_with(registry).unwrap();

    assert_eq!(device.close(), 0);
    assert_eq!(device.close(), 0);
    drop(device);

    for recorded in &calls {
        assert_eq!(recorded.deinits(), 1);
    }
}
