//! Module entry points against a device tree with no sensor nodes

use smdk4x12_config::SensorsConfig;
use smdk4x12_sensors::descriptors::{SENSOR_FLAG_ON_CHANGE_MODE, SENSOR_FLAG_WAKE_UP};
use smdk4x12_sensors::{SensorEvent, SensorType, SensorsModule};
use std::fs;
use tempfile::TempDir;

fn empty_board() -> (SensorsConfig, TempDir) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("dev/input")).unwrap();
    fs::create_dir_all(root.join("sys/class/input")).unwrap();

    let mut config = SensorsConfig::default();
    config.paths.input_dir = root.join("dev/input");
    config.paths.sysfs_input_class = root.join("sys/class/input");
    config.paths.uinput = root.join("dev/uinput");
    config.paths.accelerometer = root.join("dev/accelerometer");
    config.paths.magnetometer = root.join("dev/akm8975");
    config.paths.magnetometer_params = root.join("data/akmd.txt");
    config.uinput_settle_us = 0;

    (config, dir)
}

#[test]
fn test_sensor_list() {
    let list = SensorsModule::get_sensors_list();
    assert_eq!(list.len(), 7);

    let names: Vec<&str> = list.iter().map(|d| d.name).collect();
    assert!(names.contains(&"LSM330DLC Acceleration Sensor"));
    assert!(names.contains(&"AKM8975 Magnetic Sensor"));
    assert!(names.contains(&"Orientation Sensor"));
    assert!(names.contains(&"LPS331AP Pressure Sensor"));

    let proximity = list
        .iter()
        .find(|d| d.sensor_type == SensorType::Proximity)
        .unwrap();
    assert_eq!(
        proximity.flags,
        SENSOR_FLAG_WAKE_UP | SENSOR_FLAG_ON_CHANGE_MODE
    );
    assert_eq!(proximity.string_type(), "android.sensor.proximity");

    let gyroscope = list
        .iter()
        .find(|d| d.sensor_type == SensorType::Gyroscope)
        .unwrap();
    assert!((gyroscope.max_range - 500.0_f32.to_radians()).abs() < 1e-4);
    assert_eq!(gyroscope.min_delay, 5000);
}

#[test]
fn test_open_without_hardware() {
    let (config, _dir) = empty_board();
    let mut device = SensorsModule::open(&config).unwrap();

    // Every backend failed to init and stays registered but inert
    assert_eq!(device.device().registry().len(), 7);
    assert_eq!(device.device().poll_fd_count(), 0);

    let mut events = [SensorEvent::empty(); 4];
    assert_eq!(device.poll(&mut events), -libc::EINVAL);

    assert_eq!(device.activate(SensorType::Accelerometer.handle(), 1), -libc::EINVAL);
    assert_eq!(device.activate(SensorType::Light.handle(), 1), -libc::EINVAL);
    assert_eq!(device.activate(99, 1), -1);
    assert_eq!(device.set_delay(99, 1_000_000), 0);

    assert_eq!(device.close(), 0);
}

#[test]
fn test_open_with_selection() {
    let (mut config, _dir) = empty_board();
    config.sensors.orientation = false;
    config.sensors.magnetic = false;

    let device = SensorsModule::open(&config).unwrap();
    let registry = device.device().registry();
    assert_eq!(registry.len(), 5);
    assert!(registry.find(SensorType::Orientation).is_none());
    assert!(registry.find(SensorType::Light).is_some());
}

#[test]
fn test_open_with_nothing_selected() {
    let (mut config, _dir) = empty_board();
    let selection = &mut config.sensors;
    selection.acceleration = false;
    selection.magnetic = false;
    selection.orientation = false;
    selection.proximity = false;
    selection.light = false;
    selection.gyroscope = false;
    selection.pressure = false;

    let err = SensorsModule::open(&config).err().unwrap();
    assert_eq!(err.errno(), -libc::EINVAL);
}
