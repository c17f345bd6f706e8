//! E2E tests for device discovery and port lookup.
//!
//! These tests verify that the system can correctly:
//! - Probe connected USB devices against the driver table
//! - Skip devices without a registered driver
//! - Pick up extra vendor/product declarations from configuration
//! - Hand out one shared port per name

use crate::common::{cp2102_device, fast_monitor, ft232r_device, script_open, ParamsBuilder};
use std::io::Write;
use std::sync::Arc;
use usb_serial_bridge::usb::mock::MockUsbHost;
use usb_serial_bridge::usb::UsbDeviceInfo;
use usb_serial_bridge::{
    ChipKind, ConfigLoader, DeviceIdentity, DriverRegistry, PortManager, SerialError, SerialPort,
};

fn unknown_device(name: &str) -> UsbDeviceInfo {
    UsbDeviceInfo {
        name: name.into(),
        vendor_id: 0x1234,
        product_id: 0x5678,
        ..cp2102_device()
    }
}

fn host_with(devices: Vec<(UsbDeviceInfo, ChipKind)>) -> Arc<MockUsbHost> {
    let host = MockUsbHost::new();
    for (device, chip) in devices {
        let connection = host.add_device(device);
        script_open(&connection, chip);
    }
    Arc::new(host)
}

#[test]
fn test_list_skips_unsupported_devices() {
    let host = host_with(vec![
        (cp2102_device(), ChipKind::Cp21xx),
        (unknown_device("mystery"), ChipKind::Cp21xx),
        (ft232r_device(), ChipKind::Ftdi),
    ]);
    let manager = PortManager::new(host.clone());

    assert_eq!(manager.list_port_names(), vec!["cp2102/0", "ft232r/0"]);
    let chips: Vec<ChipKind> = manager.devices().iter().map(|d| d.chip).collect();
    assert_eq!(chips, vec![ChipKind::Cp21xx, ChipKind::Ftdi]);
}

#[test]
fn test_permission_denial_does_not_hide_device() {
    let host = host_with(vec![(cp2102_device(), ChipKind::Cp21xx)]);
    host.deny_permission("cp2102");
    let manager = PortManager::new(host.clone());

    assert_eq!(manager.list_port_names(), vec!["cp2102/0"]);
    assert!(host.permission_requests().contains(&"cp2102".to_string()));
}

#[test]
fn test_get_port_unknown_name() {
    let host = host_with(vec![(cp2102_device(), ChipKind::Cp21xx)]);
    let manager = PortManager::new(host);

    let err = manager.get_port("cp2102/1").unwrap_err();
    assert!(matches!(err, SerialError::PortNotFound(ref name) if name == "cp2102/1"));
}

#[test]
fn test_get_port_is_shared_and_opens() {
    let host = host_with(vec![(ft232r_device(), ChipKind::Ftdi)]);
    let manager = PortManager::new(host.clone()).with_monitor_options(fast_monitor());

    let first = manager.get_port("ft232r/0").unwrap();
    let second = manager.get_port("ft232r/0").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    first.open(ParamsBuilder::new().baud_rate(115_200).build()).unwrap();
    assert!(second.is_open());

    manager.close_all().unwrap();
    assert!(!first.is_open());
    assert_eq!(host.connection("ft232r").unwrap().open_handles(), 0);
}

#[test]
fn test_configured_declaration_adds_device() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[[drivers.extra]]
vendor_id = 0x1234
product_ids = [0x5678]
chip = "cp21xx"
"#
    )
    .unwrap();
    let loader = ConfigLoader::load_from(file.path()).unwrap();

    let registry = Arc::new(DriverRegistry::with_builtin_drivers());
    assert!(!registry.contains(DeviceIdentity::new(0x1234, 0x5678)));
    assert_eq!(registry.register_all(&loader.config().drivers.extra), 1);

    let host = host_with(vec![(unknown_device("custom"), ChipKind::Cp21xx)]);
    let manager = PortManager::with_registry(host, registry).with_monitor_options(fast_monitor());
    assert_eq!(manager.list_port_names(), vec!["custom/0"]);

    let port = manager.get_port("custom/0").unwrap();
    port.open(ParamsBuilder::new().build()).unwrap();
    port.close().unwrap();
}

#[test]
fn test_builtin_identity_cannot_be_overridden() {
    let registry = DriverRegistry::with_builtin_drivers();
    let ft232r = DeviceIdentity::new(0x0403, 0x6001);

    assert!(!registry.register(ft232r, ChipKind::Cp21xx.factory()));
    assert_eq!(registry.chip_kind(ft232r), Some(ChipKind::Ftdi));
}
