//! Tests requiring actual serial hardware.
//!
//! These tests are skipped if no hardware is configured.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export USB_SERIAL_TEST_PORT=/dev/ttyUSB0   # or COM3 on Windows
//! export USB_SERIAL_TEST_BAUD=115200         # optional, default: 9600
//! export USB_SERIAL_TEST_LOOPBACK=1          # if the port has TX-RX loopback
//!
//! cargo test --test integration_hardware -- --ignored
//! ```

use super::utils::{attached_bridges, bridge_named};
use crate::common::recorder;
use crate::hardware_port;
use std::time::{Duration, Instant};
use usb_serial_bridge::{ModemControl, PortEvent, SerialPort};

#[test]
#[ignore]
fn test_real_port_open_close() {
    let port = hardware_port!();
    assert!(port.device.is_open());
    assert!(port.device.is_monitoring());
    assert_eq!(port.device.name(), port.name());

    port.device.close().unwrap();
    assert!(!port.device.is_open());
    assert!(!port.device.is_monitoring());
}

#[test]
#[ignore]
fn test_real_port_write() {
    let port = hardware_port!();
    assert_eq!(port.device.write(b"hello\n").unwrap(), 6);
    assert_eq!(port.device.write(b"").unwrap(), 0);
}

#[test]
#[ignore]
fn test_real_port_control_lines() {
    let port = hardware_port!();
    port.device.set_dtr(true).unwrap();
    port.device.set_rts(false).unwrap();
    assert!(port.device.dtr().unwrap());
    assert!(!port.device.rts().unwrap());

    // Input lines depend on wiring; they only need to be readable.
    port.device.cts().unwrap();
    port.device.dsr().unwrap();
    port.device.cd().unwrap();
    port.device.ri().unwrap();
}

#[test]
#[ignore]
fn test_real_port_loopback_line() {
    let port = hardware_port!();
    if !port.has_loopback() {
        println!("Skipping: loopback not enabled");
        return;
    }
    let (handler, events) = recorder();
    port.device.subscribe(handler);

    let start = Instant::now();
    port.device.write_line("ping").unwrap();
    assert_eq!(port.device.read_line().unwrap(), "ping");
    assert!(start.elapsed() < Duration::from_secs(1));

    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, PortEvent::DataReceived { .. })));
}

#[test]
#[ignore]
fn test_real_port_has_registered_driver() {
    let port = hardware_port!();
    let Some(bridge) = bridge_named(port.name()) else {
        println!("Skipping: {} is not a USB port", port.name());
        return;
    };
    println!("{} is {} ({:?})", bridge.name, bridge.identity, bridge.chip);
    assert!(bridge.chip.is_some(), "no driver registered for {}", bridge.identity);
}

#[test]
#[ignore]
fn test_list_attached_bridges() {
    for bridge in attached_bridges() {
        let family = bridge
            .chip
            .map_or_else(|| "unsupported".to_string(), |c| c.to_string());
        println!("{} {} {}", bridge.name, bridge.identity, family);
    }
}
