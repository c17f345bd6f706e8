//! Environment-driven setup for tests against a real adapter.
//!
//! `USB_SERIAL_TEST_PORT` names the OS port to open. `USB_SERIAL_TEST_BAUD`
//! overrides the 9600 default and `USB_SERIAL_TEST_LOOPBACK=1` marks a
//! TX-RX jumper.

use std::env;
use std::sync::Arc;
use usb_serial_bridge::port::available_ports;
use usb_serial_bridge::{
    ChipKind, DeviceIdentity, DriverRegistry, MonitorOptions, NativeSerialPort, SerialDevice,
    SerialPort, SerialPortParameters, SerialResult,
};

pub const PORT_VAR: &str = "USB_SERIAL_TEST_PORT";
const BAUD_VAR: &str = "USB_SERIAL_TEST_BAUD";
const LOOPBACK_VAR: &str = "USB_SERIAL_TEST_LOOPBACK";

/// An OS serial port backed by a USB bridge.
#[derive(Debug, Clone)]
pub struct AttachedBridge {
    pub name: String,
    pub identity: DeviceIdentity,
    /// Family the built-in table maps the identity to, if any.
    pub chip: Option<ChipKind>,
}

/// USB-backed ports the OS enumerates, tagged with their driver family.
pub fn attached_bridges() -> Vec<AttachedBridge> {
    let registry = DriverRegistry::global();
    available_ports()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|port| {
            let usb = port.usb?;
            let identity = DeviceIdentity::new(usb.vendor_id, usb.product_id);
            Some(AttachedBridge {
                name: port.name,
                identity,
                chip: registry.chip_kind(identity),
            })
        })
        .collect()
}

pub fn bridge_named(name: &str) -> Option<AttachedBridge> {
    attached_bridges().into_iter().find(|b| b.name == name)
}

/// The configured adapter, opened with its monitor running. Closed on drop.
pub struct HardwarePort {
    pub device: SerialDevice,
    name: String,
    loopback: bool,
}

impl HardwarePort {
    /// `None` when no port is configured.
    pub fn from_env() -> Option<SerialResult<Self>> {
        let name = env::var(PORT_VAR).ok()?;
        let baud_rate = env::var(BAUD_VAR)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(9600);
        let loopback = env::var(LOOPBACK_VAR).is_ok_and(|v| v == "1");

        let params = SerialPortParameters {
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
            ..SerialPortParameters::with_baud_rate(baud_rate)
        };
        let device = SerialDevice::new(
            Arc::new(NativeSerialPort::new(name.clone())),
            params.clone(),
            MonitorOptions::default(),
        );
        Some(device.open(params).map(|()| Self {
            device,
            name,
            loopback,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_loopback(&self) -> bool {
        self.loopback
    }
}

impl Drop for HardwarePort {
    fn drop(&mut self) {
        let _ = self.device.close();
    }
}

/// Open the configured adapter, or return early from the test when unset.
#[macro_export]
macro_rules! hardware_port {
    () => {
        match $crate::hardware::utils::HardwarePort::from_env() {
            Some(port) => port.expect("configured test port should open"),
            None => {
                println!("Skipping: {} not set", $crate::hardware::utils::PORT_VAR);
                return;
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridges_agree_with_registry() {
        for bridge in attached_bridges() {
            assert_eq!(
                bridge.chip,
                DriverRegistry::global().chip_kind(bridge.identity),
                "{}",
                bridge.name
            );
        }
    }
}
