//! Shared test utilities for the bridge driver tests.
//!
//! This module provides common test infrastructure including:
//! - Device descriptor builders for each supported chip family
//! - Mock host setup returning the scripted connection
//! - Parameter builders and polling helpers

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use usb_serial_bridge::usb::mock::{MockConnection, MockUsbHost};
use usb_serial_bridge::usb::{UsbDeviceInfo, UsbEndpoint, UsbInterface, USB_CLASS_CDC_DATA, USB_CLASS_COMM};
use usb_serial_bridge::{
    ChipKind, EventHandler, MonitorOptions, PortEvent, SerialDevice, SerialPortParameters,
    UsbSerialPort,
};

fn info(name: &str, vendor_id: u16, product_id: u16, interfaces: Vec<UsbInterface>) -> UsbDeviceInfo {
    UsbDeviceInfo {
        name: name.into(),
        vendor_id,
        product_id,
        device_class: 0,
        interfaces,
    }
}

/// Arduino Uno: CDC control interface plus data interface.
pub fn cdc_acm_device() -> UsbDeviceInfo {
    info(
        "arduino",
        0x2341,
        0x0043,
        vec![
            UsbInterface::new(0, USB_CLASS_COMM, vec![UsbEndpoint::interrupt_in(2, 8)]),
            UsbInterface::new(
                1,
                USB_CLASS_CDC_DATA,
                vec![UsbEndpoint::bulk_out(4, 64), UsbEndpoint::bulk_in(3, 64)],
            ),
        ],
    )
}

pub fn ch340_device() -> UsbDeviceInfo {
    info(
        "ch340",
        0x1a86,
        0x7523,
        vec![UsbInterface::new(
            0,
            0xff,
            vec![
                UsbEndpoint::bulk_in(2, 32),
                UsbEndpoint::bulk_out(2, 32),
                UsbEndpoint::interrupt_in(1, 8),
            ],
        )],
    )
}

pub fn cp2102_device() -> UsbDeviceInfo {
    info(
        "cp2102",
        0x10c4,
        0xea60,
        vec![UsbInterface::new(
            0,
            0xff,
            vec![UsbEndpoint::bulk_in(1, 64), UsbEndpoint::bulk_out(1, 64)],
        )],
    )
}

pub fn ft232r_device() -> UsbDeviceInfo {
    info(
        "ft232r",
        0x0403,
        0x6001,
        vec![UsbInterface::new(
            0,
            0xff,
            vec![UsbEndpoint::bulk_in(1, 64), UsbEndpoint::bulk_out(2, 64)],
        )],
    )
}

pub fn pl2303_device() -> UsbDeviceInfo {
    info(
        "pl2303",
        0x067b,
        0x2303,
        vec![UsbInterface::new(
            0,
            0xff,
            vec![
                UsbEndpoint::interrupt_in(1, 10),
                UsbEndpoint::bulk_out(2, 64),
                UsbEndpoint::bulk_in(3, 64),
            ],
        )],
    )
}

pub fn stm32_device() -> UsbDeviceInfo {
    info(
        "nucleo",
        0x0483,
        0x374b,
        vec![
            UsbInterface::new(0, 0xff, vec![UsbEndpoint::bulk_in(1, 64)]),
            UsbInterface::new(1, USB_CLASS_COMM, vec![UsbEndpoint::interrupt_in(2, 16)]),
            UsbInterface::new(
                2,
                USB_CLASS_CDC_DATA,
                vec![UsbEndpoint::bulk_out(5, 64), UsbEndpoint::bulk_in(5, 64)],
            ),
        ],
    )
}

/// PL2303HX device descriptor: bcdUSB 1.10, bMaxPacketSize0 64, bcdDevice 3.00.
pub fn pl2303_hx_descriptor() -> Vec<u8> {
    vec![
        18, 0x01, 0x10, 0x01, 0x00, 0x00, 0x00, 64, 0x7b, 0x06, 0x03, 0x23, 0x00, 0x03, 1, 2, 0, 1,
    ]
}

/// Descriptor builder, device, and chip family for every built-in family.
pub fn all_families() -> Vec<(UsbDeviceInfo, ChipKind)> {
    vec![
        (cdc_acm_device(), ChipKind::CdcAcm),
        (ch340_device(), ChipKind::Ch34x),
        (cp2102_device(), ChipKind::Cp21xx),
        (ft232r_device(), ChipKind::Ftdi),
        (pl2303_device(), ChipKind::Prolific),
        (stm32_device(), ChipKind::Stm32),
    ]
}

/// Script the replies a chip needs to get through open.
pub fn script_open(connection: &MockConnection, chip: ChipKind) {
    match chip {
        ChipKind::Ch34x => connection.reply_control(0x95, 0x0706, &[0x00, 0xee]),
        ChipKind::Prolific => connection.set_raw_descriptors(&pl2303_hx_descriptor()),
        _ => {}
    }
}

/// A mock host with `device` attached and its open replies scripted.
pub fn mock_host(device: UsbDeviceInfo, chip: ChipKind) -> (Arc<MockUsbHost>, MockConnection) {
    let host = MockUsbHost::new();
    let connection = host.add_device(device);
    script_open(&connection, chip);
    (Arc::new(host), connection)
}

/// A closed engine port over a freshly scripted mock host.
pub fn usb_port(device: UsbDeviceInfo, chip: ChipKind) -> (UsbSerialPort, MockConnection) {
    let (host, connection) = mock_host(device.clone(), chip);
    (UsbSerialPort::new(host, device, 0, chip.factory()), connection)
}

/// A closed serial device over a freshly scripted mock host.
pub fn serial_device(device: UsbDeviceInfo, chip: ChipKind) -> (SerialDevice, MockConnection) {
    let (port, connection) = usb_port(device, chip);
    let device = SerialDevice::new(Arc::new(port), SerialPortParameters::default(), fast_monitor());
    (device, connection)
}

pub fn fast_monitor() -> MonitorOptions {
    MonitorOptions {
        stop_timeout: Duration::from_secs(1),
        error_backoff: Duration::from_millis(1),
        ..MonitorOptions::default()
    }
}

/// Builder for test port parameters.
pub struct ParamsBuilder {
    params: SerialPortParameters,
}

impl ParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: SerialPortParameters::default(),
        }
    }

    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.params.baud_rate = baud;
        self
    }

    pub fn read_timeout_ms(mut self, timeout: u64) -> Self {
        self.params.read_timeout_ms = timeout;
        self
    }

    pub fn new_line(mut self, new_line: &str) -> Self {
        self.params.new_line = new_line.to_string();
        self
    }

    pub fn build(self) -> SerialPortParameters {
        self.params
    }
}

/// A subscriber that records every event.
pub fn recorder() -> (EventHandler, Arc<Mutex<Vec<PortEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let handler: EventHandler = Arc::new(move |event: &PortEvent| sink.lock().push(event.clone()));
    (handler, events)
}

/// Poll `condition` for up to two seconds.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_builder() {
        let params = ParamsBuilder::new()
            .baud_rate(9600)
            .read_timeout_ms(50)
            .new_line("\r\n")
            .build();

        assert_eq!(params.baud_rate, 9600);
        assert_eq!(params.read_timeout_ms, 50);
        assert_eq!(params.new_line, "\r\n");
    }

    #[test]
    fn test_every_family_has_a_device() {
        let kinds: Vec<ChipKind> = all_families().into_iter().map(|(_, k)| k).collect();
        assert_eq!(kinds, ChipKind::ALL.to_vec());
    }
}
