//! Complete workflow E2E tests: discover -> open -> communicate -> close
//!
//! These tests verify full end-to-end workflows including:
//! - Open/close idempotence with balanced connection handles
//! - Line-framed reads through the background monitor
//! - Reopening with new parameters

use crate::common::{
    all_families, cp2102_device, ft232r_device, serial_device, wait_until, ParamsBuilder,
};
use usb_serial_bridge::{ChipKind, SerialError, SerialPort};

#[test]
fn test_open_close_balances_handles_for_every_family() {
    for (device, chip) in all_families() {
        let (port, connection) = serial_device(device, chip);

        port.open(ParamsBuilder::new().baud_rate(9600).build())
            .unwrap_or_else(|e| panic!("{chip} failed to open: {e}"));
        port.open(ParamsBuilder::new().baud_rate(9600).build()).unwrap();
        assert_eq!(connection.open_handles(), 1, "{chip} opened twice");

        port.close().unwrap();
        port.close().unwrap();
        assert_eq!(connection.open_handles(), 0, "{chip} handle leaked");
        assert!(connection.is_closed());

        port.open(ParamsBuilder::new().baud_rate(9600).build()).unwrap();
        assert_eq!(connection.open_handles(), 1);
        port.close().unwrap();
    }
}

#[test]
fn test_full_workflow_write_read_close() {
    let (port, connection) = serial_device(ft232r_device(), ChipKind::Ftdi);
    port.open(ParamsBuilder::new().new_line("\r\n").build()).unwrap();

    assert_eq!(port.write_line("ATI").unwrap(), 5);
    assert_eq!(connection.written_bytes(0x02), b"ATI\r\n");

    // Every FTDI packet starts with two modem status bytes.
    connection.enqueue_bulk_in(0x81, &[0x01, 0x60, b'O', b'K', b'\r', b'\n']);
    assert!(wait_until(|| port.bytes_available() >= 4));
    assert_eq!(port.read_line().unwrap(), "OK");

    port.close().unwrap();
    assert!(!port.is_open());
    assert!(matches!(port.read_line(), Err(SerialError::PortNotOpen)));
}

#[test]
fn test_raw_read_drains_monitor_buffer() {
    let (port, connection) = serial_device(cp2102_device(), ChipKind::Cp21xx);
    port.open(ParamsBuilder::new().build()).unwrap();

    connection.enqueue_bulk_in(0x81, b"\x01\x02\x03");
    assert!(wait_until(|| port.bytes_available() == 3));

    let mut buf = [0u8; 2];
    assert_eq!(port.read(&mut buf).unwrap(), 2);
    assert_eq!(buf, [1, 2]);
    assert_eq!(port.read(&mut buf).unwrap(), 1);
    assert_eq!(buf[0], 3);
    assert_eq!(port.read(&mut buf).unwrap(), 0);
    port.close().unwrap();
}

#[test]
fn test_reopen_applies_new_parameters_and_drops_stale_data() {
    let (port, connection) = serial_device(cp2102_device(), ChipKind::Cp21xx);
    port.open(ParamsBuilder::new().baud_rate(9600).build()).unwrap();
    connection.enqueue_bulk_in(0x81, b"stale");
    assert!(wait_until(|| port.bytes_available() == 5));
    port.close().unwrap();

    connection.clear_control_log();
    port.open(ParamsBuilder::new().baud_rate(57600).build()).unwrap();
    assert_eq!(port.parameters().baud_rate, 57600);
    assert_eq!(port.bytes_available(), 0);
    assert!(connection
        .control_out_log()
        .contains(&(0x1e, 0, 0, 57600u32.to_le_bytes().to_vec())));
    port.close().unwrap();
}

#[test]
fn test_failed_open_releases_connection() {
    let (port, connection) = serial_device(ft232r_device(), ChipKind::Ftdi);
    let err = port
        .open(ParamsBuilder::new().baud_rate(4_000_000).build())
        .unwrap_err();

    assert!(matches!(err, SerialError::UnsupportedBaudRate(4_000_000)));
    assert!(!port.is_open());
    assert!(!port.is_monitoring());
    assert_eq!(connection.open_handles(), 0);
}

#[test]
fn test_read_existing_returns_everything() {
    let (port, connection) = serial_device(cp2102_device(), ChipKind::Cp21xx);
    port.open(ParamsBuilder::new().build()).unwrap();

    connection.enqueue_bulk_in(0x81, b"line one\nline");
    connection.enqueue_bulk_in(0x81, b" two");
    assert!(wait_until(|| port.bytes_available() == 17));
    assert_eq!(port.read_existing().unwrap(), "line one\nline two");
    assert_eq!(port.read_existing().unwrap(), "");
    port.close().unwrap();
}
