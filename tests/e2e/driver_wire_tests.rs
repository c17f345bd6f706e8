//! Wire-level checks through the full open path of each chip family.
//!
//! Each test opens a port through the engine against the scripted host and
//! asserts on the control requests the device would have seen.

use crate::common::{
    cdc_acm_device, ch340_device, cp2102_device, ft232r_device, pl2303_device, stm32_device,
    usb_port, ParamsBuilder,
};
use pretty_assertions::assert_eq;
use usb_serial_bridge::drivers::ch34x::encode_lcr;
use usb_serial_bridge::{ChipKind, ModemControl, Parity, PortTransport, SerialPortParameters};

const LINE_CODING_9600_8N1: [u8; 7] = [0x80, 0x25, 0x00, 0x00, 0x00, 0x00, 0x08];

fn params_9600() -> SerialPortParameters {
    ParamsBuilder::new().baud_rate(9600).build()
}

#[test]
fn test_cdc_acm_line_coding_and_control_lines() {
    let (port, connection) = usb_port(cdc_acm_device(), ChipKind::CdcAcm);
    port.open(&params_9600()).unwrap();
    port.set_dtr(true).unwrap();
    port.set_rts(true).unwrap();

    assert_eq!(
        connection.control_out_log(),
        vec![
            (0x20, 0, 0, LINE_CODING_9600_8N1.to_vec()),
            (0x22, 0x0001, 0, vec![]),
            (0x22, 0x0003, 0, vec![]),
        ]
    );
    assert!(port.dtr().unwrap());
    assert!(!port.cts().unwrap());

    let endpoints = port.endpoints().unwrap();
    assert_eq!(endpoints.read.address, 0x83);
    assert_eq!(endpoints.write.address, 0x04);
    port.close().unwrap();
}

#[test]
fn test_ch34x_handshake_then_line_settings() {
    let (port, connection) = usb_port(ch340_device(), ChipKind::Ch34x);
    port.open(&params_9600()).unwrap();

    let log = connection.control_out_log();
    let tail = &log[log.len() - 3..];
    let lcr = encode_lcr(&params_9600()).unwrap();
    assert_eq!(
        tail,
        &[
            (0x9a, 0x1312, 0xb202, vec![]),
            (0x9a, 0x0f2c, 0x0013, vec![]),
            (0x9a, 0x2518, u16::from(lcr), vec![]),
        ]
    );
    assert_eq!(connection.claimed_interfaces(), vec![0]);
    port.close().unwrap();
}

#[test]
fn test_ch34x_rejects_rates_outside_table() {
    let (port, connection) = usb_port(ch340_device(), ChipKind::Ch34x);
    assert!(port.open(&ParamsBuilder::new().baud_rate(57600).build()).is_err());
    assert_eq!(connection.open_handles(), 0);
}

#[test]
fn test_cp21xx_baud_and_line_control() {
    let (port, connection) = usb_port(cp2102_device(), ChipKind::Cp21xx);
    let params = SerialPortParameters {
        parity: Parity::Even,
        ..params_9600()
    };
    port.open(&params).unwrap();

    let log = connection.control_out_log();
    assert_eq!(log[0], (0x00, 0x0001, 0, vec![]));
    assert!(log.contains(&(0x1e, 0, 0, vec![0x80, 0x25, 0x00, 0x00])));
    assert_eq!(log.last(), Some(&(0x03, 0x0820, 0, vec![])));

    // Modem status: CTS and DSR asserted.
    connection.reply_control(0x08, 0, &[0x30]);
    assert!(port.cts().unwrap());
    assert!(port.dsr().unwrap());
    assert!(!port.ri().unwrap());
    port.close().unwrap();
}

#[test]
fn test_ftdi_baud_and_data_config() {
    let (port, connection) = usb_port(ft232r_device(), ChipKind::Ftdi);
    port.open(&params_9600()).unwrap();

    let log = connection.control_out_log();
    assert!(log.contains(&(0x03, 0x4138, 1, vec![])));
    assert_eq!(log.last(), Some(&(0x04, 0x0008, 1, vec![])));

    connection.clear_control_log();
    port.purge_hw_buffers(true, true).unwrap();
    assert_eq!(
        connection.control_out_log(),
        vec![(0x00, 1, 1, vec![]), (0x00, 2, 1, vec![])]
    );
    port.close().unwrap();
}

#[test]
fn test_prolific_hx_magic_then_line_coding() {
    let (port, connection) = usb_port(pl2303_device(), ChipKind::Prolific);
    port.open(&params_9600()).unwrap();

    let log = connection.control_out_log();
    let magic = log
        .iter()
        .position(|entry| *entry == (0x01, 2, 0x44, vec![]))
        .expect("HX magic write");
    let coding = log
        .iter()
        .position(|entry| *entry == (0x20, 0, 0, LINE_CODING_9600_8N1.to_vec()))
        .expect("line coding");
    assert!(magic < coding);
    assert_eq!(port.endpoints().unwrap().status.map(|e| e.address), Some(0x81));
    port.close().unwrap();
}

#[test]
fn test_stm32_requests_target_control_interface() {
    let (port, connection) = usb_port(stm32_device(), ChipKind::Stm32);
    port.open(&params_9600()).unwrap();
    port.set_dtr(true).unwrap();

    assert_eq!(
        connection.control_out_log(),
        vec![
            (0x20, 0, 1, LINE_CODING_9600_8N1.to_vec()),
            (0x22, 0x0001, 1, vec![]),
        ]
    );
    assert_eq!(connection.claimed_interfaces(), vec![1, 2]);
    port.close().unwrap();
}
