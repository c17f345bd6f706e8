//! Prolific PL2303 driver, including the HXN (G-series) parts.
//!
//! The family spans several silicon generations that differ in vendor
//! request codes and status bit layout, so the device is classified from its
//! descriptor when the interface is set up.

use super::cdc_acm::{encode_line_coding, SET_CONTROL_LINE_STATE, SET_LINE_CODING};
use super::{claim_interface_at, ChipKind, ChipProtocol, PortEndpoints, UsbLink};
use crate::error::{SerialError, SerialResult, UsbTransferError};
use crate::params::SerialPortParameters;
use crate::usb::{UsbDeviceInfo, UsbEndpoint, USB_CLASS_COMM};
use std::time::Duration;
use tracing::debug;

const VENDOR_OUT_REQTYPE: u8 = 0x40;
const VENDOR_IN_REQTYPE: u8 = 0xc0;
const CTRL_OUT_REQTYPE: u8 = 0x21;

const VENDOR_READ_REQUEST: u8 = 0x01;
const VENDOR_WRITE_REQUEST: u8 = 0x01;
const VENDOR_READ_HXN_REQUEST: u8 = 0x81;
const VENDOR_WRITE_HXN_REQUEST: u8 = 0x80;

const WRITE_ENDPOINT: u8 = 0x02;
const READ_ENDPOINT: u8 = 0x83;
const INTERRUPT_ENDPOINT: u8 = 0x81;

const RESET_HXN_REQUEST: u16 = 0x07;
const FLUSH_RX_REQUEST: u16 = 0x08;
const FLUSH_TX_REQUEST: u16 = 0x09;
const RESET_HXN_RX_PIPE: u16 = 1;
const RESET_HXN_TX_PIPE: u16 = 2;

const GET_CONTROL_REQUEST: u16 = 0x87;
const GET_CONTROL_HXN_REQUEST: u16 = 0x80;

const CONTROL_DTR: u16 = 0x01;
const CONTROL_RTS: u16 = 0x02;

const GET_CONTROL_FLAG_RI: u8 = 0x01;
const GET_CONTROL_FLAG_CD: u8 = 0x02;
const GET_CONTROL_FLAG_DSR: u8 = 0x04;
const GET_CONTROL_FLAG_CTS: u8 = 0x08;

const GET_CONTROL_HXN_FLAG_CTS: u8 = 0x08;
const GET_CONTROL_HXN_FLAG_DSR: u8 = 0x20;
const GET_CONTROL_HXN_FLAG_CD: u8 = 0x40;
const GET_CONTROL_HXN_FLAG_RI: u8 = 0x80;

pub const STATUS_FLAG_CD: u8 = 0x01;
pub const STATUS_FLAG_DSR: u8 = 0x02;
pub const STATUS_FLAG_RI: u8 = 0x08;
pub const STATUS_FLAG_CTS: u8 = 0x80;

const STATUS_BUFFER_SIZE: usize = 10;
const STATUS_BYTE_IDX: usize = 8;
const STATUS_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Silicon generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProlificType {
    Type01,
    TypeT,
    #[default]
    Hx,
    Hxn,
}

/// Classify a device from its class and raw device descriptor.
///
/// `hx_status_ok` is only consulted for USB 2.0 parts that could be either
/// HX or HXN; HXN rejects the legacy status read.
pub fn classify(
    device_class: u8,
    raw_descriptor: &[u8],
    hx_status_ok: impl FnOnce() -> bool,
) -> SerialResult<ProlificType> {
    if raw_descriptor.len() < 14 {
        return Err(SerialError::io(format!(
            "device descriptor too short ({} bytes)",
            raw_descriptor.len()
        )));
    }
    let usb_version = u16::from_le_bytes([raw_descriptor[2], raw_descriptor[3]]);
    let device_version = u16::from_le_bytes([raw_descriptor[12], raw_descriptor[13]]);
    let max_packet_size0 = raw_descriptor[7];

    let kind = if device_class == USB_CLASS_COMM || max_packet_size0 != 64 {
        ProlificType::Type01
    } else if (device_version == 0x300 && usb_version == 0x200) || device_version == 0x500 {
        ProlificType::TypeT
    } else if usb_version == 0x200 && !hx_status_ok() {
        ProlificType::Hxn
    } else {
        ProlificType::Hx
    };
    Ok(kind)
}

/// Merge the interrupt status byte with the vendor control-line byte.
///
/// The vendor byte is active-low and its layout depends on the generation.
pub fn merge_status(device_type: ProlificType, interrupt_status: u8, control: u8) -> u8 {
    let flags = if device_type == ProlificType::Hxn {
        [
            (GET_CONTROL_HXN_FLAG_CTS, STATUS_FLAG_CTS),
            (GET_CONTROL_HXN_FLAG_DSR, STATUS_FLAG_DSR),
            (GET_CONTROL_HXN_FLAG_CD, STATUS_FLAG_CD),
            (GET_CONTROL_HXN_FLAG_RI, STATUS_FLAG_RI),
        ]
    } else {
        [
            (GET_CONTROL_FLAG_CTS, STATUS_FLAG_CTS),
            (GET_CONTROL_FLAG_DSR, STATUS_FLAG_DSR),
            (GET_CONTROL_FLAG_CD, STATUS_FLAG_CD),
            (GET_CONTROL_FLAG_RI, STATUS_FLAG_RI),
        ]
    };
    flags
        .iter()
        .filter(|(line, _)| control & line == 0)
        .fold(interrupt_status, |status, (_, flag)| status | flag)
}

#[derive(Debug, Default)]
pub struct ProlificDriver {
    device_type: ProlificType,
    interrupt_endpoint: Option<UsbEndpoint>,
    control_lines: u16,
}

impl ProlificDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_type(&self) -> ProlificType {
        self.device_type
    }

    fn is_hxn(&self) -> bool {
        self.device_type == ProlificType::Hxn
    }

    fn vendor_in(&self, link: &UsbLink, value: u16, index: u16, length: usize) -> SerialResult<Vec<u8>> {
        let request = if self.is_hxn() {
            VENDOR_READ_HXN_REQUEST
        } else {
            VENDOR_READ_REQUEST
        };
        link.control_in(VENDOR_IN_REQTYPE, request, value, index, length)
    }

    fn vendor_out(&self, link: &UsbLink, value: u16, index: u16) -> SerialResult<()> {
        let request = if self.is_hxn() {
            VENDOR_WRITE_HXN_REQUEST
        } else {
            VENDOR_WRITE_REQUEST
        };
        link.control_out(VENDOR_OUT_REQTYPE, request, value, index, &[])
    }

    fn set_control_lines(&mut self, link: &UsbLink, value: u16) -> SerialResult<()> {
        link.control_out(CTRL_OUT_REQTYPE, SET_CONTROL_LINE_STATE, value, 0, &[])?;
        self.control_lines = value;
        Ok(())
    }

    fn black_magic(&self, link: &UsbLink) -> SerialResult<()> {
        if self.is_hxn() {
            return Ok(());
        }
        self.vendor_in(link, 0x8484, 0, 1)?;
        self.vendor_out(link, 0x0404, 0)?;
        self.vendor_in(link, 0x8484, 0, 1)?;
        self.vendor_in(link, 0x8383, 0, 1)?;
        self.vendor_in(link, 0x8484, 0, 1)?;
        self.vendor_out(link, 0x0404, 1)?;
        self.vendor_in(link, 0x8484, 0, 1)?;
        self.vendor_in(link, 0x8383, 0, 1)?;
        self.vendor_out(link, 0, 1)?;
        self.vendor_out(link, 1, 0)?;
        let magic = if self.device_type == ProlificType::Hx {
            0x44
        } else {
            0x24
        };
        self.vendor_out(link, 2, magic)
    }

    fn status(&self, link: &UsbLink) -> SerialResult<u8> {
        let mut interrupt_status = 0;
        if let Some(endpoint) = &self.interrupt_endpoint {
            let mut buffer = [0u8; STATUS_BUFFER_SIZE];
            match link.bulk_transfer(endpoint, &mut buffer, STATUS_READ_TIMEOUT) {
                Ok(0) | Err(UsbTransferError::Timeout) => {}
                Ok(STATUS_BUFFER_SIZE) => interrupt_status = buffer[STATUS_BYTE_IDX],
                Ok(n) => {
                    return Err(SerialError::io(format!(
                        "status packet: expected {STATUS_BUFFER_SIZE} bytes, got {n}"
                    )))
                }
                Err(e) => return Err(SerialError::transfer("status packet", e)),
            }
        }

        let request = if self.is_hxn() {
            GET_CONTROL_HXN_REQUEST
        } else {
            GET_CONTROL_REQUEST
        };
        let control = self.vendor_in(link, request, 0, 1)?;
        Ok(merge_status(self.device_type, interrupt_status, control[0]))
    }

    fn test_status_flag(&self, link: &UsbLink, flag: u8) -> SerialResult<bool> {
        Ok(self.status(link)? & flag == flag)
    }
}

impl ChipProtocol for ProlificDriver {
    fn kind(&self) -> ChipKind {
        ChipKind::Prolific
    }

    fn set_interfaces(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
        _port_number: u8,
    ) -> SerialResult<PortEndpoints> {
        let interface = claim_interface_at(link, device, 0)?;
        let read = interface.endpoint_by_address(READ_ENDPOINT).copied();
        let write = interface.endpoint_by_address(WRITE_ENDPOINT).copied();
        self.interrupt_endpoint = interface.endpoint_by_address(INTERRUPT_ENDPOINT).copied();
        let (read, write) = read.zip(write).ok_or_else(|| {
            SerialError::endpoints("PL2303 needs bulk endpoints 0x83 and 0x02")
        })?;

        let raw = link
            .raw_descriptors()
            .ok_or_else(|| SerialError::io("could not get device descriptors"))?;
        self.device_type = classify(device.device_class, &raw, || {
            link.control_in(VENDOR_IN_REQTYPE, VENDOR_READ_REQUEST, 0x8080, 0, 1)
                .is_ok()
        })?;
        debug!("PL2303 classified as {:?}", self.device_type);

        self.set_control_lines(link, self.control_lines)?;
        self.purge_hw_buffers(link, true, true)?;
        self.black_magic(link)?;

        Ok(PortEndpoints {
            read,
            write,
            status: self.interrupt_endpoint,
        })
    }

    fn set_parameters(
        &mut self,
        link: &UsbLink,
        params: &SerialPortParameters,
    ) -> SerialResult<()> {
        let coding = encode_line_coding(params)?;
        link.control_out(CTRL_OUT_REQTYPE, SET_LINE_CODING, 0, 0, &coding)?;
        self.purge_hw_buffers(link, true, true)
    }

    fn dtr(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(self.control_lines & CONTROL_DTR == CONTROL_DTR)
    }

    fn set_dtr(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        let lines = if value {
            self.control_lines | CONTROL_DTR
        } else {
            self.control_lines & !CONTROL_DTR
        };
        self.set_control_lines(link, lines)
    }

    fn rts(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(self.control_lines & CONTROL_RTS == CONTROL_RTS)
    }

    fn set_rts(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        let lines = if value {
            self.control_lines | CONTROL_RTS
        } else {
            self.control_lines & !CONTROL_RTS
        };
        self.set_control_lines(link, lines)
    }

    fn cts(&mut self, link: &UsbLink) -> SerialResult<bool> {
        self.test_status_flag(link, STATUS_FLAG_CTS)
    }

    fn dsr(&mut self, link: &UsbLink) -> SerialResult<bool> {
        self.test_status_flag(link, STATUS_FLAG_DSR)
    }

    fn cd(&mut self, link: &UsbLink) -> SerialResult<bool> {
        self.test_status_flag(link, STATUS_FLAG_CD)
    }

    fn ri(&mut self, link: &UsbLink) -> SerialResult<bool> {
        self.test_status_flag(link, STATUS_FLAG_RI)
    }

    fn purge_hw_buffers(&mut self, link: &UsbLink, rx: bool, tx: bool) -> SerialResult<()> {
        if self.is_hxn() {
            let pipes = (if rx { RESET_HXN_RX_PIPE } else { 0 })
                | (if tx { RESET_HXN_TX_PIPE } else { 0 });
            if pipes != 0 {
                self.vendor_out(link, RESET_HXN_REQUEST, pipes)?;
            }
            return Ok(());
        }
        if rx {
            self.vendor_out(link, FLUSH_RX_REQUEST, 0)?;
        }
        if tx {
            self.vendor_out(link, FLUSH_TX_REQUEST, 0)?;
        }
        Ok(())
    }
}
