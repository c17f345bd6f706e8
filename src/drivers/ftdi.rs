//! FTDI FT232/FT2232/FT4232/FT231X driver.
//!
//! Baud rates are derived from a 3 MHz base clock with a 14-bit integer
//! divisor and a 3-bit fractional sub-divisor. Every bulk-in packet starts
//! with two modem-status bytes that are not payload.

use super::{claim_interface_at, endpoint_at, ChipKind, ChipProtocol, PortEndpoints, UsbLink};
use crate::error::{SerialError, SerialResult};
use crate::params::{DataBits, Parity, SerialPortParameters, StopBits};
use crate::usb::UsbDeviceInfo;
use tracing::debug;

const REQTYPE_OUT: u8 = 0x40;
const REQTYPE_IN: u8 = 0xc0;

const RESET_REQUEST: u8 = 0;
const MODEM_CONTROL_REQUEST: u8 = 1;
const SET_BAUD_RATE_REQUEST: u8 = 3;
const SET_DATA_REQUEST: u8 = 4;
const GET_MODEM_STATUS_REQUEST: u8 = 5;

const MODEM_CONTROL_DTR_ENABLE: u16 = 0x0101;
const MODEM_CONTROL_DTR_DISABLE: u16 = 0x0100;
const MODEM_CONTROL_RTS_ENABLE: u16 = 0x0202;
const MODEM_CONTROL_RTS_DISABLE: u16 = 0x0200;

pub const MODEM_STATUS_CTS: u8 = 0x10;
pub const MODEM_STATUS_DSR: u8 = 0x20;
pub const MODEM_STATUS_RI: u8 = 0x40;
pub const MODEM_STATUS_CD: u8 = 0x80;

const RESET_ALL: u16 = 0;
const RESET_PURGE_RX: u16 = 1;
const RESET_PURGE_TX: u16 = 2;

/// Status bytes at the start of every bulk-in packet.
pub const READ_HEADER_LEN: usize = 2;

/// Highest rate the chips can be programmed for.
pub const MAX_BAUD_RATE: u32 = 3_000_000;

/// Allowed relative deviation between requested and achievable rate.
const MAX_BAUD_DEVIATION: f64 = 0.03;

/// A programmed baud rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FtdiBaud {
    /// `wValue` of `SET_BAUD_RATE`: divisor plus sub-divisor bits 14..15.
    pub value: u16,
    /// Third sub-divisor bit, carried in `wIndex`.
    pub index: u16,
    /// Rate the chip will actually run at.
    pub effective: u32,
}

/// Compute the divisor encoding for `baud_rate`.
pub fn encode_baud(baud_rate: u32) -> SerialResult<FtdiBaud> {
    if baud_rate == 0 || baud_rate > MAX_BAUD_RATE {
        return Err(SerialError::UnsupportedBaudRate(baud_rate));
    }

    let (divisor, sub, effective) = if baud_rate >= 2_500_000 {
        (0u32, 0u32, 3_000_000u32)
    } else if baud_rate >= 1_750_000 {
        (1, 0, 2_000_000)
    } else {
        let rounded = ((48_000_000 / baud_rate) + 1) >> 1;
        let sub = rounded & 0x07;
        let divisor = rounded >> 3;
        if divisor > 0x3fff {
            return Err(SerialError::UnsupportedBaudRate(baud_rate));
        }
        let effective = ((48_000_000 / ((divisor << 3) + sub)) + 1) >> 1;
        (divisor, sub, effective)
    };

    let deviation = (1.0 - f64::from(effective) / f64::from(baud_rate)).abs();
    if deviation > MAX_BAUD_DEVIATION {
        debug!(
            "Baud rate {} deviates {:.1}% from achievable {}",
            baud_rate,
            deviation * 100.0,
            effective
        );
        return Err(SerialError::UnsupportedBaudRate(baud_rate));
    }

    let (fraction, index) = match sub {
        0 => (0x0000, 0),
        4 => (0x4000, 0),
        2 => (0x8000, 0),
        1 => (0xc000, 0),
        3 => (0x0000, 1),
        5 => (0x4000, 1),
        6 => (0x8000, 1),
        _ => (0xc000, 1),
    };
    // divisor <= 0x3fff, checked above.
    let value = (divisor as u16) | fraction;
    Ok(FtdiBaud {
        value,
        index,
        effective,
    })
}

/// `SET_DATA` word: data bits, parity in bits 8..10, two stop bits at 12.
pub fn encode_data_config(params: &SerialPortParameters) -> SerialResult<u16> {
    let mut config: u16 = match params.data_bits {
        DataBits::Seven => 7,
        DataBits::Eight => 8,
        other => {
            return Err(SerialError::unsupported(format!(
                "FTDI does not support {} data bits",
                other.bits()
            )))
        }
    };
    config |= match params.parity {
        Parity::None => 0,
        Parity::Odd => 0x100,
        Parity::Even => 0x200,
        Parity::Mark => 0x300,
        Parity::Space => 0x400,
    };
    config |= match params.stop_bits {
        StopBits::One | StopBits::NotSet => 0,
        StopBits::Two => 0x1000,
        StopBits::OnePointFive => {
            return Err(SerialError::unsupported("FTDI does not support 1.5 stop bits"))
        }
    };
    Ok(config)
}

/// Remove the status header from every `max_packet_size` packet in `raw`.
pub fn strip_status_headers(
    raw: &[u8],
    max_packet_size: usize,
    dest: &mut [u8],
) -> SerialResult<usize> {
    if max_packet_size <= READ_HEADER_LEN {
        return Err(SerialError::io(format!(
            "max packet size {max_packet_size} leaves no room for payload"
        )));
    }
    let mut written = 0;
    for packet in raw.chunks(max_packet_size) {
        if packet.len() < READ_HEADER_LEN {
            return Err(SerialError::io(format!(
                "expected at least {READ_HEADER_LEN} bytes, got {}",
                packet.len()
            )));
        }
        let payload = &packet[READ_HEADER_LEN..];
        let n = payload.len().min(dest.len() - written);
        dest[written..written + n].copy_from_slice(&payload[..n]);
        written += n;
    }
    Ok(written)
}

#[derive(Debug, Default)]
pub struct FtdiDriver {
    port_index: u16,
    dtr: bool,
    rts: bool,
}

impl FtdiDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self, link: &UsbLink, request: u8, value: u16, index: u16) -> SerialResult<()> {
        link.control_out(REQTYPE_OUT, request, value, index, &[])
    }

    /// Full chip reset.
    pub fn reset(&mut self, link: &UsbLink) -> SerialResult<()> {
        self.command(link, RESET_REQUEST, RESET_ALL, self.port_index)
    }

    fn modem_status(&self, link: &UsbLink) -> SerialResult<u8> {
        let data = link.control_in(REQTYPE_IN, GET_MODEM_STATUS_REQUEST, 0, self.port_index, 2)?;
        Ok(data[0])
    }

    fn set_baud_rate(&self, link: &UsbLink, baud_rate: u32) -> SerialResult<()> {
        let baud = encode_baud(baud_rate)?;
        let index = if baud.index != 0 {
            baud.index
        } else {
            self.port_index
        };
        debug!(
            "Setting baud rate {} (effective {}, value=0x{:04x})",
            baud_rate, baud.effective, baud.value
        );
        self.command(link, SET_BAUD_RATE_REQUEST, baud.value, index)
    }
}

impl ChipProtocol for FtdiDriver {
    fn kind(&self) -> ChipKind {
        ChipKind::Ftdi
    }

    fn set_interfaces(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
        port_number: u8,
    ) -> SerialResult<PortEndpoints> {
        let interface = claim_interface_at(link, device, usize::from(port_number))?;
        self.port_index = u16::from(port_number) + 1;
        Ok(PortEndpoints {
            read: endpoint_at(interface, 0)?,
            write: endpoint_at(interface, 1)?,
            status: None,
        })
    }

    fn set_parameters(
        &mut self,
        link: &UsbLink,
        params: &SerialPortParameters,
    ) -> SerialResult<()> {
        let config = encode_data_config(params)?;
        self.set_baud_rate(link, params.baud_rate)?;
        self.command(link, SET_DATA_REQUEST, config, self.port_index)
    }

    fn dtr(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(self.dtr)
    }

    fn set_dtr(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        let word = if value {
            MODEM_CONTROL_DTR_ENABLE
        } else {
            MODEM_CONTROL_DTR_DISABLE
        };
        self.command(link, MODEM_CONTROL_REQUEST, word, self.port_index)?;
        self.dtr = value;
        Ok(())
    }

    fn rts(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(self.rts)
    }

    fn set_rts(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        let word = if value {
            MODEM_CONTROL_RTS_ENABLE
        } else {
            MODEM_CONTROL_RTS_DISABLE
        };
        self.command(link, MODEM_CONTROL_REQUEST, word, self.port_index)?;
        self.rts = value;
        Ok(())
    }

    fn cts(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.modem_status(link)? & MODEM_STATUS_CTS != 0)
    }

    fn dsr(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.modem_status(link)? & MODEM_STATUS_DSR != 0)
    }

    fn cd(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.modem_status(link)? & MODEM_STATUS_CD != 0)
    }

    fn ri(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.modem_status(link)? & MODEM_STATUS_RI != 0)
    }

    fn purge_hw_buffers(&mut self, link: &UsbLink, rx: bool, tx: bool) -> SerialResult<()> {
        if rx {
            self.command(link, RESET_REQUEST, RESET_PURGE_RX, self.port_index)?;
        }
        if tx {
            self.command(link, RESET_REQUEST, RESET_PURGE_TX, self.port_index)?;
        }
        Ok(())
    }

    fn filter_read(
        &self,
        raw: &[u8],
        max_packet_size: usize,
        dest: &mut [u8],
    ) -> SerialResult<usize> {
        strip_status_headers(raw, max_packet_size, dest)
    }
}
