//! Silicon Labs CP210x driver.

use super::{baud_le, bulk_pair, ChipKind, ChipProtocol, PortEndpoints, UsbLink};
use crate::error::{SerialError, SerialResult};
use crate::params::{DataBits, Parity, SerialPortParameters, StopBits};
use crate::usb::UsbDeviceInfo;

const REQTYPE_HOST_TO_DEVICE: u8 = 0x41;
const REQTYPE_DEVICE_TO_HOST: u8 = 0xc1;

const IFC_ENABLE: u8 = 0x00;
const SET_BAUDDIV: u8 = 0x01;
const SET_LINE_CTL: u8 = 0x03;
const SET_MHS: u8 = 0x07;
const GET_MDMSTS: u8 = 0x08;
const SET_BAUDRATE: u8 = 0x1e;

const UART_ENABLE: u16 = 0x0001;
const BAUD_RATE_GEN_FREQ: u32 = 0x0038_4000;
const DEFAULT_BAUD_RATE: u32 = 9600;

const MCR_DTR: u16 = 0x0001;
const MCR_RTS: u16 = 0x0002;
const MCR_ALL: u16 = 0x0003;
const CONTROL_WRITE_DTR: u16 = 0x0100;
const CONTROL_WRITE_RTS: u16 = 0x0200;

pub const STATUS_DTR: u8 = 0x01;
pub const STATUS_RTS: u8 = 0x02;
pub const STATUS_CTS: u8 = 0x10;
pub const STATUS_DSR: u8 = 0x20;
pub const STATUS_RI: u8 = 0x40;
pub const STATUS_CD: u8 = 0x80;

/// `SET_LINE_CTL` word: data bits in the high byte, parity in bits 4..7,
/// stop bits in the low nibble.
pub fn encode_line_control(params: &SerialPortParameters) -> u16 {
    let mut word = match params.data_bits {
        DataBits::Five => 0x0500,
        DataBits::Six => 0x0600,
        DataBits::Seven => 0x0700,
        DataBits::Eight => 0x0800,
    };
    word |= match params.parity {
        Parity::None => 0,
        Parity::Odd => 0x0010,
        Parity::Even => 0x0020,
        Parity::Mark => 0x0030,
        Parity::Space => 0x0040,
    };
    // 1.5 stop bits has no encoding on these parts and falls back to one.
    if params.stop_bits == StopBits::Two {
        word |= 0x0002;
    }
    word
}

/// `SET_MHS` value changing only DTR.
pub fn dtr_handshake(value: bool) -> u16 {
    (if value { MCR_DTR } else { 0 }) | CONTROL_WRITE_DTR
}

/// `SET_MHS` value changing only RTS.
pub fn rts_handshake(value: bool) -> u16 {
    (if value { MCR_RTS } else { 0 }) | CONTROL_WRITE_RTS
}

#[derive(Debug, Default)]
pub struct Cp21xxDriver {
    index: u16,
}

impl Cp21xxDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_config(&self, link: &UsbLink, request: u8, value: u16) -> SerialResult<()> {
        link.control_out(REQTYPE_HOST_TO_DEVICE, request, value, self.index, &[])
    }

    fn status(&self, link: &UsbLink) -> SerialResult<u8> {
        let data = link.control_in(REQTYPE_DEVICE_TO_HOST, GET_MDMSTS, 0, self.index, 1)?;
        Ok(data[0])
    }

    fn set_baud_rate(&self, link: &UsbLink, baud_rate: u32) -> SerialResult<()> {
        if baud_rate == 0 {
            return Err(SerialError::UnsupportedBaudRate(baud_rate));
        }
        link.control_out(
            REQTYPE_HOST_TO_DEVICE,
            SET_BAUDRATE,
            0,
            self.index,
            &baud_le(baud_rate),
        )
    }
}

impl ChipProtocol for Cp21xxDriver {
    fn kind(&self) -> ChipKind {
        ChipKind::Cp21xx
    }

    fn set_interfaces(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
        port_number: u8,
    ) -> SerialResult<PortEndpoints> {
        let data = device
            .interfaces
            .last()
            .ok_or_else(|| SerialError::endpoints("device has no interfaces"))?;
        link.claim(data)?;
        let (read, write) = bulk_pair(data)?;
        self.index = u16::from(port_number);

        self.set_config(link, IFC_ENABLE, UART_ENABLE)?;
        self.set_config(
            link,
            SET_MHS,
            MCR_ALL | CONTROL_WRITE_DTR | CONTROL_WRITE_RTS,
        )?;
        let divisor = u16::try_from(BAUD_RATE_GEN_FREQ / DEFAULT_BAUD_RATE)
            .map_err(|_| SerialError::io("baud divisor out of range"))?;
        self.set_config(link, SET_BAUDDIV, divisor)?;

        Ok(PortEndpoints {
            read,
            write,
            status: None,
        })
    }

    fn set_parameters(
        &mut self,
        link: &UsbLink,
        params: &SerialPortParameters,
    ) -> SerialResult<()> {
        self.set_baud_rate(link, params.baud_rate)?;
        self.set_config(link, SET_LINE_CTL, encode_line_control(params))
    }

    fn dtr(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.status(link)? & STATUS_DTR != 0)
    }

    fn set_dtr(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        self.set_config(link, SET_MHS, dtr_handshake(value))
    }

    fn rts(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.status(link)? & STATUS_RTS != 0)
    }

    fn set_rts(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        self.set_config(link, SET_MHS, rts_handshake(value))
    }

    fn cts(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.status(link)? & STATUS_CTS != 0)
    }

    fn dsr(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.status(link)? & STATUS_DSR != 0)
    }

    fn cd(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.status(link)? & STATUS_CD != 0)
    }

    fn ri(&mut self, link: &UsbLink) -> SerialResult<bool> {
        Ok(self.status(link)? & STATUS_RI != 0)
    }
}
