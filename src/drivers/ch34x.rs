//! WCH CH340/CH341 driver.
//!
//! The chip needs a fixed vendor handshake before it accepts line settings,
//! only knows a handful of baud rates, and takes its modem control bits
//! active-low.

use super::{bulk_pair, ChipKind, ChipProtocol, PortEndpoints, UsbLink};
use crate::error::{SerialError, SerialResult};
use crate::params::{DataBits, Parity, SerialPortParameters, StopBits};
use crate::usb::UsbDeviceInfo;
use tracing::debug;

const VENDOR_OUT: u8 = 0x40;
const VENDOR_IN: u8 = 0xc0;

const REQ_READ_VERSION: u8 = 0x5f;
const REQ_READ_REGISTER: u8 = 0x95;
const REQ_WRITE_REGISTER: u8 = 0x9a;
const REQ_SERIAL_INIT: u8 = 0xa1;
const REQ_MODEM_CONTROL: u8 = 0xa4;

const REG_LCR: u16 = 0x2518;
const REG_BAUD_FACTOR: u16 = 0x1312;
const REG_BAUD_OFFSET: u16 = 0x0f2c;
const REG_STATUS: u16 = 0x0706;

const DEFAULT_BAUD_RATE: u32 = 9600;

const SCL_DTR: u16 = 0x20;
const SCL_RTS: u16 = 0x40;

const LCR_ENABLE_RX: u8 = 0x80;
const LCR_ENABLE_TX: u8 = 0x40;
const LCR_MARK_SPACE: u8 = 0x20;
const LCR_PAR_EVEN: u8 = 0x10;
const LCR_ENABLE_PAR: u8 = 0x08;
const LCR_STOP_BITS_2: u8 = 0x04;
const LCR_CS8: u8 = 0x03;
const LCR_CS7: u8 = 0x02;
const LCR_CS6: u8 = 0x01;
const LCR_CS5: u8 = 0x00;

/// Supported rates with their (factor, offset) register values.
pub const BAUD_TABLE: [(u32, u16, u16); 6] = [
    (2400, 0xd901, 0x0038),
    (4800, 0x6402, 0x001f),
    (9600, 0xb202, 0x0013),
    (19200, 0xd902, 0x000d),
    (38400, 0x6403, 0x000a),
    (115200, 0xcc03, 0x0008),
];

/// Register values for `baud_rate`, or `UnsupportedBaudRate`.
pub fn baud_registers(baud_rate: u32) -> SerialResult<(u16, u16)> {
    BAUD_TABLE
        .iter()
        .find(|(rate, _, _)| *rate == baud_rate)
        .map(|&(_, factor, offset)| (factor, offset))
        .ok_or(SerialError::UnsupportedBaudRate(baud_rate))
}

/// Pack data bits, parity and stop bits into the line control register.
pub fn encode_lcr(params: &SerialPortParameters) -> SerialResult<u8> {
    let mut lcr = LCR_ENABLE_RX | LCR_ENABLE_TX;
    lcr |= match params.data_bits {
        DataBits::Five => LCR_CS5,
        DataBits::Six => LCR_CS6,
        DataBits::Seven => LCR_CS7,
        DataBits::Eight => LCR_CS8,
    };
    lcr |= match params.parity {
        Parity::None => 0,
        Parity::Odd => LCR_ENABLE_PAR,
        Parity::Even => LCR_ENABLE_PAR | LCR_PAR_EVEN,
        Parity::Mark => LCR_ENABLE_PAR | LCR_MARK_SPACE,
        Parity::Space => LCR_ENABLE_PAR | LCR_MARK_SPACE | LCR_PAR_EVEN,
    };
    lcr |= match params.stop_bits {
        StopBits::One | StopBits::NotSet => 0,
        StopBits::Two => LCR_STOP_BITS_2,
        StopBits::OnePointFive => {
            return Err(SerialError::unsupported("CH34x does not support 1.5 stop bits"))
        }
    };
    Ok(lcr)
}

/// Modem control value; the chip wants the bits inverted.
pub fn modem_control_value(dtr: bool, rts: bool) -> u16 {
    let bits = (if dtr { SCL_DTR } else { 0 }) | (if rts { SCL_RTS } else { 0 });
    !bits
}

#[derive(Debug, Default)]
pub struct Ch34xDriver {
    dtr: bool,
    rts: bool,
}

impl Ch34xDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn control_out(&self, link: &UsbLink, request: u8, value: u16, index: u16) -> SerialResult<()> {
        link.control_out(VENDOR_OUT, request, value, index, &[])
    }

    /// Read `expected.len()` bytes and compare; `None` matches anything.
    fn check_state(
        &self,
        link: &UsbLink,
        step: &str,
        request: u8,
        value: u16,
        expected: &[Option<u8>],
    ) -> SerialResult<()> {
        let reply = link
            .control_in(VENDOR_IN, request, value, 0, expected.len())
            .map_err(|e| SerialError::io(format!("{step}: {e}")))?;
        for (i, (want, got)) in expected.iter().zip(&reply).enumerate() {
            if let Some(want) = want {
                if want != got {
                    return Err(SerialError::io(format!(
                        "{step}: byte {i} expected 0x{want:02x}, got 0x{got:02x}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn set_baud_rate(&self, link: &UsbLink, baud_rate: u32) -> SerialResult<()> {
        let (factor, offset) = baud_registers(baud_rate)?;
        self.control_out(link, REQ_WRITE_REGISTER, REG_BAUD_FACTOR, factor)?;
        self.control_out(link, REQ_WRITE_REGISTER, REG_BAUD_OFFSET, offset)
    }

    fn set_control_lines(&self, link: &UsbLink, dtr: bool, rts: bool) -> SerialResult<()> {
        self.control_out(
            link,
            REQ_MODEM_CONTROL,
            modem_control_value(dtr, rts),
            0,
        )
    }

    fn initialize(&self, link: &UsbLink) -> SerialResult<()> {
        debug!("Running CH34x init handshake");
        self.check_state(link, "init #1", REQ_READ_VERSION, 0, &[None, Some(0x00)])?;
        self.control_out(link, REQ_SERIAL_INIT, 0, 0)?;
        self.set_baud_rate(link, DEFAULT_BAUD_RATE)?;
        self.check_state(link, "init #4", REQ_READ_REGISTER, REG_LCR, &[None, Some(0x00)])?;
        self.control_out(link, REQ_WRITE_REGISTER, REG_LCR, 0x0050)?;
        self.check_state(link, "init #6", REQ_READ_REGISTER, REG_STATUS, &[None, None])?;
        self.control_out(link, REQ_SERIAL_INIT, 0x501f, 0xd90a)?;
        self.set_baud_rate(link, DEFAULT_BAUD_RATE)?;
        self.set_control_lines(link, self.dtr, self.rts)?;
        self.check_state(link, "init #10", REQ_READ_REGISTER, REG_STATUS, &[None, Some(0xee)])
    }
}

impl ChipProtocol for Ch34xDriver {
    fn kind(&self) -> ChipKind {
        ChipKind::Ch34x
    }

    fn set_interfaces(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
        _port_number: u8,
    ) -> SerialResult<PortEndpoints> {
        for interface in &device.interfaces {
            link.claim(interface)?;
        }
        let data = device
            .interfaces
            .last()
            .ok_or_else(|| SerialError::endpoints("device has no interfaces"))?;
        let (read, write) = bulk_pair(data)?;
        self.initialize(link)?;
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
        let lcr = encode_lcr(params)?;
        self.set_baud_rate(link, params.baud_rate)?;
        self.control_out(link, REQ_WRITE_REGISTER, REG_LCR, u16::from(lcr))
    }

    fn dtr(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(self.dtr)
    }

    fn set_dtr(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        self.set_control_lines(link, value, self.rts)?;
        self.dtr = value;
        Ok(())
    }

    fn rts(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(self.rts)
    }

    fn set_rts(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        self.set_control_lines(link, self.dtr, value)?;
        self.rts = value;
        Ok(())
    }

    fn cts(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(false)
    }

    fn dsr(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(false)
    }

    fn cd(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(false)
    }

    fn ri(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(false)
    }
}
