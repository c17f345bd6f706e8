//! STM32 virtual COM port.
//!
//! Speaks CDC line coding, but the control and data interfaces are located
//! by class and requests target the control interface's position.

use super::cdc_acm::{
    control_line_state, encode_line_coding, ACM_REQUEST_TYPE, SET_CONTROL_LINE_STATE,
    SET_LINE_CODING,
};
use super::{claim_interface_where, endpoint_at, ChipKind, ChipProtocol, PortEndpoints, UsbLink};
use crate::error::{SerialError, SerialResult};
use crate::params::SerialPortParameters;
use crate::usb::{UsbDeviceInfo, USB_CLASS_CDC_DATA, USB_CLASS_COMM};
use tracing::debug;

#[derive(Debug, Default)]
pub struct Stm32Driver {
    control_index: u16,
    dtr: bool,
    rts: bool,
}

impl Stm32Driver {
    pub fn new() -> Self {
        Self::default()
    }

    fn send_acm(&self, link: &UsbLink, request: u8, value: u16, data: &[u8]) -> SerialResult<()> {
        link.control_out(ACM_REQUEST_TYPE, request, value, self.control_index, data)
    }

    fn send_control_lines(&self, link: &UsbLink, dtr: bool, rts: bool) -> SerialResult<()> {
        self.send_acm(
            link,
            SET_CONTROL_LINE_STATE,
            control_line_state(dtr, rts),
            &[],
        )
    }
}

impl ChipProtocol for Stm32Driver {
    fn kind(&self) -> ChipKind {
        ChipKind::Stm32
    }

    fn set_interfaces(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
        _port_number: u8,
    ) -> SerialResult<PortEndpoints> {
        let (control_index, _) = claim_interface_where(link, device, |i| i.class == USB_CLASS_COMM)?
            .ok_or_else(|| SerialError::endpoints("no communications class interface"))?;
        let (_, data) = claim_interface_where(link, device, |i| i.class == USB_CLASS_CDC_DATA)?
            .ok_or_else(|| SerialError::endpoints("no CDC data interface"))?;

        self.control_index = u16::try_from(control_index)
            .map_err(|_| SerialError::endpoints("control interface index out of range"))?;
        debug!("Control interface at index {}", self.control_index);

        Ok(PortEndpoints {
            read: endpoint_at(data, 1)?,
            write: endpoint_at(data, 0)?,
            status: None,
        })
    }

    fn set_parameters(
        &mut self,
        link: &UsbLink,
        params: &SerialPortParameters,
    ) -> SerialResult<()> {
        let coding = encode_line_coding(params)?;
        self.send_acm(link, SET_LINE_CODING, 0, &coding)
    }

    fn dtr(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(self.dtr)
    }

    fn set_dtr(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        self.send_control_lines(link, value, self.rts)?;
        self.dtr = value;
        Ok(())
    }

    fn rts(&mut self, _link: &UsbLink) -> SerialResult<bool> {
        Ok(self.rts)
    }

    fn set_rts(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        self.send_control_lines(link, self.dtr, value)?;
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
