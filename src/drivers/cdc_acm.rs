//! CDC-ACM class driver (Arduino, Teensy, Atmel LUFA, Elatec, LeafLabs).

use super::{
    baud_le, claim_interface_at, endpoint_at, ChipKind, ChipProtocol, PortEndpoints, UsbLink,
};
use crate::error::{SerialError, SerialResult};
use crate::params::{Parity, SerialPortParameters, StopBits};
use crate::usb::{Direction, TransferType, UsbDeviceInfo, UsbEndpoint};
use tracing::debug;

/// Class request, host to device, interface recipient.
pub(crate) const ACM_REQUEST_TYPE: u8 = 0x21;
pub(crate) const SET_LINE_CODING: u8 = 0x20;
pub(crate) const SET_CONTROL_LINE_STATE: u8 = 0x22;

/// Encode the 7-byte CDC line coding structure.
///
/// Layout: `[dwDTERate LE32][bCharFormat][bParityType][bDataBits]`.
pub fn encode_line_coding(params: &SerialPortParameters) -> SerialResult<[u8; 7]> {
    let stop_bits = match params.stop_bits {
        StopBits::One => 0,
        StopBits::OnePointFive => 1,
        StopBits::Two => 2,
        StopBits::NotSet => {
            return Err(SerialError::unsupported("stop bits must be set for line coding"))
        }
    };
    let parity = match params.parity {
        Parity::None => 0,
        Parity::Odd => 1,
        Parity::Even => 2,
        Parity::Mark => 3,
        Parity::Space => 4,
    };
    let [b0, b1, b2, b3] = baud_le(params.baud_rate);
    Ok([b0, b1, b2, b3, stop_bits, parity, params.data_bits.bits()])
}

/// `SET_CONTROL_LINE_STATE` value: bit 0 DTR, bit 1 RTS.
pub fn control_line_state(dtr: bool, rts: bool) -> u16 {
    (if rts { 0x02 } else { 0 }) | (if dtr { 0x01 } else { 0 })
}

#[derive(Debug, Default)]
pub struct CdcAcmDriver {
    control_endpoint: Option<UsbEndpoint>,
    dtr: bool,
    rts: bool,
}

impl CdcAcmDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn send_control_lines(&self, link: &UsbLink, dtr: bool, rts: bool) -> SerialResult<()> {
        link.control_out(
            ACM_REQUEST_TYPE,
            SET_CONTROL_LINE_STATE,
            control_line_state(dtr, rts),
            0,
            &[],
        )
    }

    fn open_single_interface(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
    ) -> SerialResult<PortEndpoints> {
        let interface = claim_interface_at(link, device, 0)?;
        debug!("Control and data interface {}", interface.id);

        let count = interface.endpoints.len();
        if count < 3 {
            return Err(SerialError::endpoints(format!(
                "need 3 endpoints on a single-interface device, found {count}"
            )));
        }

        let mut control = None;
        let mut read = None;
        let mut write = None;
        for ep in &interface.endpoints {
            match (ep.direction(), ep.transfer_type) {
                (Direction::In, TransferType::Interrupt) => control = Some(*ep),
                (Direction::In, TransferType::Bulk) => read = Some(*ep),
                (Direction::Out, TransferType::Bulk) => write = Some(*ep),
                _ => {}
            }
        }

        match (control, read, write) {
            (Some(control), Some(read), Some(write)) => {
                debug!("Found all required endpoints");
                self.control_endpoint = Some(control);
                Ok(PortEndpoints {
                    read,
                    write,
                    status: Some(control),
                })
            }
            _ => Err(SerialError::endpoints(
                "could not find interrupt-in, bulk-in and bulk-out endpoints",
            )),
        }
    }

    fn open_interfaces(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
    ) -> SerialResult<PortEndpoints> {
        debug!("Claiming interfaces, count={}", device.interfaces.len());
        let control_interface = claim_interface_at(link, device, 0)?;
        let control = endpoint_at(control_interface, 0)?;
        let data_interface = claim_interface_at(link, device, 1)?;
        let read = endpoint_at(data_interface, 1)?;
        let write = endpoint_at(data_interface, 0)?;
        debug!(
            "Control iface={} data iface={} read=0x{:02x} write=0x{:02x}",
            control_interface.id, data_interface.id, read.address, write.address
        );
        self.control_endpoint = Some(control);
        Ok(PortEndpoints {
            read,
            write,
            status: Some(control),
        })
    }
}

impl ChipProtocol for CdcAcmDriver {
    fn kind(&self) -> ChipKind {
        ChipKind::CdcAcm
    }

    fn set_interfaces(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
        _port_number: u8,
    ) -> SerialResult<PortEndpoints> {
        if device.interfaces.len() == 1 {
            self.open_single_interface(link, device)
        } else {
            self.open_interfaces(link, device)
        }
    }

    fn set_parameters(
        &mut self,
        link: &UsbLink,
        params: &SerialPortParameters,
    ) -> SerialResult<()> {
        let coding = encode_line_coding(params)?;
        link.control_out(ACM_REQUEST_TYPE, SET_LINE_CODING, 0, 0, &coding)
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

    // The class driver never reads hardware status; these always report low.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UsbTransferError;
    use crate::params::DataBits;
    use crate::usb::mock::MockConnection;
    use crate::usb::{UsbInterface, USB_CLASS_CDC_DATA, USB_CLASS_COMM};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn link(conn: &MockConnection) -> UsbLink {
        UsbLink::new(Arc::new(conn.clone()))
    }

    fn device(interfaces: Vec<UsbInterface>) -> UsbDeviceInfo {
        UsbDeviceInfo {
            name: "acm".into(),
            vendor_id: 0x2341,
            product_id: 0x0043,
            device_class: USB_CLASS_COMM,
            interfaces,
        }
    }

    #[test]
    fn test_line_coding_9600_8n1() {
        let params = SerialPortParameters::with_baud_rate(9600);
        assert_eq!(
            encode_line_coding(&params).unwrap(),
            [0x80, 0x25, 0, 0, 0, 0, 8]
        );
    }

    #[test]
    fn test_line_coding_variants() {
        let params = SerialPortParameters {
            baud_rate: 115_200,
            data_bits: DataBits::Seven,
            stop_bits: StopBits::Two,
            parity: Parity::Space,
            ..Default::default()
        };
        assert_eq!(
            encode_line_coding(&params).unwrap(),
            [0x00, 0xc2, 0x01, 0x00, 2, 4, 7]
        );

        let params = SerialPortParameters {
            stop_bits: StopBits::NotSet,
            ..Default::default()
        };
        assert!(matches!(
            encode_line_coding(&params),
            Err(SerialError::UnsupportedParameter(_))
        ));
    }

    #[test]
    fn test_single_interface_needs_three_endpoints() {
        let conn = MockConnection::new();
        let dev = device(vec![UsbInterface::new(
            0,
            USB_CLASS_COMM,
            vec![UsbEndpoint::bulk_in(1, 64), UsbEndpoint::bulk_out(2, 64)],
        )]);
        let err = CdcAcmDriver::new()
            .set_interfaces(&link(&conn), &dev, 0)
            .unwrap_err();
        assert!(matches!(err, SerialError::InsufficientEndpoints(_)));
    }

    #[test]
    fn test_single_interface_finds_roles() {
        let conn = MockConnection::new();
        let dev = device(vec![UsbInterface::new(
            0,
            USB_CLASS_COMM,
            vec![
                UsbEndpoint::interrupt_in(3, 8),
                UsbEndpoint::bulk_out(2, 64),
                UsbEndpoint::bulk_in(1, 64),
            ],
        )]);
        let eps = CdcAcmDriver::new()
            .set_interfaces(&link(&conn), &dev, 0)
            .unwrap();
        assert_eq!(eps.read.address, 0x81);
        assert_eq!(eps.write.address, 0x02);
        assert_eq!(eps.status.map(|e| e.address), Some(0x83));
        assert_eq!(conn.claimed_interfaces(), vec![0]);
    }

    #[test]
    fn test_two_interfaces_use_fixed_positions() {
        let conn = MockConnection::new();
        let dev = device(vec![
            UsbInterface::new(0, USB_CLASS_COMM, vec![UsbEndpoint::interrupt_in(1, 8)]),
            UsbInterface::new(
                1,
                USB_CLASS_CDC_DATA,
                vec![UsbEndpoint::bulk_out(2, 64), UsbEndpoint::bulk_in(2, 64)],
            ),
        ]);
        let eps = CdcAcmDriver::new()
            .set_interfaces(&link(&conn), &dev, 0)
            .unwrap();
        assert_eq!(eps.read.address, 0x82);
        assert_eq!(eps.write.address, 0x02);
        assert_eq!(conn.claimed_interfaces(), vec![0, 1]);
    }

    #[test]
    fn test_control_lines_are_cached_and_sent() {
        let conn = MockConnection::new();
        let link = link(&conn);
        let mut driver = CdcAcmDriver::new();
        driver.set_dtr(&link, true).unwrap();
        driver.set_rts(&link, true).unwrap();
        driver.set_dtr(&link, false).unwrap();

        assert!(!driver.dtr(&link).unwrap());
        assert!(driver.rts(&link).unwrap());
        assert!(!driver.cts(&link).unwrap());
        let values: Vec<u16> = conn.control_out_log().iter().map(|r| r.1).collect();
        assert_eq!(values, vec![0x01, 0x03, 0x02]);
    }

    #[test]
    fn test_failed_line_change_keeps_cached_state() {
        let conn = MockConnection::new();
        let link = link(&conn);
        let mut driver = CdcAcmDriver::new();
        driver.set_dtr(&link, true).unwrap();

        conn.fail_control(SET_CONTROL_LINE_STATE, 0x03, UsbTransferError::Stall);
        assert!(driver.set_rts(&link, true).is_err());
        assert!(!driver.rts(&link).unwrap());
        assert!(driver.dtr(&link).unwrap());

        conn.fail_control(SET_CONTROL_LINE_STATE, 0x00, UsbTransferError::Timeout);
        assert!(driver.set_dtr(&link, false).is_err());
        assert!(driver.dtr(&link).unwrap());
    }
}
