//! Chip protocol drivers.
//!
//! Each bridge family translates [`SerialPortParameters`] and control-line
//! requests into its own vendor or class control transfers. Drivers are
//! plain state machines; the port engine owns the connection and hands a
//! [`UsbLink`] to every call.
//!
//! [`ChipDriver`] is the closed set of families. It implements
//! [`ChipProtocol`] by dispatching to the concrete driver, so adding a family
//! means adding a variant and the compiler points at every match to update.

pub mod cdc_acm;
pub mod ch34x;
pub mod cp21xx;
pub mod ftdi;
pub mod prolific;
pub mod stm32;

pub use cdc_acm::CdcAcmDriver;
pub use ch34x::Ch34xDriver;
pub use cp21xx::Cp21xxDriver;
pub use ftdi::FtdiDriver;
pub use prolific::{ProlificDriver, ProlificType};
pub use stm32::Stm32Driver;

use crate::error::{SerialError, SerialResult, UsbTransferError};
use crate::params::SerialPortParameters;
use crate::usb::ids::*;
use crate::usb::{ControlRequest, UsbConnection, UsbDeviceInfo, UsbEndpoint, UsbInterface};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Timeout for configuration control transfers.
pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Control transfers against one open device.
///
/// Every helper checks the transferred length; anything other than the
/// requested length is an I/O error. Nothing is retried.
#[derive(Clone)]
pub struct UsbLink {
    connection: Arc<dyn UsbConnection>,
    timeout: Duration,
}

impl UsbLink {
    pub fn new(connection: Arc<dyn UsbConnection>) -> Self {
        Self {
            connection,
            timeout: CONTROL_TIMEOUT,
        }
    }

    pub fn connection(&self) -> &Arc<dyn UsbConnection> {
        &self.connection
    }

    /// Send `data` with an OUT control request.
    pub fn control_out(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> SerialResult<()> {
        let setup = ControlRequest::new(request_type, request, value, index);
        let mut payload = data.to_vec();
        let sent = self
            .connection
            .control_transfer(setup, &mut payload, self.timeout)
            .map_err(|e| SerialError::transfer(setup.to_string(), e))?;
        if sent != data.len() {
            return Err(SerialError::io(format!(
                "{setup}: sent {sent} of {} bytes",
                data.len()
            )));
        }
        Ok(())
    }

    /// Read exactly `length` bytes with an IN control request.
    pub fn control_in(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    ) -> SerialResult<Vec<u8>> {
        let setup = ControlRequest::new(request_type, request, value, index);
        let mut buffer = vec![0u8; length];
        let received = self
            .connection
            .control_transfer(setup, &mut buffer, self.timeout)
            .map_err(|e| SerialError::transfer(setup.to_string(), e))?;
        if received != length {
            return Err(SerialError::io(format!(
                "{setup}: expected {length} bytes, got {received}"
            )));
        }
        Ok(buffer)
    }

    pub fn bulk_transfer(
        &self,
        endpoint: &UsbEndpoint,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbTransferError> {
        self.connection.bulk_transfer(endpoint, data, timeout)
    }

    /// Claim `interface` or fail with [`SerialError::UsbClaim`].
    pub fn claim(&self, interface: &UsbInterface) -> SerialResult<()> {
        if self.connection.claim_interface(interface, true) {
            debug!("Claimed interface {}", interface.id);
            Ok(())
        } else {
            Err(SerialError::UsbClaim(interface.id))
        }
    }

    pub fn raw_descriptors(&self) -> Option<Vec<u8>> {
        self.connection.raw_descriptors()
    }

    pub fn close(&self) {
        self.connection.close();
    }
}

impl fmt::Debug for UsbLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbLink")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Endpoints selected by a driver during interface setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortEndpoints {
    pub read: UsbEndpoint,
    pub write: UsbEndpoint,
    /// Interrupt or control endpoint used for status, when the chip has one.
    pub status: Option<UsbEndpoint>,
}

/// Interface `index` of `device`, claimed.
pub(crate) fn claim_interface_at<'a>(
    link: &UsbLink,
    device: &'a UsbDeviceInfo,
    index: usize,
) -> SerialResult<&'a UsbInterface> {
    let interface = device.interface(index).ok_or_else(|| {
        SerialError::endpoints(format!(
            "device has {} interfaces, need index {index}",
            device.interfaces.len()
        ))
    })?;
    link.claim(interface)?;
    Ok(interface)
}

/// First interface matching `filter`, claimed, with its position.
pub(crate) fn claim_interface_where<'a>(
    link: &UsbLink,
    device: &'a UsbDeviceInfo,
    filter: impl Fn(&UsbInterface) -> bool,
) -> SerialResult<Option<(usize, &'a UsbInterface)>> {
    match device.interfaces.iter().enumerate().find(|(_, i)| filter(i)) {
        Some((index, interface)) => {
            link.claim(interface)?;
            Ok(Some((index, interface)))
        }
        None => Ok(None),
    }
}

/// Bulk IN/OUT endpoints of `interface`; the last of each direction wins.
pub(crate) fn bulk_pair(interface: &UsbInterface) -> SerialResult<(UsbEndpoint, UsbEndpoint)> {
    use crate::usb::{Direction, TransferType};

    let mut read = None;
    let mut write = None;
    for ep in interface
        .endpoints
        .iter()
        .filter(|ep| ep.transfer_type == TransferType::Bulk)
    {
        match ep.direction() {
            Direction::In => read = Some(*ep),
            Direction::Out => write = Some(*ep),
        }
    }
    match (read, write) {
        (Some(read), Some(write)) => Ok((read, write)),
        _ => Err(SerialError::endpoints(format!(
            "interface {} lacks a bulk in/out pair",
            interface.id
        ))),
    }
}

pub(crate) fn endpoint_at(interface: &UsbInterface, index: usize) -> SerialResult<UsbEndpoint> {
    interface.endpoint(index).copied().ok_or_else(|| {
        SerialError::endpoints(format!(
            "interface {} has no endpoint {index}",
            interface.id
        ))
    })
}

/// Operations every chip family provides.
///
/// `set_interfaces` runs once per open, after the connection is acquired and
/// before `set_parameters`. Control-line getters either return cached state
/// or query the chip, depending on what the hardware can report.
pub trait ChipProtocol {
    fn kind(&self) -> ChipKind;

    /// Discover and claim the chip's interfaces and return its endpoints.
    fn set_interfaces(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
        port_number: u8,
    ) -> SerialResult<PortEndpoints>;

    /// Encode and send line parameters.
    fn set_parameters(&mut self, link: &UsbLink, params: &SerialPortParameters)
        -> SerialResult<()>;

    fn dtr(&mut self, link: &UsbLink) -> SerialResult<bool>;
    fn set_dtr(&mut self, link: &UsbLink, value: bool) -> SerialResult<()>;
    fn rts(&mut self, link: &UsbLink) -> SerialResult<bool>;
    fn set_rts(&mut self, link: &UsbLink, value: bool) -> SerialResult<()>;
    fn cts(&mut self, link: &UsbLink) -> SerialResult<bool>;
    fn dsr(&mut self, link: &UsbLink) -> SerialResult<bool>;
    fn cd(&mut self, link: &UsbLink) -> SerialResult<bool>;
    fn ri(&mut self, link: &UsbLink) -> SerialResult<bool>;

    /// Discard data held in the chip's FIFOs.
    fn purge_hw_buffers(&mut self, _link: &UsbLink, _rx: bool, _tx: bool) -> SerialResult<()> {
        Ok(())
    }

    /// Copy payload out of a raw bulk-in transfer into `dest`.
    ///
    /// `max_packet_size` is that of the read endpoint. The default copies
    /// everything that fits.
    fn filter_read(
        &self,
        raw: &[u8],
        _max_packet_size: usize,
        dest: &mut [u8],
    ) -> SerialResult<usize> {
        let n = raw.len().min(dest.len());
        dest[..n].copy_from_slice(&raw[..n]);
        Ok(n)
    }
}

/// Supported chip families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipKind {
    CdcAcm,
    Ch34x,
    Cp21xx,
    Ftdi,
    Prolific,
    Stm32,
}

impl ChipKind {
    pub const ALL: [ChipKind; 6] = [
        ChipKind::CdcAcm,
        ChipKind::Ch34x,
        ChipKind::Cp21xx,
        ChipKind::Ftdi,
        ChipKind::Prolific,
        ChipKind::Stm32,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChipKind::CdcAcm => "CDC-ACM",
            ChipKind::Ch34x => "CH34x",
            ChipKind::Cp21xx => "CP21xx",
            ChipKind::Ftdi => "FTDI",
            ChipKind::Prolific => "Prolific",
            ChipKind::Stm32 => "STM32",
        }
    }

    /// Constructor for this family's driver.
    pub fn factory(self) -> DriverFactory {
        fn cdc_acm() -> ChipDriver {
            ChipDriver::CdcAcm(CdcAcmDriver::new())
        }
        fn ch34x() -> ChipDriver {
            ChipDriver::Ch34x(Ch34xDriver::new())
        }
        fn cp21xx() -> ChipDriver {
            ChipDriver::Cp21xx(Cp21xxDriver::new())
        }
        fn ftdi() -> ChipDriver {
            ChipDriver::Ftdi(FtdiDriver::new())
        }
        fn prolific() -> ChipDriver {
            ChipDriver::Prolific(ProlificDriver::new())
        }
        fn stm32() -> ChipDriver {
            ChipDriver::Stm32(Stm32Driver::new())
        }

        match self {
            ChipKind::CdcAcm => cdc_acm as DriverFactory,
            ChipKind::Ch34x => ch34x,
            ChipKind::Cp21xx => cp21xx,
            ChipKind::Ftdi => ftdi,
            ChipKind::Prolific => prolific,
            ChipKind::Stm32 => stm32,
        }
    }
}

impl fmt::Display for ChipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds a fresh driver instance for one port.
pub type DriverFactory = fn() -> ChipDriver;

/// A chip driver of any supported family.
#[derive(Debug)]
pub enum ChipDriver {
    CdcAcm(CdcAcmDriver),
    Ch34x(Ch34xDriver),
    Cp21xx(Cp21xxDriver),
    Ftdi(FtdiDriver),
    Prolific(ProlificDriver),
    Stm32(Stm32Driver),
}

macro_rules! dispatch {
    ($self:expr, $driver:ident => $body:expr) => {
        match $self {
            ChipDriver::CdcAcm($driver) => $body,
            ChipDriver::Ch34x($driver) => $body,
            ChipDriver::Cp21xx($driver) => $body,
            ChipDriver::Ftdi($driver) => $body,
            ChipDriver::Prolific($driver) => $body,
            ChipDriver::Stm32($driver) => $body,
        }
    };
}

impl ChipProtocol for ChipDriver {
    fn kind(&self) -> ChipKind {
        dispatch!(self, d => d.kind())
    }

    fn set_interfaces(
        &mut self,
        link: &UsbLink,
        device: &UsbDeviceInfo,
        port_number: u8,
    ) -> SerialResult<PortEndpoints> {
        dispatch!(self, d => d.set_interfaces(link, device, port_number))
    }

    fn set_parameters(
        &mut self,
        link: &UsbLink,
        params: &SerialPortParameters,
    ) -> SerialResult<()> {
        dispatch!(self, d => d.set_parameters(link, params))
    }

    fn dtr(&mut self, link: &UsbLink) -> SerialResult<bool> {
        dispatch!(self, d => d.dtr(link))
    }

    fn set_dtr(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        dispatch!(self, d => d.set_dtr(link, value))
    }

    fn rts(&mut self, link: &UsbLink) -> SerialResult<bool> {
        dispatch!(self, d => d.rts(link))
    }

    fn set_rts(&mut self, link: &UsbLink, value: bool) -> SerialResult<()> {
        dispatch!(self, d => d.set_rts(link, value))
    }

    fn cts(&mut self, link: &UsbLink) -> SerialResult<bool> {
        dispatch!(self, d => d.cts(link))
    }

    fn dsr(&mut self, link: &UsbLink) -> SerialResult<bool> {
        dispatch!(self, d => d.dsr(link))
    }

    fn cd(&mut self, link: &UsbLink) -> SerialResult<bool> {
        dispatch!(self, d => d.cd(link))
    }

    fn ri(&mut self, link: &UsbLink) -> SerialResult<bool> {
        dispatch!(self, d => d.ri(link))
    }

    fn purge_hw_buffers(&mut self, link: &UsbLink, rx: bool, tx: bool) -> SerialResult<()> {
        dispatch!(self, d => d.purge_hw_buffers(link, rx, tx))
    }

    fn filter_read(
        &self,
        raw: &[u8],
        max_packet_size: usize,
        dest: &mut [u8],
    ) -> SerialResult<usize> {
        dispatch!(self, d => d.filter_read(raw, max_packet_size, dest))
    }
}

/// A vendor id with the product ids one family handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDeclaration {
    pub vendor_id: u16,
    pub product_ids: Vec<u16>,
    pub chip: ChipKind,
}

impl DriverDeclaration {
    pub fn new(vendor_id: u16, product_ids: &[u16], chip: ChipKind) -> Self {
        Self {
            vendor_id,
            product_ids: product_ids.to_vec(),
            chip,
        }
    }
}

/// The built-in vendor/product table.
pub fn builtin_declarations() -> Vec<DriverDeclaration> {
    vec![
        DriverDeclaration::new(
            VENDOR_ARDUINO,
            &[
                ARDUINO_UNO,
                ARDUINO_UNO_R3,
                ARDUINO_MEGA_2560,
                ARDUINO_MEGA_2560_R3,
                ARDUINO_SERIAL_ADAPTER,
                ARDUINO_MEGA_ADK_R3,
                ARDUINO_MEGA_ADK,
                ARDUINO_LEONARDO,
                ARDUINO_MICRO,
            ],
            ChipKind::CdcAcm,
        ),
        DriverDeclaration::new(
            VENDOR_VAN_OOIJEN_TECH,
            &[VAN_OOIJEN_TECH_TEENSYDUINO_SERIAL],
            ChipKind::CdcAcm,
        ),
        DriverDeclaration::new(VENDOR_ATMEL, &[ATMEL_LUFA_CDC_DEMO_APP], ChipKind::CdcAcm),
        DriverDeclaration::new(
            VENDOR_ELATEC,
            &[ELATEC_TWN3_CDC, ELATEC_TWN4_MIFARE_NFC, ELATEC_TWN4_CDC],
            ChipKind::CdcAcm,
        ),
        DriverDeclaration::new(VENDOR_LEAFLABS, &[LEAFLABS_MAPLE], ChipKind::CdcAcm),
        DriverDeclaration::new(VENDOR_QINHENG, &[QINHENG_HL340], ChipKind::Ch34x),
        DriverDeclaration::new(
            VENDOR_SILABS,
            &[SILABS_CP2102, SILABS_CP2105, SILABS_CP2108, SILABS_CP2110],
            ChipKind::Cp21xx,
        ),
        DriverDeclaration::new(
            VENDOR_FTDI,
            &[FTDI_FT232R, FTDI_FT232H, FTDI_FT2232H, FTDI_FT4232H, FTDI_FT231X],
            ChipKind::Ftdi,
        ),
        DriverDeclaration::new(
            VENDOR_PROLIFIC,
            &[
                PROLIFIC_PL2303,
                PROLIFIC_PL2303GC,
                PROLIFIC_PL2303GB,
                PROLIFIC_PL2303GT,
                PROLIFIC_PL2303GL,
                PROLIFIC_PL2303GE,
                PROLIFIC_PL2303GS,
            ],
            ChipKind::Prolific,
        ),
        DriverDeclaration::new(VENDOR_STM, &[STM_STLINK_V2_1, STM_VCOM], ChipKind::Stm32),
    ]
}

/// Little-endian bytes of a baud rate, as CDC line coding and CP21xx expect.
pub(crate) fn baud_le(baud_rate: u32) -> [u8; 4] {
    baud_rate.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_matching_kind() {
        for kind in ChipKind::ALL {
            assert_eq!(kind.factory()().kind(), kind);
        }
    }

    #[test]
    fn test_builtin_table_has_no_duplicate_identities() {
        let mut seen = std::collections::HashSet::new();
        for decl in builtin_declarations() {
            for pid in decl.product_ids {
                assert!(seen.insert((decl.vendor_id, pid)), "{:04x}:{pid:04x}", decl.vendor_id);
            }
        }
        assert!(seen.contains(&(VENDOR_FTDI, FTDI_FT232R)));
        assert!(seen.contains(&(VENDOR_STM, STM_VCOM)));
    }

    #[test]
    fn test_chip_kind_serde_names() {
        let decl: DriverDeclaration = toml::from_str(
            r#"
            vendor_id = 0x1234
            product_ids = [1, 2]
            chip = "cdc_acm"
            "#,
        )
        .unwrap();
        assert_eq!(decl.chip, ChipKind::CdcAcm);
        assert_eq!(decl.product_ids, vec![1, 2]);
    }

    #[test]
    fn test_default_filter_read_copies() {
        let driver = ChipKind::CdcAcm.factory()();
        let mut dest = [0u8; 4];
        assert_eq!(driver.filter_read(b"abcdef", 64, &mut dest).unwrap(), 4);
        assert_eq!(&dest, b"abcd");
    }
}
