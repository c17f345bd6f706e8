//! Host USB capability primitive.
//!
//! The driver stack never talks to a USB library directly. Everything goes
//! through [`UsbHost`] (device enumeration, permission, opening) and
//! [`UsbConnection`] (control/bulk transfers and interface claims on one
//! open device). Platforms supply real implementations; tests use
//! [`mock::MockUsbHost`].

pub mod ids;
pub mod mock;

use crate::error::UsbTransferError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Communications device class (CDC control interface).
pub const USB_CLASS_COMM: u8 = 0x02;
/// CDC data interface class.
pub const USB_CLASS_CDC_DATA: u8 = 0x0a;

/// Direction bit of `bmRequestType` and endpoint addresses.
pub const USB_DIR_IN: u8 = 0x80;
pub const USB_DIR_OUT: u8 = 0x00;

/// Request type bits of `bmRequestType`.
pub const USB_TYPE_CLASS: u8 = 0x20;
pub const USB_TYPE_VENDOR: u8 = 0x40;

/// Recipient bits of `bmRequestType`.
pub const USB_RECIP_DEVICE: u8 = 0x00;
pub const USB_RECIP_INTERFACE: u8 = 0x01;

/// The setup packet of a control transfer, minus the data stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    pub fn new(request_type: u8, request: u8, value: u16, index: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
        }
    }

    /// True for device-to-host requests.
    pub fn is_in(&self) -> bool {
        self.request_type & USB_DIR_IN != 0
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ctrl(type=0x{:02x}, req=0x{:02x}, value=0x{:04x}, index=0x{:04x})",
            self.request_type, self.request, self.value, self.index
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// Endpoint descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbEndpoint {
    pub address: u8,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
}

impl UsbEndpoint {
    pub fn new(address: u8, transfer_type: TransferType, max_packet_size: u16) -> Self {
        Self {
            address,
            transfer_type,
            max_packet_size,
        }
    }

    pub fn bulk_in(number: u8, max_packet_size: u16) -> Self {
        Self::new(USB_DIR_IN | number, TransferType::Bulk, max_packet_size)
    }

    pub fn bulk_out(number: u8, max_packet_size: u16) -> Self {
        Self::new(number & 0x0f, TransferType::Bulk, max_packet_size)
    }

    pub fn interrupt_in(number: u8, max_packet_size: u16) -> Self {
        Self::new(USB_DIR_IN | number, TransferType::Interrupt, max_packet_size)
    }

    pub fn direction(&self) -> Direction {
        if self.address & USB_DIR_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn number(&self) -> u8 {
        self.address & 0x0f
    }
}

/// Interface descriptor with its endpoints in descriptor order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbInterface {
    pub id: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<UsbEndpoint>,
}

impl UsbInterface {
    pub fn new(id: u8, class: u8, endpoints: Vec<UsbEndpoint>) -> Self {
        Self {
            id,
            class,
            subclass: 0,
            protocol: 0,
            endpoints,
        }
    }

    pub fn endpoint(&self, index: usize) -> Option<&UsbEndpoint> {
        self.endpoints.get(index)
    }

    /// First endpoint with the given address.
    pub fn endpoint_by_address(&self, address: u8) -> Option<&UsbEndpoint> {
        self.endpoints.iter().find(|ep| ep.address == address)
    }
}

/// A connected USB device as reported by the host stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceInfo {
    /// Platform device name, e.g. `/dev/bus/usb/001/004`.
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_class: u8,
    pub interfaces: Vec<UsbInterface>,
}

impl UsbDeviceInfo {
    pub fn interface(&self, index: usize) -> Option<&UsbInterface> {
        self.interfaces.get(index)
    }
}

/// An open handle to one USB device.
///
/// Transfers return the number of bytes moved. Implementations must be safe
/// to call from the monitor thread and the caller's thread at once; the port
/// engine serializes buffer access itself.
pub trait UsbConnection: Send + Sync {
    /// Issue a control transfer. For IN requests `data` receives the reply.
    fn control_transfer(
        &self,
        request: ControlRequest,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbTransferError>;

    /// Issue a bulk (or interrupt) transfer on `endpoint`.
    fn bulk_transfer(
        &self,
        endpoint: &UsbEndpoint,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbTransferError>;

    /// Claim an interface, detaching a kernel driver when `force` is set.
    fn claim_interface(&self, interface: &UsbInterface, force: bool) -> bool;

    /// Raw device descriptor bytes, if the platform exposes them.
    fn raw_descriptors(&self) -> Option<Vec<u8>>;

    /// Release the handle. Further transfers fail with `NoDevice`.
    fn close(&self);
}

/// The platform's USB host stack.
pub trait UsbHost: Send + Sync {
    fn devices(&self) -> Vec<UsbDeviceInfo>;

    /// Ask for access to `device`. Returns true if access is (already) granted.
    fn request_permission(&self, device: &UsbDeviceInfo) -> bool;

    fn open(&self, device: &UsbDeviceInfo) -> Result<Arc<dyn UsbConnection>, UsbTransferError>;
}
