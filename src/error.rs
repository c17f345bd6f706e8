//! Error types shared by the driver stack.
//!
//! `SerialError` is what every public operation returns. Chip drivers never
//! retry internally; a transfer that comes back short or fails is surfaced
//! here and the caller (usually the port monitor) decides what to do.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by the host USB stack for a single transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsbTransferError {
    /// The transfer did not complete within its timeout.
    #[error("transfer timed out")]
    Timeout,

    /// The device was unplugged or the connection handle is gone.
    #[error("device is no longer available")]
    NoDevice,

    /// The endpoint answered with a STALL handshake.
    #[error("endpoint stalled")]
    Stall,

    /// Any other platform-specific failure.
    #[error("transfer failed: {0}")]
    Failed(String),
}

/// Errors raised by ports, drivers and the registry.
#[derive(Debug, Error)]
pub enum SerialError {
    /// No driver is registered for the device's vendor/product pair.
    #[error("no driver registered for USB device {vendor_id:04x}:{product_id:04x}")]
    UnsupportedDevice { vendor_id: u16, product_id: u16 },

    /// The device topology does not match what the chip driver expects.
    #[error("insufficient endpoints: {0}")]
    InsufficientEndpoints(String),

    /// Claiming a USB interface failed.
    #[error("failed to claim USB interface {0}")]
    UsbClaim(u8),

    /// A transfer returned an unexpected length or payload.
    #[error("I/O error: {0}")]
    Io(String),

    /// A transfer was rejected by the host USB stack.
    #[error("{context}: {source}")]
    Transfer {
        context: String,
        #[source]
        source: UsbTransferError,
    },

    /// The chip has no encoding for the requested baud rate.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// The chip has no encoding for the requested serial parameter.
    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),

    /// The operation requires an open port.
    #[error("port is not open")]
    PortNotOpen,

    /// No port with the given name is known to the manager.
    #[error("serial port not found: {0}")]
    PortNotFound(String),

    /// Error from the OS-native serial transport.
    #[error("native serial port error: {0}")]
    Native(#[from] serialport::Error),

    /// Error from the operating system.
    #[error("OS error: {0}")]
    Os(#[from] std::io::Error),
}

/// Copyable discriminant of [`SerialError`], carried by error notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialErrorKind {
    UnsupportedDevice,
    InsufficientEndpoints,
    UsbClaim,
    Io,
    UnsupportedBaudRate,
    UnsupportedParameter,
    PortNotOpen,
    PortNotFound,
}

impl SerialError {
    /// Create an `Io` error from a message.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Wrap a host transfer failure with what was being attempted.
    pub fn transfer(context: impl Into<String>, source: UsbTransferError) -> Self {
        Self::Transfer {
            context: context.into(),
            source,
        }
    }

    /// Create an `UnsupportedParameter` error from a message.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedParameter(message.into())
    }

    /// Create an `InsufficientEndpoints` error from a message.
    pub fn endpoints(message: impl Into<String>) -> Self {
        Self::InsufficientEndpoints(message.into())
    }

    pub fn kind(&self) -> SerialErrorKind {
        match self {
            Self::UnsupportedDevice { .. } => SerialErrorKind::UnsupportedDevice,
            Self::InsufficientEndpoints(_) => SerialErrorKind::InsufficientEndpoints,
            Self::UsbClaim(_) => SerialErrorKind::UsbClaim,
            Self::Io(_) | Self::Transfer { .. } | Self::Native(_) | Self::Os(_) => {
                SerialErrorKind::Io
            }
            Self::UnsupportedBaudRate(_) => SerialErrorKind::UnsupportedBaudRate,
            Self::UnsupportedParameter(_) => SerialErrorKind::UnsupportedParameter,
            Self::PortNotOpen => SerialErrorKind::PortNotOpen,
            Self::PortNotFound(_) => SerialErrorKind::PortNotFound,
        }
    }

    /// True when the failure is a read/write timeout rather than a fault.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transfer { source, .. } => *source == UsbTransferError::Timeout,
            Self::Os(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// Result type for serial operations.
pub type SerialResult<T> = Result<T, SerialError>;
