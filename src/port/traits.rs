//! Core traits for serial port abstraction.
//!
//! [`PortTransport`] is the byte-level contract both the USB engine and the
//! OS-native transport fulfil. [`SerialPort`] is the application-facing
//! surface with framing and notifications on top.

use crate::error::{SerialErrorKind, SerialResult};
use crate::params::SerialPortParameters;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Host-driven and device-reported modem control lines.
pub trait ModemControl {
    fn dtr(&self) -> SerialResult<bool>;
    fn set_dtr(&self, value: bool) -> SerialResult<()>;
    fn rts(&self) -> SerialResult<bool>;
    fn set_rts(&self, value: bool) -> SerialResult<()>;
    fn cts(&self) -> SerialResult<bool>;
    fn dsr(&self) -> SerialResult<bool>;
    fn cd(&self) -> SerialResult<bool>;
    fn ri(&self) -> SerialResult<bool>;
}

/// Byte transport under a serial port.
///
/// Methods take `&self`; implementations lock internally so one reader and
/// one writer may use the transport at the same time.
pub trait PortTransport: ModemControl + Send + Sync {
    fn name(&self) -> &str;

    /// Open with `params`. A no-op if already open.
    fn open(&self, params: &SerialPortParameters) -> SerialResult<()>;

    /// Release the connection. A no-op if not open.
    fn close(&self) -> SerialResult<()>;

    fn is_open(&self) -> bool;

    /// Read whatever arrives within the read timeout. Returns 0 on timeout.
    fn read(&self, buffer: &mut [u8]) -> SerialResult<usize>;

    /// Write `data`, returning how many bytes the device accepted.
    fn write(&self, data: &[u8]) -> SerialResult<usize>;

    /// Discard data held in the device's receive and/or transmit FIFOs.
    fn purge_hw_buffers(&self, rx: bool, tx: bool) -> SerialResult<()>;
}

/// Notification raised by a port's background monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    /// Bytes arrived, in device order.
    DataReceived { chunk: Vec<u8> },
    /// A read failed; the monitor keeps polling.
    ErrorReceived {
        kind: SerialErrorKind,
        message: String,
    },
}

/// Handle returned by [`SerialPort::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Subscriber callback. Runs on the monitor thread.
pub type EventHandler = Arc<dyn Fn(&PortEvent) + Send + Sync>;

/// Application-facing serial port.
pub trait SerialPort: ModemControl + Send + Sync {
    fn name(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Parameters the port was (or will be) opened with.
    fn parameters(&self) -> SerialPortParameters;

    /// Open with `params` and start the background monitor.
    ///
    /// A no-op if the port is already open; reconfiguring requires a close.
    fn open(&self, params: SerialPortParameters) -> SerialResult<()>;

    /// Stop the monitor and release the transport. A no-op if closed.
    fn close(&self) -> SerialResult<()>;

    /// Copy received bytes into `buffer`, waiting up to the read timeout.
    fn read(&self, buffer: &mut [u8]) -> SerialResult<usize>;

    fn write(&self, data: &[u8]) -> SerialResult<usize>;

    /// Drain received data as text, waiting up to `timeout` for some.
    fn read_text(&self, timeout: Duration) -> SerialResult<String>;

    /// Next delimiter-terminated line without its delimiter, or an empty
    /// string if no complete line arrived in time.
    fn read_line(&self) -> SerialResult<String>;

    /// Everything received so far, as text.
    fn read_existing(&self) -> SerialResult<String>;

    fn write_text(&self, text: &str) -> SerialResult<usize>;

    /// Write `text` followed by the configured delimiter.
    fn write_line(&self, text: &str) -> SerialResult<usize>;

    fn subscribe(&self, handler: EventHandler) -> SubscriptionId;

    /// Returns false if `id` was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
