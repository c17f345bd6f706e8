//! Port abstraction layer.
//!
//! Byte transports ([`UsbSerialPort`] over the USB engine, [`NativeSerialPort`]
//! over the OS) sit under [`SerialDevice`], which adds monitoring, framing
//! and notifications behind the [`SerialPort`] trait.

pub mod device;
pub mod engine;
pub mod native;
pub mod traits;

pub use device::SerialDevice;
pub use engine::UsbSerialPort;
pub use native::{available_ports, NativePortInfo, NativeSerialPort, NativeUsbInfo};
pub use traits::*;
