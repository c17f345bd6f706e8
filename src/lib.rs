//! USB-to-serial bridge driver stack.
//!
//! Uniform serial-port access to USB bridge chips (CDC-ACM, CH34x, CP21xx,
//! FTDI, Prolific PL2303, STM32 virtual COM ports) over a minimal USB host
//! capability, plus an OS-native transport with the same surface.
//!
//! # Modules
//!
//! - `usb`: host/connection capability traits, descriptors and a scripted mock
//! - `drivers`: per-chip control protocols
//! - `registry`: vendor/product to driver mapping and device probing
//! - `port`: the I/O engine, native transport and the `SerialPort` surface
//! - `monitor`: background polling with data/error notifications
//! - `framing`: rolling receive buffer and line/text reads
//! - `manager`: port lookup by name
//! - `config`: TOML configuration with environment overrides
//! - `logging`: tracing subscriber setup

pub mod config;
pub mod drivers;
pub mod error;
pub mod framing;
pub mod logging;
pub mod manager;
pub mod monitor;
pub mod params;
pub mod port;
pub mod registry;
pub mod usb;

pub use drivers::{ChipDriver, ChipKind, ChipProtocol, DriverDeclaration, DriverFactory};
pub use error::{SerialError, SerialErrorKind, SerialResult, UsbTransferError};
pub use framing::{RollingBuffer, TextAdapter};
pub use manager::PortManager;
pub use monitor::{ChunkSource, MonitorOptions, PortMonitor};
pub use params::{DataBits, FlowControl, Parity, SerialPortParameters, StopBits, TextEncoding};
pub use port::{
    EventHandler, ModemControl, NativeSerialPort, PortEvent, PortTransport, SerialDevice,
    SerialPort, SubscriptionId, UsbSerialPort,
};
pub use registry::{DeviceIdentity, DriverRegistry, ProbedDevice};
pub use usb::{UsbConnection, UsbDeviceInfo, UsbEndpoint, UsbHost, UsbInterface};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
