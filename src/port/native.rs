//! OS-native serial transport.
//!
//! Wraps the `serialport` crate so kernel-driven ports (`/dev/ttyUSB0`,
//! `COM3`) get the same framing, monitor and event surface as ports driven
//! through the USB engine.

use super::traits::{ModemControl, PortTransport};
use crate::error::{SerialError, SerialResult};
use crate::params::{DataBits, FlowControl, Parity, SerialPortParameters, StopBits};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::io::{self, Read, Write};
use tracing::{debug, info};

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        if flow.uses_hardware() {
            serialport::FlowControl::Hardware
        } else if flow.uses_software() {
            serialport::FlowControl::Software
        } else {
            serialport::FlowControl::None
        }
    }
}

fn native_parity(parity: Parity) -> SerialResult<serialport::Parity> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => Err(SerialError::unsupported(format!(
            "{parity:?} parity on a native port"
        ))),
    }
}

fn native_stop_bits(stop_bits: StopBits) -> SerialResult<serialport::StopBits> {
    match stop_bits {
        StopBits::One | StopBits::NotSet => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err(SerialError::unsupported("1.5 stop bits on a native port")),
    }
}

struct NativeHandles {
    reader: Mutex<Box<dyn serialport::SerialPort>>,
    writer: Mutex<Box<dyn serialport::SerialPort>>,
}

/// A serial port opened through the operating system.
pub struct NativeSerialPort {
    name: String,
    handles: RwLock<Option<NativeHandles>>,
    /// DTR/RTS as last written; the OS offers no readback.
    lines: Mutex<(bool, bool)>,
}

impl NativeSerialPort {
    /// A closed port for the system path `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handles: RwLock::new(None),
            lines: Mutex::new((false, false)),
        }
    }

    fn with_writer<T>(
        &self,
        f: impl FnOnce(&mut dyn serialport::SerialPort) -> serialport::Result<T>,
    ) -> SerialResult<T> {
        let handles = self.handles.read();
        let handles = handles.as_ref().ok_or(SerialError::PortNotOpen)?;
        let mut writer = handles.writer.lock();
        Ok(f(&mut **writer)?)
    }

    fn open_error(&self, e: serialport::Error) -> SerialError {
        match e.kind() {
            serialport::ErrorKind::NoDevice => SerialError::PortNotFound(self.name.clone()),
            serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
                SerialError::PortNotFound(self.name.clone())
            }
            serialport::ErrorKind::InvalidInput => SerialError::unsupported(e.to_string()),
            _ => SerialError::Native(e),
        }
    }
}

impl PortTransport for NativeSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, params: &SerialPortParameters) -> SerialResult<()> {
        let mut slot = self.handles.write();
        if slot.is_some() {
            return Ok(());
        }

        let reader = serialport::new(&self.name, params.baud_rate)
            .data_bits(params.data_bits.into())
            .flow_control(params.flow_control.into())
            .parity(native_parity(params.parity)?)
            .stop_bits(native_stop_bits(params.stop_bits)?)
            .timeout(params.read_timeout())
            .open()
            .map_err(|e| self.open_error(e))?;
        let mut writer = reader.try_clone()?;
        writer.set_timeout(params.write_timeout())?;

        *slot = Some(NativeHandles {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        });
        *self.lines.lock() = (false, false);
        info!("Opened native port {} at {} baud", self.name, params.baud_rate);
        Ok(())
    }

    fn close(&self) -> SerialResult<()> {
        if self.handles.write().take().is_some() {
            info!("Closed native port {}", self.name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handles.read().is_some()
    }

    fn read(&self, buffer: &mut [u8]) -> SerialResult<usize> {
        let handles = self.handles.read();
        let handles = handles.as_ref().ok_or(SerialError::PortNotOpen)?;
        let mut reader = handles.reader.lock();
        match reader.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(SerialError::Os(e)),
        }
    }

    fn write(&self, data: &[u8]) -> SerialResult<usize> {
        let handles = self.handles.read();
        let handles = handles.as_ref().ok_or(SerialError::PortNotOpen)?;
        let mut writer = handles.writer.lock();
        match writer.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                debug!("Write to {} timed out", self.name);
                Ok(0)
            }
            Err(e) => Err(SerialError::Os(e)),
        }
    }

    fn purge_hw_buffers(&self, rx: bool, tx: bool) -> SerialResult<()> {
        let which = match (rx, tx) {
            (true, true) => serialport::ClearBuffer::All,
            (true, false) => serialport::ClearBuffer::Input,
            (false, true) => serialport::ClearBuffer::Output,
            (false, false) => return Ok(()),
        };
        self.with_writer(|port| port.clear(which))
    }
}

impl ModemControl for NativeSerialPort {
    fn dtr(&self) -> SerialResult<bool> {
        if !self.is_open() {
            return Err(SerialError::PortNotOpen);
        }
        Ok(self.lines.lock().0)
    }

    fn set_dtr(&self, value: bool) -> SerialResult<()> {
        self.with_writer(|port| port.write_data_terminal_ready(value))?;
        self.lines.lock().0 = value;
        Ok(())
    }

    fn rts(&self) -> SerialResult<bool> {
        if !self.is_open() {
            return Err(SerialError::PortNotOpen);
        }
        Ok(self.lines.lock().1)
    }

    fn set_rts(&self, value: bool) -> SerialResult<()> {
        self.with_writer(|port| port.write_request_to_send(value))?;
        self.lines.lock().1 = value;
        Ok(())
    }

    fn cts(&self) -> SerialResult<bool> {
        self.with_writer(|port| port.read_clear_to_send())
    }

    fn dsr(&self) -> SerialResult<bool> {
        self.with_writer(|port| port.read_data_set_ready())
    }

    fn cd(&self) -> SerialResult<bool> {
        self.with_writer(|port| port.read_carrier_detect())
    }

    fn ri(&self) -> SerialResult<bool> {
        self.with_writer(|port| port.read_ring_indicator())
    }
}

impl std::fmt::Debug for NativeSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeSerialPort")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

/// USB identity the OS reports for a native port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeUsbInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// A port the OS enumerates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativePortInfo {
    pub name: String,
    pub usb: Option<NativeUsbInfo>,
}

impl From<serialport::SerialPortInfo> for NativePortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let usb = match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => Some(NativeUsbInfo {
                vendor_id: usb.vid,
                product_id: usb.pid,
                serial_number: usb.serial_number,
                manufacturer: usb.manufacturer,
                product: usb.product,
            }),
            _ => None,
        };
        Self {
            name: info.port_name,
            usb,
        }
    }
}

/// Ports the operating system currently exposes, sorted by name.
pub fn available_ports() -> SerialResult<Vec<NativePortInfo>> {
    let mut ports: Vec<NativePortInfo> = serialport::available_ports()?
        .into_iter()
        .map(NativePortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}
