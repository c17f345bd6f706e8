//! USB port I/O engine.
//!
//! `UsbSerialPort` owns one device connection and runs the generic half of
//! every transfer: opening through the host, endpoint setup via the chip
//! driver, chunked bulk reads and writes through dedicated buffers. Chip
//! specifics stay behind [`ChipProtocol`].

use super::traits::{ModemControl, PortTransport};
use crate::drivers::{ChipDriver, ChipKind, ChipProtocol, DriverFactory, PortEndpoints, UsbLink};
use crate::error::{SerialError, SerialResult, UsbTransferError};
use crate::params::SerialPortParameters;
use crate::registry::ProbedDevice;
use crate::usb::{UsbDeviceInfo, UsbHost};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// State that exists only while the port is open.
struct OpenConnection {
    link: UsbLink,
    endpoints: PortEndpoints,
    params: SerialPortParameters,
}

/// One serial port on a USB bridge device.
pub struct UsbSerialPort {
    name: String,
    host: Arc<dyn UsbHost>,
    device: UsbDeviceInfo,
    port_number: u8,
    factory: DriverFactory,
    driver: Mutex<ChipDriver>,
    connection: RwLock<Option<Arc<OpenConnection>>>,
    read_buffer: Mutex<Vec<u8>>,
    write_buffer: Mutex<Vec<u8>>,
}

impl UsbSerialPort {
    pub fn new(
        host: Arc<dyn UsbHost>,
        device: UsbDeviceInfo,
        port_number: u8,
        factory: DriverFactory,
    ) -> Self {
        Self {
            name: format!("{}/{}", device.name, port_number),
            host,
            device,
            port_number,
            factory,
            driver: Mutex::new(factory()),
            connection: RwLock::new(None),
            read_buffer: Mutex::new(Vec::new()),
            write_buffer: Mutex::new(Vec::new()),
        }
    }

    /// Port `port_number` of a probed device.
    pub fn from_probed(host: Arc<dyn UsbHost>, probed: &ProbedDevice, port_number: u8) -> Self {
        Self::new(host, probed.device.clone(), port_number, probed.factory())
    }

    pub fn device(&self) -> &UsbDeviceInfo {
        &self.device
    }

    pub fn port_number(&self) -> u8 {
        self.port_number
    }

    pub fn chip_kind(&self) -> ChipKind {
        self.driver.lock().kind()
    }

    /// Endpoints selected at open time.
    pub fn endpoints(&self) -> Option<PortEndpoints> {
        self.connection.read().as_ref().map(|c| c.endpoints)
    }

    fn active(&self) -> SerialResult<Arc<OpenConnection>> {
        self.connection
            .read()
            .as_ref()
            .cloned()
            .ok_or(SerialError::PortNotOpen)
    }

    fn with_driver<T>(
        &self,
        f: impl FnOnce(&mut ChipDriver, &UsbLink) -> SerialResult<T>,
    ) -> SerialResult<T> {
        let connection = self.active()?;
        let mut driver = self.driver.lock();
        f(&mut driver, &connection.link)
    }
}

impl PortTransport for UsbSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    /// Claim the chip's interfaces, then program line parameters.
    ///
    /// Several chips ignore line settings until their interface is enabled,
    /// so `set_interfaces` always runs before `set_parameters`. A failure in
    /// either step releases the handle and leaves the port closed.
    fn open(&self, params: &SerialPortParameters) -> SerialResult<()> {
        let mut slot = self.connection.write();
        if slot.is_some() {
            return Ok(());
        }

        let handle = self
            .host
            .open(&self.device)
            .map_err(|e| SerialError::transfer(format!("open {}", self.device.name), e))?;
        let link = UsbLink::new(handle);

        let setup = {
            let mut driver = self.driver.lock();
            *driver = (self.factory)();
            driver
                .set_interfaces(&link, &self.device, self.port_number)
                .and_then(|endpoints| {
                    driver.set_parameters(&link, params)?;
                    Ok(endpoints)
                })
        };
        let endpoints = match setup {
            Ok(endpoints) => endpoints,
            Err(e) => {
                link.close();
                return Err(e);
            }
        };
        debug!(
            "{}: read=0x{:02x} write=0x{:02x}",
            self.name, endpoints.read.address, endpoints.write.address
        );

        *self.read_buffer.lock() = vec![0; params.read_buffer_size.max(1)];
        *self.write_buffer.lock() = vec![0; params.write_buffer_size.max(1)];
        *slot = Some(Arc::new(OpenConnection {
            link,
            endpoints,
            params: params.clone(),
        }));

        info!(
            "Opened {} ({}) at {} baud",
            self.name,
            self.chip_kind(),
            params.baud_rate
        );
        Ok(())
    }

    fn close(&self) -> SerialResult<()> {
        let Some(connection) = self.connection.write().take() else {
            return Ok(());
        };
        connection.link.close();
        *self.read_buffer.lock() = Vec::new();
        *self.write_buffer.lock() = Vec::new();
        info!("Closed {}", self.name);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connection.read().is_some()
    }

    fn read(&self, dest: &mut [u8]) -> SerialResult<usize> {
        let connection = self.active()?;
        let mut buffer = self.read_buffer.lock();
        let len = dest.len().min(buffer.len());
        if len == 0 {
            return Ok(0);
        }

        let endpoint = connection.endpoints.read;
        let timeout = connection.params.read_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            match connection
                .link
                .bulk_transfer(&endpoint, &mut buffer[..len], timeout)
            {
                Ok(0) | Err(UsbTransferError::Timeout) => {}
                Ok(n) => {
                    let count = self.driver.lock().filter_read(
                        &buffer[..n],
                        usize::from(endpoint.max_packet_size),
                        dest,
                    )?;
                    if count > 0 {
                        return Ok(count);
                    }
                }
                Err(e) => {
                    return Err(SerialError::transfer(format!("bulk read on {}", self.name), e))
                }
            }
            if Instant::now() >= deadline {
                return Ok(0);
            }
        }
    }

    /// Send `src` in write-buffer sized bulk transfers.
    ///
    /// An empty `src` issues no transfer and returns 0. A timeout after some
    /// bytes went out ends the write early with the partial count.
    fn write(&self, src: &[u8]) -> SerialResult<usize> {
        let connection = self.active()?;
        let mut buffer = self.write_buffer.lock();
        let endpoint = connection.endpoints.write;
        let timeout = connection.params.write_timeout();

        let mut offset = 0;
        while offset < src.len() {
            let chunk = (src.len() - offset).min(buffer.len());
            buffer[..chunk].copy_from_slice(&src[offset..offset + chunk]);
            match connection
                .link
                .bulk_transfer(&endpoint, &mut buffer[..chunk], timeout)
            {
                Ok(0) => {
                    debug!("{}: device accepted nothing at offset {}", self.name, offset);
                    break;
                }
                Ok(n) => offset += n,
                Err(UsbTransferError::Timeout) if offset > 0 => break,
                Err(e) => {
                    return Err(SerialError::transfer(format!("bulk write on {}", self.name), e))
                }
            }
        }
        Ok(offset)
    }

    fn purge_hw_buffers(&self, rx: bool, tx: bool) -> SerialResult<()> {
        self.with_driver(|driver, link| driver.purge_hw_buffers(link, rx, tx))
    }
}

impl ModemControl for UsbSerialPort {
    fn dtr(&self) -> SerialResult<bool> {
        self.with_driver(|d, link| d.dtr(link))
    }

    fn set_dtr(&self, value: bool) -> SerialResult<()> {
        self.with_driver(|d, link| d.set_dtr(link, value))
    }

    fn rts(&self) -> SerialResult<bool> {
        self.with_driver(|d, link| d.rts(link))
    }

    fn set_rts(&self, value: bool) -> SerialResult<()> {
        self.with_driver(|d, link| d.set_rts(link, value))
    }

    fn cts(&self) -> SerialResult<bool> {
        self.with_driver(|d, link| d.cts(link))
    }

    fn dsr(&self) -> SerialResult<bool> {
        self.with_driver(|d, link| d.dsr(link))
    }

    fn cd(&self) -> SerialResult<bool> {
        self.with_driver(|d, link| d.cd(link))
    }

    fn ri(&self) -> SerialResult<bool> {
        self.with_driver(|d, link| d.ri(link))
    }
}

impl fmt::Debug for UsbSerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbSerialPort")
            .field("name", &self.name)
            .field("chip", &self.chip_kind())
            .field("open", &self.is_open())
            .finish()
    }
}
