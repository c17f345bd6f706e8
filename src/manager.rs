//! Port discovery and lookup by name.

use crate::error::{SerialError, SerialResult};
use crate::monitor::MonitorOptions;
use crate::params::SerialPortParameters;
use crate::port::{SerialDevice, SerialPort, UsbSerialPort};
use crate::registry::{DriverRegistry, ProbedDevice};
use crate::usb::UsbHost;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hands out one [`SerialDevice`] per port name.
///
/// Ports are created closed on first lookup and cached, so repeated
/// lookups of a name share open state and subscribers.
pub struct PortManager {
    host: Arc<dyn UsbHost>,
    registry: Arc<DriverRegistry>,
    defaults: SerialPortParameters,
    monitor: MonitorOptions,
    ports: Mutex<HashMap<String, Arc<SerialDevice>>>,
}

impl PortManager {
    /// A manager over `host` using the built-in driver table.
    pub fn new(host: Arc<dyn UsbHost>) -> Self {
        Self::with_registry(host, Arc::new(DriverRegistry::with_builtin_drivers()))
    }

    pub fn with_registry(host: Arc<dyn UsbHost>, registry: Arc<DriverRegistry>) -> Self {
        Self {
            host,
            registry,
            defaults: SerialPortParameters::default(),
            monitor: MonitorOptions::default(),
            ports: Mutex::new(HashMap::new()),
        }
    }

    /// Parameters new ports start with.
    pub fn with_defaults(mut self, defaults: SerialPortParameters) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_monitor_options(mut self, monitor: MonitorOptions) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Connected devices that have a registered driver.
    pub fn devices(&self) -> Vec<ProbedDevice> {
        self.registry.find_all(self.host.as_ref())
    }

    /// Names of every port on every supported connected device.
    pub fn list_port_names(&self) -> Vec<String> {
        self.devices()
            .iter()
            .flat_map(ProbedDevice::port_names)
            .collect()
    }

    /// The port called `name`, created closed on first lookup.
    ///
    /// A miss rescans the bus and drops cached ports whose device is gone.
    pub fn get_port(&self, name: &str) -> SerialResult<Arc<SerialDevice>> {
        if let Some(port) = self.ports.lock().get(name) {
            return Ok(Arc::clone(port));
        }

        let devices = self.devices();
        self.evict_missing(&devices);

        let mut ports = self.ports.lock();
        if let Some(port) = ports.get(name) {
            return Ok(Arc::clone(port));
        }
        let (probed, port_number) = devices
            .iter()
            .find_map(|probed| {
                (0..probed.port_count())
                    .find(|&p| probed.port_name(p) == name)
                    .map(|p| (probed, p))
            })
            .ok_or_else(|| SerialError::PortNotFound(name.to_string()))?;

        debug!("Creating {} for {}", name, probed.chip);
        let transport = UsbSerialPort::from_probed(Arc::clone(&self.host), probed, port_number);
        let port = Arc::new(SerialDevice::new(
            Arc::new(transport),
            self.defaults.clone(),
            self.monitor,
        ));
        ports.insert(name.to_string(), Arc::clone(&port));
        Ok(port)
    }

    /// Close `name` and forget it; the next lookup builds a fresh port.
    /// Returns false if the name was never handed out.
    pub fn release_port(&self, name: &str) -> SerialResult<bool> {
        let Some(port) = self.ports.lock().remove(name) else {
            return Ok(false);
        };
        port.close()?;
        Ok(true)
    }

    /// Close and forget cached ports whose device is no longer attached.
    pub fn prune_disconnected(&self) -> usize {
        self.evict_missing(&self.devices())
    }

    fn evict_missing(&self, devices: &[ProbedDevice]) -> usize {
        let present: HashSet<String> = devices.iter().flat_map(ProbedDevice::port_names).collect();
        let stale: Vec<(String, Arc<SerialDevice>)> = {
            let mut ports = self.ports.lock();
            let names: Vec<String> = ports
                .keys()
                .filter(|name| !present.contains(*name))
                .cloned()
                .collect();
            names
                .into_iter()
                .filter_map(|name| ports.remove(&name).map(|port| (name, port)))
                .collect()
        };
        for (name, port) in &stale {
            debug!("Dropping {}: device detached", name);
            if let Err(e) = port.close() {
                warn!("Closing detached {} failed: {}", name, e);
            }
        }
        stale.len()
    }

    /// Names of ports currently cached, sorted.
    pub fn cached_ports(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ports.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every port handed out so far.
    pub fn close_all(&self) -> SerialResult<()> {
        let ports: Vec<_> = self.ports.lock().values().cloned().collect();
        let mut first_error = None;
        for port in ports {
            if let Err(e) = port.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for PortManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortManager")
            .field("registry", &self.registry)
            .field("cached_ports", &self.ports.lock().len())
            .finish()
    }
}
