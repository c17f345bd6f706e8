//! Driver registry.
//!
//! Maps USB vendor/product pairs to chip driver constructors and probes
//! connected devices against that map. The first registration for an
//! identity wins; later ones are ignored.

use crate::drivers::{
    builtin_declarations, ChipKind, ChipProtocol, DriverDeclaration, DriverFactory,
};
use crate::error::{SerialError, SerialResult};
use crate::usb::{UsbDeviceInfo, UsbHost};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Registry lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl From<&UsbDeviceInfo> for DeviceIdentity {
    fn from(device: &UsbDeviceInfo) -> Self {
        Self::new(device.vendor_id, device.product_id)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// A connected device with a registered driver.
#[derive(Debug, Clone)]
pub struct ProbedDevice {
    pub device: UsbDeviceInfo,
    pub chip: ChipKind,
    factory: DriverFactory,
}

impl ProbedDevice {
    /// Constructor for the driver registered under this device's identity.
    pub fn factory(&self) -> DriverFactory {
        self.factory
    }

    /// Number of serial ports the device exposes.
    pub fn port_count(&self) -> u8 {
        1
    }

    pub fn port_name(&self, port_number: u8) -> String {
        format!("{}/{}", self.device.name, port_number)
    }

    pub fn port_names(&self) -> Vec<String> {
        (0..self.port_count()).map(|p| self.port_name(p)).collect()
    }
}

/// Identity to driver-constructor map, safe for concurrent lookups.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<DeviceIdentity, DriverFactory>>,
}

static GLOBAL_REGISTRY: Lazy<DriverRegistry> = Lazy::new(DriverRegistry::with_builtin_drivers);

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in driver table.
    pub fn with_builtin_drivers() -> Self {
        let registry = Self::new();
        registry.register_all(&builtin_declarations());
        registry
    }

    /// Process-wide registry initialised with the built-in table.
    pub fn global() -> &'static DriverRegistry {
        &GLOBAL_REGISTRY
    }

    /// Register `factory` for `identity`.
    ///
    /// Returns false, leaving the existing entry in place, if the identity
    /// is already registered.
    pub fn register(&self, identity: DeviceIdentity, factory: DriverFactory) -> bool {
        let mut drivers = self.drivers.write();
        if drivers.contains_key(&identity) {
            debug!("Driver for {} already registered, ignoring", identity);
            return false;
        }
        drivers.insert(identity, factory);
        true
    }

    /// Register every identity in `declarations`. Returns how many were new.
    pub fn register_all(&self, declarations: &[DriverDeclaration]) -> usize {
        let mut added = 0;
        for declaration in declarations {
            let factory = declaration.chip.factory();
            for &product_id in &declaration.product_ids {
                if self.register(DeviceIdentity::new(declaration.vendor_id, product_id), factory) {
                    added += 1;
                }
            }
        }
        debug!("Registered {} driver identities", added);
        added
    }

    pub fn lookup(&self, identity: DeviceIdentity) -> Option<DriverFactory> {
        self.drivers.read().get(&identity).copied()
    }

    pub fn contains(&self, identity: DeviceIdentity) -> bool {
        self.drivers.read().contains_key(&identity)
    }

    /// Chip family registered for `identity`.
    pub fn chip_kind(&self, identity: DeviceIdentity) -> Option<ChipKind> {
        self.lookup(identity).map(|factory| factory().kind())
    }

    /// All registered identities with their chip family, sorted.
    pub fn entries(&self) -> Vec<(DeviceIdentity, ChipKind)> {
        let mut entries: Vec<_> = self
            .drivers
            .read()
            .iter()
            .map(|(identity, factory)| (*identity, factory().kind()))
            .collect();
        entries.sort_by_key(|(identity, _)| *identity);
        entries
    }

    pub fn len(&self) -> usize {
        self.drivers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.read().is_empty()
    }

    /// Match `device` against the registry.
    ///
    /// Access to the device is requested first; a refusal is logged and
    /// probing continues, since opening will surface the real failure.
    pub fn probe(&self, host: &dyn UsbHost, device: &UsbDeviceInfo) -> SerialResult<ProbedDevice> {
        if !host.request_permission(device) {
            warn!("USB permission not granted for {}", device.name);
        }
        let identity = DeviceIdentity::from(device);
        let factory = self
            .lookup(identity)
            .ok_or(SerialError::UnsupportedDevice {
                vendor_id: identity.vendor_id,
                product_id: identity.product_id,
            })?;
        let chip = factory().kind();
        debug!("Probed {} ({}) as {}", device.name, identity, chip);
        Ok(ProbedDevice {
            device: device.clone(),
            chip,
            factory,
        })
    }

    /// Probe every connected device, skipping those without a driver.
    pub fn find_all(&self, host: &dyn UsbHost) -> Vec<ProbedDevice> {
        host.devices()
            .iter()
            .filter(|device| self.contains(DeviceIdentity::from(*device)))
            .filter_map(|device| self.probe(host, device).ok())
            .collect()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("identities", &self.len())
            .finish()
    }
}
