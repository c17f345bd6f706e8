//! Scripted USB host for testing.
//!
//! `MockUsbHost` hands out [`MockConnection`]s that record every control and
//! bulk transfer and play back queued replies, so chip drivers and the port
//! engine can be exercised without hardware.

use super::{ControlRequest, UsbConnection, UsbDeviceInfo, UsbEndpoint, UsbHost, UsbInterface};
use crate::error::UsbTransferError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on how long an empty bulk-in queue blocks before timing out.
const IDLE_READ_DELAY: Duration = Duration::from_millis(2);

/// One control transfer as seen by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub request: ControlRequest,
    /// Payload sent (OUT) or reply delivered (IN).
    pub data: Vec<u8>,
    /// Length of the data stage requested by the host.
    pub length: usize,
}

#[derive(Debug, Default)]
struct ConnectionState {
    control_log: Vec<ControlRecord>,
    /// Replies for IN requests keyed by (request, value). Not consumed.
    control_replies: HashMap<(u8, u16), Vec<u8>>,
    control_failures: HashMap<(u8, u16), UsbTransferError>,
    bulk_in: HashMap<u8, VecDeque<Result<Vec<u8>, UsbTransferError>>>,
    bulk_out_log: Vec<(u8, Vec<u8>)>,
    /// Per-transfer caps on accepted bytes, consumed in order.
    bulk_out_limits: VecDeque<usize>,
    claimed: Vec<u8>,
    claim_failures: HashSet<u8>,
    raw_descriptors: Option<Vec<u8>>,
    opens: usize,
    closes: usize,
    closed: bool,
}

/// A scripted open device.
#[derive(Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<ConnectionState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `data` to IN control requests matching `request`/`value`.
    pub fn reply_control(&self, request: u8, value: u16, data: &[u8]) {
        self.state
            .lock()
            .control_replies
            .insert((request, value), data.to_vec());
    }

    /// Fail control requests matching `request`/`value`.
    pub fn fail_control(&self, request: u8, value: u16, error: UsbTransferError) {
        self.state
            .lock()
            .control_failures
            .insert((request, value), error);
    }

    /// Queue a chunk to be returned by the next bulk read on `address`.
    pub fn enqueue_bulk_in(&self, address: u8, data: &[u8]) {
        self.state
            .lock()
            .bulk_in
            .entry(address)
            .or_default()
            .push_back(Ok(data.to_vec()));
    }

    /// Queue a failure for the next bulk read on `address`.
    pub fn enqueue_bulk_in_error(&self, address: u8, error: UsbTransferError) {
        self.state
            .lock()
            .bulk_in
            .entry(address)
            .or_default()
            .push_back(Err(error));
    }

    /// Accept at most `limit` bytes on the next bulk write.
    pub fn limit_next_bulk_out(&self, limit: usize) {
        self.state.lock().bulk_out_limits.push_back(limit);
    }

    pub fn fail_claim(&self, interface_id: u8) {
        self.state.lock().claim_failures.insert(interface_id);
    }

    pub fn set_raw_descriptors(&self, descriptors: &[u8]) {
        self.state.lock().raw_descriptors = Some(descriptors.to_vec());
    }

    pub fn control_log(&self) -> Vec<ControlRecord> {
        self.state.lock().control_log.clone()
    }

    /// OUT control transfers only, as `(request, value, index, payload)`.
    pub fn control_out_log(&self) -> Vec<(u8, u16, u16, Vec<u8>)> {
        self.state
            .lock()
            .control_log
            .iter()
            .filter(|r| !r.request.is_in())
            .map(|r| (r.request.request, r.request.value, r.request.index, r.data.clone()))
            .collect()
    }

    pub fn clear_control_log(&self) {
        self.state.lock().control_log.clear();
    }

    pub fn bulk_out_log(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().bulk_out_log.clone()
    }

    /// All bytes written to `address`, concatenated.
    pub fn written_bytes(&self, address: u8) -> Vec<u8> {
        self.state
            .lock()
            .bulk_out_log
            .iter()
            .filter(|(ep, _)| *ep == address)
            .flat_map(|(_, data)| data.iter().copied())
            .collect()
    }

    pub fn claimed_interfaces(&self) -> Vec<u8> {
        self.state.lock().claimed.clone()
    }

    pub fn pending_bulk_in(&self, address: u8) -> usize {
        self.state
            .lock()
            .bulk_in
            .get(&address)
            .map_or(0, VecDeque::len)
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        let state = self.state.lock();
        state.opens - state.closes
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn reopen(&self) {
        let mut state = self.state.lock();
        state.opens += 1;
        state.closed = false;
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockConnection")
            .field("control_transfers", &state.control_log.len())
            .field("bulk_writes", &state.bulk_out_log.len())
            .field("claimed", &state.claimed)
            .field("closed", &state.closed)
            .finish()
    }
}

impl UsbConnection for MockConnection {
    fn control_transfer(
        &self,
        request: ControlRequest,
        data: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbTransferError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(UsbTransferError::NoDevice);
        }
        let key = (request.request, request.value);
        if let Some(err) = state.control_failures.get(&key) {
            return Err(err.clone());
        }

        let length = data.len();
        let delivered = if request.is_in() {
            let reply = state
                .control_replies
                .get(&key)
                .cloned()
                .unwrap_or_else(|| vec![0; length]);
            let n = reply.len().min(length);
            data[..n].copy_from_slice(&reply[..n]);
            data[..n].to_vec()
        } else {
            data.to_vec()
        };
        let count = delivered.len();
        state.control_log.push(ControlRecord {
            request,
            data: delivered,
            length,
        });
        Ok(count)
    }

    fn bulk_transfer(
        &self,
        endpoint: &UsbEndpoint,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbTransferError> {
        if endpoint.direction() == super::Direction::Out {
            let mut state = self.state.lock();
            if state.closed {
                return Err(UsbTransferError::NoDevice);
            }
            let limit = state.bulk_out_limits.pop_front().unwrap_or(data.len());
            let n = limit.min(data.len());
            state.bulk_out_log.push((endpoint.address, data[..n].to_vec()));
            return Ok(n);
        }

        let next = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(UsbTransferError::NoDevice);
            }
            state
                .bulk_in
                .get_mut(&endpoint.address)
                .and_then(VecDeque::pop_front)
        };

        match next {
            Some(Ok(chunk)) => {
                let n = chunk.len().min(data.len());
                data[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.state
                        .lock()
                        .bulk_in
                        .entry(endpoint.address)
                        .or_default()
                        .push_front(Ok(chunk[n..].to_vec()));
                }
                Ok(n)
            }
            Some(Err(err)) => Err(err),
            None => {
                std::thread::sleep(timeout.min(IDLE_READ_DELAY));
                Err(UsbTransferError::Timeout)
            }
        }
    }

    fn claim_interface(&self, interface: &UsbInterface, _force: bool) -> bool {
        let mut state = self.state.lock();
        if state.claim_failures.contains(&interface.id) {
            return false;
        }
        state.claimed.push(interface.id);
        true
    }

    fn raw_descriptors(&self) -> Option<Vec<u8>> {
        self.state.lock().raw_descriptors.clone()
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.closes += 1;
        }
    }
}

#[derive(Default)]
struct HostState {
    devices: Vec<(UsbDeviceInfo, MockConnection)>,
    denied: HashSet<String>,
    permission_requests: Vec<String>,
    open_failures: HashMap<String, UsbTransferError>,
}

/// A scripted host stack holding a fixed set of devices.
#[derive(Clone, Default)]
pub struct MockUsbHost {
    state: Arc<Mutex<HostState>>,
}

impl MockUsbHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device and return the connection its opens will share.
    pub fn add_device(&self, device: UsbDeviceInfo) -> MockConnection {
        let connection = MockConnection::new();
        self.state.lock().devices.push((device, connection.clone()));
        connection
    }

    /// Unplug a device; opens of it fail with `NoDevice` from now on.
    pub fn remove_device(&self, device_name: &str) {
        self.state.lock().devices.retain(|(d, _)| d.name != device_name);
    }

    pub fn deny_permission(&self, device_name: &str) {
        self.state.lock().denied.insert(device_name.to_string());
    }

    pub fn fail_open(&self, device_name: &str, error: UsbTransferError) {
        self.state
            .lock()
            .open_failures
            .insert(device_name.to_string(), error);
    }

    pub fn permission_requests(&self) -> Vec<String> {
        self.state.lock().permission_requests.clone()
    }

    pub fn connection(&self, device_name: &str) -> Option<MockConnection> {
        self.state
            .lock()
            .devices
            .iter()
            .find(|(d, _)| d.name == device_name)
            .map(|(_, c)| c.clone())
    }
}

impl fmt::Debug for MockUsbHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let names: Vec<&str> = state.devices.iter().map(|(d, _)| d.name.as_str()).collect();
        f.debug_struct("MockUsbHost").field("devices", &names).finish()
    }
}

impl UsbHost for MockUsbHost {
    fn devices(&self) -> Vec<UsbDeviceInfo> {
        self.state
            .lock()
            .devices
            .iter()
            .map(|(d, _)| d.clone())
            .collect()
    }

    fn request_permission(&self, device: &UsbDeviceInfo) -> bool {
        let mut state = self.state.lock();
        state.permission_requests.push(device.name.clone());
        !state.denied.contains(&device.name)
    }

    fn open(&self, device: &UsbDeviceInfo) -> Result<Arc<dyn UsbConnection>, UsbTransferError> {
        let state = self.state.lock();
        if let Some(err) = state.open_failures.get(&device.name) {
            return Err(err.clone());
        }
        let connection = state
            .devices
            .iter()
            .find(|(d, _)| d.name == device.name)
            .map(|(_, c)| c.clone())
            .ok_or(UsbTransferError::NoDevice)?;
        connection.reopen();
        Ok(Arc::new(connection))
    }
}
