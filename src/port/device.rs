//! Application-facing serial port.
//!
//! `SerialDevice` puts a background monitor, a rolling receive buffer, text
//! framing and event subscribers on top of any [`PortTransport`]. Once the
//! port is open, every received byte goes through the monitor, so `read`
//! and the text helpers drain the same buffer the events describe.

use super::traits::{EventHandler, ModemControl, PortEvent, PortTransport, SerialPort, SubscriptionId};
use crate::error::{SerialError, SerialResult};
use crate::framing::{RollingBuffer, TextAdapter};
use crate::monitor::{MonitorOptions, PortMonitor};
use crate::params::SerialPortParameters;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type Subscribers = RwLock<Vec<(SubscriptionId, EventHandler)>>;

pub struct SerialDevice {
    transport: Arc<dyn PortTransport>,
    params: RwLock<SerialPortParameters>,
    monitor_options: MonitorOptions,
    monitor: Mutex<Option<PortMonitor<dyn PortTransport>>>,
    received: Arc<RollingBuffer>,
    text: TextAdapter,
    subscribers: Arc<Subscribers>,
    next_subscription: AtomicU64,
}

impl SerialDevice {
    pub fn new(
        transport: Arc<dyn PortTransport>,
        params: SerialPortParameters,
        monitor_options: MonitorOptions,
    ) -> Self {
        let text = TextAdapter::new(params.new_line_bytes(), params.text_encoding);
        Self {
            transport,
            params: RwLock::new(params),
            monitor_options,
            monitor: Mutex::new(None),
            received: Arc::new(RollingBuffer::default()),
            text,
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// The underlying byte transport.
    pub fn transport(&self) -> &Arc<dyn PortTransport> {
        &self.transport
    }

    /// Whether the background monitor is polling.
    pub fn is_monitoring(&self) -> bool {
        self.monitor.lock().as_ref().is_some_and(PortMonitor::is_running)
    }

    /// Bytes received but not yet read.
    pub fn bytes_available(&self) -> usize {
        self.received.len() + self.text.pending_len()
    }

    /// Discard unread data held on the host side.
    pub fn discard_input(&self) {
        self.received.clear();
        self.text.clear();
    }

    pub fn purge_hw_buffers(&self, rx: bool, tx: bool) -> SerialResult<()> {
        self.transport.purge_hw_buffers(rx, tx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn ensure_open(&self) -> SerialResult<()> {
        if self.transport.is_open() {
            Ok(())
        } else {
            Err(SerialError::PortNotOpen)
        }
    }

    fn dispatcher(&self) -> EventHandler {
        let subscribers = Arc::clone(&self.subscribers);
        Arc::new(move |event: &PortEvent| {
            let handlers: Vec<EventHandler> = subscribers
                .read()
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect();
            for handler in handlers {
                handler(event);
            }
        })
    }
}

impl SerialPort for SerialDevice {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    fn parameters(&self) -> SerialPortParameters {
        self.params.read().clone()
    }

    fn open(&self, params: SerialPortParameters) -> SerialResult<()> {
        let mut monitor = self.monitor.lock();
        if self.transport.is_open() {
            debug!("{} already open", self.name());
            return Ok(());
        }

        self.transport.open(&params)?;
        self.received.clear();
        self.text.reset(params.new_line_bytes(), params.text_encoding);

        let options = MonitorOptions {
            chunk_size: params.read_buffer_size,
            ..self.monitor_options
        };
        *self.params.write() = params;

        let poller = PortMonitor::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.received),
            self.dispatcher(),
            options,
        );
        if let Err(e) = poller.start() {
            let _ = self.transport.close();
            return Err(e);
        }
        *monitor = Some(poller);
        Ok(())
    }

    fn close(&self) -> SerialResult<()> {
        let mut monitor = self.monitor.lock();
        if let Some(poller) = monitor.take() {
            if !poller.stop() {
                warn!("Closing {} with monitor still in a transfer", self.name());
            }
        }
        let result = self.transport.close();
        self.received.clear();
        self.text.clear();
        result
    }

    fn read(&self, buffer: &mut [u8]) -> SerialResult<usize> {
        self.ensure_open()?;
        let timeout = self.params.read().read_timeout();
        Ok(self.text.read_bytes(&self.received, buffer, timeout))
    }

    fn write(&self, data: &[u8]) -> SerialResult<usize> {
        self.transport.write(data)
    }

    fn read_text(&self, timeout: Duration) -> SerialResult<String> {
        self.ensure_open()?;
        Ok(self.text.read(&self.received, timeout))
    }

    fn read_line(&self) -> SerialResult<String> {
        self.ensure_open()?;
        let timeout = self.params.read().read_timeout();
        Ok(self.text.read_line(&self.received, timeout))
    }

    fn read_existing(&self) -> SerialResult<String> {
        self.ensure_open()?;
        Ok(self.text.read_existing(&self.received))
    }

    fn write_text(&self, text: &str) -> SerialResult<usize> {
        self.transport.write(&self.text.encode(text))
    }

    fn write_line(&self, text: &str) -> SerialResult<usize> {
        self.transport.write(&self.text.encode_line(text))
    }

    fn subscribe(&self, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }
}

impl ModemControl for SerialDevice {
    fn dtr(&self) -> SerialResult<bool> {
        self.transport.dtr()
    }

    fn set_dtr(&self, value: bool) -> SerialResult<()> {
        self.transport.set_dtr(value)
    }

    fn rts(&self) -> SerialResult<bool> {
        self.transport.rts()
    }

    fn set_rts(&self, value: bool) -> SerialResult<()> {
        self.transport.set_rts(value)
    }

    fn cts(&self) -> SerialResult<bool> {
        self.transport.cts()
    }

    fn dsr(&self) -> SerialResult<bool> {
        self.transport.dsr()
    }

    fn cd(&self) -> SerialResult<bool> {
        self.transport.cd()
    }

    fn ri(&self) -> SerialResult<bool> {
        self.transport.ri()
    }
}

impl Drop for SerialDevice {
    fn drop(&mut self) {
        if let Some(poller) = self.monitor.get_mut().take() {
            poller.stop();
        }
        let _ = self.transport.close();
    }
}

impl fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialDevice")
            .field("name", &self.name())
            .field("open", &self.is_open())
            .field("baud_rate", &self.params.read().baud_rate)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
