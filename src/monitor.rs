//! Background polling of an open port.
//!
//! One thread per running monitor reads chunks from the source, appends
//! them to the shared [`RollingBuffer`] and raises a [`PortEvent`] for each
//! chunk or failure. Transfer errors never end the loop; only `stop` does.

use crate::error::SerialResult;
use crate::framing::RollingBuffer;
use crate::port::{EventHandler, PortEvent, PortTransport};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Anything the monitor can poll for bytes.
pub trait ChunkSource: Send + Sync {
    fn source_name(&self) -> &str;

    /// Read one chunk, returning 0 when nothing arrived in time.
    fn read_chunk(&self, buffer: &mut [u8]) -> SerialResult<usize>;
}

impl<T: PortTransport + ?Sized> ChunkSource for T {
    fn source_name(&self) -> &str {
        self.name()
    }

    fn read_chunk(&self, buffer: &mut [u8]) -> SerialResult<usize> {
        self.read(buffer)
    }
}

/// Tuning for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Size of the fixed polling buffer.
    pub chunk_size: usize,
    /// How long `stop` waits for the loop to exit.
    pub stop_timeout: Duration,
    /// Pause after a failed read before polling again.
    pub error_backoff: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            chunk_size: 16 * 1024,
            stop_timeout: Duration::from_millis(1000),
            error_backoff: Duration::from_millis(50),
        }
    }
}

struct Worker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Start/stop wrapper around the polling thread.
pub struct PortMonitor<S: ChunkSource + ?Sized + 'static> {
    source: Arc<S>,
    buffer: Arc<RollingBuffer>,
    emit: EventHandler,
    options: MonitorOptions,
    worker: Mutex<Option<Worker>>,
}

impl<S: ChunkSource + ?Sized + 'static> PortMonitor<S> {
    pub fn new(
        source: Arc<S>,
        buffer: Arc<RollingBuffer>,
        emit: EventHandler,
        options: MonitorOptions,
    ) -> Self {
        Self {
            source,
            buffer,
            emit,
            options,
            worker: Mutex::new(None),
        }
    }

    pub fn options(&self) -> MonitorOptions {
        self.options
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Spawn the polling loop. Returns false if it was already running.
    pub fn start(&self) -> SerialResult<bool> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Ok(false);
        }
        if let Some(finished) = worker.take() {
            let _ = finished.handle.join();
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let poll = PollLoop {
            source: Arc::clone(&self.source),
            buffer: Arc::clone(&self.buffer),
            emit: Arc::clone(&self.emit),
            cancel: Arc::clone(&cancel),
            options: self.options,
        };
        let handle = thread::Builder::new()
            .name(format!("monitor:{}", self.source.source_name()))
            .spawn(move || poll.run())?;

        info!("Monitor started for {}", self.source.source_name());
        *worker = Some(Worker { cancel, handle });
        Ok(true)
    }

    /// Cancel the loop and wait up to the stop timeout for it to exit.
    ///
    /// Returns false if the loop was still inside a transfer when the
    /// timeout passed; the thread is then detached and exits on its own.
    pub fn stop(&self) -> bool {
        let Some(worker) = self.worker.lock().take() else {
            return true;
        };
        worker.cancel.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + self.options.stop_timeout;
        while !worker.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Monitor for {} did not stop within {:?}",
                    self.source.source_name(),
                    self.options.stop_timeout
                );
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let _ = worker.handle.join();
        info!("Monitor stopped for {}", self.source.source_name());
        true
    }
}

impl<S: ChunkSource + ?Sized + 'static> Drop for PortMonitor<S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().as_ref() {
            worker.cancel.store(true, Ordering::SeqCst);
        }
    }
}

impl<S: ChunkSource + ?Sized + 'static> fmt::Debug for PortMonitor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortMonitor")
            .field("source", &self.source.source_name())
            .field("running", &self.is_running())
            .field("options", &self.options)
            .finish()
    }
}

struct PollLoop<S: ChunkSource + ?Sized> {
    source: Arc<S>,
    buffer: Arc<RollingBuffer>,
    emit: EventHandler,
    cancel: Arc<AtomicBool>,
    options: MonitorOptions,
}

impl<S: ChunkSource + ?Sized> PollLoop<S> {
    fn run(self) {
        let mut chunk = vec![0u8; self.options.chunk_size.max(1)];
        while !self.cancel.load(Ordering::SeqCst) {
            let result = self.source.read_chunk(&mut chunk);
            // A detached loop may finish its read long after stop returned.
            if self.cancel.load(Ordering::SeqCst) {
                debug!("Dropping late read on {}", self.source.source_name());
                break;
            }
            match result {
                Ok(0) => {}
                Ok(n) => {
                    self.buffer.push(&chunk[..n]);
                    (self.emit)(&PortEvent::DataReceived {
                        chunk: chunk[..n].to_vec(),
                    });
                }
                Err(e) => {
                    debug!("Read on {} failed: {}", self.source.source_name(), e);
                    (self.emit)(&PortEvent::ErrorReceived {
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                    thread::sleep(self.options.error_backoff);
                }
            }
        }
    }
}
