//! Received-data buffering and text framing.
//!
//! The monitor appends every chunk it reads to a [`RollingBuffer`]; readers
//! drain it either as raw bytes or through a [`TextAdapter`], which splits
//! on a delimiter and keeps partial lines for the next call.

use crate::params::TextEncoding;
use memchr::memmem;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// Default bound on unread bytes.
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// FIFO of received bytes with a blocking wait for new data.
///
/// Bounded: when a push would exceed the capacity, the oldest bytes are
/// discarded.
#[derive(Debug)]
pub struct RollingBuffer {
    data: Mutex<VecDeque<u8>>,
    ready: Condvar,
    capacity: usize,
}

impl Default for RollingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `chunk`, returning how many old bytes were dropped to fit it.
    pub fn push(&self, chunk: &[u8]) -> usize {
        if chunk.is_empty() {
            return 0;
        }
        let mut data = self.data.lock();
        data.extend(chunk);
        let overflow = data.len().saturating_sub(self.capacity);
        if overflow > 0 {
            data.drain(..overflow);
            warn!("Receive buffer full, dropped {} bytes", overflow);
        }
        drop(data);
        self.ready.notify_all();
        overflow
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    pub fn clear(&self) {
        self.data.lock().clear();
    }

    /// Block until data is available or `timeout` passes. Returns whether
    /// data is available.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut data = self.data.lock();
        while data.is_empty() {
            if self.ready.wait_until(&mut data, deadline).timed_out() {
                break;
            }
        }
        !data.is_empty()
    }

    /// Remove up to `max` bytes from the front.
    pub fn take(&self, max: usize) -> Vec<u8> {
        let mut data = self.data.lock();
        let n = max.min(data.len());
        data.drain(..n).collect()
    }

    /// Remove everything.
    pub fn take_all(&self) -> Vec<u8> {
        self.data.lock().drain(..).collect()
    }

    /// Wait up to `timeout` for data, then remove up to `max` bytes.
    pub fn take_within(&self, max: usize, timeout: Duration) -> Vec<u8> {
        if self.wait(timeout) {
            self.take(max)
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug)]
struct FrameState {
    pending: Vec<u8>,
    delimiter: Vec<u8>,
    encoding: TextEncoding,
}

/// Line and text reads over a [`RollingBuffer`].
#[derive(Debug)]
pub struct TextAdapter {
    state: Mutex<FrameState>,
}

impl TextAdapter {
    pub fn new(delimiter: impl Into<Vec<u8>>, encoding: TextEncoding) -> Self {
        Self {
            state: Mutex::new(FrameState {
                pending: Vec::new(),
                delimiter: delimiter.into(),
                encoding,
            }),
        }
    }

    /// Change the delimiter and encoding, discarding any partial line.
    pub fn reset(&self, delimiter: impl Into<Vec<u8>>, encoding: TextEncoding) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.delimiter = delimiter.into();
        state.encoding = encoding;
    }

    pub fn delimiter(&self) -> Vec<u8> {
        self.state.lock().delimiter.clone()
    }

    pub fn encoding(&self) -> TextEncoding {
        self.state.lock().encoding
    }

    /// Bytes held back from a previous line read.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn clear(&self) {
        self.state.lock().pending.clear();
    }

    /// Encode `text` for the wire.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        self.state.lock().encoding.encode(text)
    }

    /// Encode `text` followed by the delimiter.
    pub fn encode_line(&self, text: &str) -> Vec<u8> {
        let state = self.state.lock();
        let mut bytes = state.encoding.encode(text);
        bytes.extend_from_slice(&state.delimiter);
        bytes
    }

    /// Copy up to `dest.len()` bytes, held-back bytes first, waiting up to
    /// `timeout` if nothing is available.
    pub fn read_bytes(&self, source: &RollingBuffer, dest: &mut [u8], timeout: Duration) -> usize {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            let n = dest.len().min(state.pending.len());
            dest[..n].copy_from_slice(&state.pending[..n]);
            state.pending.drain(..n);
            return n;
        }
        drop(state);
        let chunk = source.take_within(dest.len(), timeout);
        dest[..chunk.len()].copy_from_slice(&chunk);
        chunk.len()
    }

    /// Everything available, decoded. Waits up to `timeout` only when
    /// nothing decodable is held back.
    ///
    /// A UTF-8 sequence cut off at the end of the data is held back and
    /// completed by a later read.
    pub fn read(&self, source: &RollingBuffer, timeout: Duration) -> String {
        let mut state = self.state.lock();
        if incomplete_tail(state.encoding, &state.pending) == state.pending.len() {
            source.wait(timeout);
        }
        let mut bytes = std::mem::take(&mut state.pending);
        bytes.extend(source.take_all());
        let keep = incomplete_tail(state.encoding, &bytes);
        state.pending = bytes.split_off(bytes.len() - keep);
        state.encoding.decode(&bytes)
    }

    /// Everything available right now, decoded.
    pub fn read_existing(&self, source: &RollingBuffer) -> String {
        self.read(source, Duration::ZERO)
    }

    /// The next delimiter-terminated line, without the delimiter.
    ///
    /// Returns an empty string if no complete line arrives within
    /// `timeout`; the partial line is kept for the next call.
    pub fn read_line(&self, source: &RollingBuffer, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        if state.delimiter.is_empty() {
            drop(state);
            return self.read(source, timeout);
        }
        loop {
            let incoming = source.take_all();
            state.pending.extend(incoming);

            if let Some(pos) = memmem::find(&state.pending, &state.delimiter) {
                let consumed = pos + state.delimiter.len();
                let mut line: Vec<u8> = state.pending.drain(..consumed).collect();
                line.truncate(pos);
                return state.encoding.decode(&line);
            }

            let now = Instant::now();
            if now >= deadline {
                return String::new();
            }
            source.wait(deadline - now);
        }
    }
}

/// Length of a trailing multi-byte sequence that more bytes could complete.
fn incomplete_tail(encoding: TextEncoding, bytes: &[u8]) -> usize {
    if encoding != TextEncoding::Utf8 {
        return 0;
    }
    for back in 1..=bytes.len().min(3) {
        let width = match bytes[bytes.len() - back] {
            0x80..=0xbf => continue,
            0xc2..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf4 => 4,
            _ => return 0,
        };
        return if width > back { back } else { 0 };
    }
    0
}
