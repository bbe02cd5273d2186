//! Named or anonymous FIFO channels for exchanging payloads between units.
//!
//! Senders never block. Receivers block while a channel is empty and open,
//! and fail with [`ChannelError::Closed`] once it is closed and drained.
//! Channels live in an explicit [`ChannelRegistry`] when they need a name
//! others can open.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::ChannelError;

/// Buffering class of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    /// No bound.
    Infinite,
    /// Nominal bound of `n` buffered values.
    Buffered(usize),
    /// Synchronous hand-off.
    #[default]
    Unbuffered,
}

impl Capacity {
    /// Raw sentinel for [`Capacity::Infinite`].
    pub const INFINITE: i64 = -1;

    /// Interpret a raw capacity: `-1` is infinite, absent or `0` unbuffered,
    /// any positive value buffered.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidCapacity`] for any other negative value.
    pub fn from_raw(raw: Option<i64>) -> Result<Self, ChannelError> {
        match raw {
            None | Some(0) => Ok(Self::Unbuffered),
            Some(Self::INFINITE) => Ok(Self::Infinite),
            Some(n) if n > 0 => usize::try_from(n)
                .map(Self::Buffered)
                .map_err(|_| ChannelError::InvalidCapacity(n)),
            Some(n) => Err(ChannelError::InvalidCapacity(n)),
        }
    }

    /// Whether sends hand off synchronously.
    #[must_use]
    pub const fn is_unbuffered(self) -> bool {
        matches!(self, Self::Unbuffered)
    }
}

/// A value that can travel over a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Payload {
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A string.
    Text(String),
    /// A number or boolean, carried in string form.
    Scalar(String),
}

impl Payload {
    /// Validate a dynamic value.
    ///
    /// Strings become [`Payload::Text`]; numbers and booleans are coerced to
    /// [`Payload::Scalar`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::IllegalValue`] for null, arrays, and objects.
    pub fn from_value(value: &Value) -> Result<Self, ChannelError> {
        match value {
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Number(number) => Ok(Self::Scalar(number.to_string())),
            Value::Bool(flag) => Ok(Self::Scalar(flag.to_string())),
            Value::Null => Err(ChannelError::IllegalValue("null".into())),
            Value::Array(_) => Err(ChannelError::IllegalValue("array".into())),
            Value::Object(_) => Err(ChannelError::IllegalValue("object".into())),
        }
    }

    /// Raw bytes of the payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Text(text) | Self::Scalar(text) => text.as_bytes(),
        }
    }

    /// String form, if the payload is text or a scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Bytes(_) => None,
            Self::Text(text) | Self::Scalar(text) => Some(text),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// External pipe a channel can forward its sends to.
pub trait Transport: Send {
    /// Whether the pipe still accepts writes.
    fn is_alive(&self) -> bool;

    /// Write one payload to the pipe.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn write(&mut self, payload: &Payload) -> io::Result<()>;
}

/// [`Transport`] over any [`Write`] sink, one payload per line.
///
/// The transport goes dead after its first write error.
#[derive(Debug)]
pub struct WriterTransport<W> {
    writer: W,
    alive: bool,
}

impl<W: Write> WriterTransport<W> {
    /// Wrap `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            alive: true,
        }
    }

    /// Unwrap the sink.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Transport for WriterTransport<W> {
    fn is_alive(&self) -> bool {
        self.alive
    }

    fn write(&mut self, payload: &Payload) -> io::Result<()> {
        let written = self
            .writer
            .write_all(payload.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush());
        if written.is_err() {
            self.alive = false;
        }
        written
    }
}

#[derive(Default)]
struct ChannelState {
    buffer: VecDeque<Payload>,
    closed: bool,
    transport: Option<Box<dyn Transport>>,
}

struct ChannelShared {
    name: String,
    capacity: Capacity,
    state: Mutex<ChannelState>,
    available: Condvar,
}

/// FIFO channel handle. Cloning shares the channel.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<ChannelShared>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Channel")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .field("buffered", &state.buffer.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl Channel {
    /// An anonymous channel with a generated unique name.
    #[must_use]
    pub fn new(capacity: Capacity) -> Self {
        Self::named(format!("channel-{}", Uuid::new_v4()), capacity)
    }

    /// A channel called `name`, not registered anywhere.
    #[must_use]
    pub fn named(name: impl Into<String>, capacity: Capacity) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                name: name.into(),
                capacity,
                state: Mutex::new(ChannelState::default()),
                available: Condvar::new(),
            }),
        }
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Buffering class.
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.shared.capacity
    }

    /// Validate and send a dynamic value.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if closed, [`ChannelError::IllegalValue`]
    /// if the value is not sendable, or [`ChannelError::Transport`] if the
    /// bound transport rejects the write.
    pub fn send(&self, value: &Value) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.send_payload(Payload::from_value(value)?)
    }

    /// Send raw bytes.
    ///
    /// # Errors
    ///
    /// See [`send_payload`](Self::send_payload).
    pub fn send_bytes(&self, bytes: Vec<u8>) -> Result<(), ChannelError> {
        self.send_payload(Payload::Bytes(bytes))
    }

    /// Send an already validated payload. Never blocks.
    ///
    /// Forwards to the bound transport while it is alive, otherwise buffers.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if closed, or
    /// [`ChannelError::Transport`] if the bound transport rejects the write.
    pub fn send_payload(&self, payload: Payload) -> Result<(), ChannelError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        if let Some(transport) = state.transport.as_mut().filter(|t| t.is_alive()) {
            transport.write(&payload)?;
            return Ok(());
        }
        state.buffer.push_back(payload);
        if let Capacity::Buffered(limit) = self.shared.capacity {
            if state.buffer.len() > limit {
                debug!(channel = %self.shared.name, buffered = state.buffer.len(), limit, "channel over nominal capacity");
            }
        }
        drop(state);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Pop the oldest value, blocking while the channel is empty and open.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once closed and drained.
    pub fn recv(&self) -> Result<Payload, ChannelError> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(payload) = state.buffer.pop_front() {
                return Ok(payload);
            }
            if state.closed {
                return Err(ChannelError::Closed);
            }
            self.shared.available.wait(&mut state);
        }
    }

    /// Pop the oldest value without blocking; `None` if empty and open.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once closed and drained.
    pub fn try_recv(&self) -> Result<Option<Payload>, ChannelError> {
        let mut state = self.shared.state.lock();
        match state.buffer.pop_front() {
            Some(payload) => Ok(Some(payload)),
            None if state.closed => Err(ChannelError::Closed),
            None => Ok(None),
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout` with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once closed and drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Payload>, ChannelError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(payload) = state.buffer.pop_front() {
                return Ok(Some(payload));
            }
            if state.closed {
                return Err(ChannelError::Closed);
            }
            if self.shared.available.wait_until(&mut state, deadline).timed_out() {
                return Ok(state.buffer.pop_front());
            }
        }
    }

    /// Close the channel. Buffered values stay drainable.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if already closed.
    pub fn close(&self) -> Result<(), ChannelError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        state.closed = true;
        drop(state);
        self.shared.available.notify_all();
        debug!(channel = %self.shared.name, "channel closed");
        Ok(())
    }

    /// Forward future sends to `transport` while it is alive.
    pub fn bind(&self, transport: impl Transport + 'static) {
        self.shared.state.lock().transport = Some(Box::new(transport));
    }

    /// Detach the transport; sends buffer again.
    pub fn unbind(&self) -> bool {
        self.shared.state.lock().transport.take().is_some()
    }

    /// Whether the channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of buffered values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer reached the nominal capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        let len = self.len();
        match self.shared.capacity {
            Capacity::Infinite => false,
            Capacity::Buffered(limit) => len >= limit,
            Capacity::Unbuffered => len > 0,
        }
    }
}

/// Name-to-channel registry shared by everything that creates or opens
/// named channels. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<Mutex<HashMap<String, Channel>>>,
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels.lock().len())
            .finish()
    }
}

impl ChannelRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a channel called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::AlreadyExists`] if the name is taken.
    pub fn make(&self, name: &str, capacity: Capacity) -> Result<Channel, ChannelError> {
        let mut channels = self.channels.lock();
        if channels.contains_key(name) {
            warn!(channel = name, "channel already exists");
            return Err(ChannelError::AlreadyExists(name.to_owned()));
        }
        let channel = Channel::named(name, capacity);
        channels.insert(name.to_owned(), channel.clone());
        debug!(channel = name, ?capacity, "channel registered");
        Ok(channel)
    }

    /// Open the channel registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotFound`] if no such channel exists.
    pub fn open(&self, name: &str) -> Result<Channel, ChannelError> {
        self.channels
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ChannelError::NotFound(name.to_owned()))
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.channels.lock().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
