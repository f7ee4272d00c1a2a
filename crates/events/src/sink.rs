//! Delivery abstraction for outbound payloads.
//!
//! A `Sink` is the engine's view of an external collaborator (the operator alerting
//! function, the analytics warehouse). Delivery is best-effort: callers log
//! failures and carry on.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The collaborator could not be reached.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The payload could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Sink<M>: Send + Sync {
    fn deliver(&self, message: &M) -> Result<(), SinkError>;
}

impl<M, S> Sink<M> for Arc<S>
where
    S: Sink<M> + ?Sized,
{
    fn deliver(&self, message: &M) -> Result<(), SinkError> {
        (**self).deliver(message)
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug)]
pub struct RecordingSink<M> {
    inner: Mutex<Vec<M>>,
}

impl<M: Clone> RecordingSink<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<M> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<M> Default for RecordingSink<M> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }
}

impl<M: Clone + Send> Sink<M> for RecordingSink<M> {
    fn deliver(&self, message: &M) -> Result<(), SinkError> {
        self.inner.lock().push(message.clone());
        Ok(())
    }
}

/// Writes one JSON object per line; suitable for batch loading into a
/// day-partitioned analytics table.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<M, W> Sink<M> for JsonLinesSink<W>
where
    M: Serialize,
    W: Write + Send,
{
    fn deliver(&self, message: &M) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Logs every payload as a structured tracing event.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    kind: &'static str,
}

impl TracingSink {
    pub fn new(kind: &'static str) -> Self {
        Self { kind }
    }
}

impl<M: Serialize> Sink<M> for TracingSink {
    fn deliver(&self, message: &M) -> Result<(), SinkError> {
        let payload = serde_json::to_string(message)?;
        info!(sink = self.kind, %payload, "delivered");
        Ok(())
    }
}
