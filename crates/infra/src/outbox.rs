//! Background delivery to an external sink.
//!
//! Callers enqueue and return immediately; a dedicated thread delivers in order.
//! Sink failures are logged, never surfaced to the caller.

use std::sync::{mpsc, Arc};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use wareflow_events::Sink;

use crate::error::EngineError;

enum Command<M> {
    Deliver(M),
    /// Ack once everything queued before it has been handed to the sink.
    Flush(mpsc::Sender<()>),
}

pub struct Outbox<M: Send + 'static> {
    name: &'static str,
    tx: Mutex<Option<mpsc::Sender<Command<M>>>>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<M: Send + 'static> Outbox<M> {
    pub fn spawn(name: &'static str, sink: Arc<dyn Sink<M>>) -> Result<Self, EngineError> {
        let (tx, rx) = mpsc::channel::<Command<M>>();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || delivery_loop(name, rx, sink))
            .map_err(|source| EngineError::Spawn { name, source })?;

        Ok(Self {
            name,
            tx: Mutex::new(Some(tx)),
            join: Mutex::new(Some(join)),
        })
    }

    /// Queue a message. After shutdown the message is dropped with a warning.
    pub fn send(&self, message: M) {
        let delivered = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(Command::Deliver(message)).is_ok(),
            None => false,
        };
        if !delivered {
            warn!(outbox = self.name, "outbox closed; message dropped");
        }
    }

    /// Block until everything queued so far reached the sink.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        let queued = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(Command::Flush(ack_tx)).is_ok(),
            None => false,
        };
        if queued {
            let _ = ack_rx.recv();
        }
    }

    /// Stop accepting messages, drain the queue and join the thread. Idempotent.
    pub fn shutdown(&self) {
        drop(self.tx.lock().take());
        if let Some(join) = self.join.lock().take() {
            let _ = join.join();
        }
    }
}

impl<M: Send + 'static> Drop for Outbox<M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<M: Send + 'static> std::fmt::Debug for Outbox<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox").field("name", &self.name).finish_non_exhaustive()
    }
}

fn delivery_loop<M>(name: &'static str, rx: mpsc::Receiver<Command<M>>, sink: Arc<dyn Sink<M>>) {
    info!(outbox = name, "outbox started");
    let mut delivered: u64 = 0;
    let mut failed: u64 = 0;

    // Ends once every sender is gone and the queue is empty.
    for command in rx {
        match command {
            Command::Deliver(message) => match sink.deliver(&message) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(outbox = name, error = %e, "delivery failed; message dropped");
                }
            },
            Command::Flush(ack) => {
                debug!(outbox = name, delivered, failed, "outbox flushed");
                let _ = ack.send(());
            }
        }
    }

    info!(outbox = name, delivered, failed, "outbox stopped");
}
