use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use tracing::trace;

use crate::error::StreamClosed;
use crate::mailbox::Producer;
use crate::message::Message;
use crate::timeline::EntryKey;

/// Explicit stop for a subscription, layered over handle liveness.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Non-owning handle to a running entry. Pushing stops working as soon as
/// the entry finishes, is evicted, or the session is dropped.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    target: EntryKey,
    alive: Weak<()>,
    producer: Producer,
}

impl StreamHandle {
    pub fn new(target: EntryKey, alive: Weak<()>, producer: Producer) -> Self {
        Self {
            target,
            alive,
            producer,
        }
    }

    pub fn target(&self) -> EntryKey {
        self.target
    }

    pub fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }

    pub fn push(&self, chunk: impl Into<String>) -> Result<(), StreamClosed> {
        if !self.is_alive() {
            return Err(StreamClosed);
        }
        let message = Message::StreamDelta {
            target: self.target,
            chunk: chunk.into(),
        };
        if self.producer.send(message) {
            Ok(())
        } else {
            Err(StreamClosed)
        }
    }
}

/// Pushes every line of `reader` into the handle's entry. The thread exits
/// quietly once the target is gone or the token is cancelled.
pub fn spawn_output_pump<R: Read + Send + 'static>(
    handle: StreamHandle,
    reader: R,
    cancel: CancelToken,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else {
                break;
            };
            if cancel.is_cancelled() {
                trace!(target_entry = ?handle.target(), "output pump cancelled");
                break;
            }
            if handle.push(line).is_err() {
                trace!(target_entry = ?handle.target(), "output pump target gone");
                break;
            }
        }
    })
}

#[cfg(test)]
#[path = "../tests/unit/stream_tests.rs"]
mod tests;
