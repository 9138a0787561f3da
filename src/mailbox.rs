use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::message::Message;

pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// Cloneable sending half handed to adapters and input readers. Sending never
/// blocks; a send after the owning thread is gone reports `false`.
#[derive(Debug, Clone)]
pub struct Producer {
    tx: Sender<Message>,
}

impl Producer {
    pub fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Wake {
    Message(Message),
    Tick,
    /// Every producer is gone and nothing is left to drain.
    Closed,
}

#[derive(Debug)]
pub struct Mailbox {
    tx: Option<Sender<Message>>,
    rx: Receiver<Message>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx: Some(tx), rx }
    }

    /// A new producer, or `None` once the mailbox has been sealed.
    pub fn producer(&self) -> Option<Producer> {
        self.tx.as_ref().map(|tx| Producer { tx: tx.clone() })
    }

    /// Drops the owner's own sender so the mailbox closes when the last
    /// outside producer disconnects.
    pub fn seal(&mut self) {
        self.tx = None;
    }

    pub fn drain(&self) -> Vec<Message> {
        self.drain_limited(usize::MAX)
    }

    pub fn drain_limited(&self, max_messages: usize) -> Vec<Message> {
        let mut messages = Vec::new();
        while messages.len() < max_messages {
            let Ok(message) = self.rx.try_recv() else {
                break;
            };
            messages.push(message);
        }
        messages
    }

    /// Blocks until a message arrives or the ticker deadline passes.
    pub fn wait(&self, ticker: &mut Ticker, now: Instant) -> Wake {
        if ticker.fire(now) {
            return Wake::Tick;
        }
        match self.rx.recv_timeout(ticker.remaining(now)) {
            Ok(message) => Wake::Message(message),
            Err(RecvTimeoutError::Timeout) => {
                ticker.fire(Instant::now());
                Wake::Tick
            }
            Err(RecvTimeoutError::Disconnected) => Wake::Closed,
        }
    }
}

/// Fixed-rate deadline driving elapsed-time refreshes.
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(period: Duration, now: Instant) -> Self {
        let period = period.max(Duration::from_millis(1));
        Self {
            period,
            next: now + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    /// Advances the deadline if it has passed. Missed ticks are skipped
    /// rather than replayed.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.period;
        if self.next <= now {
            self.next = now + self.period;
        }
        true
    }
}

#[cfg(test)]
#[path = "../tests/unit/mailbox_tests.rs"]
mod tests;
