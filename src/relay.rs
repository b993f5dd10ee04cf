//! Bounded relay between producers and a background consumer
//!
//! A single mutex guards the buffer. `push` never blocks or fails: at
//! capacity the oldest message is evicted and counted. `pop` never blocks.
//! Delivery is FIFO apart from evicted messages, which are lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::EncodedMessage;
use crate::config::RelayConfig;
use crate::error::Result;

/// Capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 100;

/// Counters exposed by [`Relay::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub buffered_count: usize,
    pub capacity: usize,
    /// Messages evicted by capacity pressure
    pub dropped_count: u64,
    pub pushed_count: u64,
    pub popped_count: u64,
}

/// Fixed-capacity FIFO of encoded messages
#[derive(Debug)]
pub struct Relay {
    buffer: Mutex<VecDeque<EncodedMessage>>,
    capacity: usize,
    dropped: AtomicU64,
    pushed: AtomicU64,
    popped: AtomicU64,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Relay {
    /// Create a relay holding at most `capacity` messages (minimum 1)
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            warn!("relay capacity 0 requested, using 1");
        }
        let capacity = capacity.max(1);
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a message, evicting the oldest one when full
    pub fn push(&self, message: EncodedMessage) {
        let mut buffer = self.lock();
        if buffer.len() >= self.capacity {
            if let Some(evicted) = buffer.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    version = %evicted.version,
                    bytes = evicted.len(),
                    "relay full, evicted oldest message"
                );
            }
        }
        buffer.push_back(message);
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove and return the oldest message, or `None` when empty
    pub fn pop(&self) -> Option<EncodedMessage> {
        let message = self.lock().pop_front();
        if message.is_some() {
            self.popped.fetch_add(1, Ordering::Relaxed);
        }
        message
    }

    /// Empty the buffer, returning how many messages were discarded.
    /// Cleared messages are not counted as dropped.
    pub fn clear(&self) -> usize {
        let mut buffer = self.lock();
        let cleared = buffer.len();
        buffer.clear();
        info!(cleared, "relay cleared");
        cleared
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            buffered_count: self.len(),
            capacity: self.capacity,
            dropped_count: self.dropped.load(Ordering::Relaxed),
            pushed_count: self.pushed.load(Ordering::Relaxed),
            popped_count: self.popped.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<EncodedMessage>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counters of a consumer loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub processed: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct ConsumerCounters {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl ConsumerCounters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Background loop draining a [`Relay`]
pub struct Consumer;

impl Consumer {
    /// Start the consumer thread.
    ///
    /// Each iteration pops at most one message and hands it to `handler`;
    /// when the relay is empty the thread parks for up to `poll_interval`.
    /// Handler errors are logged and counted. The loop checks the stop flag
    /// once per iteration.
    pub fn spawn<F>(relay: Arc<Relay>, poll_interval: Duration, mut handler: F) -> std::io::Result<ConsumerHandle>
    where
        F: FnMut(EncodedMessage) -> Result<()> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(ConsumerCounters::default());

        let thread = {
            let stop = stop.clone();
            let counters = counters.clone();
            thread::Builder::new()
                .name("relay-consumer".to_string())
                .spawn(move || {
                    info!(poll_ms = poll_interval.as_millis() as u64, "relay consumer started");
                    while !stop.load(Ordering::Acquire) {
                        match relay.pop() {
                            Some(message) => {
                                let version = message.version.clone();
                                match handler(message) {
                                    Ok(()) => {
                                        counters.processed.fetch_add(1, Ordering::Relaxed);
                                    }
                                    Err(e) => {
                                        counters.failed.fetch_add(1, Ordering::Relaxed);
                                        warn!(version = %version, error = %e, "relay handler failed");
                                    }
                                }
                            }
                            None => thread::park_timeout(poll_interval),
                        }
                    }
                    let stats = counters.snapshot();
                    info!(processed = stats.processed, failed = stats.failed, "relay consumer stopped");
                })?
        };

        Ok(ConsumerHandle {
            stop,
            counters,
            thread: Some(thread),
        })
    }
}

/// Owner of a running consumer. Dropping it stops the loop.
pub struct ConsumerHandle {
    stop: Arc<AtomicBool>,
    counters: Arc<ConsumerCounters>,
    thread: Option<JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the loop to exit, wait for it, and return its final counters
    pub fn stop(mut self) -> ConsumerStats {
        self.shutdown();
        self.counters.snapshot()
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                warn!("relay consumer panicked");
            }
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
