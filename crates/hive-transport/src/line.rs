//! Duplex in-process connection between two endpoints.
//!
//! A [`Line`] owns a bounded inbox and a weak reference to at most one peer.
//! `send` pushes into the peer's inbox; a message the peer does not accept
//! within the grace window is discarded instead of blocking the sender.
//! Connecting either side to someone new severs the old pairing on both ends.

use async_trait::async_trait;
use hive_proto::Message;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::{debug, warn};

use crate::channel::{Channel, TransportError};
use crate::done::DoneSignal;

/// Inbox sizing and delivery grace. The default single-slot inbox keeps a
/// stalled peer from accumulating more than one undelivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    pub capacity: usize,
    pub grace: Duration,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            grace: Duration::from_millis(100),
        }
    }
}

/// Delivery counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub delivered: u64,
    pub discarded: u64,
}

struct Shared {
    name: String,
    close_on_disconnect: bool,
    grace: Duration,
    tx: mpsc::Sender<Message>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    peer: Mutex<Option<Weak<Shared>>>,
    done: DoneSignal,
    delivered: AtomicU64,
    discarded: AtomicU64,
}

/// Cloneable handle to one end of a duplex connection.
#[derive(Clone)]
pub struct Line {
    shared: Arc<Shared>,
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Line")
            .field("name", &self.shared.name)
            .field("connected", &self.is_connected())
            .field("done", &self.shared.done.is_done())
            .finish()
    }
}

impl Line {
    /// Create an unconnected line. With `close_on_disconnect` the line fires
    /// its done signal the first time it loses a peer.
    pub fn new(name: impl Into<String>, close_on_disconnect: bool, config: LineConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                close_on_disconnect,
                grace: config.grace,
                tx,
                rx: tokio::sync::Mutex::new(rx),
                peer: Mutex::new(None),
                done: DoneSignal::new(),
                delivered: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Pair with `other`, severing any existing pairing on either side.
    pub fn connect(&self, other: &Line) {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            warn!(line = %self.shared.name, "refusing to connect a line to itself");
            return;
        }
        self.disconnect();
        other.disconnect();
        *self.shared.peer.lock() = Some(Arc::downgrade(&other.shared));
        *other.shared.peer.lock() = Some(Arc::downgrade(&self.shared));
        debug!(line = %self.shared.name, peer = %other.shared.name, "lines connected");
    }

    /// Drop the current peer on both sides. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let former = self.shared.peer.lock().take();
        let Some(former) = former else {
            return;
        };
        if let Some(peer) = former.upgrade() {
            Line { shared: peer }.disconnect();
        }
        debug!(line = %self.shared.name, "line disconnected");
        if self.shared.close_on_disconnect {
            self.shared.done.fire();
        }
    }

    /// Disconnect and fire done.
    pub fn close(&self) {
        self.disconnect();
        self.shared.done.fire();
    }

    pub fn peer(&self) -> Option<Line> {
        let peer = self.shared.peer.lock().as_ref()?.upgrade()?;
        Some(Line { shared: peer })
    }

    pub fn is_connected(&self) -> bool {
        self.peer().is_some()
    }

    pub fn is_done(&self) -> bool {
        self.shared.done.is_done()
    }

    /// Send to the current peer.
    pub async fn send(&self, msg: Message) -> Result<(), TransportError> {
        let peer = self.peer().ok_or(TransportError::NotConnected)?;
        peer.push(msg).await
    }

    /// Offer a message to this line's own inbox.
    pub async fn push(&self, msg: Message) -> Result<(), TransportError> {
        let shared = &self.shared;
        if shared.done.is_done() {
            return Err(TransportError::Disconnected);
        }
        tokio::select! {
            biased;
            _ = shared.done.wait() => Err(TransportError::Disconnected),
            res = shared.tx.send_timeout(msg, shared.grace) => match res {
                Ok(()) => {
                    shared.delivered.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(SendTimeoutError::Timeout(msg)) => {
                    shared.discarded.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        line = %shared.name,
                        msg = %msg,
                        grace_ms = shared.grace.as_millis() as u64,
                        "message discarded, inbox not drained in time"
                    );
                    Err(TransportError::Discarded {
                        endpoint: shared.name.clone(),
                        grace: shared.grace,
                    })
                }
                Err(SendTimeoutError::Closed(_)) => Err(TransportError::Disconnected),
            },
        }
    }

    /// Next message from the inbox, or `None` once done.
    pub async fn recv(&self) -> Option<Message> {
        let shared = &self.shared;
        let mut rx = shared.rx.lock().await;
        tokio::select! {
            biased;
            msg = rx.recv() => msg,
            _ = shared.done.wait() => None,
        }
    }

    pub fn done(&self) -> DoneSignal {
        self.shared.done.clone()
    }

    pub fn stats(&self) -> LineStats {
        LineStats {
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Channel for Line {
    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        Line::send(self, msg).await
    }

    async fn recv(&self) -> Option<Message> {
        Line::recv(self).await
    }

    fn done(&self) -> DoneSignal {
        Line::done(self)
    }

    fn disconnect(&self) {
        Line::disconnect(self)
    }

    fn name(&self) -> &str {
        Line::name(self)
    }
}
