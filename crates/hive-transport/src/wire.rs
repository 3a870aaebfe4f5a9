//! Channel over a pair of text-frame queues.
//!
//! The socket layer itself lives elsewhere; a [`WireChannel`] only sees the
//! frames it writes and the frames it reads. Outbound requests are tracked in
//! a [`CallbackMap`] and completed by `reply` frames; inbound requests get a
//! callback whose outcome is sent back as a `reply` frame.

use async_trait::async_trait;
use hive_proto::{
    CallbackError, CallbackMap, Codec, Message, Payload, ReplyEnvelope,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::{debug, trace, warn};

use crate::channel::{Channel, TransportError};
use crate::done::DoneSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireConfig {
    /// How long an outbound frame may wait for the writer.
    pub outgoing_grace: Duration,
    /// How long an inbound message may wait for the consumer.
    pub incoming_grace: Duration,
    pub inbox_capacity: usize,
    /// Lifetime of an outbound request without a reply.
    pub callback_timeout: Duration,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            outgoing_grace: Duration::from_millis(10),
            incoming_grace: Duration::from_secs(1),
            inbox_capacity: 16,
            callback_timeout: Duration::from_secs(60),
        }
    }
}

struct WireShared {
    name: String,
    codec: Codec,
    config: WireConfig,
    outgoing: mpsc::Sender<String>,
    inbox_tx: mpsc::Sender<Message>,
    inbox_rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    callbacks: CallbackMap,
    done: DoneSignal,
}

/// Framed endpoint with request/reply correlation.
#[derive(Clone)]
pub struct WireChannel {
    shared: Arc<WireShared>,
}

impl WireChannel {
    /// Start a channel writing frames to `outgoing` and reading from
    /// `incoming`. The channel is done when `incoming` closes or on
    /// `disconnect`.
    pub fn spawn(
        name: impl Into<String>,
        codec: Codec,
        outgoing: mpsc::Sender<String>,
        incoming: mpsc::Receiver<String>,
        config: WireConfig,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
        let shared = Arc::new(WireShared {
            name: name.into(),
            codec,
            config,
            outgoing,
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
            callbacks: CallbackMap::new(config.callback_timeout),
            done: DoneSignal::new(),
        });
        tokio::spawn(read_frames(Arc::downgrade(&shared), shared.done.clone(), incoming));
        Self { shared }
    }

    /// Two channels wired back to back.
    pub fn pair(codec: Codec, config: WireConfig) -> (Self, Self) {
        let (a_out, b_in) = mpsc::channel(config.inbox_capacity.max(1));
        let (b_out, a_in) = mpsc::channel(config.inbox_capacity.max(1));
        let a = Self::spawn("wire-a", codec.clone(), a_out, a_in, config);
        let b = Self::spawn("wire-b", codec, b_out, b_in, config);
        (a, b)
    }

    /// Outbound requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.shared.callbacks.len()
    }

    pub fn is_done(&self) -> bool {
        self.shared.done.is_done()
    }
}

async fn read_frames(shared: Weak<WireShared>, done: DoneSignal, mut incoming: mpsc::Receiver<String>) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = done.wait() => break,
            frame = incoming.recv() => frame,
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match frame {
            Some(frame) => shared.on_frame(&frame).await,
            None => {
                debug!(channel = %shared.name, "frame source closed");
                shared.shut_down();
                break;
            }
        }
    }
}

impl WireShared {
    async fn on_frame(self: &Arc<Self>, frame: &str) {
        let msg = match self.codec.decode(frame) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "dropping malformed frame");
                return;
            }
        };
        trace!(channel = %self.name, msg = %msg, "frame received");

        if msg.kind() == "reply" {
            self.on_reply(msg.into_data());
            return;
        }

        if let Some(callback) = msg.callback() {
            let weak = Arc::downgrade(self);
            let id = msg.id().to_string();
            callback.listen(move |outcome| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let reply = Message::update("reply", ReplyEnvelope::from_outcome(id, outcome));
                tokio::spawn(async move {
                    if let Err(err) = shared.send(reply).await {
                        debug!(channel = %shared.name, error = %err, "reply not sent");
                    }
                });
            });
        }

        match self.inbox_tx.send_timeout(msg, self.config.incoming_grace).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(msg)) => {
                warn!(channel = %self.name, msg = %msg, "inbound message timed out");
            }
            Err(SendTimeoutError::Closed(_)) => {}
        }
    }

    fn on_reply(&self, data: Payload) {
        let Payload::Reply(envelope) = data else {
            warn!(channel = %self.name, "reply without envelope");
            return;
        };
        match self.callbacks.get(&envelope.id) {
            Some(callback) => {
                callback.finish(envelope.into_outcome());
            }
            None => {
                debug!(channel = %self.name, id = %envelope.id, "reply for unknown or expired request");
            }
        }
    }

    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        if self.done.is_done() {
            return Err(TransportError::Disconnected);
        }
        if let Some(callback) = msg.callback() {
            self.callbacks.add(msg.id(), callback.clone())?;
        }
        let result = self.write(&msg).await;
        if let (Err(err), Some(callback)) = (&result, msg.callback()) {
            callback.reject(CallbackError::Rejected(err.to_string()));
        }
        result
    }

    async fn write(&self, msg: &Message) -> Result<(), TransportError> {
        let frame = self.codec.encode(msg)?;
        tokio::select! {
            biased;
            _ = self.done.wait() => Err(TransportError::Disconnected),
            res = self.outgoing.send_timeout(frame, self.config.outgoing_grace) => match res {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!(channel = %self.name, msg = %msg, "outbound frame discarded");
                    Err(TransportError::Discarded {
                        endpoint: self.name.clone(),
                        grace: self.config.outgoing_grace,
                    })
                }
                Err(SendTimeoutError::Closed(_)) => {
                    self.shut_down();
                    Err(TransportError::Disconnected)
                }
            },
        }
    }

    fn shut_down(&self) {
        if self.done.fire() {
            let failed = self
                .callbacks
                .reject_all(CallbackError::Rejected("connection closed".into()));
            debug!(channel = %self.name, failed, "wire channel closed");
        }
    }
}

#[async_trait]
impl Channel for WireChannel {
    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        self.shared.send(msg).await
    }

    async fn recv(&self) -> Option<Message> {
        let shared = &self.shared;
        let mut rx = shared.inbox_rx.lock().await;
        tokio::select! {
            biased;
            msg = rx.recv() => msg,
            _ = shared.done.wait() => None,
        }
    }

    fn done(&self) -> DoneSignal {
        self.shared.done.clone()
    }

    fn disconnect(&self) {
        self.shared.shut_down();
    }

    fn name(&self) -> &str {
        &self.shared.name
    }
}
