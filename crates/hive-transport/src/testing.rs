//! Testing utilities for code that talks to a [`Channel`].

use async_trait::async_trait;
use hive_proto::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::channel::{Channel, TransportError};
use crate::done::DoneSignal;

/// Mock channel: records everything sent, delivers whatever the remote
/// injects.
pub struct MockChannel {
    name: String,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    sent: mpsc::UnboundedSender<Message>,
    done: DoneSignal,
    refuse_sends: AtomicBool,
}

/// The test's side of a [`MockChannel`].
pub struct MockRemote {
    inject: mpsc::UnboundedSender<Message>,
    sent: mpsc::UnboundedReceiver<Message>,
    done: DoneSignal,
}

impl MockChannel {
    /// Create a connected mock and its remote handle
    pub fn new(name: impl Into<String>) -> (Arc<Self>, MockRemote) {
        let (inject, inbound) = mpsc::unbounded_channel();
        let (sent, sent_rx) = mpsc::unbounded_channel();
        let done = DoneSignal::new();
        let channel = Arc::new(Self {
            name: name.into(),
            inbound: tokio::sync::Mutex::new(inbound),
            sent,
            done: done.clone(),
            refuse_sends: AtomicBool::new(false),
        });
        let remote = MockRemote {
            inject,
            sent: sent_rx,
            done,
        };
        (channel, remote)
    }

    /// Make every subsequent send fail with `Discarded`
    pub fn refuse_sends(&self, refuse: bool) {
        self.refuse_sends.store(refuse, Ordering::Relaxed);
    }
}

impl MockRemote {
    /// Queue a message for the channel's consumer
    pub fn inject(&self, msg: Message) {
        let _ = self.inject.send(msg);
    }

    /// Next message the channel sent
    pub async fn next_sent(&mut self) -> Option<Message> {
        self.sent.recv().await
    }

    pub fn try_next_sent(&mut self) -> Option<Message> {
        self.sent.try_recv().ok()
    }

    /// Simulate the remote peer going away
    pub fn hang_up(&self) {
        self.done.fire();
    }

    pub fn is_done(&self) -> bool {
        self.done.is_done()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        if self.done.is_done() {
            return Err(TransportError::Disconnected);
        }
        if self.refuse_sends.load(Ordering::Relaxed) {
            return Err(TransportError::Discarded {
                endpoint: self.name.clone(),
                grace: std::time::Duration::ZERO,
            });
        }
        self.sent.send(msg).map_err(|_| TransportError::Disconnected)
    }

    async fn recv(&self) -> Option<Message> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            msg = inbound.recv() => msg,
            _ = self.done.wait() => None,
        }
    }

    fn done(&self) -> DoneSignal {
        self.done.clone()
    }

    fn disconnect(&self) {
        self.done.fire();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_proto::Payload;

    #[tokio::test]
    async fn records_and_injects() {
        let (channel, mut remote) = MockChannel::new("mock");
        channel.send(Message::update("out", Payload::Empty)).await.unwrap();
        assert_eq!(remote.next_sent().await.unwrap().kind(), "out");

        remote.inject(Message::update("in", Payload::Empty));
        assert_eq!(channel.recv().await.unwrap().kind(), "in");

        channel.refuse_sends(true);
        assert!(channel.send(Message::update("lost", Payload::Empty)).await.is_err());

        remote.hang_up();
        assert!(channel.recv().await.is_none());
    }
}
