//! One-shot, multi-observer termination signal.

use std::sync::Arc;
use tokio::sync::watch;

/// Fires at most once; any number of tasks may wait on it.
#[derive(Clone, Debug)]
pub struct DoneSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl DoneSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns true only for the call that fired it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    pub fn is_done(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has fired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fires_once_and_wakes_all_waiters() {
        let done = DoneSignal::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let done = done.clone();
                tokio::spawn(async move { done.wait().await })
            })
            .collect();

        assert!(done.fire());
        assert!(!done.fire());
        assert!(done.is_done());

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
        // Waiting after the fact returns immediately.
        done.wait().await;
    }
}
