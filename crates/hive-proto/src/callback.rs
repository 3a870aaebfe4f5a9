//! One-shot completion handle for a request.
//!
//! A [`Callback`] terminates exactly once, either resolved with a JSON result
//! or rejected with a [`CallbackError`]. Later attempts are ignored. Listeners
//! registered before termination run once with the outcome; listeners added
//! afterwards run immediately with the cached outcome.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::errors::CallbackError;

/// Terminal value of a callback.
pub type Outcome = Result<Value, CallbackError>;

type Listener = Box<dyn FnOnce(&Outcome) + Send>;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct State {
    outcome: Option<Outcome>,
    listeners: Vec<Listener>,
    timer: Option<JoinHandle<()>>,
    timer_armed: bool,
}

struct Inner {
    serial: u64,
    state: Mutex<State>,
    settled: watch::Sender<bool>,
}

/// Shared handle; clones observe the same outcome.
#[derive(Clone)]
pub struct Callback {
    inner: Arc<Inner>,
}

impl Default for Callback {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Callback")
            .field("serial", &self.inner.serial)
            .field("outcome", &state.outcome)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl Callback {
    pub fn new() -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(State::default()),
                settled,
            }),
        }
    }

    /// Process-unique identity of this callback.
    pub fn serial(&self) -> u64 {
        self.inner.serial
    }

    /// True when both handles refer to the same callback.
    pub fn same(&self, other: &Callback) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolve with `result`. Returns false if already terminated.
    pub fn resolve(&self, result: Value) -> bool {
        self.finish(Ok(result))
    }

    /// Reject with `error`. Returns false if already terminated.
    pub fn reject(&self, error: CallbackError) -> bool {
        self.finish(Err(error))
    }

    pub fn cancel(&self) -> bool {
        self.reject(CallbackError::Canceled)
    }

    /// Terminate with a prepared outcome. Returns false if already terminated.
    pub fn finish(&self, outcome: Outcome) -> bool {
        let listeners = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.listeners)
        };
        self.inner.settled.send_replace(true);
        for listener in listeners {
            listener(&outcome);
        }
        true
    }

    /// Register a completion listener.
    pub fn listen<F>(&self, listener: F)
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        let cached = {
            let mut state = self.inner.state.lock();
            match &state.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    state.listeners.push(Box::new(listener));
                    return;
                }
            }
        };
        listener(&cached);
    }

    /// Arm a one-shot timer that rejects with [`CallbackError::Timeout`]
    /// after `after`. Arming twice, or after termination, does nothing.
    pub fn timeout(&self, after: Duration) -> &Self {
        let mut state = self.inner.state.lock();
        if state.timer_armed || state.outcome.is_some() {
            return self;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(serial = self.inner.serial, "no runtime, callback timeout not armed");
                return self;
            }
        };
        state.timer_armed = true;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                Callback { inner }.reject(CallbackError::Timeout);
            }
        }));
        self
    }

    pub fn is_settled(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// The outcome, if terminated.
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.state.lock().outcome.clone()
    }

    /// Wait until the callback terminates and return its outcome.
    pub async fn wait(&self) -> Outcome {
        let mut settled = self.inner.settled.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = settled.wait_for(|done| *done).await;
        self.outcome().unwrap_or(Err(CallbackError::Canceled))
    }
}
