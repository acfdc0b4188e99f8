//! Time and cancellation primitives injected into waiters and retries.
//!
//! Production code uses [`TokioClock`]; tests use
//! [`FakeClock`](crate::testing::FakeClock), which advances instantly so
//! polling loops run without real delays.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::error::{ProviderError, Result};

/// A source of time that can also suspend the current task.
#[async_trait::async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A cloneable cancellation signal.
///
/// All clones observe the same flag; cancelling any clone cancels them all.
#[derive(Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation has been signalled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `future` to completion unless cancellation arrives first.
    ///
    /// The in-flight future is dropped on cancellation, which aborts any
    /// request it was making.
    pub async fn run<F, T>(&self, what: &str, future: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(ProviderError::Cancelled(what.to_string()));
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ProviderError::Cancelled(what.to_string())),
            output = future => Ok(output),
        }
    }

    /// Sleep on `clock` for `duration`, returning early with `Cancelled`.
    pub async fn sleep(&self, clock: &dyn Clock, duration: Duration, what: &str) -> Result<()> {
        self.run(what, clock.sleep(duration)).await
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
