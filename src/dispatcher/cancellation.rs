//! Run-level abort.
//!
//! An [`AbortHandle`] is a cloneable flag shared between the pipeline and
//! whoever may stop the run (the CLI wires it to Ctrl+C). The pipeline checks
//! it before starting each request; a retry backoff in progress wakes up when
//! it is raised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

/// Cloneable abort flag.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    state: Arc<AbortState>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the run to stop. Idempotent.
    pub fn abort(&self) {
        self.state.aborted.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Completes once [`abort`](Self::abort) has been called.
    pub async fn aborted(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // register before checking the flag so a concurrent abort is not missed
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clones_share_state() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_aborted());

        handle.abort();
        assert!(clone.is_aborted());

        handle.abort();
        assert!(clone.is_aborted());
    }

    #[tokio::test]
    async fn test_aborted_returns_immediately_when_set() {
        let handle = AbortHandle::new();
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), handle.aborted())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_aborted_wakes_waiter() {
        let handle = AbortHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.aborted().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
