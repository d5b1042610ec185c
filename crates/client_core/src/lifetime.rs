use std::{fmt, future::Future, sync::Arc};

use tokio::sync::watch;

/// Cancellation token scoped to a controller. Once cancelled, pending
/// operations resolve to `None` and their results are dropped.
#[derive(Clone)]
pub struct Lifetime {
    cancelled: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifetime")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifetime {
    pub fn new() -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(cancelled),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }
        let output = tokio::select! {
            biased;
            _ = self.cancelled() => return None,
            output = fut => output,
        };
        (!self.is_cancelled()).then_some(output)
    }
}
