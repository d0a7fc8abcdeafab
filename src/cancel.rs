use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{Result, SubflowError};

/// Owner side of an abort signal.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Ask every stage holding the paired signal to stop issuing new requests.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation token threaded through every dispatcher call.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the paired handle has aborted.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without aborting
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive an in-flight request; after an abort it gets `grace` to finish
    /// before it is dropped and reported as cancelled.
    pub async fn guard<F, T>(&self, grace: Duration, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::pin!(request);
        tokio::select! {
            biased;
            outcome = &mut request => outcome,
            _ = self.aborted() => {
                match tokio::time::timeout(grace, &mut request).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SubflowError::Cancelled),
                }
            }
        }
    }
}
