//! Service lifecycle: admission of calls and coordinated shutdown.
//!
//! [`ServiceLifecycle`] is shared by every handler. Each call enters the
//! lifecycle and holds a [`CallGuard`] until it is done (for `ListBlog`, until
//! its stream task finishes). Shutdown happens in phases:
//!
//! 0. Refuse new calls with [`Error::ServiceShutdown`].
//! 1. Wait, up to the configured timeout, for in-flight calls to drain.
//! 2. Cancel the abort token. Operations still running race this token and
//!    give up at their next I/O boundary.

use blog_tonic_core::Error;
use core::{future::Future, time::Duration};
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct ServiceLifecycle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    draining: CancellationToken,
    abort: CancellationToken,
    inflight: AtomicUsize,
    drain_timeout: Duration,
}

impl ServiceLifecycle {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                draining: CancellationToken::new(),
                abort: CancellationToken::new(),
                inflight: AtomicUsize::new(0),
                drain_timeout,
            }),
        }
    }

    /// Admits a call. The returned guard keeps the call counted as in-flight
    /// until it is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once [`stop`](Self::stop) has begun.
    pub fn enter(&self) -> Result<CallGuard, Error> {
        if self.inner.draining.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        self.inner.inflight.fetch_add(1, Ordering::AcqRel);
        // Re-check so a call racing `stop` is either counted or refused.
        if self.inner.draining.is_cancelled() {
            self.inner.inflight.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::ServiceShutdown);
        }
        Ok(CallGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Runs `fut` unless the abort token fires first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        tokio::select! {
            biased;
            () = self.inner.abort.cancelled() => Err(Error::ServiceShutdown),
            res = fut => res,
        }
    }

    /// Token cancelled once draining has finished or timed out.
    pub fn abort_token(&self) -> CancellationToken {
        self.inner.abort.clone()
    }

    pub fn inflight(&self) -> usize {
        self.inner.inflight.load(Ordering::Acquire)
    }

    /// Stops admitting calls, waits for in-flight calls to drain (bounded by
    /// the drain timeout) and then aborts whatever is left.
    ///
    /// Returns `true` if every call drained before the timeout.
    pub async fn stop(&self) -> bool {
        // === Phase 0: Stop accepting new calls ===
        tracing::info!("Refusing new requests");
        self.inner.draining.cancel();

        // === Phase 1: Wait for in-flight calls to drain ===
        tracing::info!("Draining in-flight calls ({} active)", self.inflight());
        let drained = timeout(self.inner.drain_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok();

        if drained {
            tracing::debug!("All in-flight calls drained successfully");
        } else {
            tracing::warn!(
                "Graceful drain timed out ({} calls still active)",
                self.inflight()
            );
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining work via abort token");
        self.inner.abort.cancel();

        drained
    }
}

/// Marks one admitted call as in-flight.
#[derive(Debug)]
pub struct CallGuard {
    inner: Arc<Inner>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.inner.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}
