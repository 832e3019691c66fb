//! Request admission and in-flight tracking.
//!
//! # Responsibilities
//! - Enforce the process-wide concurrent request ceiling
//! - Reject new requests once shutdown started
//! - Count in-flight requests so shutdown can wait for them
//! - Cancel in-flight requests when the shutdown timeout expires

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::observability::metrics;

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    LimitReached,
    Draining,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::LimitReached => "requests-limit",
            Rejection::Draining => "draining",
        }
    }
}

impl From<Rejection> for GatewayError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::LimitReached => GatewayError::Rejected("too many concurrent requests"),
            Rejection::Draining => GatewayError::Rejected("server is shutting down"),
        }
    }
}

/// Admission gate shared by every listener.
#[derive(Debug, Clone)]
pub struct RequestGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    limit: Arc<Semaphore>,
    max_requests: usize,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
    terminate: CancellationToken,
}

impl RequestGate {
    pub fn new(max_requests: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                limit: Arc::new(Semaphore::new(max_requests)),
                max_requests,
                accepting: AtomicBool::new(true),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
                terminate: CancellationToken::new(),
            }),
        }
    }

    /// Admit a request without waiting.
    pub fn try_admit(&self) -> Result<RequestPermit, Rejection> {
        if !self.inner.accepting.load(Ordering::Acquire) {
            metrics::record_rejected(Rejection::Draining.as_str());
            return Err(Rejection::Draining);
        }
        let permit = match self.inner.limit.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(limit = self.inner.max_requests, "Request limit reached");
                metrics::record_rejected(Rejection::LimitReached.as_str());
                return Err(Rejection::LimitReached);
            }
        };
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(RequestPermit {
            _permit: permit,
            inner: self.inner.clone(),
        })
    }

    /// Stop admitting requests.
    pub fn close(&self) {
        if self.inner.accepting.swap(false, Ordering::AcqRel) {
            tracing::info!(in_flight = self.in_flight(), "Request gate closed");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no request is in flight, up to `timeout`.
    /// Returns false when requests were still running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let drained = self.inner.drained.notified();
                tokio::pin!(drained);
                drained.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                drained.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Cancel every in-flight request.
    pub fn terminate(&self) {
        self.inner.terminate.cancel();
    }

    /// Resolves once [`RequestGate::terminate`] was called.
    pub async fn terminated(&self) {
        self.inner.terminate.cancelled().await
    }
}

/// Held for the lifetime of an admitted request.
#[derive(Debug)]
pub struct RequestPermit {
    _permit: OwnedSemaphorePermit,
    inner: Arc<GateInner>,
}

impl Drop for RequestPermit {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
