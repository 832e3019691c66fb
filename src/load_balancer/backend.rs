//! Backend host abstraction.
//!
//! # Responsibilities
//! - Represent a single backend host of a proxy route
//! - Track active connections against the host's budget
//! - Track health state (Healthy/Problem/Probing) and when the problem began

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::Uri;
use thiserror::Error;
use tokio::sync::Notify;

/// Health state of a host.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Healthy = 0,
    /// Connecting failed; excluded until the retry delay elapses.
    Problem = 1,
    /// One request is testing whether the host is back.
    Probing = 2,
}

impl From<u8> for HostState {
    fn from(val: u8) -> Self {
        match val {
            1 => HostState::Problem,
            2 => HostState::Probing,
            _ => HostState::Healthy,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendUriError {
    #[error("unsupported scheme in {0}, only http backends are supported")]
    UnsupportedScheme(String),

    #[error("missing host in {0}")]
    MissingAuthority(String),
}

/// A single backend host.
#[derive(Debug)]
pub struct BackendHost {
    uri: Uri,
    authority: String,
    /// Path of the backend URI without trailing slash.
    base_path: String,
    max_connections: usize,
    active_connections: AtomicUsize,
    state: AtomicU8,
    /// Milliseconds since the pool clock's epoch.
    problem_since: AtomicU64,
}

impl BackendHost {
    pub fn new(uri: Uri, max_connections: usize) -> Result<Self, BackendUriError> {
        if uri.scheme_str() != Some("http") {
            return Err(BackendUriError::UnsupportedScheme(uri.to_string()));
        }
        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .ok_or_else(|| BackendUriError::MissingAuthority(uri.to_string()))?;
        let base_path = uri.path().trim_end_matches('/').to_string();

        Ok(Self {
            uri,
            authority,
            base_path,
            max_connections: max_connections.max(1),
            active_connections: AtomicUsize::new(0),
            state: AtomicU8::new(HostState::Healthy as u8),
            problem_since: AtomicU64::new(0),
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Free connection slots.
    pub fn available(&self) -> usize {
        self.max_connections.saturating_sub(self.active_connections())
    }

    /// Try to claim a connection slot; released when the slot is dropped.
    pub fn try_create_guard(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let mut prev = self.active_connections.load(Ordering::Acquire);
        loop {
            if prev >= self.max_connections {
                return None;
            }
            match self.active_connections.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(ConnectionSlot {
            host: self.clone(),
            released: None,
        })
    }

    // --- Health Logic ---

    pub fn state(&self) -> HostState {
        HostState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == HostState::Healthy
    }

    /// Problem host whose retry delay has elapsed.
    pub fn is_due(&self, now_ms: u64, retry_ms: u64) -> bool {
        self.state() == HostState::Problem
            && now_ms.saturating_sub(self.problem_since.load(Ordering::Acquire)) >= retry_ms
    }

    /// Claim the single probe of a due problem host.
    pub(crate) fn try_begin_probe(&self, now_ms: u64, retry_ms: u64) -> bool {
        self.is_due(now_ms, retry_ms)
            && self
                .state
                .compare_exchange(
                    HostState::Problem as u8,
                    HostState::Probing as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
    }

    /// Put a probing host back to Problem without re-arming its timer.
    pub(crate) fn abandon_probe(&self) {
        let _ = self.state.compare_exchange(
            HostState::Probing as u8,
            HostState::Problem as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Mark the host as failing from `now_ms`. Returns the previous state.
    pub(crate) fn mark_problem(&self, now_ms: u64) -> HostState {
        self.problem_since.store(now_ms, Ordering::Release);
        HostState::from(self.state.swap(HostState::Problem as u8, Ordering::AcqRel))
    }

    /// Mark the host as healthy. Returns the previous state.
    pub(crate) fn mark_healthy(&self) -> HostState {
        HostState::from(self.state.swap(HostState::Healthy as u8, Ordering::AcqRel))
    }
}

impl fmt::Display for BackendHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

/// A RAII guard that holds one connection slot of a host.
///
/// When `released` is set it is notified once the slot is free again.
#[derive(Debug)]
pub struct ConnectionSlot {
    host: Arc<BackendHost>,
    released: Option<Arc<Notify>>,
}

impl Deref for ConnectionSlot {
    type Target = BackendHost;
    fn deref(&self) -> &Self::Target {
        &self.host
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.host.active_connections.fetch_sub(1, Ordering::AcqRel);
        if let Some(released) = &self.released {
            released.notify_one();
        }
    }
}

/// A connection slot handed out by a pool.
///
/// Dropping the lease frees the slot and wakes one queued request. A probe
/// lease dropped before its outcome was reported leaves the host due for
/// another probe.
pub struct HostLease {
    slot: ConnectionSlot,
    probe: bool,
    settled: bool,
}

impl HostLease {
    pub(crate) fn new(mut slot: ConnectionSlot, released: Arc<Notify>, probe: bool) -> Self {
        slot.released = Some(released);
        Self {
            slot,
            probe,
            settled: false,
        }
    }

    pub fn host(&self) -> &BackendHost {
        &self.slot
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub(crate) fn settle(&mut self) {
        self.settled = true;
    }
}

impl fmt::Debug for HostLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLease")
            .field("host", &self.host().authority())
            .field("probe", &self.probe)
            .finish()
    }
}

impl Drop for HostLease {
    // The slot field drops after this, so waiters see the restored state.
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.slot.abandon_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(uri: &str, max: usize) -> Arc<BackendHost> {
        Arc::new(BackendHost::new(uri.parse().unwrap(), max).unwrap())
    }

    #[test]
    fn test_uri_parts() {
        let h = host("http://127.0.0.1:9000/base/", 1);
        assert_eq!(h.authority(), "127.0.0.1:9000");
        assert_eq!(h.base_path(), "/base");
        assert_eq!(host("http://localhost:9000", 1).base_path(), "");
    }

    #[test]
    fn test_only_http_backends() {
        assert!(matches!(
            BackendHost::new("https://example.com".parse().unwrap(), 1),
            Err(BackendUriError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            BackendHost::new("/relative".parse().unwrap(), 1),
            Err(BackendUriError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_connection_budget() {
        let h = host("http://127.0.0.1:9000", 2);
        let a = h.try_create_guard().unwrap();
        let _b = h.try_create_guard().unwrap();
        assert!(h.try_create_guard().is_none());
        assert_eq!(h.available(), 0);
        drop(a);
        assert_eq!(h.available(), 1);
    }

    #[test]
    fn test_single_probe() {
        let h = host("http://127.0.0.1:9000", 2);
        h.mark_problem(1_000);
        assert!(!h.is_due(5_000, 10_000));
        assert!(h.is_due(11_000, 10_000));
        assert!(h.try_begin_probe(11_000, 10_000));
        assert!(!h.try_begin_probe(11_000, 10_000));
        assert_eq!(h.state(), HostState::Probing);

        h.abandon_probe();
        assert!(h.is_due(11_000, 10_000));
    }

    #[test]
    fn test_unsettled_probe_lease_restores_problem() {
        let h = host("http://127.0.0.1:9000", 2);
        h.mark_problem(0);
        assert!(h.try_begin_probe(10_000, 10_000));
        let lease = HostLease::new(h.try_create_guard().unwrap(), Arc::new(Notify::new()), true);
        drop(lease);
        assert_eq!(h.state(), HostState::Problem);
        assert_eq!(h.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_lease_frees_slot_before_waking() {
        let h = host("http://127.0.0.1:9000", 1);
        let released = Arc::new(Notify::new());
        let lease = HostLease::new(h.try_create_guard().unwrap(), released.clone(), false);
        assert_eq!(lease.host().available(), 0);

        drop(lease);
        released.notified().await;
        assert_eq!(h.available(), 1);
    }
}
