//! Backend pool of one proxy route.
//!
//! # Responsibilities
//! - Hand out connection leases, probing due problem hosts first
//! - Queue requests while every host is at its budget
//! - Record connection failures and probe outcomes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::load_balancer::{
    backend::{BackendHost, HostLease, HostState},
    round_robin::BudgetRoundRobin,
    LoadBalancer,
};
use crate::observability::metrics;

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections_per_host: usize,
    /// Zero means unbounded.
    pub max_queue_size: usize,
    pub problem_retry: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections_per_host: 5,
            max_queue_size: 0,
            problem_retry: Duration::from_secs(10),
        }
    }
}

/// Hosts of a proxy route and the requests waiting for them.
#[derive(Debug)]
pub struct HostPool {
    name: String,
    hosts: Vec<Arc<BackendHost>>,
    balancer: BudgetRoundRobin,
    options: PoolOptions,
    released: Arc<Notify>,
    queued: AtomicUsize,
    epoch: Instant,
}

impl HostPool {
    pub fn new(name: impl Into<String>, hosts: Vec<Arc<BackendHost>>, options: PoolOptions) -> Self {
        Self {
            name: name.into(),
            hosts,
            balancer: BudgetRoundRobin::new(),
            options,
            released: Arc::new(Notify::new()),
            queued: AtomicUsize::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hosts(&self) -> &[Arc<BackendHost>] {
        &self.hosts
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn retry_ms(&self) -> u64 {
        self.options.problem_retry.as_millis() as u64
    }

    /// Lease a slot without waiting.
    pub fn try_acquire(&self) -> Option<HostLease> {
        let (now, retry) = (self.now_ms(), self.retry_ms());

        for host in &self.hosts {
            if host.try_begin_probe(now, retry) {
                if let Some(slot) = host.try_create_guard() {
                    tracing::info!(pool = %self.name, host = %host, "Probing problem backend");
                    return Some(HostLease::new(slot, self.released.clone(), true));
                }
                host.abandon_probe();
            }
        }

        // A host can fill up between selection and the slot claim.
        for _ in 0..self.hosts.len() {
            let host = self.balancer.next_host(&self.hosts)?;
            if let Some(slot) = host.try_create_guard() {
                return Some(HostLease::new(slot, self.released.clone(), false));
            }
        }
        None
    }

    /// Whether waiting could ever yield a lease.
    fn has_usable_host(&self) -> bool {
        let (now, retry) = (self.now_ms(), self.retry_ms());
        self.hosts
            .iter()
            .any(|h| h.state() != HostState::Problem || h.is_due(now, retry))
    }

    /// Lease a slot, queueing while every host is busy.
    pub async fn acquire(&self) -> Result<HostLease, GatewayError> {
        if let Some(lease) = self.try_acquire() {
            return Ok(lease);
        }
        if !self.has_usable_host() {
            return Err(GatewayError::BackendUnavailable(self.name.clone()));
        }

        let _ticket = self.enqueue()?;
        tracing::debug!(pool = %self.name, queued = self.queued(), "All backends busy, queueing");

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(lease) = self.try_acquire() {
                return Ok(lease);
            }
            if !self.has_usable_host() {
                return Err(GatewayError::BackendUnavailable(self.name.clone()));
            }
            // Wake up at least once per retry period so due hosts get probed.
            let _ = tokio::time::timeout(self.options.problem_retry, notified).await;
        }
    }

    fn enqueue(&self) -> Result<QueueTicket<'_>, GatewayError> {
        let position = self.queued.fetch_add(1, Ordering::AcqRel);
        let ticket = QueueTicket { queued: &self.queued };
        if self.options.max_queue_size > 0 && position >= self.options.max_queue_size {
            return Err(GatewayError::QueueFull(self.name.clone()));
        }
        Ok(ticket)
    }

    /// Connecting to the leased host failed.
    pub fn report_connect_failure(&self, lease: &mut HostLease) {
        let host = lease.host();
        let previous = host.mark_problem(self.now_ms());
        if previous == HostState::Healthy {
            tracing::warn!(
                pool = %self.name,
                host = %host,
                retry_secs = self.options.problem_retry.as_secs(),
                "Backend marked as problem"
            );
        } else {
            tracing::debug!(pool = %self.name, host = %host, "Backend still failing");
        }
        metrics::set_backend_problem(host.authority(), true);
        lease.settle();
        // Waiters re-check whether any host is still usable.
        self.released.notify_waiters();
    }

    /// The round trip on the leased host succeeded.
    pub fn report_success(&self, lease: &mut HostLease) {
        if !lease.is_probe() {
            return;
        }
        let host = lease.host();
        if host.mark_healthy() != HostState::Healthy {
            tracing::info!(pool = %self.name, host = %host, "Backend is back");
            metrics::set_backend_problem(host.authority(), false);
        }
        lease.settle();
    }
}

struct QueueTicket<'a> {
    queued: &'a AtomicUsize,
}

impl Drop for QueueTicket<'_> {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}
