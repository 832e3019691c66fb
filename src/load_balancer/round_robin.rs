//! Round-robin weighted by free connection budget.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{backend::BackendHost, LoadBalancer};

/// Starts at a rotating cursor and picks the healthy host with the most
/// free connections. Ties go to the first host in rotation, so idle hosts
/// alternate strictly.
#[derive(Debug, Default)]
pub struct BudgetRoundRobin {
    counter: AtomicUsize,
}

impl BudgetRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for BudgetRoundRobin {
    fn next_host(&self, hosts: &[Arc<BackendHost>]) -> Option<Arc<BackendHost>> {
        if hosts.is_empty() {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = hosts.len();
        let mut best: Option<(&Arc<BackendHost>, usize)> = None;

        for i in 0..len {
            let host = &hosts[(start + i) % len];
            if !host.is_healthy() {
                continue;
            }
            let available = host.available();
            if available == 0 {
                continue;
            }
            if best.map_or(true, |(_, most)| available > most) {
                best = Some((host, available));
            }
        }
        best.map(|(host, _)| host.clone())
    }
}
