//! Passive port allocation
//!
//! Hands out ports from the configured inclusive PASV range. Each acquired port
//! is represented by a [`PortLease`] that returns the port to the pool when it
//! is dropped, so every exit path of a transfer gives the port back.

use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::error::TransferError;

/// Bookkeeping for a port currently out on lease.
#[derive(Debug, Clone, Copy)]
pub struct LeaseInfo {
    pub holder: u64,
    pub acquired_at: Instant,
    ticket: u64,
}

#[derive(Default)]
struct PoolState {
    available: BTreeSet<u16>,
    leased: HashMap<u16, LeaseInfo>,
    next_ticket: u64,
}

struct PoolInner {
    range: RangeInclusive<u16>,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Frees `port` only if it is still held under `ticket`.
    fn release_ticket(&self, port: u16, ticket: u64) {
        let mut state = self.lock();
        if state.leased.get(&port).is_some_and(|l| l.ticket == ticket) {
            state.leased.remove(&port);
            state.available.insert(port);
            debug!("Passive port {} returned to pool", port);
        }
    }
}

/// Shared pool of passive ports.
#[derive(Clone)]
pub struct PassivePortAllocator {
    inner: Arc<PoolInner>,
}

impl PassivePortAllocator {
    /// Creates a pool containing every port in `min..=max`.
    pub fn new(min: u16, max: u16) -> Self {
        let range = min..=max;
        let state = PoolState {
            available: range.clone().collect(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(PoolInner {
                range,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn range(&self) -> &RangeInclusive<u16> {
        &self.inner.range
    }

    /// Takes the lowest free port for session `holder`. Fails immediately when
    /// the pool is exhausted.
    pub fn acquire(&self, holder: u64) -> Result<PortLease, TransferError> {
        let mut state = self.inner.lock();
        let port = state
            .available
            .pop_first()
            .ok_or(TransferError::NoPortsAvailable)?;

        state.next_ticket += 1;
        let info = LeaseInfo {
            holder,
            acquired_at: Instant::now(),
            ticket: state.next_ticket,
        };
        state.leased.insert(port, info);
        info!("Session {} leased passive port {}", holder, port);

        Ok(PortLease {
            port,
            info,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Returns `port` to the pool. Releasing a port that is already available,
    /// or outside the range, does nothing.
    pub fn release(&self, port: u16) {
        let mut state = self.inner.lock();
        if state.leased.remove(&port).is_some() {
            state.available.insert(port);
            debug!("Passive port {} force-released", port);
        }
    }

    pub fn available(&self) -> usize {
        self.inner.lock().available.len()
    }

    pub fn leased(&self) -> usize {
        self.inner.lock().leased.len()
    }

    /// Returns the lease details for `port` if it is currently out.
    pub fn lease_info(&self, port: u16) -> Option<LeaseInfo> {
        self.inner.lock().leased.get(&port).copied()
    }
}

/// An outstanding claim on a passive port. Dropping it releases the port.
pub struct PortLease {
    port: u16,
    info: LeaseInfo,
    pool: Arc<PoolInner>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn holder(&self) -> u64 {
        self.info.holder
    }

    pub fn acquired_at(&self) -> Instant {
        self.info.acquired_at
    }
}

impl std::fmt::Debug for PortLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLease")
            .field("port", &self.port)
            .field("holder", &self.info.holder)
            .finish()
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.pool.release_ticket(self.port, self.info.ticket);
    }
}
