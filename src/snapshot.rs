//! Snapshot Store
//!
//! Holds the latest parsed client state together with connection health. The
//! poll loop is the only writer; scrape handlers read concurrently.
//!
//! A [`Snapshot`] is immutable. Writers build a new one and swap the pointer
//! under a write lock held only for the swap, so readers never see client data
//! from two different polls and never wait on network I/O.

use crate::burp::ClientMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Connection health, mutated only by the poll loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthState {
    /// Last successful contact; `None` until the first good poll
    pub last_contact: Option<SystemTime>,
    pub contact_attempts: u64,
    pub parse_errors: u64,
    pub up: bool,
}

impl HealthState {
    /// Records a successful contact; never moves `last_contact` backwards
    /// when the wall clock steps.
    pub fn record_contact(&mut self, at: SystemTime) {
        self.last_contact = Some(self.last_contact.map_or(at, |prev| prev.max(at)));
    }

    /// Last contact as UNIX seconds, 0 when unset
    pub fn last_contact_seconds(&self) -> f64 {
        self.last_contact
            .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Immutable view of all known client state at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub clients: Arc<ClientMap>,
    pub health: HealthState,
    pub server_version: Option<String>,
    /// When the client data was published; `None` for the initial snapshot
    pub published_at: Option<SystemTime>,
}

/// Cheap-to-clone handle to the current [`Snapshot`]
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always returns a fully formed snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Replaces client data and health in one swap.
    pub fn publish(
        &self,
        clients: ClientMap,
        health: HealthState,
        server_version: Option<String>,
    ) -> Arc<Snapshot> {
        let snapshot = Arc::new(Snapshot {
            clients: Arc::new(clients),
            health,
            server_version,
            published_at: Some(SystemTime::now()),
        });
        *self.current.write() = snapshot.clone();
        snapshot
    }

    /// Replaces health only; the previous client data stays current.
    pub fn update_health(&self, health: HealthState) -> Arc<Snapshot> {
        let mut guard = self.current.write();
        let snapshot = Arc::new(Snapshot {
            clients: guard.clients.clone(),
            health,
            server_version: guard.server_version.clone(),
            published_at: guard.published_at,
        });
        *guard = snapshot.clone();
        snapshot
    }
}
