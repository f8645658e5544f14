//! Poll Loop
//!
//! Runs one connect → authenticate → request → parse → publish cycle per tick.
//!
//! ```text
//! IDLE ──timer──► CONNECTING ──ok──► REQUESTING ──ok──► PARSING ──► SLEEPING ──► IDLE
//!                     │                  │                             ▲
//!                     └──────error───────┴─────────────────────────────┘
//! ```
//!
//! Every cycle opens a fresh session and closes it again, whatever the
//! outcome. The next cycle starts one full interval after the previous one
//! ended, so cycles never overlap and failures do not back off.
//!
//! # Health accounting
//!
//! - every cycle increments `contact_attempts`
//! - connect/exchange failure: `up = false`, client data untouched
//! - unparseable dump: `up = true`, `parse_errors += 1`, client data untouched
//! - success: `up = true`, `last_contact = now`, soft errors added to
//!   `parse_errors`, new snapshot published

use crate::burp::{parse, request_status, Connector, StatusScope};
use crate::config::BurpConfig;
use crate::error::ExporterError;
use crate::snapshot::{HealthState, SnapshotStore};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Connecting,
    Requesting,
    Parsing,
    Sleeping,
}

/// What one cycle produced
#[derive(Debug)]
pub enum CycleOutcome {
    Published { clients: usize, soft_errors: u64 },
    ContactFailed(ExporterError),
    Unparseable(ExporterError),
}

pub struct Poller<C> {
    connector: C,
    config: Arc<BurpConfig>,
    store: SnapshotStore,
    interval: Duration,
    health: HealthState,
    state: PollState,
}

impl<C: Connector> Poller<C> {
    pub fn new(
        connector: C,
        config: Arc<BurpConfig>,
        store: SnapshotStore,
        interval: Duration,
    ) -> Self {
        Self {
            connector,
            config,
            store,
            interval,
            health: HealthState::default(),
            state: PollState::Idle,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    fn transition(&mut self, next: PollState) {
        debug!("Poll state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs a single cycle and leaves the poller in `Sleeping`.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        self.health.contact_attempts += 1;

        self.transition(PollState::Connecting);
        let mut session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => return self.contact_failed(e),
        };

        self.transition(PollState::Requesting);
        let exchange = request_status(&mut session, &self.config, StatusScope::AllClients).await;
        session.close().await;
        let dump = match exchange {
            Ok(dump) => dump,
            Err(e) => return self.contact_failed(e),
        };

        self.transition(PollState::Parsing);
        let outcome = match parse(&dump.text) {
            Ok(parsed) => {
                self.health.up = true;
                self.health.record_contact(SystemTime::now());
                self.health.parse_errors += parsed.soft_errors;
                let clients = parsed.clients.len();
                self.store
                    .publish(parsed.clients, self.health.clone(), dump.server_version);
                info!(
                    "Published status of {} clients ({} lines skipped)",
                    clients, parsed.soft_errors
                );
                CycleOutcome::Published {
                    clients,
                    soft_errors: parsed.soft_errors,
                }
            }
            Err(e) => {
                warn!("Status dump could not be parsed: {}", e);
                // The exchange itself worked, so the server counts as up
                self.health.up = true;
                self.health.parse_errors += 1;
                self.store.update_health(self.health.clone());
                CycleOutcome::Unparseable(e)
            }
        };
        self.transition(PollState::Sleeping);
        outcome
    }

    fn contact_failed(&mut self, error: ExporterError) -> CycleOutcome {
        warn!("Poll of burp server failed: {}", error);
        self.health.up = false;
        self.store.update_health(self.health.clone());
        self.transition(PollState::Sleeping);
        CycleOutcome::ContactFailed(error)
    }

    /// Polls until `cancel` fires. In-flight network waits are abandoned on
    /// cancellation; dropping the session closes the socket.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Polling burp server every {:?}", self.interval);
        loop {
            self.transition(PollState::Idle);
            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested during poll, abandoning cycle");
                    break;
                }
                outcome = self.poll_once() => debug!("Cycle finished: {:?}", outcome),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Poll loop stopped");
    }
}
