//! Prometheus Metrics Definitions
//!
//! This module defines all Prometheus metrics exposed by the burp exporter and
//! fills them from a [`Snapshot`].
//!
//! # Metric Categories
//!
//! ## Exporter Health
//! - `burp_up`, `burp_last_contact`
//! - `burp_contact_attempts_total`, `burp_parse_errors_total`
//! - `burp_server_info{version}`
//!
//! ## Server Statistics
//! - `burp_clients` - number of clients known to the server
//!
//! ## Clients
//! - Most recent completed backup (number and timestamp)
//! - Presence of logs and of an in-progress backup
//! - Run status as a state set (`idle`/`running`)
//!
//! Every series carries a constant `server` label naming the burp server.
//! Client metrics add a `name` label and, when `group_by_label` is configured,
//! an extra label holding the client's value for that key.
//!
//! A fresh registry is built for every scrape so concurrent scrapes never share
//! mutable metric state. All metrics use the `burp_` namespace prefix.

use crate::burp::{ClientRecord, RunStatus};
use crate::snapshot::Snapshot;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

/// Label value used when a client lacks the grouping label
pub const LABEL_DEFAULT: &str = "--unknown--";

const NAMESPACE: &str = "burp";

/// Constant label naming the burp server on every series
pub const SERVER_LABEL: &str = "server";

/// Restricts client metrics to clients carrying `name=value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    pub name: String,
    pub value: String,
}

impl LabelFilter {
    fn matches(&self, client: &ClientRecord) -> bool {
        client.label_value(&self.name) == Some(self.value.as_str())
    }
}

/// Metrics collector for one burp server
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Registry,
    group_by_label: Option<String>,

    // Exporter health
    pub up: Gauge,
    pub last_contact: Gauge,
    pub contact_attempts: IntCounter,
    pub parse_errors: IntCounter,
    pub server_info: IntGaugeVec,

    // Server statistics
    pub clients: IntGauge,

    // Client metrics
    pub client_backup_num: IntGaugeVec,
    pub client_backup_timestamp: IntGaugeVec,
    pub client_backup_has_logs: IntGaugeVec,
    pub client_backup_has_in_progress: IntGaugeVec,
    pub client_run_status: IntGaugeVec,
}

impl MetricsCollector {
    pub fn new(server: &str, group_by_label: Option<&str>) -> anyhow::Result<Self> {
        let registry = Registry::new();
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(NAMESPACE)
                .const_label(SERVER_LABEL, server)
        };

        let mut client_labels = vec!["name"];
        let mut status_labels = vec!["name", "run_status"];
        if let Some(label) = group_by_label {
            client_labels.push(label);
            status_labels.push(label);
        }

        let up = Gauge::with_opts(opts(
            "up",
            "Shows if the connection to the server is up (1=up, 0=down)",
        ))?;

        let last_contact = Gauge::with_opts(opts(
            "last_contact",
            "Time when the burp server was last contacted successfully",
        ))?;

        let contact_attempts = IntCounter::with_opts(opts(
            "contact_attempts_total",
            "Amount of times it was tried to contact the server",
        ))?;

        let parse_errors = IntCounter::with_opts(opts(
            "parse_errors_total",
            "Amount of times parsing the server response failed",
        ))?;

        let server_info = IntGaugeVec::new(
            opts("server_info", "Version reported by the burp server"),
            &["version"],
        )?;

        let clients = IntGauge::with_opts(opts("clients", "Number of clients known to the server"))?;

        let client_backup_num = IntGaugeVec::new(
            opts(
                "client_backup_num",
                "Number of the most recent completed backup for a client",
            ),
            &client_labels,
        )?;

        let client_backup_timestamp = IntGaugeVec::new(
            opts(
                "client_backup_timestamp",
                "Timestamp of the most recent completed backup",
            ),
            &client_labels,
        )?;

        let client_backup_has_logs = IntGaugeVec::new(
            opts(
                "client_backup_has_logs",
                "Presence of logs for the most recent backup",
            ),
            &client_labels,
        )?;

        let client_backup_has_in_progress = IntGaugeVec::new(
            opts(
                "client_backup_has_in_progress",
                "Indicates whether a backup with flag \"working\" is present",
            ),
            &client_labels,
        )?;

        let client_run_status = IntGaugeVec::new(
            opts("client_run_status", "Current run status of the client"),
            &status_labels,
        )?;

        // Register all metrics
        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(last_contact.clone()))?;
        registry.register(Box::new(contact_attempts.clone()))?;
        registry.register(Box::new(parse_errors.clone()))?;
        registry.register(Box::new(server_info.clone()))?;
        registry.register(Box::new(clients.clone()))?;
        registry.register(Box::new(client_backup_num.clone()))?;
        registry.register(Box::new(client_backup_timestamp.clone()))?;
        registry.register(Box::new(client_backup_has_logs.clone()))?;
        registry.register(Box::new(client_backup_has_in_progress.clone()))?;
        registry.register(Box::new(client_run_status.clone()))?;

        Ok(Self {
            registry,
            group_by_label: group_by_label.map(str::to_owned),
            up,
            last_contact,
            contact_attempts,
            parse_errors,
            server_info,
            clients,
            client_backup_num,
            client_backup_timestamp,
            client_backup_has_logs,
            client_backup_has_in_progress,
            client_run_status,
        })
    }

    /// Fills all metrics from `snapshot`. With a filter, only matching clients
    /// get per-client series. Counters are added to, so call this once per
    /// collector.
    pub fn observe(&self, snapshot: &Snapshot, filter: Option<&LabelFilter>) {
        let health = &snapshot.health;
        self.up.set(if health.up { 1.0 } else { 0.0 });
        self.last_contact.set(health.last_contact_seconds());
        self.contact_attempts.inc_by(health.contact_attempts);
        self.parse_errors.inc_by(health.parse_errors);
        if let Some(version) = &snapshot.server_version {
            self.server_info.with_label_values(&[version.as_str()]).set(1);
        }
        self.clients.set(snapshot.clients.len() as i64);

        for client in snapshot.clients.values() {
            if filter.is_some_and(|f| !f.matches(client)) {
                continue;
            }
            self.observe_client(client);
        }
    }

    fn observe_client(&self, client: &ClientRecord) {
        let group = self
            .group_by_label
            .as_deref()
            .map(|key| client.label_value(key).unwrap_or(LABEL_DEFAULT));

        let mut labels = vec![client.name.as_str()];
        labels.extend(group);

        if let Some(backup) = client.latest_completed() {
            self.client_backup_num
                .with_label_values(labels.as_slice())
                .set(backup.number as i64);
            self.client_backup_timestamp
                .with_label_values(labels.as_slice())
                .set(backup.timestamp);
        }
        let has_logs = client.latest_backup().is_some_and(|b| b.has_logs);
        self.client_backup_has_logs
            .with_label_values(labels.as_slice())
            .set(has_logs as i64);
        self.client_backup_has_in_progress
            .with_label_values(labels.as_slice())
            .set(client.in_progress().is_some() as i64);

        for status in [RunStatus::Idle, RunStatus::Running] {
            let mut status_labels = vec![client.name.as_str(), status.as_str()];
            status_labels.extend(group);
            self.client_run_status
                .with_label_values(status_labels.as_slice())
                .set((client.run_status == status) as i64);
        }
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Builds a collector for one scrape and renders `snapshot` through it.
pub fn render_snapshot(
    snapshot: &Snapshot,
    server: &str,
    group_by_label: Option<&str>,
    filter: Option<&LabelFilter>,
) -> anyhow::Result<String> {
    let metrics = MetricsCollector::new(server, group_by_label)?;
    metrics.observe(snapshot, filter);
    metrics.render()
}
