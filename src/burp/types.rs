//! Burp Status Type Definitions
//!
//! Domain types produced by the status parser, plus the serde types for the
//! compact JSON client list that burp 2.x monitors emit.
//!
//! # Invariants
//!
//! - Backup numbers inside a [`ClientRecord`] are strictly increasing.
//! - At most one backup per client carries the in-progress (`working`) flag.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// All clients of one server, keyed (and ordered) by client name.
pub type ClientMap = BTreeMap<String, ClientRecord>;

/// Current run status of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    Running,
    #[default]
    Idle,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Idle => "idle",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "idle" => Ok(RunStatus::Idle),
            other => Err(format!("unknown run status {:?}", other)),
        }
    }
}

/// A single backup of a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Sequential number, monotonic per client
    pub number: u64,
    /// UNIX timestamp of completion (start time for a backup still working)
    pub timestamp: i64,
    pub has_logs: bool,
    /// Flag `working`: the backup is still in progress
    pub in_progress: bool,
}

impl BackupRecord {
    pub fn new(number: u64, timestamp: i64) -> Self {
        Self {
            number,
            timestamp,
            has_logs: false,
            in_progress: false,
        }
    }

    /// Builds a record from burp's flag words (`working`, `logs`, `current`, ...).
    pub fn from_flags<'a>(number: u64, timestamp: i64, flags: impl IntoIterator<Item = &'a str>) -> Self {
        let mut record = Self::new(number, timestamp);
        for flag in flags {
            match flag.trim() {
                "working" => record.in_progress = true,
                "logs" => record.has_logs = true,
                _ => {}
            }
        }
        record
    }
}

/// Backup state of one client as reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub name: String,
    /// Free-form labels, conventionally `key=value`
    pub labels: Vec<String>,
    /// Ordered by backup number, most recent last
    pub backups: Vec<BackupRecord>,
    pub run_status: RunStatus,
}

impl ClientRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
            backups: Vec::new(),
            run_status: RunStatus::default(),
        }
    }

    /// Inserts a backup keeping numbers strictly increasing.
    ///
    /// A repeated number replaces the earlier record. An in-progress backup
    /// clears the flag on every other backup of this client.
    pub fn upsert_backup(&mut self, backup: BackupRecord) {
        if backup.in_progress {
            for existing in &mut self.backups {
                existing.in_progress = false;
            }
        }
        match self.backups.binary_search_by_key(&backup.number, |b| b.number) {
            Ok(idx) => self.backups[idx] = backup,
            Err(idx) => self.backups.insert(idx, backup),
        }
    }

    pub fn latest_backup(&self) -> Option<&BackupRecord> {
        self.backups.last()
    }

    /// Most recent backup that is not in progress
    pub fn latest_completed(&self) -> Option<&BackupRecord> {
        self.backups.iter().rev().find(|b| !b.in_progress)
    }

    pub fn in_progress(&self) -> Option<&BackupRecord> {
        self.backups.iter().find(|b| b.in_progress)
    }

    /// Value of a `key=value` label, if the client carries one.
    pub fn label_value(&self, key: &str) -> Option<&str> {
        self.labels.iter().find_map(|label| {
            label
                .split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

/// Compact JSON status document (`{"clients":[...]}`)
#[derive(Debug, Deserialize)]
pub struct StatusDocument {
    pub clients: Vec<serde_json::Value>,
}

/// One entry of the JSON `clients` list
#[derive(Debug, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    pub run_status: String,
    #[serde(default)]
    pub protocol: Option<u8>,
    #[serde(default)]
    pub backups: Vec<BackupInfo>,
}

/// One entry of a client's JSON `backups` list
#[derive(Debug, Deserialize)]
pub struct BackupInfo {
    pub number: u64,
    pub timestamp: i64,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub logs: Option<BackupLogs>,
}

#[derive(Debug, Deserialize)]
pub struct BackupLogs {
    #[serde(default)]
    pub list: Vec<String>,
}

impl BackupInfo {
    pub fn into_record(self) -> BackupRecord {
        let mut record =
            BackupRecord::from_flags(self.number, self.timestamp, self.flags.iter().map(String::as_str));
        if self.logs.is_some_and(|logs| !logs.list.is_empty()) {
            record.has_logs = true;
        }
        record
    }
}
