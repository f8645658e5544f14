//! Status Dump Parser
//!
//! The dump is line oriented, one fact per line, fields separated by TAB.
//! Each line is classified by its first field and decoded on its own:
//!
//! ```text
//! client  <name>  [<label>,<label>...]
//! backup  <name>  <number>  <unix timestamp>  [<flag>,<flag>...]
//! status  <name>  idle|running
//! {"clients":[...]}
//! ```
//!
//! The last shape is the compact JSON client list of burp 2.x monitors. A dump
//! that is one JSON document spread over several lines is decoded as a whole.
//!
//! Unknown or malformed lines are skipped and counted as soft errors so one bad
//! line never discards an otherwise good dump. Only a dump without a single
//! recognizable line is an error.

use crate::burp::types::{BackupRecord, ClientInfo, ClientMap, ClientRecord, RunStatus, StatusDocument};
use crate::error::{ExporterError, Result};
use tracing::{debug, warn};

const FIELD_SEPARATOR: char = '\t';
const LIST_SEPARATOR: char = ',';

/// Outcome of a successful parse
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedStatus {
    pub clients: ClientMap,
    /// Lines that were decoded and applied
    pub recognized: usize,
    /// Lines (or JSON entries) that were skipped
    pub soft_errors: u64,
}

/// One classified line
#[derive(Debug)]
enum Line<'a> {
    Client {
        name: &'a str,
        labels: Vec<String>,
    },
    Backup {
        name: &'a str,
        backup: BackupRecord,
    },
    Status {
        name: &'a str,
        status: RunStatus,
    },
    Document(Vec<ClientInfoResult>),
}

type ClientInfoResult = std::result::Result<ClientInfo, String>;

fn split_list(field: Option<&str>) -> impl Iterator<Item = &str> {
    field
        .unwrap_or_default()
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

fn client_name(field: Option<&str>) -> std::result::Result<&str, String> {
    match field {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err("missing client name".to_string()),
    }
}

/// Classifies a line. `None` means an unknown shape; `Some(Err)` a known
/// shape with malformed fields.
fn classify(line: &str) -> Option<std::result::Result<Line<'_>, String>> {
    if line.starts_with('{') {
        return Some(
            decode_document(line)
                .map(Line::Document)
                .map_err(|e| format!("invalid JSON document: {}", e)),
        );
    }

    let mut fields = line.split(FIELD_SEPARATOR);
    let tag = fields.next()?;
    let rest: Vec<&str> = fields.collect();

    let decoded = match tag {
        "client" => {
            if rest.is_empty() || rest.len() > 2 {
                Err(format!("client line has {} fields", rest.len() + 1))
            } else {
                client_name(rest.first().copied()).map(|name| Line::Client {
                    name,
                    labels: split_list(rest.get(1).copied()).map(str::to_owned).collect(),
                })
            }
        }
        "backup" => {
            if rest.len() < 3 || rest.len() > 4 {
                Err(format!("backup line has {} fields", rest.len() + 1))
            } else {
                decode_backup(&rest)
            }
        }
        "status" => {
            if rest.len() != 2 {
                Err(format!("status line has {} fields", rest.len() + 1))
            } else {
                client_name(rest.first().copied()).and_then(|name| {
                    rest[1]
                        .parse::<RunStatus>()
                        .map(|status| Line::Status { name, status })
                })
            }
        }
        _ => return None,
    };
    Some(decoded)
}

fn decode_backup<'a>(fields: &[&'a str]) -> std::result::Result<Line<'a>, String> {
    let name = client_name(fields.first().copied())?;
    let number = fields[1]
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid backup number {:?}: {}", fields[1], e))?;
    let timestamp = fields[2]
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid timestamp {:?}: {}", fields[2], e))?;
    let backup = BackupRecord::from_flags(number, timestamp, split_list(fields.get(3).copied()));
    Ok(Line::Backup { name, backup })
}

fn decode_document(text: &str) -> Result<Vec<ClientInfoResult>> {
    let document: StatusDocument = serde_json::from_str(text)?;
    Ok(document
        .clients
        .into_iter()
        .map(|value| serde_json::from_value::<ClientInfo>(value).map_err(|e| e.to_string()))
        .collect())
}

fn entry<'m>(clients: &'m mut ClientMap, name: &str) -> &'m mut ClientRecord {
    clients
        .entry(name.to_string())
        .or_insert_with(|| ClientRecord::new(name))
}

impl ParsedStatus {
    fn apply(&mut self, line: Line<'_>) {
        match line {
            Line::Client { name, labels } => {
                let client = entry(&mut self.clients, name);
                if !labels.is_empty() {
                    client.labels = labels;
                }
                self.recognized += 1;
            }
            Line::Backup { name, backup } => {
                entry(&mut self.clients, name).upsert_backup(backup);
                self.recognized += 1;
            }
            Line::Status { name, status } => {
                entry(&mut self.clients, name).run_status = status;
                self.recognized += 1;
            }
            Line::Document(entries) => {
                for info in entries {
                    match info {
                        Ok(info) => self.apply_client_info(info),
                        Err(reason) => {
                            warn!("Skipping client entry: {}", reason);
                            self.soft_errors += 1;
                        }
                    }
                }
            }
        }
    }

    /// A run status outside idle/running leaves the default in place; the
    /// client and its backups are kept.
    fn apply_client_info(&mut self, info: ClientInfo) {
        let client = entry(&mut self.clients, &info.name);
        match info.run_status.parse::<RunStatus>() {
            Ok(status) => client.run_status = status,
            Err(reason) => {
                warn!("Client {}: {}", info.name, reason);
                self.soft_errors += 1;
            }
        }
        if let Some(labels) = info.labels {
            client.labels = labels;
        }
        for backup in info.backups {
            client.upsert_backup(backup.into_record());
        }
        self.recognized += 1;
    }
}

/// Parses a raw status dump into per-client records.
///
/// Fails only when the text is empty or no line could be recognized; that is
/// a broken exchange, not a server without clients.
pub fn parse(raw: &str) -> Result<ParsedStatus> {
    if raw.trim().is_empty() {
        return Err(ExporterError::Parse("empty status dump".to_string()));
    }

    let mut parsed = ParsedStatus::default();

    // A document spanning several lines (pretty printed JSON)
    if raw.trim_start().starts_with('{') {
        if let Ok(entries) = decode_document(raw.trim()) {
            parsed.apply(Line::Document(entries));
            return finish(parsed);
        }
    }

    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match classify(line) {
            Some(Ok(decoded)) => parsed.apply(decoded),
            Some(Err(reason)) => {
                warn!("Skipping malformed line {}: {}", idx + 1, reason);
                parsed.soft_errors += 1;
            }
            None => {
                debug!("Skipping unknown line {}: {:?}", idx + 1, line);
                parsed.soft_errors += 1;
            }
        }
    }

    finish(parsed)
}

fn finish(parsed: ParsedStatus) -> Result<ParsedStatus> {
    if parsed.recognized == 0 {
        return Err(ExporterError::Parse(format!(
            "no recognizable lines ({} skipped)",
            parsed.soft_errors
        )));
    }

    debug!(
        "Parsed {} clients from {} lines ({} skipped)",
        parsed.clients.len(),
        parsed.recognized,
        parsed.soft_errors
    );
    Ok(parsed)
}
