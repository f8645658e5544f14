//! Status dump parser tests

use burp_exporter::burp::{parse, RunStatus};
use burp_exporter::error::ExporterError;

const DATA_3C: &str = r#"{"clients":[{"name":"asdf","labels":["label1","label2"],"run_status":"idle","protocol":1,"backups":[]},{"name":"burp","labels":["team=cs","test"],"run_status":"idle","protocol":1,"backups":[{"number":4,"timestamp":1567146136,"flags":["current","manifest"],"logs":{"list":["backup","backup_stats"]}}]},{"name":"testclient","run_status":"idle","protocol":1,"backups":[]}]}"#;

#[test]
fn test_garbage_lines_are_soft_errors() {
    let raw = "backup\tburp\t1\t1567000001\tlogs\n\
               status\tburp\trunning\n\
               this is not a status line\n\
               backup\tburp\tnot-a-number\t1567000001\n\
               status\tburp\tconfused\n";

    let parsed = parse(raw).unwrap();

    assert_eq!(parsed.clients.len(), 1);
    assert_eq!(parsed.soft_errors, 3);
    assert_eq!(parsed.recognized, 2);
    let burp = &parsed.clients["burp"];
    assert_eq!(burp.run_status, RunStatus::Running);
    assert_eq!(burp.latest_backup().unwrap().number, 1);
    assert!(burp.latest_backup().unwrap().has_logs);
}

#[test]
fn test_backups_are_ordered_by_number() {
    let raw = "backup\tburp\t4\t1567000004\n\
               backup\tburp\t3\t1567000003\n";

    let parsed = parse(raw).unwrap();

    let numbers: Vec<u64> = parsed.clients["burp"].backups.iter().map(|b| b.number).collect();
    assert_eq!(numbers, vec![3, 4]);
    assert_eq!(parsed.clients["burp"].latest_backup().unwrap().number, 4);
}

#[test]
fn test_repeated_backup_number_replaces_earlier_line() {
    let raw = "backup\tburp\t2\t100\tworking\n\
               backup\tburp\t2\t200\tlogs\n";

    let parsed = parse(raw).unwrap();

    let burp = &parsed.clients["burp"];
    assert_eq!(burp.backups.len(), 1);
    assert_eq!(burp.backups[0].timestamp, 200);
    assert!(!burp.backups[0].in_progress);
    assert!(burp.in_progress().is_none());
}

#[test]
fn test_client_line_with_labels() {
    let parsed = parse("client\tburp\tteam=cs,test\nclient\tasdf\n").unwrap();

    assert_eq!(parsed.clients.len(), 2);
    assert_eq!(parsed.clients["burp"].labels, vec!["team=cs", "test"]);
    assert_eq!(parsed.clients["burp"].label_value("team"), Some("cs"));
    assert!(parsed.clients["asdf"].labels.is_empty());
    assert_eq!(parsed.clients["asdf"].run_status, RunStatus::Idle);
    assert!(parsed.clients["asdf"].backups.is_empty());
}

#[test]
fn test_crlf_and_blank_lines() {
    let parsed = parse("client\tburp\r\n\r\n\nstatus\tburp\tIDLE\r\n").unwrap();

    assert_eq!(parsed.soft_errors, 0);
    assert_eq!(parsed.clients["burp"].run_status, RunStatus::Idle);
}

#[test]
fn test_json_document() {
    let parsed = parse(DATA_3C).unwrap();

    assert_eq!(parsed.clients.len(), 3);
    assert_eq!(parsed.soft_errors, 0);

    let burp = &parsed.clients["burp"];
    assert_eq!(burp.labels, vec!["team=cs", "test"]);
    let latest = burp.latest_backup().unwrap();
    assert_eq!(latest.number, 4);
    assert_eq!(latest.timestamp, 1567146136);
    assert!(latest.has_logs);
    assert!(!latest.in_progress);

    assert!(parsed.clients["testclient"].labels.is_empty());
}

#[test]
fn test_json_document_with_bad_entry() {
    let raw = r#"{"clients":[{"name":"asdf","run_status":"idle"},{"name":"broken"},{"name":"burp","run_status":"sleeping"}]}"#;

    let parsed = parse(raw).unwrap();

    assert_eq!(parsed.clients.len(), 2);
    assert!(parsed.clients.contains_key("asdf"));
    assert!(!parsed.clients.contains_key("broken"));
    assert_eq!(parsed.clients["burp"].run_status, RunStatus::Idle);
    assert_eq!(parsed.soft_errors, 2);
}

#[test]
fn test_unknown_run_status_keeps_client_and_backups() {
    let raw = r#"{"clients":[{"name":"a","run_status":"idle","backups":[]},{"name":"b","run_status":"client crashed","backups":[{"number":7,"timestamp":1567000007,"flags":["current"]}]}]}"#;

    let parsed = parse(raw).unwrap();

    assert_eq!(parsed.clients.len(), 2);
    assert_eq!(parsed.soft_errors, 1);
    let b = &parsed.clients["b"];
    assert_eq!(b.run_status, RunStatus::Idle);
    assert_eq!(b.latest_backup().unwrap().number, 7);
}

#[test]
fn test_pretty_printed_json_document() {
    let value: serde_json::Value = serde_json::from_str(DATA_3C).unwrap();
    let pretty = serde_json::to_string_pretty(&value).unwrap();
    assert!(pretty.lines().count() > 1);

    let parsed = parse(&pretty).unwrap();

    assert_eq!(parsed.clients.len(), 3);
    assert_eq!(parsed.soft_errors, 0);
    assert_eq!(parsed.clients["burp"].latest_backup().unwrap().number, 4);
}

#[test]
fn test_truncated_pretty_document_is_parse_error() {
    let value: serde_json::Value = serde_json::from_str(DATA_3C).unwrap();
    let pretty = serde_json::to_string_pretty(&value).unwrap();
    let truncated = &pretty[..pretty.len() / 2];

    assert!(matches!(parse(truncated), Err(ExporterError::Parse(_))));
}

#[test]
fn test_mixed_document_and_lines() {
    let raw = format!("{}\nstatus\ttestclient\trunning\n", DATA_3C);

    let parsed = parse(&raw).unwrap();

    assert_eq!(parsed.clients.len(), 3);
    assert_eq!(parsed.clients["testclient"].run_status, RunStatus::Running);
}

#[test]
fn test_empty_input_is_parse_error() {
    assert!(matches!(parse(""), Err(ExporterError::Parse(_))));
    assert!(matches!(parse(" \n\n"), Err(ExporterError::Parse(_))));
}

#[test]
fn test_only_garbage_is_parse_error() {
    let result = parse("hello\nworld\n{not json\n");
    assert!(matches!(result, Err(ExporterError::Parse(_))));
}

#[test]
fn test_latest_completed_skips_working_backup() {
    let raw = "backup\tburp\t3\t1567000003\tlogs\n\
               backup\tburp\t4\t1567000004\tworking\n";

    let parsed = parse(raw).unwrap();

    let burp = &parsed.clients["burp"];
    assert_eq!(burp.latest_completed().unwrap().number, 3);
    assert_eq!(burp.in_progress().unwrap().number, 4);
}
