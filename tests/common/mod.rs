//! Scripted in-memory burp server shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use burp_exporter::burp::{BurpCodec, Connector, Session};
use burp_exporter::config::BurpConfig;
use burp_exporter::error::{ExporterError, Result};
use futures_util::StreamExt;
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

pub const CLIENT_NAME: &str = "burp";
pub const PASSWORD: &str = "abcdefgh";

/// Raw server frame as burp sends it (no trailing NUL)
pub fn frame(kind: char, payload: &str) -> Vec<u8> {
    format!("{}{:04X}{}", kind, payload.len(), payload).into_bytes()
}

/// Status chunks followed by the `c0001\n` terminator
pub fn status_frames(chunks: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(frame('c', chunk));
    }
    out.extend(frame('c', "\n"));
    out
}

pub fn test_config() -> BurpConfig {
    BurpConfig {
        host: "127.0.0.1".to_string(),
        port: 4972,
        server_name: "burpserver".to_string(),
        client_name: CLIENT_NAME.to_string(),
        password: SecretString::from(PASSWORD),
        client_version: "2.1.28".to_string(),
        ca_cert: "ca.pem".into(),
        cert: "client.pem".into(),
        key: "client.key".into(),
        timeout_seconds: 5,
        connect_timeout_seconds: 5,
        exchange_timeout_seconds: 5,
    }
}

/// How the fake server answers one session
#[derive(Debug, Clone)]
pub struct Script {
    pub whoareyou: Vec<u8>,
    pub password_reply: Vec<u8>,
    pub extra_comms_reply: String,
    /// Raw bytes answering `j:pretty-print-off`
    pub pretty_print_reply: Vec<u8>,
    /// Raw bytes written after the `c:` request; the server then hangs up
    pub status: Vec<u8>,
}

impl Script {
    pub fn with_status(status: Vec<u8>) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_dump(text: &str) -> Self {
        Self::with_status(status_frames(&[text]))
    }
}

impl Default for Script {
    fn default() -> Self {
        Self {
            whoareyou: frame('c', "whoareyou:2.1.28"),
            password_reply: frame('c', "ok"),
            extra_comms_reply: "extra_comms_begin ok".to_string(),
            pretty_print_reply: [frame('c', "{}"), frame('c', "\n")].concat(),
            status: status_frames(&["client\tasdf\n"]),
        }
    }
}

/// Answers requests until the status dump is sent; returns every command received.
pub async fn serve(stream: DuplexStream, script: Script) -> Vec<String> {
    let mut framed = Framed::new(stream, BurpCodec::new());
    let mut received = Vec::new();
    let mut unnamed = 0;

    while let Some(Ok(request)) = framed.next().await {
        let text = request.text().into_owned();
        received.push(text.clone());

        let reply = match text.as_str() {
            t if t.starts_with("hello:") => script.whoareyou.clone(),
            "nocsr" => frame('c', "nocsr ok"),
            "extra_comms_begin" => frame('c', &script.extra_comms_reply),
            "extra_comms_end" => frame('c', "extra_comms_end ok"),
            "j:pretty-print-off" => script.pretty_print_reply.clone(),
            "counters_json ok" | "uname=Linux" | "msg" => continue,
            t if t.starts_with("c:") => {
                let stream = framed.get_mut();
                let _ = stream.write_all(&script.status).await;
                let _ = stream.flush().await;
                break;
            }
            _ => {
                unnamed += 1;
                if unnamed == 1 {
                    frame('c', "okpassword")
                } else {
                    script.password_reply.clone()
                }
            }
        };

        let stream = framed.get_mut();
        if stream.write_all(&reply).await.is_err() {
            break;
        }
    }
    received
}

/// Opens a session to a fresh fake server running `script`.
pub fn scripted_session(script: Script) -> (Session<DuplexStream>, tokio::task::JoinHandle<Vec<String>>) {
    let (client, server) = duplex(64 * 1024);
    let handle = tokio::spawn(serve(server, script));
    (Session::new(client, "burpserver", Duration::from_secs(5)), handle)
}

pub enum Attempt {
    Refuse,
    Serve(Script),
    /// Accepts the connection and never answers
    Silent,
}

/// Connector that plays back a queue of attempts; refuses once it runs dry.
#[derive(Clone)]
pub struct ScriptedConnector {
    attempts: Arc<Mutex<VecDeque<Attempt>>>,
    connects: Arc<AtomicUsize>,
    held: Arc<Mutex<Vec<DuplexStream>>>,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: Arc::new(Mutex::new(attempts.into())),
            connects: Arc::new(AtomicUsize::new(0)),
            held: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> Result<Session<DuplexStream>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Serve(script)) => Ok(scripted_session(script).0),
            Some(Attempt::Silent) => {
                let (client, server) = duplex(1024);
                self.held.lock().unwrap().push(server);
                Ok(Session::new(client, "burpserver", Duration::from_secs(60)))
            }
            _ => Err(ExporterError::Connect("connection refused".to_string())),
        }
    }
}
