//! Burp Status Monitor Client
//!
//! Drives one request/response exchange over an open [`Session`]:
//!
//! 1. **Handshake**: `hello` / `whoareyou`, client name, password, `nocsr`,
//!    the `extra_comms` negotiation and `j:pretty-print-off`. This is the same
//!    conversation a regular burp client has, so the exporter reuses a
//!    client's certificate and name.
//! 2. **Status**: a `c:` request answered by one or more data frames and a
//!    terminator frame. Payloads are concatenated in arrival order.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use burp_exporter::burp::{request_status, Connector, StatusScope, TlsTransport};
//! # use burp_exporter::config::Config;
//!
//! # async fn example(config: Config) -> anyhow::Result<()> {
//! let burp = Arc::new(config.burp);
//! let transport = TlsTransport::from_config(burp.clone())?;
//! let mut session = transport.connect().await?;
//! let dump = request_status(&mut session, &burp, StatusScope::AllClients).await?;
//! session.close().await;
//! println!("{}", dump.text);
//! # Ok(())
//! # }
//! ```

use crate::burp::codec::{Frame, FrameKind};
use crate::burp::transport::Session;
use crate::config::BurpConfig;
use crate::error::{ExporterError, Result};
use secrecy::ExposeSecret;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Which clients the status request covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusScope {
    AllClients,
    Client(String),
}

impl StatusScope {
    fn command(&self) -> String {
        match self {
            StatusScope::AllClients => "c:".to_string(),
            StatusScope::Client(name) => format!("c:{}", name),
        }
    }
}

/// Raw result of one status exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDump {
    /// Version announced in `whoareyou:<version>`, when present
    pub server_version: Option<String>,
    pub text: String,
}

/// Authenticates and fetches the status dump, bounded by the exchange deadline.
pub async fn request_status<S>(
    session: &mut Session<S>,
    config: &BurpConfig,
    scope: StatusScope,
) -> Result<StatusDump>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    timeout(config.exchange_timeout(), async {
        let server_version = handshake(session, config).await?;
        let text = fetch_status(session, &scope).await?;
        Ok::<_, ExporterError>(StatusDump {
            server_version,
            text,
        })
    })
    .await
    .map_err(|_| ExporterError::Timeout("status exchange"))?
}

/// Reads the next frame, logging and skipping warnings.
async fn next_reply<S>(session: &mut Session<S>) -> Result<Frame>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = session.receive().await?;
        match frame.kind {
            FrameKind::Warning => warn!("Received warning from server: {}", frame.text()),
            _ => return Ok(frame),
        }
    }
}

/// Expects a `c` reply containing `expected`.
async fn expect_reply<S>(session: &mut Session<S>, expected: &str) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = next_reply(session).await?;
    let text = frame.text().into_owned();
    match frame.kind {
        FrameKind::Command if text.contains(expected) => Ok(text),
        FrameKind::Error => Err(ExporterError::ServerError(text)),
        _ => Err(ExporterError::Handshake(format!(
            "expected {:?}, got {:?}",
            expected, text
        ))),
    }
}

async fn handshake<S>(session: &mut Session<S>, config: &BurpConfig) -> Result<Option<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session
        .send(&format!("hello:{}", config.client_version))
        .await?;
    let reply = expect_reply(session, "whoareyou").await?;
    let server_version = reply
        .rsplit_once(':')
        .map(|(_, version)| version.trim().to_string())
        .filter(|version| !version.is_empty());
    debug!("Server version: {:?}", server_version);

    session.send(&config.client_name).await?;
    expect_reply(session, "okpassword").await?;

    session.send(config.password.expose_secret()).await?;
    let frame = next_reply(session).await?;
    let text = frame.text();
    if frame.kind != FrameKind::Command || !text.contains("ok") {
        return Err(ExporterError::Auth(format!(
            "server rejected {:?}: {}",
            config.client_name, text
        )));
    }

    session.send("nocsr").await?;
    expect_reply(session, "nocsr ok").await?;

    session.send("extra_comms_begin").await?;
    let features = expect_reply(session, "extra_comms_begin ok").await?;
    if features.contains(":counters_json:") {
        session.send("counters_json ok").await?;
    }
    if features.contains(":uname:") {
        session.send("uname=Linux").await?;
    }
    if features.contains(":msg:") {
        session.send("msg").await?;
    }

    session.send("extra_comms_end").await?;
    expect_reply(session, "extra_comms_end ok").await?;

    // Compact JSON also makes the server end every message with a "\n" frame
    session.send("j:pretty-print-off").await?;
    let reply = next_reply(session).await?;
    if reply.kind == FrameKind::Error {
        return Err(ExporterError::ServerError(reply.text().into_owned()));
    }
    if !reply.is_terminator() {
        let end = next_reply(session).await?;
        if !end.is_terminator() {
            debug!("Unexpected frame after pretty-print-off: {:?}", end.text());
        }
    }

    info!("Logged in to burp server as {}", config.client_name);
    Ok(server_version)
}

async fn fetch_status<S>(session: &mut Session<S>, scope: &StatusScope) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session.send(&scope.command()).await?;

    let mut body = Vec::new();
    let mut chunks = 0usize;
    loop {
        let frame = next_reply(session).await?;
        match frame.kind {
            FrameKind::Error => return Err(ExporterError::ServerError(frame.text().into_owned())),
            _ if frame.is_terminator() => break,
            _ => {
                body.extend_from_slice(&frame.payload);
                chunks += 1;
            }
        }
    }
    debug!("Status dump: {} bytes in {} frames", body.len(), chunks);

    Ok(match String::from_utf8(body) {
        Ok(text) => text,
        Err(e) => {
            warn!("Status dump is not valid UTF-8, replacing invalid sequences");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}
