//! Mutual-TLS Transport
//!
//! This module owns the encrypted socket to the burp server. A [`Session`] lives
//! for exactly one poll cycle: it is opened by a [`Connector`], used for one
//! handshake and status exchange, then closed.
//!
//! The peer certificate chain is verified by native-tls against the configured
//! CA only (built-in roots are disabled). The peer identity is checked
//! separately against `server_name` so that a mismatch surfaces as
//! [`ExporterError::IdentityMismatch`] before any protocol bytes are exchanged.

use crate::burp::codec::{BurpCodec, Frame};
use crate::config::BurpConfig;
use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsStream;
use tokio_util::codec::Framed;
use tracing::{debug, info};

/// Opens sessions to one burp server. No retry logic lives here.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self) -> Result<Session<Self::Stream>>;
}

/// A live, authenticated-at-TLS-level connection
pub struct Session<S> {
    framed: Framed<S, BurpCodec>,
    peer: String,
    io_timeout: Duration,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: impl Into<String>, io_timeout: Duration) -> Self {
        Self::with_codec(stream, BurpCodec::new(), peer, io_timeout)
    }

    pub fn with_codec(
        stream: S,
        codec: BurpCodec,
        peer: impl Into<String>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            framed: Framed::new(stream, codec),
            peer: peer.into(),
            io_timeout,
        }
    }

    /// Verified identity of the peer
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send(&mut self, payload: &str) -> Result<()> {
        debug!("Sending {} byte command", payload.len());
        timeout(
            self.io_timeout,
            self.framed.send(Frame::command(payload.to_owned())),
        )
        .await
        .map_err(|_| ExporterError::Timeout("send"))?
    }

    pub async fn receive(&mut self) -> Result<Frame> {
        match timeout(self.io_timeout, self.framed.next()).await {
            Err(_) => Err(ExporterError::Timeout("receive")),
            Ok(Some(frame)) => {
                let frame = frame?;
                debug!("Received {:?} frame, {} bytes", frame.kind, frame.payload.len());
                Ok(frame)
            }
            Ok(None) => Err(ExporterError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            ))),
        }
    }

    /// Shuts the stream down. Errors are swallowed; dropping also closes.
    pub async fn close(self) {
        let mut stream = self.framed.into_inner();
        match timeout(self.io_timeout, stream.shutdown()).await {
            Ok(Ok(())) => debug!("Session to {} closed", self.peer),
            Ok(Err(e)) => debug!("Ignoring error while closing session: {}", e),
            Err(_) => debug!("Timed out closing session, dropping it"),
        }
    }
}

/// Connects to the burp server with the client certificate from the config
pub struct TlsTransport {
    config: Arc<BurpConfig>,
    connector: tokio_native_tls::TlsConnector,
}

fn read_material(kind: &str, path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        ExporterError::Config(format!("cannot read {} {}: {}", kind, path.display(), e))
    })
}

impl TlsTransport {
    /// Loads trust and key material. Failures here are configuration errors.
    pub fn from_config(config: Arc<BurpConfig>) -> Result<Self> {
        let ca_pem = read_material("CA certificate", &config.ca_cert)?;
        let cert_pem = read_material("client certificate", &config.cert)?;
        let key_pem = read_material("client key", &config.key)?;

        let ca = native_tls::Certificate::from_pem(&ca_pem)
            .map_err(|e| ExporterError::Config(format!("invalid CA certificate: {}", e)))?;
        // native-tls expects the key in PKCS#8 PEM form
        let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem)
            .map_err(|e| ExporterError::Config(format!("invalid client certificate/key: {}", e)))?;

        let connector = native_tls::TlsConnector::builder()
            .add_root_certificate(ca)
            .disable_built_in_roots(true)
            .identity(identity)
            .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
            // Chain is still verified; the name is checked in verify_identity
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| ExporterError::Config(format!("cannot build TLS connector: {}", e)))?;

        Ok(Self {
            config,
            connector: connector.into(),
        })
    }
}

#[async_trait]
impl Connector for TlsTransport {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self) -> Result<Session<Self::Stream>> {
        let config = &self.config;
        let connect_timeout = config.connect_timeout();
        debug!("Connecting to {}:{}", config.host, config.port);

        let tcp = timeout(
            connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| ExporterError::Timeout("connect"))?
        .map_err(|e| {
            ExporterError::Connect(format!("{}:{}: {}", config.host, config.port, e))
        })?;

        let tls = timeout(
            connect_timeout,
            self.connector.connect(&config.server_name, tcp),
        )
        .await
        .map_err(|_| ExporterError::Timeout("TLS handshake"))?
        .map_err(|e| ExporterError::Connect(format!("TLS handshake failed: {}", e)))?;

        let der = tls
            .get_ref()
            .peer_certificate()
            .map_err(|e| ExporterError::Connect(format!("cannot read peer certificate: {}", e)))?
            .ok_or_else(|| ExporterError::IdentityMismatch {
                expected: config.server_name.clone(),
                found: "<no certificate>".to_string(),
            })?
            .to_der()
            .map_err(|e| ExporterError::Connect(format!("cannot encode peer certificate: {}", e)))?;

        let names = certificate_names(&der)?;
        verify_identity(&names, &config.server_name)?;

        info!(
            "TLS session established with {} ({}:{})",
            config.server_name, config.host, config.port
        );
        Ok(Session::new(tls, config.server_name.clone(), config.io_timeout()))
    }
}

/// Subject common names followed by DNS subject alternative names
fn certificate_names(der: &[u8]) -> Result<Vec<String>> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| ExporterError::Connect(format!("cannot parse peer certificate: {}", e)))?;

    let mut names: Vec<String> = cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .map(str::to_owned)
        .collect();

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let x509_parser::extensions::GeneralName::DNSName(dns) = name {
                names.push((*dns).to_owned());
            }
        }
    }
    Ok(names)
}

/// Exact, case-sensitive match against any presented name.
fn verify_identity(names: &[String], expected: &str) -> Result<()> {
    if names.iter().any(|name| name == expected) {
        return Ok(());
    }
    Err(ExporterError::IdentityMismatch {
        expected: expected.to_string(),
        found: if names.is_empty() {
            "<no names>".to_string()
        } else {
            names.join(", ")
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_matches_exactly() {
        let names = vec!["burpserver".to_string()];
        assert!(verify_identity(&names, "burpserver").is_ok());
    }

    #[test]
    fn identity_is_case_sensitive() {
        let names = vec!["BurpServer".to_string()];
        match verify_identity(&names, "burpserver") {
            Err(ExporterError::IdentityMismatch { expected, found }) => {
                assert_eq!(expected, "burpserver");
                assert_eq!(found, "BurpServer");
            }
            other => panic!("expected identity mismatch, got {:?}", other),
        }
    }

    #[test]
    fn identity_accepts_alternative_name() {
        let names = vec!["other".to_string(), "burpserver".to_string()];
        assert!(verify_identity(&names, "burpserver").is_ok());
    }

    #[test]
    fn missing_key_material_is_config_error() {
        let config = BurpConfig {
            host: "127.0.0.1".to_string(),
            port: 4972,
            server_name: "burpserver".to_string(),
            client_name: "burp".to_string(),
            password: secrecy::SecretString::from("secret"),
            client_version: "2.1.28".to_string(),
            ca_cert: "/nonexistent/ca.pem".into(),
            cert: "/nonexistent/client.pem".into(),
            key: "/nonexistent/client.key".into(),
            timeout_seconds: 1,
            connect_timeout_seconds: 1,
            exchange_timeout_seconds: 1,
        };
        assert!(matches!(
            TlsTransport::from_config(Arc::new(config)),
            Err(ExporterError::Config(_))
        ));
    }
}
