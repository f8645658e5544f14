//! Burp Backup Server Prometheus Exporter
//!
//! A Prometheus metrics exporter for the [burp](https://burp.grke.org/) backup
//! server.
//!
//! # Overview
//!
//! The exporter behaves like a regular burp client: it connects to the server's
//! status port over mutual TLS using an existing client certificate, logs in with
//! the client's name and password, and requests the status of all clients. The
//! dump is parsed into per-client backup state and exposed in Prometheus format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    mutual TLS     ┌────────────────┐
//! │    burp     │ ◄───────────────► │    Exporter    │
//! │   server    │   framed text     │                │
//! └─────────────┘                   │  ┌──────────┐  │      HTTP      ┌────────────┐
//!                                   │  │  Poller  │  │ ◄────────────► │ Prometheus │
//!                                   │  └────┬─────┘  │   /metrics     └────────────┘
//!                                   │  ┌────▼─────┐  │
//!                                   │  │ Snapshot │  │
//!                                   │  └──────────┘  │
//!                                   └────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`burp`] - Transport, framing, handshake and status parsing
//! - [`snapshot`] - Latest parsed state and connection health
//! - [`poller`] - Poll loop driving one cycle per interval
//! - [`metrics`] - Prometheus metric definitions
//! - [`server`] - HTTP server and wiring
//! - [`notify`] - Init system readiness notification
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use burp_exporter::{config::Config, notify, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     server::start(config, notify::from_env().into()).await?;
//!     Ok(())
//! }
//! ```

pub mod burp;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod poller;
pub mod server;
pub mod snapshot;
