use anyhow::{bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub burp: BurpConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Connection parameters for one burp server. Immutable for the process lifetime.
#[derive(Debug, Deserialize, Clone)]
pub struct BurpConfig {
    #[serde(default = "default_burp_host")]
    pub host: String,
    #[serde(default = "default_burp_port")]
    pub port: u16,
    /// Name the server's certificate must carry (CN or DNS SAN).
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// Our own client name, sent byte-for-byte during the handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    pub password: SecretString,
    /// Burp client version we announce in `hello:`.
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_ca_cert")]
    pub ca_cert: PathBuf,
    #[serde(default = "default_cert")]
    pub cert: PathBuf,
    #[serde(default = "default_key")]
    pub key: PathBuf,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval_seconds: u64,
    /// Client label key (`key=value` labels) exported as an extra metric label.
    #[serde(default)]
    pub group_by_label: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            scrape_interval_seconds: default_scrape_interval(),
            group_by_label: None,
        }
    }
}

fn default_burp_host() -> String {
    "127.0.0.1".to_string()
}

fn default_burp_port() -> u16 {
    4972
}

fn default_server_name() -> String {
    "burpserver".to_string()
}

fn default_client_name() -> String {
    "burp".to_string()
}

fn default_client_version() -> String {
    "2.1.28".to_string()
}

fn default_ca_cert() -> PathBuf {
    PathBuf::from("ca.pem")
}

fn default_cert() -> PathBuf {
    PathBuf::from("client.pem")
}

fn default_key() -> PathBuf {
    PathBuf::from("client.key")
}

fn default_timeout() -> u64 {
    10
}

fn default_exchange_timeout() -> u64 {
    30
}

fn default_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9645
}

fn default_scrape_interval() -> u64 {
    60
}

impl BurpConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("burp.host must not be empty");
        }
        if self.port == 0 {
            bail!("burp.port must be between 1 and 65535");
        }
        if self.server_name.is_empty() {
            bail!("burp.server_name must not be empty");
        }
        if self.client_name.is_empty() {
            bail!("burp.client_name must not be empty");
        }
        if self.password.expose_secret().is_empty() {
            bail!("burp.password must not be empty");
        }
        if self.timeout_seconds == 0
            || self.connect_timeout_seconds == 0
            || self.exchange_timeout_seconds == 0
        {
            bail!("burp timeouts must be at least one second");
        }
        Ok(())
    }
}

impl MetricsConfig {
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_seconds)
    }
}

/// Prometheus label names: `[a-zA-Z_][a-zA-Z0-9_]*`, not reserved (`__` prefix).
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("BURP_EXPORTER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Rejects values that would keep the poll loop from ever working.
    pub fn validate(&self) -> Result<()> {
        self.burp.validate()?;

        if self.server.port == 0 {
            bail!("server.port must be between 1 and 65535");
        }
        if self.metrics.scrape_interval_seconds == 0 {
            bail!("metrics.scrape_interval_seconds must be at least one second");
        }
        if let Some(label) = &self.metrics.group_by_label {
            let reserved = ["name", "run_status", "server"];
            if !is_valid_label_name(label) || reserved.contains(&label.as_str()) {
                bail!("metrics.group_by_label {:?} is not a usable label name", label);
            }
        }
        Ok(())
    }
}
