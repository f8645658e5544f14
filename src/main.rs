use anyhow::Result;
use burp_exporter::{config::Config, notify, server};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/Default.toml")]
    config: String,

    /// Burp server host (overrides config)
    #[arg(long, env = "BURP_HOST")]
    burp_host: Option<String>,

    /// Port to listen on for metrics (overrides config)
    #[arg(short, long, env = "EXPORTER_PORT")]
    port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long, env = "EXPORTER_ADDR")]
    addr: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting burp Prometheus Exporter v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Error during setup: {:#}", e);
            std::process::exit(1);
        }
    };

    // Override with CLI arguments if provided
    if let Some(host) = args.burp_host {
        config.burp.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    info!("Configuration loaded successfully");
    info!(
        "Burp server: {}:{} ({})",
        config.burp.host, config.burp.port, config.burp.server_name
    );

    let notifier: Arc<dyn notify::Notifier> = Arc::from(notify::from_env());

    // Start the metrics server and poll loop
    if let Err(e) = server::start(config, notifier).await {
        error!("Server error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
