//! Switchboard reverse proxy
//!
//! Terminates TLS for every hostname in the switchboard, provisioning certificates on
//! first use, and forwards each request to the backend port registered for its Host.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request           ┌───────────────────────────────────────────────────┐
//!     ─────────────────────────┼─▶ net::listener ─▶ net::tls ──(SNI)──▶ certs      │
//!                              │                       │            cache/authority │
//!                              │                       ▼                            │
//!                              │                 http::server ──(Host)──▶ routing   │
//!                              │                       │                switchboard │
//!                              │                       ▼                            │
//!     Client Response          │                 http::forward ───────────────────┼──▶ localhost:{port}
//!     ◀────────────────────────┼───────────────────────┘                            │
//!                              │                                                   │
//!     Plaintext :80 ───────────┼─▶ http::redirect (ACME challenge | 302 to https)  │
//!                              └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use switchboard_proxy::config::load_config;
use switchboard_proxy::lifecycle::{self, ReloadOptions};
use switchboard_proxy::observability::init_logging;

#[derive(Parser, Debug)]
#[command(name = "switchboard-proxy", version, about = "Host-based TLS reverse proxy")]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "switchboard.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Reload the switchboard when the configuration file changes
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    if cli.check {
        println!(
            "{}: OK ({} hosts)",
            cli.config.display(),
            config.switchboard.len()
        );
        return Ok(());
    }

    init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        http_address = %config.listener.http_address,
        https_address = %config.listener.https_address,
        hosts = config.switchboard.len(),
        "switchboard-proxy starting"
    );

    lifecycle::run(
        config,
        ReloadOptions {
            config_path: cli.config,
            watch: cli.watch,
        },
    )
    .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
