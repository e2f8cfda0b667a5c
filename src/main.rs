//! sysexd — entry point.
//!
//! Exposes a locally attached MIDI SysEx device to network clients over
//! WebSocket.  Clients authenticate with `--token`, enumerate and select
//! MIDI ports, and exchange SysEx payloads as base64 inside JSON text
//! frames.
//!
//! # Usage
//!
//! ```text
//! sysexd --token <SECRET> [OPTIONS]
//!
//! Options:
//!   --port <PORT>              WebSocket listener port [default: 9002]
//!   --bind <ADDR>              Bind address [default: 0.0.0.0]
//!   --token <SECRET>           Shared secret every request must carry
//!   --debug                    Verbose per-request logging
//!   --resend-attempts <N>      Resend retry budget [default: 10]
//!   --resend-interval-ms <MS>  Wait between resends [default: 150]
//! ```
//!
//! Each option can also be set through its `SYSEXD_*` environment variable;
//! CLI arguments take precedence.  Log verbosity is controlled by
//! `RUST_LOG` (e.g. `RUST_LOG=debug`).

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sysexd::domain::{GatewayConfig, ResendPolicy};
use sysexd::infrastructure::midi::MidirBackend;
use sysexd::infrastructure::{run_server, DriverFactory};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket gateway for MIDI System-Exclusive hardware.
#[derive(Debug, Parser)]
#[command(
    name = "sysexd",
    about = "WebSocket gateway exposing MIDI SysEx hardware to network clients",
    version
)]
struct Cli {
    /// TCP port for the WebSocket server to listen on.
    #[arg(long, default_value_t = 9002, env = "SYSEXD_PORT")]
    port: u16,

    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface, or
    /// `127.0.0.1` for local connections only.
    #[arg(long, default_value = "0.0.0.0", env = "SYSEXD_BIND")]
    bind: String,

    /// Shared secret every inbound request must present in its `token`
    /// field.  Requests with any other token are dropped without a reply.
    #[arg(long, env = "SYSEXD_TOKEN")]
    token: String,

    /// Enables verbose logging of dropped requests and per-send details.
    #[arg(long, default_value_t = false, env = "SYSEXD_DEBUG")]
    debug: bool,

    /// Maximum re-transmissions of an unacknowledged SysEx send.
    #[arg(long, default_value_t = 10, env = "SYSEXD_RESEND_ATTEMPTS")]
    resend_attempts: u32,

    /// Milliseconds to wait between re-transmissions.
    #[arg(long, default_value_t = 150, env = "SYSEXD_RESEND_INTERVAL_MS")]
    resend_interval_ms: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`GatewayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address.
    fn into_gateway_config(self) -> anyhow::Result<GatewayConfig> {
        let bind_addr: SocketAddr = format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.bind, self.port))?;

        Ok(GatewayConfig {
            bind_addr,
            token: self.token,
            debug: self.debug,
            resend: ResendPolicy {
                max_attempts: self.resend_attempts,
                interval: Duration::from_millis(self.resend_interval_ms),
            },
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_gateway_config()?;

    info!("sysexd starting — listening on {}", config.bind_addr);

    // Graceful shutdown: Ctrl+C clears the flag, the accept loop checks it
    // every 200 ms and exits cleanly.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for Ctrl+C signal");
            }
        }
    });

    // One fresh midir-backed driver per connection — exclusive ownership.
    let drivers: DriverFactory = Arc::new(|| Box::new(MidirBackend::new()));

    run_server(config, drivers, running).await?;

    info!("sysexd stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
