//! Foundry proxy server.
//!
//! Serves the chat widget API until SIGTERM or SIGINT.

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::sync::broadcast;
use tracing::{error, info};

use foundry_proxy::ProxyConfig;
use foundry_proxy::config::CONFIG_PATH_VAR;

/// Initializes structured logging with tracing.
///
/// Supports two output formats via `FOUNDRY_LOG_FORMAT` environment variable:
/// - `json`: Machine-readable JSON logs
/// - `pretty`: Human-readable formatted logs (default)
///
/// Log level is controlled via `RUST_LOG` environment variable. Records from
/// the `log` facade used by the library crates are forwarded as well.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let format = std::env::var("FOUNDRY_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("foundry_proxy=info,foundry_client=info"));

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Foundry proxy v{}", env!("CARGO_PKG_VERSION"));

    let config = match ProxyConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
                error!("Config file: {path}");
            }
            return Err(e.into());
        }
    };

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let handle = signals.handle();
    tokio::spawn(async move {
        use futures::stream::StreamExt;
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    let _ = shutdown_tx.send(());
                    break;
                }
                SIGINT => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    let _ = shutdown_tx.send(());
                    break;
                }
                _ => {}
            }
        }
    });

    let result = foundry_proxy::serve(config, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await;

    handle.close();

    if let Err(e) = &result {
        error!("Server error: {e}");
    }
    result.map_err(Into::into)
}
