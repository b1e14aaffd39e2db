use std::sync::Arc;

use anyhow::Context;
use comfymcp_server::config::{ServerConfig, Transport};
use comfymcp_server::startup::build_tool_set;
use comfymcp_server::state::AppState;
use comfymcp_server::telemetry::{self, LogHandle};
use comfymcp_server::transport::{self, shutdown_signal};
use comfymcp_tools::envelope::TracingSink;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid configuration")?;

    // --- Logging ---
    let log = telemetry::init(&config.logging).context("Failed to initialise logging")?;
    tracing::info!(
        transport = ?config.transport,
        backend = %config.backend.api_url(),
        templates = %config.template_dir.display(),
        "Loaded server configuration",
    );

    // --- Tools ---
    let cancel = CancellationToken::new();
    let startup = build_tool_set(&config, Arc::new(TracingSink), cancel.clone())
        .await
        .context("Failed to build tool set")?;
    tracing::info!(
        modules = startup.report.registered_count(),
        tools = startup.tools.tool_count(),
        resources = startup.tools.resource_count(),
        capabilities_cached = startup.capabilities_cached,
        "Tool registration complete",
    );
    let tools = Arc::new(startup.tools);

    // --- Signals ---
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });
    spawn_log_reloader(log, cancel.clone());

    // --- Serve ---
    match config.transport {
        Transport::Http => {
            let state = AppState {
                tools,
                config: Arc::new(config),
            };
            transport::http::serve(state, cancel.clone())
                .await
                .context("HTTP transport failed")?;
        }
        Transport::Stdio => {
            transport::stdio::serve(tools, cancel.clone())
                .await
                .context("stdio transport failed")?;
        }
    }

    cancel.cancel();
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Re-read `.env` and the environment on SIGHUP and apply the logging
/// section.
#[cfg(unix)]
fn spawn_log_reloader(log: LogHandle, cancel: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler, log reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                }
                () = cancel.cancelled() => break,
            }

            dotenvy::dotenv_override().ok();
            let result = ServerConfig::from_env()
                .map_err(anyhow::Error::from)
                .and_then(|config| log.reconfigure(&config.logging).map_err(anyhow::Error::from));
            if let Err(e) = result {
                tracing::error!(error = %e, "Log reload failed, keeping previous settings");
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_log_reloader(_log: LogHandle, _cancel: CancellationToken) {}
