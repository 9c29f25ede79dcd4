//! watchprs — binary entrypoint.
//! Parses flags, sets up tracing and runs the watcher until Ctrl-C.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use watchprs::config::{Cli, Settings};

/// `WATCHPRS_LOG`, then `RUST_LOG`, then `info` (`debug` with `--debug`).
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = std::env::var("WATCHPRS_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();

    let settings = Settings::resolve(Cli::parse())?;
    init_tracing(settings.debug);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received interrupt, shutting down");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "could not listen for interrupt"),
        }
    });

    watchprs::run(settings, cancel).await
}
