// src/telemetry.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("watchprs_polls_total", "Poll cycles started after the baseline.");
        describe_counter!(
            "watchprs_poll_errors_total",
            "Poll cycles that failed to list pull requests."
        );
        describe_counter!(
            "watchprs_matched_total",
            "New pull requests that matched the branch and file patterns."
        );
        describe_counter!(
            "watchprs_diff_errors_total",
            "Diff downloads or parses that failed (treated as non-matching)."
        );
        describe_counter!(
            "watchprs_notifications_total",
            "Notifications delivered, by sink."
        );
        describe_counter!(
            "watchprs_notification_failures_total",
            "Notifications a sink gave up on, by sink."
        );
        describe_gauge!("watchprs_watermark", "Highest pull request number evaluated.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }

    pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding metrics listener on {addr}"))
    }

    /// Serve `/metrics` on `listener` until `cancel` fires.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "serving metrics");
        }
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .context("metrics server")
    }
}
