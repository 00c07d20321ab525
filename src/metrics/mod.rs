//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Quote requests, failures and expiries
//! - Custody lifecycle transitions
//! - Custody service call failures

use crate::config::MetricsConfig;
use crate::lifecycle::TransactionState;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, CounterVec, Encoder, Gauge,
    IntCounter, TextEncoder,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

lazy_static! {
    // Quote metrics
    pub static ref QUOTES_REQUESTED: CounterVec = register_counter_vec!(
        "swapdesk_quotes_requested_total",
        "Total swap estimates requested by source chain",
        &["source_chain"]
    ).expect("metric registration");

    pub static ref QUOTES_FAILED: CounterVec = register_counter_vec!(
        "swapdesk_quotes_failed_total",
        "Total swap estimates that failed by reason",
        &["reason"]
    ).expect("metric registration");

    pub static ref QUOTES_EXPIRED: IntCounter = register_int_counter!(
        "swapdesk_quotes_expired_total",
        "Total accepted quotes that ran out their validity window"
    ).expect("metric registration");

    pub static ref QUOTE_REMAINING: Gauge = register_gauge!(
        "swapdesk_quote_remaining_seconds",
        "Seconds left on the active quote (0 when none)"
    ).expect("metric registration");

    // Lifecycle metrics
    pub static ref LIFECYCLE_TRANSITIONS: CounterVec = register_counter_vec!(
        "swapdesk_lifecycle_transitions_total",
        "Custody transaction state transitions by target state",
        &["state"]
    ).expect("metric registration");

    pub static ref CUSTODY_FAILURES: CounterVec = register_counter_vec!(
        "swapdesk_custody_failures_total",
        "Failed custody lifecycle steps by operation",
        &["operation"]
    ).expect("metric registration");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Run the server in the background when metrics are enabled
    pub fn spawn(config: &MetricsConfig) -> Option<JoinHandle<()>> {
        if !config.enabled {
            return None;
        }

        let server = Self::new(config.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = TcpListener::bind(&addr).await?;
        Self::serve(listener).await
    }

    /// Serve `/metrics` on an already bound listener
    pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));
        axum::serve(listener, app).await
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// Helper functions to record metrics

pub fn record_quote_requested(source_chain: u64) {
    QUOTES_REQUESTED
        .with_label_values(&[&source_chain.to_string()])
        .inc();
}

pub fn record_quote_failed(reason: &str) {
    QUOTES_FAILED.with_label_values(&[reason]).inc();
}

pub fn record_quote_expired() {
    QUOTES_EXPIRED.inc();
}

pub fn record_quote_remaining(remaining: u32) {
    QUOTE_REMAINING.set(remaining as f64);
}

pub fn record_transition(state: TransactionState) {
    LIFECYCLE_TRANSITIONS
        .with_label_values(&[state.as_str()])
        .inc();
}

pub fn record_custody_failure(operation: &str) {
    CUSTODY_FAILURES.with_label_values(&[operation]).inc();
}
