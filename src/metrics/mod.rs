//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transfer outcomes and the step that failed
//! - Transactions submitted per chain
//! - Nonce retries
//! - Attestation polling and latency

use crate::error::{BridgeError, BridgeResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Transfer metrics
    pub static ref TRANSFERS_STARTED: CounterVec = register_counter_vec!(
        "bridge_transfers_started_total",
        "Total transfers started, by entry point",
        &["kind"]
    ).unwrap();

    pub static ref TRANSFERS_COMPLETED: CounterVec = register_counter_vec!(
        "bridge_transfers_completed_total",
        "Total transfers completed",
        &[]
    ).unwrap();

    pub static ref TRANSFERS_FAILED: CounterVec = register_counter_vec!(
        "bridge_transfers_failed_total",
        "Total transfers failed, by step",
        &["step"]
    ).unwrap();

    pub static ref TRANSFERS_IN_FLIGHT: Gauge = register_gauge!(
        "bridge_transfers_in_flight",
        "Transfers currently running"
    ).unwrap();

    pub static ref TRANSFER_LATENCY: HistogramVec = register_histogram_vec!(
        "bridge_transfer_latency_seconds",
        "End-to-end transfer latency",
        &["outcome"],
        vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "bridge_transactions_submitted_total",
        "Total transactions submitted",
        &["chain"]
    ).unwrap();

    pub static ref NONCE_RETRIES: CounterVec = register_counter_vec!(
        "bridge_nonce_retries_total",
        "Approve and burn sequences retried after a stale nonce",
        &[]
    ).unwrap();

    // Attestation metrics
    pub static ref ATTESTATION_POLLS: CounterVec = register_counter_vec!(
        "bridge_attestation_polls_total",
        "Attestation poll results",
        &["result"]
    ).unwrap();

    pub static ref ATTESTATION_LATENCY: Histogram = register_histogram!(
        "bridge_attestation_latency_seconds",
        "Time from first poll to a final attestation answer",
        vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> BridgeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Config(format!("Cannot bind metrics port {}: {}", self.port, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| BridgeError::Unexpected(format!("Metrics server stopped: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Render all registered metrics in the text exposition format
pub fn render() -> BridgeResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| BridgeError::Unexpected(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| BridgeError::Unexpected(e.to_string()))
}

// Helper functions to record metrics

pub fn record_transfer_started(kind: &str) {
    TRANSFERS_STARTED.with_label_values(&[kind]).inc();
    TRANSFERS_IN_FLIGHT.inc();
}

pub fn record_transfer_completed(latency_secs: f64) {
    TRANSFERS_COMPLETED.with_label_values(&[]).inc();
    TRANSFERS_IN_FLIGHT.dec();
    TRANSFER_LATENCY
        .with_label_values(&["success"])
        .observe(latency_secs);
}

pub fn record_transfer_failed(step: u8, latency_secs: f64) {
    TRANSFERS_FAILED
        .with_label_values(&[&step.to_string()])
        .inc();
    TRANSFERS_IN_FLIGHT.dec();
    TRANSFER_LATENCY
        .with_label_values(&["failure"])
        .observe(latency_secs);
}

pub fn record_tx_submitted(chain: &str) {
    TX_SUBMITTED.with_label_values(&[chain]).inc();
}

pub fn record_nonce_retry() {
    NONCE_RETRIES.with_label_values(&[]).inc();
}

pub fn record_attestation_poll(result: &str) {
    ATTESTATION_POLLS.with_label_values(&[result]).inc();
}

pub fn record_attestation_latency(latency_secs: f64) {
    ATTESTATION_LATENCY.observe(latency_secs);
}
