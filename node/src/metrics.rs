//! # Prometheus Metrics
//!
//! Operational metrics for the settlement daemon, scraped at `/metrics` on
//! the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Cheap to clone: prometheus handles are reference counted.
#[derive(Clone)]
pub struct SettlerMetrics {
    registry: Registry,
    /// Settlements accepted by the contract.
    pub settlements_total: IntCounter,
    /// Settlement attempts that failed to build, prove, or be accepted.
    pub settlement_failures_total: IntCounter,
    /// Actions dropped at replay time because their rule no longer held.
    pub dropped_actions_total: IntCounter,
    /// Submissions accepted into the action log.
    pub actions_accepted_total: IntCounter,
    /// Submissions refused at the contract boundary.
    pub actions_rejected_total: IntCounter,
    /// Current action log backlog.
    pub pending_actions: IntGauge,
    /// Scheduler retry counter after the latest cycle.
    pub retry_counter: IntGauge,
    /// Names in the committed state.
    pub committed_names: IntGauge,
    /// Wall time spent replaying and proving one batch.
    pub proof_generation_seconds: Histogram,
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, metric: C) -> prometheus::Result<C> {
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

impl SettlerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("nameledger".into()), None)?;

        let settlements_total = register(
            &registry,
            IntCounter::new("settlements_total", "Settlements accepted by the contract")?,
        )?;
        let settlement_failures_total = register(
            &registry,
            IntCounter::new(
                "settlement_failures_total",
                "Settlement attempts that failed to prove or were rejected",
            )?,
        )?;
        let dropped_actions_total = register(
            &registry,
            IntCounter::new(
                "dropped_actions_total",
                "Pending actions dropped at replay time",
            )?,
        )?;
        let actions_accepted_total = register(
            &registry,
            IntCounter::new("actions_accepted_total", "Submissions accepted into the log")?,
        )?;
        let actions_rejected_total = register(
            &registry,
            IntCounter::new("actions_rejected_total", "Submissions refused by the contract")?,
        )?;
        let pending_actions = register(
            &registry,
            IntGauge::new("pending_actions", "Actions waiting for settlement")?,
        )?;
        let retry_counter = register(
            &registry,
            IntGauge::new("retry_counter", "Scheduler cycles waited without settling")?,
        )?;
        let committed_names = register(
            &registry,
            IntGauge::new("committed_names", "Names in the committed state")?,
        )?;
        let proof_generation_seconds = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new(
                    "proof_generation_seconds",
                    "Replay plus Groth16 proving time for one batch",
                )
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            )?,
        )?;

        Ok(Self {
            registry,
            settlements_total,
            settlement_failures_total,
            dropped_actions_total,
            actions_accepted_total,
            actions_rejected_total,
            pending_actions,
            retry_counter,
            committed_names,
            proof_generation_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<SettlerMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
