//! # Prometheus Metrics
//!
//! Exposes operational metrics for the vault node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use vault_protocol::VaultError;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct VaultMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Committed requests, by operation.
    pub operations_committed_total: IntCounterVec,
    /// Rejected or faulted requests, by operation and error kind.
    pub operations_rejected_total: IntCounterVec,
    /// Effective grant, revoke, renounce, and admin-transfer changes.
    pub permission_changes_total: IntCounter,
    /// Sum of all balances held in custody.
    pub custody_total: IntGauge,
    /// 1 while the vault is paused.
    pub vault_paused: IntGauge,
}

impl VaultMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("vault".into()), None)
            .expect("failed to create prometheus registry");

        let operations_committed_total = IntCounterVec::new(
            Opts::new(
                "operations_committed_total",
                "Total number of committed operations",
            ),
            &["operation"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(operations_committed_total.clone()))
            .expect("metric registration");

        let operations_rejected_total = IntCounterVec::new(
            Opts::new(
                "operations_rejected_total",
                "Total number of rejected or faulted operations",
            ),
            &["operation", "kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(operations_rejected_total.clone()))
            .expect("metric registration");

        let permission_changes_total = IntCounter::new(
            "permission_changes_total",
            "Total number of effective permission changes",
        )
        .expect("metric creation");
        registry
            .register(Box::new(permission_changes_total.clone()))
            .expect("metric registration");

        let custody_total = IntGauge::new("custody_total", "Sum of all balances in custody")
            .expect("metric creation");
        registry
            .register(Box::new(custody_total.clone()))
            .expect("metric registration");

        let vault_paused = IntGauge::new("paused", "1 while the vault is paused, else 0")
            .expect("metric creation");
        registry
            .register(Box::new(vault_paused.clone()))
            .expect("metric registration");

        Self {
            registry,
            operations_committed_total,
            operations_rejected_total,
            permission_changes_total,
            custody_total,
            vault_paused,
        }
    }

    /// Counts one request outcome.
    pub fn record<T>(&self, operation: &str, outcome: &Result<T, VaultError>) {
        match outcome {
            Ok(_) => self
                .operations_committed_total
                .with_label_values(&[operation])
                .inc(),
            Err(err) => self
                .operations_rejected_total
                .with_label_values(&[operation, err.kind()])
                .inc(),
        }
    }

    /// Refreshes the custody and pause gauges.
    pub fn observe_vault(&self, total_balance: u128, paused: bool) {
        self.custody_total
            .set(i64::try_from(total_balance).unwrap_or(i64::MAX));
        self.vault_paused.set(i64::from(paused));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for VaultMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<VaultMetrics>;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_land_in_labelled_counters() {
        let metrics = VaultMetrics::new();
        metrics.record::<()>("deposit", &Ok(()));
        metrics.record::<()>("deposit", &Err(VaultError::Paused));
        metrics.record::<()>("withdraw", &Err(VaultError::Paused));

        assert_eq!(
            metrics
                .operations_committed_total
                .with_label_values(&["deposit"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .operations_rejected_total
                .with_label_values(&["withdraw", "paused"])
                .get(),
            1
        );
    }

    #[test]
    fn encode_includes_namespace() {
        let metrics = VaultMetrics::new();
        metrics.observe_vault(42, true);
        let text = metrics.encode().unwrap();
        assert!(text.contains("vault_custody_total 42"));
        assert!(text.contains("vault_paused 1"));
    }
}
