use std::sync::Arc;

use axum::routing::get;
use axum::{extract::State, response::IntoResponse, Router};
use http::{header::CONTENT_TYPE, StatusCode};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{debug, error};

use crate::auth::authenticator::CredentialState;
use crate::config::settings::MetricsConfig;
use crate::observability::metrics::get_metrics;
use crate::server::server::AppState;

#[derive(Clone)]
pub struct MetricsState {
    pub registry: Arc<Registry>,
}

impl MetricsState {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn router(&self, metrics_config: &MetricsConfig) -> Router<AppState> {
        let mut router = Router::new();
        if metrics_config.is_enabled {
            router = router.route(metrics_config.path.as_str(), get(scrape));
        }
        router
    }
}

/// Gauges that mirror client state are sampled at scrape time.
async fn sample_client_state(state: &AppState) {
    let metrics = get_metrics().await;
    let current = state.client.credential_state().await;
    for candidate in CredentialState::ALL {
        metrics
            .credential_state
            .with_label_values(&[candidate.as_str()])
            .set(i64::from(candidate == current));
    }
    let entries = state.client.cache_status().await.entries;
    metrics.cached_entries.set(entries as i64);
}

async fn scrape(State(state): State<AppState>) -> impl IntoResponse {
    sample_client_state(&state).await;

    let families = state.metrics_state.registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
        error!("failed to encode fitlogagent metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CONTENT_TYPE, "text/plain")],
            format!("metrics encoding failed: {}", e),
        );
    }
    debug!("scrape served {} metric families", families.len());

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        String::from_utf8_lossy(&buffer).into_owned(),
    )
}
