use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use crate::auth::authenticator::CredentialState;
use crate::cache::response_cache::CacheStatus;
use crate::client::FitbitClient;
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub client: FitbitClient,
}

impl AppState {
    pub fn new(metrics: &Metrics, client: FitbitClient) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            client,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub cache: CacheStatus,
    pub credential_state: CredentialState,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub refreshed: bool,
    pub state: CredentialState,
}

/// Admin routes over the shared client.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/cache/status", get(cache_status))
        .route("/cache/clear", post(cache_clear))
        .route("/auth/refresh", post(auth_refresh))
}

pub fn app(settings_config: &SettingsConfig, state: AppState) -> Router {
    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .merge(admin_router())
        .with_state(state)
}

async fn cache_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        cache: state.client.cache_status().await,
        credential_state: state.client.credential_state().await,
    })
}

async fn cache_clear(State(state): State<AppState>) -> Json<CacheStatus> {
    state.client.clear_cache().await;
    Json(state.client.cache_status().await)
}

async fn auth_refresh(State(state): State<AppState>) -> Json<RefreshResponse> {
    let refreshed = state.client.refresh_now().await;
    Json(RefreshResponse {
        refreshed,
        state: state.client.credential_state().await,
    })
}

/// Serve admin and metrics routes until the process receives ctrl-c.
pub async fn start(settings_config: &SettingsConfig, client: FitbitClient) -> Result<()> {
    let metrics = get_metrics().await;
    let state = AppState::new(metrics, client);
    let app = app(settings_config, state);

    let bind_addr = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind admin server on {}", bind_addr))?;
    info!("admin server listening on {}", bind_addr);
    metrics.up.set(1);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("admin server failed")?;

    metrics.up.set(0);
    info!("admin server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
