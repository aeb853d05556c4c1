use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use http::Method;
use reqwest::Client;
use tracing::{info, warn};

use crate::auth::authenticator::{Authenticator, CredentialState};
use crate::cache::response_cache::{CacheStatus, ResponseCache};
use crate::config::types::ServiceConfig;
use crate::credentials::credential::{ClientIdentity, Credential};
use crate::credentials::token_store::{FileTokenStore, TokenStore};
use crate::error::ApiResult;
use crate::executor::outcome::{ApiRequest, RequestBody, RequestOutcome};
use crate::executor::request_executor::RequestExecutor;
use crate::resilience::retry::RetrySettings;

/// Caller-facing surface of the request pipeline.
#[derive(Clone)]
pub struct FitbitClient {
    executor: RequestExecutor,
    retry: RetrySettings,
}

impl FitbitClient {
    pub fn new(executor: RequestExecutor, retry: RetrySettings) -> Self {
        Self { executor, retry }
    }

    /// Wire the pipeline from config without touching the credential.
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::from_config(&cfg.token_store));
        Self::with_store(cfg, store)
    }

    pub fn with_store(cfg: &ServiceConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let identity = ClientIdentity::new(
            cfg.client.client_id.resolve().context("client.client_id")?,
            cfg.client.client_secret.resolve().context("client.client_secret")?,
        );
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.settings.http.timeout_ms))
            .build()
            .context("failed to build http client")?;

        let auth = Arc::new(Authenticator::new(client.clone(), &cfg.api, identity, store));
        let cache = ResponseCache::new(&cfg.cache.ttl_seconds);
        let executor = RequestExecutor::new(client, &cfg.api.base_url, auth, cache);
        let retry = RetrySettings::from(cfg.settings.retry.as_ref());
        Ok(Self::new(executor, retry))
    }

    /// Startup: load the credential or fail with `MissingCredentials`.
    pub async fn connect(cfg: &ServiceConfig) -> Result<Self> {
        let client = Self::from_config(cfg)?;
        client.authenticator().load().await?;
        Ok(client)
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        self.executor.authenticator()
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: BTreeMap<String, String>,
        body: Option<RequestBody>,
    ) -> RequestOutcome {
        let request = ApiRequest::new(method, path).params(params).body(body);
        self.execute(&request).await
    }

    pub async fn execute(&self, request: &ApiRequest) -> RequestOutcome {
        self.executor.execute(request).await
    }

    /// Same as [`Self::execute`] with caller-side transport retry applied.
    pub async fn execute_with_retry(&self, request: &ApiRequest) -> ApiResult<serde_json::Value> {
        self.retry
            .run_with_retry(|| async { self.execute(request).await.into_result() })
            .await
    }

    pub async fn exchange_code(&self, code: &str) -> ApiResult<Credential> {
        let credential = self.authenticator().exchange_code(code).await?;
        // a new grant may belong to another account
        self.clear_cache().await;
        Ok(credential)
    }

    pub async fn refresh_now(&self) -> bool {
        match self.authenticator().force_refresh().await {
            Ok(_) => true,
            Err(e) => {
                warn!("manual refresh failed: {}", e);
                false
            }
        }
    }

    pub async fn credential_state(&self) -> CredentialState {
        self.authenticator().state().await
    }

    pub async fn clear_cache(&self) {
        self.executor.cache().clear().await;
        info!("response cache cleared");
    }

    pub async fn cache_status(&self) -> CacheStatus {
        self.executor.cache().status().await
    }
}
