use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::authenticator::Authenticator;
use crate::cache::endpoint_family::EndpointFamily;
use crate::cache::response_cache::{CacheKey, ResponseCache};
use crate::credentials::credential::Credential;
use crate::error::ApiResult;
use crate::executor::outcome::{ApiRequest, RequestBody, RequestOutcome};
use crate::helpers::time::{elapsed_secs, get_instant};
use crate::observability::metrics::get_metrics;
use crate::utils::constants::{
    RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RESET_HEADER,
};

#[derive(Debug)]
struct RawResponse {
    status: StatusCode,
    body: String,
}

/// Bearer-authenticated calls with one 401-triggered refresh and retry.
/// Reads go through the [`ResponseCache`], successful mutations invalidate it.
#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
    base_url: String,
    auth: Arc<Authenticator>,
    cache: ResponseCache,
}

impl RequestExecutor {
    pub fn new(client: Client, base_url: &str, auth: Arc<Authenticator>, cache: ResponseCache) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth,
            cache,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.auth
    }

    pub async fn execute(&self, request: &ApiRequest) -> RequestOutcome {
        let family = EndpointFamily::classify(&request.path);
        let metrics = get_metrics().await;
        let start = get_instant();

        let outcome = self.execute_with_cache(request, family).await;

        metrics
            .api_request_duration
            .with_label_values(&[family.as_str()])
            .observe(elapsed_secs(start));
        if !outcome.is_success() {
            metrics
                .api_request_failures
                .with_label_values(&[family.as_str(), outcome.reason()])
                .inc();
            info!(
                "{} {} finished with {} outcome",
                request.method,
                request.path,
                outcome.reason()
            );
        }
        outcome
    }

    async fn execute_with_cache(&self, request: &ApiRequest, family: EndpointFamily) -> RequestOutcome {
        let cached_read = if request.is_read() {
            let key = CacheKey::new(&request.path, &request.params);
            if let Some(payload) = self.cache.get(&key).await {
                return RequestOutcome::Success(payload);
            }
            let epoch = self.cache.epoch(family).await;
            Some((key, epoch))
        } else {
            None
        };

        let outcome = self.execute_authenticated(request, family).await;

        if let RequestOutcome::Success(payload) = &outcome {
            if request.is_mutating() {
                self.cache
                    .invalidate_families(family.invalidated_by_mutation())
                    .await;
            } else if let Some((key, epoch)) = cached_read {
                let ttl = self.cache.ttl_for(family);
                self.cache.put_if_current(key, payload.clone(), ttl, epoch).await;
            }
        }
        outcome
    }

    async fn execute_authenticated(&self, request: &ApiRequest, family: EndpointFamily) -> RequestOutcome {
        let credential = match self.auth.current().await {
            Ok(c) => c,
            Err(e) => return e.into(),
        };

        let response = match self.send(request, &credential, family).await {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        if response.status != StatusCode::UNAUTHORIZED {
            return classify(response);
        }

        // exactly one refresh per call
        info!("{} {} returned 401, refreshing credential", request.method, request.path);
        let refreshed = match self.auth.refresh(&credential).await {
            Ok(c) => c,
            Err(e) => return e.into(),
        };

        let retried = match self.send(request, &refreshed, family).await {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        if retried.status == StatusCode::UNAUTHORIZED {
            warn!("{} {} still 401 after refresh", request.method, request.path);
            return RequestOutcome::AuthFailure {
                status: Some(retried.status.as_u16()),
                body: retried.body,
            };
        }
        classify(retried)
    }

    async fn send(
        &self,
        request: &ApiRequest,
        credential: &Credential,
        family: EndpointFamily,
    ) -> ApiResult<RawResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(AUTHORIZATION, credential.bearer());

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(form)) => builder.form(form),
            None => builder,
        };

        get_metrics()
            .await
            .api_requests
            .with_label_values(&[family.as_str(), request.method.as_str()])
            .inc();

        let response = builder.send().await?;
        let status = response.status();
        log_rate_limit(&request.path, status, response.headers());
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

fn classify(response: RawResponse) -> RequestOutcome {
    if !response.status.is_success() {
        return RequestOutcome::UpstreamError {
            status: response.status.as_u16(),
            body: response.body,
        };
    }
    if response.status == StatusCode::NO_CONTENT || response.body.trim().is_empty() {
        return RequestOutcome::Success(Value::Bool(true));
    }
    match serde_json::from_str(&response.body) {
        Ok(value) => RequestOutcome::Success(value),
        Err(_) => RequestOutcome::Success(Value::String(response.body)),
    }
}

fn log_rate_limit(path: &str, status: StatusCode, headers: &HeaderMap) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_owned()
    };
    debug!(
        "{} -> {}, rate limit: {}, remaining: {}, reset: {}",
        path,
        status,
        header(RATE_LIMIT_LIMIT_HEADER),
        header(RATE_LIMIT_REMAINING_HEADER),
        header(RATE_LIMIT_RESET_HEADER)
    );
}
