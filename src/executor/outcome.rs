use std::collections::BTreeMap;

use http::Method;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// Final classification of one logical call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// 2xx. A 204 (or empty 2xx body) carries `true`.
    Success(Value),
    /// Refresh or code exchange was rejected, or a 401 survived the retry.
    AuthFailure { status: Option<u16>, body: String },
    /// Any other non-2xx, status and body untouched.
    UpstreamError { status: u16, body: String },
    TransportError(String),
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success(_))
    }

    /// Label used for failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            RequestOutcome::Success(_) => "success",
            RequestOutcome::AuthFailure { .. } => "auth",
            RequestOutcome::UpstreamError { .. } => "upstream",
            RequestOutcome::TransportError(_) => "transport",
        }
    }

    pub fn into_result(self) -> ApiResult<Value> {
        match self {
            RequestOutcome::Success(value) => Ok(value),
            RequestOutcome::AuthFailure { status, body } => Err(ApiError::AuthFailure { status, body }),
            RequestOutcome::UpstreamError { status, body } => Err(ApiError::Upstream { status, body }),
            RequestOutcome::TransportError(msg) => Err(ApiError::Transport(msg)),
        }
    }
}

impl From<ApiError> for RequestOutcome {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::AuthFailure { status, body } => RequestOutcome::AuthFailure { status, body },
            ApiError::MissingCredentials => RequestOutcome::AuthFailure {
                status: None,
                body: e.to_string(),
            },
            ApiError::Upstream { status, body } => RequestOutcome::UpstreamError { status, body },
            ApiError::Transport(msg) => RequestOutcome::TransportError(msg),
            ApiError::Storage(_) | ApiError::Decode(_) => RequestOutcome::TransportError(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// application/x-www-form-urlencoded
    Form(BTreeMap<String, String>),
}

/// A logical call against the provider API, relative to the configured base url.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    /// sorted, so the cache key does not depend on insertion order
    pub params: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') { path } else { format!("/{}", path) };
        Self {
            method,
            path,
            params: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn body(mut self, body: Option<RequestBody>) -> Self {
        self.body = body;
        self
    }

    /// Only reads consult and populate the cache.
    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_mutating(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::DELETE | Method::PATCH
        )
    }
}
