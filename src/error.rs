//! Error taxonomy shared by the token lifecycle and the request pipeline.

use thiserror::Error;

/// Every failure the core can surface to a caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Neither the token store nor the environment holds a credential.
    /// Fatal at startup.
    #[error("missing credentials: no token pair in store or environment, run `fitlog-agent exchange` first")]
    MissingCredentials,

    /// Code exchange or refresh was rejected by the provider, or the live
    /// credential is no longer usable. The caller must reauthorize.
    #[error("authorization failed (status={status:?}): {body}")]
    AuthFailure { status: Option<u16>, body: String },

    /// Non-2xx, non-401 response from the provider, relayed as-is.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },

    /// DNS, connect, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credential persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Response payload did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn auth(status: Option<u16>, body: impl Into<String>) -> Self {
        Self::AuthFailure {
            status,
            body: body.into(),
        }
    }

    /// Only network-level failures are worth retrying by callers.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
