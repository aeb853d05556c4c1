use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use http::header::AUTHORIZATION;
use http::StatusCode;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::types::ApiConfig;
use crate::credentials::credential::{mask, ClientIdentity, Credential};
use crate::credentials::token_store::TokenStore;
use crate::error::{ApiError, ApiResult};
use crate::observability::metrics::get_metrics;

static INVALID_MSG: &str = "credential was rejected by the token endpoint, reauthorization required";
static UNPERSISTED_MSG: &str = "refreshed credential could not be persisted";

/// Lifecycle of the process-wide credential.
/// `Unloaded -> Loaded -> Refreshed (loop) -> Invalid`
///
/// `Unpersisted` holds a pair the provider issued but the store refused.
/// It is never handed out; `force_refresh` rotates it into a stored pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialState {
    Unloaded,
    Loaded,
    Refreshed,
    Unpersisted,
    Invalid,
}

impl CredentialState {
    pub const ALL: [CredentialState; 5] = [
        CredentialState::Unloaded,
        CredentialState::Loaded,
        CredentialState::Refreshed,
        CredentialState::Unpersisted,
        CredentialState::Invalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialState::Unloaded => "unloaded",
            CredentialState::Loaded => "loaded",
            CredentialState::Refreshed => "refreshed",
            CredentialState::Unpersisted => "unpersisted",
            CredentialState::Invalid => "invalid",
        }
    }
}

#[derive(Debug)]
struct Session {
    credential: Option<Credential>,
    state: CredentialState,
}

/// Provider token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Owns the live credential. Every mutation goes through here and is
/// persisted to the [`TokenStore`] before anyone else can use it.
pub struct Authenticator {
    client: Client,
    token_url: String,
    authorize_url: String,
    redirect_uri: String,
    scope: String,
    identity: ClientIdentity,
    store: Arc<dyn TokenStore>,
    session: RwLock<Session>,
    /// at most one refresh in flight
    refresh_lock: Mutex<()>,
}

impl Authenticator {
    pub fn new(
        client: Client,
        api: &ApiConfig,
        identity: ClientIdentity,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            client,
            token_url: api.token_url.to_owned(),
            authorize_url: api.authorize_url.to_owned(),
            redirect_uri: api.redirect_uri.to_owned(),
            scope: api.scope.to_owned(),
            identity,
            store,
            session: RwLock::new(Session {
                credential: None,
                state: CredentialState::Unloaded,
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Startup step. Fails fast when neither store nor environment has a pair.
    pub async fn load(&self) -> ApiResult<Credential> {
        let credential = self
            .store
            .load()
            .await?
            .ok_or(ApiError::MissingCredentials)?;
        info!(
            "credential loaded from {}, access token {}",
            self.store.describe(),
            mask(&credential.access_token)
        );
        let mut session = self.session.write().await;
        session.credential = Some(credential.clone());
        session.state = CredentialState::Loaded;
        Ok(credential)
    }

    pub async fn state(&self) -> CredentialState {
        self.session.read().await.state
    }

    /// Credential to attach to the next request.
    pub async fn current(&self) -> ApiResult<Credential> {
        let session = self.session.read().await;
        match (&session.credential, session.state) {
            (_, CredentialState::Invalid) => Err(ApiError::auth(None, INVALID_MSG)),
            (_, CredentialState::Unpersisted) => Err(ApiError::auth(None, UNPERSISTED_MSG)),
            (Some(credential), _) => Ok(credential.clone()),
            (None, _) => Err(ApiError::auth(None, "credential is not loaded")),
        }
    }

    /// Provider consent page the user opens to obtain an authorization code.
    pub fn authorization_url(&self) -> ApiResult<String> {
        Url::parse_with_params(
            &self.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.identity.client_id.as_str()),
                ("scope", self.scope.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )
        .map(|url| url.to_string())
        .map_err(|e| ApiError::Decode(format!("authorize url '{}': {}", self.authorize_url, e)))
    }

    /// Trade a single-use authorization code for a fresh pair.
    /// A stale or reused code surfaces as `AuthFailure`, network trouble as `Transport`.
    pub async fn exchange_code(&self, code: &str) -> ApiResult<Credential> {
        let code = clean_code(code);
        if code.is_empty() {
            return Err(ApiError::auth(None, "authorization code is empty"));
        }
        let _guard = self.refresh_lock.lock().await;

        let (status, body) = self
            .post_token_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.identity.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;

        if status != StatusCode::OK {
            warn!("authorization code exchange rejected, status {}: {}", status, body);
            return Err(ApiError::auth(Some(status.as_u16()), body));
        }
        let credential = parse_token_response(&body)
            .map_err(|e| ApiError::auth(Some(status.as_u16()), e.to_string()))?;

        if let Err(e) = self.store.save(&credential).await {
            error!("exchanged credential could not be persisted: {}", e);
            self.replace(credential, CredentialState::Unpersisted).await;
            return Err(e);
        }
        self.replace(credential.clone(), CredentialState::Loaded).await;
        info!("authorization code exchanged, access token {}", mask(&credential.access_token));
        Ok(credential)
    }

    /// Refresh after `stale` was rejected with a 401.
    ///
    /// Callers that arrive while another refresh is in flight wait for it and
    /// reuse its result instead of spending the (rotating) refresh token again.
    pub async fn refresh(&self, stale: &Credential) -> ApiResult<Credential> {
        let _guard = self.refresh_lock.lock().await;
        let current = {
            let session = self.session.read().await;
            match (&session.credential, session.state) {
                (None, _) => return Err(ApiError::MissingCredentials),
                (Some(_), CredentialState::Invalid) => {
                    return Err(ApiError::auth(None, INVALID_MSG));
                }
                // the refresh this caller waited on failed to persist, same answer for everyone
                (Some(_), CredentialState::Unpersisted) => {
                    return Err(ApiError::auth(None, UNPERSISTED_MSG));
                }
                (Some(credential), _) if credential.access_token != stale.access_token => {
                    debug!("refresh already done by a concurrent request, reusing it");
                    get_metrics().await.token_refreshes.with_label_values(&["coalesced"]).inc();
                    return Ok(credential.clone());
                }
                (Some(credential), _) => credential.clone(),
            }
        };
        self.refresh_locked(current).await
    }

    /// Unconditional refresh, also the way out of `Invalid` when the failure was
    /// transient and out of `Unpersisted` once the store accepts writes again.
    pub async fn force_refresh(&self) -> ApiResult<Credential> {
        let _guard = self.refresh_lock.lock().await;
        let current = self
            .session
            .read()
            .await
            .credential
            .clone()
            .ok_or(ApiError::MissingCredentials)?;
        self.refresh_locked(current).await
    }

    // caller holds refresh_lock
    async fn refresh_locked(&self, current: Credential) -> ApiResult<Credential> {
        let metrics = get_metrics().await;
        info!("refreshing access token {}", mask(&current.access_token));

        let result = self
            .post_token_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
                ("client_id", self.identity.client_id.as_str()),
                ("client_secret", self.identity.client_secret()),
                ("scope", self.scope.as_str()),
            ])
            .await;

        let (status, body) = match result {
            Ok(v) => v,
            Err(e) => {
                error!("token refresh transport failure: {}", e);
                metrics.token_refreshes.with_label_values(&["transport"]).inc();
                return Err(e);
            }
        };

        if status != StatusCode::OK {
            error!("token refresh rejected, status {}: {}", status, body);
            metrics.token_refreshes.with_label_values(&["rejected"]).inc();
            self.session.write().await.state = CredentialState::Invalid;
            return Err(ApiError::auth(Some(status.as_u16()), body));
        }

        let refreshed = match parse_token_response(&body) {
            Ok(c) => c,
            Err(e) => {
                error!("token refresh returned an unreadable body: {}", e);
                metrics.token_refreshes.with_label_values(&["rejected"]).inc();
                self.session.write().await.state = CredentialState::Invalid;
                return Err(ApiError::auth(Some(status.as_u16()), e.to_string()));
            }
        };

        // persist before anyone can retry with the new pair
        if let Err(e) = self.store.save(&refreshed).await {
            error!("{}: {}", UNPERSISTED_MSG, e);
            metrics.token_refreshes.with_label_values(&["persist_failed"]).inc();
            // the old refresh token is already spent upstream, keep the new one for force_refresh
            self.replace(refreshed, CredentialState::Unpersisted).await;
            return Err(ApiError::auth(None, format!("{}: {}", UNPERSISTED_MSG, e)));
        }
        self.replace(refreshed.clone(), CredentialState::Refreshed).await;

        metrics.token_refreshes.with_label_values(&["success"]).inc();
        info!("access token refreshed, new access token {}", mask(&refreshed.access_token));
        Ok(refreshed)
    }

    async fn replace(&self, credential: Credential, state: CredentialState) {
        let mut session = self.session.write().await;
        session.credential = Some(credential);
        session.state = state;
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> ApiResult<(StatusCode, String)> {
        let response = self
            .client
            .post(&self.token_url)
            .header(AUTHORIZATION, self.basic_auth_header())
            .form(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.identity.client_id, self.identity.client_secret());
        format!("Basic {}", general_purpose::STANDARD.encode(raw))
    }
}

fn parse_token_response(body: &str) -> ApiResult<Credential> {
    let token: TokenResponse = serde_json::from_str(body)?;
    debug!(
        "token response: expires_in={:?}, scope={:?}, user_id={:?}",
        token.expires_in, token.scope, token.user_id
    );
    if token.access_token.is_empty() || token.refresh_token.is_empty() {
        return Err(ApiError::Decode("token response carries an empty token".to_owned()));
    }
    Ok(Credential::new(token.access_token, token.refresh_token))
}

/// Redirect urls sometimes carry a `#_=_` fragment after the code.
fn clean_code(code: &str) -> &str {
    code.trim().split('#').next().unwrap_or_default().trim()
}
