use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use base64::{engine::general_purpose, Engine as _};
use httpmock::Method::POST;
use httpmock::{Mock, MockServer};
use reqwest::Client;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::client::FitbitClient;
use crate::config::proc_loader::parse_config;
use crate::credentials::credential::Credential;
use crate::credentials::token_store::{MemoryTokenStore, TokenStore};
use tokio::sync::RwLock;
use crate::error::{ApiError, ApiResult};
use crate::ServiceConfig;

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";
pub const TOKEN_PATH: &str = "/oauth2/token";

pub fn old_pair() -> Credential {
    Credential::new("old-access", "old-refresh")
}

pub fn new_pair() -> Credential {
    Credential::new("new-access", "new-refresh")
}

pub fn basic_header() -> String {
    let raw = format!("{}:{}", CLIENT_ID, CLIENT_SECRET);
    format!("Basic {}", general_purpose::STANDARD.encode(raw))
}

/// Config pointing every provider url at `base_url`.
/// `cache_ttl` is inserted verbatim under `cache.ttl_seconds`.
pub async fn test_config_for(base_url: &str, cache_ttl: &str) -> ServiceConfig {
    let yaml = format!(
        r#"
settings:
  http:
    timeout_ms: 2000
  retry:
    attempts: 2
    base_delay_ms: 1
    max_delay_ms: 5
api:
  base_url: {base}
  token_url: {base}{token}
  authorize_url: {base}/oauth2/authorize
  redirect_uri: http://localhost
client:
  client_id:
    value: {id}
  client_secret:
    value: {secret}
cache:
  ttl_seconds: {{ {ttl} }}
"#,
        base = base_url,
        token = TOKEN_PATH,
        id = CLIENT_ID,
        secret = CLIENT_SECRET,
        ttl = cache_ttl
    );
    parse_config(yaml).await.expect("test config must be valid")
}

pub async fn test_config(server: &MockServer) -> ServiceConfig {
    test_config_for(&server.base_url(), "").await
}

/// Client already holding `credential`, backed by an in-memory store.
pub async fn connected_client(
    cfg: &ServiceConfig,
    credential: Credential,
) -> (FitbitClient, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new(Some(credential)));
    let client = FitbitClient::with_store(cfg, store.clone()).expect("client");
    client.authenticator().load().await.expect("credential loads");
    (client, store)
}

/// Token endpoint answering a refresh of `old_pair()` with `new_pair()`.
pub async fn mock_refresh_success<'a>(server: &'a MockServer) -> Mock<'a> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(TOKEN_PATH)
                .header("authorization", basic_header())
                .form_urlencoded_tuple("grant_type", "refresh_token")
                .form_urlencoded_tuple("refresh_token", "old-refresh");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "access_token": "new-access",
                    "refresh_token": "new-refresh",
                    "expires_in": 28800,
                    "token_type": "Bearer",
                    "user_id": "ABC123"
                }));
        })
        .await
}

/// Store whose writes always fail.
#[derive(Debug)]
pub struct ReadOnlyStore {
    pub credential: Credential,
}

#[async_trait]
impl TokenStore for ReadOnlyStore {
    async fn load(&self) -> ApiResult<Option<Credential>> {
        Ok(Some(self.credential.clone()))
    }

    async fn save(&self, _credential: &Credential) -> ApiResult<()> {
        Err(ApiError::Storage("read-only file system".to_owned()))
    }

    fn describe(&self) -> String {
        "read-only".to_owned()
    }
}

/// In-memory store whose writes can be switched off.
#[derive(Debug)]
pub struct FlakyStore {
    credential: RwLock<Credential>,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(credential),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TokenStore for FlakyStore {
    async fn load(&self) -> ApiResult<Option<Credential>> {
        Ok(Some(self.credential.read().await.clone()))
    }

    async fn save(&self, credential: &Credential) -> ApiResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::Storage("disk full".to_owned()));
        }
        *self.credential.write().await = credential.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        "flaky".to_owned()
    }
}

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}
