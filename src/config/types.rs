use serde::Deserialize;
use std::collections::HashMap;
use std::{env, fs};

use anyhow::{anyhow, Result};

use crate::cache::endpoint_family::EndpointFamily;
use crate::config::settings::SettingsConfig;
use crate::utils::constants::{
    DEFAULT_ACCESS_TOKEN_ENV, DEFAULT_API_BASE_URL, DEFAULT_AUTHORIZE_URL,
    DEFAULT_CREDENTIALS_PATH, DEFAULT_REDIRECT_URI, DEFAULT_REFRESH_TOKEN_ENV, DEFAULT_SCOPE,
    DEFAULT_TOKEN_URL,
};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    pub client: ClientConfig,
    #[serde(default)]
    pub token_store: TokenStoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// ================================
/// Provider endpoints
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// space separated, sent on refresh and in the authorize url
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_url: default_token_url(),
            authorize_url: default_authorize_url(),
            redirect_uri: default_redirect_uri(),
            scope: default_scope(),
        }
    }
}

/// ================================
/// Client identity (Basic auth on the token endpoint)
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub client_id: GenericSourceValue,
    pub client_secret: GenericSourceValue,
}

/// Where a configured secret comes from
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum GenericSourceValue {
    Literal { value: String },
    FromEnv { from_env: String },
    FromFile { path: String },
}

impl GenericSourceValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            GenericSourceValue::Literal { value } => Ok(value.to_owned()),
            GenericSourceValue::FromEnv { from_env } => env::var(from_env)
                .map_err(|err| anyhow!("env variable '{}' is not readable: {}", from_env, err)),
            GenericSourceValue::FromFile { path } => fs::read_to_string(path)
                .map(|res| res.trim().to_string())
                .map_err(|err| anyhow!("file '{}' is not readable: {}", path, err)),
        }
    }
}

/// ================================
/// Credential persistence
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct TokenStoreConfig {
    #[serde(default = "default_credentials_path")]
    pub path: String,
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_refresh_token_env")]
    pub refresh_token_env: String,
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
            access_token_env: default_access_token_env(),
            refresh_token_env: default_refresh_token_env(),
        }
    }
}

/// ================================
/// Response cache
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// per family override, families not listed keep their default ttl
    #[serde(default)]
    pub ttl_seconds: HashMap<EndpointFamily, u64>,
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_owned()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_owned()
}

fn default_authorize_url() -> String {
    DEFAULT_AUTHORIZE_URL.to_owned()
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_owned()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_owned()
}

fn default_credentials_path() -> String {
    DEFAULT_CREDENTIALS_PATH.to_owned()
}

fn default_access_token_env() -> String {
    DEFAULT_ACCESS_TOKEN_ENV.to_owned()
}

fn default_refresh_token_env() -> String {
    DEFAULT_REFRESH_TOKEN_ENV.to_owned()
}
