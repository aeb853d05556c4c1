//! # Fitbit API agent
//!
//! Keeps one OAuth2 credential alive for a single user, sends authenticated
//! requests with one refresh-and-retry on 401, and caches read responses
//! per endpoint family.
//!
//! Modules:
//! - `credentials` - token pair, client identity and durable token store
//! - `auth` - code exchange, single-flight refresh, credential state
//! - `executor` - request pipeline and outcome classification
//! - `cache` - endpoint families and the TTL response cache
//! - `api` - typed food and activity calls on top of the pipeline
//! - `config` - YAML service configuration and validation

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod helpers;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::client::FitbitClient;
pub use crate::config::types::ServiceConfig;
pub use crate::error::{ApiError, ApiResult};
