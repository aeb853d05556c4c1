use anyhow::{bail, Result};
use tracing::{error, info};

use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::config::types::{ApiConfig, GenericSourceValue, ServiceConfig};
use crate::observability::metrics::get_metrics;

/// Collects every problem before failing so one run reports them all.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_api(&cfg.api, &mut errors);
    validate_client_value("client.client_id", &cfg.client.client_id, &mut errors);
    validate_client_value("client.client_secret", &cfg.client.client_secret, &mut errors);

    if cfg.token_store.path.trim().is_empty() {
        errors.push("token_store.path must not be empty".to_owned());
    }
    if cfg.token_store.access_token_env == cfg.token_store.refresh_token_env {
        errors.push(format!(
            "token_store.access_token_env and token_store.refresh_token_env must differ, both are '{}'",
            cfg.token_store.access_token_env
        ));
    }

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        bail!(
            "config is not valid, total errors:{}, \n{}",
            errors.len(),
            errors.join("\n")
        )
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if let Some(retry) = &settings.retry {
        validate_retry("settings.retry", retry, errors);
    }

    if settings.http.timeout_ms == 0 {
        errors.push("settings.http.timeout_ms must be > 0".to_owned());
    }

    if settings.server.host.is_empty() {
        errors.push("settings.server.host must not be empty".to_owned());
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be a valid port number",
            settings.server.port
        ));
    }

    if settings.metrics.is_enabled && !settings.metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            settings.metrics.path
        ));
    }
}

fn validate_retry(ctx: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if let Some(0) = retry.attempts {
        errors.push(format!("{}.attempts must be >= 1", ctx));
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                ctx, max, base
            ));
        }
    }
}

fn validate_api(api: &ApiConfig, errors: &mut Vec<String>) {
    for (name, url) in [
        ("api.base_url", &api.base_url),
        ("api.token_url", &api.token_url),
        ("api.authorize_url", &api.authorize_url),
        ("api.redirect_uri", &api.redirect_uri),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!("{} '{}' must be an http(s) url", name, url));
        }
    }
    if api.scope.trim().is_empty() {
        errors.push("api.scope must not be empty".to_owned());
    }
}

fn validate_client_value(ctx: &str, value: &GenericSourceValue, errors: &mut Vec<String>) {
    match value {
        GenericSourceValue::Literal { value } if value.trim().is_empty() => {
            errors.push(format!("{}.value must not be empty", ctx));
        }
        GenericSourceValue::FromEnv { from_env } if from_env.trim().is_empty() => {
            errors.push(format!("{}.from_env must name a variable", ctx));
        }
        GenericSourceValue::FromFile { path } if path.trim().is_empty() => {
            errors.push(format!("{}.path must not be empty", ctx));
        }
        _ => {}
    }
}
