#[cfg(test)]
mod tests {
    use std::path::Path;

    use serial_test::serial;

    use crate::cache::endpoint_family::EndpointFamily;
    use crate::config::proc_loader::{expand_env_vars, file_to_config, parse_config};
    use crate::config::settings::LogFormat;
    use crate::config::types::GenericSourceValue;
    use crate::utils::constants::{DEFAULT_API_BASE_URL, DEFAULT_CREDENTIALS_PATH, DEFAULT_SCOPE};

    #[tokio::test]
    #[serial]
    async fn shipped_config_is_valid() {
        let service_config = file_to_config(Path::new("fitlog-agent.yaml"))
            .await
            .expect("fitlog-agent.yaml must exist in repo root for tests");
        assert!(service_config.settings.metrics.is_enabled);
        assert_eq!(service_config.cache.ttl_seconds[&EndpointFamily::FoodUnits], 86_400);
    }

    #[tokio::test]
    async fn minimal_config_gets_defaults() {
        let yaml = r#"
settings: {}
client:
  client_id:
    value: id
  client_secret:
    path: /run/secrets/fitbit
"#;
        let cfg = parse_config(yaml.to_string()).await.expect("valid");

        assert_eq!(cfg.api.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cfg.api.scope, DEFAULT_SCOPE);
        assert_eq!(cfg.token_store.path, DEFAULT_CREDENTIALS_PATH);
        assert_eq!(cfg.token_store.access_token_env, "ACCESSTOKEN");
        assert_eq!(cfg.settings.http.timeout_ms, 10_000);
        assert_eq!(cfg.settings.server.port, "9100");
        assert!(cfg.cache.ttl_seconds.is_empty());
        assert!(matches!(cfg.client.client_secret, GenericSourceValue::FromFile { .. }));

        let logging = cfg.settings.logging.expect("logging default applied");
        assert_eq!(logging.level, "info");
        assert!(logging.format == LogFormat::Compact || logging.format == LogFormat::Json);
    }

    #[tokio::test]
    async fn invalid_config_reports_all_errors() {
        let invalid_yaml = r#"
settings:
  retry:
    attempts: 0
    base_delay_ms: 500
    max_delay_ms: 100
  http:
    timeout_ms: 0
  server:
    host: 127.0.0.1
    port: "not-a-port"
api:
  base_url: ftp://api.fitbit.com
  scope: "  "
client:
  client_id:
    value: ""
  client_secret:
    from_env: CLIENTSECRET
token_store:
  access_token_env: TOKENS
  refresh_token_env: TOKENS
"#;
        let err = parse_config(invalid_yaml.to_string())
            .await
            .expect_err("invalid config unexpectedly validated")
            .to_string();

        assert!(err.contains("config is not valid, total errors:8"), "{}", err);
        assert!(err.contains("settings.retry.attempts"));
        assert!(err.contains("max_delay_ms (100) must be >= base_delay_ms (500)"));
        assert!(err.contains("settings.http.timeout_ms"));
        assert!(err.contains("settings.server.port"));
        assert!(err.contains("api.base_url"));
        assert!(err.contains("api.scope"));
        assert!(err.contains("client.client_id.value"));
        assert!(err.contains("must differ"));
    }

    #[tokio::test]
    async fn unknown_cache_family_fails_to_parse() {
        let yaml = r#"
settings: {}
client:
  client_id: { value: id }
  client_secret: { value: secret }
cache:
  ttl_seconds: { sleep_log: 10 }
"#;
        assert!(parse_config(yaml.to_string()).await.is_err());
    }

    #[test]
    #[serial]
    fn env_placeholders_expand_with_defaults() {
        std::env::set_var("FITLOG_TEST_PORT", "9200");
        std::env::remove_var("FITLOG_TEST_MISSING");

        let expanded = expand_env_vars("port: ${FITLOG_TEST_PORT}\npath: ${FITLOG_TEST_MISSING:creds.json}");
        assert_eq!(expanded, "port: 9200\npath: creds.json");

        std::env::remove_var("FITLOG_TEST_PORT");
    }

    #[test]
    #[serial]
    fn client_values_resolve_from_env_and_file() {
        std::env::set_var("FITLOG_TEST_CLIENT_ID", "from-env");
        let from_env = GenericSourceValue::FromEnv {
            from_env: "FITLOG_TEST_CLIENT_ID".to_owned(),
        };
        assert_eq!(from_env.resolve().expect("env"), "from-env");
        std::env::remove_var("FITLOG_TEST_CLIENT_ID");
        assert!(from_env.resolve().is_err());

        let dir = tempfile::tempdir().expect("tempdir");
        let secret = dir.path().join("secret");
        std::fs::write(&secret, "s3cret\n").expect("write");
        let from_file = GenericSourceValue::FromFile {
            path: secret.to_string_lossy().into_owned(),
        };
        assert_eq!(from_file.resolve().expect("file"), "s3cret");
    }
}
