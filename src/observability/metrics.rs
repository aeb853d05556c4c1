use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Request pipeline
    pub api_requests: IntCounterVec,
    pub api_request_failures: IntCounterVec,
    pub api_request_duration: HistogramVec,

    // Token lifecycle
    pub token_refreshes: IntCounterVec,
    pub credential_state: IntGaugeVec,

    // Response cache
    pub cache_lookups: IntCounterVec,
    pub cache_invalidations: IntCounterVec,
    pub cached_entries: IntGauge,

    // Config/runtime
    pub config_parse_failures: IntCounter,
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("fitlogagent".into()), None)
            .expect("static registry namespace");

        let metrics: Arc<Metrics> = Arc::new(Self {
            api_requests: IntCounterVec::new(Opts::new("api_requests_total", "Upstream calls by endpoint family and method"), &["family", "method"]).expect("metric"),
            api_request_failures: IntCounterVec::new(Opts::new("api_request_failures_total", "Non-success outcomes by family and reason"), &["family", "reason"]).expect("metric"),
            api_request_duration: HistogramVec::new(HistogramOpts::new("api_request_duration_seconds", "Request pipeline duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]), &["family"]).expect("metric"),

            token_refreshes: IntCounterVec::new(Opts::new("token_refreshes_total", "Refresh attempts by result"), &["result"]).expect("metric"),
            credential_state: IntGaugeVec::new(Opts::new("credential_state", "1 for the current credential state, 0 otherwise"), &["state"]).expect("metric"),

            cache_lookups: IntCounterVec::new(Opts::new("cache_lookups_total", "Cache lookups by family and result"), &["family", "result"]).expect("metric"),
            cache_invalidations: IntCounterVec::new(Opts::new("cache_invalidations_total", "Family invalidations after mutations"), &["family"]).expect("metric"),
            cached_entries: IntGauge::new("cached_entries", "Entries currently held by the response cache").expect("metric"),

            config_parse_failures: IntCounter::new("config_parse_failures_total", "Config files that failed to parse").expect("metric"),
            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup").expect("metric"),
            up: IntGauge::new("up", "1 if service is healthy").expect("metric"),

            registry,
        });

        let reg = &metrics.registry;
        reg.register(Box::new(metrics.api_requests.clone())).expect("register");
        reg.register(Box::new(metrics.api_request_failures.clone())).expect("register");
        reg.register(Box::new(metrics.api_request_duration.clone())).expect("register");
        reg.register(Box::new(metrics.token_refreshes.clone())).expect("register");
        reg.register(Box::new(metrics.credential_state.clone())).expect("register");
        reg.register(Box::new(metrics.cache_lookups.clone())).expect("register");
        reg.register(Box::new(metrics.cache_invalidations.clone())).expect("register");
        reg.register(Box::new(metrics.cached_entries.clone())).expect("register");
        reg.register(Box::new(metrics.config_parse_failures.clone())).expect("register");
        reg.register(Box::new(metrics.config_validation_errors.clone())).expect("register");
        reg.register(Box::new(metrics.up.clone())).expect("register");

        metrics
    }
}
