use crate::config::ServerConfig;
use crate::error::ServerResult;
use dashmap::DashMap;
use dispatch::{DispatchHandle, Dispatcher};
use leadrelay::PipelineConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use store::{BackendConfig, LeadStore, StoreConfig};

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Rate limit tracking: API key -> (count, window_start)
    pub rate_limiter: Arc<DashMap<String, (u32, std::time::Instant)>>,

    /// Store instance (shared across requests and the dispatch worker)
    pub store: Arc<LeadStore>,

    /// Producer handle to the background dispatch worker
    pub dispatch: DispatchHandle,

    /// Pipeline configuration applied to every ingestion
    pub pipeline: PipelineConfig,

    /// Prometheus render handle, set when the exporter is installed
    pub metrics: Option<PrometheusHandle>,
}

impl ServerState {
    /// Create new server state. Must run on a tokio runtime: the dispatch
    /// worker is spawned here.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let backend = match &config.db_path {
            Some(path) => BackendConfig::redb(path),
            None => BackendConfig::in_memory(),
        };
        let store = Arc::new(LeadStore::new(StoreConfig::new().with_backend(backend))?);

        let dispatch = Dispatcher::spawn(store.clone(), config.dispatch.clone())?;

        let pipeline = PipelineConfig {
            ingest: config.ingest.clone(),
        };

        Ok(Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(DashMap::new()),
            store,
            dispatch,
            pipeline,
            metrics: None,
        })
    }

    /// Attach the Prometheus render handle (installed once at startup).
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Check if API key is valid
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.config.api_keys.contains(key)
    }

    /// Check rate limit for API key
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = std::time::Instant::now();
        let window = std::time::Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;

        let mut entry = self.rate_limiter.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        // Reset if window has passed
        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }

        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }
}

/// Server metadata for health checks
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
}
