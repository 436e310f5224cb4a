//! Shared application state

use crate::settings::ServerConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use verdict_inference::ServingGate;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle gate owning the loaded model
    pub gate: Arc<ServingGate>,

    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(gate: Arc<ServingGate>, config: ServerConfig) -> Self {
        Self {
            gate,
            config: Arc::new(config),
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Largest batch accepted by `/predict/batch`
    pub fn max_batch_size(&self) -> usize {
        self.config.serving.batch.max_batch_size
    }
}
