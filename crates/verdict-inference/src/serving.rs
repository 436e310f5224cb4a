//! Serving lifecycle gate
//!
//! [`ServingGate`] owns the lifecycle state and the shared
//! [`InferenceRuntime`]. The runtime is handed out as an `Arc` only while the
//! state is `Ready`; the lock is held just long enough to read the state and
//! clone the handle, never across inference.
//!
//! ```text
//! Unloaded -> Loading -> Ready -> Failed
//!                \-------------->/
//! ```

use crate::batch::{BatchOptions, BatchOrchestrator};
use crate::config::ServingConfig;
use crate::loader::ModelLoader;
use crate::package::ModelPackage;
use crate::predictor::Predictor;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{error, info, warn};
use verdict_core::{
    BatchResult, Error, LoadError, PredictionResult, Result, ServingState, TopKPrediction,
};

const SELF_CHECK_PROBES: [&str; 2] = ["this is a self check probe", ""];

/// Everything needed to answer requests for one loaded package
#[derive(Debug)]
pub struct InferenceRuntime {
    package: Arc<ModelPackage>,
    predictor: Arc<Predictor>,
    batch: BatchOrchestrator,
}

impl InferenceRuntime {
    pub fn new(package: ModelPackage, config: &ServingConfig) -> Result<Self> {
        let package = Arc::new(package);
        let predictor = Arc::new(Predictor::with_options(
            Arc::clone(&package),
            config.predictor_options(),
        )?);
        let batch = BatchOrchestrator::new(Arc::clone(&predictor), config.batch);

        Ok(Self {
            package,
            predictor,
            batch,
        })
    }

    pub fn package(&self) -> &ModelPackage {
        &self.package
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn batch(&self) -> &BatchOrchestrator {
        &self.batch
    }

    pub fn predict(&self, text: &str) -> Result<PredictionResult> {
        self.predictor.predict(text)
    }

    pub fn predict_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        options: BatchOptions,
    ) -> Result<BatchResult> {
        self.batch.predict_batch(texts, options)
    }

    pub fn predict_top_k(&self, text: &str, k: NonZeroUsize) -> Result<Vec<TopKPrediction>> {
        self.predictor.predict_top_k(text, k)
    }

    /// Probe a single prediction and a small batch end to end
    pub fn self_check(&self) -> Result<()> {
        self.predict(SELF_CHECK_PROBES[0])?;

        let batch = self.predict_batch(&SELF_CHECK_PROBES, BatchOptions::default())?;
        if batch.total_processed != SELF_CHECK_PROBES.len() {
            return Err(Error::inference(format!(
                "self check batch returned {} results for {} probes",
                batch.total_processed,
                SELF_CHECK_PROBES.len()
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of the gate, used by health endpoints
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub state: ServingState,
    pub model_loaded: bool,
    pub device: Option<String>,
    pub error: Option<String>,
    pub ready_since: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<u64>,
}

#[derive(Debug)]
struct GateInner {
    state: ServingState,
    runtime: Option<Arc<InferenceRuntime>>,
    failure: Option<String>,
    ready_since: Option<DateTime<Utc>>,
}

/// Lifecycle state machine guarding access to the inference runtime
#[derive(Debug)]
pub struct ServingGate {
    inner: RwLock<GateInner>,
}

impl Default for ServingGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ServingGate {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GateInner {
                state: ServingState::Unloaded,
                runtime: None,
                failure: None,
                ready_since: None,
            }),
        }
    }

    pub fn state(&self) -> ServingState {
        self.inner.read().state
    }

    /// Liveness holds in every state
    pub fn is_alive(&self) -> bool {
        true
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ServingState::Ready
    }

    /// Reason recorded by the transition into `Failed`
    pub fn failure_reason(&self) -> Option<String> {
        self.inner.read().failure.clone()
    }

    /// Shared runtime, only while `Ready`
    pub fn runtime(&self) -> Result<Arc<InferenceRuntime>> {
        let inner = self.inner.read();
        match (&inner.state, &inner.runtime) {
            (ServingState::Ready, Some(runtime)) => Ok(Arc::clone(runtime)),
            _ => Err(Error::NotReady(inner.state)),
        }
    }

    pub fn begin_loading(&self) -> Result<()> {
        self.transition(ServingState::Loading, |_| {})
    }

    pub fn mark_ready(&self, runtime: InferenceRuntime) -> Result<()> {
        let runtime = Arc::new(runtime);
        self.transition(ServingState::Ready, move |inner| {
            inner.runtime = Some(runtime);
            inner.ready_since = Some(Utc::now());
        })
    }

    pub fn mark_failed(&self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.transition(ServingState::Failed, move |inner| {
            inner.runtime = None;
            inner.failure = Some(reason);
        })
    }

    /// Load the configured package and drive the gate to `Ready` or `Failed`.
    ///
    /// When `self_check` is enabled the probes run before the runtime is
    /// published, so a failing package goes `Loading -> Failed` directly.
    pub fn load(&self, config: &ServingConfig) -> Result<()> {
        let loader = ModelLoader::new(config.device_type());
        let source = config.package_source();
        self.load_with(config, || loader.load_source(&source))
    }

    /// Same as [`load`](Self::load) with a caller supplied package source
    pub fn load_with<F>(&self, config: &ServingConfig, load_package: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<ModelPackage, LoadError>,
    {
        self.begin_loading()?;

        let runtime = match load_package()
            .map_err(Error::from)
            .and_then(|package| InferenceRuntime::new(package, config))
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Model load failed: {}", e);
                self.mark_failed(e.to_string())?;
                return Err(e);
            }
        };

        // Probe while still Loading so readiness is only advertised once
        if config.self_check {
            if let Err(e) = runtime.self_check() {
                error!("Self check failed: {}", e);
                self.mark_failed(format!("self check failed: {}", e))?;
                return Err(e);
            }
            info!("Self check passed");
        }

        self.mark_ready(runtime)
    }

    pub fn health(&self) -> HealthSnapshot {
        let inner = self.inner.read();
        let uptime_seconds = inner
            .ready_since
            .filter(|_| inner.state == ServingState::Ready)
            .map(|since| (Utc::now() - since).num_seconds().max(0) as u64);

        HealthSnapshot {
            state: inner.state,
            model_loaded: inner.runtime.is_some(),
            device: inner
                .runtime
                .as_ref()
                .map(|runtime| runtime.package().device().to_string()),
            error: inner.failure.clone(),
            ready_since: inner.ready_since,
            uptime_seconds,
        }
    }

    fn transition<F>(&self, next: ServingState, apply: F) -> Result<()>
    where
        F: FnOnce(&mut GateInner),
    {
        let mut inner = self.inner.write();
        let from = inner.state;
        if !from.can_transition_to(next) {
            warn!("Rejected serving state transition {} -> {}", from, next);
            return Err(Error::InvalidTransition { from, to: next });
        }

        inner.state = next;
        apply(&mut inner);
        info!("Serving state {} -> {}", from, next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unloaded() {
        let gate = ServingGate::new();
        assert_eq!(gate.state(), ServingState::Unloaded);
        assert!(gate.is_alive());
        assert!(!gate.is_ready());
        assert!(matches!(
            gate.runtime(),
            Err(Error::NotReady(ServingState::Unloaded))
        ));
    }

    #[test]
    fn test_rejected_transition_leaves_state() {
        let gate = ServingGate::new();
        let err = gate.mark_failed("boom").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: ServingState::Unloaded,
                to: ServingState::Failed
            }
        ));
        assert_eq!(gate.state(), ServingState::Unloaded);
        assert!(gate.failure_reason().is_none());
    }

    #[test]
    fn test_failed_is_terminal() {
        let gate = ServingGate::new();
        gate.begin_loading().unwrap();
        gate.mark_failed("missing weights").unwrap();

        assert!(gate.begin_loading().is_err());
        assert!(gate.mark_failed("again").is_err());
        assert_eq!(gate.state(), ServingState::Failed);
        assert_eq!(gate.failure_reason().as_deref(), Some("missing weights"));
        assert!(gate.is_alive());
    }

    #[test]
    fn test_load_failure_reports_unhealthy() {
        let gate = ServingGate::new();
        let config = ServingConfig::for_package("/definitely/not/a/package");

        let err = gate.load(&config).unwrap_err();
        assert!(matches!(err, Error::Load(LoadError::MissingFile(_))));

        let health = gate.health();
        assert_eq!(health.state, ServingState::Failed);
        assert!(!health.model_loaded);
        assert!(health.device.is_none());
        assert!(health.uptime_seconds.is_none());
        assert!(health.error.is_some());
    }
}
