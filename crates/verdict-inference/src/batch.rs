//! Batched prediction
//!
//! All texts are vectorized first, then the backend is invoked once for the
//! whole stack and the rows are split back out by input index. The call is
//! atomic: any failure fails the whole batch.

use crate::predictor::Predictor;
use crate::vectorizer::PreprocessedInput;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use verdict_core::{BatchResult, Result};

/// Batch limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Largest accepted batch, enforced by the request boundary
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_max_batch_size() -> usize {
    64
}

/// Per-call batch options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Include the full distribution in every result
    pub return_probabilities: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            return_probabilities: true,
        }
    }
}

/// Runs many texts through one model invocation
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    predictor: Arc<Predictor>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(predictor: Arc<Predictor>, config: BatchConfig) -> Self {
        Self { predictor, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    /// Predict every text, preserving input order
    pub fn predict_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        options: BatchOptions,
    ) -> Result<BatchResult> {
        if texts.is_empty() {
            return Ok(BatchResult::empty());
        }

        let start = Instant::now();
        let inputs: Vec<PreprocessedInput> = texts
            .iter()
            .map(|text| self.predictor.preprocess(text.as_ref()))
            .collect();

        let distributions = self
            .predictor
            .package()
            .backend()
            .predict_batch(&inputs)
            .map_err(|e| {
                warn!("Batch of {} failed during inference: {}", texts.len(), e);
                e
            })?;

        if distributions.len() != texts.len() {
            return Err(verdict_core::Error::inference(format!(
                "shape mismatch: model returned {} rows for {} inputs",
                distributions.len(),
                texts.len()
            )));
        }

        let predictions = texts
            .iter()
            .zip(&distributions)
            .map(|(text, distribution)| {
                self.predictor.check_distribution(distribution)?;
                self.predictor.result_from_distribution(
                    text.as_ref(),
                    distribution,
                    options.return_probabilities,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            batch_size = texts.len(),
            latency_us = start.elapsed().as_micros() as u64,
            "batch prediction complete"
        );

        Ok(BatchResult::new(predictions))
    }
}
