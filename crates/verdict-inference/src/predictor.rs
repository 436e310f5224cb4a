//! Single-text prediction

use crate::package::ModelPackage;
use crate::preprocess::{PreprocessConfig, TextPreprocessor};
use crate::topk;
use crate::vectorizer::PreprocessedInput;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use verdict_core::{PredictionResult, Probabilities, Result, TopKPrediction};

/// Allowed deviation of a distribution's sum from 1.0
pub const PROBABILITY_TOLERANCE: f32 = 1e-4;

/// Overrides applied on top of the package defaults
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PredictorOptions {
    /// Replaces the package's preprocessing configuration
    pub preprocessing: Option<PreprocessConfig>,

    /// Replaces the package's decision threshold
    pub threshold: Option<f32>,
}

/// Index and value of the largest probability; the first occurrence wins ties
pub fn argmax(distribution: &[f32]) -> Option<(usize, f32)> {
    distribution
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (idx, p)| match best {
            Some((_, max)) if p <= max => best,
            _ => Some((idx, p)),
        })
}

/// Preprocessing + model invocation + result derivation for one text
#[derive(Debug)]
pub struct Predictor {
    package: Arc<ModelPackage>,
    preprocessor: TextPreprocessor,
    threshold: f32,
}

impl Predictor {
    /// Predictor using the package's own preprocessing and threshold
    pub fn new(package: Arc<ModelPackage>) -> Result<Self> {
        Self::with_options(package, PredictorOptions::default())
    }

    pub fn with_options(package: Arc<ModelPackage>, options: PredictorOptions) -> Result<Self> {
        let threshold = options.threshold.unwrap_or_else(|| package.threshold());
        if !(0.0..=1.0).contains(&threshold) {
            return Err(verdict_core::Error::config(format!(
                "threshold {} is outside [0, 1]",
                threshold
            )));
        }

        let preprocessing = options
            .preprocessing
            .unwrap_or_else(|| *package.preprocessing());
        let preprocessor = TextPreprocessor::new(preprocessing)?;

        Ok(Self {
            package,
            preprocessor,
            threshold,
        })
    }

    pub fn package(&self) -> &Arc<ModelPackage> {
        &self.package
    }

    pub fn preprocessor(&self) -> &TextPreprocessor {
        &self.preprocessor
    }

    /// Effective decision threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Text to model-ready vector
    pub fn preprocess(&self, text: &str) -> PreprocessedInput {
        self.preprocessor.transform(text, self.package.vectorizer())
    }

    /// Validated class distribution for `text`
    pub fn distribution(&self, text: &str) -> Result<Vec<f32>> {
        let input = self.preprocess(text);
        let distribution = self.package.backend().predict(&input)?;
        self.check_distribution(&distribution)?;
        Ok(distribution)
    }

    /// Predict the class of `text`
    pub fn predict(&self, text: &str) -> Result<PredictionResult> {
        let start = Instant::now();
        let distribution = self.distribution(text)?;
        let result = self.result_from_distribution(text, &distribution, true)?;

        debug!(
            label = %result.label,
            confidence = result.confidence,
            latency_us = start.elapsed().as_micros() as u64,
            "prediction complete"
        );
        Ok(result)
    }

    /// The `k` most probable labels for `text`
    pub fn predict_top_k(&self, text: &str, k: NonZeroUsize) -> Result<Vec<TopKPrediction>> {
        let distribution = self.distribution(text)?;
        Ok(topk::top_k(&distribution, self.package.labels(), k))
    }

    /// Reject distributions of the wrong length, with negative or non-finite
    /// entries, or not summing to 1.0 within tolerance
    pub(crate) fn check_distribution(&self, distribution: &[f32]) -> Result<()> {
        let expected = self.package.num_classes();
        if distribution.len() != expected {
            return Err(verdict_core::Error::inference(format!(
                "shape mismatch: model returned {} probabilities for {} classes",
                distribution.len(),
                expected
            )));
        }

        if distribution.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(verdict_core::Error::inference(
                "numeric failure: probabilities must be finite and non-negative",
            ));
        }

        let total: f32 = distribution.iter().sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(verdict_core::Error::inference(format!(
                "numeric failure: probabilities sum to {}",
                total
            )));
        }

        Ok(())
    }

    /// Derive the labeled result from an already validated distribution
    pub(crate) fn result_from_distribution(
        &self,
        text: &str,
        distribution: &[f32],
        include_probabilities: bool,
    ) -> Result<PredictionResult> {
        let labels = self.package.labels();
        let (predicted_class, confidence) = argmax(distribution)
            .ok_or_else(|| verdict_core::Error::inference("empty probability distribution"))?;

        let (probability_negative, probability_positive) = if self.package.is_binary() {
            (Some(distribution[0]), Some(distribution[1]))
        } else {
            (None, None)
        };

        Ok(PredictionResult {
            text: text.to_string(),
            predicted_class,
            label: labels[predicted_class].clone(),
            confidence,
            is_confident: confidence >= self.threshold,
            probabilities: include_probabilities
                .then(|| Probabilities::from_distribution(labels, distribution)),
            probability_positive,
            probability_negative,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_first_occurrence() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), Some((0, 0.4)));
        assert_eq!(argmax(&[0.25, 0.25, 0.25, 0.25]), Some((0, 0.25)));
        assert_eq!(argmax(&[0.0, 0.5, 0.5]), Some((1, 0.5)));
        assert_eq!(argmax(&[]), None);
    }
}
