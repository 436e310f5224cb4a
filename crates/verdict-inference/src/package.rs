//! Model package: the immutable unit of deployment
//!
//! A package bundles the vectorizer, the model backend, the ordered label set
//! and the decision threshold. It is built once by the loader, wrapped in an
//! `Arc`, and only ever read afterwards.

use crate::backend::{Activation, InferenceBackend};
use crate::preprocess::PreprocessConfig;
use crate::vectorizer::{Vectorizer, VectorizerParams};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use verdict_core::LoadError;

/// Manifest file looked up inside a package directory
pub const MANIFEST_FILE: &str = "package.yaml";

/// On-disk package manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package name
    #[serde(default)]
    pub name: Option<String>,

    /// Package version
    #[serde(default = "default_version")]
    pub version: String,

    /// Free-form model family, reported by model info
    #[serde(default = "default_model_type")]
    pub model_type: String,

    /// Class labels, index = class id
    pub labels: Vec<String>,

    /// Decision threshold for `is_confident`
    pub threshold: f32,

    /// Token cap applied before vectorization
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    /// Preprocessing the model was trained with
    #[serde(default)]
    pub preprocessing: PreprocessConfig,

    /// Vectorizer parameters
    pub vectorizer: VectorizerParams,

    /// Weights file, relative to the manifest directory
    pub weights: PathBuf,

    /// Output activation
    #[serde(default)]
    pub activation: Activation,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_model_type() -> String {
    "linear".to_string()
}

fn default_max_input_length() -> usize {
    512
}

/// Loaded, validated model package
pub struct ModelPackage {
    name: String,
    version: String,
    model_type: String,
    labels: Vec<String>,
    threshold: f32,
    preprocessing: PreprocessConfig,
    vectorizer: Vectorizer,
    backend: Arc<dyn InferenceBackend>,
}

impl ModelPackage {
    /// Start assembling a package
    pub fn builder(
        labels: Vec<String>,
        vectorizer: Vectorizer,
        backend: Arc<dyn InferenceBackend>,
    ) -> ModelPackageBuilder {
        ModelPackageBuilder {
            name: "model".to_string(),
            version: default_version(),
            model_type: default_model_type(),
            labels,
            threshold: 0.5,
            preprocessing: PreprocessConfig::default(),
            vectorizer,
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Class labels, index = class id
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Preprocessing the package was built with
    pub fn preprocessing(&self) -> &PreprocessConfig {
        &self.preprocessing
    }

    pub fn vectorizer(&self) -> &Vectorizer {
        &self.vectorizer
    }

    pub fn backend(&self) -> &dyn InferenceBackend {
        self.backend.as_ref()
    }

    pub fn max_input_length(&self) -> usize {
        self.vectorizer.max_tokens()
    }

    pub fn device(&self) -> &str {
        self.backend.device_name()
    }

    /// Binary packages get positive/negative convenience fields
    pub fn is_binary(&self) -> bool {
        self.labels.len() == 2
    }
}

impl fmt::Debug for ModelPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelPackage")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("model_type", &self.model_type)
            .field("labels", &self.labels)
            .field("threshold", &self.threshold)
            .field("input_dim", &self.vectorizer.dim())
            .field("device", &self.device())
            .finish()
    }
}

/// Builder that validates package consistency on `build`
pub struct ModelPackageBuilder {
    name: String,
    version: String,
    model_type: String,
    labels: Vec<String>,
    threshold: f32,
    preprocessing: PreprocessConfig,
    vectorizer: Vectorizer,
    backend: Arc<dyn InferenceBackend>,
}

impl ModelPackageBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = model_type.into();
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn preprocessing(mut self, config: PreprocessConfig) -> Self {
        self.preprocessing = config;
        self
    }

    /// Check labels, threshold, and that vectorizer, backend and labels agree
    pub fn build(self) -> Result<ModelPackage, LoadError> {
        if self.labels.is_empty() {
            return Err(LoadError::schema("package has no labels"));
        }

        let mut seen = HashSet::with_capacity(self.labels.len());
        for label in &self.labels {
            if !seen.insert(label.as_str()) {
                return Err(LoadError::schema(format!("duplicate label '{}'", label)));
            }
        }

        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(LoadError::schema(format!(
                "threshold {} is outside [0, 1]",
                self.threshold
            )));
        }

        if self.backend.num_classes() != self.labels.len() {
            return Err(LoadError::schema(format!(
                "model produces {} classes but package lists {} labels",
                self.backend.num_classes(),
                self.labels.len()
            )));
        }

        if self.backend.input_dim() != self.vectorizer.dim() {
            return Err(LoadError::schema(format!(
                "model expects {} input features but vectorizer produces {}",
                self.backend.input_dim(),
                self.vectorizer.dim()
            )));
        }

        Ok(ModelPackage {
            name: self.name,
            version: self.version,
            model_type: self.model_type,
            labels: self.labels,
            threshold: self.threshold,
            preprocessing: self.preprocessing,
            vectorizer: self.vectorizer,
            backend: self.backend,
        })
    }
}
