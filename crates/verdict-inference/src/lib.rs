//! Verdict Inference
//!
//! Text classification inference for a single loaded model package.
//!
//! The request path is:
//! - [`TextPreprocessor`] cleans and tokenizes text
//! - [`Vectorizer`] turns tokens into a fixed-length feature vector
//! - an [`InferenceBackend`] (normally [`LinearBackend`]) produces a class
//!   distribution
//! - [`Predictor`], [`BatchOrchestrator`] and [`topk`] derive the results
//!
//! [`ServingGate`] owns the lifecycle and only hands out the shared
//! [`InferenceRuntime`] once a package has loaded.

pub mod backend;
pub mod batch;
pub mod config;
pub mod loader;
pub mod package;
pub mod predictor;
pub mod preprocess;
pub mod serving;
pub mod topk;
pub mod vectorizer;

pub use backend::{Activation, DeviceType, InferenceBackend, LinearBackend};
pub use batch::{BatchConfig, BatchOptions, BatchOrchestrator};
pub use config::{DeviceSpec, PackageSourceSpec, ServingConfig};
pub use loader::{ModelLoader, PackageSource};
pub use package::{ModelPackage, ModelPackageBuilder, PackageManifest, MANIFEST_FILE};
pub use predictor::{argmax, Predictor, PredictorOptions, PROBABILITY_TOLERANCE};
pub use preprocess::{PreprocessConfig, TextPreprocessor};
pub use serving::{HealthSnapshot, InferenceRuntime, ServingGate};
pub use vectorizer::{
    Normalization, OovPolicy, PreprocessedInput, Vectorizer, VectorizerParams, Weighting,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{InferenceBackend, LinearBackend};
    pub use crate::batch::{BatchOptions, BatchOrchestrator};
    pub use crate::config::ServingConfig;
    pub use crate::loader::{ModelLoader, PackageSource};
    pub use crate::package::ModelPackage;
    pub use crate::predictor::Predictor;
    pub use crate::preprocess::{PreprocessConfig, TextPreprocessor};
    pub use crate::serving::{InferenceRuntime, ServingGate};
}
