//! Configuration for package loading and serving

use crate::batch::BatchConfig;
use crate::loader::PackageSource;
use crate::predictor::PredictorOptions;
use crate::preprocess::PreprocessConfig;
use crate::DeviceType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Serving configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    /// Where the model package lives
    #[serde(default)]
    pub package: PackageSourceSpec,

    /// Compute device
    #[serde(default)]
    pub device: DeviceSpec,

    /// Replaces the package's preprocessing when set
    #[serde(default)]
    pub preprocessing: Option<PreprocessConfig>,

    /// Replaces the package's decision threshold when set
    #[serde(default)]
    pub threshold: Option<f32>,

    /// Batch limits
    #[serde(default)]
    pub batch: BatchConfig,

    /// Run a probe prediction after loading
    #[serde(default = "default_true")]
    pub self_check: bool,
}

/// Package source specification (for config files)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageSourceSpec {
    /// Local directory or manifest file
    Local { path: PathBuf },

    /// Hugging Face Hub
    HuggingFace {
        repo_id: String,
        revision: Option<String>,
    },
}

impl Default for PackageSourceSpec {
    fn default() -> Self {
        Self::Local {
            path: default_package_path(),
        }
    }
}

/// Device specification (for config files)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda { index: Option<usize> },
    Metal { index: Option<usize> },
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            package: PackageSourceSpec::default(),
            device: DeviceSpec::Cpu,
            preprocessing: None,
            threshold: None,
            batch: BatchConfig::default(),
            self_check: true,
        }
    }
}

impl ServingConfig {
    /// Serve the package at `path` with defaults for everything else
    pub fn for_package(path: impl Into<PathBuf>) -> Self {
        Self {
            package: PackageSourceSpec::Local { path: path.into() },
            ..Default::default()
        }
    }

    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Convert to a loader source
    pub fn package_source(&self) -> PackageSource {
        match &self.package {
            PackageSourceSpec::Local { path } => PackageSource::LocalPath(path.clone()),
            PackageSourceSpec::HuggingFace { repo_id, revision } => PackageSource::HuggingFace {
                repo_id: repo_id.clone(),
                revision: revision.clone(),
            },
        }
    }

    pub fn device_type(&self) -> DeviceType {
        self.device.to_device_type()
    }

    /// Overrides handed to the predictor
    pub fn predictor_options(&self) -> PredictorOptions {
        PredictorOptions {
            preprocessing: self.preprocessing,
            threshold: self.threshold,
        }
    }
}

impl DeviceSpec {
    /// Convert to DeviceType
    pub fn to_device_type(&self) -> DeviceType {
        match self {
            DeviceSpec::Cpu => DeviceType::Cpu,
            DeviceSpec::Cuda { index } => DeviceType::Cuda(index.unwrap_or(0)),
            DeviceSpec::Metal { index } => DeviceType::Metal(index.unwrap_or(0)),
        }
    }
}

fn default_package_path() -> PathBuf {
    PathBuf::from("./model")
}

fn default_true() -> bool {
    true
}
