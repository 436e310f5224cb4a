//! Model package loading
//!
//! Loading is synchronous and all-or-nothing: the manifest is parsed, the
//! vectorizer and weights are validated against each other, and only a fully
//! consistent [`ModelPackage`] is returned.

use crate::backend::{DeviceType, LinearBackend};
use crate::package::{ModelPackage, PackageManifest, MANIFEST_FILE};
use crate::vectorizer::Vectorizer;
use candle_core::{Device, Tensor};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use verdict_core::LoadError;

/// Source location for a model package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Package directory or manifest file on the local file system
    LocalPath(PathBuf),

    /// Package repository on the Hugging Face Hub
    HuggingFace {
        repo_id: String,
        revision: Option<String>,
    },
}

impl PackageSource {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::LocalPath(path.into())
    }

    pub fn hf(repo_id: impl Into<String>) -> Self {
        Self::HuggingFace {
            repo_id: repo_id.into(),
            revision: None,
        }
    }

    /// Set Hugging Face revision
    pub fn with_revision(self, revision: impl Into<String>) -> Self {
        match self {
            Self::HuggingFace { repo_id, .. } => Self::HuggingFace {
                repo_id,
                revision: Some(revision.into()),
            },
            other => other,
        }
    }
}

/// Loads model packages onto a compute device
#[derive(Debug, Clone, Default)]
pub struct ModelLoader {
    device: DeviceType,
}

impl ModelLoader {
    pub fn new(device: DeviceType) -> Self {
        Self { device }
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    /// Resolve a source and load the package it points to
    pub fn load_source(&self, source: &PackageSource) -> Result<ModelPackage, LoadError> {
        let path = match source {
            PackageSource::LocalPath(path) => path.clone(),
            PackageSource::HuggingFace { repo_id, revision } => {
                Self::download_from_huggingface(repo_id, revision.as_deref())?
            }
        };
        self.load(path)
    }

    /// Load a package from a directory (containing `package.yaml`) or from a
    /// manifest file path
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ModelPackage, LoadError> {
        let start = Instant::now();
        let manifest_path = Self::resolve_manifest_path(path.as_ref())?;
        let package_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        info!("Loading model package from {}", manifest_path.display());

        let manifest = Self::read_manifest(&manifest_path)?;
        let name = manifest
            .name
            .clone()
            .unwrap_or_else(|| Self::default_name(&package_dir));

        let vectorizer = Vectorizer::from_params(manifest.vectorizer, manifest.max_input_length)?;
        debug!(
            "Vectorizer ready: {} features, {:?} weighting",
            vectorizer.dim(),
            vectorizer.weighting()
        );

        let weights_path = package_dir.join(&manifest.weights);
        let tensors = Self::read_weights(&weights_path)?;
        let backend = LinearBackend::from_tensors(tensors, manifest.activation, self.device)?;

        let package = ModelPackage::builder(manifest.labels, vectorizer, Arc::new(backend))
            .name(name)
            .version(manifest.version)
            .model_type(manifest.model_type)
            .threshold(manifest.threshold)
            .preprocessing(manifest.preprocessing)
            .build()?;

        info!(
            "Loaded model package '{}' v{} ({} classes, device={}) in {}ms",
            package.name(),
            package.version(),
            package.num_classes(),
            package.device(),
            start.elapsed().as_millis()
        );

        Ok(package)
    }

    /// Accept either a package directory or a manifest file
    fn resolve_manifest_path(path: &Path) -> Result<PathBuf, LoadError> {
        if !path.exists() {
            return Err(LoadError::MissingFile(path.to_path_buf()));
        }

        if path.is_dir() {
            let manifest = path.join(MANIFEST_FILE);
            if !manifest.is_file() {
                return Err(LoadError::MissingFile(manifest));
            }
            return Ok(manifest);
        }

        Ok(path.to_path_buf())
    }

    /// Parse the manifest; syntax errors are corruption, missing or mistyped
    /// fields are schema mismatches
    fn read_manifest(path: &Path) -> Result<PackageManifest, LoadError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::MissingFile(path.to_path_buf()),
            _ => LoadError::corrupt(path, e),
        })?;

        // YAML is a superset of JSON, so `.json` manifests parse here too
        let value: serde_yaml::Value =
            serde_yaml::from_str(&contents).map_err(|e| LoadError::corrupt(path, e))?;

        if !value.is_mapping() {
            return Err(LoadError::schema(format!(
                "manifest {} is not a mapping",
                path.display()
            )));
        }

        serde_yaml::from_value(value)
            .map_err(|e| LoadError::schema(format!("manifest {}: {}", path.display(), e)))
    }

    fn read_weights(path: &Path) -> Result<HashMap<String, Tensor>, LoadError> {
        if !path.is_file() {
            return Err(LoadError::MissingFile(path.to_path_buf()));
        }

        candle_core::safetensors::load(path, &Device::Cpu).map_err(|e| LoadError::corrupt(path, e))
    }

    fn default_name(package_dir: &Path) -> String {
        package_dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Fetch manifest and weights from the Hub, returning the local snapshot
    /// directory
    fn download_from_huggingface(repo_id: &str, revision: Option<&str>) -> Result<PathBuf, LoadError> {
        let revision = revision.unwrap_or("main");
        info!("Downloading model package from HuggingFace: {} @ {}", repo_id, revision);

        let api = Api::new()
            .map_err(|e| LoadError::backend(format!("Failed to initialize HF API: {}", e)))?;
        let repo = api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let manifest_path = repo.get(MANIFEST_FILE).map_err(|e| {
            LoadError::backend(format!("Failed to download {} from HF: {}", MANIFEST_FILE, e))
        })?;

        let manifest = Self::read_manifest(&manifest_path)?;
        let weights_name = manifest.weights.to_string_lossy().replace('\\', "/");
        debug!("Downloading weights file {}", weights_name);
        repo.get(&weights_name).map_err(|e| {
            LoadError::backend(format!("Failed to download {} from HF: {}", weights_name, e))
        })?;

        let package_dir = manifest_path
            .parent()
            .ok_or_else(|| LoadError::backend("Invalid cache path"))?;

        info!("Model package available at: {}", package_dir.display());
        Ok(package_dir.to_path_buf())
    }
}
