//! Server configuration
//!
//! Sources are layered, later ones winning: built-in defaults, the YAML
//! config file (optional), `VERDICT__`-prefixed environment variables, then
//! command line overrides.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use verdict_inference::{PackageSourceSpec, ServingConfig};

/// Environment variable prefix, nested keys are separated by `__`
pub const ENV_PREFIX: &str = "VERDICT";

/// Top-level server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: HttpSettings,

    /// Model package and inference settings
    #[serde(default)]
    pub serving: ServingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body in bytes
    #[serde(default = "default_request_body_limit")]
    pub request_body_limit: usize,

    /// Terminate instead of serving `unhealthy` when the model fails to load
    #[serde(default)]
    pub exit_on_load_failure: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            request_body_limit: default_request_body_limit(),
            exit_on_load_failure: false,
        }
    }
}

/// Command line values applied on top of file and environment sources
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub package: Option<PathBuf>,
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub exit_on_load_failure: bool,
}

impl ServerConfig {
    /// Load configuration from file and environment, then apply overrides
    pub fn load(config_path: impl AsRef<Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(config_path).format(FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                anyhow::anyhow!("Failed to read config {}: {}", config_path.display(), e)
            })?;

        let mut config: ServerConfig = settings
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(package) = &overrides.package {
            self.serving.package = PackageSourceSpec::Local {
                path: package.clone(),
            };
        }

        if let Some(listen) = &overrides.listen {
            self.server.listen = listen.clone();
        }

        if let Some(port) = overrides.port {
            self.server.port = port;
        }

        if overrides.exit_on_load_failure {
            self.server.exit_on_load_failure = true;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.serving.batch.max_batch_size == 0 {
            anyhow::bail!("serving.batch.max_batch_size must be greater than 0");
        }

        if let Some(threshold) = self.serving.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("serving.threshold {} is outside [0, 1]", threshold);
            }
        }

        if self.server.request_body_limit == 0 {
            anyhow::bail!("server.request_body_limit must be greater than 0");
        }

        Ok(())
    }

    /// `listen:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.listen, self.server.port)
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_body_limit() -> usize {
    2 * 1024 * 1024
}
