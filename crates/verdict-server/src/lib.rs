//! Verdict Server
//!
//! HTTP surface for a single text classification model: prediction, batch
//! prediction, top-k, model info, health probes and Prometheus metrics.

pub mod routes;
pub mod settings;
pub mod state;

pub use routes::{create_router, AppError};
pub use settings::{ConfigOverrides, HttpSettings, ServerConfig};
pub use state::AppState;
