//! Verdict Core
//!
//! Core types and error handling shared across Verdict components.
//!
//! This crate provides:
//! - The error taxonomy (load, validation, not-ready, inference)
//! - Prediction result types serialized at the HTTP boundary
//! - The serving lifecycle states

pub mod error;
pub mod types;

pub use error::{Error, LoadError, Result};
pub use types::{BatchResult, PredictionResult, Probabilities, ServingState, TopKPrediction};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, LoadError, Result};
    pub use crate::types::{
        BatchResult, PredictionResult, Probabilities, ServingState, TopKPrediction,
    };
}
