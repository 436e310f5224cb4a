//! Core types for Verdict

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Serving lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServingState {
    /// No load attempted yet
    Unloaded,
    /// Model package is being loaded
    Loading,
    /// Package loaded, requests are admitted
    Ready,
    /// Load or self-check failed; terminal until restart
    Failed,
}

impl ServingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: ServingState) -> bool {
        matches!(
            (self, next),
            (Self::Unloaded, Self::Loading)
                | (Self::Loading, Self::Ready)
                | (Self::Loading, Self::Failed)
                | (Self::Ready, Self::Failed)
        )
    }
}

impl fmt::Display for ServingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class label to probability mapping, kept in class-index order.
///
/// Serializes as a JSON object whose keys appear in class order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Probabilities(Vec<(String, f32)>);

impl Probabilities {
    /// Pair labels with a distribution of the same length
    pub fn from_distribution(labels: &[String], distribution: &[f32]) -> Self {
        Self(
            labels
                .iter()
                .cloned()
                .zip(distribution.iter().copied())
                .collect(),
        )
    }

    /// Probability for a label
    pub fn get(&self, label: &str) -> Option<f32> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(l, p)| (l.as_str(), *p))
    }

    /// Sum of all probabilities
    pub fn total(&self) -> f32 {
        self.0.iter().map(|(_, p)| p).sum()
    }
}

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, probability) in &self.0 {
            map.serialize_entry(label, probability)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Probabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Probabilities;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of class label to probability")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, probability)) = access.next_entry::<String, f32>()? {
                    entries.push((label, probability));
                }
                Ok(Probabilities(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Prediction for a single text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Input text as received
    pub text: String,

    /// Index of the most probable class
    pub predicted_class: usize,

    /// Label of the most probable class
    pub label: String,

    /// Probability of the predicted class (0.0-1.0)
    pub confidence: f32,

    /// Whether confidence reaches the decision threshold
    pub is_confident: bool,

    /// Full distribution, omitted when the caller opts out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Probabilities>,

    /// Class 1 probability (binary packages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_positive: Option<f32>,

    /// Class 0 probability (binary packages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_negative: Option<f32>,
}

/// Ordered predictions for a batch of texts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// One prediction per input, in input order
    pub predictions: Vec<PredictionResult>,

    /// Number of texts processed
    pub total_processed: usize,
}

impl BatchResult {
    pub fn new(predictions: Vec<PredictionResult>) -> Self {
        let total_processed = predictions.len();
        Self {
            predictions,
            total_processed,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// One ranked entry of a top-k extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKPrediction {
    pub label: String,
    pub probability: f32,
}
