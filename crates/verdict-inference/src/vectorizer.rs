//! Fixed-vocabulary bag-of-n-grams vectorizer

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use verdict_core::LoadError;

/// Term weighting scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// Raw term frequency
    #[default]
    Counts,
    /// 1.0 if the term occurs at all
    Binary,
    /// Term frequency scaled by inverse document frequency
    TfIdf,
}

/// Vector normalization applied after weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    #[default]
    None,
    L2,
}

/// Treatment of tokens outside the vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OovPolicy {
    /// Ignore the token
    #[default]
    Drop,
    /// Count it in a reserved slot after the vocabulary
    Unknown,
}

/// Vectorizer parameters as stored in a package manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerParams {
    /// Terms in feature order (index = feature id)
    pub vocabulary: Vec<String>,

    #[serde(default)]
    pub weighting: Weighting,

    /// Inverse document frequencies, required for `tfidf`
    #[serde(default)]
    pub idf: Option<Vec<f32>>,

    #[serde(default)]
    pub normalize: Normalization,

    #[serde(default)]
    pub oov: OovPolicy,

    /// Inclusive n-gram size range
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

/// Numeric model input derived from one text.
///
/// Owned by the call that produced it and never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedInput {
    features: Vec<f32>,
}

impl PreprocessedInput {
    pub fn new(features: Vec<f32>) -> Self {
        Self { features }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// True when no feature fired
    pub fn is_zero(&self) -> bool {
        self.features.iter().all(|v| *v == 0.0)
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.features
    }
}

/// Validated, immutable vectorizer
#[derive(Debug, Clone)]
pub struct Vectorizer {
    vocabulary: Vec<String>,
    index: HashMap<String, usize>,
    weighting: Weighting,
    idf: Option<Vec<f32>>,
    normalize: Normalization,
    oov: OovPolicy,
    ngram_range: (usize, usize),
    max_tokens: usize,
}

impl Vectorizer {
    /// Build from manifest parameters, rejecting inconsistent ones
    pub fn from_params(params: VectorizerParams, max_tokens: usize) -> Result<Self, LoadError> {
        if params.vocabulary.is_empty() {
            return Err(LoadError::schema("vectorizer vocabulary is empty"));
        }

        if max_tokens == 0 {
            return Err(LoadError::schema("max_input_length must be greater than 0"));
        }

        let (min_n, max_n) = params.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(LoadError::schema(format!(
                "invalid ngram_range ({min_n}, {max_n})"
            )));
        }
        if max_n > max_tokens {
            return Err(LoadError::schema(format!(
                "ngram_range upper bound {max_n} exceeds max_input_length {max_tokens}"
            )));
        }

        let mut index = HashMap::with_capacity(params.vocabulary.len());
        for (id, term) in params.vocabulary.iter().enumerate() {
            if index.insert(term.clone(), id).is_some() {
                return Err(LoadError::schema(format!(
                    "duplicate vocabulary term '{term}'"
                )));
            }
        }

        match (&params.weighting, &params.idf) {
            (Weighting::TfIdf, None) => {
                return Err(LoadError::schema("tfidf weighting requires idf values"));
            }
            (Weighting::TfIdf, Some(idf)) if idf.len() != params.vocabulary.len() => {
                return Err(LoadError::schema(format!(
                    "idf has {} entries but vocabulary has {}",
                    idf.len(),
                    params.vocabulary.len()
                )));
            }
            (_, Some(idf)) if idf.iter().any(|v| !v.is_finite()) => {
                return Err(LoadError::schema("idf contains non-finite values"));
            }
            _ => {}
        }

        Ok(Self {
            vocabulary: params.vocabulary,
            index,
            weighting: params.weighting,
            idf: params.idf,
            normalize: params.normalize,
            oov: params.oov,
            ngram_range: params.ngram_range,
            max_tokens,
        })
    }

    /// Length of every produced vector
    pub fn dim(&self) -> usize {
        match self.oov {
            OovPolicy::Drop => self.vocabulary.len(),
            OovPolicy::Unknown => self.vocabulary.len() + 1,
        }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Token cap applied before n-gram generation
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Feature id of a term, if in the vocabulary
    pub fn feature_id(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Map tokens to a dense feature vector.
    ///
    /// No tokens (or only dropped ones) yields the zero vector.
    pub fn vectorize(&self, tokens: &[String]) -> PreprocessedInput {
        let tokens = &tokens[..tokens.len().min(self.max_tokens)];
        let mut features = vec![0.0f32; self.dim()];
        let unknown_slot = self.vocabulary.len();

        let (min_n, max_n) = self.ngram_range;
        for n in min_n..=max_n {
            for window in tokens.windows(n) {
                let term = window.join(" ");
                match self.index.get(&term) {
                    Some(&id) => features[id] += 1.0,
                    // Only unigrams count as unknown; unseen n-grams are expected
                    None if n == 1 && self.oov == OovPolicy::Unknown => {
                        features[unknown_slot] += 1.0
                    }
                    None => {}
                }
            }
        }

        match self.weighting {
            Weighting::Counts => {}
            Weighting::Binary => {
                for value in features.iter_mut() {
                    if *value > 0.0 {
                        *value = 1.0;
                    }
                }
            }
            Weighting::TfIdf => {
                if let Some(idf) = &self.idf {
                    for (value, weight) in features.iter_mut().zip(idf) {
                        *value *= weight;
                    }
                }
            }
        }

        if self.normalize == Normalization::L2 {
            let norm = features.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for value in features.iter_mut() {
                    *value /= norm;
                }
            }
        }

        PreprocessedInput::new(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(vocab: &[&str]) -> VectorizerParams {
        VectorizerParams {
            vocabulary: vocab.iter().map(|s| s.to_string()).collect(),
            weighting: Weighting::Counts,
            idf: None,
            normalize: Normalization::None,
            oov: OovPolicy::Drop,
            ngram_range: (1, 1),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_counts() {
        let v = Vectorizer::from_params(params(&["good", "bad", "movie"]), 512).unwrap();
        let input = v.vectorize(&tokens("good good movie unseen"));
        assert_eq!(input.as_slice(), &[2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_binary_and_unknown_slot() {
        let mut p = params(&["good", "bad"]);
        p.weighting = Weighting::Binary;
        p.oov = OovPolicy::Unknown;
        let v = Vectorizer::from_params(p, 512).unwrap();

        assert_eq!(v.dim(), 3);
        let input = v.vectorize(&tokens("good good what who"));
        assert_eq!(input.as_slice(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_tfidf_l2() {
        let mut p = params(&["a", "b"]);
        p.weighting = Weighting::TfIdf;
        p.idf = Some(vec![3.0, 4.0]);
        p.normalize = Normalization::L2;
        let v = Vectorizer::from_params(p, 512).unwrap();

        let input = v.vectorize(&tokens("a b"));
        let values = input.as_slice();
        assert!((values[0] - 0.6).abs() < 1e-6);
        assert!((values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_bigrams() {
        let mut p = params(&["not", "good", "not good"]);
        p.ngram_range = (1, 2);
        let v = Vectorizer::from_params(p, 512).unwrap();

        let input = v.vectorize(&tokens("not good"));
        assert_eq!(input.as_slice(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_truncation() {
        let v = Vectorizer::from_params(params(&["x"]), 2).unwrap();
        let input = v.vectorize(&tokens("x x x x"));
        assert_eq!(input.as_slice(), &[2.0]);
    }

    #[test]
    fn test_empty_tokens_yield_zero_vector() {
        let mut p = params(&["good", "bad"]);
        p.normalize = Normalization::L2;
        let v = Vectorizer::from_params(p, 512).unwrap();

        let input = v.vectorize(&[]);
        assert_eq!(input.len(), 2);
        assert!(input.is_zero());
    }

    #[test]
    fn test_rejects_invalid_params() {
        assert!(Vectorizer::from_params(params(&[]), 512).is_err());
        assert!(Vectorizer::from_params(params(&["a", "a"]), 512).is_err());
        assert!(Vectorizer::from_params(params(&["a"]), 0).is_err());

        let mut p = params(&["a", "b"]);
        p.weighting = Weighting::TfIdf;
        assert!(Vectorizer::from_params(p.clone(), 512).is_err());
        p.idf = Some(vec![1.0]);
        assert!(matches!(
            Vectorizer::from_params(p, 512),
            Err(LoadError::SchemaMismatch(_))
        ));

        let mut p = params(&["a"]);
        p.ngram_range = (2, 1);
        assert!(Vectorizer::from_params(p, 512).is_err());
    }

    #[test]
    fn test_rejects_ngram_longer_than_token_cap() {
        let mut p = params(&["a"]);
        p.ngram_range = (1, 4_000_000_000);
        assert!(matches!(
            Vectorizer::from_params(p.clone(), 512),
            Err(LoadError::SchemaMismatch(_))
        ));

        p.ngram_range = (1, 8);
        assert!(Vectorizer::from_params(p.clone(), 4).is_err());
        assert!(Vectorizer::from_params(p, 8).is_ok());
    }

    #[test]
    fn test_params_yaml() {
        let yaml = r#"
vocabulary: [good, bad]
weighting: tfidf
idf: [1.5, 2.0]
normalize: l2
oov: unknown
ngram_range: [1, 2]
"#;
        let p: VectorizerParams = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.weighting, Weighting::TfIdf);
        assert_eq!(p.oov, OovPolicy::Unknown);
        assert_eq!(p.ngram_range, (1, 2));

        let v = Vectorizer::from_params(p, 128).unwrap();
        assert_eq!(v.dim(), 3);
        assert_eq!(v.feature_id("bad"), Some(1));
    }
}
