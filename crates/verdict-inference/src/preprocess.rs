//! Deterministic text cleaning and tokenization
//!
//! Steps run in a fixed order, each one independently togglable:
//! 1. lowercase
//! 2. special-character removal
//! 3. whitespace tokenization
//! 4. stopword removal
//!
//! The resulting tokens are handed to the package [`Vectorizer`]. Nothing here
//! holds mutable state, so one preprocessor is shared by all requests.

use crate::vectorizer::{PreprocessedInput, Vectorizer};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use verdict_core::Result;

/// Characters that are neither Unicode letters, numbers, nor whitespace
const SPECIAL_CHARS_PATTERN: &str = r"[^\p{L}\p{N}\s]";

/// Fixed English stopword list
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "now", "of", "off", "on", "once", "only", "or",
    "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Whether `token` is in the fixed stopword set (case-insensitive)
pub fn is_stopword(token: &str) -> bool {
    let set = stopwords();
    set.contains(token) || set.contains(token.to_lowercase().as_str())
}

/// Preprocessing switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Case-fold all characters
    #[serde(default = "default_true")]
    pub lowercase: bool,

    /// Strip characters that are not alphanumeric or whitespace
    #[serde(default = "default_true")]
    pub remove_special_chars: bool,

    /// Drop tokens found in the stopword set
    #[serde(default)]
    pub remove_stopwords: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_special_chars: true,
            remove_stopwords: false,
        }
    }
}

impl PreprocessConfig {
    /// Every step disabled; text is only split on whitespace
    pub fn passthrough() -> Self {
        Self {
            lowercase: false,
            remove_special_chars: false,
            remove_stopwords: false,
        }
    }

    pub fn with_lowercase(mut self, enable: bool) -> Self {
        self.lowercase = enable;
        self
    }

    pub fn with_special_char_removal(mut self, enable: bool) -> Self {
        self.remove_special_chars = enable;
        self
    }

    pub fn with_stopword_removal(mut self, enable: bool) -> Self {
        self.remove_stopwords = enable;
        self
    }
}

/// Text-to-vector transform
#[derive(Debug, Clone)]
pub struct TextPreprocessor {
    config: PreprocessConfig,
    special_chars: Regex,
}

impl TextPreprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        let special_chars = Regex::new(SPECIAL_CHARS_PATTERN).map_err(|e| {
            verdict_core::Error::internal(format!("Failed to build special character matcher: {e}"))
        })?;

        Ok(Self {
            config,
            special_chars,
        })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Run cleaning and tokenization, returning the surviving tokens
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut cleaned = if self.config.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        if self.config.remove_special_chars {
            cleaned = self.special_chars.replace_all(&cleaned, "").into_owned();
        }

        cleaned
            .split_whitespace()
            .filter(|token| !(self.config.remove_stopwords && is_stopword(token)))
            .map(str::to_string)
            .collect()
    }

    /// Cleaned text: surviving tokens joined by single spaces.
    ///
    /// `clean(clean(x)) == clean(x)` for every configuration.
    pub fn clean(&self, text: &str) -> String {
        self.tokenize(text).join(" ")
    }

    /// Full transform into a model-ready vector
    pub fn transform(&self, text: &str, vectorizer: &Vectorizer) -> PreprocessedInput {
        let tokens = self.tokenize(text);
        vectorizer.vectorize(&tokens)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor(config: PreprocessConfig) -> TextPreprocessor {
        TextPreprocessor::new(config).unwrap()
    }

    #[test]
    fn test_default_pipeline() {
        let p = preprocessor(PreprocessConfig::default());
        assert_eq!(p.tokenize("Fantastic!  Really GOOD movie..."), vec!["fantastic", "really", "good", "movie"]);
    }

    #[test]
    fn test_each_step_is_independent() {
        let text = "The Movie, was GREAT!";

        let p = preprocessor(PreprocessConfig::passthrough());
        assert_eq!(p.clean(text), "The Movie, was GREAT!");

        let p = preprocessor(PreprocessConfig::passthrough().with_lowercase(true));
        assert_eq!(p.clean(text), "the movie, was great!");

        let p = preprocessor(PreprocessConfig::passthrough().with_special_char_removal(true));
        assert_eq!(p.clean(text), "The Movie was GREAT");

        let p = preprocessor(PreprocessConfig::passthrough().with_stopword_removal(true));
        assert_eq!(p.clean(text), "Movie, GREAT!");
    }

    #[test]
    fn test_special_chars_keep_unicode_alphanumerics() {
        let p = preprocessor(PreprocessConfig::default());
        assert_eq!(p.clean("Café—naïve #1 ñandú?"), "cafénaïve 1 ñandú");
    }

    #[test]
    fn test_stopword_removal_after_cleaning() {
        let p = preprocessor(PreprocessConfig::default().with_stopword_removal(true));
        assert_eq!(p.tokenize("This is THE best, isn't it?"), vec!["best", "isnt"]);
    }

    #[test]
    fn test_empty_after_cleaning() {
        let p = preprocessor(PreprocessConfig::default().with_stopword_removal(true));
        assert!(p.tokenize("").is_empty());
        assert!(p.tokenize("?!... ---").is_empty());
        assert!(p.tokenize("the and of").is_empty());
        assert_eq!(p.clean("!!!"), "");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let p = preprocessor(PreprocessConfig::default().with_stopword_removal(true));
        for text in ["Hello, World!", "  spaced\tout\ntext ", "İstanbul ÇAĞ", "a-b_c d.e"] {
            let once = p.clean(text);
            assert_eq!(p.clean(&once), once, "not idempotent for {text:?}");
        }
    }

    #[test]
    fn test_is_stopword_case_insensitive() {
        assert!(is_stopword("the"));
        assert!(is_stopword("The"));
        assert!(!is_stopword("movie"));
    }

    #[test]
    fn test_config_yaml_defaults() {
        let config: PreprocessConfig = serde_yaml::from_str("remove_stopwords: true").unwrap();
        assert!(config.lowercase);
        assert!(config.remove_special_chars);
        assert!(config.remove_stopwords);
    }
}
