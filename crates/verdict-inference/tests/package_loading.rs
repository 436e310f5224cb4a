//! Package loading tests
//!
//! Packages are written to temporary directories: a YAML manifest plus a
//! SafeTensors weights file produced with candle.

use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use verdict_core::{LoadError, ServingState};
use verdict_inference::{
    BatchOptions, ModelLoader, Predictor, PreprocessConfig, ServingConfig, ServingGate,
    MANIFEST_FILE,
};

const SENTIMENT_MANIFEST: &str = r#"
name: sentiment
version: "1.2.0"
labels: [negative, positive]
threshold: 0.6
max_input_length: 128
preprocessing:
  lowercase: true
  remove_special_chars: true
  remove_stopwords: false
vectorizer:
  vocabulary: [fantastic, terrible, ok, movie]
  weighting: counts
weights: model.safetensors
"#;

fn write_weights(path: &Path, weight: Vec<f32>, shape: (usize, usize), bias: Vec<f32>) {
    let rows = bias.len();
    let mut tensors = HashMap::new();
    tensors.insert(
        "weight".to_string(),
        Tensor::from_vec(weight, shape, &Device::Cpu).unwrap(),
    );
    tensors.insert(
        "bias".to_string(),
        Tensor::from_vec(bias, rows, &Device::Cpu).unwrap(),
    );
    candle_core::safetensors::save(&tensors, path).unwrap();
}

/// Two-class package: "fantastic" pushes positive, "terrible" negative
fn sentiment_package() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(MANIFEST_FILE), SENTIMENT_MANIFEST).unwrap();
    write_weights(
        &dir.path().join("model.safetensors"),
        vec![-2.0, 3.0, 0.0, 0.0, 3.0, -2.0, 0.0, 0.0],
        (2, 4),
        vec![0.0, 0.0],
    );
    dir
}

#[test]
fn test_load_and_predict() {
    let dir = sentiment_package();
    let package = ModelLoader::default().load(dir.path()).unwrap();

    assert_eq!(package.name(), "sentiment");
    assert_eq!(package.version(), "1.2.0");
    assert_eq!(package.labels(), ["negative", "positive"]);
    assert_eq!(package.threshold(), 0.6);
    assert_eq!(package.max_input_length(), 128);
    assert_eq!(package.model_type(), "linear");

    let predictor = Predictor::new(Arc::new(package)).unwrap();

    let positive = predictor.predict("Fantastic!").unwrap();
    assert_eq!(positive.label, "positive");
    assert!(positive.is_confident);
    let total: f32 = positive.probabilities.unwrap().total();
    assert!((total - 1.0).abs() < 1e-4);

    let negative = predictor.predict("terrible.").unwrap();
    assert_eq!(negative.label, "negative");
    assert_eq!(negative.predicted_class, 0);
}

#[test]
fn test_load_from_manifest_path() {
    let dir = sentiment_package();
    let package = ModelLoader::default()
        .load(dir.path().join(MANIFEST_FILE))
        .unwrap();
    assert_eq!(package.num_classes(), 2);
}

#[test]
fn test_name_defaults_to_directory() {
    let dir = sentiment_package();
    let manifest = SENTIMENT_MANIFEST.replace("name: sentiment\n", "");
    fs::write(dir.path().join(MANIFEST_FILE), manifest).unwrap();

    let package = ModelLoader::default().load(dir.path()).unwrap();
    let dir_name = dir.path().file_name().unwrap().to_str().unwrap();
    assert_eq!(package.name(), dir_name);
}

#[test]
fn test_missing_manifest() {
    let dir = TempDir::new().unwrap();
    let err = ModelLoader::default().load(dir.path()).unwrap_err();

    match err {
        LoadError::MissingFile(path) => assert!(path.ends_with(MANIFEST_FILE)),
        other => panic!("Expected MissingFile, got {:?}", other),
    }
}

#[test]
fn test_missing_weights() {
    let dir = sentiment_package();
    fs::remove_file(dir.path().join("model.safetensors")).unwrap();

    let err = ModelLoader::default().load(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::MissingFile(_)));
}

#[test]
fn test_corrupt_manifest() {
    let dir = sentiment_package();
    fs::write(dir.path().join(MANIFEST_FILE), "labels: [negative, positive\n").unwrap();

    let err = ModelLoader::default().load(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::CorruptFormat { .. }));
}

#[test]
fn test_corrupt_weights() {
    let dir = sentiment_package();
    fs::write(dir.path().join("model.safetensors"), b"not a safetensors file").unwrap();

    let err = ModelLoader::default().load(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::CorruptFormat { .. }));
}

#[test]
fn test_manifest_missing_labels() {
    let dir = sentiment_package();
    let manifest = SENTIMENT_MANIFEST.replace("labels: [negative, positive]\n", "");
    fs::write(dir.path().join(MANIFEST_FILE), manifest).unwrap();

    let err = ModelLoader::default().load(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::SchemaMismatch(_)));
}

#[test]
fn test_manifest_not_a_mapping() {
    let dir = sentiment_package();
    fs::write(dir.path().join(MANIFEST_FILE), "- just\n- a list\n").unwrap();

    let err = ModelLoader::default().load(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::SchemaMismatch(_)));
}

#[test]
fn test_weights_disagree_with_vocabulary() {
    let dir = sentiment_package();
    write_weights(
        &dir.path().join("model.safetensors"),
        vec![0.0; 6],
        (2, 3),
        vec![0.0, 0.0],
    );

    let err = ModelLoader::default().load(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::SchemaMismatch(_)));
}

#[test]
fn test_weights_missing_bias() {
    let dir = sentiment_package();
    let mut tensors = HashMap::new();
    tensors.insert(
        "weight".to_string(),
        Tensor::zeros((2, 4), candle_core::DType::F32, &Device::Cpu).unwrap(),
    );
    candle_core::safetensors::save(&tensors, dir.path().join("model.safetensors")).unwrap();

    let err = ModelLoader::default().load(dir.path()).unwrap_err();
    assert!(err.to_string().contains("bias"));
}

#[test]
fn test_labels_disagree_with_weights() {
    let dir = sentiment_package();
    let manifest = SENTIMENT_MANIFEST.replace(
        "labels: [negative, positive]",
        "labels: [negative, neutral, positive]",
    );
    fs::write(dir.path().join(MANIFEST_FILE), manifest).unwrap();

    let err = ModelLoader::default().load(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::SchemaMismatch(_)));
}

#[test]
fn test_sigmoid_binary_package() {
    let dir = TempDir::new().unwrap();
    let manifest = format!("{}activation: sigmoid\n", SENTIMENT_MANIFEST);
    fs::write(dir.path().join(MANIFEST_FILE), manifest).unwrap();
    write_weights(
        &dir.path().join("model.safetensors"),
        vec![4.0, -4.0, 0.0, 0.0],
        (1, 4),
        vec![0.0],
    );

    let package = ModelLoader::default().load(dir.path()).unwrap();
    assert_eq!(package.num_classes(), 2);

    let predictor = Predictor::new(Arc::new(package)).unwrap();
    let result = predictor.predict("fantastic").unwrap();
    assert_eq!(result.label, "positive");
    let positive = result.probability_positive.unwrap();
    let negative = result.probability_negative.unwrap();
    assert!((positive + negative - 1.0).abs() < 1e-4);
    assert!(positive > 0.9);
}

#[test]
fn test_gate_loads_package_from_config() {
    let dir = sentiment_package();
    let gate = ServingGate::new();
    assert_eq!(gate.state(), ServingState::Unloaded);

    gate.load(&ServingConfig::for_package(dir.path())).unwrap();
    assert_eq!(gate.state(), ServingState::Ready);

    let runtime = gate.runtime().unwrap();
    let batch = runtime
        .predict_batch(&["fantastic!", "terrible.", "ok movie"], BatchOptions::default())
        .unwrap();

    assert_eq!(batch.total_processed, 3);
    let labels: Vec<&str> = batch.predictions.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["positive", "negative", "negative"]);
    let texts: Vec<&str> = batch.predictions.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(texts, vec!["fantastic!", "terrible.", "ok movie"]);
}

#[test]
fn test_config_preprocessing_override() {
    let dir = sentiment_package();
    let mut config = ServingConfig::for_package(dir.path());
    config.preprocessing = Some(PreprocessConfig::passthrough());

    let gate = ServingGate::new();
    gate.load(&config).unwrap();

    // Without lowercasing and punctuation stripping nothing matches the vocabulary
    let result = gate.runtime().unwrap().predict("FANTASTIC!").unwrap();
    assert_eq!(result.probability_positive, Some(0.5));
    assert_eq!(result.label, "negative");
}
