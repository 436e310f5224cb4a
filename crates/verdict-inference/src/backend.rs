//! Model backends
//!
//! The serving core only depends on the [`InferenceBackend`] capability: given
//! model-ready vectors, return one probability distribution per vector. The
//! concrete [`LinearBackend`] runs a linear layer with Candle tensors.

use crate::vectorizer::PreprocessedInput;
use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use verdict_core::{LoadError, Result};

/// Capability every model backend provides
pub trait InferenceBackend: Send + Sync {
    /// Probability distributions for a stacked batch, one row per input in
    /// input order. Implementations must fail rather than return fewer rows.
    fn predict_batch(&self, inputs: &[PreprocessedInput]) -> Result<Vec<Vec<f32>>>;

    /// Probability distribution for a single input
    fn predict(&self, input: &PreprocessedInput) -> Result<Vec<f32>> {
        self.predict_batch(std::slice::from_ref(input))?
            .pop()
            .ok_or_else(|| verdict_core::Error::inference("backend returned no distribution"))
    }

    /// Expected length of every input vector
    fn input_dim(&self) -> usize;

    /// Number of classes in every output distribution
    fn num_classes(&self) -> usize;

    /// Compute device name (cpu, cuda, metal)
    fn device_name(&self) -> &str {
        "cpu"
    }
}

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// CPU inference (always available)
    #[default]
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize), // GPU index
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl DeviceType {
    /// Create the Candle device
    pub fn create(&self) -> std::result::Result<Device, LoadError> {
        match self {
            DeviceType::Cpu => Ok(Device::Cpu),
            DeviceType::Cuda(idx) => Device::new_cuda(*idx)
                .map_err(|e| LoadError::backend(format!("Failed to create CUDA device: {}", e))),
            DeviceType::Metal(idx) => Device::new_metal(*idx)
                .map_err(|e| LoadError::backend(format!("Failed to create Metal device: {}", e))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceType::Cpu => "cpu",
            DeviceType::Cuda(_) => "cuda",
            DeviceType::Metal(_) => "metal",
        }
    }
}

/// Output activation of a linear model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// One logit per class, normalized with softmax
    #[default]
    Softmax,
    /// Single logit for class 1 of a binary model
    Sigmoid,
}

/// Linear classifier: `activation(x · Wᵀ + b)`
pub struct LinearBackend {
    /// `[rows, input_dim]`
    weight: Tensor,
    /// `[rows]`
    bias: Tensor,
    activation: Activation,
    device: Device,
    device_type: DeviceType,
    input_dim: usize,
    num_classes: usize,
}

impl LinearBackend {
    /// Tensor names expected in a weights file
    pub const WEIGHT_TENSOR: &'static str = "weight";
    pub const BIAS_TENSOR: &'static str = "bias";

    /// Build from weight and bias tensors, checking their shapes
    pub fn new(
        weight: Tensor,
        bias: Tensor,
        activation: Activation,
        device_type: DeviceType,
    ) -> std::result::Result<Self, LoadError> {
        let device = device_type.create()?;

        let (rows, input_dim) = weight.dims2().map_err(|e| {
            LoadError::schema(format!("weight tensor must be 2-dimensional: {}", e))
        })?;
        let bias_len = bias
            .dims1()
            .map_err(|e| LoadError::schema(format!("bias tensor must be 1-dimensional: {}", e)))?;

        if bias_len != rows {
            return Err(LoadError::schema(format!(
                "bias has {} entries but weight has {} rows",
                bias_len, rows
            )));
        }
        if rows == 0 || input_dim == 0 {
            return Err(LoadError::schema("weight tensor is empty"));
        }

        let num_classes = match activation {
            Activation::Softmax => rows,
            Activation::Sigmoid if rows == 1 => 2,
            Activation::Sigmoid => {
                return Err(LoadError::schema(format!(
                    "sigmoid activation expects a single weight row, found {}",
                    rows
                )))
            }
        };

        let to_device = |t: Tensor, name: &str| {
            t.to_dtype(DType::F32)
                .and_then(|t| t.to_device(&device))
                .map_err(|e| LoadError::backend(format!("Failed to place {} tensor: {}", name, e)))
        };
        let weight = to_device(weight, Self::WEIGHT_TENSOR)?;
        let bias = to_device(bias, Self::BIAS_TENSOR)?;

        Ok(Self {
            weight,
            bias,
            activation,
            device,
            device_type,
            input_dim,
            num_classes,
        })
    }

    /// Build from named tensors as read from a SafeTensors file
    pub fn from_tensors(
        mut tensors: HashMap<String, Tensor>,
        activation: Activation,
        device_type: DeviceType,
    ) -> std::result::Result<Self, LoadError> {
        let weight = tensors.remove(Self::WEIGHT_TENSOR).ok_or_else(|| {
            LoadError::schema(format!("weights file has no '{}' tensor", Self::WEIGHT_TENSOR))
        })?;
        let bias = tensors.remove(Self::BIAS_TENSOR).ok_or_else(|| {
            LoadError::schema(format!("weights file has no '{}' tensor", Self::BIAS_TENSOR))
        })?;
        Self::new(weight, bias, activation, device_type)
    }

    /// Build from row-major host data
    pub fn from_rows(
        weight: Vec<Vec<f32>>,
        bias: Vec<f32>,
        activation: Activation,
    ) -> std::result::Result<Self, LoadError> {
        let rows = weight.len();
        let cols = weight.first().map(Vec::len).unwrap_or(0);
        if weight.iter().any(|row| row.len() != cols) {
            return Err(LoadError::schema("weight rows have differing lengths"));
        }

        let flat: Vec<f32> = weight.into_iter().flatten().collect();
        let bias_len = bias.len();
        let weight = Tensor::from_vec(flat, (rows, cols), &Device::Cpu)
            .map_err(|e| LoadError::schema(format!("invalid weight data: {}", e)))?;
        let bias = Tensor::from_vec(bias, bias_len, &Device::Cpu)
            .map_err(|e| LoadError::schema(format!("invalid bias data: {}", e)))?;

        Self::new(weight, bias, activation, DeviceType::Cpu)
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    fn forward(&self, inputs: &[PreprocessedInput]) -> candle_core::Result<Vec<Vec<f32>>> {
        let flat: Vec<f32> = inputs
            .iter()
            .flat_map(|input| input.as_slice().iter().copied())
            .collect();
        let x = Tensor::from_vec(flat, (inputs.len(), self.input_dim), &self.device)?;

        let logits = x.matmul(&self.weight.t()?)?.broadcast_add(&self.bias)?;

        let probs = match self.activation {
            Activation::Softmax => candle_nn::ops::softmax_last_dim(&logits)?,
            Activation::Sigmoid => {
                let positive = candle_nn::ops::sigmoid(&logits)?;
                let negative = positive.affine(-1.0, 1.0)?;
                Tensor::cat(&[&negative, &positive], 1)?
            }
        };

        probs.to_vec2::<f32>()
    }
}

impl InferenceBackend for LinearBackend {
    fn predict_batch(&self, inputs: &[PreprocessedInput]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        if let Some((idx, bad)) = inputs
            .iter()
            .enumerate()
            .find(|(_, input)| input.len() != self.input_dim)
        {
            return Err(verdict_core::Error::inference(format!(
                "shape mismatch: input {} has {} features, model expects {}",
                idx,
                bad.len(),
                self.input_dim
            )));
        }

        let rows = self
            .forward(inputs)
            .map_err(|e| verdict_core::Error::inference(format!("Model forward pass failed: {}", e)))?;

        if rows.iter().flatten().any(|p| !p.is_finite()) {
            return Err(verdict_core::Error::inference(
                "numeric failure: model produced non-finite probabilities",
            ));
        }

        Ok(rows)
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn device_name(&self) -> &str {
        self.device_type.name()
    }
}

impl fmt::Debug for LinearBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearBackend")
            .field("activation", &self.activation)
            .field("device", &self.device_type)
            .field("input_dim", &self.input_dim)
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(values: &[f32]) -> PreprocessedInput {
        PreprocessedInput::new(values.to_vec())
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let backend = LinearBackend::from_rows(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]],
            vec![0.0, 0.0, 0.1],
            Activation::Softmax,
        )
        .unwrap();

        assert_eq!(backend.num_classes(), 3);
        let rows = backend
            .predict_batch(&[input(&[2.0, 0.0]), input(&[0.0, 0.0])])
            .unwrap();

        assert_eq!(rows.len(), 2);
        for row in &rows {
            let total: f32 = row.iter().sum();
            assert!((total - 1.0).abs() < 1e-4);
        }
        assert!(rows[0][0] > rows[0][1]);
    }

    #[test]
    fn test_sigmoid_binary() {
        let backend =
            LinearBackend::from_rows(vec![vec![1.0]], vec![0.0], Activation::Sigmoid).unwrap();
        assert_eq!(backend.num_classes(), 2);

        let dist = backend.predict(&input(&[0.0])).unwrap();
        assert!((dist[0] - 0.5).abs() < 1e-6);
        assert!((dist[1] - 0.5).abs() < 1e-6);

        let dist = backend.predict(&input(&[3.0])).unwrap();
        assert!(dist[1] > 0.95);
        assert!((dist[0] + dist[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_shape_mismatch_is_inference_error() {
        let backend =
            LinearBackend::from_rows(vec![vec![1.0, 1.0]], vec![0.0], Activation::Softmax)
                .unwrap();
        let err = backend.predict(&input(&[1.0])).unwrap_err();
        assert!(matches!(err, verdict_core::Error::Inference(_)));
    }

    #[test]
    fn test_non_finite_is_inference_error() {
        let backend =
            LinearBackend::from_rows(vec![vec![1.0], vec![0.0]], vec![0.0, 0.0], Activation::Softmax)
                .unwrap();
        let err = backend.predict(&input(&[f32::NAN])).unwrap_err();
        assert!(matches!(err, verdict_core::Error::Inference(_)));
    }

    #[test]
    fn test_rejects_inconsistent_tensors() {
        assert!(LinearBackend::from_rows(vec![vec![1.0], vec![1.0]], vec![0.0], Activation::Softmax).is_err());
        assert!(LinearBackend::from_rows(vec![vec![1.0], vec![1.0]], vec![0.0, 0.0], Activation::Sigmoid).is_err());
        assert!(LinearBackend::from_rows(vec![vec![1.0, 2.0], vec![1.0]], vec![0.0, 0.0], Activation::Softmax).is_err());
        assert!(LinearBackend::from_rows(vec![], vec![], Activation::Softmax).is_err());
    }

    #[test]
    fn test_from_tensors_requires_names() {
        let mut tensors = HashMap::new();
        tensors.insert(
            "weight".to_string(),
            Tensor::new(&[[1.0f32, 0.0]], &Device::Cpu).unwrap(),
        );
        let err = LinearBackend::from_tensors(tensors, Activation::Softmax, DeviceType::Cpu).unwrap_err();
        assert!(matches!(err, LoadError::SchemaMismatch(_)));
    }

    #[test]
    fn test_empty_batch() {
        let backend =
            LinearBackend::from_rows(vec![vec![1.0]], vec![0.0], Activation::Sigmoid).unwrap();
        assert!(backend.predict_batch(&[]).unwrap().is_empty());
    }
}
