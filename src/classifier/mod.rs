//! Intent classification
//!
//! A small feed-forward network scoring a query embedding against a fixed,
//! closed set of intent labels. Weights are loaded once at construction
//! and immutable afterwards; inference is pure and deterministic.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Weights file parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Classification outcome: top label plus the full distribution.
///
/// Scores across all labels sum to 1 (softmax output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    /// Highest-scoring intent label
    pub label: String,
    /// Score of the top label, in [0, 1]
    pub confidence: f32,
    /// Score per label, same order as the configured label set
    pub distribution: Vec<(String, f32)>,
}

/// On-disk weights layout (JSON)
#[derive(Debug, Serialize, Deserialize)]
struct WeightsFile {
    labels: Vec<String>,
    layers: Vec<LayerWeights>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LayerWeights {
    /// Row-major, one row per output unit
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

#[derive(Debug)]
struct Layer {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

/// Feed-forward intent scorer: ReLU hidden layers, softmax output.
#[derive(Debug)]
pub struct IntentClassifier {
    labels: Vec<String>,
    layers: Vec<Layer>,
    input_dim: usize,
}

impl IntentClassifier {
    /// Build from raw layer matrices. The last layer's output width must
    /// equal the label count; consecutive layers must chain dimensions.
    pub fn from_layers(
        labels: Vec<String>,
        raw_layers: Vec<(Vec<Vec<f32>>, Vec<f32>)>,
    ) -> Result<Self, ClassifierError> {
        if labels.is_empty() {
            return Err(ClassifierError::InvalidWeights("empty label set".into()));
        }
        if raw_layers.is_empty() {
            return Err(ClassifierError::InvalidWeights("no layers".into()));
        }

        let mut layers = Vec::with_capacity(raw_layers.len());
        let mut expected_in: Option<usize> = None;
        let mut input_dim = 0;

        for (i, (rows, bias)) in raw_layers.into_iter().enumerate() {
            let out = rows.len();
            let cols = rows.first().map(|r| r.len()).unwrap_or(0);
            if out == 0 || cols == 0 {
                return Err(ClassifierError::InvalidWeights(format!(
                    "layer {i} has empty weight matrix"
                )));
            }
            if rows.iter().any(|r| r.len() != cols) {
                return Err(ClassifierError::InvalidWeights(format!(
                    "layer {i} weight matrix is ragged"
                )));
            }
            if bias.len() != out {
                return Err(ClassifierError::InvalidWeights(format!(
                    "layer {i} bias length {} does not match {out} output units",
                    bias.len()
                )));
            }
            match expected_in {
                None => input_dim = cols,
                Some(prev_out) if prev_out != cols => {
                    return Err(ClassifierError::InvalidWeights(format!(
                        "layer {i} expects {cols} inputs but previous layer outputs {prev_out}"
                    )));
                }
                Some(_) => {}
            }
            expected_in = Some(out);

            let flat: Vec<f32> = rows.into_iter().flatten().collect();
            let weights = Array2::from_shape_vec((out, cols), flat)
                .map_err(|e| ClassifierError::InvalidWeights(e.to_string()))?;
            layers.push(Layer {
                weights,
                bias: Array1::from_vec(bias),
            });
        }

        let final_out = expected_in.unwrap_or(0);
        if final_out != labels.len() {
            return Err(ClassifierError::InvalidWeights(format!(
                "output layer has {final_out} units for {} labels",
                labels.len()
            )));
        }

        Ok(Self {
            labels,
            layers,
            input_dim,
        })
    }

    /// Load weights from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        let content = std::fs::read_to_string(path)?;
        let file: WeightsFile = serde_json::from_str(&content)?;
        let raw = file
            .layers
            .into_iter()
            .map(|l| (l.weights, l.bias))
            .collect();
        Self::from_layers(file.labels, raw)
    }

    /// Degenerate classifier for when no trained weights are available:
    /// every label scores 1/n, so any threshold above that triggers the
    /// caller's fallback path.
    pub fn uniform(labels: Vec<String>, input_dim: usize) -> Result<Self, ClassifierError> {
        if labels.is_empty() {
            return Err(ClassifierError::InvalidWeights("empty label set".into()));
        }
        if input_dim == 0 {
            return Err(ClassifierError::InvalidWeights("zero input dimension".into()));
        }
        let out = labels.len();
        Ok(Self {
            labels,
            layers: vec![Layer {
                weights: Array2::zeros((out, input_dim)),
                bias: Array1::zeros(out),
            }],
            input_dim,
        })
    }

    /// Score a query embedding against the label set.
    pub fn classify(&self, vector: &[f32]) -> Result<IntentResult, ClassifierError> {
        if vector.len() != self.input_dim {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.input_dim,
                actual: vector.len(),
            });
        }

        let mut x = Array1::from_vec(vector.to_vec());
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.weights.dot(&x) + &layer.bias;
            if i != last {
                x.mapv_inplace(|v| v.max(0.0));
            }
        }

        let probs = softmax(&x);
        let distribution: Vec<(String, f32)> = self
            .labels
            .iter()
            .cloned()
            .zip(probs.iter().copied())
            .collect();

        // Top label; ties resolve to the first in label order.
        let (label, confidence) = distribution
            .iter()
            .fold(None::<(&String, f32)>, |best, (l, p)| match best {
                Some((_, bp)) if *p <= bp => best,
                _ => Some((l, *p)),
            })
            .map(|(l, p)| (l.clone(), p))
            .unwrap_or_else(|| (self.labels[0].clone(), 0.0));

        Ok(IntentResult {
            label,
            confidence,
            distribution,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }
}

/// Numerically stable softmax (max-subtracted).
fn softmax(logits: &Array1<f32>) -> Array1<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}
