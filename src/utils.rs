/// Activation functions and small numeric helpers shared by the layers.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Element-wise activation used by convolution, dense and recurrent layers.
///
/// For LSTM cells this replaces `tanh` on the candidate and output paths while
/// the gates keep their sigmoid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Tanh,
    Relu,
    Linear,
}

impl Activation {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(0.0),
            Activation::Linear => x,
        }
    }

    /// Derivative with respect to the pre-activation value `x`
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            Activation::Tanh => 1.0 - x.tanh().powi(2),
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Linear => 1.0,
        }
    }

    pub fn forward(&self, pre: &Array2<f64>) -> Array2<f64> {
        pre.mapv(|x| self.apply(x))
    }

    /// Chain an upstream gradient through the activation evaluated at `pre`
    pub fn backward(&self, grad: &Array2<f64>, pre: &Array2<f64>) -> Array2<f64> {
        grad * &pre.mapv(|x| self.derivative(x))
    }
}

/// Median of a non-empty slice; `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
