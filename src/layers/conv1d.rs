//! 1-D convolution over the time axis.
//!
//! Samples are laid out as `(batch, channels, length)`. The forward pass
//! unrolls each sample into a patch matrix of shape
//! `(in_channels * kernel_size, out_length)` so the convolution becomes a
//! single matrix product with the `(filters, in_channels * kernel_size)`
//! weight matrix.

use ndarray::{s, Array2, Array3, Axis};
use ndarray_rand::RandomExt;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};

use crate::optimizers::Optimizer;
use crate::utils::Activation;

/// Padding applied before the convolution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// No padding: output length is `len - kernel_size + 1`
    Valid,
    /// `kernel_size - 1` zeros on the left: output keeps the input length and
    /// step `t` only sees inputs at `t` and before
    Causal,
}

impl Padding {
    pub fn left(&self, kernel_size: usize) -> usize {
        match self {
            Padding::Valid => 0,
            Padding::Causal => kernel_size - 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Conv1dGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl Conv1dGradients {
    pub fn matrices_mut(&mut self) -> [&mut Array2<f64>; 2] {
        [&mut self.weight, &mut self.bias]
    }
}

#[derive(Clone, Debug)]
pub struct Conv1dCache {
    patches: Vec<Array2<f64>>,
    pre_activation: Array3<f64>,
    input_length: usize,
}

#[derive(Clone, Debug)]
pub struct Conv1d {
    pub weight: Array2<f64>, // (filters, in_channels * kernel_size)
    pub bias: Array2<f64>,   // (filters, 1)
    pub in_channels: usize,
    pub filters: usize,
    pub kernel_size: usize,
    pub padding: Padding,
    pub activation: Activation,
}

impl Conv1d {
    /// Glorot-uniform weights, zero bias, linear activation
    pub fn new(in_channels: usize, filters: usize, kernel_size: usize, padding: Padding) -> Self {
        assert!(kernel_size > 0, "Kernel size must be positive");
        let fan_in = in_channels * kernel_size;
        let limit = (6.0 / (fan_in + filters * kernel_size) as f64).sqrt();

        Conv1d {
            weight: Array2::random((filters, fan_in), Uniform::new(-limit, limit)),
            bias: Array2::zeros((filters, 1)),
            in_channels,
            filters,
            kernel_size,
            padding,
            activation: Activation::Linear,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Output length for a given input length, `None` if the input is too short
    pub fn output_length(&self, input_length: usize) -> Option<usize> {
        let padded = input_length + self.padding.left(self.kernel_size);
        (padded >= self.kernel_size).then(|| padded - self.kernel_size + 1)
    }

    fn patches(&self, sample: &Array2<f64>, out_len: usize) -> Array2<f64> {
        let pad = self.padding.left(self.kernel_size);
        let len = sample.ncols();
        let mut patches = Array2::zeros((self.in_channels * self.kernel_size, out_len));

        for c in 0..self.in_channels {
            for j in 0..self.kernel_size {
                let row = c * self.kernel_size + j;
                for t in 0..out_len {
                    // position in the unpadded input
                    let pos = t + j;
                    if pos >= pad && pos - pad < len {
                        patches[[row, t]] = sample[[c, pos - pad]];
                    }
                }
            }
        }
        patches
    }

    pub fn forward(&self, input: &Array3<f64>) -> Array3<f64> {
        self.forward_with_cache(input).0
    }

    pub fn forward_with_cache(&self, input: &Array3<f64>) -> (Array3<f64>, Conv1dCache) {
        let (batch, channels, len) = input.dim();
        assert_eq!(channels, self.in_channels, "Input channels mismatch: expected {}, got {}", self.in_channels, channels);
        let out_len = self
            .output_length(len)
            .expect("Input sequence shorter than the convolution kernel");

        let mut pre_activation = Array3::zeros((batch, self.filters, out_len));
        let mut patches = Vec::with_capacity(batch);

        for (b, sample) in input.axis_iter(Axis(0)).enumerate() {
            let sample_patches = self.patches(&sample.to_owned(), out_len);
            let out = self.weight.dot(&sample_patches) + &self.bias;
            pre_activation.slice_mut(s![b, .., ..]).assign(&out);
            patches.push(sample_patches);
        }

        let output = pre_activation.mapv(|x| self.activation.apply(x));
        let cache = Conv1dCache {
            patches,
            pre_activation,
            input_length: len,
        };
        (output, cache)
    }

    /// Returns parameter gradients and the gradient with respect to the input
    pub fn backward(&self, grad_output: &Array3<f64>, cache: &Conv1dCache) -> (Conv1dGradients, Array3<f64>) {
        let (batch, _, out_len) = grad_output.dim();
        let pad = self.padding.left(self.kernel_size);
        let len = cache.input_length;

        let mut gradients = self.zero_gradients();
        let mut grad_input = Array3::zeros((batch, self.in_channels, len));

        for b in 0..batch {
            let grad_pre = grad_output.slice(s![b, .., ..]).to_owned()
                * cache.pre_activation.slice(s![b, .., ..]).mapv(|x| self.activation.derivative(x));

            gradients.weight += &grad_pre.dot(&cache.patches[b].t());
            gradients.bias += &grad_pre.sum_axis(Axis(1)).insert_axis(Axis(1));

            // Scatter the patch gradients back onto the input positions
            let grad_patches = self.weight.t().dot(&grad_pre);
            for c in 0..self.in_channels {
                for j in 0..self.kernel_size {
                    let row = c * self.kernel_size + j;
                    for t in 0..out_len {
                        let pos = t + j;
                        if pos >= pad && pos - pad < len {
                            grad_input[[b, c, pos - pad]] += grad_patches[[row, t]];
                        }
                    }
                }
            }
        }

        (gradients, grad_input)
    }

    pub fn zero_gradients(&self) -> Conv1dGradients {
        Conv1dGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &Conv1dGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn parameters(&self, prefix: &str) -> Vec<(String, &Array2<f64>)> {
        vec![
            (format!("{}_weight", prefix), &self.weight),
            (format!("{}_bias", prefix), &self.bias),
        ]
    }

    pub fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array2<f64>)> {
        vec![
            (format!("{}_weight", prefix), &mut self.weight),
            (format!("{}_bias", prefix), &mut self.bias),
        ]
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
