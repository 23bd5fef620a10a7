use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use rand_distr::Uniform;

use crate::optimizers::Optimizer;
use crate::utils::Activation;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl LinearGradients {
    pub fn matrices_mut(&mut self) -> [&mut Array2<f64>; 2] {
        [&mut self.weight, &mut self.bias]
    }
}

/// Values kept from the forward pass for the backward pass
#[derive(Clone, Debug)]
pub struct LinearCache {
    pub input: Array2<f64>,
    pub pre_activation: Array2<f64>,
}

/// A fully connected (dense) layer with an element-wise activation
///
/// Performs the transformation: output = φ(weight · input + bias)
/// where weight has shape (output_size, input_size), bias has shape
/// (output_size, 1) and input is (input_size, batch_size).
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
    pub input_size: usize,
    pub output_size: usize,
    pub activation: Activation,
}

impl LinearLayer {
    /// Create a new linear layer with Xavier/Glorot uniform initialization
    pub fn new(input_size: usize, output_size: usize) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();

        Self {
            weight: Array2::random((output_size, input_size), Uniform::new(-limit, limit)),
            bias: Array2::zeros((output_size, 1)),
            input_size,
            output_size,
            activation: Activation::Linear,
        }
    }

    /// Create a new linear layer with zero initialization
    pub fn new_zeros(input_size: usize, output_size: usize) -> Self {
        Self {
            weight: Array2::zeros((output_size, input_size)),
            bias: Array2::zeros((output_size, 1)),
            input_size,
            output_size,
            activation: Activation::Linear,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        self.forward_with_cache(input).0
    }

    /// Forward pass returning the output `(output_size, batch_size)` and its cache
    pub fn forward_with_cache(&self, input: &Array2<f64>) -> (Array2<f64>, LinearCache) {
        assert_eq!(
            input.nrows(),
            self.input_size,
            "Input size {} doesn't match layer input size {}",
            input.nrows(),
            self.input_size
        );

        let pre_activation = self.weight.dot(input) + &self.bias;
        let output = self.activation.forward(&pre_activation);

        (
            output,
            LinearCache {
                input: input.clone(),
                pre_activation,
            },
        )
    }

    /// Backward pass through the activation and the affine map
    ///
    /// Returns (gradients, input_gradient) where input_gradient is
    /// (input_size, batch_size)
    pub fn backward(&self, grad_output: &Array2<f64>, cache: &LinearCache) -> (LinearGradients, Array2<f64>) {
        let grad_pre = self.activation.backward(grad_output, &cache.pre_activation);

        let gradients = LinearGradients {
            weight: grad_pre.dot(&cache.input.t()),
            bias: grad_pre.sum_axis(Axis(1)).insert_axis(Axis(1)),
        };
        let input_grad = self.weight.t().dot(&grad_pre);

        (gradients, input_grad)
    }

    /// Update parameters using the provided optimizer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &LinearGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn zero_gradients(&self) -> LinearGradients {
        LinearGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
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

    /// Get the number of parameters in this layer
    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
