use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;
use crate::utils::Activation;

/// Cache for bidirectional LSTM forward pass
#[derive(Clone, Debug)]
pub struct BiLSTMNetworkCache {
    pub forward_caches: Vec<LSTMCellCache>,
    /// In processing order, i.e. from the last step back to the first
    pub backward_caches: Vec<LSTMCellCache>,
}

/// Configuration for combining forward and backward outputs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    Concat,
    Sum,
    Average,
}

/// Bidirectional LSTM layer that summarises a sequence into one vector
///
/// The forward cell reads the sequence from start to end, the backward cell
/// from end to start; the final hidden state of each direction is combined
/// according to `combine_mode`.
#[derive(Clone, Debug)]
pub struct BiLSTMNetwork {
    forward_cell: LSTMCell,
    backward_cell: LSTMCell,
    pub input_size: usize,
    pub hidden_size: usize,
    pub combine_mode: CombineMode,
}

impl BiLSTMNetwork {
    pub fn new(input_size: usize, hidden_size: usize, combine_mode: CombineMode) -> Self {
        BiLSTMNetwork {
            forward_cell: LSTMCell::new(input_size, hidden_size),
            backward_cell: LSTMCell::new(input_size, hidden_size),
            input_size,
            hidden_size,
            combine_mode,
        }
    }

    /// Create BiLSTM with concatenated outputs (most common)
    pub fn new_concat(input_size: usize, hidden_size: usize) -> Self {
        Self::new(input_size, hidden_size, CombineMode::Concat)
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.forward_cell = self.forward_cell.with_activation(activation);
        self.backward_cell = self.backward_cell.with_activation(activation);
        self
    }

    /// Get the output size based on combine mode
    pub fn output_size(&self) -> usize {
        match self.combine_mode {
            CombineMode::Concat => 2 * self.hidden_size,
            CombineMode::Sum | CombineMode::Average => self.hidden_size,
        }
    }

    fn combine_outputs(&self, forward: &Array2<f64>, backward: &Array2<f64>) -> Array2<f64> {
        match self.combine_mode {
            CombineMode::Concat => {
                let mut combined = Array2::zeros((forward.nrows() + backward.nrows(), forward.ncols()));
                combined.slice_mut(s![..forward.nrows(), ..]).assign(forward);
                combined.slice_mut(s![forward.nrows().., ..]).assign(backward);
                combined
            }
            CombineMode::Sum => forward + backward,
            CombineMode::Average => (forward + backward) * 0.5,
        }
    }

    /// Splits the gradient of the combined output into per-direction gradients
    fn split_gradient(&self, grad: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let h = self.hidden_size;
        match self.combine_mode {
            CombineMode::Concat => (grad.slice(s![..h, ..]).to_owned(), grad.slice(s![h.., ..]).to_owned()),
            CombineMode::Sum => (grad.clone(), grad.clone()),
            CombineMode::Average => (grad * 0.5, grad * 0.5),
        }
    }

    fn run_direction(cell: &LSTMCell, steps: impl Iterator<Item = Array2<f64>>, hidden_size: usize, batch: usize) -> (Array2<f64>, Vec<LSTMCellCache>) {
        let mut hx = Array2::zeros((hidden_size, batch));
        let mut cx = Array2::zeros((hidden_size, batch));
        let mut caches = Vec::new();

        for input in steps {
            let (hy, cy, cache) = cell.forward_with_cache(&input, &hx, &cx);
            hx = hy;
            cx = cy;
            caches.push(cache);
        }
        (hx, caches)
    }

    pub fn forward(&self, sequence: &[Array2<f64>]) -> Array2<f64> {
        self.forward_with_cache(sequence).0
    }

    /// Returns the combined final states, `(output_size, batch)`
    pub fn forward_with_cache(&self, sequence: &[Array2<f64>]) -> (Array2<f64>, BiLSTMNetworkCache) {
        let batch = sequence.first().map_or(1, |x| x.ncols());

        let (forward_last, forward_caches) =
            Self::run_direction(&self.forward_cell, sequence.iter().cloned(), self.hidden_size, batch);
        let (backward_last, backward_caches) =
            Self::run_direction(&self.backward_cell, sequence.iter().rev().cloned(), self.hidden_size, batch);

        let output = self.combine_outputs(&forward_last, &backward_last);
        (output, BiLSTMNetworkCache { forward_caches, backward_caches })
    }

    fn backward_direction(cell: &LSTMCell, dh_last: Array2<f64>, caches: &[LSTMCellCache]) -> (LSTMCellGradients, Vec<Array2<f64>>) {
        let mut gradients = cell.zero_gradients();
        let mut dh = dh_last;
        let mut dc = Array2::zeros(dh.raw_dim());
        let mut input_grads = Vec::with_capacity(caches.len());

        for cache in caches.iter().rev() {
            let (step_gradients, dx, dhx, dcx) = cell.backward(&dh, &dc, cache);
            gradients.accumulate(&step_gradients);
            input_grads.push(dx);
            dh = dhx;
            dc = dcx;
        }

        // Collected from the last processed step to the first
        input_grads.reverse();
        (gradients, input_grads)
    }

    /// Returns (forward_gradients, backward_gradients, input_gradients per step)
    pub fn backward(&self, grad_output: &Array2<f64>, cache: &BiLSTMNetworkCache) -> (LSTMCellGradients, LSTMCellGradients, Vec<Array2<f64>>) {
        let (d_forward, d_backward) = self.split_gradient(grad_output);

        let (forward_gradients, forward_input_grads) =
            Self::backward_direction(&self.forward_cell, d_forward, &cache.forward_caches);
        let (backward_gradients, mut backward_input_grads) =
            Self::backward_direction(&self.backward_cell, d_backward, &cache.backward_caches);

        // The backward cell saw the sequence reversed
        backward_input_grads.reverse();
        let input_grads = forward_input_grads
            .into_iter()
            .zip(backward_input_grads)
            .map(|(f, b)| f + &b)
            .collect();

        (forward_gradients, backward_gradients, input_grads)
    }

    pub fn zero_gradients(&self) -> (LSTMCellGradients, LSTMCellGradients) {
        (self.forward_cell.zero_gradients(), self.backward_cell.zero_gradients())
    }

    /// Update parameters for both directions
    pub fn update_parameters<O: Optimizer>(&mut self, forward_gradients: &LSTMCellGradients, backward_gradients: &LSTMCellGradients, optimizer: &mut O, prefix: &str) {
        self.forward_cell.update_parameters(forward_gradients, optimizer, &format!("{}_forward", prefix));
        self.backward_cell.update_parameters(backward_gradients, optimizer, &format!("{}_backward", prefix));
    }

    pub fn parameters(&self, prefix: &str) -> Vec<(String, &Array2<f64>)> {
        let mut params = self.forward_cell.parameters(&format!("{}_forward", prefix));
        params.extend(self.backward_cell.parameters(&format!("{}_backward", prefix)));
        params
    }

    pub fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array2<f64>)> {
        let mut params = self.forward_cell.parameters_mut(&format!("{}_forward", prefix));
        params.extend(self.backward_cell.parameters_mut(&format!("{}_backward", prefix)));
        params
    }

    pub fn num_parameters(&self) -> usize {
        self.forward_cell.num_parameters() + self.backward_cell.num_parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_bilstm_creation() {
        let network = BiLSTMNetwork::new_concat(3, 5);
        assert_eq!(network.input_size, 3);
        assert_eq!(network.hidden_size, 5);
        assert_eq!(network.output_size(), 10);
    }

    #[test]
    fn test_bilstm_combine_modes() {
        let forward = arr2(&[[1.0], [2.0]]);
        let backward = arr2(&[[3.0], [4.0]]);

        let concat_network = BiLSTMNetwork::new_concat(2, 2);
        let concat_result = concat_network.combine_outputs(&forward, &backward);
        assert_eq!(concat_result, arr2(&[[1.0], [2.0], [3.0], [4.0]]));

        let sum_network = BiLSTMNetwork::new(2, 2, CombineMode::Sum);
        assert_eq!(sum_network.combine_outputs(&forward, &backward), arr2(&[[4.0], [6.0]]));

        let avg_network = BiLSTMNetwork::new(2, 2, CombineMode::Average);
        assert_eq!(avg_network.combine_outputs(&forward, &backward), arr2(&[[2.0], [3.0]]));
    }

    #[test]
    fn test_bilstm_forward_sequence() {
        let network = BiLSTMNetwork::new_concat(2, 3);
        let sequence = vec![arr2(&[[1.0, 0.0], [0.5, 0.1]]), arr2(&[[0.8, 0.3], [0.2, 0.4]]), arr2(&[[0.3, 0.6], [0.9, 0.2]])];

        let (output, cache) = network.forward_with_cache(&sequence);
        assert_eq!(output.shape(), &[6, 2]);
        assert_eq!(cache.forward_caches.len(), 3);
        assert_eq!(cache.backward_caches.len(), 3);
    }

    #[test]
    fn test_bilstm_input_gradient_matches_finite_difference() {
        let network = BiLSTMNetwork::new_concat(2, 2);
        let sequence = vec![arr2(&[[0.4], [-0.2]]), arr2(&[[0.1], [0.7]]), arr2(&[[-0.5], [0.3]])];

        let (output, cache) = network.forward_with_cache(&sequence);
        let (_, _, input_grads) = network.backward(&Array2::ones(output.raw_dim()), &cache);

        let eps = 1e-6;
        for t in 0..3 {
            for i in 0..2 {
                let mut plus = sequence.clone();
                plus[t][[i, 0]] += eps;
                let mut minus = sequence.clone();
                minus[t][[i, 0]] -= eps;
                let numeric = (network.forward(&plus).sum() - network.forward(&minus).sum()) / (2.0 * eps);
                assert!((numeric - input_grads[t][[i, 0]]).abs() < 1e-6);
            }
        }
    }
}
