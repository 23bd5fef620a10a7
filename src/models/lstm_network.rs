use ndarray::Array2;

use crate::layers::dropout::Dropout;
use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;
use crate::utils::Activation;

/// Per-layer caches of a sequence forward pass
#[derive(Clone, Debug)]
pub struct LSTMLayerCache {
    pub step_caches: Vec<LSTMCellCache>,
    pub dropout_masks: Vec<Option<Array2<f64>>>,
}

/// Holds cached values for all layers during network forward pass
#[derive(Clone, Debug)]
pub struct LSTMNetworkCache {
    pub layer_caches: Vec<LSTMLayerCache>,
}

/// Multi-layer LSTM network returning the full output sequence
///
/// Every layer consumes the whole sequence produced by the layer below and is
/// followed by its own dropout, i.e. `LSTM -> Dropout -> LSTM -> Dropout`.
/// Hidden and cell states start at zero for every sequence.
#[derive(Clone, Debug)]
pub struct LSTMNetwork {
    cells: Vec<LSTMCell>,
    dropouts: Vec<Dropout>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub is_training: bool,
}

impl LSTMNetwork {
    /// First layer accepts `input_size` dimensions, subsequent layers
    /// accept `hidden_size` dimensions from the previous layer.
    pub fn new(input_size: usize, hidden_size: usize, num_layers: usize) -> Self {
        let cells = (0..num_layers)
            .map(|i| {
                let layer_input_size = if i == 0 { input_size } else { hidden_size };
                LSTMCell::new(layer_input_size, hidden_size)
            })
            .collect();

        LSTMNetwork {
            cells,
            dropouts: vec![Dropout::new(0.0); num_layers],
            input_size,
            hidden_size,
            num_layers,
            is_training: true,
        }
    }

    /// Dropout applied to the output sequence of every layer
    pub fn with_dropout(mut self, dropout_rate: f64) -> Self {
        self.dropouts = vec![Dropout::new(dropout_rate); self.num_layers];
        if !self.is_training {
            self.eval();
        }
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.cells = self.cells.into_iter().map(|cell| cell.with_activation(activation)).collect();
        self
    }

    pub fn train(&mut self) {
        self.is_training = true;
        for dropout in &mut self.dropouts {
            dropout.train();
        }
    }

    pub fn eval(&mut self) {
        self.is_training = false;
        for dropout in &mut self.dropouts {
            dropout.eval();
        }
    }

    pub fn forward_sequence(&self, sequence: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.forward_sequence_with_cache(sequence).0
    }

    /// Runs every layer over the whole sequence; each element is `(features, batch)`
    pub fn forward_sequence_with_cache(&self, sequence: &[Array2<f64>]) -> (Vec<Array2<f64>>, LSTMNetworkCache) {
        let batch = sequence.first().map_or(1, |x| x.ncols());
        let mut layer_input = sequence.to_vec();
        let mut layer_caches = Vec::with_capacity(self.num_layers);

        for (cell, dropout) in self.cells.iter().zip(self.dropouts.iter()) {
            let mut hx = Array2::zeros((self.hidden_size, batch));
            let mut cx = Array2::zeros((self.hidden_size, batch));
            let mut outputs = Vec::with_capacity(layer_input.len());
            let mut step_caches = Vec::with_capacity(layer_input.len());
            let mut dropout_masks = Vec::with_capacity(layer_input.len());

            for input in &layer_input {
                let (hy, cy, cache) = cell.forward_with_cache(input, &hx, &cx);
                let (dropped, mask) = dropout.forward(&hy);
                outputs.push(dropped);
                step_caches.push(cache);
                dropout_masks.push(mask);
                hx = hy;
                cx = cy;
            }

            layer_caches.push(LSTMLayerCache { step_caches, dropout_masks });
            layer_input = outputs;
        }

        (layer_input, LSTMNetworkCache { layer_caches })
    }

    /// Backpropagation through time over all layers
    ///
    /// `output_grads[t]` is the gradient of the loss with respect to the
    /// network output at step `t`. Returns per-layer parameter gradients and
    /// the gradient with respect to every input step.
    pub fn backward_sequence(&self, output_grads: &[Array2<f64>], cache: &LSTMNetworkCache) -> (Vec<LSTMCellGradients>, Vec<Array2<f64>>) {
        let mut gradients: Vec<LSTMCellGradients> = self.zero_gradients();
        let mut upstream = output_grads.to_vec();

        for layer in (0..self.num_layers).rev() {
            let cell = &self.cells[layer];
            let dropout = &self.dropouts[layer];
            let layer_cache = &cache.layer_caches[layer];
            let batch = upstream.first().map_or(1, |g| g.ncols());

            let mut dh_next = Array2::zeros((self.hidden_size, batch));
            let mut dc_next = Array2::zeros((self.hidden_size, batch));
            let mut input_grads = vec![Array2::zeros((cell.input_size, batch)); upstream.len()];

            for t in (0..upstream.len()).rev() {
                let dh = dropout.backward(&upstream[t], layer_cache.dropout_masks[t].as_ref()) + &dh_next;
                let (step_gradients, dx, dhx, dcx) = cell.backward(&dh, &dc_next, &layer_cache.step_caches[t]);
                gradients[layer].accumulate(&step_gradients);
                input_grads[t] = dx;
                dh_next = dhx;
                dc_next = dcx;
            }

            upstream = input_grads;
        }

        (gradients, upstream)
    }

    /// Update parameters for all layers using computed gradients
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &[LSTMCellGradients], optimizer: &mut O, prefix: &str) {
        for (i, (cell, cell_gradients)) in self.cells.iter_mut().zip(gradients.iter()).enumerate() {
            cell.update_parameters(cell_gradients, optimizer, &format!("{}_layer_{}", prefix, i));
        }
    }

    /// Initialize zero gradients for all layers
    pub fn zero_gradients(&self) -> Vec<LSTMCellGradients> {
        self.cells.iter().map(|cell| cell.zero_gradients()).collect()
    }

    pub fn parameters(&self, prefix: &str) -> Vec<(String, &Array2<f64>)> {
        self.cells
            .iter()
            .enumerate()
            .flat_map(|(i, cell)| cell.parameters(&format!("{}_layer_{}", prefix, i)))
            .collect()
    }

    pub fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array2<f64>)> {
        self.cells
            .iter_mut()
            .enumerate()
            .flat_map(|(i, cell)| cell.parameters_mut(&format!("{}_layer_{}", prefix, i)))
            .collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.cells.iter().map(|cell| cell.num_parameters()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_lstm_network_sequence_shapes() {
        let network = LSTMNetwork::new(3, 2, 2).with_dropout(0.2);
        let sequence = vec![Array2::ones((3, 4)); 5];

        let (outputs, cache) = network.forward_sequence_with_cache(&sequence);
        assert_eq!(outputs.len(), 5);
        assert_eq!(outputs[0].shape(), &[2, 4]);
        assert_eq!(cache.layer_caches.len(), 2);

        let grads = vec![Array2::ones((2, 4)); 5];
        let (gradients, input_grads) = network.backward_sequence(&grads, &cache);
        assert_eq!(gradients.len(), 2);
        assert_eq!(gradients[0].w_ih.shape(), &[8, 3]);
        assert_eq!(gradients[1].w_ih.shape(), &[8, 2]);
        assert_eq!(input_grads.len(), 5);
        assert_eq!(input_grads[0].shape(), &[3, 4]);
    }

    #[test]
    fn test_eval_mode_is_deterministic() {
        let mut network = LSTMNetwork::new(2, 3, 2).with_dropout(0.5);
        network.eval();

        let sequence = vec![arr2(&[[0.5], [0.1]]), arr2(&[[-0.3], [0.8]])];
        let first = network.forward_sequence(&sequence);
        let second = network.forward_sequence(&sequence);
        assert_eq!(first, second);
    }

    #[test]
    fn test_bptt_input_gradient_matches_finite_difference() {
        let network = LSTMNetwork::new(2, 3, 2);
        let sequence = vec![arr2(&[[0.5], [0.1]]), arr2(&[[-0.3], [0.8]]), arr2(&[[0.2], [-0.6]])];

        // Loss = sum of the last output
        let (outputs, cache) = network.forward_sequence_with_cache(&sequence);
        let mut grads: Vec<Array2<f64>> = outputs.iter().map(|o| Array2::zeros(o.raw_dim())).collect();
        grads[2] = Array2::ones((3, 1));
        let (_, input_grads) = network.backward_sequence(&grads, &cache);

        let eps = 1e-6;
        for t in 0..3 {
            for i in 0..2 {
                let mut plus = sequence.clone();
                plus[t][[i, 0]] += eps;
                let mut minus = sequence.clone();
                minus[t][[i, 0]] -= eps;
                let lp = network.forward_sequence(&plus)[2].sum();
                let lm = network.forward_sequence(&minus)[2].sum();
                let numeric = (lp - lm) / (2.0 * eps);
                assert!((numeric - input_grads[t][[i, 0]]).abs() < 1e-6);
            }
        }
    }
}
