use ndarray::{s, Array2, Axis};
use ndarray_rand::RandomExt;
use rand_distr::Uniform;

use crate::optimizers::Optimizer;
use crate::utils::{sigmoid, Activation};

/// Holds gradients for all LSTM cell parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LSTMCellGradients {
    pub w_ih: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub b_ih: Array2<f64>,
    pub b_hh: Array2<f64>,
}

impl LSTMCellGradients {
    pub fn accumulate(&mut self, other: &LSTMCellGradients) {
        self.w_ih += &other.w_ih;
        self.w_hh += &other.w_hh;
        self.b_ih += &other.b_ih;
        self.b_hh += &other.b_hh;
    }

    pub fn matrices_mut(&mut self) -> [&mut Array2<f64>; 4] {
        [&mut self.w_ih, &mut self.w_hh, &mut self.b_ih, &mut self.b_hh]
    }
}

/// Caches intermediate values during forward pass for efficient backward computation
#[derive(Clone, Debug)]
pub struct LSTMCellCache {
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub cx: Array2<f64>,
    pub gates: Array2<f64>,
    pub input_gate: Array2<f64>,
    pub forget_gate: Array2<f64>,
    pub cell_gate: Array2<f64>,
    pub output_gate: Array2<f64>,
    pub cy: Array2<f64>,
}

/// LSTM cell with trainable parameters
///
/// Implements the standard LSTM equations with a configurable activation `φ`
/// (tanh by default, relu for the forecasting stack):
/// - i_t = σ(W_xi * x_t + W_hi * h_t-1 + b_i)
/// - f_t = σ(W_xf * x_t + W_hf * h_t-1 + b_f)
/// - g_t = φ(W_xg * x_t + W_hg * h_t-1 + b_g)
/// - o_t = σ(W_xo * x_t + W_ho * h_t-1 + b_o)
/// - c_t = f_t ⊙ c_t-1 + i_t ⊙ g_t
/// - h_t = o_t ⊙ φ(c_t)
///
/// Inputs and states are column-major: `(features, batch)`.
#[derive(Clone, Debug)]
pub struct LSTMCell {
    pub w_ih: Array2<f64>, // (4*hidden_size, input_size)
    pub w_hh: Array2<f64>, // (4*hidden_size, hidden_size)
    pub b_ih: Array2<f64>, // (4*hidden_size, 1)
    pub b_hh: Array2<f64>, // (4*hidden_size, 1)
    pub input_size: usize,
    pub hidden_size: usize,
    pub activation: Activation,
}

impl LSTMCell {
    /// Creates new LSTM cell with uniform(-0.1, 0.1) weight initialization
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        let dist = Uniform::new(-0.1, 0.1);

        LSTMCell {
            w_ih: Array2::random((4 * hidden_size, input_size), dist),
            w_hh: Array2::random((4 * hidden_size, hidden_size), dist),
            b_ih: Array2::zeros((4 * hidden_size, 1)),
            b_hh: Array2::zeros((4 * hidden_size, 1)),
            input_size,
            hidden_size,
            activation: Activation::Tanh,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn forward(&self, input: &Array2<f64>, hx: &Array2<f64>, cx: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let (hy, cy, _) = self.forward_with_cache(input, hx, cx);
        (hy, cy)
    }

    pub fn forward_with_cache(&self, input: &Array2<f64>, hx: &Array2<f64>, cx: &Array2<f64>) -> (Array2<f64>, Array2<f64>, LSTMCellCache) {
        let h = self.hidden_size;

        // All gates at once: [input_gate, forget_gate, cell_gate, output_gate]
        let gates = self.w_ih.dot(input) + &self.b_ih + &self.w_hh.dot(hx) + &self.b_hh;

        let input_gate = gates.slice(s![0..h, ..]).mapv(sigmoid);
        let forget_gate = gates.slice(s![h..2 * h, ..]).mapv(sigmoid);
        let cell_gate = gates.slice(s![2 * h..3 * h, ..]).mapv(|x| self.activation.apply(x));
        let output_gate = gates.slice(s![3 * h..4 * h, ..]).mapv(sigmoid);

        let cy = &forget_gate * cx + &input_gate * &cell_gate;
        let hy = &output_gate * &cy.mapv(|x| self.activation.apply(x));

        let cache = LSTMCellCache {
            input: input.clone(),
            hx: hx.clone(),
            cx: cx.clone(),
            gates,
            input_gate,
            forget_gate,
            cell_gate,
            output_gate,
            cy: cy.clone(),
        };

        (hy, cy, cache)
    }

    /// Backward pass for one time step
    ///
    /// Returns (parameter_gradients, input_gradient, hidden_gradient, cell_gradient)
    pub fn backward(&self, dhy: &Array2<f64>, dcy: &Array2<f64>, cache: &LSTMCellCache) -> (LSTMCellGradients, Array2<f64>, Array2<f64>, Array2<f64>) {
        let h = self.hidden_size;
        let batch = dhy.ncols();
        let act = self.activation;

        // ∂L/∂o_t = ∂L/∂h_t ⊙ φ(c_t)
        let act_cy = cache.cy.mapv(|x| act.apply(x));
        let do_raw = dhy * &act_cy * &cache.output_gate * &cache.output_gate.mapv(|x| 1.0 - x);

        // Cell state gradient from the direct path and through h_t
        let dcy_total = dcy + &(dhy * &cache.output_gate * &cache.cy.mapv(|x| act.derivative(x)));

        let df_raw = &dcy_total * &cache.cx * &cache.forget_gate * &cache.forget_gate.mapv(|x| 1.0 - x);
        let di_raw = &dcy_total * &cache.cell_gate * &cache.input_gate * &cache.input_gate.mapv(|x| 1.0 - x);

        let cell_pre = cache.gates.slice(s![2 * h..3 * h, ..]);
        let dg_raw = &dcy_total * &cache.input_gate * &cell_pre.mapv(|x| act.derivative(x));

        let mut dgates = Array2::zeros((4 * h, batch));
        dgates.slice_mut(s![0..h, ..]).assign(&di_raw);
        dgates.slice_mut(s![h..2 * h, ..]).assign(&df_raw);
        dgates.slice_mut(s![2 * h..3 * h, ..]).assign(&dg_raw);
        dgates.slice_mut(s![3 * h..4 * h, ..]).assign(&do_raw);

        let db = dgates.sum_axis(Axis(1)).insert_axis(Axis(1));
        let gradients = LSTMCellGradients {
            w_ih: dgates.dot(&cache.input.t()),
            w_hh: dgates.dot(&cache.hx.t()),
            b_ih: db.clone(),
            b_hh: db,
        };

        let dx = self.w_ih.t().dot(&dgates);
        let dhx = self.w_hh.t().dot(&dgates);
        let dcx = &dcy_total * &cache.forget_gate;

        (gradients, dx, dhx, dcx)
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LSTMCellGradients {
        LSTMCellGradients {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            b_ih: Array2::zeros(self.b_ih.raw_dim()),
            b_hh: Array2::zeros(self.b_hh.raw_dim()),
        }
    }

    /// Apply gradients using the provided optimizer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &LSTMCellGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_w_ih", prefix), &mut self.w_ih, &gradients.w_ih);
        optimizer.update(&format!("{}_w_hh", prefix), &mut self.w_hh, &gradients.w_hh);
        optimizer.update(&format!("{}_b_ih", prefix), &mut self.b_ih, &gradients.b_ih);
        optimizer.update(&format!("{}_b_hh", prefix), &mut self.b_hh, &gradients.b_hh);
    }

    pub fn parameters(&self, prefix: &str) -> Vec<(String, &Array2<f64>)> {
        vec![
            (format!("{}_w_ih", prefix), &self.w_ih),
            (format!("{}_w_hh", prefix), &self.w_hh),
            (format!("{}_b_ih", prefix), &self.b_ih),
            (format!("{}_b_hh", prefix), &self.b_hh),
        ]
    }

    pub fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array2<f64>)> {
        vec![
            (format!("{}_w_ih", prefix), &mut self.w_ih),
            (format!("{}_w_hh", prefix), &mut self.w_hh),
            (format!("{}_b_ih", prefix), &mut self.b_ih),
            (format!("{}_b_hh", prefix), &mut self.b_hh),
        ]
    }

    pub fn num_parameters(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.b_ih.len() + self.b_hh.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_lstm_cell_forward() {
        let input_size = 3;
        let hidden_size = 2;
        let cell = LSTMCell::new(input_size, hidden_size);

        let input = arr2(&[[0.5], [0.1], [-0.3]]);
        let hx = arr2(&[[0.0], [0.0]]);
        let cx = arr2(&[[0.0], [0.0]]);

        let (hy, cy) = cell.forward(&input, &hx, &cx);

        assert_eq!(hy.shape(), &[hidden_size, 1]);
        assert_eq!(cy.shape(), &[hidden_size, 1]);
    }

    #[test]
    fn test_lstm_cell_batched_backward_shapes() {
        let cell = LSTMCell::new(2, 3).with_activation(Activation::Relu);
        let input = arr2(&[[1.0, 0.2, -0.4, 0.0], [0.5, 0.3, 0.1, -1.0]]);
        let hx = Array2::zeros((3, 4));
        let cx = Array2::zeros((3, 4));

        let (hy, _cy, cache) = cell.forward_with_cache(&input, &hx, &cx);
        assert_eq!(hy.shape(), &[3, 4]);

        let dhy = Array2::ones((3, 4));
        let dcy = Array2::zeros((3, 4));
        let (gradients, dx, dhx, dcx) = cell.backward(&dhy, &dcy, &cache);

        assert_eq!(gradients.w_ih.shape(), &[12, 2]);
        assert_eq!(gradients.w_hh.shape(), &[12, 3]);
        assert_eq!(gradients.b_ih.shape(), &[12, 1]);
        assert_eq!(dx.shape(), &[2, 4]);
        assert_eq!(dhx.shape(), &[3, 4]);
        assert_eq!(dcx.shape(), &[3, 4]);
    }

    #[test]
    fn test_lstm_cell_input_gradient_matches_finite_difference() {
        let cell = LSTMCell::new(2, 2);
        let input = arr2(&[[0.3], [-0.7]]);
        let hx = arr2(&[[0.1], [-0.2]]);
        let cx = arr2(&[[0.05], [0.4]]);

        // Loss = sum(h_t)
        let (_, _, cache) = cell.forward_with_cache(&input, &hx, &cx);
        let (_, dx, _, _) = cell.backward(&Array2::ones((2, 1)), &Array2::zeros((2, 1)), &cache);

        let eps = 1e-6;
        for i in 0..2 {
            let mut plus = input.clone();
            plus[[i, 0]] += eps;
            let mut minus = input.clone();
            minus[[i, 0]] -= eps;
            let (hp, _) = cell.forward(&plus, &hx, &cx);
            let (hm, _) = cell.forward(&minus, &hx, &cx);
            let numeric = (hp.sum() - hm.sum()) / (2.0 * eps);
            assert!((numeric - dx[[i, 0]]).abs() < 1e-6);
        }
    }
}
