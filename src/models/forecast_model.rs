use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::layers::bilstm_network::{BiLSTMNetwork, BiLSTMNetworkCache, CombineMode};
use crate::layers::conv1d::{Conv1d, Conv1dCache, Conv1dGradients, Padding};
use crate::layers::linear::{LinearCache, LinearGradients, LinearLayer};
use crate::layers::lstm_cell::LSTMCellGradients;
use crate::layers::pooling::{MaxPool1d, MaxPool1dCache};
use crate::layers::reshape;
use crate::models::lstm_network::{LSTMNetwork, LSTMNetworkCache};
use crate::optimizers::Optimizer;
use crate::utils::Activation;

/// Topology hyperparameters of [`ForecastModel`]
///
/// Defaults reproduce the reference network: three Conv1D layers
/// (128, 128, 256 filters, kernel 2) with a size-2 max pool before the third,
/// two stacked 100-unit LSTMs with 0.2 dropout, a 128-unit bidirectional LSTM
/// and a 100-unit dense layer before the scalar output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub window_size: usize,
    pub num_features: usize,
    pub conv1_filters: usize,
    pub conv2_filters: usize,
    pub conv3_filters: usize,
    pub kernel_size: usize,
    pub pool_size: usize,
    pub padding: Padding,
    pub lstm_units: usize,
    pub lstm_layers: usize,
    pub dropout: f64,
    pub bilstm_units: usize,
    pub combine_mode: CombineMode,
    pub dense_units: usize,
    pub activation: Activation,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            window_size: 30,
            num_features: 1,
            conv1_filters: 128,
            conv2_filters: 128,
            conv3_filters: 256,
            kernel_size: 2,
            pool_size: 2,
            padding: Padding::Causal,
            lstm_units: 100,
            lstm_layers: 2,
            dropout: 0.2,
            bilstm_units: 128,
            combine_mode: CombineMode::Concat,
            dense_units: 100,
            activation: Activation::Relu,
        }
    }
}

impl ModelConfig {
    /// Checks sizes and returns the `(channels, length)` left by the conv stack
    pub fn conv_output_shape(&self) -> Result<(usize, usize)> {
        let positive = [
            ("window_size", self.window_size),
            ("num_features", self.num_features),
            ("conv1_filters", self.conv1_filters),
            ("conv2_filters", self.conv2_filters),
            ("conv3_filters", self.conv3_filters),
            ("kernel_size", self.kernel_size),
            ("pool_size", self.pool_size),
            ("lstm_units", self.lstm_units),
            ("lstm_layers", self.lstm_layers),
            ("bilstm_units", self.bilstm_units),
            ("dense_units", self.dense_units),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ForecastError::InvalidConfig(format!("{} must be positive", name)));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::InvalidConfig(format!("dropout {} must be in [0, 1)", self.dropout)));
        }

        let too_short = || {
            ForecastError::InvalidConfig(format!(
                "window of {} steps is too short for kernel {} and pool {}",
                self.window_size, self.kernel_size, self.pool_size
            ))
        };
        let probe = Conv1d::new(1, 1, self.kernel_size, self.padding);
        let len = probe.output_length(self.window_size).filter(|&n| n > 0).ok_or_else(too_short)?;
        let len = probe.output_length(len).filter(|&n| n > 0).ok_or_else(too_short)?;
        let len = MaxPool1d::new(self.pool_size).output_length(len);
        let len = probe.output_length(len).filter(|&n| n > 0).ok_or_else(too_short)?;

        Ok((self.conv3_filters, len))
    }
}

/// Everything the backward pass needs from one forward pass
#[derive(Clone, Debug)]
pub struct ForecastCache {
    conv1: Conv1dCache,
    conv2: Conv1dCache,
    pool: MaxPool1dCache,
    conv3: Conv1dCache,
    lstm: LSTMNetworkCache,
    bilstm: BiLSTMNetworkCache,
    dense: LinearCache,
    output: LinearCache,
}

#[derive(Clone, Debug)]
pub struct ForecastGradients {
    pub conv1: Conv1dGradients,
    pub conv2: Conv1dGradients,
    pub conv3: Conv1dGradients,
    pub lstm: Vec<LSTMCellGradients>,
    pub bilstm_forward: LSTMCellGradients,
    pub bilstm_backward: LSTMCellGradients,
    pub dense: LinearGradients,
    pub output: LinearGradients,
}

impl ForecastGradients {
    pub fn matrices_mut(&mut self) -> Vec<&mut Array2<f64>> {
        let mut matrices: Vec<&mut Array2<f64>> = Vec::new();
        matrices.extend(self.conv1.matrices_mut());
        matrices.extend(self.conv2.matrices_mut());
        matrices.extend(self.conv3.matrices_mut());
        for layer in &mut self.lstm {
            matrices.extend(layer.matrices_mut());
        }
        matrices.extend(self.bilstm_forward.matrices_mut());
        matrices.extend(self.bilstm_backward.matrices_mut());
        matrices.extend(self.dense.matrices_mut());
        matrices.extend(self.output.matrices_mut());
        matrices
    }
}

/// Conv1D -> Conv1D -> MaxPool -> Conv1D -> Flatten -> RepeatVector ->
/// LSTM stack -> BiLSTM -> Dense -> Dense(1)
///
/// Inputs are batches of windows shaped `(batch, window_size, num_features)`;
/// the output is one scalar per window.
#[derive(Clone, Debug)]
pub struct ForecastModel {
    pub config: ModelConfig,
    conv1: Conv1d,
    conv2: Conv1d,
    pool: MaxPool1d,
    conv3: Conv1d,
    conv_out_channels: usize,
    conv_out_len: usize,
    lstm: LSTMNetwork,
    bilstm: BiLSTMNetwork,
    dense: LinearLayer,
    output: LinearLayer,
    pub is_training: bool,
}

impl ForecastModel {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let (conv_out_channels, conv_out_len) = config.conv_output_shape()?;
        let act = config.activation;

        let conv1 = Conv1d::new(config.num_features, config.conv1_filters, config.kernel_size, config.padding).with_activation(Activation::Relu);
        let conv2 = Conv1d::new(config.conv1_filters, config.conv2_filters, config.kernel_size, config.padding).with_activation(Activation::Relu);
        let pool = MaxPool1d::new(config.pool_size);
        let conv3 = Conv1d::new(config.conv2_filters, config.conv3_filters, config.kernel_size, config.padding).with_activation(Activation::Relu);

        let flat_size = conv_out_channels * conv_out_len;
        let lstm = LSTMNetwork::new(flat_size, config.lstm_units, config.lstm_layers)
            .with_activation(act)
            .with_dropout(config.dropout);
        let bilstm = BiLSTMNetwork::new(config.lstm_units, config.bilstm_units, config.combine_mode).with_activation(act);
        let dense = LinearLayer::new(bilstm.output_size(), config.dense_units).with_activation(Activation::Relu);
        let output = LinearLayer::new(config.dense_units, 1);

        Ok(ForecastModel {
            config,
            conv1,
            conv2,
            pool,
            conv3,
            conv_out_channels,
            conv_out_len,
            lstm,
            bilstm,
            dense,
            output,
            is_training: true,
        })
    }

    pub fn train(&mut self) {
        self.is_training = true;
        self.lstm.train();
    }

    pub fn eval(&mut self) {
        self.is_training = false;
        self.lstm.eval();
    }

    fn check_input(&self, input: &Array3<f64>) {
        let (_, steps, features) = input.dim();
        assert_eq!(steps, self.config.window_size, "Expected windows of {} steps, got {}", self.config.window_size, steps);
        assert_eq!(features, self.config.num_features, "Expected {} features, got {}", self.config.num_features, features);
    }

    /// Forward pass returning predictions `(1, batch)`
    pub fn forward(&self, input: &Array3<f64>) -> Array2<f64> {
        self.forward_with_cache(input).0
    }

    pub fn forward_with_cache(&self, input: &Array3<f64>) -> (Array2<f64>, ForecastCache) {
        self.check_input(input);

        let channels_first = reshape::to_channels_first(input);
        let (x, conv1) = self.conv1.forward_with_cache(&channels_first);
        let (x, conv2) = self.conv2.forward_with_cache(&x);
        let (x, pool) = self.pool.forward_with_cache(&x);
        let (x, conv3) = self.conv3.forward_with_cache(&x);

        let flat = reshape::flatten(&x);
        let sequence = reshape::repeat_vector(&flat, self.config.window_size);
        let (sequence, lstm) = self.lstm.forward_sequence_with_cache(&sequence);
        let (summary, bilstm) = self.bilstm.forward_with_cache(&sequence);
        let (hidden, dense) = self.dense.forward_with_cache(&summary);
        let (prediction, output) = self.output.forward_with_cache(&hidden);

        let cache = ForecastCache {
            conv1,
            conv2,
            pool,
            conv3,
            lstm,
            bilstm,
            dense,
            output,
        };
        (prediction, cache)
    }

    /// Backward pass from the loss gradient with respect to the predictions
    pub fn backward(&self, grad_output: &Array2<f64>, cache: &ForecastCache) -> ForecastGradients {
        let (output, grad) = self.output.backward(grad_output, &cache.output);
        let (dense, grad) = self.dense.backward(&grad, &cache.dense);
        let (bilstm_forward, bilstm_backward, grad_sequence) = self.bilstm.backward(&grad, &cache.bilstm);
        let (lstm, grad_sequence) = self.lstm.backward_sequence(&grad_sequence, &cache.lstm);

        let grad_flat = reshape::repeat_vector_backward(&grad_sequence);
        let grad = reshape::unflatten(&grad_flat, self.conv_out_channels, self.conv_out_len);
        let (conv3, grad) = self.conv3.backward(&grad, &cache.conv3);
        let grad = self.pool.backward(&grad, &cache.pool);
        let (conv2, grad) = self.conv2.backward(&grad, &cache.conv2);
        let (conv1, _) = self.conv1.backward(&grad, &cache.conv1);

        ForecastGradients {
            conv1,
            conv2,
            conv3,
            lstm,
            bilstm_forward,
            bilstm_backward,
            dense,
            output,
        }
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &ForecastGradients, optimizer: &mut O) {
        self.conv1.update_parameters(&gradients.conv1, optimizer, "conv1");
        self.conv2.update_parameters(&gradients.conv2, optimizer, "conv2");
        self.conv3.update_parameters(&gradients.conv3, optimizer, "conv3");
        self.lstm.update_parameters(&gradients.lstm, optimizer, "lstm");
        self.bilstm.update_parameters(&gradients.bilstm_forward, &gradients.bilstm_backward, optimizer, "bilstm");
        self.dense.update_parameters(&gradients.dense, optimizer, "dense");
        self.output.update_parameters(&gradients.output, optimizer, "output");
    }

    /// One prediction per window; call `eval()` first to disable dropout
    pub fn predict(&self, input: &Array3<f64>) -> Array1<f64> {
        self.forward(input).row(0).to_owned()
    }

    /// Named parameter matrices in a stable order (used for checkpoints)
    pub fn parameters(&self) -> Vec<(String, &Array2<f64>)> {
        let mut params = self.conv1.parameters("conv1");
        params.extend(self.conv2.parameters("conv2"));
        params.extend(self.conv3.parameters("conv3"));
        params.extend(self.lstm.parameters("lstm"));
        params.extend(self.bilstm.parameters("bilstm"));
        params.extend(self.dense.parameters("dense"));
        params.extend(self.output.parameters("output"));
        params
    }

    pub fn parameters_mut(&mut self) -> Vec<(String, &mut Array2<f64>)> {
        let mut params = self.conv1.parameters_mut("conv1");
        params.extend(self.conv2.parameters_mut("conv2"));
        params.extend(self.conv3.parameters_mut("conv3"));
        params.extend(self.lstm.parameters_mut("lstm"));
        params.extend(self.bilstm.parameters_mut("bilstm"));
        params.extend(self.dense.parameters_mut("dense"));
        params.extend(self.output.parameters_mut("output"));
        params
    }

    pub fn num_parameters(&self) -> usize {
        self.conv1.num_parameters()
            + self.conv2.num_parameters()
            + self.conv3.num_parameters()
            + self.lstm.num_parameters()
            + self.bilstm.num_parameters()
            + self.dense.num_parameters()
            + self.output.num_parameters()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::loss::{LossFunction, MAELoss};
    use crate::optimizers::Adam;

    pub(crate) fn tiny_config() -> ModelConfig {
        ModelConfig {
            window_size: 6,
            num_features: 2,
            conv1_filters: 3,
            conv2_filters: 3,
            conv3_filters: 4,
            kernel_size: 2,
            pool_size: 2,
            padding: Padding::Causal,
            lstm_units: 4,
            lstm_layers: 2,
            dropout: 0.0,
            bilstm_units: 3,
            combine_mode: CombineMode::Concat,
            dense_units: 5,
            activation: Activation::Tanh,
        }
    }

    #[test]
    fn test_default_topology_shapes() {
        let config = ModelConfig::default();
        assert_eq!(config.conv_output_shape().unwrap(), (256, 15));

        let valid = ModelConfig { padding: Padding::Valid, ..ModelConfig::default() };
        // 30 -> 29 -> 28 -> 14 -> 13
        assert_eq!(valid.conv_output_shape().unwrap(), (256, 13));
    }

    #[test]
    fn test_window_too_short_is_rejected() {
        let config = ModelConfig { window_size: 2, padding: Padding::Valid, ..tiny_config() };
        assert!(matches!(ForecastModel::new(config), Err(ForecastError::InvalidConfig(_))));

        let config = ModelConfig { lstm_units: 0, ..tiny_config() };
        assert!(ForecastModel::new(config).is_err());
    }

    #[test]
    fn test_forward_backward_shapes() {
        let model = ForecastModel::new(tiny_config()).unwrap();
        let input = Array3::from_shape_fn((3, 6, 2), |(b, t, f)| (b + t + f) as f64 * 0.1);

        let (prediction, cache) = model.forward_with_cache(&input);
        assert_eq!(prediction.shape(), &[1, 3]);

        let gradients = model.backward(&Array2::ones((1, 3)), &cache);
        assert_eq!(gradients.conv1.weight.shape(), &[3, 4]);
        assert_eq!(gradients.lstm.len(), 2);
        assert_eq!(gradients.output.weight.shape(), &[1, 5]);
    }

    #[test]
    fn test_parameter_gradient_matches_finite_difference() {
        let model = ForecastModel::new(tiny_config()).unwrap();
        let input = Array3::from_shape_fn((2, 6, 2), |(b, t, f)| ((b * 7 + t * 3 + f) % 5) as f64 * 0.2 - 0.4);

        let (prediction, cache) = model.forward_with_cache(&input);
        let gradients = model.backward(&Array2::ones(prediction.raw_dim()), &cache);

        let eps = 1e-6;
        let analytic = gradients.conv1.weight[[1, 2]];
        let mut plus = model.clone();
        plus.conv1.weight[[1, 2]] += eps;
        let mut minus = model.clone();
        minus.conv1.weight[[1, 2]] -= eps;
        let numeric = (plus.forward(&input).sum() - minus.forward(&input).sum()) / (2.0 * eps);
        assert!((numeric - analytic).abs() < 1e-5, "numeric {} vs analytic {}", numeric, analytic);

        let analytic = gradients.lstm[0].w_ih[[3, 5]];
        let mut plus = model.clone();
        plus.lstm.parameters_mut("lstm")[0].1[[3, 5]] += eps;
        let mut minus = model.clone();
        minus.lstm.parameters_mut("lstm")[0].1[[3, 5]] -= eps;
        let numeric = (plus.forward(&input).sum() - minus.forward(&input).sum()) / (2.0 * eps);
        assert!((numeric - analytic).abs() < 1e-5, "numeric {} vs analytic {}", numeric, analytic);
    }

    #[test]
    fn test_training_step_reduces_loss() {
        let mut model = ForecastModel::new(tiny_config()).unwrap();
        let mut optimizer = Adam::new(0.01);
        let input = Array3::from_shape_fn((4, 6, 2), |(b, t, f)| (b as f64 + t as f64 * 0.1 + f as f64) * 0.1);
        let targets = Array2::from_shape_vec((1, 4), vec![0.1, 0.3, 0.5, 0.7]).unwrap();

        let initial = MAELoss.compute_loss(&model.forward(&input), &targets);
        for _ in 0..50 {
            let (prediction, cache) = model.forward_with_cache(&input);
            let grad = MAELoss.compute_gradient(&prediction, &targets);
            let gradients = model.backward(&grad, &cache);
            optimizer.step();
            model.update_parameters(&gradients, &mut optimizer);
        }
        let trained = MAELoss.compute_loss(&model.forward(&input), &targets);
        assert!(trained < initial, "loss went from {} to {}", initial, trained);
    }

    #[test]
    fn test_parameter_names_are_unique() {
        let model = ForecastModel::new(tiny_config()).unwrap();
        let names: std::collections::HashSet<String> = model.parameters().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names.len(), model.parameters().len());
        assert_eq!(
            model.num_parameters(),
            model.parameters().iter().map(|(_, p)| p.len()).sum::<usize>()
        );
    }
}
