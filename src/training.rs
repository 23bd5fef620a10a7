use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info, warn};
use ndarray::{Array1, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::data::windowing::WindowedDataset;
use crate::error::{ForecastError, Result};
use crate::loss::{LossFunction, LossKind, MAELoss};
use crate::models::forecast_model::ForecastModel;
use crate::optimizers::{Adam, Optimizer};
use crate::persistence::{ModelMetadata, PersistentModel};

/// Which loss early stopping watches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarlyStoppingMetric {
    TrainLoss,
    /// Falls back to the training loss when no validation set is given
    ValidationLoss,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStoppingConfig {
    /// Epochs without improvement before stopping
    pub patience: usize,
    /// Smallest decrease counted as an improvement
    pub min_delta: f64,
    pub restore_best_weights: bool,
    pub monitor: EarlyStoppingMetric,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        EarlyStoppingConfig {
            patience: 5,
            min_delta: 0.0,
            restore_best_weights: true,
            monitor: EarlyStoppingMetric::TrainLoss,
        }
    }
}

/// Configuration for training hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Reshuffle the training windows every epoch
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub print_every: usize,
    pub clip_gradient: Option<f64>,
    pub learning_rate: f64,
    pub loss: LossKind,
    pub early_stopping: Option<EarlyStoppingConfig>,
    /// Written whenever the training loss reaches a new best
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 200,
            batch_size: 32,
            shuffle: true,
            seed: None,
            print_every: 1,
            clip_gradient: None,
            learning_rate: 1e-4,
            loss: LossKind::Mae,
            early_stopping: Some(EarlyStoppingConfig::default()),
            checkpoint_path: Some(PathBuf::from("saved_model/model_v1.bin")),
        }
    }
}

/// Training metrics tracked during training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
    pub time_elapsed: f64,
}

/// Tracks the monitored loss and decides when training should end
pub struct EarlyStopper {
    config: EarlyStoppingConfig,
    best_score: f64,
    wait: usize,
    stopped_epoch: Option<usize>,
    best_weights: Option<Vec<Array2<f64>>>,
}

impl EarlyStopper {
    pub fn new(config: EarlyStoppingConfig) -> Self {
        EarlyStopper {
            config,
            best_score: f64::INFINITY,
            wait: 0,
            stopped_epoch: None,
            best_weights: None,
        }
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    fn monitored(&self, metrics: &TrainingMetrics) -> f64 {
        match self.config.monitor {
            EarlyStoppingMetric::TrainLoss => metrics.train_loss,
            EarlyStoppingMetric::ValidationLoss => metrics.validation_loss.unwrap_or(metrics.train_loss),
        }
    }

    /// Returns `(should_stop, is_best)` for this epoch
    pub fn should_stop(&mut self, metrics: &TrainingMetrics, model: &ForecastModel) -> (bool, bool) {
        let score = self.monitored(metrics);

        if score < self.best_score - self.config.min_delta {
            self.best_score = score;
            self.wait = 0;
            if self.config.restore_best_weights {
                self.best_weights = Some(model.parameters().into_iter().map(|(_, p)| p.clone()).collect());
            }
            return (false, true);
        }

        self.wait += 1;
        if self.wait >= self.config.patience {
            self.stopped_epoch = Some(metrics.epoch);
            return (true, false);
        }
        (false, false)
    }

    /// Copies the best snapshot back into the model, if one was kept
    pub fn restore_best_weights(&self, model: &mut ForecastModel) -> bool {
        let Some(best) = &self.best_weights else {
            return false;
        };
        for ((_, param), saved) in model.parameters_mut().into_iter().zip(best) {
            param.assign(saved);
        }
        true
    }
}

/// Mini-batch trainer for [`ForecastModel`] with configurable loss and optimizer
pub struct ForecastTrainer<L: LossFunction, O: Optimizer> {
    pub model: ForecastModel,
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
    /// Template for checkpoint metadata; epochs and loss are filled in on save
    pub checkpoint_metadata: Option<ModelMetadata>,
    rng: StdRng,
}

impl<L: LossFunction, O: Optimizer> ForecastTrainer<L, O> {
    pub fn new(model: ForecastModel, loss_function: L, optimizer: O) -> Self {
        ForecastTrainer {
            model,
            loss_function,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
            checkpoint_metadata: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        if let Some(seed) = config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.config = config;
        self
    }

    pub fn with_checkpoint_metadata(mut self, metadata: ModelMetadata) -> Self {
        self.checkpoint_metadata = Some(metadata);
        self
    }

    fn targets(labels: &Array1<f64>) -> Array2<f64> {
        labels.clone().insert_axis(Axis(0))
    }

    /// One optimizer step on a batch of windows; returns the batch loss
    pub fn train_batch(&mut self, batch: &WindowedDataset) -> f64 {
        let targets = Self::targets(&batch.labels);
        let (predictions, cache) = self.model.forward_with_cache(&batch.inputs);

        let loss = self.loss_function.compute_loss(&predictions, &targets);
        let grad = self.loss_function.compute_gradient(&predictions, &targets);
        let mut gradients = self.model.backward(&grad, &cache);

        if let Some(max_norm) = self.config.clip_gradient {
            for matrix in gradients.matrices_mut() {
                clip_gradient_matrix(matrix, max_norm);
            }
        }

        self.optimizer.step();
        self.model.update_parameters(&gradients, &mut self.optimizer);
        loss
    }

    /// Train for up to `config.epochs` epochs with optional validation.
    ///
    /// Leaves the model in evaluation mode.
    pub fn train(&mut self, train_data: &WindowedDataset, validation_data: Option<&WindowedDataset>) -> Result<()> {
        if train_data.is_empty() {
            return Err(ForecastError::EmptyDataset("no training windows".to_string()));
        }
        let validation_data = validation_data.filter(|v| !v.is_empty());
        let mut stopper = self.config.early_stopping.clone().map(EarlyStopper::new);
        let mut best_checkpoint_loss = f64::INFINITY;

        info!(
            "Starting training for up to {} epochs on {} windows ({} parameters)",
            self.config.epochs,
            train_data.len(),
            self.model.num_parameters()
        );

        for epoch in 0..self.config.epochs {
            let start_time = Instant::now();
            self.model.train();

            let rng = if self.config.shuffle { Some(&mut self.rng) } else { None };
            let batches = train_data.batches(self.config.batch_size, rng);
            let mut epoch_loss = 0.0;
            for batch in &batches {
                epoch_loss += self.train_batch(batch) * batch.len() as f64;
            }
            epoch_loss /= train_data.len() as f64;

            let validation_loss = validation_data.map(|data| self.evaluate(data));
            let time_elapsed = start_time.elapsed().as_secs_f64();

            let metrics = TrainingMetrics {
                epoch,
                train_loss: epoch_loss,
                validation_loss,
                time_elapsed,
            };
            self.metrics_history.push(metrics.clone());

            if epoch % self.config.print_every.max(1) == 0 {
                match validation_loss {
                    Some(val_loss) => info!(
                        "Epoch {}: Train Loss: {:.6}, Val Loss: {:.6}, Time: {:.2}s",
                        epoch + 1,
                        epoch_loss,
                        val_loss,
                        time_elapsed
                    ),
                    None => info!("Epoch {}: Train Loss: {:.6}, Time: {:.2}s", epoch + 1, epoch_loss, time_elapsed),
                }
            }

            if epoch_loss < best_checkpoint_loss {
                best_checkpoint_loss = epoch_loss;
                self.save_checkpoint(epoch + 1, epoch_loss)?;
            }

            if let Some(stopper) = stopper.as_mut() {
                let (should_stop, _) = stopper.should_stop(&metrics, &self.model);
                if should_stop {
                    info!("Early stopping at epoch {} (best loss {:.6})", epoch + 1, stopper.best_score());
                    break;
                }
            }
        }

        if let Some(stopper) = &stopper {
            if stopper.restore_best_weights(&mut self.model) {
                debug!("Restored weights with loss {:.6}", stopper.best_score());
            }
        }
        self.model.eval();
        info!("Training completed after {} epochs", self.metrics_history.len());
        Ok(())
    }

    fn save_checkpoint(&self, epochs: usize, loss: f64) -> Result<()> {
        let Some(path) = &self.config.checkpoint_path else {
            return Ok(());
        };
        let mut metadata = self
            .checkpoint_metadata
            .clone()
            .unwrap_or_else(|| ModelMetadata::new("weather-lstm", &self.model.config));
        metadata.total_epochs = epochs;
        metadata.final_loss = Some(loss);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ForecastError::Io { path: parent.to_path_buf(), source })?;
        }
        self.model.save(path, metadata)?;
        debug!("Saved checkpoint to {} (loss {:.6})", path.display(), loss);
        Ok(())
    }

    /// Mean loss over `data`, evaluated batch by batch in evaluation mode
    pub fn evaluate(&mut self, data: &WindowedDataset) -> f64 {
        if data.is_empty() {
            warn!("Evaluating on an empty dataset");
            return 0.0;
        }
        self.model.eval();

        let mut total_loss = 0.0;
        for batch in data.batches::<StdRng>(self.config.batch_size, None) {
            let predictions = self.model.forward(&batch.inputs);
            let loss = self.loss_function.compute_loss(&predictions, &Self::targets(&batch.labels));
            total_loss += loss * batch.len() as f64;
        }
        total_loss / data.len() as f64
    }

    /// Generate one prediction per window
    pub fn predict(&self, inputs: &Array3<f64>) -> Array1<f64> {
        self.model.predict(inputs)
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

/// Rescales a gradient matrix whose L2 norm exceeds `max_norm`
fn clip_gradient_matrix(matrix: &mut Array2<f64>, max_norm: f64) {
    let norm = matrix.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        matrix.mapv_inplace(|x| x * scale);
    }
}

/// Trainer using the configured loss and Adam
pub fn create_trainer(model: ForecastModel, config: TrainingConfig) -> ForecastTrainer<LossKind, Adam> {
    let optimizer = Adam::new(config.learning_rate);
    ForecastTrainer::new(model, config.loss, optimizer).with_config(config)
}

/// MAE loss with Adam, as used for the temperature model
pub fn create_forecast_trainer(model: ForecastModel, learning_rate: f64) -> ForecastTrainer<MAELoss, Adam> {
    ForecastTrainer::new(model, MAELoss, Adam::new(learning_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::forecast_model::tests::tiny_config;
    use ndarray::arr2;

    fn metrics(epoch: usize, train_loss: f64, validation_loss: Option<f64>) -> TrainingMetrics {
        TrainingMetrics { epoch, train_loss, validation_loss, time_elapsed: 0.0 }
    }

    #[test]
    fn test_clip_gradient_matrix() {
        let mut matrix = arr2(&[[3.0, 4.0]]);
        clip_gradient_matrix(&mut matrix, 1.0);
        assert!((matrix[[0, 0]] - 0.6).abs() < 1e-12);
        assert!((matrix[[0, 1]] - 0.8).abs() < 1e-12);

        let mut small = arr2(&[[0.1]]);
        clip_gradient_matrix(&mut small, 1.0);
        assert_eq!(small, arr2(&[[0.1]]));
    }

    #[test]
    fn test_stopper_patience_and_min_delta() {
        let model = ForecastModel::new(tiny_config()).unwrap();
        let mut stopper = EarlyStopper::new(EarlyStoppingConfig {
            patience: 2,
            min_delta: 0.1,
            restore_best_weights: false,
            monitor: EarlyStoppingMetric::ValidationLoss,
        });
        assert_eq!(stopper.best_score(), f64::INFINITY);

        assert_eq!(stopper.should_stop(&metrics(0, 1.0, Some(1.0)), &model), (false, true));
        assert_eq!(stopper.should_stop(&metrics(1, 0.5, Some(0.95)), &model), (false, false));
        assert_eq!(stopper.should_stop(&metrics(2, 0.4, Some(0.9)), &model), (true, false));
        assert_eq!(stopper.stopped_epoch(), Some(2));
        assert_eq!(stopper.best_score(), 1.0);
    }

    #[test]
    fn test_stopper_falls_back_to_train_loss() {
        let model = ForecastModel::new(tiny_config()).unwrap();
        let mut stopper = EarlyStopper::new(EarlyStoppingConfig {
            monitor: EarlyStoppingMetric::ValidationLoss,
            ..EarlyStoppingConfig::default()
        });
        stopper.should_stop(&metrics(0, 0.7, None), &model);
        assert_eq!(stopper.best_score(), 0.7);
    }

    #[test]
    fn test_stopper_restores_best_weights() {
        let mut model = ForecastModel::new(tiny_config()).unwrap();
        let mut stopper = EarlyStopper::new(EarlyStoppingConfig::default());
        let snapshot: Vec<Array2<f64>> = model.parameters().into_iter().map(|(_, p)| p.clone()).collect();

        stopper.should_stop(&metrics(0, 0.5, None), &model);
        for (_, param) in model.parameters_mut() {
            param.fill(0.0);
        }
        stopper.should_stop(&metrics(1, 0.9, None), &model);

        assert!(stopper.restore_best_weights(&mut model));
        for ((_, restored), saved) in model.parameters().into_iter().zip(&snapshot) {
            assert_eq!(restored, saved);
        }
    }
}
