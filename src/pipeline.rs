//! The two end-to-end stages: cleaning a raw export and training on it.

use std::path::Path;

use log::{debug, info};

use crate::config::PipelineConfig;
use crate::data::daily::{daily_means, MinMaxScaler};
use crate::data::preprocess::{preprocess_table, PreprocessConfig};
use crate::data::table::Table;
use crate::data::windowing::sliding_windows;
use crate::error::Result;
use crate::models::forecast_model::{ForecastModel, ModelConfig};
use crate::persistence::ModelMetadata;
use crate::plot::plot_training_loss;
use crate::training::{create_trainer, TrainingMetrics};

/// Reads the raw CSV, cleans it and writes the processed CSV
pub fn run_preprocess<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q, config: &PreprocessConfig) -> Result<Table> {
    let raw = Table::read_csv(&input)?;
    info!(
        "Loaded {} rows and {} columns from {}",
        raw.num_rows(),
        raw.num_columns(),
        input.as_ref().display()
    );

    let cleaned = preprocess_table(raw, config);
    cleaned.write_csv(&output)?;
    info!("Wrote processed data to {}", output.as_ref().display());
    Ok(cleaned)
}

/// Outcome of a training run
#[derive(Debug)]
pub struct TrainingReport {
    pub history: Vec<TrainingMetrics>,
    /// Loss on the held-out windows, `None` when the split left none
    pub test_loss: Option<f64>,
    pub train_windows: usize,
    pub test_windows: usize,
    pub feature_names: Vec<String>,
    pub scaler: MinMaxScaler,
    /// Best weights, in evaluation mode
    pub model: ForecastModel,
}

/// Trains the forecaster on a processed CSV.
///
/// `checkpoint` and `plot` override the configured checkpoint path and
/// request a loss-curve SVG.
pub fn run_training<P: AsRef<Path>>(
    input: P,
    config: &PipelineConfig,
    checkpoint: Option<&Path>,
    plot: Option<&Path>,
) -> Result<TrainingReport> {
    let table = Table::read_csv(&input)?;
    let dataset = &config.dataset;

    let series = daily_means(&table, dataset)?;
    let target = series.feature_index(&dataset.target_column)?;
    let (scaler, scaled) = MinMaxScaler::fit_transform(&series.values);

    let windows = sliding_windows(scaled.view(), target, dataset.window_size)?;
    let (train, test) = windows.split_at(dataset.split_index)?;
    info!("{} training windows, {} test windows", train.len(), test.len());

    let model_config = ModelConfig {
        window_size: dataset.window_size,
        num_features: series.feature_names.len(),
        ..config.model.clone()
    };
    let model = ForecastModel::new(model_config)?;
    debug!("Model has {} parameters", model.num_parameters());

    let mut metadata = ModelMetadata::new("weather-lstm", &model.config);
    metadata.feature_names = series.feature_names.clone();
    metadata.target = Some(dataset.target_column.clone());
    metadata.scaler = Some(scaler.clone());

    let mut training = config.training.clone();
    if let Some(path) = checkpoint {
        training.checkpoint_path = Some(path.to_path_buf());
    }

    let mut trainer = create_trainer(model, training).with_checkpoint_metadata(metadata);
    trainer.train(&train, None)?;

    let test_loss = (!test.is_empty()).then(|| trainer.evaluate(&test));
    if let Some(loss) = test_loss {
        info!("Test loss: {:.6}", loss);
    }

    if let Some(path) = plot {
        plot_training_loss(trainer.get_metrics_history(), path)?;
    }

    Ok(TrainingReport {
        history: trainer.metrics_history,
        test_loss,
        train_windows: train.len(),
        test_windows: test.len(),
        feature_names: series.feature_names,
        scaler,
        model: trainer.model,
    })
}
