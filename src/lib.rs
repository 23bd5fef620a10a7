//! # weather-lstm
//!
//! Cleans hourly weather observations and trains a next-day temperature
//! forecaster on daily averages.
//!
//! ## Core Components
//!
//! - **Data**: CSV table, cleaning chain, daily aggregation, min-max scaling and sliding windows
//! - **Layers**: LSTM cell, bidirectional LSTM, Conv1D, max pooling, dropout and dense layers with full backpropagation
//! - **Model**: Conv1D stack -> stacked LSTMs -> BiLSTM -> dense regressor
//! - **Training**: mini-batch Adam training with early stopping and best-loss checkpoints
//! - **Persistence**: JSON or binary checkpoints with metadata
//!
//! ## Quick Start
//!
//! ```no_run
//! use weather_lstm::config::PipelineConfig;
//! use weather_lstm::pipeline::{run_preprocess, run_training};
//!
//! let config = PipelineConfig::default();
//! run_preprocess("data/testset.csv", "data/processed.csv", &config.preprocess)?;
//! let report = run_training("data/processed.csv", &config, None, Some("loss.svg".as_ref()))?;
//! println!("test loss: {:?}", report.test_loss);
//! # Ok::<(), weather_lstm::ForecastError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod models;
pub mod optimizers;
pub mod persistence;
pub mod pipeline;
pub mod plot;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use config::{DatasetConfig, PipelineConfig};
pub use data::preprocess::PreprocessConfig;
pub use data::table::Table;
pub use data::windowing::WindowedDataset;
pub use error::{ForecastError, Result};
pub use loss::{LossKind, MAELoss, MSELoss};
pub use models::forecast_model::{ForecastModel, ModelConfig};
pub use optimizers::Adam;
pub use persistence::{ModelMetadata, ModelPersistence, PersistenceError, PersistentModel};
pub use training::{
    EarlyStopper, EarlyStoppingConfig, EarlyStoppingMetric, ForecastTrainer, TrainingConfig, TrainingMetrics,
};
