use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::preprocess::PreprocessConfig;
use crate::error::{ForecastError, Result};
use crate::models::forecast_model::ModelConfig;
use crate::training::TrainingConfig;

/// How the cleaned table is turned into training windows
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub datetime_column: String,
    /// `chrono` format string of the timestamp column
    pub datetime_format: String,
    pub target_column: String,
    /// Numeric columns fed to the model; all numeric columns when absent
    pub feature_columns: Option<Vec<String>>,
    pub window_size: usize,
    /// Index of the first test window
    pub split_index: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            datetime_column: "datetimeutc".to_string(),
            datetime_format: "%Y%m%d-%H:%M".to_string(),
            target_column: "tempm".to_string(),
            feature_columns: None,
            window_size: 30,
            split_index: 7300,
        }
    }
}

/// Settings for a whole preprocess + train run.
///
/// Every section is optional in the JSON file; missing fields keep their
/// defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

impl PipelineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ForecastError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ForecastError::ConfigParse { path: path.to_path_buf(), source })
    }
}
