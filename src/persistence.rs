use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::warn;
use ndarray::{Array2, Dimension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::daily::MinMaxScaler;
use crate::models::forecast_model::{ForecastModel, ModelConfig};

/// Serializable version of Array2<f64> for persistence
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl TryFrom<SerializableArray2> for Array2<f64> {
    type Error = PersistenceError;

    fn try_from(array: SerializableArray2) -> Result<Self, Self::Error> {
        let (rows, cols) = array.shape;
        let len = array.data.len();
        Array2::from_shape_vec(array.shape, array.data)
            .map_err(|_| PersistenceError::Corrupt(format!("{} values cannot fill a {}x{} matrix", len, rows, cols)))
    }
}

/// One weight matrix, keyed by the layer-qualified name the model reports
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NamedParameter {
    pub name: String,
    pub value: SerializableArray2,
}

/// Model metadata for tracking training information
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    pub window_size: usize,
    pub num_features: usize,
    pub feature_names: Vec<String>,
    pub target: Option<String>,
    /// Needed to map predictions back to physical units
    pub scaler: Option<MinMaxScaler>,
    pub total_epochs: usize,
    pub final_loss: Option<f64>,
    pub description: Option<String>,
}

impl ModelMetadata {
    pub fn new(model_name: &str, config: &ModelConfig) -> Self {
        ModelMetadata {
            model_name: model_name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            window_size: config.window_size,
            num_features: config.num_features,
            feature_names: Vec::new(),
            target: None,
            scaler: None,
            total_epochs: 0,
            final_loss: None,
            description: None,
        }
    }
}

/// Complete saved model: topology, weights and metadata
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SavedModel {
    pub config: ModelConfig,
    pub parameters: Vec<NamedParameter>,
    pub metadata: ModelMetadata,
}

/// Errors that can occur during model persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Binary serialization error: {0}")]
    Binary(#[from] bincode::Error),
    #[error("Parameter '{0}' is missing from the saved model")]
    MissingParameter(String),
    #[error("Parameter '{name}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Saved model is corrupt: {0}")]
    Corrupt(String),
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save model to JSON format (human-readable)
    pub fn save_to_json<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(model)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load model from JSON format
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save model to binary format (compact and fast)
    pub fn save_to_binary<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<(), PersistenceError> {
        let encoded = bincode::serialize(model)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load model from binary format
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(bincode::deserialize(&contents)?)
    }

    fn is_json(path: &Path) -> bool {
        path.extension().and_then(|s| s.to_str()) == Some("json")
    }

    /// `.json` is written as JSON, anything else as bincode
    pub fn save<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<(), PersistenceError> {
        if Self::is_json(path.as_ref()) {
            Self::save_to_json(model, path)
        } else {
            Self::save_to_binary(model, path)
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        if Self::is_json(path.as_ref()) {
            Self::load_from_json(path)
        } else {
            Self::load_from_binary(path)
        }
    }

    /// Snapshot a model's weights together with its metadata
    pub fn create_saved_model(model: &ForecastModel, metadata: ModelMetadata) -> SavedModel {
        SavedModel {
            config: model.config.clone(),
            parameters: model
                .parameters()
                .into_iter()
                .map(|(name, value)| NamedParameter { name, value: value.into() })
                .collect(),
            metadata,
        }
    }

    /// Rebuilds the model described by `saved`, checking every weight's shape
    pub fn restore_model(saved: SavedModel) -> Result<(ForecastModel, ModelMetadata), PersistenceError> {
        let mut model = ForecastModel::new(saved.config).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
        let mut stored: HashMap<String, SerializableArray2> =
            saved.parameters.into_iter().map(|p| (p.name, p.value)).collect();

        for (name, param) in model.parameters_mut() {
            let value = stored.remove(&name).ok_or_else(|| PersistenceError::MissingParameter(name.clone()))?;
            let value = Array2::<f64>::try_from(value)?;
            if value.dim() != param.dim() {
                return Err(PersistenceError::ShapeMismatch { name, expected: param.dim(), found: value.dim() });
            }
            param.assign(&value);
        }

        if !stored.is_empty() {
            warn!("Ignoring {} unknown parameters in saved model", stored.len());
        }
        model.eval();
        Ok((model, saved.metadata))
    }
}

/// Convenience trait for easy model saving/loading
pub trait PersistentModel {
    /// Save model to file (format determined by file extension)
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata) -> Result<(), PersistenceError>;

    /// Load model from file (format determined by file extension)
    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError>
    where
        Self: Sized;
}

impl PersistentModel for ForecastModel {
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata) -> Result<(), PersistenceError> {
        ModelPersistence::save(&ModelPersistence::create_saved_model(self, metadata), path)
    }

    /// The loaded model is in evaluation mode
    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError> {
        ModelPersistence::restore_model(ModelPersistence::load(path)?)
    }
}
