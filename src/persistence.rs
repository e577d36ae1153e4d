use ndarray::{Array2, Dimension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

use crate::error::RnnError;
use crate::layers::recurrent::RecurrentCell;
use crate::models::sequence_model::SequenceModel;

/// Serializable version of Array2<f64> for persistence
#[derive(Serialize, Deserialize)]
struct SerializableArray2 {
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

impl SerializableArray2 {
    fn into_array(self) -> Result<Array2<f64>, PersistenceError> {
        let (rows, cols) = self.shape;
        let len = self.data.len();
        Array2::from_shape_vec(self.shape, self.data)
            .map_err(|_| PersistenceError::InvalidArray { rows, cols, len })
    }
}

/// `#[serde(with = "crate::persistence::array2")]` for `Array2<f64>` fields.
///
/// Stores a matrix as its row-major data plus shape, rejecting data whose
/// length does not match the shape on load.
pub mod array2 {
    use super::SerializableArray2;
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(array: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        SerializableArray2::from(array).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Array2<f64>, D::Error> {
        SerializableArray2::deserialize(deserializer)?.into_array().map_err(serde::de::Error::custom)
    }
}

/// Model metadata for tracking training information
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    /// `RecurrentCell::NAME` of the saved cells
    pub cell_type: String,
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub num_layers: usize,
    pub bidirectional: bool,
    pub total_epochs: usize,
    pub final_loss: Option<f64>,
    pub description: Option<String>,
}

/// Complete saved model including network and metadata
#[derive(Serialize, Deserialize)]
pub struct SavedModel<C> {
    pub model: SequenceModel<C>,
    pub metadata: ModelMetadata,
}

/// Errors that can occur during model persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("binary serialization error: {0}")]
    BinaryError(#[from] bincode::Error),

    #[error("matrix data of length {len} does not fit shape ({rows}, {cols})")]
    InvalidArray { rows: usize, cols: usize, len: usize },

    #[error("file holds a {found} model, expected {expected}")]
    CellTypeMismatch { expected: String, found: String },

    #[error("loaded model is inconsistent: {0}")]
    InvalidModel(#[from] RnnError),
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save model to JSON format (human-readable)
    pub fn save_to_json<C: Serialize, P: AsRef<Path>>(
        model: &SavedModel<C>,
        path: P,
    ) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(model)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load model from JSON format
    pub fn load_from_json<C: DeserializeOwned, P: AsRef<Path>>(
        path: P,
    ) -> Result<SavedModel<C>, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let model = serde_json::from_str(&contents)?;
        Ok(model)
    }

    /// Save model to binary format (compact and fast)
    pub fn save_to_binary<C: Serialize, P: AsRef<Path>>(
        model: &SavedModel<C>,
        path: P,
    ) -> Result<(), PersistenceError> {
        let encoded = bincode::serialize(model)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load model from binary format
    pub fn load_from_binary<C: DeserializeOwned, P: AsRef<Path>>(
        path: P,
    ) -> Result<SavedModel<C>, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let model = bincode::deserialize(&contents)?;
        Ok(model)
    }

    /// Metadata describing `model`, stamped with the crate version and current time
    pub fn create_metadata<C: RecurrentCell>(
        model: &SequenceModel<C>,
        model_name: String,
        total_epochs: usize,
        final_loss: Option<f64>,
        description: Option<String>,
    ) -> ModelMetadata {
        ModelMetadata {
            model_name,
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            cell_type: C::NAME.to_string(),
            input_size: model.network.input_size,
            hidden_size: model.network.hidden_size,
            output_size: model.head.output_size,
            num_layers: model.network.num_layers,
            bidirectional: model.network.bidirectional,
            total_epochs,
            final_loss,
            description,
        }
    }

    /// Create a model with metadata
    pub fn create_saved_model<C: RecurrentCell>(
        model: &SequenceModel<C>,
        model_name: String,
        total_epochs: usize,
        final_loss: Option<f64>,
        description: Option<String>,
    ) -> SavedModel<C> {
        let metadata = Self::create_metadata(model, model_name, total_epochs, final_loss, description);
        SavedModel { model: model.clone(), metadata }
    }
}

/// Convenience trait for easy model saving/loading
pub trait PersistentModel {
    /// Save model to file (format determined by file extension)
    fn save<P: AsRef<Path>>(
        &self,
        path: P,
        metadata: ModelMetadata,
    ) -> Result<(), PersistenceError>;

    /// Load model from file (format determined by file extension)
    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError>
    where
        Self: Sized;
}

fn is_json(path: &Path) -> bool {
    // Anything other than .json (including .bin and .model) is binary
    path.extension().and_then(|s| s.to_str()) == Some("json")
}

impl<C> PersistentModel for SequenceModel<C>
where
    C: RecurrentCell + Serialize + DeserializeOwned,
{
    fn save<P: AsRef<Path>>(
        &self,
        path: P,
        metadata: ModelMetadata,
    ) -> Result<(), PersistenceError> {
        let saved_model = SavedModel { model: self.clone(), metadata };

        if is_json(path.as_ref()) {
            ModelPersistence::save_to_json(&saved_model, path)
        } else {
            ModelPersistence::save_to_binary(&saved_model, path)
        }
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError> {
        let saved_model: SavedModel<C> = if is_json(path.as_ref()) {
            ModelPersistence::load_from_json(path)?
        } else {
            ModelPersistence::load_from_binary(path)?
        };

        if saved_model.metadata.cell_type != C::NAME {
            return Err(PersistenceError::CellTypeMismatch {
                expected: C::NAME.to_string(),
                found: saved_model.metadata.cell_type,
            });
        }
        saved_model.model.validate()?;

        log::info!(
            "Loaded {} model '{}' ({} parameters)",
            C::NAME,
            saved_model.metadata.model_name,
            saved_model.model.num_parameters()
        );
        Ok((saved_model.model, saved_model.metadata))
    }
}
