use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::DgcnnError;

/// The dataset a model is configured for. It selects the number of classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Dataset {
    /// ScanObjectNN, 15 classes.
    ScanObjectNN,
    /// ModelNet40, 40 classes.
    ModelNet40,
    /// Any other identifier. Falls back to 10 classes.
    Other(String),
}

impl Dataset {
    /// Parse a dataset identifier.
    ///
    /// Unrecognized identifiers map to [`Dataset::Other`], which has 10 classes.
    ///
    /// # Example
    ///
    /// ```
    /// use dgcnn_models::Dataset;
    ///
    /// assert_eq!(Dataset::from_name("modelnet40").num_classes(), 40);
    /// assert_eq!(Dataset::from_name("scanobject").num_classes(), 15);
    /// assert_eq!(Dataset::from_name("modelnet10").num_classes(), 10);
    /// ```
    pub fn from_name(name: &str) -> Self {
        match name {
            "scanobject" => Self::ScanObjectNN,
            "modelnet40" => Self::ModelNet40,
            other => Self::Other(other.to_string()),
        }
    }

    /// Parse a dataset identifier, failing on unrecognized identifiers.
    pub fn from_name_strict(name: &str) -> Result<Self, DgcnnError> {
        match Self::from_name(name) {
            Self::Other(name) => Err(DgcnnError::UnknownDataset(name)),
            dataset => Ok(dataset),
        }
    }

    /// The identifier of the dataset.
    pub fn name(&self) -> &str {
        match self {
            Self::ScanObjectNN => "scanobject",
            Self::ModelNet40 => "modelnet40",
            Self::Other(name) => name,
        }
    }

    /// The number of output classes.
    pub fn num_classes(&self) -> usize {
        match self {
            Self::ScanObjectNN => 15,
            Self::ModelNet40 => 40,
            Self::Other(_) => 10,
        }
    }
}

impl From<String> for Dataset {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<Dataset> for String {
    fn from(dataset: Dataset) -> Self {
        dataset.name().to_string()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration of the DGCNN classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DgcnnConfig {
    /// The dataset, which selects the number of classes.
    pub dataset: Dataset,

    /// Number of neighbors of the k-nearest-neighbor graph.
    pub k: usize,

    /// Channel width of the per-point embedding before global pooling.
    pub emb_dims: usize,

    /// Dropout probability of the classification head.
    pub dropout: f64,

    /// Predict and apply a rotation to the input before feature extraction.
    #[serde(alias = "fa")]
    pub rotation_alignment: bool,

    /// Number of channels per input point. From 9 channels on, the first graph is
    /// built on the channels from index 6 onward.
    pub input_channels: usize,
}

impl Default for DgcnnConfig {
    fn default() -> Self {
        Self {
            dataset: Dataset::ModelNet40,
            k: 20,
            emb_dims: 1024,
            dropout: 0.5,
            rotation_alignment: false,
            input_channels: 3,
        }
    }
}

impl DgcnnConfig {
    /// Parse a configuration from a JSON string. Missing fields take their default.
    pub fn from_json_str(json: &str) -> Result<Self, DgcnnError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DgcnnError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// The number of output classes.
    pub fn num_classes(&self) -> usize {
        self.dataset.num_classes()
    }

    /// Whether the first graph is built on the trailing channels only.
    pub fn extended_features(&self) -> bool {
        self.input_channels >= dgcnn_ops::graph::EXTENDED_MIN_CHANNELS
    }

    /// Check if the configuration is valid
    pub fn validate(&self) -> Result<(), DgcnnError> {
        if self.k == 0 {
            return Err(DgcnnError::Configuration(
                "Number of neighbors must be greater than zero".to_string(),
            ));
        }

        if self.emb_dims == 0 {
            return Err(DgcnnError::Configuration(
                "Embedding dimension must be greater than zero".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(DgcnnError::Configuration(format!(
                "Dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        if self.input_channels < 3 {
            return Err(DgcnnError::Configuration(format!(
                "Input must have at least 3 channels, got {}",
                self.input_channels
            )));
        }

        if self.rotation_alignment && self.input_channels != 3 {
            return Err(DgcnnError::Configuration(
                "Rotation alignment requires xyz input with 3 channels".to_string(),
            ));
        }

        Ok(())
    }
}
