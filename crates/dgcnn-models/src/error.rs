use std::path::PathBuf;

use dgcnn_ops::GraphOpsError;

/// Error type for the DGCNN models.
#[derive(thiserror::Error, Debug)]
pub enum DgcnnError {
    /// Error raised by a graph operation.
    #[error(transparent)]
    Ops(#[from] GraphOpsError),

    /// Error raised by the tensor backend.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The dataset identifier is not known.
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be parsed.
    #[error("Failed to parse the configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A checkpoint file does not exist.
    #[error("Weights not found: {0}")]
    WeightsNotFound(PathBuf),
}
