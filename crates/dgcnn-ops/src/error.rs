use thiserror::Error;

/// An error type for the graph operations.
#[derive(Error, Debug)]
pub enum GraphOpsError {
    /// Error raised by the tensor backend.
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    /// The number of neighbors is zero or exceeds the number of points.
    #[error("Invalid neighbor count. k = {0} must be in [1, {1}].")]
    InvalidNeighborCount(usize, usize),

    /// The tensor does not have the expected layout.
    #[error("Invalid shape. Expected {0}, got {1:?}.")]
    InvalidShape(&'static str, Vec<usize>),

    /// A neighbor index is outside the points of its batch element.
    #[error("Invalid neighbor index. {0} is not in [0, {1}).")]
    InvalidNeighborIndex(i64, usize),

    /// The tensor has fewer channels than the operation requires.
    #[error("Not enough channels. At least {0} required, got {1}.")]
    NotEnoughChannels(usize, usize),

    /// The point clouds of a batch have different sizes.
    #[error("Ragged batch. Expected {0} points per cloud, got {1}.")]
    RaggedBatch(usize, usize),

    /// The batch contains no point clouds or no points.
    #[error("Empty batch.")]
    EmptyBatch,
}
