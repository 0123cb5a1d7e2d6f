#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the graph operations.
///
/// Defines [`GraphOpsError`] for invalid shapes and neighbor counts.
pub mod error;

/// Edge feature construction over a k-nearest-neighbor graph.
pub mod graph;

/// K-nearest-neighbor search in feature space.
pub mod knn;

/// Conversion of host point clouds into batched tensors.
pub mod pointcloud;

/// Quaternion and rotation matrix operations on batched tensors.
pub mod rotation;

pub use error::GraphOpsError;
