#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # DGCNN classification
//!
//! A dynamic graph CNN that classifies point clouds. Four edge convolution
//! stages rebuild a k-nearest-neighbor graph on the output of the previous
//! stage, their features are concatenated, embedded and pooled globally, and a
//! fully-connected head produces the class logits. An optional rotation
//! alignment network predicts a quaternion per cloud and rotates the input to a
//! learned canonical pose first.
//!
//! ## Example
//!
//! ```no_run
//! use candle_core::{DType, Device, Tensor};
//! use candle_nn::{VarBuilder, VarMap};
//! use dgcnn_models::{DgcnnCls, DgcnnConfig};
//!
//! let device = Device::Cpu;
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
//!
//! let model = DgcnnCls::new(DgcnnConfig::default(), vb).unwrap();
//! let points = Tensor::randn(0f32, 1f32, (2, 3, 1024), &device).unwrap();
//! let logits = model.forward_t(&points, false).unwrap();
//! assert_eq!(logits.dims(), &[2, 40]);
//! ```

/// Softmax point attention.
pub mod attention;

/// Model configuration and dataset identifiers.
pub mod config;

/// The DGCNN classification network.
pub mod dgcnn;

/// Edge convolution stage.
pub mod edge_conv;

/// Error types for the models.
pub mod error;

/// Rotation alignment sub-network.
pub mod stn;

/// Loading model weights from checkpoints.
pub mod weights;

pub use config::{Dataset, DgcnnConfig};
pub use dgcnn::DgcnnCls;
pub use error::DgcnnError;

/// Negative slope of every leaky ReLU in the models.
pub(crate) const NEGATIVE_SLOPE: f64 = 0.2;

/// Epsilon of every batch normalization layer.
pub(crate) const BN_EPS: f64 = 1e-5;
