use candle_core::{Tensor, D};
use candle_nn::{BatchNorm, Conv1d, Linear, Module, ModuleT, VarBuilder};
use dgcnn_ops::rotation::{normalize_quaternion, quaternion_to_rotation_matrix};

use crate::{attention::PointAttention, error::DgcnnError, BN_EPS, NEGATIVE_SLOPE};

/// Rotation alignment network.
///
/// Predicts a unit quaternion per point cloud and converts it to a rotation
/// matrix that brings the cloud to a learned canonical pose.
///
/// Layout: conv 3 -> 64 -> 128, point attention, conv 128 -> 1024, max pooling
/// over the points, then linear 1024 -> 512 -> 256 -> 4.
#[derive(Debug, Clone)]
pub struct RotationStn {
    conv1: Conv1d,
    conv2: Conv1d,
    conv3: Conv1d,
    fc1: Linear,
    fc2: Linear,
    fc3: Linear,
    bn1: BatchNorm,
    bn2: BatchNorm,
    bn3: BatchNorm,
    bn4: BatchNorm,
    bn5: BatchNorm,
    attention_point: PointAttention,
}

impl RotationStn {
    /// Create the network with the weights under `vb`.
    pub fn new(vb: VarBuilder) -> Result<Self, DgcnnError> {
        let conv = |i: usize, o: usize, name: &str| {
            candle_nn::conv1d(i, o, 1, Default::default(), vb.pp(name))
        };
        let bn = |n: usize, name: &str| candle_nn::batch_norm(n, BN_EPS, vb.pp(name));

        Ok(Self {
            conv1: conv(3, 64, "conv1")?,
            conv2: conv(64, 128, "conv2")?,
            conv3: conv(128, 1024, "conv3")?,
            fc1: candle_nn::linear(1024, 512, vb.pp("fc1"))?,
            fc2: candle_nn::linear(512, 256, vb.pp("fc2"))?,
            fc3: candle_nn::linear(256, 4, vb.pp("fc3"))?,
            bn1: bn(64, "bn1")?,
            bn2: bn(128, "bn2")?,
            bn3: bn(1024, "bn3")?,
            bn4: bn(512, "bn4")?,
            bn5: bn(256, "bn5")?,
            attention_point: PointAttention::new(128, vb.pp("attention_point"))?,
        })
    }

    /// Predict the unit quaternions `(w, x, y, z)`.
    ///
    /// # Arguments
    ///
    /// * `x` - Point clouds with shape `[B, 3, N]`.
    /// * `train` - Use batch statistics in the batch normalization layers.
    ///
    /// # Returns
    ///
    /// The unit quaternions with shape `[B, 4]`.
    pub fn quaternion_t(&self, x: &Tensor, train: bool) -> Result<Tensor, DgcnnError> {
        let block = |x: &Tensor, conv: &Conv1d, bn: &BatchNorm| {
            let x = bn.forward_t(&conv.forward(x)?, train)?;
            candle_nn::ops::leaky_relu(&x, NEGATIVE_SLOPE)
        };

        let x = block(x, &self.conv1, &self.bn1)?;
        let x = block(&x, &self.conv2, &self.bn2)?;
        let x = self.attention_point.forward(&x)?;
        let x = block(&x, &self.conv3, &self.bn3)?;

        // [B, 1024, N] -> [B, 1024]
        let x = x.max(D::Minus1)?;

        let x = block_linear(&x, &self.fc1, &self.bn4, train)?;
        let x = block_linear(&x, &self.fc2, &self.bn5, train)?;
        let x = self.fc3.forward(&x)?;

        Ok(normalize_quaternion(&x)?)
    }

    /// Predict the rotation matrices.
    ///
    /// # Arguments
    ///
    /// * `x` - Point clouds with shape `[B, 3, N]`.
    /// * `train` - Use batch statistics in the batch normalization layers.
    ///
    /// # Returns
    ///
    /// The rotation matrices with shape `[B, 3, 3]`.
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor, DgcnnError> {
        let quat = self.quaternion_t(x, train)?;
        Ok(quaternion_to_rotation_matrix(&quat)?)
    }
}

impl ModuleT for RotationStn {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        RotationStn::forward_t(self, xs, train).map_err(candle_core::Error::wrap)
    }
}

fn block_linear(
    x: &Tensor,
    linear: &Linear,
    bn: &BatchNorm,
    train: bool,
) -> candle_core::Result<Tensor> {
    let x = bn.forward_t(&linear.forward(x)?, train)?;
    candle_nn::ops::leaky_relu(&x, NEGATIVE_SLOPE)
}
