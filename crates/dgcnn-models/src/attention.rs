use candle_core::{Result, Tensor, D};
use candle_nn::{Conv1d, Module, VarBuilder};

use crate::NEGATIVE_SLOPE;

/// Softmax point attention.
///
/// A 1x1 convolution collapses the channels of every point to a single score,
/// the scores are normalized with a softmax over the points and the resulting
/// gate is added back to every channel of the input.
#[derive(Debug, Clone)]
pub struct PointAttention {
    conv: Conv1d,
}

impl PointAttention {
    /// Create the attention module for features with `input_channels` channels.
    ///
    /// The weight is read from `conv1.0.weight` under `vb`.
    pub fn new(input_channels: usize, vb: VarBuilder) -> Result<Self> {
        let conv = candle_nn::conv1d_no_bias(
            input_channels,
            1,
            1,
            Default::default(),
            vb.pp("conv1").pp("0"),
        )?;
        Ok(Self { conv })
    }

    /// Compute the attention gate.
    ///
    /// # Arguments
    ///
    /// * `x` - Point features with shape `[B, C, N]`.
    ///
    /// # Returns
    ///
    /// The gate with shape `[B, 1, N]`, summing to one over the points.
    pub fn gate(&self, x: &Tensor) -> Result<Tensor> {
        let scores = self.conv.forward(x)?;
        let scores = candle_nn::ops::leaky_relu(&scores, NEGATIVE_SLOPE)?;
        candle_nn::ops::softmax(&scores, D::Minus1)
    }
}

impl Module for PointAttention {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.broadcast_add(&self.gate(x)?)
    }
}
