use candle_core::{Tensor, D};
use candle_nn::{BatchNorm, Conv2d, Module, ModuleT, VarBuilder};
use dgcnn_ops::graph::get_graph_feature;

use crate::{error::DgcnnError, BN_EPS, NEGATIVE_SLOPE};

/// One edge convolution stage.
///
/// Builds the k-nearest-neighbor edge features of the input, applies a 1x1
/// convolution with batch normalization and leaky ReLU over every edge and
/// max-pools over the neighbors.
#[derive(Debug, Clone)]
pub struct EdgeConv {
    conv: Conv2d,
    bn: BatchNorm,
    k: usize,
    extended: bool,
}

impl EdgeConv {
    /// Create an edge convolution stage.
    ///
    /// # Arguments
    ///
    /// * `in_channels` - Channels per point of the input. The convolution reads
    ///   twice as many because every edge concatenates two features.
    /// * `out_channels` - Channels per point of the output.
    /// * `k` - Number of neighbors.
    /// * `extended` - Search neighbors on the channels from index 6 onward.
    /// * `vb_conv` - Weights of the convolution.
    /// * `vb_bn` - Weights of the batch normalization.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        k: usize,
        extended: bool,
        vb_conv: VarBuilder,
        vb_bn: VarBuilder,
    ) -> Result<Self, DgcnnError> {
        let conv = candle_nn::conv2d_no_bias(
            2 * in_channels,
            out_channels,
            1,
            Default::default(),
            vb_conv,
        )?;
        let bn = candle_nn::batch_norm(out_channels, BN_EPS, vb_bn)?;
        Ok(Self {
            conv,
            bn,
            k,
            extended,
        })
    }

    /// Number of neighbors of the graph.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Run the stage.
    ///
    /// # Arguments
    ///
    /// * `x` - Point features with shape `[B, C_in, N]`.
    /// * `idx` - Optional precomputed neighbor indices with shape `[B, N, k]`.
    /// * `train` - Use batch statistics in the batch normalization.
    ///
    /// # Returns
    ///
    /// The point features with shape `[B, C_out, N]`.
    pub fn forward_with_index(
        &self,
        x: &Tensor,
        idx: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor, DgcnnError> {
        // [B, C_in, N] -> [B, 2 * C_in, N, k]
        let edges = get_graph_feature(x, self.k, idx, self.extended)?;

        // [B, 2 * C_in, N, k] -> [B, C_out, N, k]
        let y = self.bn.forward_t(&self.conv.forward(&edges)?, train)?;
        let y = candle_nn::ops::leaky_relu(&y, NEGATIVE_SLOPE)?;

        // [B, C_out, N, k] -> [B, C_out, N]
        Ok(y.max(D::Minus1)?)
    }

    /// Run the stage, building the neighbor graph from the input.
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor, DgcnnError> {
        self.forward_with_index(x, None, train)
    }
}

impl ModuleT for EdgeConv {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        EdgeConv::forward_t(self, xs, train).map_err(candle_core::Error::wrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use dgcnn_ops::{knn::knn, GraphOpsError};

    fn edge_conv(
        in_channels: usize,
        out_channels: usize,
        k: usize,
        extended: bool,
    ) -> Result<EdgeConv, DgcnnError> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        EdgeConv::new(
            in_channels,
            out_channels,
            k,
            extended,
            vb.pp("conv1").pp("0"),
            vb.pp("bn1"),
        )
    }

    #[test]
    fn test_edge_conv_shape() -> Result<(), Box<dyn std::error::Error>> {
        let stage = edge_conv(3, 64, 10, false)?;
        let x = Tensor::randn(0f32, 1f32, (2, 3, 32), &Device::Cpu)?;
        let y = stage.forward_t(&x, false)?;
        assert_eq!(y.dims(), &[2, 64, 32]);
        Ok(())
    }

    #[test]
    fn test_edge_conv_precomputed_index() -> Result<(), Box<dyn std::error::Error>> {
        let stage = edge_conv(8, 16, 5, false)?;
        let x = Tensor::randn(0f32, 1f32, (1, 8, 20), &Device::Cpu)?;
        let idx = knn(&x, 5)?;
        let a = stage.forward_with_index(&x, Some(&idx), false)?;
        let b = stage.forward_t(&x, false)?;
        assert_eq!(
            a.flatten_all()?.to_vec1::<f32>()?,
            b.flatten_all()?.to_vec1::<f32>()?
        );
        Ok(())
    }

    #[test]
    fn test_edge_conv_extended() -> Result<(), Box<dyn std::error::Error>> {
        let stage = edge_conv(9, 64, 4, true)?;
        let x = Tensor::randn(0f32, 1f32, (2, 9, 16), &Device::Cpu)?;
        assert_eq!(stage.forward_t(&x, false)?.dims(), &[2, 64, 16]);
        Ok(())
    }

    #[test]
    fn test_edge_conv_too_few_points() -> Result<(), Box<dyn std::error::Error>> {
        let stage = edge_conv(3, 64, 20, false)?;
        let x = Tensor::randn(0f32, 1f32, (1, 3, 8), &Device::Cpu)?;
        assert!(matches!(
            stage.forward_t(&x, false),
            Err(DgcnnError::Ops(GraphOpsError::InvalidNeighborCount(20, 8)))
        ));
        Ok(())
    }
}
