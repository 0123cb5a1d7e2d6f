use candle_core::{Tensor, D};
use candle_nn::{BatchNorm, Conv1d, Dropout, Linear, Module, ModuleT, VarBuilder};
use dgcnn_ops::{rotation::apply_rotation, GraphOpsError};
use log::{debug, warn};

use crate::{
    config::{Dataset, DgcnnConfig},
    edge_conv::EdgeConv,
    error::DgcnnError,
    stn::RotationStn,
    BN_EPS, NEGATIVE_SLOPE,
};

/// Output channels of the four edge convolution stages.
const STAGE_CHANNELS: [usize; 4] = [64, 64, 128, 256];

/// DGCNN point cloud classifier with point attention and rotation alignment.
///
/// # Architecture
///
/// - **Rotation alignment** (optional): [`RotationStn`] predicts a rotation per
///   cloud that is applied to the input.
/// - **Edge convolutions**: four [`EdgeConv`] stages with widths 64, 64, 128
///   and 256, each building its graph on the previous output.
/// - **Embedding**: the stage outputs are concatenated (512 channels) and
///   projected to `emb_dims` channels.
/// - **Pooling**: global max and average pooling over the points.
/// - **Head**: linear `2 * emb_dims -> 512 -> 256 -> num_classes` with batch
///   normalization, leaky ReLU and dropout.
#[derive(Debug, Clone)]
pub struct DgcnnCls {
    config: DgcnnConfig,
    stn: Option<RotationStn>,
    stages: [EdgeConv; 4],
    conv5: Conv1d,
    bn5: BatchNorm,
    linear1: Linear,
    bn6: BatchNorm,
    dp1: Dropout,
    linear2: Linear,
    bn7: BatchNorm,
    dp2: Dropout,
    linear3: Linear,
}

impl DgcnnCls {
    /// Create the classifier with the weights under `vb`.
    ///
    /// # Arguments
    ///
    /// * `config` - The model configuration.
    /// * `vb` - The variable builder holding or creating the weights.
    pub fn new(config: DgcnnConfig, vb: VarBuilder) -> Result<Self, DgcnnError> {
        config.validate()?;

        if let Dataset::Other(name) = &config.dataset {
            warn!(
                "Unrecognized dataset {name:?}, falling back to {} classes",
                config.num_classes()
            );
        }

        let stn = match config.rotation_alignment {
            true => Some(RotationStn::new(vb.pp("stn"))?),
            false => None,
        };

        let stage = |i: usize, in_channels: usize, extended: bool| {
            EdgeConv::new(
                in_channels,
                STAGE_CHANNELS[i],
                config.k,
                extended,
                vb.pp(format!("conv{}", i + 1)).pp("0"),
                vb.pp(format!("bn{}", i + 1)),
            )
        };
        let stages = [
            stage(0, config.input_channels, config.extended_features())?,
            stage(1, STAGE_CHANNELS[0], false)?,
            stage(2, STAGE_CHANNELS[1], false)?,
            stage(3, STAGE_CHANNELS[2], false)?,
        ];

        let concat_channels = STAGE_CHANNELS.iter().sum();
        let conv5 = candle_nn::conv1d_no_bias(
            concat_channels,
            config.emb_dims,
            1,
            Default::default(),
            vb.pp("conv5").pp("0"),
        )?;
        let bn5 = candle_nn::batch_norm(config.emb_dims, BN_EPS, vb.pp("bn5"))?;

        let linear1 = candle_nn::linear_no_bias(config.emb_dims * 2, 512, vb.pp("linear1"))?;
        let bn6 = candle_nn::batch_norm(512, BN_EPS, vb.pp("bn6"))?;
        let linear2 = candle_nn::linear(512, 256, vb.pp("linear2"))?;
        let bn7 = candle_nn::batch_norm(256, BN_EPS, vb.pp("bn7"))?;
        let linear3 = candle_nn::linear(256, config.num_classes(), vb.pp("linear3"))?;

        Ok(Self {
            stn,
            stages,
            conv5,
            bn5,
            linear1,
            bn6,
            dp1: Dropout::new(config.dropout as f32),
            linear2,
            bn7,
            dp2: Dropout::new(config.dropout as f32),
            linear3,
            config,
        })
    }

    /// The model configuration.
    pub fn config(&self) -> &DgcnnConfig {
        &self.config
    }

    /// The number of output classes.
    pub fn num_classes(&self) -> usize {
        self.config.num_classes()
    }

    /// Rotate the input to the learned canonical pose.
    ///
    /// Returns the input unchanged when rotation alignment is disabled.
    ///
    /// # Arguments
    ///
    /// * `x` - Point clouds with shape `[B, 3, N]`.
    /// * `train` - Use batch statistics in the batch normalization layers.
    pub fn align_t(&self, x: &Tensor, train: bool) -> Result<Tensor, DgcnnError> {
        match &self.stn {
            Some(stn) => {
                let rotation = stn.forward_t(x, train)?;
                debug!("rotation alignment: {:?}", rotation.dims());
                Ok(apply_rotation(&rotation, x)?)
            }
            None => Ok(x.clone()),
        }
    }

    /// Compute the class logits.
    ///
    /// # Arguments
    ///
    /// * `x` - Point clouds with shape `[B, C, N]` where `C` is the configured
    ///   number of input channels and `N >= k`.
    /// * `train` - Training mode: batch statistics and active dropout.
    ///
    /// # Returns
    ///
    /// The logits with shape `[B, num_classes]`.
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor, DgcnnError> {
        self.check_input(x)?;

        let mut x = self.align_t(x, train)?;

        let mut features = Vec::with_capacity(self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            x = stage.forward_t(&x, train)?;
            debug!("edge conv {}: {:?}", i + 1, x.dims());
            features.push(x.clone());
        }

        // [B, 64 + 64 + 128 + 256, N] -> [B, emb_dims, N]
        let x = Tensor::cat(&features, 1)?;
        let x = self.bn5.forward_t(&self.conv5.forward(&x)?, train)?;
        let x = candle_nn::ops::leaky_relu(&x, NEGATIVE_SLOPE)?;

        // [B, emb_dims, N] -> [B, 2 * emb_dims]
        let x = Tensor::cat(&[x.max(D::Minus1)?, x.mean(D::Minus1)?], 1)?;
        debug!("global feature: {:?}", x.dims());

        let x = self.bn6.forward_t(&self.linear1.forward(&x)?, train)?;
        let x = candle_nn::ops::leaky_relu(&x, NEGATIVE_SLOPE)?;
        let x = self.dp1.forward_t(&x, train)?;

        let x = self.bn7.forward_t(&self.linear2.forward(&x)?, train)?;
        let x = candle_nn::ops::leaky_relu(&x, NEGATIVE_SLOPE)?;
        let x = self.dp2.forward_t(&x, train)?;

        Ok(self.linear3.forward(&x)?)
    }

    /// Predict the class of every point cloud in inference mode.
    ///
    /// # Arguments
    ///
    /// * `x` - Point clouds with shape `[B, C, N]`.
    ///
    /// # Returns
    ///
    /// The index of the highest logit for each batch element.
    pub fn predict(&self, x: &Tensor) -> Result<Vec<u32>, DgcnnError> {
        let logits = self.forward_t(x, false)?;
        Ok(logits.argmax(D::Minus1)?.to_vec1::<u32>()?)
    }

    fn check_input(&self, x: &Tensor) -> Result<(), DgcnnError> {
        match x.dims() {
            &[_, c, n] if c == self.config.input_channels => {
                if n < self.config.k {
                    return Err(GraphOpsError::InvalidNeighborCount(self.config.k, n).into());
                }
                Ok(())
            }
            dims => Err(GraphOpsError::InvalidShape("[B, input_channels, N]", dims.to_vec()).into()),
        }
    }
}

impl ModuleT for DgcnnCls {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        DgcnnCls::forward_t(self, xs, train).map_err(candle_core::Error::wrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn model(config: DgcnnConfig) -> Result<(VarMap, DgcnnCls), DgcnnError> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = DgcnnCls::new(config, vb)?;
        Ok((varmap, model))
    }

    fn small_config(dataset: &str) -> DgcnnConfig {
        DgcnnConfig {
            dataset: Dataset::from_name(dataset),
            k: 8,
            emb_dims: 64,
            ..Default::default()
        }
    }

    #[test]
    fn test_dgcnn_output_classes() -> Result<(), Box<dyn std::error::Error>> {
        let x = Tensor::randn(0f32, 1f32, (2, 3, 32), &Device::Cpu)?;
        for (dataset, classes) in [("modelnet40", 40), ("scanobject", 15), ("unknown_value", 10)] {
            let (_, model) = model(small_config(dataset))?;
            assert_eq!(model.num_classes(), classes);
            assert_eq!(model.forward_t(&x, false)?.dims(), &[2, classes]);
        }
        Ok(())
    }

    #[test]
    fn test_dgcnn_rotation_alignment() -> Result<(), Box<dyn std::error::Error>> {
        let config = DgcnnConfig {
            rotation_alignment: true,
            ..small_config("modelnet40")
        };
        let (_, model) = model(config)?;
        let x = Tensor::randn(0f32, 1f32, (2, 3, 32), &Device::Cpu)?;

        let aligned = model.align_t(&x, false)?;
        assert_eq!(aligned.dims(), &[2, 3, 32]);

        // a rotation preserves the norm of every point
        let norms_in = x.sqr()?.sum(1)?.to_vec2::<f32>()?;
        let norms_out = aligned.sqr()?.sum(1)?.to_vec2::<f32>()?;
        for (a, b) in norms_in.iter().flatten().zip(norms_out.iter().flatten()) {
            approx::assert_relative_eq!(a, b, epsilon = 1e-4, max_relative = 1e-4);
        }

        assert_eq!(model.forward_t(&x, false)?.dims(), &[2, 40]);
        Ok(())
    }

    #[test]
    fn test_dgcnn_without_alignment_is_identity() -> Result<(), Box<dyn std::error::Error>> {
        let (_, model) = model(small_config("modelnet40"))?;
        let x = Tensor::randn(0f32, 1f32, (1, 3, 16), &Device::Cpu)?;
        let aligned = model.align_t(&x, false)?;
        assert_eq!(
            aligned.flatten_all()?.to_vec1::<f32>()?,
            x.flatten_all()?.to_vec1::<f32>()?
        );
        Ok(())
    }

    #[test]
    fn test_dgcnn_deterministic_inference() -> Result<(), Box<dyn std::error::Error>> {
        let config = DgcnnConfig {
            rotation_alignment: true,
            ..small_config("scanobject")
        };
        let (_, model) = model(config)?;
        let x = Tensor::randn(0f32, 1f32, (2, 3, 24), &Device::Cpu)?;

        let a = model.forward_t(&x, false)?.to_vec2::<f32>()?;
        let b = ModuleT::forward_t(&model, &x, false)?.to_vec2::<f32>()?;
        assert_eq!(a, b);

        let classes = model.predict(&x)?;
        assert_eq!(classes.len(), 2);
        assert!(classes.iter().all(|&c| (c as usize) < 15));
        Ok(())
    }

    #[test]
    fn test_dgcnn_training_mode() -> Result<(), Box<dyn std::error::Error>> {
        let (_, model) = model(small_config("modelnet40"))?;
        let x = Tensor::randn(0f32, 1f32, (4, 3, 16), &Device::Cpu)?;
        assert_eq!(model.forward_t(&x, true)?.dims(), &[4, 40]);
        Ok(())
    }

    #[test]
    fn test_dgcnn_extended_input() -> Result<(), Box<dyn std::error::Error>> {
        let config = DgcnnConfig {
            input_channels: 9,
            ..small_config("modelnet40")
        };
        let (_, model) = model(config)?;
        let x = Tensor::randn(0f32, 1f32, (2, 9, 20), &Device::Cpu)?;
        assert_eq!(model.forward_t(&x, false)?.dims(), &[2, 40]);
        Ok(())
    }

    #[test]
    fn test_dgcnn_invalid_input() -> Result<(), Box<dyn std::error::Error>> {
        let (_, model) = model(small_config("modelnet40"))?;

        let wrong_channels = Tensor::randn(0f32, 1f32, (2, 4, 32), &Device::Cpu)?;
        assert!(matches!(
            model.forward_t(&wrong_channels, false),
            Err(DgcnnError::Ops(GraphOpsError::InvalidShape(_, _)))
        ));

        let too_few_points = Tensor::randn(0f32, 1f32, (2, 3, 4), &Device::Cpu)?;
        assert!(matches!(
            model.forward_t(&too_few_points, false),
            Err(DgcnnError::Ops(GraphOpsError::InvalidNeighborCount(8, 4)))
        ));
        Ok(())
    }

    #[test]
    fn test_dgcnn_parameter_names() -> Result<(), Box<dyn std::error::Error>> {
        let config = DgcnnConfig {
            rotation_alignment: true,
            ..small_config("modelnet40")
        };
        let (varmap, _) = model(config)?;
        let data = varmap.data().lock().map_err(|e| e.to_string())?;
        for name in [
            "conv1.0.weight",
            "conv4.0.weight",
            "conv5.0.weight",
            "bn1.running_mean",
            "bn7.bias",
            "linear1.weight",
            "linear3.bias",
            "stn.fc1.weight",
        ] {
            assert!(data.contains_key(name), "missing {name}");
        }
        assert!(!data.contains_key("linear1.bias"));
        Ok(())
    }
}
