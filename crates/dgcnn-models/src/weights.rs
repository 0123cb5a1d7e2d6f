use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;

use crate::{config::DgcnnConfig, dgcnn::DgcnnCls, error::DgcnnError};

impl DgcnnCls {
    /// Create the classifier from safetensors checkpoints.
    ///
    /// The tensor names follow the layout of the reference PyTorch model, e.g.
    /// `conv1.0.weight`, `bn1.running_mean` or `stn.fc3.bias`.
    ///
    /// # Arguments
    ///
    /// * `paths` - The safetensors files holding the weights.
    /// * `config` - The model configuration.
    /// * `device` - The device to load the weights on.
    pub fn from_safetensors<P: AsRef<Path>>(
        paths: &[P],
        config: DgcnnConfig,
        device: &Device,
    ) -> Result<Self, DgcnnError> {
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                return Err(DgcnnError::WeightsNotFound(path.to_path_buf()));
            }
            log::info!("Loading weights from {}", path.display());
        }

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(paths, DType::F32, device)? };

        Self::new(config, vb)
    }
}
