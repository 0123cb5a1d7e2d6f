use argh::FromArgs;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use std::path::{Path, PathBuf};

use dgcnn_models::{DgcnnCls, DgcnnConfig};

#[derive(FromArgs)]
/// Classify a point cloud with the DGCNN classifier
struct Args {
    /// path to a point cloud text file, one point per line with `input_channels` columns
    #[argh(option, short = 'p')]
    points_path: PathBuf,

    /// path to a safetensors checkpoint. Random weights are used if missing.
    #[argh(option, short = 'w')]
    weights_path: Option<PathBuf>,

    /// path to a JSON model configuration
    #[argh(option, short = 'c')]
    config_path: Option<PathBuf>,

    /// number of points fed to the network
    #[argh(option, short = 'n', default = "1024")]
    num_points: usize,
}

/// Read the first `channels` columns of every line, separated by commas or spaces.
///
/// Returns the points row by row, `channels` values per point.
fn read_points(
    path: &Path,
    num_points: usize,
    channels: usize,
) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;

    let mut data = Vec::with_capacity(num_points * channels);
    let mut count = 0;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let values = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|v| !v.is_empty())
            .take(channels)
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()?;

        if values.len() != channels {
            return Err(format!("expected {channels} values per point, got {line:?}").into());
        }
        data.extend(values);
        count += 1;

        if count == num_points {
            break;
        }
    }

    if count < num_points {
        log::warn!(
            "{} has {} points, fewer than the requested {}",
            path.display(),
            count,
            num_points
        );
    }

    Ok(data)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    #[cfg(feature = "cuda")]
    let device = match Device::cuda_if_available(0) {
        Ok(device) => device,
        Err(e) => {
            log::warn!("CUDA not available, defaulting to CPU: {e:?}");
            Device::Cpu
        }
    };

    #[cfg(not(feature = "cuda"))]
    let device = Device::Cpu;

    let config = match &args.config_path {
        Some(path) => DgcnnConfig::from_json_file(path)?,
        None => DgcnnConfig::default(),
    };

    // keep the varmap alive for the random weights
    let varmap = VarMap::new();
    let model = match &args.weights_path {
        Some(path) => DgcnnCls::from_safetensors(&[path], config, &device)?,
        None => {
            log::warn!("No weights given, using random weights");
            DgcnnCls::new(config, VarBuilder::from_varmap(&varmap, DType::F32, &device))?
        }
    };

    let channels = model.config().input_channels;
    let data = read_points(&args.points_path, args.num_points, channels)?;

    let num_points = data.len() / channels;

    // [1, N, C] -> [1, C, N]
    let x = Tensor::from_vec(data, (1, num_points, channels), &device)?
        .transpose(1, 2)?
        .contiguous()?;

    let logits = model.forward_t(&x, false)?;
    let probs = candle_nn::ops::softmax(&logits, D::Minus1)?;
    let class = logits.argmax(D::Minus1)?.squeeze(0)?.to_scalar::<u32>()?;

    println!("logits: {}", logits.squeeze(0)?);
    println!(
        "class: {} ({:.3}) of {} classes in {}",
        class,
        probs.squeeze(0)?.to_vec1::<f32>()?[class as usize],
        model.num_classes(),
        model.config().dataset
    );

    Ok(())
}
