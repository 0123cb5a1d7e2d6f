use candle_core::{Device, Tensor};

use crate::error::GraphOpsError;

/// Stack a batch of point clouds into a channels-first tensor.
///
/// Every cloud must have the same number of points. Each point carries `C`
/// channels, e.g. `C = 3` for xyz or `C = 9` for the extended feature layout.
///
/// # Arguments
///
/// * `clouds` - The point clouds, each a slice of `[f32; C]` points.
/// * `device` - The device to allocate the tensor on.
///
/// # Returns
///
/// A tensor with shape `[B, C, N]`.
///
/// Example:
///
/// ```
/// use candle_core::Device;
/// use dgcnn_ops::pointcloud::batch_from_points;
///
/// let cloud = vec![[0f32, 0., 0.], [1., 2., 3.]];
/// let x = batch_from_points(&[cloud], &Device::Cpu).unwrap();
/// assert_eq!(x.dims(), &[1, 3, 2]);
/// ```
pub fn batch_from_points<T, const C: usize>(
    clouds: &[T],
    device: &Device,
) -> Result<Tensor, GraphOpsError>
where
    T: AsRef<[[f32; C]]>,
{
    let num_points = match clouds.first() {
        Some(cloud) if !cloud.as_ref().is_empty() => cloud.as_ref().len(),
        _ => return Err(GraphOpsError::EmptyBatch),
    };

    let mut data: Vec<f32> = Vec::with_capacity(clouds.len() * num_points * C);
    for cloud in clouds {
        let cloud = cloud.as_ref();
        if cloud.len() != num_points {
            return Err(GraphOpsError::RaggedBatch(num_points, cloud.len()));
        }
        data.extend(cloud.iter().flatten());
    }

    // [B, N, C] -> [B, C, N]
    let x = Tensor::from_vec(data, (clouds.len(), num_points, C), device)?
        .transpose(1, 2)?
        .contiguous()?;

    Ok(x)
}

/// Convert a channels-first tensor back into host point clouds.
///
/// # Arguments
///
/// * `x` - A tensor with shape `[B, C, N]`.
///
/// # Returns
///
/// One `Vec` of points per batch element, each point holding `C` channels.
pub fn points_from_batch(x: &Tensor) -> Result<Vec<Vec<Vec<f32>>>, GraphOpsError> {
    crate::knn::check_rank3(x)?;
    let points = x
        .transpose(1, 2)?
        .contiguous()?
        .to_dtype(candle_core::DType::F32)?
        .to_vec3::<f32>()?;
    Ok(points)
}
