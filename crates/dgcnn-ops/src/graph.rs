use candle_core::{DType, Tensor};

use crate::{
    error::GraphOpsError,
    knn::{check_rank3, knn},
};

/// First channel used for the neighbor search when the input carries nine or more
/// channels per point.
pub const EXTENDED_SEARCH_CHANNEL: usize = 6;

/// Minimum number of channels for the extended feature mode.
pub const EXTENDED_MIN_CHANNELS: usize = 9;

/// Offset neighbor indices so they address a flattened `[B * N, C]` feature table.
///
/// # Arguments
///
/// * `idx` - Neighbor indices with shape `[B, N, k]`, each in `[0, N)`. Out of
///   range indices are rejected since they would address another batch element.
/// * `num_points` - The number of points `N` per batch element.
///
/// # Returns
///
/// A `u32` tensor with shape `[B * N * k]` where the indices of batch element `b`
/// are shifted by `b * N`.
pub fn flatten_neighbor_index(idx: &Tensor, num_points: usize) -> Result<Tensor, GraphOpsError> {
    let (batch_size, _, _) = check_rank3(idx)?;

    let idx_i64 = idx.to_dtype(DType::I64)?;
    let min = idx_i64.min_all()?.to_scalar::<i64>()?;
    let max = idx_i64.max_all()?.to_scalar::<i64>()?;
    if min < 0 {
        return Err(GraphOpsError::InvalidNeighborIndex(min, num_points));
    }
    if max >= num_points as i64 {
        return Err(GraphOpsError::InvalidNeighborIndex(max, num_points));
    }

    let idx = idx.to_dtype(DType::U32)?;

    let idx_base = Tensor::arange_step(
        0u32,
        (batch_size * num_points) as u32,
        num_points as u32,
        idx.device(),
    )?
    .reshape((batch_size, 1, 1))?;

    Ok(idx.broadcast_add(&idx_base)?.flatten_all()?)
}

/// Build the edge features of a k-nearest-neighbor graph.
///
/// For every point and each of its `k` neighbors the edge descriptor is the
/// concatenation of `neighbor - center` and `center` along the channel axis.
///
/// When `extended` is set the input must have at least nine channels and the
/// neighbor search only looks at channels `6..C` (e.g. normals), while the edge
/// features are still built from all channels.
///
/// # Arguments
///
/// * `x` - Point features with shape `[B, C, N]`.
/// * `k` - The number of neighbors per point.
/// * `idx` - Optional precomputed neighbor indices with shape `[B, N, k]`.
/// * `extended` - Search neighbors on the channels from index 6 onward.
///
/// # Returns
///
/// The edge features with shape `[B, 2 * C, N, k]`.
///
/// Example:
///
/// ```
/// use candle_core::{Device, Tensor};
/// use dgcnn_ops::graph::get_graph_feature;
///
/// let x = Tensor::randn(0f32, 1f32, (2, 3, 16), &Device::Cpu).unwrap();
/// let edges = get_graph_feature(&x, 4, None, false).unwrap();
/// assert_eq!(edges.dims(), &[2, 6, 16, 4]);
/// ```
pub fn get_graph_feature(
    x: &Tensor,
    k: usize,
    idx: Option<&Tensor>,
    extended: bool,
) -> Result<Tensor, GraphOpsError> {
    let (batch_size, num_dims, num_points) = check_rank3(x)?;

    let idx = match idx {
        Some(idx) => {
            if idx.dims() != [batch_size, num_points, k] {
                return Err(GraphOpsError::InvalidShape("[B, N, k]", idx.dims().to_vec()));
            }
            idx.clone()
        }
        None if extended => {
            if num_dims < EXTENDED_MIN_CHANNELS {
                return Err(GraphOpsError::NotEnoughChannels(
                    EXTENDED_MIN_CHANNELS,
                    num_dims,
                ));
            }
            let search = x.narrow(
                1,
                EXTENDED_SEARCH_CHANNEL,
                num_dims - EXTENDED_SEARCH_CHANNEL,
            )?;
            knn(&search, k)?
        }
        None => knn(x, k)?,
    };

    let idx = flatten_neighbor_index(&idx, num_points)?;

    // [B, C, N] -> [B, N, C]
    let x = x.transpose(1, 2)?.contiguous()?;

    // gather the neighbors from the [B * N, C] table
    let feature = x
        .reshape((batch_size * num_points, num_dims))?
        .index_select(&idx, 0)?
        .reshape((batch_size, num_points, k, num_dims))?;

    let center = x
        .reshape((batch_size, num_points, 1, num_dims))?
        .repeat((1, 1, k, 1))?;

    // [B, N, k, 2C] -> [B, 2C, N, k]
    let edges = Tensor::cat(&[&(feature - &center)?, &center], 3)?
        .permute((0, 3, 1, 2))?
        .contiguous()?;

    Ok(edges)
}
