use candle_core::{Tensor, D};

use crate::error::GraphOpsError;

/// Compute the negated squared euclidean distance between every pair of points.
///
/// Uses the identity `|a - b|^2 = |a|^2 + |b|^2 - 2 a.b`, so the whole matrix is
/// one batched matrix product plus two broadcast norm terms.
///
/// # Arguments
///
/// * `x` - Point features with shape `[B, C, N]`.
///
/// # Returns
///
/// A tensor with shape `[B, N, N]` where entry `(b, i, j)` is `-|x_i - x_j|^2`.
pub fn negative_pairwise_distance(x: &Tensor) -> Result<Tensor, GraphOpsError> {
    check_rank3(x)?;
    let x = x.contiguous()?;
    let x_t = x.transpose(1, 2)?.contiguous()?;

    // -2 * x^T x, [B, N, N]
    let inner = (x_t.matmul(&x)? * -2.0)?;

    // |x|^2 as a row [B, 1, N] and as a column [B, N, 1]
    let xx = x.sqr()?.sum_keepdim(1)?;
    let xx_t = xx.transpose(1, 2)?;

    let distance = inner
        .neg()?
        .broadcast_sub(&xx)?
        .broadcast_sub(&xx_t)?;

    Ok(distance)
}

/// Find the k nearest neighbors of every point in feature space.
///
/// The point itself is a candidate, so for distinct points it is always the
/// first neighbor. Ties are resolved by the sort order of the backend, which is
/// deterministic for identical inputs.
///
/// # Arguments
///
/// * `x` - Point features with shape `[B, C, N]`.
/// * `k` - The number of neighbors, in `[1, N]`.
///
/// # Returns
///
/// A `u32` tensor with shape `[B, N, k]` holding point indices in `[0, N)`,
/// ordered from nearest to farthest.
///
/// Example:
///
/// ```
/// use candle_core::{Device, Tensor};
/// use dgcnn_ops::knn::knn;
///
/// // three points on the x axis at 0, 1 and 5
/// let x = Tensor::new(&[[[0f32, 1., 5.], [0., 0., 0.], [0., 0., 0.]]], &Device::Cpu).unwrap();
/// let idx = knn(&x, 2).unwrap();
/// assert_eq!(idx.to_vec3::<u32>().unwrap(), vec![vec![vec![0, 1], vec![1, 0], vec![2, 1]]]);
/// ```
pub fn knn(x: &Tensor, k: usize) -> Result<Tensor, GraphOpsError> {
    let (_, _, num_points) = check_rank3(x)?;
    if k == 0 || k > num_points {
        return Err(GraphOpsError::InvalidNeighborCount(k, num_points));
    }

    let distance = negative_pairwise_distance(x)?;

    // top-k of the negated distance: sort descending and keep the first k
    let idx = distance
        .arg_sort_last_dim(false)?
        .narrow(D::Minus1, 0, k)?
        .contiguous()?;

    Ok(idx)
}

pub(crate) fn check_rank3(x: &Tensor) -> Result<(usize, usize, usize), GraphOpsError> {
    match x.dims() {
        &[b, c, n] => Ok((b, c, n)),
        dims => Err(GraphOpsError::InvalidShape("[B, C, N]", dims.to_vec())),
    }
}
