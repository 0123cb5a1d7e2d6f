use candle_core::Tensor;

use crate::{error::GraphOpsError, knn::check_rank3};

/// Lower bound on the quaternion norm to avoid a division by zero.
const NORM_EPS: f64 = 1e-12;

/// Normalize a batch of quaternions to unit length.
///
/// # Arguments
///
/// * `quat` - Quaternions with shape `[B, 4]`.
///
/// # Returns
///
/// The unit quaternions with shape `[B, 4]`. A zero quaternion stays zero.
pub fn normalize_quaternion(quat: &Tensor) -> Result<Tensor, GraphOpsError> {
    check_quaternion(quat)?;
    let norm = quat.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(NORM_EPS)?;
    Ok(quat.broadcast_div(&norm)?)
}

/// Convert a batch of unit quaternions to rotation matrices.
///
/// The quaternions are laid out as `(w, x, y, z)`.
///
/// PRECONDITION: the quaternions have unit norm, otherwise the matrices are not
/// orthonormal. See [`normalize_quaternion`].
///
/// # Arguments
///
/// * `quat` - Unit quaternions with shape `[B, 4]`.
///
/// # Returns
///
/// The rotation matrices with shape `[B, 3, 3]`.
///
/// Example:
///
/// ```
/// use candle_core::{Device, Tensor};
/// use dgcnn_ops::rotation::quaternion_to_rotation_matrix;
///
/// let quat = Tensor::new(&[[1f32, 0., 0., 0.]], &Device::Cpu).unwrap();
/// let rotation = quaternion_to_rotation_matrix(&quat).unwrap();
/// assert_eq!(
///     rotation.to_vec3::<f32>().unwrap(),
///     vec![vec![vec![1., 0., 0.], vec![0., 1., 0.], vec![0., 0., 1.]]]
/// );
/// ```
pub fn quaternion_to_rotation_matrix(quat: &Tensor) -> Result<Tensor, GraphOpsError> {
    let batch_size = check_quaternion(quat)?;

    let w = quat.narrow(1, 0, 1)?;
    let x = quat.narrow(1, 1, 1)?;
    let y = quat.narrow(1, 2, 1)?;
    let z = quat.narrow(1, 3, 1)?;

    let xx = (&x * &x)?;
    let yy = (&y * &y)?;
    let zz = (&z * &z)?;
    let xy = (&x * &y)?;
    let xz = (&x * &z)?;
    let yz = (&y * &z)?;
    let wx = (&w * &x)?;
    let wy = (&w * &y)?;
    let wz = (&w * &z)?;

    // 1 - 2 (a + b)
    let diag = |a: &Tensor, b: &Tensor| (a + b)?.affine(-2.0, 1.0);
    // 2 (a - b) and 2 (a + b)
    let sub2 = |a: &Tensor, b: &Tensor| (a - b)? * 2.0;
    let add2 = |a: &Tensor, b: &Tensor| (a + b)? * 2.0;

    let entries = [
        diag(&yy, &zz)?,
        sub2(&xy, &wz)?,
        add2(&xz, &wy)?,
        add2(&xy, &wz)?,
        diag(&xx, &zz)?,
        sub2(&yz, &wx)?,
        sub2(&xz, &wy)?,
        add2(&yz, &wx)?,
        diag(&xx, &yy)?,
    ];

    Ok(Tensor::cat(&entries, 1)?.reshape((batch_size, 3, 3))?)
}

/// Apply a batch of rotation matrices to a batch of point clouds.
///
/// # Arguments
///
/// * `rotation` - Rotation matrices with shape `[B, 3, 3]`.
/// * `points` - Point clouds with shape `[B, 3, N]`.
///
/// # Returns
///
/// The rotated point clouds `R x` with shape `[B, 3, N]`.
pub fn apply_rotation(rotation: &Tensor, points: &Tensor) -> Result<Tensor, GraphOpsError> {
    let (batch_size, channels, _) = check_rank3(points)?;
    if channels != 3 {
        return Err(GraphOpsError::InvalidShape("[B, 3, N]", points.dims().to_vec()));
    }
    if rotation.dims() != [batch_size, 3, 3] {
        return Err(GraphOpsError::InvalidShape("[B, 3, 3]", rotation.dims().to_vec()));
    }
    Ok(rotation.matmul(&points.contiguous()?)?)
}

fn check_quaternion(quat: &Tensor) -> Result<usize, GraphOpsError> {
    match quat.dims() {
        &[b, 4] => Ok(b),
        dims => Err(GraphOpsError::InvalidShape("[B, 4]", dims.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;
    use glam::{Mat3, Quat};

    fn random_unit_quaternions(batch_size: usize) -> Result<Tensor, GraphOpsError> {
        let quat = Tensor::randn(0f32, 1f32, (batch_size, 4), &Device::Cpu)?;
        normalize_quaternion(&quat)
    }

    fn determinant(m: &[Vec<f32>]) -> f32 {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    #[test]
    fn test_normalize_quaternion() -> Result<(), Box<dyn std::error::Error>> {
        let quat = Tensor::new(&[[2f32, 0., 0., 0.], [0., 3., 0., 4.]], &Device::Cpu)?;
        let unit = normalize_quaternion(&quat)?.to_vec2::<f32>()?;
        let expected = [[1f32, 0., 0., 0.], [0., 0.6, 0., 0.8]];
        for (row, expected_row) in unit.iter().zip(expected.iter()) {
            for (a, e) in row.iter().zip(expected_row.iter()) {
                assert_relative_eq!(a, e, epsilon = 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn test_normalize_zero_quaternion() -> Result<(), Box<dyn std::error::Error>> {
        let quat = Tensor::zeros((1, 4), candle_core::DType::F32, &Device::Cpu)?;
        let unit = normalize_quaternion(&quat)?.to_vec2::<f32>()?;
        assert!(unit[0].iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn test_quaternion_to_rotation_matrix_z90() -> Result<(), Box<dyn std::error::Error>> {
        let h = std::f32::consts::FRAC_1_SQRT_2;
        let quat = Tensor::new(&[[h, 0., 0., h]], &Device::Cpu)?;
        let rotation = quaternion_to_rotation_matrix(&quat)?.to_vec3::<f32>()?;
        let expected = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rotation[0][i][j], expected[i][j], epsilon = 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn test_rotation_matrix_is_orthonormal() -> Result<(), Box<dyn std::error::Error>> {
        let rotation = quaternion_to_rotation_matrix(&random_unit_quaternions(16)?)?;
        let rrt = rotation.matmul(&rotation.transpose(1, 2)?.contiguous()?)?;

        for (m, p) in rotation.to_vec3::<f32>()?.iter().zip(rrt.to_vec3::<f32>()?.iter()) {
            for i in 0..3 {
                for j in 0..3 {
                    let identity = if i == j { 1.0 } else { 0.0 };
                    assert_relative_eq!(p[i][j], identity, epsilon = 1e-5);
                }
            }
            assert_relative_eq!(determinant(m), 1.0, epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_rotation_matrix_matches_glam() -> Result<(), Box<dyn std::error::Error>> {
        let quat = random_unit_quaternions(8)?;
        let rotation = quaternion_to_rotation_matrix(&quat)?.to_vec3::<f32>()?;

        for (q, m) in quat.to_vec2::<f32>()?.iter().zip(rotation.iter()) {
            let expected = Mat3::from_quat(Quat::from_xyzw(q[1], q[2], q[3], q[0]));
            for i in 0..3 {
                for j in 0..3 {
                    // glam matrices are column major
                    assert_relative_eq!(m[i][j], expected.col(j)[i], epsilon = 1e-5);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_apply_rotation() -> Result<(), Box<dyn std::error::Error>> {
        let h = std::f32::consts::FRAC_1_SQRT_2;
        let quat = Tensor::new(&[[h, 0., 0., h], [1., 0., 0., 0.]], &Device::Cpu)?;
        let rotation = quaternion_to_rotation_matrix(&quat)?;

        // the point (1, 0, 0) in both clouds
        let points = Tensor::new(&[[[1f32], [0.], [0.]], [[1.], [0.], [0.]]], &Device::Cpu)?;
        let rotated = apply_rotation(&rotation, &points)?.to_vec3::<f32>()?;

        assert_relative_eq!(rotated[0][0][0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(rotated[0][1][0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(rotated[1][0][0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(rotated[1][1][0], 0.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_apply_rotation_invalid_shape() -> Result<(), Box<dyn std::error::Error>> {
        let rotation = quaternion_to_rotation_matrix(&random_unit_quaternions(2)?)?;
        let points = Tensor::zeros((2, 4, 8), candle_core::DType::F32, &Device::Cpu)?;
        assert!(matches!(
            apply_rotation(&rotation, &points),
            Err(GraphOpsError::InvalidShape(_, _))
        ));
        Ok(())
    }
}
