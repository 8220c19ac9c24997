use crate::math::matrix::Matrix;

pub struct MseLoss;

impl MseLoss {
    /// Summed squared error: sum((predicted - expected)²)
    pub fn loss(predicted: &Matrix, expected: &Matrix) -> f64 {
        predicted.zip_map(expected, |a, b| (a - b).powi(2)).sum()
    }

    /// Per-output gradient of the summed loss: 2·(predicted - expected)
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        predicted.zip_map(expected, |a, b| 2.0 * (a - b))
    }
}
