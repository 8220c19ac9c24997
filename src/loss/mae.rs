use crate::math::matrix::Matrix;

pub struct MaeLoss;

impl MaeLoss {
    /// Summed absolute error: sum(|predicted - expected|)
    pub fn loss(predicted: &Matrix, expected: &Matrix) -> f64 {
        predicted.zip_map(expected, |p, y| (p - y).abs()).sum()
    }

    /// Per-output subgradient: sign(p - y)  (0 when equal)
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        predicted.zip_map(expected, |p, y| {
            let diff = p - y;
            if diff > 0.0 { 1.0 } else if diff < 0.0 { -1.0 } else { 0.0 }
        })
    }
}
