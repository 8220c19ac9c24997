use crate::math::matrix::Matrix;

pub struct MsleLoss;

const EPS: f64 = 1e-7;

/// `ln(max(x, ε) + 1)`, clamped so training never sees the log of a
/// non-positive number.
fn log1p_clamped(x: f64) -> f64 {
    (x.max(EPS) + 1.0).ln()
}

impl MsleLoss {
    /// Summed squared log error: sum((ln(p+1) - ln(y+1))²)
    pub fn loss(predicted: &Matrix, expected: &Matrix) -> f64 {
        predicted
            .zip_map(expected, |p, y| (log1p_clamped(p) - log1p_clamped(y)).powi(2))
            .sum()
    }

    /// Per-output gradient: 2·(ln(p+1) - ln(y+1)) / (p+1), zero where p is clamped.
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        predicted.zip_map(expected, |p, y| {
            if p < EPS {
                return 0.0;
            }
            2.0 * (log1p_clamped(p) - log1p_clamped(y)) / (p + 1.0)
        })
    }
}
