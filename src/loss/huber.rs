use crate::math::matrix::Matrix;

pub struct HuberLoss;

/// Where the quadratic region ends.
const DELTA: f64 = 1.0;

impl HuberLoss {
    /// Summed Huber: sum(h(predicted − expected))
    /// where h(x) = 0.5·x²  if |x| ≤ δ
    ///              δ·(|x| − 0.5·δ)  otherwise
    pub fn loss(predicted: &Matrix, expected: &Matrix) -> f64 {
        predicted
            .zip_map(expected, |p, y| {
                let x = p - y;
                if x.abs() <= DELTA {
                    0.5 * x * x
                } else {
                    DELTA * (x.abs() - 0.5 * DELTA)
                }
            })
            .sum()
    }

    /// Per-output gradient: x  if |x| ≤ δ,  else δ·sign(x)
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        predicted.zip_map(expected, |p, y| {
            let x = p - y;
            if x.abs() <= DELTA { x } else { DELTA * x.signum() }
        })
    }
}
