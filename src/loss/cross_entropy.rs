use crate::activation::activation::softmax_rows;
use crate::math::matrix::Matrix;

/// Categorical cross-entropy computed directly from logits.
///
/// The model's last layer emits unnormalized scores; softmax is applied here
/// so the loss and its gradient stay numerically stable.
pub struct SoftmaxCrossEntropyLoss;

impl SoftmaxCrossEntropyLoss {
    /// Summed over examples:
    ///   L = -sum_i sum_j expected[i][j] * log_softmax(logits[i])[j]
    pub fn loss(logits: &Matrix, expected: &Matrix) -> f64 {
        let mut total = 0.0;
        for r in 0..logits.rows {
            let row = logits.row(r);
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = row.iter().map(|z| (z - max).exp()).sum::<f64>().ln() + max;
            total -= row
                .iter()
                .zip(expected.row(r))
                .map(|(z, y)| y * (z - log_sum))
                .sum::<f64>();
        }
        total
    }

    /// Gradient w.r.t. the logits:
    ///   ∂L/∂z_ij = softmax(z_i)_j * sum_k(expected_ik) - expected_ij
    /// which is `softmax - expected` for one-hot (or any normalized) targets.
    pub fn derivative(logits: &Matrix, expected: &Matrix) -> Matrix {
        let mut grad = softmax_rows(logits);
        for r in 0..grad.rows {
            let mass: f64 = expected.row(r).iter().sum();
            let y = expected.row(r).to_vec();
            for (g, y) in grad.row_mut(r).iter_mut().zip(y) {
                *g = *g * mass - y;
            }
        }
        grad
    }
}
