use crate::math::matrix::Matrix;

pub struct BceLoss;

const EPS: f64 = 1e-12;

impl BceLoss {
    /// Summed BCE: -sum(y·log(p+ε) + (1-y)·log(1-p+ε))
    pub fn loss(predicted: &Matrix, expected: &Matrix) -> f64 {
        predicted
            .zip_map(expected, |p, y| -(y * (p + EPS).ln() + (1.0 - y) * (1.0 - p + EPS).ln()))
            .sum()
    }

    /// Per-output gradient: (p - y) / ((p + ε) · (1 - p + ε))
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        predicted.zip_map(expected, |p, y| (p - y) / ((p + EPS) * (1.0 - p + EPS)))
    }
}
