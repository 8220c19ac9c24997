use std::fmt;

use serde::{Serialize, Deserialize};

use crate::math::matrix::{argmax, Matrix};

/// Quality measures reported next to the loss.
///
/// Every metric is a mean over the batch, so results of batches of different
/// sizes can be combined by weighting with the batch size. A metric that is
/// undefined for the data (e.g. `Msle` with values ≤ -1) comes out as NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metrics {
    /// Output width > 1: rate of `argmax(pred) == argmax(true)`.
    /// Output width 1: rate of `(pred ≥ 0.5) == (true ≥ 0.5)`.
    Accuracy,
    Mae,
    Mse,
    Msle,
}

impl Metrics {
    pub fn compute(&self, predictions: &Matrix, expected: &Matrix) -> f64 {
        if predictions.rows == 0 {
            return f64::NAN;
        }
        match self {
            Metrics::Accuracy => accuracy(predictions, expected),
            Metrics::Mae => mean(predictions.zip_map(expected, |p, y| (y - p).abs())),
            Metrics::Mse => mean(predictions.zip_map(expected, |p, y| (y - p).powi(2))),
            Metrics::Msle => mean(predictions.zip_map(expected, |p, y| ((y + 1.0).ln() - (p + 1.0).ln()).powi(2))),
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metrics::Accuracy => "accuracy",
            Metrics::Mae => "mae",
            Metrics::Mse => "mse",
            Metrics::Msle => "msle",
        };
        f.write_str(name)
    }
}

fn mean(values: Matrix) -> f64 {
    values.sum() / values.data.len() as f64
}

fn accuracy(predictions: &Matrix, expected: &Matrix) -> f64 {
    let correct = (0..predictions.rows)
        .filter(|&r| {
            let (p, y) = (predictions.row(r), expected.row(r));
            if predictions.cols == 1 {
                (p[0] >= 0.5) == (y[0] >= 0.5)
            } else {
                argmax(p) == argmax(y)
            }
        })
        .count();
    correct as f64 / predictions.rows as f64
}
