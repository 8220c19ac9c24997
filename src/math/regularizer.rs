use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;

/// Weight penalty added to the loss when a model is compiled with
/// regularization enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Regularizer {
    L1 { l1: f64 },
    L2 { l2: f64 },
    L1L2 { l1: f64, l2: f64 },
}

impl Regularizer {
    fn factors(&self) -> (f64, f64) {
        match *self {
            Regularizer::L1 { l1 } => (l1, 0.0),
            Regularizer::L2 { l2 } => (0.0, l2),
            Regularizer::L1L2 { l1, l2 } => (l1, l2),
        }
    }

    /// `l1 * sum|w| + l2 * sum w²`
    pub fn penalty(&self, weights: &Matrix) -> f64 {
        let (l1, l2) = self.factors();
        weights.data.iter().map(|w| l1 * w.abs() + l2 * w * w).sum()
    }

    pub fn gradient(&self, weights: &Matrix) -> Matrix {
        let (l1, l2) = self.factors();
        weights.map(|w| l1 * sign(w) + 2.0 * l2 * w)
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { 0.0 }
}
