use serde::{Serialize, Deserialize};

use crate::activation::activation::softmax_rows;
use crate::loss::bce::BceLoss;
use crate::loss::cross_entropy::SoftmaxCrossEntropyLoss;
use crate::loss::huber::HuberLoss;
use crate::loss::mae::MaeLoss;
use crate::loss::msle::MsleLoss;
use crate::loss::mse::MseLoss;
use crate::math::matrix::Matrix;

/// Selects the loss a model is compiled with.
///
/// - `Mse`:                 Mean-squared error; pair with Identity or Sigmoid output.
/// - `Mae`:                 Mean absolute error; pair with Identity output.
/// - `Huber`:               Huber loss (δ=1.0); pair with Identity output.
/// - `Msle`:                Mean squared logarithmic error for non-negative targets.
/// - `BinaryCrossEntropy`:  Binary cross-entropy; pair with Sigmoid output.
/// - `SoftmaxCrossEntropyWithLogits`:  Categorical cross-entropy on raw
///   logits; pair with an Identity output. Predictions are the softmax of
///   the output.
///
/// The batch loss is the summed per-term loss divided by the number of
/// losses: `batch × width` for element-wise losses, `batch` for the
/// softmax cross-entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    Mse,
    Mae,
    Huber,
    Msle,
    BinaryCrossEntropy,
    SoftmaxCrossEntropyWithLogits,
}

impl LossType {
    pub fn number_of_losses(&self, batch: usize, width: usize) -> usize {
        match self {
            LossType::SoftmaxCrossEntropyWithLogits => batch,
            _ => batch * width,
        }
    }

    /// Mean loss of a batch.
    pub fn value(&self, output: &Matrix, expected: &Matrix, number_of_losses: usize) -> f64 {
        let sum = match self {
            LossType::Mse => MseLoss::loss(output, expected),
            LossType::Mae => MaeLoss::loss(output, expected),
            LossType::Huber => HuberLoss::loss(output, expected),
            LossType::Msle => MsleLoss::loss(output, expected),
            LossType::BinaryCrossEntropy => BceLoss::loss(output, expected),
            LossType::SoftmaxCrossEntropyWithLogits => SoftmaxCrossEntropyLoss::loss(output, expected),
        };
        sum / number_of_losses.max(1) as f64
    }

    /// Gradient of `value` w.r.t. the model output.
    pub fn gradient(&self, output: &Matrix, expected: &Matrix, number_of_losses: usize) -> Matrix {
        let grad = match self {
            LossType::Mse => MseLoss::derivative(output, expected),
            LossType::Mae => MaeLoss::derivative(output, expected),
            LossType::Huber => HuberLoss::derivative(output, expected),
            LossType::Msle => MsleLoss::derivative(output, expected),
            LossType::BinaryCrossEntropy => BceLoss::derivative(output, expected),
            LossType::SoftmaxCrossEntropyWithLogits => SoftmaxCrossEntropyLoss::derivative(output, expected),
        };
        grad.scale(1.0 / number_of_losses.max(1) as f64)
    }

    /// What the model reports as its prediction for a raw output.
    pub fn predictions(&self, output: &Matrix) -> Matrix {
        match self {
            LossType::SoftmaxCrossEntropyWithLogits => softmax_rows(output),
            _ => output.clone(),
        }
    }
}
