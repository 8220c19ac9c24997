use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::graph::context::ExecutionContext;
use crate::layers::layer::{LayerCache, LayerGradients, LayerOutput, ParamSpec};
use crate::math::initializer::Initializer;
use crate::math::matrix::Matrix;

const GAMMA: usize = 0;
const BETA: usize = 1;
const MOVING_MEAN: usize = 2;
const MOVING_VARIANCE: usize = 3;

/// Batch normalization over the feature axis.
///
/// Training mode normalizes with the batch statistics and proposes updated
/// moving statistics; inference mode normalizes with the moving statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNorm {
    pub momentum: f64,
    pub epsilon: f64,
}

impl Default for BatchNorm {
    fn default() -> Self {
        BatchNorm { momentum: 0.99, epsilon: 1e-3 }
    }
}

impl BatchNorm {
    pub(crate) fn output_shape(&self, layer: &str, input: &[usize]) -> Result<Vec<usize>> {
        if input.len() != 1 {
            return Err(ModelError::ShapeMismatch {
                layer: layer.to_string(),
                expected: vec![input.iter().product()],
                actual: input.to_vec(),
            });
        }
        if !(0.0..=1.0).contains(&self.momentum) || self.epsilon <= 0.0 {
            return Err(ModelError::InvalidArgument(format!(
                "batch norm `{layer}` needs momentum in [0, 1] and a positive epsilon"
            )));
        }
        Ok(input.to_vec())
    }

    pub(crate) fn params(&self, input: &[usize]) -> Vec<ParamSpec> {
        let features = input[0];
        let spec = |role: &'static str, initializer: Initializer, trainable: bool| ParamSpec {
            role,
            shape: vec![features],
            initializer,
            regularizer: None,
            trainable,
            fan_in: features,
            fan_out: features,
        };
        vec![
            spec("batch_norm_gamma", Initializer::Ones, true),
            spec("batch_norm_beta", Initializer::Zeros, true),
            spec("batch_norm_moving_mean", Initializer::Zeros, false),
            spec("batch_norm_moving_variance", Initializer::Ones, false),
        ]
    }

    pub(crate) fn forward(&self, input: &Matrix, params: &[&Matrix], ctx: &ExecutionContext) -> LayerOutput {
        let (mean, variance) = if ctx.training {
            batch_moments(input)
        } else {
            (params[MOVING_MEAN].clone(), params[MOVING_VARIANCE].clone())
        };

        let inv_std = variance.map(|v| 1.0 / (v + self.epsilon).sqrt());
        let mut x_hat = input.clone();
        for r in 0..x_hat.rows {
            for (j, x) in x_hat.row_mut(r).iter_mut().enumerate() {
                *x = (*x - mean.data[j]) * inv_std.data[j];
            }
        }

        let mut output = x_hat.clone();
        for r in 0..output.rows {
            for (j, y) in output.row_mut(r).iter_mut().enumerate() {
                *y = params[GAMMA].data[j] * *y + params[BETA].data[j];
            }
        }

        let updates = if ctx.training {
            let m = self.momentum;
            vec![
                (MOVING_MEAN, params[MOVING_MEAN].zip_map(&mean, |old, new| m * old + (1.0 - m) * new)),
                (MOVING_VARIANCE, params[MOVING_VARIANCE].zip_map(&variance, |old, new| m * old + (1.0 - m) * new)),
            ]
        } else {
            Vec::new()
        };

        LayerOutput {
            output,
            cache: LayerCache::BatchNorm { x_hat, inv_std },
            updates,
        }
    }

    pub(crate) fn backward(&self, params: &[&Matrix], cache: &LayerCache, grad: &Matrix) -> LayerGradients {
        let LayerCache::BatchNorm { x_hat, inv_std } = cache else {
            return LayerGradients { inputs: vec![grad.clone()], params: vec![None; 4] };
        };

        let n = grad.rows as f64;
        let beta_grad = grad.sum_rows();
        let gamma_grad = grad.hadamard(x_hat).sum_rows();

        // dx = gamma * inv_std / n * (n * dy - sum(dy) - x_hat * sum(dy * x_hat))
        let mut input_grad = grad.clone();
        for r in 0..input_grad.rows {
            let x_hat_row = x_hat.row(r);
            for (j, dx) in input_grad.row_mut(r).iter_mut().enumerate() {
                let scale = params[GAMMA].data[j] * inv_std.data[j] / n;
                *dx = scale * (n * *dx - beta_grad.data[j] - x_hat_row[j] * gamma_grad.data[j]);
            }
        }

        LayerGradients {
            inputs: vec![input_grad],
            params: vec![Some(gamma_grad), Some(beta_grad), None, None],
        }
    }
}

/// Per-feature mean and (biased) variance of a batch.
fn batch_moments(input: &Matrix) -> (Matrix, Matrix) {
    let n = input.rows.max(1) as f64;
    let mean = input.sum_rows().scale(1.0 / n);
    let mut variance = Matrix::zeros(1, input.cols);
    for r in 0..input.rows {
        for (j, x) in input.row(r).iter().enumerate() {
            variance.data[j] += (x - mean.data[j]).powi(2);
        }
    }
    (mean, variance.scale(1.0 / n))
}
