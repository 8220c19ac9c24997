use rand::{Rng, RngCore};
use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::graph::context::ExecutionContext;
use crate::layers::layer::{LayerCache, LayerGradients, LayerOutput};
use crate::math::matrix::Matrix;

/// Inverted dropout: in training mode each unit is zeroed with probability
/// `rate` and survivors are scaled by `1 / (1 - rate)`. Identity at inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f64,
}

impl Dropout {
    pub fn new(rate: f64) -> Dropout {
        Dropout { rate }
    }

    pub(crate) fn output_shape(&self, layer: &str, input: &[usize]) -> Result<Vec<usize>> {
        if !(0.0..1.0).contains(&self.rate) {
            return Err(ModelError::InvalidArgument(format!(
                "dropout rate of `{layer}` must be in [0, 1), got {}",
                self.rate
            )));
        }
        Ok(input.to_vec())
    }

    pub(crate) fn forward(
        &self,
        input: &Matrix,
        ctx: &ExecutionContext,
        rng: &mut dyn RngCore,
    ) -> LayerOutput {
        if !ctx.training || self.rate == 0.0 {
            return LayerOutput::plain(input.clone());
        }
        let keep = 1.0 - self.rate;
        let mask = Matrix::from_vec(
            input.rows,
            input.cols,
            (0..input.data.len())
                .map(|_| if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 })
                .collect(),
        );
        LayerOutput {
            output: input.hadamard(&mask),
            cache: LayerCache::DropoutMask(mask),
            updates: Vec::new(),
        }
    }

    pub(crate) fn backward(&self, cache: &LayerCache, grad: &Matrix) -> LayerGradients {
        let input_grad = match cache {
            LayerCache::DropoutMask(mask) => grad.hadamard(mask),
            _ => grad.clone(),
        };
        LayerGradients { inputs: vec![input_grad], params: Vec::new() }
    }
}
