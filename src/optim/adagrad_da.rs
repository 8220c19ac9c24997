use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::optim::clip::ClipGradient;
use crate::optim::optimizer::UpdateRule;

/// AdaGrad dual averaging. With `a` the gradient sum, `s` the squared
/// gradient sum and `t` the 1-based step:
/// `p = -lr · sign(a) · max(|a| - l1·t, 0) / (l2·t·lr + sqrt(s))`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaGradDA {
    pub learning_rate: f64,
    pub initial_accumulator_value: f64,
    pub l1_strength: f64,
    pub l2_strength: f64,
    #[serde(default)]
    pub clip_gradient: ClipGradient,
}

impl AdaGradDA {
    pub fn new(learning_rate: f64) -> AdaGradDA {
        AdaGradDA {
            learning_rate,
            initial_accumulator_value: 0.01,
            l1_strength: 0.01,
            l2_strength: 0.01,
            clip_gradient: ClipGradient::None,
        }
    }
}

impl Default for AdaGradDA {
    fn default() -> Self {
        AdaGradDA::new(0.1)
    }
}

impl UpdateRule for AdaGradDA {
    fn slot_names(&self) -> &'static [&'static str] {
        &["gradient_accumulator", "gradient_squared_accumulator"]
    }

    fn initial_slot_value(&self, slot: usize) -> f64 {
        if slot == 1 { self.initial_accumulator_value } else { 0.0 }
    }

    fn validate(&self) -> Result<()> {
        let valid = self.learning_rate >= 0.0
            && self.initial_accumulator_value >= 0.0
            && self.l1_strength >= 0.0
            && self.l2_strength >= 0.0;
        if valid {
            Ok(())
        } else {
            Err(ModelError::InvalidArgument(format!("invalid AdaGradDA hyper-parameters: {self:?}")))
        }
    }

    fn update(&self, iteration: u64, params: &mut [f64], grad: &[f64], slots: &mut [Vec<f64>]) {
        let (lr, l1, l2) = (self.learning_rate, self.l1_strength, self.l2_strength);
        let t = iteration as f64;

        let (sums, squares) = slots.split_at_mut(1);
        params
            .iter_mut()
            .zip(grad)
            .zip(sums[0].iter_mut())
            .zip(squares[0].iter_mut())
            .for_each(|(((p, g), a), s)| {
                *a += g;
                *s += g * g;
                let shrunk = (a.abs() - l1 * t).max(0.0);
                *p = -lr * a.signum() * shrunk / (l2 * t * lr + s.sqrt());
            });
    }
}
