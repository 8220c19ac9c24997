use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::optim::clip::ClipGradient;
use crate::optim::optimizer::UpdateRule;

/// Follow-the-regularized-leader.
///
/// Per element, with `n` the squared-gradient accumulator, `z` the linear
/// accumulator and `k = -learning_rate_power`:
///
/// ```text
/// g' = g + 2·l2_shrinkage·p
/// n' = n + g²
/// z += g' - (n'^k - n^k) / lr · p
/// p  = |z| > l1 ? (sign(z)·l1 - z) / (n'^k / lr + 2·l2) : 0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ftrl {
    pub learning_rate: f64,
    pub l1_regularization_strength: f64,
    pub l2_regularization_strength: f64,
    pub learning_rate_power: f64,
    pub l2_shrinkage_regularization_strength: f64,
    pub initial_accumulator_value: f64,
    #[serde(default)]
    pub clip_gradient: ClipGradient,
}

impl Ftrl {
    pub fn new(learning_rate: f64) -> Ftrl {
        Ftrl {
            learning_rate,
            l1_regularization_strength: 0.0,
            l2_regularization_strength: 0.0,
            learning_rate_power: -0.5,
            l2_shrinkage_regularization_strength: 0.0,
            initial_accumulator_value: 0.1,
            clip_gradient: ClipGradient::None,
        }
    }
}

impl Default for Ftrl {
    fn default() -> Self {
        Ftrl::new(0.001)
    }
}

impl UpdateRule for Ftrl {
    fn slot_names(&self) -> &'static [&'static str] {
        &["gradient_accumulator", "linear_accumulator"]
    }

    fn initial_slot_value(&self, slot: usize) -> f64 {
        if slot == 0 { self.initial_accumulator_value } else { 0.0 }
    }

    fn validate(&self) -> Result<()> {
        let valid = self.learning_rate > 0.0
            && self.initial_accumulator_value >= 0.0
            && self.l1_regularization_strength >= 0.0
            && self.l2_regularization_strength >= 0.0
            && self.learning_rate_power <= 0.0
            && self.l2_shrinkage_regularization_strength >= 0.0;
        if valid {
            Ok(())
        } else {
            Err(ModelError::InvalidArgument(format!("invalid Ftrl hyper-parameters: {self:?}")))
        }
    }

    fn update(&self, _iteration: u64, params: &mut [f64], grad: &[f64], slots: &mut [Vec<f64>]) {
        let lr = self.learning_rate;
        let k = -self.learning_rate_power;
        let (l1, l2) = (self.l1_regularization_strength, self.l2_regularization_strength);
        let shrinkage = self.l2_shrinkage_regularization_strength;

        let (accum, linear) = slots.split_at_mut(1);
        params
            .iter_mut()
            .zip(grad)
            .zip(accum[0].iter_mut())
            .zip(linear[0].iter_mut())
            .for_each(|(((p, g), n), z)| {
                let shrunk = g + 2. * shrinkage * *p;
                let n_new = *n + g * g;
                *z += shrunk - (n_new.powf(k) - n.powf(k)) / lr * *p;
                *n = n_new;
                *p = if z.abs() > l1 {
                    (z.signum() * l1 - *z) / (n_new.powf(k) / lr + 2. * l2)
                } else {
                    0.0
                };
            });
    }
}
