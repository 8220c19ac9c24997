use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::optim::clip::ClipGradient;
use crate::optim::optimizer::UpdateRule;

/// `acc = ρ·acc + (1-ρ)·g²`, `u = g·sqrt(acc_u + ε) / sqrt(acc + ε)`,
/// `acc_u = ρ·acc_u + (1-ρ)·u²`, `p -= lr·u`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaDelta {
    pub learning_rate: f64,
    pub rho: f64,
    pub epsilon: f64,
    #[serde(default)]
    pub clip_gradient: ClipGradient,
}

impl AdaDelta {
    pub fn new(learning_rate: f64) -> AdaDelta {
        AdaDelta { learning_rate, rho: 0.95, epsilon: 1e-8, clip_gradient: ClipGradient::None }
    }
}

impl Default for AdaDelta {
    fn default() -> Self {
        AdaDelta::new(0.1)
    }
}

impl UpdateRule for AdaDelta {
    fn slot_names(&self) -> &'static [&'static str] {
        &["accum", "accum_update"]
    }

    fn validate(&self) -> Result<()> {
        if self.learning_rate >= 0.0 && self.rho >= 0.0 && self.epsilon > 0.0 {
            Ok(())
        } else {
            Err(ModelError::InvalidArgument(format!("invalid AdaDelta hyper-parameters: {self:?}")))
        }
    }

    fn update(&self, _iteration: u64, params: &mut [f64], grad: &[f64], slots: &mut [Vec<f64>]) {
        let (lr, rho, eps) = (self.learning_rate, self.rho, self.epsilon);
        let (accum, accum_update) = slots.split_at_mut(1);
        params
            .iter_mut()
            .zip(grad)
            .zip(accum[0].iter_mut())
            .zip(accum_update[0].iter_mut())
            .for_each(|(((p, g), acc), acc_u)| {
                *acc = rho * *acc + (1. - rho) * g * g;
                let update = g * (*acc_u + eps).sqrt() / (*acc + eps).sqrt();
                *acc_u = rho * *acc_u + (1. - rho) * update * update;
                *p -= lr * update;
            });
    }
}
