use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::optim::clip::ClipGradient;
use crate::optim::optimizer::UpdateRule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    #[serde(default)]
    pub clip_gradient: ClipGradient,
}

impl Adam {
    /// Creates a new `Adam` optimizer with the usual `beta1 = 0.9`,
    /// `beta2 = 0.999`, `epsilon = 1e-7`.
    pub fn new(learning_rate: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            clip_gradient: ClipGradient::None,
        }
    }
}

impl Default for Adam {
    fn default() -> Self {
        Adam::new(0.001)
    }
}

impl UpdateRule for Adam {
    fn slot_names(&self) -> &'static [&'static str] {
        &["m", "v"]
    }

    fn validate(&self) -> Result<()> {
        let valid = self.learning_rate >= 0.0
            && self.learning_rate.is_finite()
            && (0.0..1.0).contains(&self.beta1)
            && (0.0..1.0).contains(&self.beta2)
            && self.epsilon > 0.0;
        if valid {
            Ok(())
        } else {
            Err(ModelError::InvalidArgument(format!("invalid Adam hyper-parameters: {self:?}")))
        }
    }

    fn update(&self, iteration: u64, params: &mut [f64], grad: &[f64], slots: &mut [Vec<f64>]) {
        let Self { learning_rate: lr, beta1: b1, beta2: b2, epsilon: eps, .. } = *self;

        let t = iteration as i32;
        let bc1 = 1. - b1.powi(t);
        let bc2 = 1. - b2.powi(t);
        let step_size = lr * (bc2.sqrt() / bc1);

        let (m_slot, v_slot) = slots.split_at_mut(1);
        params
            .iter_mut()
            .zip(grad)
            .zip(m_slot[0].iter_mut())
            .zip(v_slot[0].iter_mut())
            .for_each(|(((p, g), m), v)| {
                *m = b1 * *m + (1. - b1) * g;
                *v = b2 * *v + (1. - b2) * g.powi(2);
                *p -= step_size * *m / (v.sqrt() + eps);
            });
    }
}
