use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::optim::clip::ClipGradient;
use crate::optim::optimizer::UpdateRule;

/// Adam with an infinity-norm second moment:
/// `m = β1·m + (1-β1)·g`, `v = max(β2·v, |g|)`,
/// `p -= lr / (1 - β1^t) · m / (v + ε)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adamax {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    #[serde(default)]
    pub clip_gradient: ClipGradient,
}

impl Adamax {
    pub fn new(learning_rate: f64) -> Adamax {
        Adamax { learning_rate, beta1: 0.9, beta2: 0.999, epsilon: 1e-7, clip_gradient: ClipGradient::None }
    }
}

impl Default for Adamax {
    fn default() -> Self {
        Adamax::new(0.001)
    }
}

impl UpdateRule for Adamax {
    fn slot_names(&self) -> &'static [&'static str] {
        &["m", "v"]
    }

    fn validate(&self) -> Result<()> {
        let open_unit = |b: f64| b > 0.0 && b < 1.0;
        if self.learning_rate >= 0.0 && open_unit(self.beta1) && open_unit(self.beta2) && self.epsilon > 0.0 {
            Ok(())
        } else {
            Err(ModelError::InvalidArgument(format!("invalid Adamax hyper-parameters: {self:?}")))
        }
    }

    fn update(&self, iteration: u64, params: &mut [f64], grad: &[f64], slots: &mut [Vec<f64>]) {
        let Self { learning_rate: lr, beta1: b1, beta2: b2, epsilon: eps, .. } = *self;
        let step_size = lr / (1. - b1.powi(iteration as i32));

        let (m_slot, v_slot) = slots.split_at_mut(1);
        params
            .iter_mut()
            .zip(grad)
            .zip(m_slot[0].iter_mut())
            .zip(v_slot[0].iter_mut())
            .for_each(|(((p, g), m), v)| {
                *m = b1 * *m + (1. - b1) * g;
                *v = (b2 * *v).max(g.abs());
                *p -= step_size * *m / (*v + eps);
            });
    }
}
