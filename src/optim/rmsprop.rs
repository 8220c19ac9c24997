use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::optim::clip::ClipGradient;
use crate::optim::optimizer::UpdateRule;

/// `ms = ρ·ms + (1-ρ)·g²`, `p -= lr·g / (sqrt(ms) + ε)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmsProp {
    pub learning_rate: f64,
    pub rho: f64,
    pub epsilon: f64,
    #[serde(default)]
    pub clip_gradient: ClipGradient,
}

impl RmsProp {
    pub fn new(learning_rate: f64) -> RmsProp {
        RmsProp { learning_rate, rho: 0.9, epsilon: 1e-10, clip_gradient: ClipGradient::None }
    }
}

impl UpdateRule for RmsProp {
    fn slot_names(&self) -> &'static [&'static str] {
        &["rms"]
    }

    fn validate(&self) -> Result<()> {
        if self.learning_rate >= 0.0 && (0.0..1.0).contains(&self.rho) && self.epsilon > 0.0 {
            Ok(())
        } else {
            Err(ModelError::InvalidArgument(format!("invalid RMSProp hyper-parameters: {self:?}")))
        }
    }

    fn update(&self, _iteration: u64, params: &mut [f64], grad: &[f64], slots: &mut [Vec<f64>]) {
        let (lr, rho, eps) = (self.learning_rate, self.rho, self.epsilon);
        params
            .iter_mut()
            .zip(grad)
            .zip(slots[0].iter_mut())
            .for_each(|((p, g), ms)| {
                *ms = rho * *ms + (1. - rho) * g * g;
                *p -= lr * g / (ms.sqrt() + eps);
            });
    }
}
