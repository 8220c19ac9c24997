use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::optim::clip::ClipGradient;
use crate::optim::optimizer::UpdateRule;

/// Stochastic gradient descent with optional (Nesterov) momentum.
///
/// Without momentum: `p -= lr · g`. With momentum `μ`:
/// `v = μ·v - lr·g`, then `p += v` (or `p += μ·v - lr·g` for Nesterov).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    pub learning_rate: f64,
    #[serde(default)]
    pub momentum: f64,
    #[serde(default)]
    pub nesterov: bool,
    #[serde(default)]
    pub clip_gradient: ClipGradient,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate, momentum: 0.0, nesterov: false, clip_gradient: ClipGradient::None }
    }

    pub fn with_momentum(mut self, momentum: f64, nesterov: bool) -> Sgd {
        self.momentum = momentum;
        self.nesterov = nesterov;
        self
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Sgd::new(0.01)
    }
}

impl UpdateRule for Sgd {
    fn slot_names(&self) -> &'static [&'static str] {
        if self.momentum > 0.0 { &["momentum"] } else { &[] }
    }

    fn validate(&self) -> Result<()> {
        if !(self.learning_rate >= 0.0 && self.learning_rate.is_finite()) {
            return Err(ModelError::InvalidArgument(format!(
                "SGD learning rate must be non-negative, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(ModelError::InvalidArgument(format!(
                "SGD momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        Ok(())
    }

    fn update(&self, _iteration: u64, params: &mut [f64], grad: &[f64], slots: &mut [Vec<f64>]) {
        let lr = self.learning_rate;
        if self.momentum == 0.0 {
            params.iter_mut().zip(grad).for_each(|(p, g)| *p -= lr * g);
            return;
        }

        let mu = self.momentum;
        params
            .iter_mut()
            .zip(grad)
            .zip(slots[0].iter_mut())
            .for_each(|((p, g), v)| {
                *v = mu * *v - lr * g;
                if self.nesterov {
                    *p += mu * *v - lr * g;
                } else {
                    *p += *v;
                }
            });
    }
}
