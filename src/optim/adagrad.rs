use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::optim::clip::ClipGradient;
use crate::optim::optimizer::UpdateRule;

/// `acc += g²`, `p -= lr·g / (sqrt(acc) + ε)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaGrad {
    pub learning_rate: f64,
    pub initial_accumulator_value: f64,
    pub epsilon: f64,
    #[serde(default)]
    pub clip_gradient: ClipGradient,
}

impl AdaGrad {
    pub fn new(learning_rate: f64) -> AdaGrad {
        AdaGrad {
            learning_rate,
            initial_accumulator_value: 0.01,
            epsilon: 1e-7,
            clip_gradient: ClipGradient::None,
        }
    }
}

impl UpdateRule for AdaGrad {
    fn slot_names(&self) -> &'static [&'static str] {
        &["accumulator"]
    }

    fn initial_slot_value(&self, _slot: usize) -> f64 {
        self.initial_accumulator_value
    }

    fn validate(&self) -> Result<()> {
        if self.learning_rate >= 0.0 && self.initial_accumulator_value >= 0.0 && self.epsilon > 0.0 {
            Ok(())
        } else {
            Err(ModelError::InvalidArgument(format!("invalid AdaGrad hyper-parameters: {self:?}")))
        }
    }

    fn update(&self, _iteration: u64, params: &mut [f64], grad: &[f64], slots: &mut [Vec<f64>]) {
        let (lr, eps) = (self.learning_rate, self.epsilon);
        params
            .iter_mut()
            .zip(grad)
            .zip(slots[0].iter_mut())
            .for_each(|((p, g), acc)| {
                *acc += g * g;
                *p -= lr * g / (acc.sqrt() + eps);
            });
    }
}
