use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::graph::variable::VariableRegistry;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor;
use crate::optim::adadelta::AdaDelta;
use crate::optim::adagrad::AdaGrad;
use crate::optim::adagrad_da::AdaGradDA;
use crate::optim::adam::Adam;
use crate::optim::adamax::Adamax;
use crate::optim::clip::ClipGradient;
use crate::optim::ftrl::Ftrl;
use crate::optim::rmsprop::RmsProp;
use crate::optim::sgd::Sgd;

/// Per-parameter update rule of one optimizer.
pub trait UpdateRule {
    /// Names of the slots kept per variable, e.g. `["m", "v"]` for Adam.
    fn slot_names(&self) -> &'static [&'static str];

    /// Starting value of slot `slot` (an index into `slot_names()`).
    fn initial_slot_value(&self, _slot: usize) -> f64 {
        0.0
    }

    fn validate(&self) -> Result<()>;

    /// Updates `params` in place. `iteration` is 1 on the first step and
    /// `slots` follows `slot_names()`.
    fn update(&self, iteration: u64, params: &mut [f64], grad: &[f64], slots: &mut [Vec<f64>]);
}

/// Optimizer configuration a model is compiled with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Optimizer {
    Sgd(Sgd),
    Adam(Adam),
    RmsProp(RmsProp),
    AdaGrad(AdaGrad),
    AdaDelta(AdaDelta),
    Adamax(Adamax),
    Ftrl(Ftrl),
    #[serde(rename = "ada_grad_da")]
    AdaGradDA(AdaGradDA),
}

/// Step counter and slot values of an optimizer, keyed by
/// `optimizer_{variable}-{slot}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub iterations: u64,
    pub slots: BTreeMap<String, Tensor>,
}

pub fn slot_key(variable: &str, slot: &str) -> String {
    format!("optimizer_{variable}-{slot}")
}

impl Optimizer {
    pub fn sgd(learning_rate: f64) -> Optimizer {
        Optimizer::Sgd(Sgd::new(learning_rate))
    }

    pub fn adam(learning_rate: f64) -> Optimizer {
        Optimizer::Adam(Adam::new(learning_rate))
    }

    pub fn rms_prop(learning_rate: f64) -> Optimizer {
        Optimizer::RmsProp(RmsProp::new(learning_rate))
    }

    pub fn ada_grad(learning_rate: f64) -> Optimizer {
        Optimizer::AdaGrad(AdaGrad::new(learning_rate))
    }

    pub fn ada_delta(learning_rate: f64) -> Optimizer {
        Optimizer::AdaDelta(AdaDelta::new(learning_rate))
    }

    pub fn adamax(learning_rate: f64) -> Optimizer {
        Optimizer::Adamax(Adamax::new(learning_rate))
    }

    pub fn ftrl(learning_rate: f64) -> Optimizer {
        Optimizer::Ftrl(Ftrl::new(learning_rate))
    }

    pub fn ada_grad_da(learning_rate: f64) -> Optimizer {
        Optimizer::AdaGradDA(AdaGradDA::new(learning_rate))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Optimizer::Sgd(_) => "sgd",
            Optimizer::Adam(_) => "adam",
            Optimizer::RmsProp(_) => "rms_prop",
            Optimizer::AdaGrad(_) => "ada_grad",
            Optimizer::AdaDelta(_) => "ada_delta",
            Optimizer::Adamax(_) => "adamax",
            Optimizer::Ftrl(_) => "ftrl",
            Optimizer::AdaGradDA(_) => "ada_grad_da",
        }
    }

    fn rule(&self) -> &dyn UpdateRule {
        match self {
            Optimizer::Sgd(o) => o,
            Optimizer::Adam(o) => o,
            Optimizer::RmsProp(o) => o,
            Optimizer::AdaGrad(o) => o,
            Optimizer::AdaDelta(o) => o,
            Optimizer::Adamax(o) => o,
            Optimizer::Ftrl(o) => o,
            Optimizer::AdaGradDA(o) => o,
        }
    }

    pub fn clip_gradient(&self) -> ClipGradient {
        match self {
            Optimizer::Sgd(o) => o.clip_gradient,
            Optimizer::Adam(o) => o.clip_gradient,
            Optimizer::RmsProp(o) => o.clip_gradient,
            Optimizer::AdaGrad(o) => o.clip_gradient,
            Optimizer::AdaDelta(o) => o.clip_gradient,
            Optimizer::Adamax(o) => o.clip_gradient,
            Optimizer::Ftrl(o) => o.clip_gradient,
            Optimizer::AdaGradDA(o) => o.clip_gradient,
        }
    }

    pub fn with_clip_gradient(mut self, clip: ClipGradient) -> Optimizer {
        match &mut self {
            Optimizer::Sgd(o) => o.clip_gradient = clip,
            Optimizer::Adam(o) => o.clip_gradient = clip,
            Optimizer::RmsProp(o) => o.clip_gradient = clip,
            Optimizer::AdaGrad(o) => o.clip_gradient = clip,
            Optimizer::AdaDelta(o) => o.clip_gradient = clip,
            Optimizer::Adamax(o) => o.clip_gradient = clip,
            Optimizer::Ftrl(o) => o.clip_gradient = clip,
            Optimizer::AdaGradDA(o) => o.clip_gradient = clip,
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.rule().validate()?;
        self.clip_gradient().validate()
    }

    /// Applies one step to every variable in `grads`.
    ///
    /// All new values are computed before anything is written; if any of them
    /// is non-finite, neither the variables nor `state` change.
    pub fn apply(
        &self,
        state: &mut OptimizerState,
        variables: &mut VariableRegistry,
        grads: Vec<(usize, Matrix)>,
    ) -> Result<()> {
        let rule = self.rule();
        let clip = self.clip_gradient();
        let iteration = state.iterations + 1;
        let mut staged = Vec::with_capacity(grads.len());

        for (id, grad) in grads {
            let variable = variables.by_id(id);
            let grad = clip.clip(grad);
            let mut params = variable.value.data.clone();
            let mut slots: Vec<Vec<f64>> = rule
                .slot_names()
                .iter()
                .enumerate()
                .map(|(i, slot)| match state.slots.get(&slot_key(&variable.name, slot)) {
                    Some(t) if t.len() == params.len() => t.data.clone(),
                    _ => vec![rule.initial_slot_value(i); params.len()],
                })
                .collect();

            rule.update(iteration, &mut params, &grad.data, &mut slots);

            if !params.iter().all(|p| p.is_finite()) {
                return Err(ModelError::NonFiniteUpdate { variable: variable.name.clone() });
            }
            staged.push((id, params, slots));
        }

        for (id, params, slots) in staged {
            let variable = variables.by_id_mut(id);
            variable.value.data = params;
            for (slot, data) in rule.slot_names().iter().zip(slots) {
                state.slots.insert(
                    slot_key(&variable.name, slot),
                    Tensor { shape: variable.shape.clone(), data },
                );
            }
        }
        state.iterations = iteration;
        Ok(())
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::Adam(Adam::default())
    }
}
