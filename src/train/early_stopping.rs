use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::math::tensor::Tensor;
use crate::train::callback::{Callback, CallbackAction, WeightAccess};
use crate::train::history::EpochTrainingEvent;
use crate::train::train_config::FitConfig;

/// Quantity watched by `EarlyStopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    Loss,
    Metric,
    ValLoss,
    ValMetric,
}

impl Monitor {
    fn read(&self, event: &EpochTrainingEvent) -> Option<f64> {
        match self {
            Monitor::Loss => Some(event.loss_value),
            Monitor::Metric => Some(event.metric_value),
            Monitor::ValLoss => event.val_loss_value,
            Monitor::ValMetric => event.val_metric_value,
        }
    }
}

/// Whether the monitored quantity should go down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Min,
    Max,
}

/// Stops training once the monitored quantity has not improved for
/// `patience` epochs.
///
/// An epoch improves when the value beats the best so far by more than
/// `min_delta`. Epochs that do not report the monitored value (e.g.
/// `ValLoss` without a validation set) are ignored.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    pub monitor: Monitor,
    pub mode: Mode,
    pub min_delta: f64,
    pub patience: usize,
    /// Value the model must beat before any epoch counts as an improvement.
    pub baseline: Option<f64>,
    /// Puts the best snapshot back when stopping.
    pub restore_best_weights: bool,
    wait: usize,
    best: f64,
    best_weights: Option<BTreeMap<String, Tensor>>,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(monitor: Monitor, mode: Mode, patience: usize) -> EarlyStopping {
        EarlyStopping {
            monitor,
            mode,
            min_delta: 0.0,
            patience,
            baseline: None,
            restore_best_weights: false,
            wait: 0,
            best: f64::NAN,
            best_weights: None,
            stopped_epoch: None,
        }
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta.abs();
        self
    }

    pub fn with_baseline(mut self, baseline: f64) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn with_restore_best_weights(mut self, restore: bool) -> Self {
        self.restore_best_weights = restore;
        self
    }

    /// Epoch at which this callback stopped training, if it did.
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    fn improves(&self, current: f64) -> bool {
        match self.mode {
            Mode::Min => current < self.best - self.min_delta,
            Mode::Max => current > self.best + self.min_delta,
        }
    }
}

impl Callback for EarlyStopping {
    fn on_train_begin(&mut self, _config: &FitConfig) {
        self.wait = 0;
        self.stopped_epoch = None;
        self.best_weights = None;
        self.best = self.baseline.unwrap_or(match self.mode {
            Mode::Min => f64::INFINITY,
            Mode::Max => f64::NEG_INFINITY,
        });
    }

    fn on_epoch_end(
        &mut self,
        event: &EpochTrainingEvent,
        weights: &mut dyn WeightAccess,
    ) -> Result<CallbackAction> {
        let Some(current) = self.monitor.read(event) else {
            return Ok(CallbackAction::Continue);
        };

        if self.improves(current) {
            self.best = current;
            self.wait = 0;
            if self.restore_best_weights {
                self.best_weights = Some(weights.snapshot());
            }
            return Ok(CallbackAction::Continue);
        }

        self.wait += 1;
        if self.wait < self.patience {
            return Ok(CallbackAction::Continue);
        }
        self.stopped_epoch = Some(event.epoch_index);
        if let Some(best) = &self.best_weights {
            weights.restore(best)?;
        }
        Ok(CallbackAction::Stop)
    }
}
