use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::graph::kgraph::KGraph;
use crate::math::tensor::Tensor;
use crate::train::epoch_stats::EpochStats;
use crate::train::history::{BatchEvent, BatchTrainingEvent, EpochTrainingEvent, EvaluationHistory, TrainingHistory};
use crate::train::train_config::FitConfig;

/// What the training loop should do after a callback has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Read and write access to a model's variables from inside a callback.
pub trait WeightAccess {
    /// Current value of every variable by qualified name.
    fn snapshot(&self) -> BTreeMap<String, Tensor>;

    /// Writes back every variable in `weights`.
    fn restore(&mut self, weights: &BTreeMap<String, Tensor>) -> Result<()>;
}

impl WeightAccess for KGraph {
    fn snapshot(&self) -> BTreeMap<String, Tensor> {
        KGraph::snapshot(self)
    }

    fn restore(&mut self, weights: &BTreeMap<String, Tensor>) -> Result<()> {
        for (name, tensor) in weights {
            self.variables_mut().assign(name, tensor)?;
        }
        Ok(())
    }
}

/// Hooks into training, evaluation and batched prediction. Every method has
/// a no-op default.
///
/// The validation pass run by `fit` after each epoch is an evaluation, so
/// the test hooks fire there too.
pub trait Callback {
    fn on_train_begin(&mut self, _config: &FitConfig) {}

    /// Returning `Stop` ends training before the epoch runs.
    fn on_epoch_begin(&mut self, _epoch_index: usize) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_train_batch_begin(&mut self, _batch_index: usize, _batch_size: usize) {}

    fn on_train_batch_end(&mut self, _event: &BatchTrainingEvent) {}

    /// Returning `Stop` ends training after this epoch.
    fn on_epoch_end(
        &mut self,
        _event: &EpochTrainingEvent,
        _weights: &mut dyn WeightAccess,
    ) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    fn on_train_end(&mut self, _history: &TrainingHistory, _weights: &mut dyn WeightAccess) -> Result<()> {
        Ok(())
    }

    fn on_test_begin(&mut self) {}

    fn on_test_batch_begin(&mut self, _batch_index: usize, _batch_size: usize) {}

    fn on_test_batch_end(&mut self, _event: &BatchEvent) {}

    fn on_test_end(&mut self, _history: &EvaluationHistory) {}

    fn on_predict_begin(&mut self) {}

    fn on_predict_batch_begin(&mut self, _batch_index: usize, _batch_size: usize) {}

    fn on_predict_batch_end(&mut self, _batch_index: usize, _batch_size: usize) {}

    fn on_predict_end(&mut self) {}
}

/// Stops training once the shared flag is set, checked at both ends of
/// every epoch.
#[derive(Debug, Clone)]
pub struct StopFlag {
    flag: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new(flag: Arc<AtomicBool>) -> StopFlag {
        StopFlag { flag }
    }

    fn action(&self) -> CallbackAction {
        if self.flag.load(Ordering::Relaxed) {
            CallbackAction::Stop
        } else {
            CallbackAction::Continue
        }
    }
}

impl Callback for StopFlag {
    fn on_epoch_begin(&mut self, _epoch_index: usize) -> CallbackAction {
        self.action()
    }

    fn on_epoch_end(
        &mut self,
        _event: &EpochTrainingEvent,
        _weights: &mut dyn WeightAccess,
    ) -> Result<CallbackAction> {
        Ok(self.action())
    }
}

/// Sends an `EpochStats` after every epoch. Training stops when the
/// receiver has been dropped.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Sender<EpochStats>,
    total_epochs: usize,
    epoch_start: Option<Instant>,
}

impl ProgressReporter {
    pub fn new(tx: Sender<EpochStats>) -> ProgressReporter {
        ProgressReporter { tx, total_epochs: 0, epoch_start: None }
    }
}

impl Callback for ProgressReporter {
    fn on_train_begin(&mut self, config: &FitConfig) {
        self.total_epochs = config.epochs;
    }

    fn on_epoch_begin(&mut self, _epoch_index: usize) -> CallbackAction {
        self.epoch_start = Some(Instant::now());
        CallbackAction::Continue
    }

    fn on_epoch_end(
        &mut self,
        event: &EpochTrainingEvent,
        _weights: &mut dyn WeightAccess,
    ) -> Result<CallbackAction> {
        let elapsed_ms = self.epoch_start.map_or(0, |t| t.elapsed().as_millis() as u64);
        let stats = EpochStats {
            epoch: event.epoch_index + 1,
            total_epochs: self.total_epochs,
            train_loss: event.loss_value,
            val_loss: event.val_loss_value,
            train_metric: event.metric_value,
            val_metric: event.val_metric_value,
            elapsed_ms,
        };
        if self.tx.send(stats).is_err() {
            return Ok(CallbackAction::Stop);
        }
        Ok(CallbackAction::Continue)
    }
}
