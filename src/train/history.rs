use serde::{Serialize, Deserialize};

use crate::metric::metrics::Metrics;

/// Outcome of one training batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTrainingEvent {
    /// 0-based epoch number.
    pub epoch_index: usize,
    /// 0-based batch number within the epoch.
    pub batch_index: usize,
    pub loss_value: f64,
    pub metric_value: f64,
    /// Number of examples actually in the batch; the last batch of an epoch
    /// may be short.
    pub batch_size: usize,
}

/// Outcome of one epoch. Loss and metric are the means of the epoch's batch
/// values weighted by batch size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochTrainingEvent {
    pub epoch_index: usize,
    pub loss_value: f64,
    pub metric_value: f64,
    pub val_loss_value: Option<f64>,
    pub val_metric_value: Option<f64>,
}

/// Everything recorded during one `fit` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    batch_history: Vec<BatchTrainingEvent>,
    epoch_history: Vec<EpochTrainingEvent>,
}

impl TrainingHistory {
    pub(crate) fn append_batch(&mut self, event: BatchTrainingEvent) {
        self.batch_history.push(event);
    }

    pub(crate) fn append_epoch(&mut self, event: EpochTrainingEvent) {
        self.epoch_history.push(event);
    }

    pub fn batch_history(&self) -> &[BatchTrainingEvent] {
        &self.batch_history
    }

    pub fn epoch_history(&self) -> &[EpochTrainingEvent] {
        &self.epoch_history
    }

    pub fn last_batch_event(&self) -> Option<&BatchTrainingEvent> {
        self.batch_history.last()
    }

    pub fn last_epoch_event(&self) -> Option<&EpochTrainingEvent> {
        self.epoch_history.last()
    }

    pub fn events_by_epoch(&self, epoch_index: usize) -> impl Iterator<Item = &BatchTrainingEvent> {
        self.batch_history.iter().filter(move |e| e.epoch_index == epoch_index)
    }

    pub fn epoch_losses(&self) -> Vec<f64> {
        self.epoch_history.iter().map(|e| e.loss_value).collect()
    }
}

/// Outcome of one evaluation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvent {
    pub batch_index: usize,
    pub loss_value: f64,
    /// One value per requested metric, in request order.
    pub metric_values: Vec<(Metrics, f64)>,
    pub batch_size: usize,
}

/// Batches recorded during one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationHistory {
    batch_history: Vec<BatchEvent>,
}

impl EvaluationHistory {
    pub(crate) fn append_batch(&mut self, event: BatchEvent) {
        self.batch_history.push(event);
    }

    pub fn batch_history(&self) -> &[BatchEvent] {
        &self.batch_history
    }

    pub fn last_batch_event(&self) -> Option<&BatchEvent> {
        self.batch_history.last()
    }
}
