use serde::{Serialize, Deserialize};

/// Per-epoch progress snapshot sent by `ProgressReporter`.
///
/// Receivers use this to drive real-time charts and progress indicators
/// without access to the model itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Weighted mean training loss of this epoch.
    pub train_loss: f64,
    /// Mean validation loss, if a validation set was provided.
    pub val_loss: Option<f64>,
    pub train_metric: f64,
    pub val_metric: Option<f64>,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
