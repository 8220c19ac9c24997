use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::loss::loss_type::LossType;
use crate::metric::metrics::Metrics;
use crate::optim::optimizer::Optimizer;

/// Configuration for a `fit` run.
///
/// # Fields
/// - `epochs`:                 total number of full passes over the training data
/// - `train_batch_size`:       examples per training batch; use `1` for online SGD
/// - `validation_batch_size`:  examples per batch when evaluating the validation set
/// - `shuffle`:                visit training examples in a fresh random order
///                             every epoch (the dataset itself is not modified)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub epochs: usize,
    pub train_batch_size: usize,
    pub validation_batch_size: usize,
    pub shuffle: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            epochs: 5,
            train_batch_size: 32,
            validation_batch_size: 256,
            shuffle: false,
        }
    }
}

impl FitConfig {
    /// Creates a `FitConfig` with the default validation batch size and no shuffling.
    pub fn new(epochs: usize, train_batch_size: usize) -> Self {
        FitConfig { epochs, train_batch_size, ..FitConfig::default() }
    }

    pub fn with_validation_batch_size(mut self, validation_batch_size: usize) -> Self {
        self.validation_batch_size = validation_batch_size;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.train_batch_size == 0 || self.validation_batch_size == 0 {
            return Err(ModelError::InvalidArgument("batch sizes must be at least 1".into()));
        }
        Ok(())
    }
}

/// What `compile` records: how the model is optimized and judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileConfig {
    pub optimizer: Optimizer,
    pub loss: LossType,
    pub metric: Metrics,
    /// Adds the layers' weight penalties to the loss and its gradients.
    #[serde(default)]
    pub regularization: bool,
}

impl CompileConfig {
    pub fn new(optimizer: Optimizer, loss: LossType, metric: Metrics) -> Self {
        CompileConfig { optimizer, loss, metric, regularization: false }
    }

    pub fn with_regularization(mut self, regularization: bool) -> Self {
        self.regularization = regularization;
        self
    }
}
