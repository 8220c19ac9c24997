pub mod callback;
pub mod early_stopping;
pub mod epoch_stats;
pub mod evaluation;
pub mod history;
pub mod loop_fn;
pub mod train_config;

pub use callback::{Callback, CallbackAction, ProgressReporter, StopFlag, WeightAccess};
pub use early_stopping::{EarlyStopping, Mode, Monitor};
pub use epoch_stats::EpochStats;
pub use evaluation::EvaluationResult;
pub use history::{BatchEvent, BatchTrainingEvent, EpochTrainingEvent, EvaluationHistory, TrainingHistory};
pub use train_config::{CompileConfig, FitConfig};
