pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod graph;
pub mod loss;
pub mod metric;
pub mod optim;
pub mod dataset;
pub mod logging;
pub mod train;
pub mod model;

// Convenience re-exports
pub use error::{ModelError, Result};
pub use math::matrix::Matrix;
pub use math::tensor::Tensor;
pub use math::initializer::Initializer;
pub use math::regularizer::Regularizer;
pub use activation::activation::ActivationFunction;
pub use layers::layer::Layer;
pub use loss::loss_type::LossType;
pub use metric::metrics::Metrics;
pub use optim::optimizer::Optimizer;
pub use optim::clip::ClipGradient;
pub use dataset::dataset::{Dataset, OnHeapDataset};
pub use logging::sink::{LogCrateSink, LogSink, MemorySink, NullSink};
pub use train::{Callback, CallbackAction, EarlyStopping, EvaluationResult, FitConfig, TrainingHistory};
pub use model::{
    FunctionalBuilder, GraphModel, MissedWeightsStrategy, ModelOptions, ModelState, SequentialBuilder,
    WeightSnapshot, WritingMode,
};
