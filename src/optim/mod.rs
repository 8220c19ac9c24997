pub mod adadelta;
pub mod adagrad;
pub mod adagrad_da;
pub mod adam;
pub mod adamax;
pub mod clip;
pub mod ftrl;
pub mod optimizer;
pub mod rmsprop;
pub mod sgd;

pub use adadelta::AdaDelta;
pub use adagrad::AdaGrad;
pub use adagrad_da::AdaGradDA;
pub use adam::Adam;
pub use adamax::Adamax;
pub use clip::ClipGradient;
pub use ftrl::Ftrl;
pub use optimizer::{Optimizer, OptimizerState, UpdateRule};
pub use rmsprop::RmsProp;
pub use sgd::Sgd;
