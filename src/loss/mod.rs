pub mod bce;
pub mod cross_entropy;
pub mod huber;
pub mod loss_type;
pub mod mae;
pub mod msle;
pub mod mse;

pub use loss_type::LossType;
