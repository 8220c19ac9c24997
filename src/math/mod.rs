pub mod initializer;
pub mod matrix;
pub mod regularizer;
pub mod tensor;

pub use initializer::Initializer;
pub use matrix::{argmax, Matrix};
pub use regularizer::Regularizer;
pub use tensor::Tensor;
