pub mod batch_norm;
pub mod dense;
pub mod dropout;
pub mod layer;
pub(crate) mod merge;

pub use batch_norm::BatchNorm;
pub use dense::Dense;
pub use dropout::Dropout;
pub use layer::{Layer, LayerKind, ParamSpec};
