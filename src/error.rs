use std::path::PathBuf;

use thiserror::Error;

/// Every failure a model operation can report.
///
/// Construction errors are raised while a layer graph is assembled, usage
/// errors when the lifecycle is driven out of order, numerical errors during
/// training, and I/O errors while saving or loading.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("layer name `{0}` is used more than once")]
    DuplicateLayerName(String),
    #[error("layer `{layer}` refers to unknown inbound layer `{inbound}`")]
    UnknownInboundLayer { layer: String, inbound: String },
    #[error("layer `{0}` has no inbound layers and is not an input layer")]
    OrphanLayer(String),
    #[error("layer graph contains a cycle through {0:?}")]
    CyclicGraph(Vec<String>),
    #[error("layer `{0}` is not reachable from any model output")]
    UnreachableLayer(String),
    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),
    #[error("shape mismatch in `{layer}`: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        layer: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("variable `{0}` is registered twice")]
    DuplicateVariable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("model is not compiled, call compile() first")]
    NotCompiled,
    #[error("model is already built and cannot be compiled again")]
    AlreadyBuilt,
    #[error("model is closed")]
    ModelClosed,

    #[error("loss became {value} at epoch {epoch}, batch {batch}")]
    NonFiniteLoss { epoch: usize, batch: usize, value: f64 },
    #[error("gradient of `{variable}` is not finite")]
    NonFiniteGradient { variable: String },
    #[error("update of `{variable}` produced a non-finite value")]
    NonFiniteUpdate { variable: String },

    #[error("weight `{0}` is missing")]
    MissedWeight(String),
    #[error("weight `{name}` has shape {expected:?} in the model but {actual:?} in the source")]
    WeightShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid label for example {index}: {reason}")]
    InvalidLabel { index: usize, reason: String },

    #[error("directory {} already exists", .0.display())]
    DirectoryExists(PathBuf),
    #[error("missing file {}", .0.display())]
    MissingFile(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
