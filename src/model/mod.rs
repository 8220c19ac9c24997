pub mod functional;
pub mod model;
pub mod saved;
pub mod sequential;
pub mod state;
pub mod summary;
pub mod weights;

pub use functional::FunctionalBuilder;
pub use model::{GraphModel, ModelOptions};
pub use saved::{ModelKind, ModelSpec, WritingMode};
pub use sequential::SequentialBuilder;
pub use state::ModelState;
pub use summary::{LayerSummary, ModelSummary};
pub use weights::{MissedWeightsStrategy, WeightSnapshot, WeightSource};
