pub mod context;
pub mod kgraph;
pub mod topology;
pub mod variable;

pub use context::ExecutionContext;
pub use kgraph::{ForwardTrace, GraphPlan, KGraph};
pub use topology::{assemble, Topology};
pub use variable::{Variable, VariableRegistry};
