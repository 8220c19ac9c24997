use std::collections::{BTreeMap, HashMap};

use rand::RngCore;

use crate::error::{ModelError, Result};
use crate::graph::kgraph::KGraph;
use crate::logging::sink::LogSink;
use crate::math::tensor::Tensor;
use crate::optim::optimizer::OptimizerState;

/// Anything weights can be loaded from, addressed by qualified variable name.
pub trait WeightSource {
    fn names(&self) -> Vec<String>;

    fn tensor(&self, name: &str) -> Option<Tensor>;
}

impl WeightSource for HashMap<String, Tensor> {
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keys().cloned().collect();
        names.sort();
        names
    }

    fn tensor(&self, name: &str) -> Option<Tensor> {
        self.get(name).cloned()
    }
}

impl WeightSource for BTreeMap<String, Tensor> {
    fn names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn tensor(&self, name: &str) -> Option<Tensor> {
        self.get(name).cloned()
    }
}

/// A copy of a model's variables, optionally with its optimizer state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightSnapshot {
    pub weights: BTreeMap<String, Tensor>,
    pub optimizer: Option<OptimizerState>,
}

impl WeightSnapshot {
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.weights.get(name)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl WeightSource for WeightSnapshot {
    fn names(&self) -> Vec<String> {
        self.weights.names()
    }

    fn tensor(&self, name: &str) -> Option<Tensor> {
        self.weights.tensor(name)
    }
}

/// What to do with a weight present on only one side of a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissedWeightsStrategy {
    /// Leave the variable as it is.
    Skip,
    /// Run the variable's initializer again.
    Initialize,
    /// Reject the whole load.
    #[default]
    Fail,
}

/// Copies every weight of `source` into `graph` by qualified name.
///
/// Shapes are checked for every shared name before anything is written. A
/// variable the source lacks, or a source weight the graph lacks, is a
/// missed weight and handled by `strategy`.
pub(crate) fn load_into(
    graph: &mut KGraph,
    source: &dyn WeightSource,
    strategy: MissedWeightsStrategy,
    rng: &mut dyn RngCore,
    sink: &dyn LogSink,
) -> Result<()> {
    let mut assignments = Vec::new();
    let mut missing = Vec::new();
    for variable in graph.variables().iter() {
        match source.tensor(&variable.name) {
            Some(tensor) if tensor.shape != variable.shape => {
                return Err(ModelError::WeightShapeMismatch {
                    name: variable.name.clone(),
                    expected: variable.shape.clone(),
                    actual: tensor.shape,
                });
            }
            Some(tensor) => assignments.push((variable.name.clone(), tensor)),
            None => missing.push(variable.name.clone()),
        }
    }
    let unknown: Vec<String> = source
        .names()
        .into_iter()
        .filter(|name| graph.variables().id(name).is_none())
        .collect();

    if strategy == MissedWeightsStrategy::Fail {
        if let Some(name) = missing.first().or(unknown.first()) {
            return Err(ModelError::MissedWeight(name.clone()));
        }
    }

    for (name, tensor) in &assignments {
        graph.variables_mut().assign(name, tensor)?;
    }
    for name in &missing {
        if let (MissedWeightsStrategy::Initialize, Some(id)) = (strategy, graph.variables().id(name)) {
            graph.variables_mut().by_id_mut(id).initialize(rng);
            sink.warn(&format!("Weight `{name}` not found in the source, initialized"));
        } else {
            sink.warn(&format!("Weight `{name}` not found in the source, skipped"));
        }
    }
    for name in &unknown {
        sink.warn(&format!("Weight `{name}` has no variable in the model, skipped"));
    }
    sink.debug(&format!("Loaded {} of {} variables", assignments.len(), graph.variables().len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use crate::graph::kgraph::GraphPlan;
    use crate::graph::topology::assemble;
    use crate::layers::layer::Layer;
    use crate::logging::sink::MemorySink;
    use rand::{rngs::StdRng, SeedableRng};

    fn graph() -> KGraph {
        let layers = vec![
            Layer::input("in", &[2]),
            Layer::dense("d", 3, ActivationFunction::ReLU).with_inbound(&["in"]),
        ];
        let topology = assemble(&layers, &["d".to_string()]).unwrap();
        KGraph::build(GraphPlan::new(topology).unwrap()).unwrap()
    }

    fn kernel(value: f64) -> Tensor {
        Tensor::new(vec![2, 3], vec![value; 6]).unwrap()
    }

    #[test]
    fn strict_load_reports_the_missing_name() {
        let mut g = graph();
        let mut source = HashMap::new();
        source.insert("d_dense_kernel".to_string(), kernel(1.0));
        let result = load_into(&mut g, &source, MissedWeightsStrategy::Fail, &mut StdRng::seed_from_u64(0), &MemorySink::new());
        assert!(matches!(result, Err(ModelError::MissedWeight(name)) if name == "d_dense_bias"));
        assert_eq!(g.variables().get("d_dense_kernel").unwrap().value.data, vec![0.0; 6]);
    }

    #[test]
    fn skip_and_initialize_strategies() {
        let sink = MemorySink::new();
        let mut source = BTreeMap::new();
        source.insert("d_dense_kernel".to_string(), kernel(2.0));
        source.insert("ghost".to_string(), Tensor::new(vec![1], vec![0.0]).unwrap());

        let mut g = graph();
        load_into(&mut g, &source, MissedWeightsStrategy::Skip, &mut StdRng::seed_from_u64(0), &sink).unwrap();
        assert_eq!(g.variables().get("d_dense_kernel").unwrap().value.data, vec![2.0; 6]);
        assert!(sink.contains("d_dense_bias"));
        assert!(sink.contains("ghost"));

        let mut g = graph();
        g.variables_mut().assign("d_dense_bias", &Tensor::new(vec![3], vec![5.0; 3]).unwrap()).unwrap();
        load_into(&mut g, &source, MissedWeightsStrategy::Initialize, &mut StdRng::seed_from_u64(0), &sink).unwrap();
        assert_eq!(g.variables().get("d_dense_bias").unwrap().value.data, vec![0.0; 3]);
    }

    #[test]
    fn shape_mismatch_is_always_an_error() {
        let mut g = graph();
        let mut source = HashMap::new();
        source.insert("d_dense_kernel".to_string(), Tensor::new(vec![3, 2], vec![0.0; 6]).unwrap());
        let result = load_into(&mut g, &source, MissedWeightsStrategy::Skip, &mut StdRng::seed_from_u64(0), &MemorySink::new());
        assert!(matches!(result, Err(ModelError::WeightShapeMismatch { .. })));
    }
}
