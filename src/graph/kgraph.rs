use std::collections::{BTreeMap, HashSet};

use rand::RngCore;

use crate::error::{ModelError, Result};
use crate::graph::context::ExecutionContext;
use crate::graph::topology::Topology;
use crate::graph::variable::VariableRegistry;
use crate::layers::layer::{LayerCache, ParamSpec};
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor;

/// A topology with every shape inferred and every variable declared, but no
/// storage allocated yet. Creating a plan is how a model fails fast on shape
/// errors before anything runs.
#[derive(Debug, Clone)]
pub struct GraphPlan {
    pub topology: Topology,
    pub input_shapes: Vec<Vec<Vec<usize>>>,
    pub output_shapes: Vec<Vec<usize>>,
    pub params: Vec<Vec<ParamSpec>>,
}

impl GraphPlan {
    pub fn new(topology: Topology) -> Result<GraphPlan> {
        let n = topology.layers.len();
        let mut output_shapes: Vec<Vec<usize>> = Vec::with_capacity(n);
        let mut input_shapes = Vec::with_capacity(n);
        let mut params = Vec::with_capacity(n);
        let mut names = HashSet::new();

        for (layer, inbound) in topology.layers.iter().zip(&topology.inbound) {
            let inputs: Vec<Vec<usize>> = inbound.iter().map(|&p| output_shapes[p].clone()).collect();
            let shape = layer.compute_output_shape(&inputs)?;
            let specs = layer.params(&inputs);
            for spec in &specs {
                let name = spec.qualified_name(&layer.name);
                if !names.insert(name.clone()) {
                    return Err(ModelError::DuplicateVariable(name));
                }
            }
            output_shapes.push(shape);
            input_shapes.push(inputs);
            params.push(specs);
        }

        Ok(GraphPlan { topology, input_shapes, output_shapes, params })
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.output_shapes[self.topology.input]
    }

    /// Shape of the primary (first declared) output.
    pub fn output_shape(&self) -> &[usize] {
        &self.output_shapes[self.topology.outputs[0]]
    }

    pub fn input_width(&self) -> usize {
        self.input_shape().iter().product()
    }

    pub fn output_width(&self) -> usize {
        self.output_shape().iter().product()
    }
}

/// Result of one forward pass: every node's output plus what the backward
/// pass and the post-step commit need.
#[derive(Debug)]
pub struct ForwardTrace {
    outputs: Vec<Matrix>,
    caches: Vec<LayerCache>,
    updates: Vec<(usize, Matrix)>,
}

impl ForwardTrace {
    pub fn node_output(&self, node: usize) -> &Matrix {
        &self.outputs[node]
    }

    /// Moving-statistic updates proposed during a training pass, by variable id.
    /// Frozen layers propose none.
    pub fn take_updates(&mut self) -> Vec<(usize, Matrix)> {
        std::mem::take(&mut self.updates)
    }
}

/// The executable graph: a plan plus allocated variables.
#[derive(Debug, Clone)]
pub struct KGraph {
    plan: GraphPlan,
    variables: VariableRegistry,
    node_vars: Vec<Vec<usize>>,
}

impl KGraph {
    /// Allocates every variable of `plan`. Values stay zero until
    /// `initialize` runs.
    pub fn build(plan: GraphPlan) -> Result<KGraph> {
        let mut variables = VariableRegistry::default();
        let mut node_vars = Vec::with_capacity(plan.params.len());
        for (layer, specs) in plan.topology.layers.iter().zip(&plan.params) {
            let mut ids = Vec::with_capacity(specs.len());
            for spec in specs {
                ids.push(variables.register(spec.qualified_name(&layer.name), spec, layer.trainable)?);
            }
            node_vars.push(ids);
        }
        Ok(KGraph { plan, variables, node_vars })
    }

    pub fn plan(&self) -> &GraphPlan {
        &self.plan
    }

    pub fn variables(&self) -> &VariableRegistry {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableRegistry {
        &mut self.variables
    }

    /// Runs every variable initializer in registration order.
    pub fn initialize(&mut self, rng: &mut dyn RngCore) {
        for variable in self.variables.iter_mut() {
            variable.initialize(rng);
        }
    }

    pub fn forward(&self, input: &Matrix, ctx: &ExecutionContext, rng: &mut dyn RngCore) -> Result<ForwardTrace> {
        let topology = &self.plan.topology;
        if input.cols != self.plan.input_width() {
            return Err(ModelError::ShapeMismatch {
                layer: topology.layers[topology.input].name.clone(),
                expected: self.plan.input_shape().to_vec(),
                actual: vec![input.cols],
            });
        }

        let n = topology.layers.len();
        let mut outputs: Vec<Matrix> = Vec::with_capacity(n);
        let mut caches = Vec::with_capacity(n);
        let mut updates = Vec::new();

        for (i, layer) in topology.layers.iter().enumerate() {
            if i == topology.input {
                outputs.push(input.clone());
                caches.push(LayerCache::Empty);
                continue;
            }
            let inputs: Vec<&Matrix> = topology.inbound[i].iter().map(|&p| &outputs[p]).collect();
            let params = self.params_of(i);
            let result = layer.forward(&inputs, &params, ctx, rng);
            if layer.trainable {
                updates.extend(result.updates.into_iter().map(|(k, value)| (self.node_vars[i][k], value)));
            }
            outputs.push(result.output);
            caches.push(result.cache);
        }

        Ok(ForwardTrace { outputs, caches, updates })
    }

    pub fn output<'t>(&self, trace: &'t ForwardTrace, index: usize) -> &'t Matrix {
        trace.node_output(self.plan.topology.outputs[index])
    }

    pub fn primary_output<'t>(&self, trace: &'t ForwardTrace) -> &'t Matrix {
        self.output(trace, 0)
    }

    /// Walks the graph in reverse order starting from `grad_output` (the loss
    /// gradient w.r.t. the primary output). Returns one gradient per trainable
    /// variable; gradients meeting at a fan-out point are summed.
    pub fn backward(&self, trace: &ForwardTrace, grad_output: &Matrix, regularize: bool) -> Vec<(usize, Matrix)> {
        let topology = &self.plan.topology;
        let mut node_grads: Vec<Option<Matrix>> = vec![None; topology.layers.len()];
        node_grads[topology.outputs[0]] = Some(grad_output.clone());
        let mut var_grads: Vec<Option<Matrix>> = vec![None; self.variables.len()];

        for i in (0..topology.layers.len()).rev() {
            let Some(grad) = node_grads[i].take() else {
                continue;
            };
            if i == topology.input {
                continue;
            }

            let inbound = &topology.inbound[i];
            let inputs: Vec<&Matrix> = inbound.iter().map(|&p| &trace.outputs[p]).collect();
            let params = self.params_of(i);
            let grads = topology.layers[i].backward(&inputs, &params, &trace.outputs[i], &trace.caches[i], &grad);

            for (&p, g) in inbound.iter().zip(grads.inputs) {
                node_grads[p] = Some(match node_grads[p].take() {
                    Some(acc) => &acc + &g,
                    None => g,
                });
            }
            for (&var, g) in self.node_vars[i].iter().zip(grads.params) {
                if let Some(g) = g {
                    var_grads[var] = Some(g);
                }
            }
        }

        let mut result = Vec::new();
        for (id, grad) in var_grads.into_iter().enumerate() {
            let variable = self.variables.by_id(id);
            if !variable.trainable {
                continue;
            }
            let mut grad = grad.unwrap_or_else(|| Matrix::zeros(variable.value.rows, variable.value.cols));
            if regularize {
                if let Some(reg) = &variable.regularizer {
                    grad = &grad + &reg.gradient(&variable.value);
                }
            }
            result.push((id, grad));
        }
        result
    }

    /// Sum of all variable penalties.
    pub fn regularization_loss(&self) -> f64 {
        self.variables
            .iter()
            .filter_map(|v| v.regularizer.map(|r| r.penalty(&v.value)))
            .sum()
    }

    /// Fails with `NonFiniteUpdate` if any proposed moving statistic is
    /// NaN or infinite.
    pub fn check_updates(&self, updates: &[(usize, Matrix)]) -> Result<()> {
        match updates.iter().find(|(_, value)| !value.is_finite()) {
            Some((id, _)) => Err(ModelError::NonFiniteUpdate { variable: self.variables.by_id(*id).name.clone() }),
            None => Ok(()),
        }
    }

    /// Applies moving-statistic updates collected from a training pass.
    /// Nothing is written if any value is non-finite.
    pub fn commit_updates(&mut self, updates: Vec<(usize, Matrix)>) -> Result<()> {
        self.check_updates(&updates)?;
        for (id, value) in updates {
            self.variables.by_id_mut(id).value = value;
        }
        Ok(())
    }

    /// Current value of every variable by qualified name.
    pub fn snapshot(&self) -> BTreeMap<String, Tensor> {
        self.variables.iter().map(|v| (v.name.clone(), v.to_tensor())).collect()
    }

    fn params_of(&self, node: usize) -> Vec<&Matrix> {
        self.node_vars[node].iter().map(|&id| &self.variables.by_id(id).value).collect()
    }
}
