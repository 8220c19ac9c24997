use rand::RngCore;
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{ModelError, Result};
use crate::graph::context::ExecutionContext;
use crate::layers::batch_norm::BatchNorm;
use crate::layers::dense::Dense;
use crate::layers::dropout::Dropout;
use crate::layers::merge;
use crate::math::initializer::Initializer;
use crate::math::matrix::Matrix;
use crate::math::regularizer::Regularizer;

/// One node of a model's layer graph.
///
/// `inbound` lists the names of the layers feeding this one, in order. An
/// input layer has none; merge layers have two or more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(default)]
    pub inbound: Vec<String>,
    #[serde(default = "default_trainable")]
    pub trainable: bool,
    pub kind: LayerKind,
}

fn default_trainable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    Input { shape: Vec<usize> },
    Flatten,
    Activation { activation: ActivationFunction },
    Dense(Dense),
    Dropout(Dropout),
    BatchNorm(BatchNorm),
    Add,
    Concatenate,
}

/// Declares one variable a layer owns.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Suffix of the qualified variable name, e.g. `dense_kernel`.
    pub role: &'static str,
    pub shape: Vec<usize>,
    pub initializer: Initializer,
    pub regularizer: Option<Regularizer>,
    /// False for statistics updated outside the optimizer.
    pub trainable: bool,
    pub fan_in: usize,
    pub fan_out: usize,
}

impl ParamSpec {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn qualified_name(&self, layer_name: &str) -> String {
        format!("{layer_name}_{}", self.role)
    }
}

/// State a layer keeps between its forward and backward pass over a batch.
#[derive(Debug, Clone, Default)]
pub enum LayerCache {
    #[default]
    Empty,
    PreActivation(Matrix),
    DropoutMask(Matrix),
    BatchNorm { x_hat: Matrix, inv_std: Matrix },
}

pub struct LayerOutput {
    pub output: Matrix,
    pub cache: LayerCache,
    /// New values for non-trainable parameters, by parameter index.
    /// Only applied once the whole training step succeeded.
    pub updates: Vec<(usize, Matrix)>,
}

impl LayerOutput {
    pub fn plain(output: Matrix) -> LayerOutput {
        LayerOutput { output, cache: LayerCache::Empty, updates: Vec::new() }
    }
}

pub struct LayerGradients {
    /// One gradient per inbound tensor.
    pub inputs: Vec<Matrix>,
    /// One entry per parameter, `None` for parameters without a gradient.
    pub params: Vec<Option<Matrix>>,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Layer {
        Layer {
            name: name.into(),
            inbound: Vec::new(),
            trainable: true,
            kind,
        }
    }

    pub fn input(name: impl Into<String>, shape: &[usize]) -> Layer {
        Layer::new(name, LayerKind::Input { shape: shape.to_vec() })
    }

    pub fn dense(name: impl Into<String>, units: usize, activation: ActivationFunction) -> Layer {
        Layer::new(name, LayerKind::Dense(Dense::new(units, activation)))
    }

    pub fn flatten(name: impl Into<String>) -> Layer {
        Layer::new(name, LayerKind::Flatten)
    }

    pub fn activation(name: impl Into<String>, activation: ActivationFunction) -> Layer {
        Layer::new(name, LayerKind::Activation { activation })
    }

    pub fn dropout(name: impl Into<String>, rate: f64) -> Layer {
        Layer::new(name, LayerKind::Dropout(Dropout::new(rate)))
    }

    pub fn batch_norm(name: impl Into<String>) -> Layer {
        Layer::new(name, LayerKind::BatchNorm(BatchNorm::default()))
    }

    pub fn add(name: impl Into<String>, inbound: &[&str]) -> Layer {
        Layer::new(name, LayerKind::Add).with_inbound(inbound)
    }

    pub fn concatenate(name: impl Into<String>, inbound: &[&str]) -> Layer {
        Layer::new(name, LayerKind::Concatenate).with_inbound(inbound)
    }

    pub fn with_inbound(mut self, inbound: &[&str]) -> Layer {
        self.inbound = inbound.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Excludes every parameter of this layer from optimizer updates.
    pub fn frozen(mut self) -> Layer {
        self.trainable = false;
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            LayerKind::Input { .. } => "input",
            LayerKind::Flatten => "flatten",
            LayerKind::Activation { .. } => "activation",
            LayerKind::Dense(_) => "dense",
            LayerKind::Dropout(_) => "dropout",
            LayerKind::BatchNorm(_) => "batch_norm",
            LayerKind::Add => "add",
            LayerKind::Concatenate => "concatenate",
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self.kind, LayerKind::Input { .. })
    }

    /// Infers this layer's output shape (batch axis excluded) from the
    /// shapes of its inbound layers.
    pub fn compute_output_shape(&self, inputs: &[Vec<usize>]) -> Result<Vec<usize>> {
        match &self.kind {
            LayerKind::Input { shape } => {
                if shape.is_empty() || shape.contains(&0) {
                    return Err(ModelError::InvalidArchitecture(format!(
                        "input layer `{}` has invalid shape {shape:?}",
                        self.name
                    )));
                }
                Ok(shape.clone())
            }
            LayerKind::Add => {
                self.merge_inputs(inputs)?;
                merge::add_output_shape(&self.name, inputs)
            }
            LayerKind::Concatenate => {
                self.merge_inputs(inputs)?;
                merge::concatenate_output_shape(&self.name, inputs)
            }
            LayerKind::Flatten => Ok(vec![self.single_input(inputs)?.iter().product()]),
            LayerKind::Activation { .. } => Ok(self.single_input(inputs)?.clone()),
            LayerKind::Dense(dense) => dense.output_shape(&self.name, self.single_input(inputs)?),
            LayerKind::Dropout(dropout) => {
                dropout.output_shape(&self.name, self.single_input(inputs)?)
            }
            LayerKind::BatchNorm(bn) => bn.output_shape(&self.name, self.single_input(inputs)?),
        }
    }

    fn merge_inputs(&self, inputs: &[Vec<usize>]) -> Result<()> {
        if inputs.len() < 2 {
            return Err(ModelError::InvalidArchitecture(format!(
                "merge layer `{}` needs at least two inbound layers, got {}",
                self.name,
                inputs.len()
            )));
        }
        Ok(())
    }

    fn single_input<'a>(&self, inputs: &'a [Vec<usize>]) -> Result<&'a Vec<usize>> {
        match inputs {
            [single] => Ok(single),
            _ => Err(ModelError::InvalidArchitecture(format!(
                "layer `{}` expects exactly one inbound layer, got {}",
                self.name,
                inputs.len()
            ))),
        }
    }

    /// Variables this layer owns, given already-validated input shapes.
    pub fn params(&self, inputs: &[Vec<usize>]) -> Vec<ParamSpec> {
        match (&self.kind, inputs.first()) {
            (LayerKind::Dense(dense), Some(input)) => dense.params(input),
            (LayerKind::BatchNorm(bn), Some(input)) => bn.params(input),
            _ => Vec::new(),
        }
    }

    pub fn param_count(&self, inputs: &[Vec<usize>]) -> usize {
        self.params(inputs).iter().map(ParamSpec::len).sum()
    }

    /// Runs the layer on a batch. `params` follows the order of `params()`.
    pub fn forward(
        &self,
        inputs: &[&Matrix],
        params: &[&Matrix],
        ctx: &ExecutionContext,
        rng: &mut dyn RngCore,
    ) -> LayerOutput {
        match &self.kind {
            LayerKind::Input { .. } | LayerKind::Flatten => LayerOutput::plain(inputs[0].clone()),
            LayerKind::Activation { activation } => {
                LayerOutput::plain(activation.apply(inputs[0]))
            }
            LayerKind::Dense(dense) => dense.forward(inputs[0], params),
            LayerKind::Dropout(dropout) => dropout.forward(inputs[0], ctx, rng),
            LayerKind::BatchNorm(bn) => bn.forward(inputs[0], params, ctx),
            LayerKind::Add => LayerOutput::plain(merge::add_forward(inputs)),
            LayerKind::Concatenate => LayerOutput::plain(Matrix::hstack(inputs)),
        }
    }

    /// Propagates `grad` (w.r.t. this layer's output) to its inputs and
    /// parameters.
    pub fn backward(
        &self,
        inputs: &[&Matrix],
        params: &[&Matrix],
        output: &Matrix,
        cache: &LayerCache,
        grad: &Matrix,
    ) -> LayerGradients {
        match &self.kind {
            LayerKind::Input { .. } | LayerKind::Flatten => pass_through(grad),
            LayerKind::Activation { activation } => {
                pass_through(&activation.backward(inputs[0], output, grad))
            }
            LayerKind::Dense(dense) => dense.backward(inputs[0], params, output, cache, grad),
            LayerKind::Dropout(dropout) => dropout.backward(cache, grad),
            LayerKind::BatchNorm(bn) => bn.backward(params, cache, grad),
            LayerKind::Add => LayerGradients {
                inputs: vec![grad.clone(); inputs.len()],
                params: Vec::new(),
            },
            LayerKind::Concatenate => merge::concatenate_backward(inputs, grad),
        }
    }
}

fn pass_through(grad: &Matrix) -> LayerGradients {
    LayerGradients { inputs: vec![grad.clone()], params: Vec::new() }
}
