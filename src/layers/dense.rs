use serde::{Serialize, Deserialize};

use crate::{activation::activation::ActivationFunction, math::matrix::Matrix};
use crate::error::{ModelError, Result};
use crate::layers::layer::{LayerCache, LayerGradients, LayerOutput, ParamSpec};
use crate::math::initializer::Initializer;
use crate::math::regularizer::Regularizer;

/// Fully connected layer: `a = activation(x · W + b)`.
///
/// The kernel `W` has shape `[input, units]`, the bias `b` shape `[units]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub units: usize,
    #[serde(default)]
    pub activation: ActivationFunction,
    #[serde(default = "default_use_bias")]
    pub use_bias: bool,
    #[serde(default = "default_kernel_initializer")]
    pub kernel_initializer: Initializer,
    #[serde(default = "default_bias_initializer")]
    pub bias_initializer: Initializer,
    #[serde(default)]
    pub kernel_regularizer: Option<Regularizer>,
}

fn default_use_bias() -> bool {
    true
}

fn default_kernel_initializer() -> Initializer {
    Initializer::GlorotUniform
}

fn default_bias_initializer() -> Initializer {
    Initializer::Zeros
}

impl Dense {
    pub fn new(units: usize, activation: ActivationFunction) -> Dense {
        Dense {
            units,
            activation,
            use_bias: true,
            kernel_initializer: default_kernel_initializer(),
            bias_initializer: default_bias_initializer(),
            kernel_regularizer: None,
        }
    }

    pub fn without_bias(mut self) -> Dense {
        self.use_bias = false;
        self
    }

    pub fn with_kernel_initializer(mut self, initializer: Initializer) -> Dense {
        self.kernel_initializer = initializer;
        self
    }

    pub fn with_bias_initializer(mut self, initializer: Initializer) -> Dense {
        self.bias_initializer = initializer;
        self
    }

    pub fn with_kernel_regularizer(mut self, regularizer: Regularizer) -> Dense {
        self.kernel_regularizer = Some(regularizer);
        self
    }

    pub(crate) fn output_shape(&self, layer: &str, input: &[usize]) -> Result<Vec<usize>> {
        if self.units == 0 {
            return Err(ModelError::InvalidArgument(format!(
                "dense layer `{layer}` must have at least one unit"
            )));
        }
        if input.len() != 1 {
            return Err(ModelError::ShapeMismatch {
                layer: layer.to_string(),
                expected: vec![input.iter().product()],
                actual: input.to_vec(),
            });
        }
        Ok(vec![self.units])
    }

    pub(crate) fn params(&self, input: &[usize]) -> Vec<ParamSpec> {
        let fan_in = input.iter().product();
        let mut params = vec![ParamSpec {
            role: "dense_kernel",
            shape: vec![fan_in, self.units],
            initializer: self.kernel_initializer.clone(),
            regularizer: self.kernel_regularizer,
            trainable: true,
            fan_in,
            fan_out: self.units,
        }];
        if self.use_bias {
            params.push(ParamSpec {
                role: "dense_bias",
                shape: vec![self.units],
                initializer: self.bias_initializer.clone(),
                regularizer: None,
                trainable: true,
                fan_in,
                fan_out: self.units,
            });
        }
        params
    }

    pub(crate) fn forward(&self, input: &Matrix, params: &[&Matrix]) -> LayerOutput {
        let mut z = input * params[0];
        if self.use_bias {
            z = z.add_row(params[1]);
        }
        let a = self.activation.apply(&z);
        LayerOutput {
            output: a,
            cache: LayerCache::PreActivation(z),
            updates: Vec::new(),
        }
    }

    /// Weight gradient `xᵀ·δ`, bias gradient `Σ δ`, input gradient `δ·Wᵀ`
    /// where `δ` is the gradient w.r.t. the pre-activation.
    pub(crate) fn backward(
        &self,
        input: &Matrix,
        params: &[&Matrix],
        output: &Matrix,
        cache: &LayerCache,
        grad: &Matrix,
    ) -> LayerGradients {
        let delta = match cache {
            LayerCache::PreActivation(z) => self.activation.backward(z, output, grad),
            _ => grad.clone(),
        };

        let kernel_grad = &input.transpose() * &delta;
        let input_grad = &delta * &params[0].transpose();

        let mut param_grads = vec![Some(kernel_grad)];
        if self.use_bias {
            param_grads.push(Some(delta.sum_rows()));
        }

        LayerGradients { inputs: vec![input_grad], params: param_grads }
    }
}
