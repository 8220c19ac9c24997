use std::collections::HashMap;

use rand::RngCore;

use crate::error::{ModelError, Result};
use crate::layers::layer::ParamSpec;
use crate::math::initializer::Initializer;
use crate::math::matrix::Matrix;
use crate::math::regularizer::Regularizer;
use crate::math::tensor::Tensor;

/// A named, shaped parameter of a built graph.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub shape: Vec<usize>,
    pub value: Matrix,
    /// Updated by the optimizer when true.
    pub trainable: bool,
    pub initializer: Initializer,
    pub regularizer: Option<Regularizer>,
    fan_in: usize,
    fan_out: usize,
}

impl Variable {
    pub fn len(&self) -> usize {
        self.value.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.data.is_empty()
    }

    pub fn to_tensor(&self) -> Tensor {
        Tensor::from_matrix(&self.shape, &self.value)
    }

    pub fn initialize(&mut self, rng: &mut dyn RngCore) {
        let data = self.initializer.sample(self.len(), self.fan_in, self.fan_out, rng);
        self.value.data = data;
    }
}

/// All variables of one graph, addressable by id (registration order) and by
/// qualified name.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    variables: Vec<Variable>,
    by_name: HashMap<String, usize>,
}

impl VariableRegistry {
    /// Registers a zero-filled variable for `spec` and returns its id.
    /// Parameters of a frozen layer are registered as non-trainable.
    pub fn register(&mut self, name: String, spec: &ParamSpec, layer_trainable: bool) -> Result<usize> {
        if self.by_name.contains_key(&name) {
            return Err(ModelError::DuplicateVariable(name));
        }
        let value = Tensor { data: vec![0.0; spec.len()], shape: spec.shape.clone() }.to_matrix();
        let id = self.variables.len();
        self.by_name.insert(name.clone(), id);
        self.variables.push(Variable {
            name,
            shape: spec.shape.clone(),
            value,
            trainable: spec.trainable && layer_trainable,
            initializer: spec.initializer.clone(),
            regularizer: spec.regularizer,
            fan_in: spec.fan_in,
            fan_out: spec.fan_out,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.id(name).map(|id| &self.variables[id])
    }

    pub fn by_id(&self, id: usize) -> &Variable {
        &self.variables[id]
    }

    pub fn by_id_mut(&mut self, id: usize) -> &mut Variable {
        &mut self.variables[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        self.variables.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    /// Overwrites a variable's value, checking the shape first.
    pub fn assign(&mut self, name: &str, tensor: &Tensor) -> Result<()> {
        let id = self.id(name).ok_or_else(|| ModelError::MissedWeight(name.to_string()))?;
        let variable = &mut self.variables[id];
        if variable.shape != tensor.shape {
            return Err(ModelError::WeightShapeMismatch {
                name: name.to_string(),
                expected: variable.shape.clone(),
                actual: tensor.shape.clone(),
            });
        }
        variable.value = tensor.to_matrix();
        Ok(())
    }
}
