use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::math::matrix::Matrix;

/// A shaped block of values, used to move weights in and out of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ModelError::InvalidArgument(format!(
                "tensor of shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Tensor { shape, data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Rank-2 tensors keep their rows; anything else becomes a single row.
    pub fn to_matrix(&self) -> Matrix {
        match self.shape.as_slice() {
            [rows, cols] => Matrix::from_vec(*rows, *cols, self.data.clone()),
            _ => Matrix::from_vec(1, self.data.len(), self.data.clone()),
        }
    }

    pub fn from_matrix(shape: &[usize], matrix: &Matrix) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: matrix.data.clone(),
        }
    }
}
