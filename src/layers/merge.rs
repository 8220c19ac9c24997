use crate::error::{ModelError, Result};
use crate::layers::layer::LayerGradients;
use crate::math::matrix::Matrix;

pub(crate) fn add_output_shape(layer: &str, inputs: &[Vec<usize>]) -> Result<Vec<usize>> {
    let first = &inputs[0];
    for shape in &inputs[1..] {
        if shape != first {
            return Err(ModelError::ShapeMismatch {
                layer: layer.to_string(),
                expected: first.clone(),
                actual: shape.clone(),
            });
        }
    }
    Ok(first.clone())
}

pub(crate) fn concatenate_output_shape(layer: &str, inputs: &[Vec<usize>]) -> Result<Vec<usize>> {
    let mut width = 0;
    for shape in inputs {
        if shape.len() != 1 {
            return Err(ModelError::ShapeMismatch {
                layer: layer.to_string(),
                expected: vec![shape.iter().product()],
                actual: shape.clone(),
            });
        }
        width += shape[0];
    }
    Ok(vec![width])
}

pub(crate) fn add_forward(inputs: &[&Matrix]) -> Matrix {
    let mut sum = inputs[0].clone();
    for input in &inputs[1..] {
        sum = &sum + *input;
    }
    sum
}

/// Splits the output gradient back into per-input column blocks.
pub(crate) fn concatenate_backward(inputs: &[&Matrix], grad: &Matrix) -> LayerGradients {
    let mut offset = 0;
    let mut grads = Vec::with_capacity(inputs.len());
    for input in inputs {
        grads.push(grad.columns(offset, input.cols));
        offset += input.cols;
    }
    LayerGradients { inputs: grads, params: Vec::new() }
}
