use serde::{Serialize, Deserialize};

use crate::error::{ModelError, Result};
use crate::math::matrix::Matrix;

/// Gradient clipping applied before every optimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClipGradient {
    #[default]
    None,
    /// Clamps every element to `[-clip_value, clip_value]`.
    Value { clip_value: f64 },
    /// Rescales each gradient tensor whose L2 norm exceeds `clip_norm`.
    Norm { clip_norm: f64 },
}

impl ClipGradient {
    pub fn validate(&self) -> Result<()> {
        match *self {
            ClipGradient::Value { clip_value: limit } | ClipGradient::Norm { clip_norm: limit }
                if !(limit > 0.0 && limit.is_finite()) =>
            {
                Err(ModelError::InvalidArgument(format!(
                    "clip threshold must be positive and finite, got {limit}"
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn clip(&self, grad: Matrix) -> Matrix {
        match *self {
            ClipGradient::None => grad,
            ClipGradient::Value { clip_value } => grad.map(|g| g.clamp(-clip_value, clip_value)),
            ClipGradient::Norm { clip_norm } => {
                let norm = grad.norm();
                if norm > clip_norm {
                    grad.scale(clip_norm / norm)
                } else {
                    grad
                }
            }
        }
    }
}
