use serde::{Serialize, Deserialize};
use std::f64::consts::{E, PI};

use crate::math::matrix::Matrix;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Identity,
    /// Row-wise softmax. Unlike the other variants it is not element-wise,
    /// so its backward pass uses the full Jacobian of each row.
    Softmax,
    Tanh,
    LeakyReLU { alpha: f64 },
    Elu { alpha: f64 },
    Gelu,
    Swish,
}

impl Default for ActivationFunction {
    fn default() -> Self {
        ActivationFunction::Identity
    }
}

impl ActivationFunction {
    /// Applies the activation to a batch (one example per row).
    pub fn apply(&self, z: &Matrix) -> Matrix {
        match self {
            ActivationFunction::Identity => z.clone(),
            ActivationFunction::Softmax => softmax_rows(z),
            _ => z.map(|x| self.function(x)),
        }
    }

    /// Gradient w.r.t. the pre-activation `z`, given the upstream gradient
    /// w.r.t. the activation output `a = apply(z)`.
    pub fn backward(&self, z: &Matrix, a: &Matrix, grad: &Matrix) -> Matrix {
        match self {
            ActivationFunction::Identity => grad.clone(),
            ActivationFunction::Softmax => {
                // dz_i = s_i * (g_i - sum_j g_j s_j)
                let mut res = Matrix::zeros(a.rows, a.cols);
                for r in 0..a.rows {
                    let s = a.row(r);
                    let g = grad.row(r);
                    let dot: f64 = s.iter().zip(g).map(|(s, g)| s * g).sum();
                    for (out, (s, g)) in res.row_mut(r).iter_mut().zip(s.iter().zip(g)) {
                        *out = s * (g - dot);
                    }
                }
                res
            }
            _ => grad.zip_map(z, |g, x| g * self.derivative(x)),
        }
    }

    /// Element-wise activation. `Softmax` only has a row-wise form and is
    /// routed through `apply`; here it degrades to identity.
    fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity | ActivationFunction::Softmax => x,
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Elu { alpha } => {
                if x > 0.0 { x } else { alpha * (E.powf(x) - 1.0) }
            }
            ActivationFunction::Gelu => {
                let c = (2.0_f64 / PI).sqrt();
                0.5 * x * (1.0 + (c * (x + 0.044715 * x.powi(3))).tanh())
            }
            ActivationFunction::Swish => x / (1.0 + E.powf(-x)),
        }
    }

    /// Element-wise derivative of the activation at pre-activation `x`.
    fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            },
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity | ActivationFunction::Softmax => 1.0,
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
            ActivationFunction::Elu { alpha } => {
                if x > 0.0 { 1.0 } else { alpha * E.powf(x) }
            }
            ActivationFunction::Gelu => {
                let c = (2.0_f64 / PI).sqrt();
                let inner = c * (x + 0.044715 * x.powi(3));
                let tanh_inner = inner.tanh();
                let sech2 = 1.0 - tanh_inner * tanh_inner;
                let d_inner = c * (1.0 + 3.0 * 0.044715 * x.powi(2));
                0.5 * tanh_inner + 0.5 * x * sech2 * d_inner + 0.5
            }
            ActivationFunction::Swish => {
                let sig = 1.0 / (1.0 + E.powf(-x));
                sig + x * sig * (1.0 - sig)
            }
        }
    }
}

/// Numerically stable row-wise softmax.
pub fn softmax_rows(z: &Matrix) -> Matrix {
    let mut res = z.clone();
    for r in 0..res.rows {
        let row = res.row_mut(r);
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for x in row.iter_mut() {
            *x = (*x - max).exp();
            sum += *x;
        }
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
    res
}
