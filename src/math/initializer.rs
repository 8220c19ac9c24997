use rand::{Rng, RngCore};
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;

/// How a variable is filled when a graph is first built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Initializer {
    Zeros,
    Ones,
    Constant { value: f64 },
    RandomUniform { min: f64, max: f64 },
    RandomNormal { mean: f64, std_dev: f64 },
    /// Uniform on `[-limit, limit]`, `limit = sqrt(6 / (fan_in + fan_out))`.
    GlorotUniform,
    /// N(0, sqrt(2 / (fan_in + fan_out))).
    GlorotNormal,
    /// Uniform on `[-limit, limit]`, `limit = sqrt(6 / fan_in)`.
    HeUniform,
    /// He initialization: N(0, sqrt(2 / fan_in)).
    ///
    /// Recommended before ReLU layers. The variance 2/fan_in accounts for
    /// the fact that ReLU zeroes half of its inputs on average.
    HeNormal,
    /// N(0, sqrt(1 / fan_in)). Suited to Sigmoid/Tanh/Identity layers.
    LecunNormal,
}

impl Initializer {
    /// Produces `fan_in`/`fan_out`-aware values for a variable of `len` elements.
    pub fn sample(&self, len: usize, fan_in: usize, fan_out: usize, rng: &mut dyn RngCore) -> Vec<f64> {
        let fan_in = fan_in.max(1) as f64;
        let fan_out = fan_out.max(1) as f64;
        match self {
            Initializer::Zeros => vec![0.0; len],
            Initializer::Ones => vec![1.0; len],
            Initializer::Constant { value } => vec![*value; len],
            Initializer::RandomUniform { min, max } => uniform(len, *min, *max, rng),
            Initializer::RandomNormal { mean, std_dev } => normal(len, *mean, *std_dev, rng),
            Initializer::GlorotUniform => {
                let limit = (6.0 / (fan_in + fan_out)).sqrt();
                uniform(len, -limit, limit, rng)
            }
            Initializer::GlorotNormal => normal(len, 0.0, (2.0 / (fan_in + fan_out)).sqrt(), rng),
            Initializer::HeUniform => {
                let limit = (6.0 / fan_in).sqrt();
                uniform(len, -limit, limit, rng)
            }
            Initializer::HeNormal => normal(len, 0.0, (2.0 / fan_in).sqrt(), rng),
            Initializer::LecunNormal => normal(len, 0.0, (1.0 / fan_in).sqrt(), rng),
        }
    }
}

fn uniform(len: usize, min: f64, max: f64, rng: &mut dyn RngCore) -> Vec<f64> {
    (0..len).map(|_| min + (max - min) * rng.gen::<f64>()).collect()
}

fn normal(len: usize, mean: f64, std_dev: f64, rng: &mut dyn RngCore) -> Vec<f64> {
    (0..len).map(|_| mean + std_dev * sample_standard_normal(rng)).collect()
}

/// Samples a single value from N(0, 1) using the Box-Muller transform.
/// Both u1 and u2 must be uniform on (0, 1].
pub fn sample_standard_normal(rng: &mut dyn RngCore) -> f64 {
    // Draw two independent uniform samples in (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn glorot_uniform_stays_within_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        let limit = (6.0_f64 / 30.0).sqrt();
        let values = Initializer::GlorotUniform.sample(200, 10, 20, &mut rng);
        assert!(values.iter().all(|v| v.abs() <= limit));
    }

    #[test]
    fn he_normal_has_expected_spread() {
        let mut rng = StdRng::seed_from_u64(11);
        let values = Initializer::HeNormal.sample(20_000, 8, 1, &mut rng);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        assert!(mean.abs() < 0.02);
        assert!((var - 0.25).abs() < 0.02);
    }

    #[test]
    fn same_seed_same_values() {
        let a = Initializer::RandomNormal { mean: 1.0, std_dev: 2.0 }
            .sample(5, 1, 1, &mut StdRng::seed_from_u64(3));
        let b = Initializer::RandomNormal { mean: 1.0, std_dev: 2.0 }
            .sample(5, 1, 1, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }
}
