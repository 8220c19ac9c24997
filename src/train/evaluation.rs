use std::collections::HashMap;

use crate::metric::metrics::Metrics;

/// Loss and metric values of one evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub loss_value: f64,
    pub metrics: HashMap<Metrics, f64>,
}

impl EvaluationResult {
    pub fn metric(&self, metric: Metrics) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }
}
