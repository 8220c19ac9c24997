use crate::graph::kgraph::GraphPlan;

/// One row of a model summary.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSummary {
    pub name: String,
    pub kind: &'static str,
    pub output_shape: Vec<usize>,
    pub params: usize,
    pub inbound: Vec<String>,
}

/// Layer table and parameter totals of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub name: String,
    pub layers: Vec<LayerSummary>,
    pub trainable_params: usize,
    /// Parameters of frozen layers plus statistics the optimizer never touches.
    pub frozen_params: usize,
}

impl ModelSummary {
    pub(crate) fn from_plan(name: &str, plan: &GraphPlan) -> ModelSummary {
        let topology = &plan.topology;
        let mut trainable_params = 0;
        let mut frozen_params = 0;
        let mut layers = Vec::with_capacity(topology.layers.len());

        for (i, layer) in topology.layers.iter().enumerate() {
            for spec in &plan.params[i] {
                if spec.trainable && layer.trainable {
                    trainable_params += spec.len();
                } else {
                    frozen_params += spec.len();
                }
            }
            layers.push(LayerSummary {
                name: layer.name.clone(),
                kind: layer.kind_name(),
                output_shape: plan.output_shapes[i].clone(),
                params: layer.param_count(&plan.input_shapes[i]),
                inbound: layer.inbound.clone(),
            });
        }

        ModelSummary { name: name.to_string(), layers, trainable_params, frozen_params }
    }

    pub fn total_params(&self) -> usize {
        self.trainable_params + self.frozen_params
    }

    /// Renders the summary as a fixed-width table, one string per line.
    pub fn format_lines(&self) -> Vec<String> {
        let rule = "=".repeat(86);
        let mut lines = vec![
            format!("Model: \"{}\"", self.name),
            rule.clone(),
            format!("{:<30}{:<18}{:>10}   {}", "Layer (type)", "Output Shape", "Param #", "Connected to"),
            rule.clone(),
        ];
        for layer in &self.layers {
            let dims: Vec<String> = layer.output_shape.iter().map(usize::to_string).collect();
            lines.push(format!(
                "{:<30}{:<18}{:>10}   {}",
                format!("{} ({})", layer.name, layer.kind),
                format!("[None, {}]", dims.join(", ")),
                layer.params,
                layer.inbound.join(", ")
            ));
        }
        lines.push(rule);
        lines.push(format!("Total params: {}", self.total_params()));
        lines.push(format!("Trainable params: {}", self.trainable_params));
        lines.push(format!("Non-trainable params: {}", self.frozen_params));
        lines
    }
}
