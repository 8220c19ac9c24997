use crate::error::Result;
use crate::layers::layer::Layer;
use crate::model::model::{assign_default_names, GraphModel, ModelOptions};
use crate::model::saved::ModelKind;

/// Builds a model from layers wired by name.
///
/// Layers may be added in any order; they are sorted topologically when the
/// model is built. Without `with_outputs`, the last added layer is the
/// single output.
pub struct FunctionalBuilder {
    name: String,
    layers: Vec<Layer>,
    outputs: Vec<String>,
    options: ModelOptions,
}

impl FunctionalBuilder {
    pub fn new(name: impl Into<String>) -> FunctionalBuilder {
        FunctionalBuilder {
            name: name.into(),
            layers: Vec::new(),
            outputs: Vec::new(),
            options: ModelOptions::default(),
        }
    }

    pub fn add(mut self, layer: Layer) -> FunctionalBuilder {
        self.layers.push(layer);
        self
    }

    /// Declares the output layers; the first is the one loss, metric and
    /// predictions use.
    pub fn with_outputs(mut self, outputs: &[&str]) -> FunctionalBuilder {
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_options(mut self, options: ModelOptions) -> FunctionalBuilder {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<GraphModel> {
        let FunctionalBuilder { name, mut layers, mut outputs, options } = self;
        assign_default_names(&mut layers);
        if outputs.is_empty() {
            outputs.extend(layers.last().map(|l| l.name.clone()));
        }
        GraphModel::from_parts(name, ModelKind::Functional, &layers, &outputs, options)
    }
}
