use crate::error::{ModelError, Result};
use crate::layers::layer::Layer;
use crate::model::model::{assign_default_names, GraphModel, ModelOptions};
use crate::model::saved::ModelKind;

/// Builds a linear stack of layers.
///
/// The first layer must be an input layer; every later layer is fed by the
/// one added before it, so its `inbound` list must be left empty. Layers
/// with an empty name are named `{kind}_{n}`.
///
/// ```
/// use graphite_nn::{ActivationFunction, Layer, SequentialBuilder};
///
/// let model = SequentialBuilder::new("regression")
///     .add(Layer::input("in", &[4]))
///     .add(Layer::dense("", 1, ActivationFunction::Identity))
///     .build()
///     .unwrap();
/// assert_eq!(model.layers()[1].name, "dense_1");
/// ```
pub struct SequentialBuilder {
    name: String,
    layers: Vec<Layer>,
    options: ModelOptions,
}

impl SequentialBuilder {
    pub fn new(name: impl Into<String>) -> SequentialBuilder {
        SequentialBuilder { name: name.into(), layers: Vec::new(), options: ModelOptions::default() }
    }

    pub fn add(mut self, layer: Layer) -> SequentialBuilder {
        self.layers.push(layer);
        self
    }

    pub fn with_options(mut self, options: ModelOptions) -> SequentialBuilder {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<GraphModel> {
        let SequentialBuilder { name, mut layers, options } = self;
        match layers.first() {
            Some(first) if first.is_input() => {}
            _ => {
                return Err(ModelError::InvalidArchitecture(
                    "a sequential model must start with an input layer".into(),
                ))
            }
        }
        if let Some(wired) = layers.iter().skip(1).find(|l| !l.inbound.is_empty()) {
            return Err(ModelError::InvalidArgument(format!(
                "layer `{}` declares inbound layers, sequential models wire them automatically",
                wired.name
            )));
        }

        assign_default_names(&mut layers);
        for i in 1..layers.len() {
            let previous = layers[i - 1].name.clone();
            layers[i].inbound = vec![previous];
        }
        let outputs: Vec<String> = layers.last().map(|l| l.name.clone()).into_iter().collect();
        GraphModel::from_parts(name, ModelKind::Sequential, &layers, &outputs, options)
    }
}
