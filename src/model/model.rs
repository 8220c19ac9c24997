use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dataset::dataset::Dataset;
use crate::error::{ModelError, Result};
use crate::graph::context::ExecutionContext;
use crate::graph::kgraph::{GraphPlan, KGraph};
use crate::graph::topology::assemble;
use crate::layers::layer::Layer;
use crate::logging::sink::{LogCrateSink, LogSink};
use crate::loss::loss_type::LossType;
use crate::math::matrix::{argmax, Matrix};
use crate::math::tensor::Tensor;
use crate::metric::metrics::Metrics;
use crate::model::saved::{self, ModelKind, ModelSpec, WritingMode, MODEL_FILE, OPTIMIZER_FILE, VARIABLES_FILE};
use crate::model::state::ModelState;
use crate::model::summary::ModelSummary;
use crate::model::weights::{self, MissedWeightsStrategy, WeightSnapshot, WeightSource};
use crate::optim::optimizer::{Optimizer, OptimizerState};
use crate::train::callback::Callback;
use crate::train::evaluation::EvaluationResult;
use crate::train::history::TrainingHistory;
use crate::train::loop_fn::{self, Session};
use crate::train::train_config::{CompileConfig, FitConfig};

/// Construction-time options shared by both model builders.
#[derive(Clone)]
pub struct ModelOptions {
    /// Seeds weight initialization, dropout masks and shuffling. Drawn from
    /// OS entropy when unset.
    pub seed: Option<u64>,
    pub sink: Arc<dyn LogSink>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        ModelOptions { seed: None, sink: Arc::new(LogCrateSink) }
    }
}

impl ModelOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }
}

/// A trainable model over a directed acyclic graph of layers.
///
/// The layer graph is validated and every shape inferred when the model is
/// created. Variables are allocated and initialized lazily, by the first
/// operation after `compile` that needs them.
pub struct GraphModel {
    name: String,
    kind: ModelKind,
    plan: GraphPlan,
    compiled: Option<CompileConfig>,
    graph: Option<KGraph>,
    optimizer_state: OptimizerState,
    state: ModelState,
    rng: StdRng,
    sink: Arc<dyn LogSink>,
}

impl GraphModel {
    pub(crate) fn from_parts(
        name: String,
        kind: ModelKind,
        layers: &[Layer],
        outputs: &[String],
        options: ModelOptions,
    ) -> Result<GraphModel> {
        let plan = GraphPlan::new(assemble(layers, outputs)?)?;
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        options.sink.info(&format!("Model `{name}` created with {} layers", plan.topology.layers.len()));
        Ok(GraphModel {
            name,
            kind,
            plan,
            compiled: None,
            graph: None,
            optimizer_state: OptimizerState::default(),
            state: ModelState::Created,
            rng,
            sink: options.sink,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Layers in execution order.
    pub fn layers(&self) -> &[Layer] {
        &self.plan.topology.layers
    }

    pub fn input_shape(&self) -> &[usize] {
        self.plan.input_shape()
    }

    pub fn output_shape(&self) -> &[usize] {
        self.plan.output_shape()
    }

    pub fn compile_config(&self) -> Option<&CompileConfig> {
        self.compiled.as_ref()
    }

    pub fn optimizer_state(&self) -> &OptimizerState {
        &self.optimizer_state
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub fn compile(&mut self, optimizer: Optimizer, loss: LossType, metric: Metrics) -> Result<()> {
        self.compile_with(CompileConfig::new(optimizer, loss, metric))
    }

    /// Records how the model is trained. Compiling again replaces the
    /// configuration until the model is built; afterwards it is rejected.
    pub fn compile_with(&mut self, config: CompileConfig) -> Result<()> {
        self.state.check_open()?;
        if self.state == ModelState::Built {
            return Err(ModelError::AlreadyBuilt);
        }
        config.optimizer.validate()?;
        self.sink.info(&format!(
            "Model `{}` compiled: optimizer {}, loss {:?}, metric {}",
            self.name,
            config.optimizer.name(),
            config.loss,
            config.metric
        ));
        self.compiled = Some(config);
        self.state = ModelState::Compiled;
        Ok(())
    }

    /// Builds the graph if needed and runs every initializer, discarding any
    /// trained values and optimizer state.
    pub fn init(&mut self) -> Result<()> {
        if self.state == ModelState::Built {
            if let Some(graph) = self.graph.as_mut() {
                graph.initialize(&mut self.rng);
            }
            self.optimizer_state = OptimizerState::default();
            self.sink.info(&format!("Model `{}` re-initialized", self.name));
            return Ok(());
        }
        self.ensure_built()
    }

    /// Releases the graph. Every later operation that needs the graph or
    /// the configuration fails with `ModelClosed`; closing again is a no-op.
    pub fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.graph = None;
        self.optimizer_state = OptimizerState::default();
        self.state = ModelState::Closed;
        self.sink.info(&format!("Model `{}` closed", self.name));
    }

    fn ensure_built(&mut self) -> Result<()> {
        self.state.check_open()?;
        if self.compiled.is_none() {
            return Err(ModelError::NotCompiled);
        }
        if self.graph.is_some() {
            return Ok(());
        }

        let mut graph = KGraph::build(self.plan.clone())?;
        graph.initialize(&mut self.rng);
        for variable in graph.variables().iter() {
            self.sink.debug(&format!(
                "Initialized `{}` {:?} with {:?}",
                variable.name, variable.shape, variable.initializer
            ));
        }
        self.sink.info(&format!(
            "Model `{}` built: {} variables, {} parameters",
            self.name,
            graph.variables().len(),
            graph.variables().iter().map(|v| v.len()).sum::<usize>()
        ));
        self.graph = Some(graph);
        self.state = ModelState::Built;
        Ok(())
    }

    fn session(&mut self) -> Result<Session<'_>> {
        self.ensure_built()?;
        match (self.graph.as_mut(), self.compiled.as_ref()) {
            (Some(graph), Some(compiled)) => Ok(Session {
                graph,
                optimizer_state: &mut self.optimizer_state,
                compiled,
                rng: &mut self.rng,
                sink: self.sink.as_ref(),
            }),
            _ => Err(ModelError::NotCompiled),
        }
    }

    // ── Training and evaluation ──────────────────────────────────────────────

    /// Trains on `train`, evaluating `validation` after every epoch when given.
    pub fn fit(
        &mut self,
        train: &dyn Dataset,
        validation: Option<&dyn Dataset>,
        config: &FitConfig,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<TrainingHistory> {
        let mut session = self.session()?;
        loop_fn::train_loop(&mut session, train, validation, config, callbacks)
    }

    /// Holds out the first `validation_rate` share of `dataset` for validation
    /// and trains on the rest.
    pub fn fit_with_validation_rate(
        &mut self,
        dataset: &dyn Dataset,
        validation_rate: f64,
        config: &FitConfig,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<TrainingHistory> {
        if !(validation_rate > 0.0 && validation_rate < 1.0) {
            return Err(ModelError::InvalidArgument(format!(
                "validation rate must be in (0, 1), got {validation_rate}"
            )));
        }
        let (validation, train) = dataset.split(validation_rate)?;
        self.fit(&train, Some(&validation), config, callbacks)
    }

    /// Loss and the compiled metric in inference mode.
    pub fn evaluate(&mut self, dataset: &dyn Dataset, batch_size: usize) -> Result<EvaluationResult> {
        self.evaluate_with_callbacks(dataset, batch_size, &mut [])
    }

    /// Like `evaluate`, firing the test hooks of `callbacks`.
    pub fn evaluate_with_callbacks(
        &mut self,
        dataset: &dyn Dataset,
        batch_size: usize,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<EvaluationResult> {
        let metric = self.session()?.compiled.metric;
        self.run_evaluation(dataset, &[metric], batch_size, callbacks)
    }

    pub fn evaluate_metrics(
        &mut self,
        dataset: &dyn Dataset,
        metrics: &[Metrics],
        batch_size: usize,
    ) -> Result<EvaluationResult> {
        self.run_evaluation(dataset, metrics, batch_size, &mut [])
    }

    fn run_evaluation(
        &mut self,
        dataset: &dyn Dataset,
        metrics: &[Metrics],
        batch_size: usize,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<EvaluationResult> {
        let session = self.session()?;
        let result =
            loop_fn::evaluate(session.graph, session.compiled, session.rng, dataset, metrics, batch_size, callbacks)?;
        session.sink.info(&format!("Evaluation on {} examples: loss {:.6}", dataset.x_size(), result.loss_value));
        Ok(result)
    }

    // ── Inference ────────────────────────────────────────────────────────────

    /// Index of the largest value of the primary output.
    pub fn predict(&mut self, input: &[f64]) -> Result<usize> {
        Ok(argmax(&self.predict_softly(input)?))
    }

    /// The primary output for one example; softmax probabilities when the
    /// loss works on logits.
    pub fn predict_softly(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let predictions = self.predict_matrix(&Matrix::from_rows(&[input]))?;
        Ok(predictions.data)
    }

    pub fn predict_dataset(&mut self, dataset: &dyn Dataset, batch_size: usize) -> Result<Vec<usize>> {
        self.predict_dataset_with_callbacks(dataset, batch_size, &mut [])
    }

    pub fn predict_dataset_with_callbacks(
        &mut self,
        dataset: &dyn Dataset,
        batch_size: usize,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<Vec<usize>> {
        let soft = self.predict_softly_dataset_with_callbacks(dataset, batch_size, callbacks)?;
        Ok(soft.iter().map(|p| argmax(p)).collect())
    }

    pub fn predict_softly_dataset(&mut self, dataset: &dyn Dataset, batch_size: usize) -> Result<Vec<Vec<f64>>> {
        self.predict_softly_dataset_with_callbacks(dataset, batch_size, &mut [])
    }

    /// Batched `predict_softly` over a whole dataset, firing the predict
    /// hooks of `callbacks`. The last batch may be short.
    pub fn predict_softly_dataset_with_callbacks(
        &mut self,
        dataset: &dyn Dataset,
        batch_size: usize,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<Vec<Vec<f64>>> {
        let session = self.session()?;
        loop_fn::predict_dataset(session.graph, session.compiled.loss, session.rng, dataset, batch_size, callbacks)
    }

    /// Every declared output for one example, in declaration order. The
    /// primary output is post-processed like `predict_softly`; the others
    /// are returned raw.
    pub fn predict_outputs(&mut self, input: &[f64]) -> Result<Vec<Vec<f64>>> {
        let session = self.session()?;
        let graph = &*session.graph;
        let trace = graph.forward(&Matrix::from_rows(&[input]), &ExecutionContext::inference(), session.rng)?;
        let outputs = (0..graph.plan().topology.outputs.len())
            .map(|index| {
                let output = graph.output(&trace, index);
                if index == 0 {
                    session.compiled.loss.predictions(output).data
                } else {
                    output.data.clone()
                }
            })
            .collect();
        Ok(outputs)
    }

    /// Predicted class plus the output of every layer, by layer name in
    /// execution order.
    pub fn predict_and_get_activations(&mut self, input: &[f64]) -> Result<(usize, Vec<(String, Vec<f64>)>)> {
        let session = self.session()?;
        let graph = &*session.graph;
        let trace = graph.forward(&Matrix::from_rows(&[input]), &ExecutionContext::inference(), session.rng)?;
        let activations = graph
            .plan()
            .topology
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| (layer.name.clone(), trace.node_output(i).data.clone()))
            .collect();
        let prediction = argmax(&session.compiled.loss.predictions(graph.primary_output(&trace)).data);
        Ok((prediction, activations))
    }

    fn predict_matrix(&mut self, x: &Matrix) -> Result<Matrix> {
        let session = self.session()?;
        loop_fn::predict_batch(session.graph, session.compiled.loss, session.rng, x)
    }

    // ── Weights ──────────────────────────────────────────────────────────────

    /// Current variables and optimizer state.
    pub fn weights(&mut self) -> Result<WeightSnapshot> {
        let weights = self.session()?.graph.snapshot();
        Ok(WeightSnapshot { weights, optimizer: Some(self.optimizer_state.clone()) })
    }

    /// Restores a snapshot taken from a model with the same variables.
    pub fn set_weights(&mut self, snapshot: &WeightSnapshot) -> Result<()> {
        self.load_weights(snapshot, MissedWeightsStrategy::Fail)?;
        if let Some(optimizer) = &snapshot.optimizer {
            self.optimizer_state = optimizer.clone();
        }
        Ok(())
    }

    pub fn load_weights(&mut self, source: &dyn WeightSource, strategy: MissedWeightsStrategy) -> Result<()> {
        let session = self.session()?;
        weights::load_into(session.graph, source, strategy, session.rng, session.sink)
    }

    /// Loads `variables.json` (and `optimizer.json` when asked) from a saved
    /// model directory.
    pub fn load_weights_from_dir(
        &mut self,
        dir: impl AsRef<Path>,
        strategy: MissedWeightsStrategy,
        load_optimizer_state: bool,
    ) -> Result<()> {
        let dir = dir.as_ref();
        let variables: BTreeMap<String, Tensor> = saved::read_json(&dir.join(VARIABLES_FILE))?;
        let optimizer = if load_optimizer_state {
            Some(saved::read_json::<OptimizerState>(&dir.join(OPTIMIZER_FILE))?)
        } else {
            None
        };
        self.load_weights(&variables, strategy)?;
        if let Some(optimizer) = optimizer {
            self.optimizer_state = optimizer;
        }
        self.sink.info(&format!("Weights of `{}` loaded from {}", self.name, dir.display()));
        Ok(())
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    pub fn to_spec(&self) -> ModelSpec {
        ModelSpec {
            name: self.name.clone(),
            kind: self.kind,
            layers: self.plan.topology.layers.clone(),
            outputs: self.plan.topology.output_names(),
            compile: self.compiled.clone(),
            has_optimizer_state: false,
        }
    }

    /// Writes the model into `dir`: `model.json`, `variables.json` and, when
    /// asked, `optimizer.json`.
    pub fn save(&mut self, dir: impl AsRef<Path>, mode: WritingMode, save_optimizer_state: bool) -> Result<()> {
        let dir = dir.as_ref();
        let spec = ModelSpec { has_optimizer_state: save_optimizer_state, ..self.to_spec() };
        let variables = self.session()?.graph.snapshot();
        let mut files = vec![
            (MODEL_FILE, saved::to_json(&spec)?),
            (VARIABLES_FILE, saved::to_json(&variables)?),
        ];
        if save_optimizer_state {
            files.push((OPTIMIZER_FILE, saved::to_json(&self.optimizer_state)?));
        }
        saved::write_dir(dir, mode, &files)?;
        self.sink.info(&format!("Model `{}` saved to {}", self.name, dir.display()));
        Ok(())
    }

    pub fn load(dir: impl AsRef<Path>) -> Result<GraphModel> {
        GraphModel::load_with_options(dir, ModelOptions::default())
    }

    /// Rebuilds a model saved with `save`, compiled as it was saved and with
    /// every variable restored. Optimizer state is restored when it was saved
    /// with the model.
    pub fn load_with_options(dir: impl AsRef<Path>, options: ModelOptions) -> Result<GraphModel> {
        let dir = dir.as_ref();
        let spec: ModelSpec = saved::read_json(&dir.join(MODEL_FILE))?;
        let has_optimizer = spec.has_optimizer_state;
        let mut model = GraphModel::from_spec(spec, options)?;
        if model.compiled.is_some() {
            model.load_weights_from_dir(dir, MissedWeightsStrategy::Fail, has_optimizer)?;
        }
        Ok(model)
    }

    pub fn from_spec(spec: ModelSpec, options: ModelOptions) -> Result<GraphModel> {
        let mut model = GraphModel::from_parts(spec.name, spec.kind, &spec.layers, &spec.outputs, options)?;
        if let Some(config) = spec.compile {
            model.compile_with(config)?;
        }
        Ok(model)
    }

    /// An independent model with the same layers and compile configuration.
    ///
    /// With `copy_weights`, a built model's variables (and optimizer state
    /// when `save_optimizer_state`) are copied; otherwise the copy gets fresh
    /// weights from an entropy-seeded generator.
    pub fn copy(&self, name: Option<&str>, save_optimizer_state: bool, copy_weights: bool) -> Result<GraphModel> {
        self.state.check_open()?;
        let name = name.map_or_else(|| format!("{}_copy", self.name), str::to_string);
        let rng = if copy_weights { self.rng.clone() } else { StdRng::from_entropy() };

        let mut copy = GraphModel {
            name,
            kind: self.kind,
            plan: self.plan.clone(),
            compiled: self.compiled.clone(),
            graph: None,
            optimizer_state: OptimizerState::default(),
            state: if self.compiled.is_some() { ModelState::Compiled } else { ModelState::Created },
            rng,
            sink: Arc::clone(&self.sink),
        };

        if let Some(graph) = &self.graph {
            if copy_weights {
                copy.graph = Some(graph.clone());
                copy.state = ModelState::Built;
            } else {
                copy.ensure_built()?;
            }
            if save_optimizer_state {
                copy.optimizer_state = self.optimizer_state.clone();
            }
        }
        self.sink.info(&format!("Model `{}` copied to `{}`", self.name, copy.name));
        Ok(copy)
    }

    /// Layer table with shapes and parameter counts; also written to the
    /// model's log sink.
    pub fn summary(&self) -> Result<ModelSummary> {
        self.state.check_open()?;
        let summary = ModelSummary::from_plan(&self.name, &self.plan);
        for line in summary.format_lines() {
            self.sink.info(&line);
        }
        Ok(summary)
    }
}

/// Gives every unnamed layer a `{kind}_{n}` name.
///
/// `n` counts per kind from 1 (`dense_1`, `dropout_1`, `dense_2`), not with one
/// counter shared by all kinds. Names already used by an explicitly named
/// layer are skipped.
pub(crate) fn assign_default_names(layers: &mut [Layer]) {
    let mut taken: BTreeSet<String> =
        layers.iter().filter(|l| !l.name.is_empty()).map(|l| l.name.clone()).collect();
    let mut counters: BTreeMap<&'static str, usize> = BTreeMap::new();
    for layer in layers.iter_mut().filter(|l| l.name.is_empty()) {
        let counter = counters.entry(layer.kind_name()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}_{}", layer.kind_name(), counter);
            if taken.insert(candidate.clone()) {
                layer.name = candidate;
                break;
            }
        }
    }
}
