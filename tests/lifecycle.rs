use std::sync::Arc;

use graphite_nn::layers::{Dense, LayerKind};
use graphite_nn::{
    ActivationFunction, FitConfig, FunctionalBuilder, GraphModel, Initializer, Layer, LossType, MemorySink, Metrics,
    ModelError, ModelOptions, ModelState, NullSink, OnHeapDataset, Optimizer, SequentialBuilder,
};

fn quiet(seed: u64) -> ModelOptions {
    ModelOptions::default().with_seed(seed).with_sink(Arc::new(NullSink))
}

fn small_model() -> GraphModel {
    SequentialBuilder::new("small")
        .add(Layer::input("in", &[3]))
        .add(Layer::dense("hidden", 4, ActivationFunction::Tanh))
        .add(Layer::dense("out", 2, ActivationFunction::Identity))
        .with_options(quiet(11))
        .build()
        .unwrap()
}

fn tiny_dataset() -> OnHeapDataset {
    OnHeapDataset::from_labels(vec![vec![0.1, 0.2, 0.3], vec![0.3, 0.2, 0.1]], vec![0.0, 1.0]).unwrap()
}

#[test]
fn operations_before_compile_fail() {
    let mut model = small_model();
    let data = tiny_dataset();
    assert_eq!(model.state(), ModelState::Created);
    assert!(matches!(model.fit(&data, None, &FitConfig::default(), &mut []), Err(ModelError::NotCompiled)));
    assert!(matches!(model.evaluate(&data, 2), Err(ModelError::NotCompiled)));
    assert!(matches!(model.predict(&[0.0, 0.0, 0.0]), Err(ModelError::NotCompiled)));
    assert!(matches!(model.weights(), Err(ModelError::NotCompiled)));
    assert!(matches!(model.init(), Err(ModelError::NotCompiled)));
    assert!(model.summary().is_ok());
}

#[test]
fn compile_resets_until_built_then_rejects() {
    let mut model = small_model();
    model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae).unwrap();
    model
        .compile(Optimizer::adam(0.01), LossType::SoftmaxCrossEntropyWithLogits, Metrics::Accuracy)
        .unwrap();
    assert_eq!(model.state(), ModelState::Compiled);
    assert_eq!(model.compile_config().map(|c| c.loss), Some(LossType::SoftmaxCrossEntropyWithLogits));

    model.predict(&[0.5, 0.5, 0.5]).unwrap();
    assert_eq!(model.state(), ModelState::Built);
    assert!(matches!(
        model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae),
        Err(ModelError::AlreadyBuilt)
    ));
}

#[test]
fn invalid_optimizer_is_rejected_at_compile() {
    let mut model = small_model();
    assert!(matches!(
        model.compile(Optimizer::sgd(-1.0), LossType::Mse, Metrics::Mae),
        Err(ModelError::InvalidArgument(_))
    ));
    assert_eq!(model.state(), ModelState::Created);
}

#[test]
fn close_is_idempotent_and_final() {
    let mut model = small_model();
    model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae).unwrap();
    model.init().unwrap();
    model.close();
    model.close();
    assert_eq!(model.state(), ModelState::Closed);

    let data = tiny_dataset();
    assert!(matches!(model.predict(&[0.0, 0.0, 0.0]), Err(ModelError::ModelClosed)));
    assert!(matches!(model.evaluate(&data, 1), Err(ModelError::ModelClosed)));
    assert!(matches!(model.fit(&data, None, &FitConfig::default(), &mut []), Err(ModelError::ModelClosed)));
    assert!(matches!(model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae), Err(ModelError::ModelClosed)));
    assert!(matches!(model.summary(), Err(ModelError::ModelClosed)));
    assert!(matches!(model.copy(None, false, true), Err(ModelError::ModelClosed)));
}

#[test]
fn init_reruns_initializers() {
    let mut model = small_model();
    model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae).unwrap();
    model.init().unwrap();
    let first = model.weights().unwrap();
    model.init().unwrap();
    assert_ne!(model.weights().unwrap().weights, first.weights);
}

#[test]
fn set_weights_rolls_back_training() {
    let dense = Dense::new(1, ActivationFunction::Identity)
        .with_kernel_initializer(Initializer::Ones)
        .with_bias_initializer(Initializer::Constant { value: 0.5 });
    let mut model = SequentialBuilder::new("rollback")
        .add(Layer::input("in", &[2]))
        .add(Layer::new("out", LayerKind::Dense(dense)))
        .with_options(quiet(3))
        .build()
        .unwrap();
    model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mse).unwrap();

    let snapshot = model.weights().unwrap();
    assert_eq!(snapshot.get("out_dense_kernel").unwrap().data, vec![1.0, 1.0]);
    assert_eq!(snapshot.get("out_dense_bias").unwrap().data, vec![0.5]);

    let data = OnHeapDataset::create(vec![vec![1.0, 2.0], vec![0.5, -1.0]], vec![vec![0.0], vec![2.0]]).unwrap();
    let config = FitConfig::new(3, 1).with_validation_batch_size(1);
    model.fit(&data, Some(&data), &config, &mut []).unwrap();
    assert_ne!(model.weights().unwrap().weights, snapshot.weights);

    model.set_weights(&snapshot).unwrap();
    assert_eq!(model.weights().unwrap().weights, snapshot.weights);
    assert_eq!(model.predict_softly(&[1.0, 2.0]).unwrap(), vec![3.5]);
}

#[test]
fn sequential_keeps_declaration_order() {
    let model = small_model();
    let names: Vec<_> = model.layers().iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["in", "hidden", "out"]);
}

#[test]
fn duplicate_names_are_rejected_anywhere_in_the_graph() {
    let result = FunctionalBuilder::new("dup")
        .add(Layer::input("in", &[4]))
        .add(Layer::dense("a", 4, ActivationFunction::ReLU).with_inbound(&["in"]))
        .add(Layer::dense("b", 4, ActivationFunction::ReLU).with_inbound(&["a"]))
        .add(Layer::dense("c", 4, ActivationFunction::ReLU).with_inbound(&["b"]))
        .add(Layer::dense("a", 4, ActivationFunction::ReLU).with_inbound(&["c"]))
        .with_options(quiet(0))
        .build();
    assert!(matches!(result, Err(ModelError::DuplicateLayerName(name)) if name == "a"));

    let sequential = SequentialBuilder::new("dup")
        .add(Layer::input("x", &[2]))
        .add(Layer::dense("x", 1, ActivationFunction::Identity))
        .with_options(quiet(0))
        .build();
    assert!(matches!(sequential, Err(ModelError::DuplicateLayerName(_))));
}

#[test]
fn shape_errors_fail_when_the_model_is_created() {
    let result = FunctionalBuilder::new("bad")
        .add(Layer::input("in", &[4]))
        .add(Layer::dense("a", 3, ActivationFunction::ReLU).with_inbound(&["in"]))
        .add(Layer::concatenate("cat", &["a", "in"]))
        .add(Layer::add("sum", &["cat", "in"]))
        .with_options(quiet(0))
        .build();
    assert!(matches!(result, Err(ModelError::ShapeMismatch { layer, .. }) if layer == "sum"));
}

#[test]
fn copies_are_independent() {
    let mut model = small_model();
    model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae).unwrap();
    let input = [0.4, -0.2, 0.9];
    let before = model.predict_softly(&input).unwrap();

    let mut with_weights = model.copy(Some("twin"), true, true).unwrap();
    assert_eq!(with_weights.name(), "twin");
    assert_eq!(with_weights.state(), ModelState::Built);
    assert_eq!(with_weights.predict_softly(&input).unwrap(), before);

    let mut fresh = model.copy(None, false, false).unwrap();
    assert_eq!(fresh.name(), "small_copy");
    assert_ne!(fresh.predict_softly(&input).unwrap(), before);

    let data = OnHeapDataset::create(vec![input.to_vec()], vec![vec![1.0, -1.0]]).unwrap();
    with_weights.fit(&data, None, &FitConfig::new(1, 1), &mut []).unwrap();
    assert_eq!(model.predict_softly(&input).unwrap(), before);
    assert_ne!(with_weights.predict_softly(&input).unwrap(), before);
}

#[test]
fn lifecycle_events_reach_the_sink() {
    let sink = Arc::new(MemorySink::new());
    let mut model = SequentialBuilder::new("logged")
        .add(Layer::input("in", &[1]))
        .add(Layer::dense("out", 1, ActivationFunction::Identity))
        .with_options(ModelOptions::default().with_seed(2).with_sink(sink.clone()))
        .build()
        .unwrap();
    model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae).unwrap();
    let data = OnHeapDataset::from_labels(vec![vec![1.0], vec![2.0]], vec![2.0, 4.0]).unwrap();
    model.fit(&data, None, &FitConfig::new(2, 1), &mut []).unwrap();
    model.summary().unwrap();
    model.close();

    assert!(sink.contains("compiled"));
    assert!(sink.contains("built"));
    assert!(sink.contains("Epoch 2/2"));
    assert!(sink.contains("Trainable params: 2"));
    assert!(sink.contains("closed"));
}
