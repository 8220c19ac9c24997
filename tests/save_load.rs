use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use graphite_nn::layers::{Dense, LayerKind};
use graphite_nn::{
    ActivationFunction, FitConfig, GraphModel, Layer, LossType, Metrics, MissedWeightsStrategy, ModelError,
    ModelOptions, NullSink, OnHeapDataset, Optimizer, SequentialBuilder, Tensor, WritingMode,
};

fn quiet(seed: u64) -> ModelOptions {
    ModelOptions::default().with_seed(seed).with_sink(Arc::new(NullSink))
}

fn images(n: usize) -> OnHeapDataset {
    let mut rng = StdRng::seed_from_u64(99);
    let x: Vec<Vec<f64>> = (0..n).map(|_| (0..64).map(|_| rng.gen_range(0.0..1.0)).collect()).collect();
    let labels: Vec<f64> = (0..n).map(|i| (i % 10) as f64).collect();
    OnHeapDataset::from_labels(x, labels).unwrap()
}

fn lenet_like() -> GraphModel {
    let mut model = SequentialBuilder::new("lenet_like")
        .add(Layer::input("image", &[8, 8]))
        .add(Layer::flatten("flatten"))
        .add(Layer::dense("fc1", 32, ActivationFunction::ReLU))
        .add(Layer::batch_norm("norm"))
        .add(Layer::dropout("drop", 0.25))
        .add(Layer::dense("fc2", 16, ActivationFunction::Tanh))
        .add(Layer::dense("logits", 10, ActivationFunction::Identity))
        .with_options(quiet(21))
        .build()
        .unwrap();
    model
        .compile(Optimizer::adam(0.001), LossType::SoftmaxCrossEntropyWithLogits, Metrics::Accuracy)
        .unwrap();
    model
}

#[test]
fn saved_model_predicts_identically_after_loading() {
    let data = images(40);
    let mut model = lenet_like();
    model.fit(&data, None, &FitConfig::new(2, 8), &mut []).unwrap();

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("lenet");
    model.save(&dir, WritingMode::FailIfExists, true).unwrap();
    for file in ["model.json", "variables.json", "optimizer.json"] {
        assert!(dir.join(file).is_file(), "{file} missing");
    }

    let mut loaded = GraphModel::load_with_options(&dir, quiet(0)).unwrap();
    assert_eq!(loaded.name(), "lenet_like");
    assert_eq!(loaded.layers(), model.layers());
    assert_eq!(loaded.compile_config(), model.compile_config());
    assert_eq!(loaded.optimizer_state(), model.optimizer_state());

    for i in 0..3 {
        let x = data.x()[i].clone();
        assert_eq!(loaded.predict_softly(&x).unwrap(), model.predict_softly(&x).unwrap());
        assert_eq!(loaded.predict(&x).unwrap(), model.predict(&x).unwrap());
    }
}

#[test]
fn writing_modes_guard_existing_directories() {
    let mut model = lenet_like();
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("model");

    model.save(&dir, WritingMode::FailIfExists, false).unwrap();
    assert!(!dir.join("optimizer.json").exists());
    assert!(matches!(
        model.save(&dir, WritingMode::FailIfExists, false),
        Err(ModelError::DirectoryExists(_))
    ));
    model.save(&dir, WritingMode::Override, true).unwrap();
    assert!(dir.join("optimizer.json").is_file());
}

#[test]
fn append_without_optimizer_state_drops_the_stale_one() {
    let data = images(16);
    let mut model = lenet_like();
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("model");

    model.fit(&data, None, &FitConfig::new(1, 4), &mut []).unwrap();
    model.save(&dir, WritingMode::FailIfExists, true).unwrap();
    assert_eq!(model.optimizer_state().iterations, 4);

    model.fit(&data, None, &FitConfig::new(3, 4), &mut []).unwrap();
    model.save(&dir, WritingMode::Append, false).unwrap();
    assert!(!dir.join("optimizer.json").exists());

    let mut loaded = GraphModel::load_with_options(&dir, quiet(0)).unwrap();
    assert_eq!(loaded.optimizer_state().iterations, 0);
    assert!(loaded.optimizer_state().slots.is_empty());
    let x = data.x()[0].clone();
    assert_eq!(loaded.predict_softly(&x).unwrap(), model.predict_softly(&x).unwrap());
}

#[test]
fn loading_weights_from_a_different_architecture() {
    let mut source = lenet_like();
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("source");
    source.save(&dir, WritingMode::FailIfExists, false).unwrap();

    let mut other = SequentialBuilder::new("other")
        .add(Layer::input("image", &[8, 8]))
        .add(Layer::flatten("flatten"))
        .add(Layer::dense("fc1", 32, ActivationFunction::ReLU))
        .add(Layer::dense("head", 3, ActivationFunction::Identity))
        .with_options(quiet(5))
        .build()
        .unwrap();
    other.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae).unwrap();

    assert!(matches!(
        other.load_weights_from_dir(&dir, MissedWeightsStrategy::Fail, false),
        Err(ModelError::MissedWeight(_))
    ));
    other.load_weights_from_dir(&dir, MissedWeightsStrategy::Skip, false).unwrap();
    let shared = source.weights().unwrap();
    assert_eq!(other.weights().unwrap().get("fc1_dense_kernel"), shared.get("fc1_dense_kernel"));

    assert!(matches!(
        other.load_weights_from_dir(&dir, MissedWeightsStrategy::Skip, true),
        Err(ModelError::MissingFile(_))
    ));
}

#[test]
fn shape_mismatch_is_rejected_whatever_the_strategy() {
    let mut model = SequentialBuilder::new("m")
        .add(Layer::input("in", &[3]))
        .add(Layer::new("d", LayerKind::Dense(Dense::new(2, ActivationFunction::Identity).without_bias())))
        .with_options(quiet(1))
        .build()
        .unwrap();
    model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mse).unwrap();

    let mut weights = HashMap::new();
    weights.insert("d_dense_kernel".to_string(), Tensor::new(vec![2, 3], vec![0.0; 6]).unwrap());
    for strategy in [MissedWeightsStrategy::Skip, MissedWeightsStrategy::Initialize, MissedWeightsStrategy::Fail] {
        assert!(matches!(
            model.load_weights(&weights, strategy),
            Err(ModelError::WeightShapeMismatch { .. })
        ));
    }
}
