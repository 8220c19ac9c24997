use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::channel;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use graphite_nn::layers::{Dense, LayerKind};
use graphite_nn::train::{BatchEvent, CompileConfig, EvaluationHistory, Mode, Monitor, ProgressReporter, StopFlag};
use graphite_nn::{
    ActivationFunction, Callback, Dataset, EarlyStopping, FitConfig, FunctionalBuilder, GraphModel, Layer, LossType,
    MissedWeightsStrategy, ModelError, ModelOptions, Metrics, NullSink, OnHeapDataset, Optimizer, Regularizer,
    SequentialBuilder, Tensor,
};

fn quiet(seed: u64) -> ModelOptions {
    ModelOptions::default().with_seed(seed).with_sink(Arc::new(NullSink))
}

fn regression_data(n: usize, seed: u64) -> OnHeapDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let x: Vec<Vec<f64>> = (0..n).map(|_| vec![rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)]).collect();
    let y: Vec<Vec<f64>> = x.iter().map(|r| vec![r[0] * r[1] + 0.5]).collect();
    OnHeapDataset::create(x, y).unwrap()
}

fn regressor(seed: u64) -> GraphModel {
    let mut model = SequentialBuilder::new("regressor")
        .add(Layer::input("in", &[2]))
        .add(Layer::dense("hidden", 3, ActivationFunction::Tanh))
        .add(Layer::dense("out", 1, ActivationFunction::Identity))
        .with_options(quiet(seed))
        .build()
        .unwrap();
    model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae).unwrap();
    model
}

/// `Input(width) -> Dense(width)` whose kernel is the identity.
fn identity_model(width: usize) -> GraphModel {
    let mut model = SequentialBuilder::new("identity")
        .add(Layer::input("in", &[width]))
        .add(Layer::dense("out", width, ActivationFunction::Identity))
        .with_options(quiet(0))
        .build()
        .unwrap();
    model.compile(Optimizer::sgd(0.1), LossType::Mse, Metrics::Accuracy).unwrap();

    let mut kernel = vec![0.0; width * width];
    for i in 0..width {
        kernel[i * width + i] = 1.0;
    }
    let mut weights = HashMap::new();
    weights.insert("out_dense_kernel".to_string(), Tensor::new(vec![width, width], kernel).unwrap());
    weights.insert("out_dense_bias".to_string(), Tensor::new(vec![width], vec![0.0; width]).unwrap());
    model.load_weights(&weights, MissedWeightsStrategy::Fail).unwrap();
    model
}

#[test]
fn evaluation_does_not_depend_on_batch_size() {
    let data = regression_data(10, 1);
    let mut model = regressor(4);
    let full = model.evaluate(&data, 10).unwrap();
    for batch_size in [3, 7, 1, 64] {
        let result = model.evaluate(&data, batch_size).unwrap();
        assert_abs_diff_eq!(result.loss_value, full.loss_value, epsilon = 1e-12);
        assert_abs_diff_eq!(result.metric(Metrics::Mae).unwrap(), full.metric(Metrics::Mae).unwrap(), epsilon = 1e-12);
    }
}

#[test]
fn epoch_loss_weights_the_short_last_batch() {
    let data = regression_data(10, 2);
    let mut model = regressor(5);
    let history = model.fit(&data, None, &FitConfig::new(1, 4), &mut []).unwrap();

    let sizes: Vec<usize> = history.batch_history().iter().map(|e| e.batch_size).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    let weighted: f64 = history.batch_history().iter().map(|e| e.loss_value * e.batch_size as f64).sum::<f64>() / 10.0;
    assert_abs_diff_eq!(history.epoch_history()[0].loss_value, weighted, epsilon = 1e-12);
}

#[test]
fn accuracy_boundaries() {
    let mut model = identity_model(2);
    let x = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]];

    let right = OnHeapDataset::from_labels(x.clone(), vec![0.0, 1.0, 0.0]).unwrap();
    assert_eq!(model.evaluate(&right, 2).unwrap().metric(Metrics::Accuracy), Some(1.0));

    let wrong = OnHeapDataset::from_labels(x, vec![1.0, 0.0, 1.0]).unwrap();
    assert_eq!(model.evaluate(&wrong, 2).unwrap().metric(Metrics::Accuracy), Some(0.0));

    let mut binary = identity_model(1);
    let data = OnHeapDataset::from_labels(vec![vec![0.7], vec![0.2], vec![0.5]], vec![1.0, 0.0, 1.0]).unwrap();
    assert_eq!(binary.evaluate(&data, 3).unwrap().metric(Metrics::Accuracy), Some(1.0));
}

#[test]
fn empty_dataset_evaluates_to_nan() {
    let mut model = regressor(1);
    let empty = OnHeapDataset::create(Vec::new(), Vec::new()).unwrap();
    let result = model.evaluate_metrics(&empty, &[Metrics::Mae, Metrics::Msle], 4).unwrap();
    assert!(result.loss_value.is_nan());
    assert!(result.metric(Metrics::Mae).unwrap().is_nan());
}

#[test]
fn class_indices_out_of_range_are_rejected() {
    let mut model = identity_model(3);
    let data = OnHeapDataset::from_labels(vec![vec![1.0, 0.0, 0.0]], vec![5.0]).unwrap();
    assert!(matches!(model.evaluate(&data, 1), Err(ModelError::InvalidLabel { index: 0, .. })));
}

#[test]
fn early_stopping_with_a_frozen_loss() {
    let data = regression_data(20, 3);
    let mut model = SequentialBuilder::new("frozen_loss")
        .add(Layer::input("in", &[2]))
        .add(Layer::dense("out", 1, ActivationFunction::Identity))
        .with_options(quiet(8))
        .build()
        .unwrap();
    model.compile(Optimizer::sgd(0.0), LossType::Mse, Metrics::Mae).unwrap();

    let mut stopping = EarlyStopping::new(Monitor::Loss, Mode::Min, 0);
    let history = model.fit(&data, None, &FitConfig::new(10, 5), &mut [&mut stopping]).unwrap();
    assert_eq!(history.epoch_history().len(), 2);
    assert_eq!(stopping.stopped_epoch(), Some(1));
}

#[test]
fn early_stopping_restores_the_best_weights() {
    // Training pulls the prediction for x = 1 from 1 towards 2, so the
    // validation loss against y = 1 grows every epoch after the first.
    let mut model = identity_model(1);
    let train = OnHeapDataset::create(vec![vec![1.0]], vec![vec![2.0]]).unwrap();
    let validation = OnHeapDataset::create(vec![vec![1.0]], vec![vec![1.0]]).unwrap();

    let mut stopping = EarlyStopping::new(Monitor::ValLoss, Mode::Min, 1).with_restore_best_weights(true);
    let history = model
        .fit(&train, Some(&validation), &FitConfig::new(20, 1), &mut [&mut stopping])
        .unwrap();

    assert_eq!(stopping.stopped_epoch(), Some(1));
    let epochs = history.epoch_history();
    assert_eq!(epochs.len(), 2);
    let (best, worse) = (epochs[0].val_loss_value.unwrap(), epochs[1].val_loss_value.unwrap());
    assert!(worse > best);
    assert_eq!(stopping.best(), best);

    let restored = model.evaluate(&validation, 256).unwrap().loss_value;
    assert_abs_diff_eq!(restored, best, epsilon = 1e-12);
    let prediction = model.predict_softly(&[1.0]).unwrap()[0];
    assert_abs_diff_eq!(prediction, 1.0 + best.sqrt(), epsilon = 1e-9);
}

#[test]
fn non_finite_features_abort_without_touching_weights() {
    let mut model = regressor(9);
    let before = model.weights().unwrap();
    let data = OnHeapDataset::create(vec![vec![0.1, 0.2], vec![f64::NAN, 0.0]], vec![vec![1.0], vec![0.0]]).unwrap();

    let result = model.fit(&data, None, &FitConfig::new(3, 2), &mut []);
    assert!(matches!(result, Err(ModelError::NonFiniteLoss { epoch: 0, batch: 0, .. })));
    assert_eq!(model.weights().unwrap(), before);
}

#[test]
fn failure_in_a_later_batch_keeps_the_completed_steps() {
    let rows = vec![vec![0.1, 0.2], vec![-0.4, 0.7], vec![f64::NAN, 0.0], vec![0.3, -0.3]];
    let labels = vec![vec![1.0], vec![0.0], vec![0.5], vec![0.2]];
    let data = OnHeapDataset::create(rows.clone(), labels.clone()).unwrap();
    let first_batch = OnHeapDataset::create(rows[..2].to_vec(), labels[..2].to_vec()).unwrap();

    let mut reference = regressor(9);
    reference.fit(&first_batch, None, &FitConfig::new(1, 2), &mut []).unwrap();

    let mut model = regressor(9);
    let before = model.weights().unwrap();
    let result = model.fit(&data, None, &FitConfig::new(3, 2), &mut []);

    assert!(matches!(result, Err(ModelError::NonFiniteLoss { epoch: 0, batch: 1, .. })));
    let after = model.weights().unwrap();
    assert_ne!(after, before);
    assert_eq!(after, reference.weights().unwrap());
}

#[test]
fn overflowing_update_is_rejected_before_it_lands() {
    let mut model = SequentialBuilder::new("overflow")
        .add(Layer::input("in", &[1]))
        .add(Layer::dense("out", 1, ActivationFunction::Identity))
        .with_options(quiet(0))
        .build()
        .unwrap();
    model.compile(Optimizer::sgd(1e308), LossType::Mse, Metrics::Mae).unwrap();
    let mut weights = HashMap::new();
    weights.insert("out_dense_kernel".to_string(), Tensor::new(vec![1, 1], vec![1.0]).unwrap());
    weights.insert("out_dense_bias".to_string(), Tensor::new(vec![1], vec![0.0]).unwrap());
    model.load_weights(&weights, MissedWeightsStrategy::Fail).unwrap();
    let before = model.weights().unwrap();

    // loss 4 and gradient -4 are finite; 1e308 * 4 is not.
    let data = OnHeapDataset::create(vec![vec![1.0]], vec![vec![3.0]]).unwrap();
    let result = model.fit(&data, None, &FitConfig::new(1, 1), &mut []);

    assert!(matches!(result, Err(ModelError::NonFiniteUpdate { ref variable }) if variable.starts_with("out_dense")));
    assert_eq!(model.weights().unwrap(), before);
}

#[test]
fn stop_flag_and_progress_reporter() {
    let data = regression_data(8, 5);
    let mut model = regressor(3);

    let flag = Arc::new(AtomicBool::new(true));
    let mut stop = StopFlag::new(Arc::clone(&flag));
    let history = model.fit(&data, None, &FitConfig::new(5, 4), &mut [&mut stop]).unwrap();
    assert!(history.epoch_history().is_empty());

    let (tx, rx) = channel();
    let mut reporter = ProgressReporter::new(tx);
    model.fit(&data, None, &FitConfig::new(3, 4), &mut [&mut reporter]).unwrap();
    let epochs: Vec<usize> = rx.try_iter().map(|s| s.epoch).collect();
    assert_eq!(epochs, vec![1, 2, 3]);
}

#[test]
fn shuffling_is_reproducible_with_a_seed() {
    let data = regression_data(30, 6);
    let config = FitConfig::new(4, 7).with_shuffle(true);
    let mut first = regressor(12);
    let mut second = regressor(12);
    let a = first.fit(&data, None, &config, &mut []).unwrap();
    let b = second.fit(&data, None, &config, &mut []).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.weights().unwrap(), second.weights().unwrap());
}

#[test]
fn classifier_learns_separable_clusters() {
    let mut rng = StdRng::seed_from_u64(13);
    let mut x = Vec::new();
    let mut labels = Vec::new();
    for i in 0..90 {
        let class = i % 3;
        let mut point: Vec<f64> = (0..3).map(|_| rng.gen_range(-0.3..0.3)).collect();
        point[class] += 2.0;
        x.push(point);
        labels.push(class as f64);
    }
    let mut data = OnHeapDataset::from_labels(x, labels).unwrap();
    data.shuffle(&mut rng);

    let mut model = SequentialBuilder::new("clusters")
        .add(Layer::input("in", &[3]))
        .add(Layer::dense("hidden", 8, ActivationFunction::ReLU))
        .add(Layer::batch_norm("norm"))
        .add(Layer::dropout("drop", 0.1))
        .add(Layer::dense("logits", 3, ActivationFunction::Identity))
        .with_options(quiet(14))
        .build()
        .unwrap();
    model
        .compile(Optimizer::adam(0.05), LossType::SoftmaxCrossEntropyWithLogits, Metrics::Accuracy)
        .unwrap();

    let moving_mean_before = model.weights().unwrap().get("norm_batch_norm_moving_mean").cloned();
    let history = model.fit_with_validation_rate(&data, 0.2, &FitConfig::new(40, 8), &mut []).unwrap();
    assert!(history.last_epoch_event().and_then(|e| e.val_metric_value).is_some());

    let result = model.evaluate(&data, 32).unwrap();
    assert!(result.metric(Metrics::Accuracy).unwrap() >= 0.9, "{result:?}");
    assert_ne!(model.weights().unwrap().get("norm_batch_norm_moving_mean").cloned(), moving_mean_before);

    let probabilities = model.predict_softly(&data.x()[0]).unwrap();
    assert_abs_diff_eq!(probabilities.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    let predicted = model.predict_dataset(&data, 7).unwrap();
    assert_eq!(predicted.len(), 90);
}

#[test]
fn frozen_layers_keep_their_weights() {
    let data = regression_data(16, 7);
    let mut model = SequentialBuilder::new("partly_frozen")
        .add(Layer::input("in", &[2]))
        .add(Layer::dense("base", 4, ActivationFunction::Tanh).frozen())
        .add(Layer::dense("head", 1, ActivationFunction::Identity))
        .with_options(quiet(15))
        .build()
        .unwrap();
    model.compile(Optimizer::adam(0.01), LossType::Mse, Metrics::Mse).unwrap();

    let before = model.weights().unwrap();
    model.fit(&data, None, &FitConfig::new(3, 4), &mut []).unwrap();
    let after = model.weights().unwrap();
    assert_eq!(after.get("base_dense_kernel"), before.get("base_dense_kernel"));
    assert_ne!(after.get("head_dense_kernel"), before.get("head_dense_kernel"));
    assert!(after.optimizer.unwrap().slots.keys().all(|k| k.starts_with("optimizer_head_")));
}

#[test]
fn regularization_adds_the_weight_penalty() {
    let data = regression_data(12, 8);
    let build = |regularization: bool| {
        let dense = Dense::new(2, ActivationFunction::Identity).with_kernel_regularizer(Regularizer::L2 { l2: 0.5 });
        let mut model = SequentialBuilder::new("l2")
            .add(Layer::input("in", &[2]))
            .add(Layer::new("hidden", LayerKind::Dense(dense)))
            .add(Layer::dense("out", 1, ActivationFunction::Identity))
            .with_options(quiet(16))
            .build()
            .unwrap();
        let config = CompileConfig::new(Optimizer::sgd(0.1), LossType::Mse, Metrics::Mae)
            .with_regularization(regularization);
        model.compile_with(config).unwrap();
        model
    };

    let mut plain = build(false);
    let mut penalized = build(true);
    let kernel = plain.weights().unwrap().get("hidden_dense_kernel").cloned().unwrap();
    let penalty: f64 = 0.5 * kernel.data.iter().map(|w| w * w).sum::<f64>();

    let difference = penalized.evaluate(&data, 5).unwrap().loss_value - plain.evaluate(&data, 5).unwrap().loss_value;
    assert_abs_diff_eq!(difference, penalty, epsilon = 1e-12);
}

#[test]
fn validation_rate_must_be_a_proper_fraction() {
    let data = regression_data(10, 9);
    let mut model = regressor(1);
    for rate in [0.0, 1.0, -0.5, f64::NAN] {
        assert!(matches!(
            model.fit_with_validation_rate(&data, rate, &FitConfig::default(), &mut []),
            Err(ModelError::InvalidArgument(_))
        ));
    }
}

#[test]
fn multi_output_models_expose_every_output() {
    let mut model = FunctionalBuilder::new("two_heads")
        .add(Layer::input("in", &[3]))
        .add(Layer::dense("trunk", 4, ActivationFunction::ReLU).with_inbound(&["in"]))
        .add(Layer::dense("main", 2, ActivationFunction::Identity).with_inbound(&["trunk"]))
        .add(Layer::dense("aux", 1, ActivationFunction::Sigmoid).with_inbound(&["trunk"]))
        .with_outputs(&["main", "aux"])
        .with_options(quiet(17))
        .build()
        .unwrap();
    model
        .compile(Optimizer::sgd(0.1), LossType::SoftmaxCrossEntropyWithLogits, Metrics::Accuracy)
        .unwrap();

    let input = [0.3, -0.1, 0.8];
    let outputs = model.predict_outputs(&input).unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0], model.predict_softly(&input).unwrap());
    assert_eq!(outputs[1].len(), 1);

    let (class, activations) = model.predict_and_get_activations(&input).unwrap();
    assert_eq!(class, model.predict(&input).unwrap());
    let names: Vec<_> = activations.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["in", "trunk", "main", "aux"]);

    let data = OnHeapDataset::from_labels(vec![input.to_vec(); 4], vec![1.0; 4]).unwrap();
    model.fit(&data, None, &FitConfig::new(2, 2), &mut []).unwrap();
}

#[derive(Default)]
struct HookLog {
    calls: Vec<String>,
    test_batches: Vec<(usize, f64)>,
}

impl Callback for HookLog {
    fn on_train_batch_begin(&mut self, batch_index: usize, batch_size: usize) {
        self.calls.push(format!("train_batch_begin {batch_index} {batch_size}"));
    }

    fn on_test_begin(&mut self) {
        self.calls.push("test_begin".into());
    }

    fn on_test_batch_begin(&mut self, batch_index: usize, batch_size: usize) {
        self.calls.push(format!("test_batch_begin {batch_index} {batch_size}"));
    }

    fn on_test_batch_end(&mut self, event: &BatchEvent) {
        self.calls.push(format!("test_batch_end {}", event.batch_index));
    }

    fn on_test_end(&mut self, history: &EvaluationHistory) {
        self.test_batches = history.batch_history().iter().map(|e| (e.batch_size, e.loss_value)).collect();
        self.calls.push("test_end".into());
    }

    fn on_predict_begin(&mut self) {
        self.calls.push("predict_begin".into());
    }

    fn on_predict_batch_begin(&mut self, batch_index: usize, batch_size: usize) {
        self.calls.push(format!("predict_batch_begin {batch_index} {batch_size}"));
    }

    fn on_predict_batch_end(&mut self, batch_index: usize, batch_size: usize) {
        self.calls.push(format!("predict_batch_end {batch_index} {batch_size}"));
    }

    fn on_predict_end(&mut self) {
        self.calls.push("predict_end".into());
    }
}

#[test]
fn evaluation_and_prediction_fire_their_hooks() {
    let data = regression_data(5, 7);
    let mut model = regressor(2);

    let mut log = HookLog::default();
    let result = model.evaluate_with_callbacks(&data, 2, &mut [&mut log]).unwrap();
    assert_eq!(
        log.calls,
        vec![
            "test_begin",
            "test_batch_begin 0 2",
            "test_batch_end 0",
            "test_batch_begin 1 2",
            "test_batch_end 1",
            "test_batch_begin 2 1",
            "test_batch_end 2",
            "test_end"
        ]
    );
    let sizes: Vec<usize> = log.test_batches.iter().map(|&(size, _)| size).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    let weighted = log.test_batches.iter().map(|&(size, loss)| size as f64 * loss).sum::<f64>() / 5.0;
    assert_abs_diff_eq!(weighted, result.loss_value, epsilon = 1e-12);

    let mut log = HookLog::default();
    let predictions = model.predict_softly_dataset_with_callbacks(&data, 4, &mut [&mut log]).unwrap();
    assert_eq!(predictions.len(), 5);
    assert_eq!(
        log.calls,
        vec![
            "predict_begin",
            "predict_batch_begin 0 4",
            "predict_batch_end 0 4",
            "predict_batch_begin 1 1",
            "predict_batch_end 1 1",
            "predict_end"
        ]
    );

    let mut log = HookLog::default();
    let config = FitConfig::new(1, 5).with_validation_batch_size(5);
    model.fit(&data, Some(&data), &config, &mut [&mut log]).unwrap();
    assert_eq!(
        log.calls,
        vec!["train_batch_begin 0 5", "test_begin", "test_batch_begin 0 5", "test_batch_end 0", "test_end"]
    );
}

#[test]
fn empty_training_data_is_rejected() {
    let mut model = regressor(4);
    let before = model.weights().unwrap();
    let empty = OnHeapDataset::create(Vec::new(), Vec::new()).unwrap();
    assert!(matches!(
        model.fit(&empty, None, &FitConfig::new(2, 4), &mut []),
        Err(ModelError::InvalidArgument(_))
    ));
    assert_eq!(model.weights().unwrap(), before);
}
