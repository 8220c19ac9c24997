use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::RngCore;

use crate::dataset::dataset::Dataset;
use crate::error::{ModelError, Result};
use crate::graph::context::ExecutionContext;
use crate::graph::kgraph::KGraph;
use crate::logging::sink::LogSink;
use crate::loss::loss_type::LossType;
use crate::math::matrix::Matrix;
use crate::metric::metrics::Metrics;
use crate::optim::optimizer::OptimizerState;
use crate::train::callback::{Callback, CallbackAction};
use crate::train::evaluation::EvaluationResult;
use crate::train::history::{BatchEvent, BatchTrainingEvent, EpochTrainingEvent, EvaluationHistory, TrainingHistory};
use crate::train::train_config::{CompileConfig, FitConfig};

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Everything one training run mutates, borrowed from the model.
pub(crate) struct Session<'a> {
    pub graph: &'a mut KGraph,
    pub optimizer_state: &'a mut OptimizerState,
    pub compiled: &'a CompileConfig,
    pub rng: &'a mut StdRng,
    pub sink: &'a dyn LogSink,
}

/// Trains for `config.epochs` epochs and returns the recorded history.
///
/// # Early termination
/// The loop ends before the next epoch once any callback returns
/// `CallbackAction::Stop`. An error aborts training; parameters stay as of
/// the last completed batch.
pub(crate) fn train_loop(
    session: &mut Session<'_>,
    train: &dyn Dataset,
    validation: Option<&dyn Dataset>,
    config: &FitConfig,
    callbacks: &mut [&mut dyn Callback],
) -> Result<TrainingHistory> {
    config.validate()?;
    if train.is_empty() {
        return Err(ModelError::InvalidArgument("training dataset is empty".into()));
    }
    let mut history = TrainingHistory::default();
    for cb in callbacks.iter_mut() {
        cb.on_train_begin(config);
    }
    session.sink.info(&format!(
        "Training started: {} examples, {} epochs, batch size {}, optimizer {}",
        train.x_size(),
        config.epochs,
        config.train_batch_size,
        session.compiled.optimizer.name()
    ));

    let mut order: Vec<usize> = (0..train.x_size()).collect();

    for epoch in 0..config.epochs {
        let mut stop = false;
        for cb in callbacks.iter_mut() {
            stop |= cb.on_epoch_begin(epoch) == CallbackAction::Stop;
        }
        if stop {
            session.sink.info(&format!("Training stopped by a callback before epoch {epoch}"));
            break;
        }

        if config.shuffle {
            order.shuffle(&mut *session.rng);
        }

        let t_start = Instant::now();

        // ── One full pass over the training data ───────────────────────────
        let (loss_value, metric_value) = run_one_epoch(session, train, &order, epoch, config, &mut history, callbacks)
            .map_err(|e| {
                session.sink.warn(&format!("Training aborted in epoch {epoch}: {e}"));
                e
            })?;

        // ── Validation ────────────────────────────────────────────────────
        let metric = session.compiled.metric;
        let (val_loss_value, val_metric_value) = match validation {
            Some(val) => {
                let result = evaluate(
                    session.graph,
                    session.compiled,
                    &mut *session.rng,
                    val,
                    &[metric],
                    config.validation_batch_size,
                    callbacks,
                )?;
                (Some(result.loss_value), result.metric(metric))
            }
            None => (None, None),
        };

        let event = EpochTrainingEvent { epoch_index: epoch, loss_value, metric_value, val_loss_value, val_metric_value };
        session.sink.info(&epoch_line(&event, metric, config.epochs, t_start.elapsed().as_millis()));
        history.append_epoch(event.clone());

        // ── Callbacks ─────────────────────────────────────────────────────
        let mut stop = false;
        for cb in callbacks.iter_mut() {
            stop |= cb.on_epoch_end(&event, &mut *session.graph)? == CallbackAction::Stop;
        }
        if stop {
            session.sink.info(&format!("Training stopped by a callback after epoch {epoch}"));
            break;
        }
    }

    for cb in callbacks.iter_mut() {
        cb.on_train_end(&history, &mut *session.graph)?;
    }
    session.sink.info(&format!("Training finished after {} epochs", history.epoch_history().len()));
    Ok(history)
}

/// Inference-mode loss and `metrics` over `dataset`, batch by batch.
///
/// Batch values are weighted by the actual batch size, so the result does
/// not depend on `batch_size`. An empty dataset gives NaN everywhere. Every
/// batch is recorded in an `EvaluationHistory` handed to `on_test_end`.
pub(crate) fn evaluate(
    graph: &KGraph,
    compiled: &CompileConfig,
    rng: &mut dyn RngCore,
    dataset: &dyn Dataset,
    metrics: &[Metrics],
    batch_size: usize,
    callbacks: &mut [&mut dyn Callback],
) -> Result<EvaluationResult> {
    if batch_size == 0 {
        return Err(ModelError::InvalidArgument("batch size must be at least 1".into()));
    }
    let width = graph.plan().output_width();
    let output_layer = primary_output_name(graph);
    let indices: Vec<usize> = (0..dataset.x_size()).collect();
    let penalty = if compiled.regularization { graph.regularization_loss() } else { 0.0 };
    let mut history = EvaluationHistory::default();

    for cb in callbacks.iter_mut() {
        cb.on_test_begin();
    }

    let mut loss_sum = 0.0;
    let mut metric_sums = vec![0.0; metrics.len()];
    for (batch_index, chunk) in indices.chunks(batch_size).enumerate() {
        for cb in callbacks.iter_mut() {
            cb.on_test_batch_begin(batch_index, chunk.len());
        }
        let x = dataset.batch_x(chunk);
        let y = prepare_labels(dataset, chunk, width, &output_layer)?;
        let number_of_losses = compiled.loss.number_of_losses(chunk.len(), width);
        let ctx = ExecutionContext { training: false, number_of_losses };

        let trace = graph.forward(&x, &ctx, rng)?;
        let output = graph.primary_output(&trace);
        let weight = chunk.len() as f64;
        let loss_value = compiled.loss.value(output, &y, number_of_losses);
        loss_sum += loss_value * weight;

        let predictions = compiled.loss.predictions(output);
        let metric_values: Vec<(Metrics, f64)> =
            metrics.iter().map(|&metric| (metric, metric.compute(&predictions, &y))).collect();
        for (sum, (_, value)) in metric_sums.iter_mut().zip(&metric_values) {
            *sum += value * weight;
        }

        let event = BatchEvent { batch_index, loss_value: loss_value + penalty, metric_values, batch_size: chunk.len() };
        for cb in callbacks.iter_mut() {
            cb.on_test_batch_end(&event);
        }
        history.append_batch(event);
    }

    for cb in callbacks.iter_mut() {
        cb.on_test_end(&history);
    }

    let n = indices.len() as f64;
    Ok(EvaluationResult {
        loss_value: loss_sum / n + penalty,
        metrics: metrics.iter().copied().zip(metric_sums.into_iter().map(|s| s / n)).collect(),
    })
}

/// Inference-mode predictions of the primary output for a stacked batch.
pub(crate) fn predict_batch(graph: &KGraph, loss: LossType, rng: &mut dyn RngCore, x: &Matrix) -> Result<Matrix> {
    let trace = graph.forward(x, &ExecutionContext::inference(), rng)?;
    Ok(loss.predictions(graph.primary_output(&trace)))
}

/// Predictions for every example of `dataset`, computed `batch_size`
/// examples at a time with the predict hooks fired around each batch.
pub(crate) fn predict_dataset(
    graph: &KGraph,
    loss: LossType,
    rng: &mut dyn RngCore,
    dataset: &dyn Dataset,
    batch_size: usize,
    callbacks: &mut [&mut dyn Callback],
) -> Result<Vec<Vec<f64>>> {
    if batch_size == 0 {
        return Err(ModelError::InvalidArgument("batch size must be at least 1".into()));
    }
    for cb in callbacks.iter_mut() {
        cb.on_predict_begin();
    }

    let indices: Vec<usize> = (0..dataset.x_size()).collect();
    let mut result = Vec::with_capacity(indices.len());
    for (batch_index, chunk) in indices.chunks(batch_size).enumerate() {
        for cb in callbacks.iter_mut() {
            cb.on_predict_batch_begin(batch_index, chunk.len());
        }
        let predictions = predict_batch(graph, loss, rng, &dataset.batch_x(chunk))?;
        result.extend((0..predictions.rows).map(|r| predictions.row(r).to_vec()));
        for cb in callbacks.iter_mut() {
            cb.on_predict_batch_end(batch_index, chunk.len());
        }
    }

    for cb in callbacks.iter_mut() {
        cb.on_predict_end();
    }
    Ok(result)
}

/// Stacks the labels of `indices` into a `(batch, width)` target matrix.
///
/// A label as wide as the output is used as-is; a single value is a class
/// index and is one-hot encoded.
pub(crate) fn prepare_labels(
    dataset: &dyn Dataset,
    indices: &[usize],
    width: usize,
    output_layer: &str,
) -> Result<Matrix> {
    let mut y = Matrix::zeros(indices.len(), width);
    for (row, &index) in indices.iter().enumerate() {
        let label = dataset.get_y(index);
        let target = y.row_mut(row);
        if label.len() == width {
            target.copy_from_slice(label);
        } else if label.len() == 1 {
            target[class_index(label[0], width, index)?] = 1.0;
        } else {
            return Err(ModelError::ShapeMismatch {
                layer: output_layer.to_string(),
                expected: vec![width],
                actual: vec![label.len()],
            });
        }
    }
    Ok(y)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Runs one pass over `order` and returns the epoch loss and metric,
/// each weighted by batch size.
fn run_one_epoch(
    session: &mut Session<'_>,
    train: &dyn Dataset,
    order: &[usize],
    epoch: usize,
    config: &FitConfig,
    history: &mut TrainingHistory,
    callbacks: &mut [&mut dyn Callback],
) -> Result<(f64, f64)> {
    let mut loss_sum = 0.0;
    let mut metric_sum = 0.0;

    for (batch_index, indices) in order.chunks(config.train_batch_size).enumerate() {
        for cb in callbacks.iter_mut() {
            cb.on_train_batch_begin(batch_index, indices.len());
        }
        let event = train_batch(session, train, indices, epoch, batch_index)?;
        loss_sum += event.loss_value * event.batch_size as f64;
        metric_sum += event.metric_value * event.batch_size as f64;
        session.sink.debug(&format!(
            "epoch {epoch} batch {batch_index}: loss {:.6}, size {}",
            event.loss_value, event.batch_size
        ));

        for cb in callbacks.iter_mut() {
            cb.on_train_batch_end(&event);
        }
        history.append_batch(event);
    }

    let n = order.len() as f64;
    Ok((loss_sum / n, metric_sum / n))
}

/// Forward, backward and one optimizer step on a single batch.
///
/// Nothing is written unless loss, gradients and updated values are all
/// finite.
fn train_batch(
    session: &mut Session<'_>,
    train: &dyn Dataset,
    indices: &[usize],
    epoch_index: usize,
    batch_index: usize,
) -> Result<BatchTrainingEvent> {
    let compiled = session.compiled;
    let width = session.graph.plan().output_width();
    let output_layer = primary_output_name(session.graph);

    let x = train.batch_x(indices);
    let y = prepare_labels(train, indices, width, &output_layer)?;
    let number_of_losses = compiled.loss.number_of_losses(indices.len(), width);
    let ctx = ExecutionContext::training(number_of_losses);

    let mut trace = session.graph.forward(&x, &ctx, &mut *session.rng)?;
    let output = session.graph.primary_output(&trace);

    let mut loss_value = compiled.loss.value(output, &y, number_of_losses);
    if compiled.regularization {
        loss_value += session.graph.regularization_loss();
    }
    if !loss_value.is_finite() {
        return Err(ModelError::NonFiniteLoss { epoch: epoch_index, batch: batch_index, value: loss_value });
    }
    let metric_value = compiled.metric.compute(&compiled.loss.predictions(output), &y);
    let grad = compiled.loss.gradient(output, &y, number_of_losses);

    let grads = session.graph.backward(&trace, &grad, compiled.regularization);
    if let Some((id, _)) = grads.iter().find(|(_, g)| !g.is_finite()) {
        let variable = session.graph.variables().by_id(*id).name.clone();
        return Err(ModelError::NonFiniteGradient { variable });
    }

    let updates = trace.take_updates();
    session.graph.check_updates(&updates)?;
    compiled
        .optimizer
        .apply(&mut *session.optimizer_state, session.graph.variables_mut(), grads)?;
    session.graph.commit_updates(updates)?;

    Ok(BatchTrainingEvent {
        epoch_index,
        batch_index,
        loss_value,
        metric_value,
        batch_size: indices.len(),
    })
}

fn class_index(value: f64, width: usize, index: usize) -> Result<usize> {
    if value.fract() != 0.0 || value < 0.0 || value >= width as f64 {
        return Err(ModelError::InvalidLabel {
            index,
            reason: format!("{value} is not a class index below {width}"),
        });
    }
    Ok(value as usize)
}

fn primary_output_name(graph: &KGraph) -> String {
    let topology = &graph.plan().topology;
    topology.layers[topology.outputs[0]].name.clone()
}

fn epoch_line(event: &EpochTrainingEvent, metric: Metrics, total_epochs: usize, elapsed_ms: u128) -> String {
    let mut line = format!(
        "Epoch {}/{}: loss {:.6}, {metric} {:.6}",
        event.epoch_index + 1,
        total_epochs,
        event.loss_value,
        event.metric_value
    );
    if let (Some(loss), Some(value)) = (event.val_loss_value, event.val_metric_value) {
        line.push_str(&format!(", val_loss {loss:.6}, val_{metric} {value:.6}"));
    }
    line.push_str(&format!(" ({elapsed_ms} ms)"));
    line
}
