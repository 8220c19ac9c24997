// Trains a small linear regression model and optionally saves it.
//
//   RUST_LOG=info cargo run -- [save_dir]
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use graphite_nn::{
    ActivationFunction, FitConfig, Layer, LossType, Metrics, OnHeapDataset, Optimizer, SequentialBuilder,
    WritingMode, ModelOptions,
};

const COEFFICIENTS: [f64; 4] = [2.0, -1.0, 0.5, 3.0];
const INTERCEPT: f64 = 0.25;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let dataset = linear_dataset(1000, 42)?;
    let mut model = SequentialBuilder::new("linear_regression")
        .add(Layer::input("x", &[4]))
        .add(Layer::dense("y", 1, ActivationFunction::Identity))
        .with_options(ModelOptions::default().with_seed(7))
        .build()?;
    model.compile(Optimizer::sgd(0.01), LossType::Mse, Metrics::Mae)?;
    model.summary()?;

    let history = model.fit_with_validation_rate(&dataset, 0.1, &FitConfig::new(30, 5), &mut [])?;
    if let Some(last) = history.last_epoch_event() {
        println!("final training loss: {:.6}", last.loss_value);
    }

    let result = model.evaluate(&dataset, 256)?;
    println!("loss on the full dataset: {:.6}", result.loss_value);
    let learned = model.weights()?;
    if let Some(kernel) = learned.get("y_dense_kernel") {
        println!("learned coefficients: {:?} (true {:?})", kernel.data, COEFFICIENTS);
    }

    if let Some(dir) = std::env::args().nth(1) {
        model
            .save(&dir, WritingMode::Override, true)
            .with_context(|| format!("saving model to {dir}"))?;
        println!("saved to {dir}");
    }
    model.close();
    Ok(())
}

fn linear_dataset(n: usize, seed: u64) -> Result<OnHeapDataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    for _ in 0..n {
        let features: Vec<f64> = (0..COEFFICIENTS.len()).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let target = INTERCEPT + features.iter().zip(COEFFICIENTS).map(|(f, c)| f * c).sum::<f64>();
        x.push(features);
        y.push(vec![target + rng.gen_range(-0.01..0.01)]);
    }
    Ok(OnHeapDataset::create(x, y)?)
}
