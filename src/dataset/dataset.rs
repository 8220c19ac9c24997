use rand::seq::SliceRandom;
use rand::RngCore;

use crate::error::{ModelError, Result};
use crate::math::matrix::Matrix;

/// Indexed access to features and labels.
///
/// A label is either a full target vector or a single value; a single value
/// is read as a class index when the model has more than one output.
pub trait Dataset {
    /// Number of examples.
    fn x_size(&self) -> usize;

    fn get_x(&self, index: usize) -> &[f64];

    fn get_y(&self, index: usize) -> &[f64];

    /// Reorders the examples in place.
    fn shuffle(&mut self, rng: &mut dyn RngCore);

    /// Splits into `(first, second)` where `first` holds the first
    /// `floor(x_size * ratio)` examples.
    fn split(&self, ratio: f64) -> Result<(OnHeapDataset, OnHeapDataset)>;

    fn is_empty(&self) -> bool {
        self.x_size() == 0
    }

    /// Features of `indices` stacked one example per row.
    fn batch_x(&self, indices: &[usize]) -> Matrix {
        let rows: Vec<&[f64]> = indices.iter().map(|&i| self.get_x(i)).collect();
        Matrix::from_rows(&rows)
    }
}

/// Dataset held entirely in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct OnHeapDataset {
    x: Vec<Vec<f64>>,
    y: Vec<Vec<f64>>,
}

impl OnHeapDataset {
    /// Pairs features with labels. All feature vectors must have the same
    /// length, and so must all labels.
    pub fn create(x: Vec<Vec<f64>>, y: Vec<Vec<f64>>) -> Result<OnHeapDataset> {
        if x.len() != y.len() {
            return Err(ModelError::InvalidArgument(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        check_uniform("feature", &x)?;
        check_uniform("label", &y)?;
        Ok(OnHeapDataset { x, y })
    }

    /// One scalar label (regression target or class index) per example.
    pub fn from_labels(x: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<OnHeapDataset> {
        OnHeapDataset::create(x, labels.into_iter().map(|l| vec![l]).collect())
    }

    pub fn x(&self) -> &[Vec<f64>] {
        &self.x
    }

    pub fn y(&self) -> &[Vec<f64>] {
        &self.y
    }
}

fn check_uniform(what: &str, rows: &[Vec<f64>]) -> Result<()> {
    if let Some(first) = rows.first() {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != first.len()) {
            return Err(ModelError::InvalidArgument(format!(
                "{what} row {i} has length {}, expected {}",
                row.len(),
                first.len()
            )));
        }
    }
    Ok(())
}

impl Dataset for OnHeapDataset {
    fn x_size(&self) -> usize {
        self.x.len()
    }

    fn get_x(&self, index: usize) -> &[f64] {
        &self.x[index]
    }

    fn get_y(&self, index: usize) -> &[f64] {
        &self.y[index]
    }

    fn shuffle(&mut self, rng: &mut dyn RngCore) {
        let mut order: Vec<usize> = (0..self.x.len()).collect();
        order.shuffle(rng);
        self.x = order.iter().map(|&i| std::mem::take(&mut self.x[i])).collect();
        self.y = order.iter().map(|&i| std::mem::take(&mut self.y[i])).collect();
    }

    fn split(&self, ratio: f64) -> Result<(OnHeapDataset, OnHeapDataset)> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ModelError::InvalidArgument(format!(
                "split ratio must be in [0, 1], got {ratio}"
            )));
        }
        let cut = (self.x.len() as f64 * ratio).floor() as usize;
        Ok((
            OnHeapDataset { x: self.x[..cut].to_vec(), y: self.y[..cut].to_vec() },
            OnHeapDataset { x: self.x[cut..].to_vec(), y: self.y[cut..].to_vec() },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn numbered(n: usize) -> OnHeapDataset {
        let x = (0..n).map(|i| vec![i as f64, -(i as f64)]).collect();
        let y = (0..n).map(|i| i as f64).collect();
        OnHeapDataset::from_labels(x, y).unwrap()
    }

    #[test]
    fn split_rounds_down_and_is_disjoint() {
        let data = numbered(1000);
        let (first, second) = data.split(0.1).unwrap();
        assert_eq!(first.x_size(), 100);
        assert_eq!(second.x_size(), 900);
        assert_eq!(second.get_y(0), &[100.0]);

        let (a, b) = numbered(7).split(0.5).unwrap();
        assert_eq!((a.x_size(), b.x_size()), (3, 4));
    }

    #[test]
    fn shuffle_keeps_pairs_together() {
        let mut data = numbered(50);
        data.shuffle(&mut StdRng::seed_from_u64(9));
        assert!((0..50).any(|i| data.get_y(i)[0] != i as f64));
        for i in 0..50 {
            assert_eq!(data.get_x(i)[0], data.get_y(i)[0]);
        }
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(OnHeapDataset::from_labels(vec![vec![1.0]], vec![]).is_err());
        assert!(OnHeapDataset::from_labels(vec![vec![1.0], vec![1.0, 2.0]], vec![0.0, 1.0]).is_err());
        assert!(numbered(3).split(1.5).is_err());
    }
}
