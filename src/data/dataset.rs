//! Graph datasets and mini-batch sampling

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::jet::Label;
use crate::error::{Error, Result};
use crate::graph::JetGraph;

/// A collection of labeled jet graphs
#[derive(Debug, Clone, Default)]
pub struct JetDataset {
    graphs: Vec<JetGraph>,
}

impl JetDataset {
    pub fn new(graphs: Vec<JetGraph>) -> Self {
        Self { graphs }
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn graphs(&self) -> &[JetGraph] {
        &self.graphs
    }

    /// Number of (gluon, quark) graphs
    pub fn class_counts(&self) -> (usize, usize) {
        let quarks = self
            .graphs
            .iter()
            .filter(|g| g.label == Label::Quark)
            .count();
        (self.graphs.len() - quarks, quarks)
    }

    /// Mean node count, 0 for an empty dataset
    pub fn mean_nodes(&self) -> f64 {
        if self.graphs.is_empty() {
            return 0.0;
        }
        self.graphs.iter().map(|g| g.num_nodes()).sum::<usize>() as f64 / self.graphs.len() as f64
    }

    /// Shuffle with `seed` and cut into train / validation / test
    ///
    /// The test part receives whatever the two fractions leave over.
    pub fn split(
        self,
        train_fraction: f64,
        val_fraction: f64,
        seed: u64,
    ) -> Result<(JetDataset, JetDataset, JetDataset)> {
        let (train, val, test) = split_shuffled(self.graphs, train_fraction, val_fraction, seed)?;
        Ok((
            JetDataset::new(train),
            JetDataset::new(val),
            JetDataset::new(test),
        ))
    }
}

/// Seeded shuffle of `items` cut into train / validation / test parts
pub fn split_shuffled<T>(
    mut items: Vec<T>,
    train_fraction: f64,
    val_fraction: f64,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>, Vec<T>)> {
    if !(0.0..=1.0).contains(&train_fraction)
        || !(0.0..=1.0).contains(&val_fraction)
        || train_fraction + val_fraction > 1.0 + 1e-9
    {
        return Err(Error::Config(format!(
            "invalid split fractions: train {} validation {}",
            train_fraction, val_fraction
        )));
    }

    items.shuffle(&mut StdRng::seed_from_u64(seed));

    let n = items.len();
    let n_train = (((n as f64) * train_fraction).round() as usize).min(n);
    let n_val = (((n as f64) * val_fraction).round() as usize).min(n - n_train);

    let test = items.split_off(n_train + n_val);
    let val = items.split_off(n_train);
    Ok((items, val, test))
}

/// Iterator over mini-batch index lists
pub struct BatchSampler {
    indices: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl BatchSampler {
    /// Sequential batches
    pub fn sequential(len: usize, batch_size: usize) -> Self {
        Self {
            indices: (0..len).collect(),
            batch_size: batch_size.max(1),
            position: 0,
        }
    }

    /// Batches over a shuffled permutation
    pub fn shuffled(len: usize, batch_size: usize, rng: &mut StdRng) -> Self {
        let mut sampler = Self::sequential(len, batch_size);
        sampler.indices.shuffle(rng);
        sampler
    }

    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }
}

impl Iterator for BatchSampler {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.indices.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.indices.len());
        let batch = self.indices[self.position..end].to_vec();
        self.position = end;
        Some(batch)
    }
}
