//! Particle feature preprocessing
//!
//! Padding removal and column-wise z-score normalization.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::jet::PARTICLE_FEATURES;
use crate::error::{Error, Result};

/// Standard deviations below this are treated as zero
const MIN_STD: f64 = 1e-12;

/// Where the z-score statistics come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationScope {
    /// Mean and std of each jet's own particles
    #[default]
    PerJet,
    /// Mean and std fitted once over all training particles
    Dataset,
}

/// Drop the (near) all-zero rows that pad a jet to fixed size
pub fn remove_padding(features: ArrayView2<f64>, epsilon: f64) -> Array2<f64> {
    let keep: Vec<usize> = features
        .outer_iter()
        .enumerate()
        .filter(|(_, row)| row.iter().map(|v| v.abs()).sum::<f64>() > epsilon)
        .map(|(i, _)| i)
        .collect();
    features.select(Axis(0), &keep)
}

/// Z-score every column in place using the matrix's own statistics
///
/// Columns with zero spread are only centred.
pub fn standardize_columns(features: &mut Array2<f64>) {
    if features.nrows() == 0 {
        return;
    }
    let mut normalizer = FeatureNormalizer::new();
    normalizer.fit(&features.view());
    normalizer.apply(features);
}

/// Column-wise z-score normalizer fitted on a set of particles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureNormalizer {
    pub mean: Option<Array1<f64>>,
    pub std: Option<Array1<f64>>,
}

impl Default for FeatureNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureNormalizer {
    pub fn new() -> Self {
        Self {
            mean: None,
            std: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.mean.is_some() && self.std.is_some()
    }

    /// Fit on a single matrix of particles (rows) by features (columns)
    pub fn fit(&mut self, data: &ArrayView2<f64>) {
        let n = data.nrows().max(1) as f64;
        let mean = data.sum_axis(Axis(0)) / n;
        let var = data
            .outer_iter()
            .fold(Array1::zeros(data.ncols()), |acc, row| {
                let d = &row - &mean;
                acc + &d * &d
            })
            / n;
        self.mean = Some(mean);
        self.std = Some(var.mapv(f64::sqrt));
    }

    /// Fit over the real particles of many jets
    pub fn fit_many<'a, I>(&mut self, matrices: I) -> Result<()>
    where
        I: IntoIterator<Item = ArrayView2<'a, f64>>,
    {
        let mut count = 0usize;
        let mut sum = Array1::<f64>::zeros(PARTICLE_FEATURES);
        let mut sum_sq = Array1::<f64>::zeros(PARTICLE_FEATURES);

        for m in matrices {
            if m.ncols() != PARTICLE_FEATURES {
                return Err(Error::shape(
                    format!("{} feature columns", PARTICLE_FEATURES),
                    format!("{} columns", m.ncols()),
                ));
            }
            count += m.nrows();
            sum = sum + m.sum_axis(Axis(0));
            sum_sq = sum_sq + m.mapv(|v| v * v).sum_axis(Axis(0));
        }

        if count == 0 {
            return Err(Error::EmptyDataset(
                "no particles to fit the normalizer on".to_string(),
            ));
        }

        let n = count as f64;
        let mean = sum / n;
        let var = (sum_sq / n - &mean * &mean).mapv(|v| v.max(0.0));
        self.mean = Some(mean);
        self.std = Some(var.mapv(f64::sqrt));
        Ok(())
    }

    /// Normalize in place; unfitted normalizers leave data untouched
    pub fn apply(&self, data: &mut Array2<f64>) {
        let (Some(mean), Some(std)) = (&self.mean, &self.std) else {
            return;
        };
        for mut row in data.outer_iter_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                let s = if std[j] > MIN_STD { std[j] } else { 1.0 };
                *v = (*v - mean[j]) / s;
            }
        }
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut out = data.clone();
        self.apply(&mut out);
        out
    }
}
