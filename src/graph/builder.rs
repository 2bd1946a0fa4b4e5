//! Jet to graph conversion
//!
//! A jet becomes a graph in three steps:
//! - padding rows are dropped
//! - the remaining particle features are z-scored per column
//! - every particle receives edges from its k nearest neighbours

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::knn::knn_single;
use super::SparseGraph;
use crate::data::{
    remove_padding, standardize_columns, FeatureNormalizer, Jet, Label, NormalizationScope,
};
use crate::error::{Error, Result};

/// Graph construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Neighbours per node
    pub k: usize,
    /// Rows whose absolute feature sum is at most this are padding
    pub padding_epsilon: f64,
    /// Source of the z-score statistics
    pub normalization: NormalizationScope,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            k: 8,
            padding_epsilon: 1e-8,
            normalization: NormalizationScope::PerJet,
        }
    }
}

/// A jet as a graph: normalized particles as nodes, k-NN edges, label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JetGraph {
    /// Node features, shape (n, 4)
    pub x: Array2<f64>,
    /// Directed k-NN edges, no self-loops
    pub edges: SparseGraph,
    pub label: Label,
}

impl JetGraph {
    pub fn num_nodes(&self) -> usize {
        self.x.nrows()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.num_edges()
    }
}

/// Builds [`JetGraph`]s from raw jets
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    config: GraphConfig,
    normalizer: Option<FeatureNormalizer>,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            normalizer: None,
        }
    }

    /// Use a previously fitted dataset normalizer (e.g. from a checkpoint)
    pub fn with_normalizer(mut self, normalizer: FeatureNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn normalizer(&self) -> Option<&FeatureNormalizer> {
        self.normalizer.as_ref()
    }

    /// Fit the dataset-wide normalizer on the real particles of `jets`
    ///
    /// A no-op under per-jet normalization.
    pub fn fit_normalizer(&mut self, jets: &[Jet]) -> Result<()> {
        if self.config.normalization != NormalizationScope::Dataset {
            return Ok(());
        }
        let matrices: Vec<Array2<f64>> = jets
            .iter()
            .map(|jet| remove_padding(jet.feature_matrix().view(), self.config.padding_epsilon))
            .collect();

        let mut normalizer = FeatureNormalizer::new();
        normalizer.fit_many(matrices.iter().map(|m| m.view()))?;
        debug!(mean = ?normalizer.mean, std = ?normalizer.std, "Fitted dataset normalizer");
        self.normalizer = Some(normalizer);
        Ok(())
    }

    /// Convert one jet
    pub fn build(&self, jet: &Jet) -> Result<JetGraph> {
        let mut x = remove_padding(jet.feature_matrix().view(), self.config.padding_epsilon);
        if x.nrows() == 0 {
            return Err(Error::EmptyJet);
        }

        match self.config.normalization {
            NormalizationScope::PerJet => standardize_columns(&mut x),
            NormalizationScope::Dataset => {
                let normalizer = self.normalizer.as_ref().ok_or_else(|| {
                    Error::Config(
                        "dataset normalization requires a fitted normalizer".to_string(),
                    )
                })?;
                normalizer.apply(&mut x);
            }
        }

        let edges = knn_single(x.view(), self.config.k);
        Ok(JetGraph {
            x,
            edges,
            label: jet.label,
        })
    }

    /// Convert many jets, skipping the ones that are pure padding
    pub fn build_all(&self, jets: &[Jet]) -> Result<Vec<JetGraph>> {
        let mut graphs = Vec::with_capacity(jets.len());
        let mut skipped = 0usize;

        for jet in jets {
            match self.build(jet) {
                Ok(graph) => graphs.push(graph),
                Err(Error::EmptyJet) => skipped += 1,
                Err(e) => return Err(e),
            }
        }

        if skipped > 0 {
            warn!("Skipped {} jets with no particles", skipped);
        }
        debug!("Built {} graphs (k = {})", graphs.len(), self.config.k);
        Ok(graphs)
    }
}
