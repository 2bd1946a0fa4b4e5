//! Graph classifiers and checkpoints
//!
//! - [`GatClassifier`]: static k-NN graph, multi-head attention
//! - [`DgcnnClassifier`]: k-NN recomputed inside every edge convolution

mod dgcnn;
mod gat;

pub use dgcnn::{DgcnnClassifier, DgcnnConfig, EdgeConv};
pub use gat::{GatClassifier, GatConfig, GatConv};

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::FeatureNormalizer;
use crate::error::{Error, Result};
use crate::graph::{GraphBatch, GraphBuilder, GraphConfig};
use crate::nn::{softmax, Parameter};

/// A trainable graph-level classifier
///
/// `forward` caches whatever `backward` needs; `backward` consumes that
/// cache and accumulates parameter gradients, so it must follow exactly
/// one `forward`.
pub trait GraphClassifier: Send + Sync {
    /// Short identifier, also used as checkpoint file stem
    fn name(&self) -> &'static str;

    /// Class logits, shape (num_graphs, num_classes)
    fn forward(&mut self, batch: &GraphBatch) -> Result<Array2<f64>>;

    /// Backpropagate the loss gradient w.r.t. the logits
    fn backward(&mut self, grad_logits: &Array2<f64>) -> Result<()>;

    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    fn num_parameters(&self) -> usize;

    fn zero_grad(&mut self) {
        for param in self.parameters_mut() {
            param.zero_grad();
        }
    }

    /// Class probabilities
    fn predict_proba(&mut self, batch: &GraphBatch) -> Result<Array2<f64>> {
        Ok(softmax(&self.forward(batch)?))
    }
}

/// Available architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Gat,
    Dgcnn,
}

impl ModelKind {
    pub fn all() -> [ModelKind; 2] {
        [ModelKind::Gat, ModelKind::Dgcnn]
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Gat => "gat",
            ModelKind::Dgcnn => "dgcnn",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gat" => Ok(ModelKind::Gat),
            "dgcnn" => Ok(ModelKind::Dgcnn),
            other => Err(Error::Config(format!("unknown model kind '{}'", other))),
        }
    }
}

/// Trained weights of either architecture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "network", rename_all = "snake_case")]
pub enum ModelState {
    Gat(GatClassifier),
    Dgcnn(DgcnnClassifier),
}

impl ModelState {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelState::Gat(_) => ModelKind::Gat,
            ModelState::Dgcnn(_) => ModelKind::Dgcnn,
        }
    }

    pub fn classifier(&self) -> &dyn GraphClassifier {
        match self {
            ModelState::Gat(model) => model,
            ModelState::Dgcnn(model) => model,
        }
    }

    pub fn classifier_mut(&mut self) -> &mut dyn GraphClassifier {
        match self {
            ModelState::Gat(model) => model,
            ModelState::Dgcnn(model) => model,
        }
    }

    pub fn into_classifier(self) -> Box<dyn GraphClassifier> {
        match self {
            ModelState::Gat(model) => Box::new(model),
            ModelState::Dgcnn(model) => Box::new(model),
        }
    }
}

impl From<GatClassifier> for ModelState {
    fn from(model: GatClassifier) -> Self {
        ModelState::Gat(model)
    }
}

impl From<DgcnnClassifier> for ModelState {
    fn from(model: DgcnnClassifier) -> Self {
        ModelState::Dgcnn(model)
    }
}

/// Everything needed to classify new jets with a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Crate version that wrote the file
    pub version: String,
    pub graph: GraphConfig,
    /// Present only for dataset-scope normalization
    pub normalizer: Option<FeatureNormalizer>,
    pub model: ModelState,
    /// Epoch the weights come from (1-based)
    pub epoch: usize,
    pub val_accuracy: Option<f64>,
}

impl Checkpoint {
    pub fn new(model: impl Into<ModelState>, builder: &GraphBuilder) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            graph: builder.config().clone(),
            normalizer: builder.normalizer().cloned(),
            model: model.into(),
            epoch: 0,
            val_accuracy: None,
        }
    }

    /// Record the epoch, and its validation accuracy when there was one
    pub fn with_epoch(mut self, epoch: usize, val_accuracy: Option<f64>) -> Self {
        self.epoch = epoch;
        self.val_accuracy = val_accuracy;
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.model.kind()
    }

    /// Graph builder configured the way the model was trained
    pub fn graph_builder(&self) -> GraphBuilder {
        let builder = GraphBuilder::new(self.graph.clone());
        match &self.normalizer {
            Some(normalizer) => builder.with_normalizer(normalizer.clone()),
            None => builder,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        info!("Saved {} checkpoint to {}", self.kind(), path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let checkpoint: Self = serde_json::from_reader(reader)?;
        info!(
            "Loaded {} checkpoint from {} (epoch {})",
            checkpoint.kind(),
            path.display(),
            checkpoint.epoch
        );
        Ok(checkpoint)
    }

    pub fn into_classifier(self) -> Box<dyn GraphClassifier> {
        self.model.into_classifier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticJets;
    use crate::graph::JetGraph;
    use tempfile::tempdir;

    fn sample_batch() -> (GraphBuilder, Vec<JetGraph>) {
        let jets = SyntheticJets::generate(4, 20, 9).unwrap();
        let builder = GraphBuilder::new(GraphConfig::default());
        let graphs = builder.build_all(&jets).unwrap();
        (builder, graphs)
    }

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("GAT".parse::<ModelKind>().unwrap(), ModelKind::Gat);
        assert_eq!("dgcnn".parse::<ModelKind>().unwrap(), ModelKind::Dgcnn);
        assert!("mlp".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_zero_grad_clears_gradients() {
        let (_, graphs) = sample_batch();
        let batch = GraphBatch::select(&graphs, &[0, 1]).unwrap();
        let mut model = GatClassifier::new(GatConfig::default()).unwrap();

        let logits = model.forward(&batch).unwrap();
        model.backward(&Array2::ones(logits.dim())).unwrap();
        assert!(model.parameters_mut().iter().all(|p| p.grad().is_some()));

        model.zero_grad();
        assert!(model.parameters_mut().iter().all(|p| p.grad().is_none()));
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let (_, graphs) = sample_batch();
        let batch = GraphBatch::select(&graphs, &[0, 1, 2]).unwrap();
        let mut model = DgcnnClassifier::new(DgcnnConfig::default()).unwrap();

        let probs = model.predict_proba(&batch).unwrap();
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_checkpoint_round_trip_reproduces_logits() {
        let (builder, graphs) = sample_batch();
        let batch = GraphBatch::select(&graphs, &[0, 1, 2, 3]).unwrap();
        let dir = tempdir().unwrap();

        for state in [
            ModelState::from(GatClassifier::new(GatConfig::default()).unwrap()),
            ModelState::from(DgcnnClassifier::new(DgcnnConfig::default()).unwrap()),
        ] {
            let path = dir.path().join(format!("{}.json", state.kind()));
            let mut original = state.clone().into_classifier();
            let expected = original.forward(&batch).unwrap();

            Checkpoint::new(state, &builder)
                .with_epoch(3, Some(0.75))
                .save(&path)
                .unwrap();
            let loaded = Checkpoint::load(&path).unwrap();
            assert_eq!(loaded.epoch, 3);
            assert_eq!(loaded.val_accuracy, Some(0.75));
            assert_eq!(loaded.graph, GraphConfig::default());

            let mut restored = loaded.into_classifier();
            assert_eq!(restored.forward(&batch).unwrap(), expected);
        }
    }
}
