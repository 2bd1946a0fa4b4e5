//! # Quark/Gluon Jet Tagging with Graph Neural Networks
//!
//! Every jet becomes a k-nearest-neighbour graph over its particles and is
//! classified by one of two graph networks:
//!
//! - **GAT**: three multi-head graph attention layers on the static k-NN
//!   graph, mean pooling, linear head
//! - **DGCNN**: four edge convolutions that rebuild the k-NN graph from
//!   their own input, max+mean pooling, linear head
//!
//! ## Modules
//!
//! - `data`: jet types, CSV loading, synthetic jets, normalization, datasets
//! - `graph`: sparse graphs, k-NN construction, batching
//! - `nn`: parameters, dense layers, activations, pooling, loss, optimizers
//! - `model`: the two classifiers and checkpoints
//! - `training`: training loop and metrics
//! - `pipeline`: end-to-end data preparation and training
//! - `utils`: configuration and logging
//!
//! ## Example
//!
//! ```no_run
//! use qg_jet_gnn::prelude::*;
//!
//! fn main() -> qg_jet_gnn::Result<()> {
//!     let jets = SyntheticJets::generate(200, 40, 7)?;
//!     let builder = GraphBuilder::new(GraphConfig::default());
//!     let dataset = JetDataset::new(builder.build_all(&jets)?);
//!     let (train, val, test) = dataset.split(0.7, 0.15, 42)?;
//!
//!     let mut model = ModelState::from(GatClassifier::new(GatConfig::default())?);
//!     let trainer = Trainer::new(TrainingConfig::default());
//!     trainer.train(&mut model, &builder, &train, &val)?;
//!
//!     let report = trainer.evaluate(model.classifier_mut(), &test)?;
//!     println!("accuracy: {:.3}", report.accuracy);
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod graph;
pub mod model;
pub mod nn;
pub mod pipeline;
pub mod training;
pub mod utils;

pub use error::{Error, Result};

/// Crate version, recorded in checkpoints
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::data::{
        FeatureNormalizer, Jet, JetDataset, JetLoader, Label, NormalizationScope, Particle,
        SyntheticJets,
    };
    pub use crate::graph::{GraphBatch, GraphBuilder, GraphConfig, JetGraph, SparseGraph};
    pub use crate::model::{
        Checkpoint, DgcnnClassifier, DgcnnConfig, GatClassifier, GatConfig, GraphClassifier,
        ModelKind, ModelState,
    };
    pub use crate::training::{EvaluationReport, Trainer, TrainingConfig, TrainingHistory};
    pub use crate::utils::{setup_logging, Config};
}
