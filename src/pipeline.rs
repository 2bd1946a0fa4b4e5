//! End-to-end pipeline: jets in, trained checkpoints out
//!
//! ```text
//! load jets -> split -> fit normalizer (dataset scope) -> build graphs
//!           -> train GAT / DGCNN -> evaluate on test -> checkpoint
//! ```

use std::path::PathBuf;

use tracing::info;

use crate::data::{split_shuffled, Jet, JetDataset, JetLoader, SyntheticJets};
use crate::error::{Error, Result};
use crate::graph::GraphBuilder;
use crate::model::{DgcnnClassifier, GatClassifier, ModelKind, ModelState};
use crate::training::{evaluate, EvaluationReport, Trainer, TrainingConfig, TrainingHistory};
use crate::utils::{Config, DataConfig};

/// Read jets from the configured CSV or generate synthetic ones
pub fn load_jets(data: &DataConfig) -> Result<Vec<Jet>> {
    match &data.path {
        Some(path) => JetLoader::load_csv(path, data.max_jets),
        None => {
            info!(
                "No dataset path configured, generating {} synthetic jets",
                data.synthetic_jets
            );
            SyntheticJets::generate(data.synthetic_jets, data.max_particles, data.synthetic_seed)
        }
    }
}

/// Split jets into train, validation and test parts with the configured seed
fn split_jets(config: &Config, jets: Vec<Jet>) -> Result<(Vec<Jet>, Vec<Jet>, Vec<Jet>)> {
    let data = &config.data;
    split_shuffled(jets, data.train_fraction, data.val_fraction, data.split_seed)
}

/// Test part of the configured split, the jets training never sees
pub fn held_out_jets(config: &Config, jets: Vec<Jet>) -> Result<Vec<Jet>> {
    let (_, _, test) = split_jets(config, jets)?;
    Ok(test)
}

/// Graph datasets ready for training, with the builder that made them
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub builder: GraphBuilder,
    pub train: JetDataset,
    pub val: JetDataset,
    pub test: JetDataset,
}

impl PreparedData {
    /// Split `jets`, fit the normalizer on the training part and build graphs
    pub fn new(config: &Config, jets: Vec<Jet>) -> Result<Self> {
        if jets.is_empty() {
            return Err(Error::EmptyDataset("no jets to prepare".to_string()));
        }
        let (train, val, test) = split_jets(config, jets)?;

        let mut builder = GraphBuilder::new(config.graph.clone());
        builder.fit_normalizer(&train)?;

        let prepared = Self {
            train: JetDataset::new(builder.build_all(&train)?),
            val: JetDataset::new(builder.build_all(&val)?),
            test: JetDataset::new(builder.build_all(&test)?),
            builder,
        };

        let (gluons, quarks) = prepared.train.class_counts();
        info!(
            "Prepared {} train ({} gluon / {} quark), {} validation, {} test graphs",
            prepared.train.len(),
            gluons,
            quarks,
            prepared.val.len(),
            prepared.test.len()
        );
        Ok(prepared)
    }
}

/// Fresh, untrained model of the given kind
pub fn build_model(kind: ModelKind, config: &Config) -> Result<ModelState> {
    Ok(match kind {
        ModelKind::Gat => GatClassifier::new(config.gat.clone())?.into(),
        ModelKind::Dgcnn => DgcnnClassifier::new(config.dgcnn.clone())?.into(),
    })
}

/// Outcome of training one model
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: ModelState,
    pub history: TrainingHistory,
    pub test: EvaluationReport,
    pub checkpoint: PathBuf,
}

/// Train one model, checkpoint its best epoch and score it on the test set
pub fn train_model(kind: ModelKind, config: &Config, data: &PreparedData) -> Result<TrainedModel> {
    let checkpoint = config.output.dir.join(format!("{}.json", kind));
    let trainer = Trainer::new(TrainingConfig {
        checkpoint_path: Some(checkpoint.clone()),
        ..config.training.clone()
    });

    let mut model = build_model(kind, config)?;
    let history = trainer.train(&mut model, &data.builder, &data.train, &data.val)?;
    let test = evaluate(model.classifier_mut(), &data.test, config.training.batch_size)?;
    info!(
        "{} test accuracy {:.4}, AUC {:.4}",
        kind, test.accuracy, test.auc
    );

    Ok(TrainedModel {
        model,
        history,
        test,
        checkpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.data.synthetic_jets = 30;
        config.data.max_particles = 20;
        config
    }

    #[test]
    fn test_held_out_jets_are_the_test_split() {
        let config = small_config();
        let jets = load_jets(&config.data).unwrap();
        let prepared = PreparedData::new(&config, jets.clone()).unwrap();

        let held_out = held_out_jets(&config, jets).unwrap();
        assert_eq!(held_out.len(), prepared.test.len());

        let rebuilt = prepared.builder.build_all(&held_out).unwrap();
        assert_eq!(rebuilt.as_slice(), prepared.test.graphs());
        assert!(prepared.train.graphs().iter().all(|g| !rebuilt.contains(g)));
    }

    #[test]
    fn test_prepare_rejects_no_jets() {
        assert!(matches!(
            PreparedData::new(&small_config(), Vec::new()),
            Err(Error::EmptyDataset(_))
        ));
    }
}
