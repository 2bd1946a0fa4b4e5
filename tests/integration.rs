//! Integration tests for quark/gluon jet tagging

use qg_jet_gnn::data::{JetDataset, JetLoader, NormalizationScope, SyntheticJets};
use qg_jet_gnn::graph::{knn_graph, GraphBatch, GraphBuilder, GraphConfig};
use qg_jet_gnn::model::{
    Checkpoint, DgcnnClassifier, DgcnnConfig, GatClassifier, GatConfig, GraphClassifier,
    ModelKind, ModelState,
};
use qg_jet_gnn::pipeline::{train_model, PreparedData};
use qg_jet_gnn::training::{evaluate, Trainer, TrainingConfig};
use qg_jet_gnn::utils::Config;
use tempfile::tempdir;

fn quick_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.data.synthetic_jets = 40;
    config.data.max_particles = 30;
    config.gat = GatConfig {
        hidden_dim: 4,
        num_heads: 2,
        ..Default::default()
    };
    config.dgcnn = DgcnnConfig {
        conv_dims: vec![8, 8, 8, 8],
        mlp_depth: 1,
        ..Default::default()
    };
    config.training.epochs = 2;
    config.training.batch_size = 8;
    config.training.show_progress = false;
    config.output.dir = dir.to_path_buf();
    config
}

#[test]
fn test_graph_invariants_on_synthetic_jets() {
    let jets = SyntheticJets::generate(30, 40, 5).unwrap();
    let k = 8;
    let builder = GraphBuilder::new(GraphConfig {
        k,
        ..Default::default()
    });

    for jet in &jets {
        let graph = builder.build(jet).unwrap();
        let n = graph.num_nodes();
        assert!(n > 0);
        assert_eq!(n, jet.multiplicity(1e-8));
        assert_eq!(graph.num_edges(), n * k.min(n - 1));
        assert!(!graph.edges.has_self_loops());
        for i in 0..n {
            assert_eq!(graph.edges.degree(i), k.min(n - 1));
        }
    }
}

#[test]
fn test_batched_knn_stays_inside_graphs() {
    let jets = SyntheticJets::generate(6, 20, 8).unwrap();
    let builder = GraphBuilder::new(GraphConfig::default());
    let graphs = builder.build_all(&jets).unwrap();
    let batch = GraphBatch::select(&graphs, &[0, 1, 2, 3, 4, 5]).unwrap();

    let dynamic = knn_graph(batch.x.view(), 8, &batch.segments);
    for segment in &batch.segments {
        for i in segment.clone() {
            assert!(dynamic.neighbors(i).iter().all(|j| segment.contains(j)));
        }
    }
    // Same features and k reproduce the static graph
    assert_eq!(dynamic, batch.edges);
}

#[test]
fn test_training_lowers_loss() {
    let jets = SyntheticJets::generate(64, 40, 21).unwrap();
    let mut builder = GraphBuilder::new(GraphConfig {
        normalization: NormalizationScope::Dataset,
        ..Default::default()
    });
    builder.fit_normalizer(&jets).unwrap();
    let dataset = JetDataset::new(builder.build_all(&jets).unwrap());

    let trainer = Trainer::new(TrainingConfig {
        epochs: 15,
        batch_size: 16,
        learning_rate: 0.01,
        early_stopping_patience: 0,
        show_progress: false,
        ..Default::default()
    });
    let mut model = ModelState::from(
        GatClassifier::new(GatConfig {
            hidden_dim: 8,
            num_heads: 2,
            ..Default::default()
        })
        .unwrap(),
    );

    let history = trainer.train(&mut model, &builder, &dataset, &dataset).unwrap();
    let first = history.epochs.first().unwrap().train_loss;
    let last = history.final_metrics().unwrap().train_loss;
    assert!(last < first, "loss went from {} to {}", first, last);
    assert!(history.best_val_accuracy > 0.5);
}

#[test]
fn test_pipeline_trains_both_models_and_checkpoints_reload() {
    let dir = tempdir().unwrap();
    let config = quick_config(dir.path());

    let jets = SyntheticJets::generate(
        config.data.synthetic_jets,
        config.data.max_particles,
        config.data.synthetic_seed,
    )
    .unwrap();
    let prepared = PreparedData::new(&config, jets).unwrap();
    assert_eq!(
        prepared.train.len() + prepared.val.len() + prepared.test.len(),
        40
    );

    for kind in ModelKind::all() {
        let mut trained = train_model(kind, &config, &prepared).unwrap();
        assert!(trained.checkpoint.exists());
        assert!((0.0..=1.0).contains(&trained.test.accuracy));
        assert!((0.0..=1.0).contains(&trained.test.auc));

        let checkpoint = Checkpoint::load(&trained.checkpoint).unwrap();
        assert_eq!(checkpoint.kind(), kind);
        assert_eq!(checkpoint.epoch, trained.history.best_epoch);

        // The checkpoint holds the weights the trainer kept
        let mut restored = checkpoint.into_classifier();
        let expected = evaluate(
            trained.model.classifier_mut(),
            &prepared.test,
            config.training.batch_size,
        )
        .unwrap();
        let actual = evaluate(restored.as_mut(), &prepared.test, config.training.batch_size).unwrap();
        assert_eq!(actual.loss, expected.loss);
        assert_eq!(actual.confusion, expected.confusion);
    }
}

#[test]
fn test_csv_round_trip_feeds_models() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("jets.csv");

    let jets = SyntheticJets::generate(10, 25, 3).unwrap();
    JetLoader::save_csv(&path, &jets).unwrap();
    let loaded = JetLoader::load_csv(&path, None).unwrap();
    assert_eq!(loaded.len(), 10);
    assert_eq!(loaded[0].label, jets[0].label);

    let builder = GraphBuilder::new(GraphConfig::default());
    let graphs = builder.build_all(&loaded).unwrap();
    let batch = GraphBatch::select(&graphs, &[0, 1, 2, 3]).unwrap();

    let mut gat = GatClassifier::new(GatConfig::default()).unwrap();
    let mut dgcnn = DgcnnClassifier::new(DgcnnConfig::default()).unwrap();
    for model in [&mut gat as &mut dyn GraphClassifier, &mut dgcnn] {
        let probs = model.predict_proba(&batch).unwrap();
        assert_eq!(probs.dim(), (4, 2));
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }
}
