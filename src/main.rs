//! Command line interface for quark/gluon jet tagging
//!
//! - `train`: train GAT and/or DGCNN and write checkpoints
//! - `evaluate`: score a checkpoint on the held-out test split
//! - `generate`: write a synthetic jet CSV
//! - `inspect`: print graph statistics of a dataset
//! - `info`: print the resolved configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use qg_jet_gnn::{
    data::{JetDataset, JetLoader, SyntheticJets},
    graph::GraphBuilder,
    model::{Checkpoint, ModelKind},
    pipeline::{held_out_jets, load_jets, train_model, PreparedData},
    training::evaluate,
    utils::{level_from_verbosity, setup_logging, Config},
};

const DEFAULT_CONFIG: &str = "config/default.toml";

#[derive(Parser)]
#[command(name = "qg-jet-gnn")]
#[command(version)]
#[command(about = "Graph neural networks for quark/gluon jet tagging", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModelChoice {
    Gat,
    Dgcnn,
    All,
}

impl ModelChoice {
    fn kinds(self) -> Vec<ModelKind> {
        match self {
            ModelChoice::Gat => vec![ModelKind::Gat],
            ModelChoice::Dgcnn => vec![ModelKind::Dgcnn],
            ModelChoice::All => ModelKind::all().to_vec(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Train one or both classifiers
    Train {
        /// Number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Which model to train
        #[arg(short, long, value_enum, default_value = "all")]
        model: ModelChoice,

        /// Jet CSV (synthetic jets when omitted)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Directory for the checkpoints
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Evaluate a checkpoint
    Evaluate {
        /// Checkpoint written by `train`
        #[arg(long)]
        checkpoint: PathBuf,

        /// Jet CSV (synthetic jets when omitted)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Score every jet instead of the held-out test split
        #[arg(long)]
        all: bool,
    },

    /// Generate a synthetic jet dataset
    Generate {
        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,

        /// Number of jets
        #[arg(short, long, default_value = "2000")]
        jets: usize,

        /// Particle slots per jet
        #[arg(long, default_value = "60")]
        max_particles: usize,

        /// Random seed
        #[arg(long, default_value = "7")]
        seed: u64,
    },

    /// Print graph statistics of a dataset
    Inspect {
        /// Jet CSV (synthetic jets when omitted)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Show the resolved configuration
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_or_default(DEFAULT_CONFIG),
    };

    setup_logging(&level_from_verbosity(cli.verbose, &config.logging.level));

    match cli.command {
        Commands::Train {
            epochs,
            model,
            data,
            output_dir,
        } => {
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if data.is_some() {
                config.data.path = data;
            }
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            config.validate().context("Invalid configuration")?;
            run_training(&config, model)?;
        }

        Commands::Evaluate {
            checkpoint,
            data,
            all,
        } => {
            if data.is_some() {
                config.data.path = data;
            }
            run_evaluation(&config, &checkpoint, all)?;
        }

        Commands::Generate {
            output,
            jets,
            max_particles,
            seed,
        } => {
            let generated = SyntheticJets::generate(jets, max_particles, seed)
                .context("Failed to generate jets")?;
            JetLoader::save_csv(&output, &generated)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote {} jets to {}", generated.len(), output.display());
        }

        Commands::Inspect { data } => {
            if data.is_some() {
                config.data.path = data;
            }
            run_inspect(&config)?;
        }

        Commands::Info => {
            show_info(&config)?;
        }
    }

    Ok(())
}

fn run_training(config: &Config, choice: ModelChoice) -> Result<()> {
    let jets = load_jets(&config.data).context("Failed to load jets")?;
    let prepared = PreparedData::new(config, jets).context("Failed to build graphs")?;

    let mut summary = Vec::new();
    for kind in choice.kinds() {
        let trained = train_model(kind, config, &prepared)
            .with_context(|| format!("Training {} failed", kind))?;
        summary.push((kind, trained));
    }

    println!();
    println!(
        "{:<8} {:>10} {:>10} {:>10}  checkpoint",
        "model", "val_acc", "test_acc", "test_auc"
    );
    for (kind, trained) in &summary {
        println!(
            "{:<8} {:>10.4} {:>10.4} {:>10.4}  {}",
            kind.name(),
            trained.history.best_val_accuracy,
            trained.test.accuracy,
            trained.test.auc,
            trained.checkpoint.display()
        );
    }
    Ok(())
}

fn run_evaluation(config: &Config, path: &Path, all: bool) -> Result<()> {
    let checkpoint = Checkpoint::load(path)
        .with_context(|| format!("Failed to load checkpoint {}", path.display()))?;
    let builder = checkpoint.graph_builder();
    let kind = checkpoint.kind();

    let jets = load_jets(&config.data).context("Failed to load jets")?;
    let jets = if all {
        jets
    } else {
        held_out_jets(config, jets).context("Failed to split jets")?
    };
    if jets.is_empty() {
        warn!("No jets to evaluate, check the split fractions or pass --all");
    }
    info!("Scoring {} jets", jets.len());
    let dataset = JetDataset::new(builder.build_all(&jets)?);

    let mut model = checkpoint.into_classifier();
    let report = evaluate(model.as_mut(), &dataset, config.training.batch_size)?;

    println!("{} checkpoint {}", kind, path.display());
    println!("{}", report);
    Ok(())
}

fn run_inspect(config: &Config) -> Result<()> {
    let jets = load_jets(&config.data).context("Failed to load jets")?;
    let mut builder = GraphBuilder::new(config.graph.clone());
    builder.fit_normalizer(&jets)?;
    let dataset = JetDataset::new(builder.build_all(&jets)?);

    let (gluons, quarks) = dataset.class_counts();
    let nodes: Vec<usize> = dataset.graphs().iter().map(|g| g.num_nodes()).collect();
    let edges: usize = dataset.graphs().iter().map(|g| g.num_edges()).sum();

    println!("Jets:            {}", jets.len());
    println!(
        "Graphs:          {} ({} gluon / {} quark)",
        dataset.len(),
        gluons,
        quarks
    );
    println!(
        "Nodes per graph: mean {:.2}, min {}, max {}",
        dataset.mean_nodes(),
        nodes.iter().min().copied().unwrap_or(0),
        nodes.iter().max().copied().unwrap_or(0)
    );
    if !dataset.is_empty() {
        println!(
            "Edges per graph: mean {:.2} (k = {})",
            edges as f64 / dataset.len() as f64,
            config.graph.k
        );
    }
    Ok(())
}

fn show_info(config: &Config) -> Result<()> {
    println!("qg-jet-gnn {}", qg_jet_gnn::VERSION);
    println!();
    println!("{}", toml::to_string_pretty(config).context("Failed to render configuration")?);
    Ok(())
}
