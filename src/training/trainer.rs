//! Training loop for the graph classifiers
//!
//! Mini-batch Adam with best-validation checkpointing, learning rate
//! decay on validation plateaus and early stopping. Without validation
//! graphs every epoch is checkpointed and the final weights are kept.

use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::metrics::{accuracy, roc_auc, ConfusionMatrix, EpochMetrics, EvaluationReport};
use crate::data::{BatchSampler, JetDataset};
use crate::error::{Error, Result};
use crate::graph::{GraphBatch, GraphBuilder};
use crate::model::{Checkpoint, GraphClassifier, ModelState};
use crate::nn::{argmax_rows, softmax, softmax_cross_entropy, Adam, Optimizer};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// L2 penalty added to the Adam gradients
    pub weight_decay: f64,
    /// Seed of the mini-batch shuffling
    pub seed: u64,
    /// Epochs without validation improvement before stopping, 0 disables
    pub early_stopping_patience: usize,
    /// Epochs without improvement before the learning rate decays, 0 disables
    pub lr_patience: usize,
    pub lr_decay: f64,
    pub min_lr: f64,
    /// Where the best-validation checkpoint is written
    pub checkpoint_path: Option<PathBuf>,
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.001,
            weight_decay: 0.0,
            seed: 42,
            early_stopping_patience: 10,
            lr_patience: 5,
            lr_decay: 0.5,
            min_lr: 1e-6,
            checkpoint_path: None,
            show_progress: true,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_string()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Error::Config("learning_rate must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.lr_decay) {
            return Err(Error::Config("lr_decay must be in [0, 1]".to_string()));
        }
        if self.weight_decay < 0.0 {
            return Err(Error::Config("weight_decay must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Per-epoch metrics plus the epoch whose weights were kept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    pub best_epoch: usize,
    pub best_val_accuracy: f64,
}

impl TrainingHistory {
    pub fn final_metrics(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

/// Trainer for [`ModelState`] models
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `model` in place
    ///
    /// On return `model` holds the weights of the best validation epoch,
    /// or of the last epoch when `val_data` is empty. `builder` is stored in the checkpoint so that evaluation rebuilds
    /// graphs the same way.
    pub fn train(
        &self,
        model: &mut ModelState,
        builder: &GraphBuilder,
        train_data: &JetDataset,
        val_data: &JetDataset,
    ) -> Result<TrainingHistory> {
        self.config.validate()?;
        if train_data.is_empty() {
            return Err(Error::EmptyDataset("training set has no graphs".to_string()));
        }

        let kind = model.kind();
        info!(
            "Training {} ({} parameters) on {} graphs, validating on {}",
            kind,
            model.classifier().num_parameters(),
            train_data.len(),
            val_data.len()
        );

        let mut optimizer =
            Adam::new(self.config.learning_rate).with_weight_decay(self.config.weight_decay);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut history = TrainingHistory::default();
        let mut best_state: Option<ModelState> = None;
        let mut best_accuracy = f64::NEG_INFINITY;
        let mut patience_counter = 0;
        let mut lr_patience_counter = 0;

        let validating = !val_data.is_empty();
        if !validating {
            warn!("No validation graphs, keeping the final weights without early stopping");
        }

        let pb = self.progress_bar();

        for epoch in 1..=self.config.epochs {
            let (train_loss, train_accuracy) =
                self.train_epoch(model.classifier_mut(), &mut optimizer, train_data, &mut rng)?;
            let val = self.evaluate(model.classifier_mut(), val_data)?;

            let metrics = EpochMetrics {
                epoch,
                train_loss,
                train_accuracy,
                val_loss: val.loss,
                val_accuracy: val.accuracy,
                learning_rate: optimizer.learning_rate(),
            };
            info!("[{}] {}", kind, metrics);

            if !validating {
                history.best_epoch = epoch;
                if let Some(path) = &self.config.checkpoint_path {
                    Checkpoint::new(model.clone(), builder)
                        .with_epoch(epoch, None)
                        .save(path)?;
                }
            } else if metrics.val_accuracy > best_accuracy {
                best_accuracy = metrics.val_accuracy;
                history.best_epoch = epoch;
                history.best_val_accuracy = metrics.val_accuracy;
                best_state = Some(model.clone());
                patience_counter = 0;
                lr_patience_counter = 0;

                if let Some(path) = &self.config.checkpoint_path {
                    Checkpoint::new(model.clone(), builder)
                        .with_epoch(epoch, Some(metrics.val_accuracy))
                        .save(path)?;
                }
            } else {
                patience_counter += 1;
                lr_patience_counter += 1;

                let lr = optimizer.learning_rate();
                if self.config.lr_patience > 0
                    && lr_patience_counter >= self.config.lr_patience
                    && lr > self.config.min_lr
                {
                    let new_lr = (lr * self.config.lr_decay).max(self.config.min_lr);
                    optimizer.set_learning_rate(new_lr);
                    lr_patience_counter = 0;
                    info!("Reduced learning rate to {:.2e}", new_lr);
                }
            }

            history.epochs.push(metrics);
            pb.inc(1);

            if self.config.early_stopping_patience > 0
                && patience_counter >= self.config.early_stopping_patience
            {
                warn!("Early stopping at epoch {}", epoch);
                break;
            }
        }

        pb.finish_with_message("Training complete");

        if let Some(best) = best_state {
            *model = best;
        }
        if validating {
            info!(
                "Best {} validation accuracy: {:.4} (epoch {})",
                kind, history.best_val_accuracy, history.best_epoch
            );
        } else {
            info!("Kept {} weights from epoch {}", kind, history.best_epoch);
        }

        Ok(history)
    }

    /// One pass over shuffled mini-batches, returns (mean loss, accuracy)
    fn train_epoch(
        &self,
        model: &mut dyn GraphClassifier,
        optimizer: &mut dyn Optimizer,
        data: &JetDataset,
        rng: &mut StdRng,
    ) -> Result<(f64, f64)> {
        let sampler = BatchSampler::shuffled(data.len(), self.config.batch_size, rng);
        let mut total_loss = 0.0;
        let mut predictions = Vec::with_capacity(data.len());
        let mut labels = Vec::with_capacity(data.len());

        for indices in sampler {
            let batch = GraphBatch::select(data.graphs(), &indices)?;

            let logits = model.forward(&batch)?;
            let (loss, grad) = softmax_cross_entropy(&logits, &batch.labels)?;

            model.zero_grad();
            model.backward(&grad)?;
            let mut params = model.parameters_mut();
            optimizer.step(&mut params);

            total_loss += loss * batch.num_graphs() as f64;
            predictions.extend(argmax_rows(&logits));
            labels.extend_from_slice(&batch.labels);
        }

        debug!("Epoch loss {:.4}", total_loss / data.len() as f64);
        Ok((
            total_loss / data.len() as f64,
            accuracy(&predictions, &labels),
        ))
    }

    /// Loss, accuracy, AUC and confusion matrix over `data`
    ///
    /// An empty dataset yields an all-zero report.
    pub fn evaluate(
        &self,
        model: &mut dyn GraphClassifier,
        data: &JetDataset,
    ) -> Result<EvaluationReport> {
        evaluate(model, data, self.config.batch_size)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(self.config.epochs as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb
    }
}

/// Evaluate `model` on `data` in sequential batches
pub fn evaluate(
    model: &mut dyn GraphClassifier,
    data: &JetDataset,
    batch_size: usize,
) -> Result<EvaluationReport> {
    if data.is_empty() {
        return Ok(EvaluationReport::default());
    }

    let mut total_loss = 0.0;
    let mut predictions = Vec::with_capacity(data.len());
    let mut scores = Vec::with_capacity(data.len());
    let mut labels = Vec::with_capacity(data.len());

    for indices in BatchSampler::sequential(data.len(), batch_size) {
        let batch = GraphBatch::select(data.graphs(), &indices)?;
        let logits = model.forward(&batch)?;
        let (loss, _) = softmax_cross_entropy(&logits, &batch.labels)?;

        total_loss += loss * batch.num_graphs() as f64;
        predictions.extend(argmax_rows(&logits));
        scores.extend(softmax(&logits).column(1).iter().copied());
        labels.extend_from_slice(&batch.labels);
    }

    Ok(EvaluationReport {
        loss: total_loss / data.len() as f64,
        accuracy: accuracy(&predictions, &labels),
        auc: roc_auc(&scores, &labels),
        confusion: ConfusionMatrix::from_predictions(&predictions, &labels),
        num_graphs: data.len(),
    })
}
