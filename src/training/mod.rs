//! Training and evaluation
//!
//! This module provides:
//! - Mini-batch training loop with checkpointing and early stopping
//! - Accuracy, ROC AUC and confusion matrix

mod metrics;
mod trainer;

pub use metrics::{accuracy, roc_auc, ConfusionMatrix, EpochMetrics, EvaluationReport};
pub use trainer::{evaluate, Trainer, TrainingConfig, TrainingHistory};
