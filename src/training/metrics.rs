//! Classification metrics for binary quark/gluon tagging
//!
//! The quark class (label 1) is the positive class throughout.

use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Fraction of correct predictions; 0.0 for an empty set
pub fn accuracy(predictions: &[usize], labels: &[usize]) -> f64 {
    let total = predictions.len().min(labels.len());
    if total == 0 {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(labels.iter())
        .filter(|(p, l)| p == l)
        .count();
    correct as f64 / total as f64
}

/// Area under the ROC curve of the positive-class scores
///
/// Computed as the Mann-Whitney U statistic with average ranks for tied
/// scores. Returns 0.0 for an empty set and 0.5 when only one class is
/// present.
pub fn roc_auc(scores: &[f64], labels: &[usize]) -> f64 {
    let n = scores.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| OrderedFloat(scores[i]));

    let n_pos = labels[..n].iter().filter(|&&l| l == 1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    // Sum of (1-based, tie-averaged) ranks of the positives
    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] == 1 {
                rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let u = rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    u / (n_pos * n_neg) as f64
}

/// Confusion matrix for binary classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Quark jets tagged as quark
    pub tp: usize,
    /// Gluon jets tagged as gluon
    pub tn: usize,
    /// Gluon jets tagged as quark
    pub fp: usize,
    /// Quark jets tagged as gluon
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(predictions: &[usize], labels: &[usize]) -> Self {
        let mut cm = Self::default();
        for (&p, &l) in predictions.iter().zip(labels.iter()) {
            match (l == 1, p == 1) {
                (true, true) => cm.tp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Quark purity: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Quark efficiency: TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// Gluon rejection: TN / (TN + FP)
    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "             pred gluon  pred quark")?;
        writeln!(f, "true gluon   {:>10}  {:>10}", self.tn, self.fp)?;
        write!(f, "true quark   {:>10}  {:>10}", self.fn_, self.tp)
    }
}

/// Metrics recorded after every epoch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub learning_rate: f64,
}

impl fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {:>3}: train_loss={:.4} train_acc={:.4} val_loss={:.4} val_acc={:.4} lr={:.2e}",
            self.epoch,
            self.train_loss,
            self.train_accuracy,
            self.val_loss,
            self.val_accuracy,
            self.learning_rate
        )
    }
}

/// Result of evaluating a model on a dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub loss: f64,
    pub accuracy: f64,
    pub auc: f64,
    pub confusion: ConfusionMatrix,
    pub num_graphs: usize,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "jets={} loss={:.4} accuracy={:.4} auc={:.4}",
            self.num_graphs, self.loss, self.accuracy, self.auc
        )?;
        write!(f, "{}", self.confusion)
    }
}
