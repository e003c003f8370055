//! Evaluation metrics for trained shape classifiers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Confusion matrix over a fixed set of class ids.
///
/// Rows are true classes, columns predicted classes. A recognition that
/// returned no result is counted as a rejection of its true class.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    classes: Vec<u32>,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    counts: Vec<u32>,
    rejected: Vec<u32>,
}

impl ConfusionMatrix {
    pub fn new(classes: impl IntoIterator<Item = u32>) -> Self {
        let mut classes: Vec<u32> = classes.into_iter().collect();
        classes.sort_unstable();
        classes.dedup();
        let k = classes.len();
        Self {
            classes,
            counts: vec![0; k * k],
            rejected: vec![0; k],
        }
    }

    pub fn classes(&self) -> &[u32] {
        &self.classes
    }

    fn index(&self, class_id: u32) -> Option<usize> {
        self.classes.binary_search(&class_id).ok()
    }

    /// Record one recognition. Unknown truth or predicted ids are ignored.
    pub fn add(&mut self, truth: u32, predicted: Option<u32>) {
        let Some(row) = self.index(truth) else {
            return;
        };
        match predicted {
            None => self.rejected[row] = self.rejected[row].saturating_add(1),
            Some(predicted) => {
                if let Some(col) = self.index(predicted) {
                    let idx = row * self.classes.len() + col;
                    self.counts[idx] = self.counts[idx].saturating_add(1);
                }
            }
        }
    }

    pub fn get(&self, truth: u32, predicted: u32) -> u32 {
        match (self.index(truth), self.index(predicted)) {
            (Some(row), Some(col)) => self.counts[row * self.classes.len() + col],
            _ => 0,
        }
    }

    pub fn rejected(&self, truth: u32) -> u32 {
        self.index(truth).map_or(0, |row| self.rejected[row])
    }

    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .chain(&self.rejected)
            .map(|&v| u64::from(v))
            .sum()
    }
}

/// Precision/recall statistics for a single class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`; rejections count as false negatives.
    pub recall: f32,
    pub f1: f32,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Serialized evaluation summary written by `shaperec-eval --json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: u64,
    pub accuracy: f32,
    pub rejection_rate: f32,
    pub per_class: BTreeMap<u32, PerClassStats>,
}

impl EvaluationReport {
    pub fn from_matrix(cm: &ConfusionMatrix) -> Self {
        let samples = cm.total();
        let rejected: u64 = cm.classes().iter().map(|&c| u64::from(cm.rejected(c))).sum();
        Self {
            samples,
            accuracy: accuracy(cm),
            rejection_rate: if samples == 0 {
                0.0
            } else {
                rejected as f32 / samples as f32
            },
            per_class: precision_recall_by_class(cm),
        }
    }
}

/// Compute per-class precision and recall from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> BTreeMap<u32, PerClassStats> {
    let classes = cm.classes();
    let mut stats = BTreeMap::new();
    for &class_id in classes {
        let tp = cm.get(class_id, class_id) as f32;
        let mut fp = 0f32;
        let mut fn_ = cm.rejected(class_id) as f32;
        let mut support = cm.rejected(class_id);
        for &other in classes {
            let v = cm.get(class_id, other);
            support = support.saturating_add(v);
            if other != class_id {
                fn_ += v as f32;
                fp += cm.get(other, class_id) as f32;
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        stats.insert(
            class_id,
            PerClassStats {
                precision,
                recall,
                f1,
                support,
            },
        );
    }
    stats
}

/// Fraction of recognitions whose top choice was the true class.
pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    let correct: u64 = cm
        .classes()
        .iter()
        .map(|&c| u64::from(cm.get(c, c)))
        .sum();
    correct as f32 / total as f32
}
