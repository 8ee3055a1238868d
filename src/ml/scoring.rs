// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Three numbers summarise one evaluation pass, all reported as
// percentages rounded to two decimals:
//
//   apc_acc  polarity accuracy over examples with a real label
//   apc_f1   macro F1 over every class 0..polarities_dim; a class
//            that is never predicted nor present scores 0
//   ate_f1   span-level F1: a predicted aspect counts only if its
//            start and end match a gold aspect exactly
//
// Tag rows are read from position 1 (after [CLS]) up to the
// [SEP] label, so padding and the aspect segment never count.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::data::feature::{label_tag, LABEL_IGNORE, LABEL_SEP};
use crate::domain::example::{aspect_spans, BioTag};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub apc_acc: f64,
    pub apc_f1: f64,
    pub ate_f1: f64,
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn accuracy(pred: &[usize], truth: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = pred.iter().zip(truth).filter(|(p, t)| p == t).count();
    correct as f64 / truth.len() as f64
}

pub fn macro_f1(pred: &[usize], truth: &[usize], classes: usize) -> f64 {
    if classes == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for c in 0..classes {
        let tp = pred.iter().zip(truth).filter(|(p, t)| **p == c && **t == c).count() as f64;
        let predicted = pred.iter().filter(|p| **p == c).count() as f64;
        let actual = truth.iter().filter(|t| **t == c).count() as f64;
        let precision = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let recall = if actual > 0.0 { tp / actual } else { 0.0 };
        if precision + recall > 0.0 {
            total += 2.0 * precision * recall / (precision + recall);
        }
    }
    total / classes as f64
}

pub fn span_f1(truth: &[Vec<BioTag>], pred: &[Vec<BioTag>]) -> f64 {
    let collect = |rows: &[Vec<BioTag>]| -> HashSet<(usize, usize, usize)> {
        rows.iter()
            .enumerate()
            .flat_map(|(row, tags)| aspect_spans(tags).into_iter().map(move |s| (row, s.start, s.end)))
            .collect()
    };
    let gold = collect(truth);
    let found = collect(pred);
    let tp = gold.intersection(&found).count() as f64;

    if tp == 0.0 {
        return 0.0;
    }
    let precision = tp / found.len() as f64;
    let recall = tp / gold.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Word tags of one evaluation row: gold labels decide where the
/// sentence ends, predictions are read at the same positions.
pub fn decode_tag_row(labels: &[i64], predicted: &[i64]) -> (Vec<BioTag>, Vec<BioTag>) {
    let mut gold = Vec::new();
    let mut found = Vec::new();
    for j in 1..labels.len() {
        if labels[j] == LABEL_SEP || labels[j] == LABEL_IGNORE {
            break;
        }
        gold.push(label_tag(labels[j]));
        found.push(label_tag(predicted.get(j).copied().unwrap_or(LABEL_IGNORE)));
    }
    (gold, found)
}

// ─── EvalAccumulator ──────────────────────────────────────────────────────────
/// Collects predictions batch by batch, then scores them once.
#[derive(Debug, Default)]
pub struct EvalAccumulator {
    polarity_pred: Vec<usize>,
    polarity_true: Vec<usize>,
    tags_true: Vec<Vec<BioTag>>,
    tags_pred: Vec<Vec<BioTag>>,
}

impl EvalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Padding labels (negative) are skipped.
    pub fn push_polarity(&mut self, predicted: i64, label: i64) {
        if label >= 0 {
            self.polarity_pred.push(predicted.max(0) as usize);
            self.polarity_true.push(label as usize);
        }
    }

    pub fn push_tag_row(&mut self, labels: &[i64], predicted: &[i64]) {
        let (gold, found) = decode_tag_row(labels, predicted);
        self.tags_true.push(gold);
        self.tags_pred.push(found);
    }

    pub fn finish(&self, polarities_dim: usize) -> EvalMetrics {
        EvalMetrics {
            apc_acc: round2(accuracy(&self.polarity_pred, &self.polarity_true) * 100.0),
            apc_f1: round2(macro_f1(&self.polarity_pred, &self.polarity_true, polarities_dim) * 100.0),
            ate_f1: round2(span_f1(&self.tags_true, &self.tags_pred) * 100.0),
        }
    }
}
