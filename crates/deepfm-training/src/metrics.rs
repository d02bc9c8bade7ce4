//! Training metrics collection and recording.
//!
//! [`Metrics`] holds one step's (or one evaluation's) values,
//! [`MetricsRecorder`] averages them, and [`auc`] computes ROC AUC over a
//! whole evaluation set.

use serde::{Deserialize, Serialize};

/// Metrics of a training step or an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// The loss value for this step/evaluation.
    pub loss: f64,
    /// Classification accuracy at a 0.5 threshold.
    pub accuracy: Option<f64>,
    /// Area Under the ROC Curve.
    pub auc: Option<f64>,
    /// The global step at which these metrics were recorded.
    pub global_step: u64,
}

impl Metrics {
    /// Creates a new `Metrics` instance with the given loss and step.
    ///
    /// ```
    /// use deepfm_training::metrics::Metrics;
    ///
    /// let metrics = Metrics::new(0.5, 100);
    /// assert_eq!(metrics.loss, 0.5);
    /// assert_eq!(metrics.global_step, 100);
    /// ```
    pub fn new(loss: f64, global_step: u64) -> Self {
        Self {
            loss,
            accuracy: None,
            auc: None,
            global_step,
        }
    }

    /// Sets the accuracy metric.
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Sets the AUC metric.
    pub fn with_auc(mut self, auc: f64) -> Self {
        self.auc = Some(auc);
        self
    }
}

/// Accumulates step losses over a training run.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    loss_sum: f64,
    count: u64,
}

impl MetricsRecorder {
    /// Creates a new empty `MetricsRecorder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a set of metrics.
    ///
    /// ```
    /// use deepfm_training::metrics::{Metrics, MetricsRecorder};
    ///
    /// let mut recorder = MetricsRecorder::new();
    /// recorder.record(&Metrics::new(0.5, 1));
    /// recorder.record(&Metrics::new(0.3, 2));
    /// assert_eq!(recorder.count(), 2);
    /// assert!((recorder.average_loss() - 0.4).abs() < 1e-12);
    /// ```
    pub fn record(&mut self, metrics: &Metrics) {
        self.loss_sum += metrics.loss;
        self.count += 1;
    }

    /// Returns the number of metrics recorded.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Average loss, 0.0 if nothing was recorded.
    pub fn average_loss(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.loss_sum / self.count as f64
        }
    }
}

/// ROC AUC of `scores` against binary `labels` (positive when > 0.5).
///
/// Uses the Mann-Whitney rank statistic; tied scores share their average
/// rank. Returns `None` when the lengths differ or either class is absent.
///
/// ```
/// use deepfm_training::metrics::auc;
///
/// assert_eq!(auc(&[0.0, 0.0, 1.0, 1.0], &[0.1, 0.4, 0.35, 0.8]), Some(0.75));
/// assert_eq!(auc(&[1.0, 1.0], &[0.3, 0.9]), None);
/// ```
pub fn auc(labels: &[f32], scores: &[f32]) -> Option<f64> {
    if labels.len() != scores.len() {
        return None;
    }
    let n_pos = labels.iter().filter(|&&l| l > 0.5).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0f64;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tie group [start, end) shares their mean.
        let rank = (start + end + 1) as f64 / 2.0;
        let positives = order[start..end]
            .iter()
            .filter(|&&i| labels[i] > 0.5)
            .count();
        pos_rank_sum += rank * positives as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Fraction of examples whose score falls on the label's side of 0.5.
pub fn accuracy(labels: &[f32], scores: &[f32]) -> Option<f64> {
    if labels.is_empty() || labels.len() != scores.len() {
        return None;
    }
    let correct = labels
        .iter()
        .zip(scores)
        .filter(|(l, s)| (**l > 0.5) == (**s > 0.5))
        .count();
    Some(correct as f64 / labels.len() as f64)
}
