use crate::constants::metrics::CONFIDENCE_Z;
use crate::types::{AccuracyPercent, ClassIndex};

/// Aggregate accuracy over a run of episodes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccuracySummary {
    /// Number of episodes aggregated.
    pub episodes: usize,
    /// Mean accuracy in percent.
    pub mean: f64,
    /// Population standard deviation of per-episode accuracy.
    pub std: f64,
    /// 95% confidence half-width.
    pub half_width: f64,
}

impl AccuracySummary {
    /// Summary from an externally computed mean and population std.
    pub fn from_moments(episodes: usize, mean: f64, std: f64) -> Self {
        Self {
            episodes,
            mean,
            std,
            half_width: confidence_half_width(std, episodes),
        }
    }

    /// `"<n> Test Acc = <mean>% +- <half-width>%"`, two decimals each.
    pub fn accuracy_line(&self) -> String {
        format!(
            "{} Test Acc = {:4.2}% +- {:4.2}%",
            self.episodes, self.mean, self.half_width
        )
    }
}

/// Append-only per-episode accuracies of one run.
#[derive(Clone, Debug, Default)]
pub struct AccuracyRecord {
    values: Vec<AccuracyPercent>,
}

impl AccuracyRecord {
    /// Empty record sized for `episodes` entries.
    pub fn with_capacity(episodes: usize) -> Self {
        Self {
            values: Vec::with_capacity(episodes),
        }
    }

    /// Record one episode.
    pub fn push(&mut self, accuracy: AccuracyPercent) {
        self.values.push(accuracy);
    }

    /// Number of recorded episodes.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True before the first episode.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Recorded accuracies, in episode order.
    pub fn values(&self) -> &[AccuracyPercent] {
        &self.values
    }

    /// Mean, population std, and 95% half-width; `None` when empty.
    pub fn summarize(&self) -> Option<AccuracySummary> {
        if self.values.is_empty() {
            return None;
        }
        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let variance = self
            .values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / n;
        Some(AccuracySummary::from_moments(
            self.values.len(),
            mean,
            variance.sqrt(),
        ))
    }
}

/// Percentage of `predictions` equal to `truth`, position by position.
///
/// An empty query set scores 0.
pub fn episode_accuracy(predictions: &[ClassIndex], truth: &[ClassIndex]) -> AccuracyPercent {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(truth)
        .filter(|(predicted, expected)| predicted == expected)
        .count();
    correct as f64 * 100.0 / truth.len() as f64
}

/// Normal-approximation 95% half-width: `1.96 * std / sqrt(episodes)`.
pub fn confidence_half_width(std: f64, episodes: usize) -> f64 {
    if episodes == 0 {
        return 0.0;
    }
    CONFIDENCE_Z * std / (episodes as f64).sqrt()
}
