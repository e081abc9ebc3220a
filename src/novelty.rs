use crate::config::{NoveltyConfig, NoveltyMode};
use std::collections::VecDeque;

/// Novelty assigned when there is nothing comparable to measure against.
pub const MAX_NOVELTY: f64 = 1.0;

/// Nearest-neighbour novelty of `behavior` against `history`.
///
/// Returns [`MAX_NOVELTY`] for an empty history. Otherwise returns the minimum
/// Euclidean distance to any history entry when it exceeds `threshold`, and 0
/// when it does not. Entries of a different length never count as nearest.
pub fn compute_novelty_score(behavior: &[f64], history: &[Vec<f64>], threshold: f64) -> f64 {
    score_with_mode(behavior, history.iter(), threshold, NoveltyMode::Threshold)
}

fn score_with_mode<'a>(
    behavior: &[f64],
    history: impl ExactSizeIterator<Item = &'a Vec<f64>>,
    threshold: f64,
    mode: NoveltyMode,
) -> f64 {
    if history.len() == 0 {
        return MAX_NOVELTY;
    }

    let nearest = history
        .filter(|past| past.len() == behavior.len())
        .map(|past| euclidean_distance(behavior, past))
        .fold(f64::INFINITY, f64::min);

    // Only mismatched entries: nothing comparable was ever seen.
    if nearest.is_infinite() {
        return MAX_NOVELTY;
    }

    match mode {
        NoveltyMode::Threshold if nearest > threshold => nearest,
        NoveltyMode::Threshold => 0.0,
        NoveltyMode::Continuous => nearest,
    }
}

pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Bounded FIFO archive of past behaviours used as novelty reference.
#[derive(Debug, Clone)]
pub struct NoveltyScorer {
    threshold: f64,
    mode: NoveltyMode,
    capacity: usize,
    archive: VecDeque<Vec<f64>>,
}

impl NoveltyScorer {
    pub fn new(threshold: f64, mode: NoveltyMode, capacity: usize) -> Self {
        Self {
            threshold,
            mode,
            capacity,
            archive: VecDeque::with_capacity(capacity),
        }
    }

    pub fn from_config(config: &NoveltyConfig) -> Self {
        Self::new(config.threshold, config.mode, config.archive_capacity)
    }

    /// Scores `behavior` against the archive without recording it.
    pub fn score(&self, behavior: &[f64]) -> f64 {
        score_with_mode(behavior, self.archive.iter(), self.threshold, self.mode)
    }

    pub fn record(&mut self, behavior: Vec<f64>) {
        if self.capacity == 0 {
            return;
        }
        if self.archive.len() == self.capacity {
            self.archive.pop_front();
        }
        self.archive.push_back(behavior);
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_is_maximally_novel() {
        assert_eq!(compute_novelty_score(&[0.3, 0.4], &[], 0.5), 1.0);
        assert_eq!(compute_novelty_score(&[], &[], 0.5), 1.0);
    }

    #[test]
    fn test_identical_history_is_not_novel() {
        let v = vec![0.2, 0.9, 4.0];
        assert_eq!(compute_novelty_score(&v, &[v.clone()], 0.5), 0.0);
        assert_eq!(compute_novelty_score(&v, &[v.clone()], 0.0), 0.0);
    }

    #[test]
    fn test_returns_nearest_distance_above_threshold() {
        let history = vec![vec![3.0, 4.0], vec![0.0, 2.0]];
        assert_eq!(compute_novelty_score(&[0.0, 0.0], &history, 0.5), 2.0);
        assert_eq!(compute_novelty_score(&[0.0, 0.0], &history, 2.0), 0.0);
    }

    #[test]
    fn test_mismatched_lengths_are_ignored() {
        let history = vec![vec![0.0], vec![3.0, 4.0]];
        assert_eq!(compute_novelty_score(&[0.0, 0.0], &history, 0.5), 5.0);

        let only_mismatched = vec![vec![0.0, 0.0, 0.0]];
        assert_eq!(compute_novelty_score(&[0.0, 0.0], &only_mismatched, 0.5), 1.0);
    }

    #[test]
    fn test_continuous_mode_keeps_small_distances() {
        let mut scorer = NoveltyScorer::new(0.5, NoveltyMode::Continuous, 4);
        scorer.record(vec![0.0, 0.0]);
        assert!((scorer.score(&[0.1, 0.0]) - 0.1).abs() < 1e-12);

        let mut hard = NoveltyScorer::new(0.5, NoveltyMode::Threshold, 4);
        hard.record(vec![0.0, 0.0]);
        assert_eq!(hard.score(&[0.1, 0.0]), 0.0);
    }

    #[test]
    fn test_archive_evicts_oldest() {
        let mut scorer = NoveltyScorer::new(0.0, NoveltyMode::Continuous, 2);
        scorer.record(vec![0.0]);
        scorer.record(vec![10.0]);
        scorer.record(vec![20.0]);
        assert_eq!(scorer.len(), 2);
        // [0.0] was evicted so the nearest to 1.0 is now 10.0
        assert_eq!(scorer.score(&[1.0]), 9.0);
    }

    #[test]
    fn test_zero_capacity_archive_never_grows() {
        let mut scorer = NoveltyScorer::new(0.5, NoveltyMode::Threshold, 0);
        scorer.record(vec![1.0]);
        assert!(scorer.is_empty());
        assert_eq!(scorer.score(&[1.0]), MAX_NOVELTY);
    }
}
