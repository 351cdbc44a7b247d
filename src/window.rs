use std::collections::VecDeque;

/// Fixed-capacity buffer of the most recent anomaly scores.
///
/// Appending beyond capacity silently drops the oldest score. The window is
/// a trailing-streak detector, not a majority vote: see [`ScoreWindow::sustained_above`].
#[derive(Debug, Clone)]
pub struct ScoreWindow {
    scores: VecDeque<f32>,
    capacity: usize,
}

impl ScoreWindow {
    /// Create an empty window holding at most `capacity` scores (minimum 1).
    ///
    /// Storage grows as scores arrive; `capacity` only bounds eviction.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            scores: VecDeque::new(),
            capacity,
        }
    }

    /// Add a score at the tail, evicting from the head when full.
    pub fn append(&mut self, score: f32) {
        if self.scores.len() == self.capacity {
            self.scores.pop_front();
        }
        self.scores.push_back(score);
    }

    /// Whether the newest `need` scores are all at or above `threshold`.
    ///
    /// Scans backward from the most recent score and stops at the first one
    /// below `threshold`, so a single miss resets the streak even when older
    /// scores in the window were high. Fewer than `need` scores is never enough.
    pub fn sustained_above(&self, threshold: f32, need: usize) -> bool {
        if need == 0 {
            return true;
        }
        if self.scores.len() < need {
            return false;
        }
        self.trailing_streak(threshold) >= need
    }

    /// Length of the run of scores `>= threshold` ending at the newest score.
    pub fn trailing_streak(&self, threshold: f32) -> usize {
        self.scores
            .iter()
            .rev()
            .take_while(|score| **score >= threshold)
            .count()
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Scores from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.scores.iter().copied()
    }

    pub fn latest(&self) -> Option<f32> {
        self.scores.back().copied()
    }
}
