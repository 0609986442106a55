//! Frame differencing and the rolling motion window.
//!
//! A frame's motion score is the fraction of pixels whose grayscale value
//! moved by more than [`PIXEL_DELTA`] since the previous analyzed frame.
//! Scores are averaged over a short rolling window so a single noisy frame
//! does not open a segment.

use std::collections::VecDeque;

/// Minimum per-pixel grayscale change that counts as motion.
pub const PIXEL_DELTA: u8 = 30;

/// Number of recent scores the rolling window keeps.
pub const HISTORY: usize = 10;

/// Fraction of pixels in `current` that changed by more than
/// [`PIXEL_DELTA`] relative to `previous`.
/// Frames of different sizes cannot be compared and score `0.0`; a decoder
/// handing over a truncated frame must not open a segment.
pub fn motion_score(current: &[u8], previous: &[u8]) -> f64 {
    if current.len() != previous.len() || current.is_empty() {
        return 0.0;
    }
    let changed = current
        .iter()
        .zip(previous.iter())
        .filter(|(a, b)| a.abs_diff(**b) > PIXEL_DELTA)
        .count();
    changed as f64 / current.len() as f64
}

/// Binary change mask for the same comparison, 255 where a pixel moved.
/// Only produced for debug dumps.
pub fn motion_mask(current: &[u8], previous: &[u8]) -> Vec<u8> {
    current
        .iter()
        .zip(previous.iter())
        .map(|(a, b)| if a.abs_diff(*b) > PIXEL_DELTA { 255 } else { 0 })
        .collect()
}

/// Rolling average of recent motion scores compared against a threshold.
#[derive(Debug, Clone)]
pub struct MotionWindow {
    scores: VecDeque<f64>,
    threshold: f64,
}

impl MotionWindow {
    pub fn new(threshold: f64) -> Self {
        Self {
            scores: VecDeque::with_capacity(HISTORY + 1),
            threshold,
        }
    }

    /// Record a score and report whether the rolling average now exceeds
    /// the threshold. The comparison is strict.
    pub fn observe(&mut self, score: f64) -> bool {
        self.scores.push_back(score);
        if self.scores.len() > HISTORY {
            self.scores.pop_front();
        }
        self.average() > self.threshold
    }

    pub fn average(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f64>() / self.scores.len() as f64
    }

    pub fn reset(&mut self) {
        self.scores.clear();
    }
}
