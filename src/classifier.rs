//! Severity classification of mean spikes

use crate::config::SeverityBounds;
use crate::types::Severity;

/// Maps a mean spike onto a severity band.
///
/// Bands are `[-inf, medium_from)`, `[medium_from, high_from)` and
/// `[high_from, +inf)`. NaN classifies as low.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdClassifier {
    bounds: SeverityBounds,
}

impl ThresholdClassifier {
    pub fn new(bounds: SeverityBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> SeverityBounds {
        self.bounds
    }

    pub fn classify(&self, mean_spike: f64) -> Severity {
        if mean_spike >= self.bounds.high_from {
            Severity::High
        } else if mean_spike >= self.bounds.medium_from {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}
