//! Response summarization
//!
//! Reduces an aligned event to:
//! - the max spike over baseline within the spike horizon
//! - a fixed-length curve of mean glucose per display bucket

use crate::config::WindowConfig;
use crate::types::{AlignedEvent, SummarizedEvent, WindowPoint};

/// Summarizer for aligned events
#[derive(Debug, Clone, Copy)]
pub struct ResponseSummarizer {
    bucket_width_minutes: f64,
    bucket_count: usize,
}

impl Default for ResponseSummarizer {
    fn default() -> Self {
        Self::new(&WindowConfig::default())
    }
}

impl ResponseSummarizer {
    pub fn new(windows: &WindowConfig) -> Self {
        Self {
            bucket_width_minutes: windows.bucket_width_minutes as f64,
            bucket_count: windows.bucket_count(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Summarize one aligned event
    pub fn summarize(&self, aligned: &AlignedEvent) -> SummarizedEvent {
        SummarizedEvent {
            event: aligned.event.clone(),
            baseline_glucose: aligned.baseline_glucose,
            max_spike: max_spike(aligned.baseline_glucose, &aligned.forward_window),
            bucketed_curve: self.bucket_curve(&aligned.display_window),
        }
    }

    /// Summarize a batch, preserving order
    pub fn summarize_all(&self, aligned: &[AlignedEvent]) -> Vec<SummarizedEvent> {
        aligned.iter().map(|a| self.summarize(a)).collect()
    }

    /// Mean value per bucket over `[0, bucket_count * width)`.
    ///
    /// Points at or past the display horizon are not bucketed.
    fn bucket_curve(&self, window: &[WindowPoint]) -> Vec<Option<f64>> {
        let mut sums = vec![0.0; self.bucket_count];
        let mut counts = vec![0u32; self.bucket_count];

        for point in window {
            if point.offset_minutes < 0.0 || self.bucket_width_minutes <= 0.0 {
                continue;
            }
            let idx = (point.offset_minutes / self.bucket_width_minutes).floor() as usize;
            if idx < self.bucket_count {
                sums[idx] += point.value;
                counts[idx] += 1;
            }
        }

        sums.into_iter()
            .zip(counts)
            .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
            .collect()
    }
}

/// Largest `value - baseline` in the window; 0 for an empty window.
///
/// Negative results (glucose only fell) are kept as is.
fn max_spike(baseline: f64, window: &[WindowPoint]) -> f64 {
    window
        .iter()
        .map(|p| p.value - baseline)
        .reduce(f64::max)
        .unwrap_or(0.0)
}
