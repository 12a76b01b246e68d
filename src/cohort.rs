//! Cohort aggregation
//!
//! Partitions summarized events by high/low macronutrient categories and
//! reduces each partition to a mean spike and an averaged response curve.
//! Absent nutrient values fail the high test, so they land in the low
//! category.

use crate::classifier::ThresholdClassifier;
use crate::config::NutrientThresholds;
use crate::types::{CohortGroup, CohortKey, CurveAccumulator, Nutrient, SummarizedEvent};
use serde::{Deserialize, Serialize};

/// Aggregator for building cohort groups
#[derive(Debug, Clone, Copy)]
pub struct CohortAggregator {
    thresholds: NutrientThresholds,
    classifier: ThresholdClassifier,
    bucket_count: usize,
}

impl CohortAggregator {
    pub fn new(
        thresholds: NutrientThresholds,
        classifier: ThresholdClassifier,
        bucket_count: usize,
    ) -> Self {
        Self {
            thresholds,
            classifier,
            bucket_count,
        }
    }

    pub fn thresholds(&self) -> NutrientThresholds {
        self.thresholds
    }

    pub fn classifier(&self) -> ThresholdClassifier {
        self.classifier
    }

    /// Whether an event belongs to the cohort identified by `key`
    pub fn matches(&self, event: &SummarizedEvent, key: &CohortKey) -> bool {
        [Nutrient::Carb, Nutrient::Sugar, Nutrient::Protein]
            .into_iter()
            .all(|n| {
                key.level(n)
                    .admits(event.event.nutrient(n), self.thresholds.for_nutrient(n))
            })
    }

    /// Build the 8 high/low groups, in `CohortKey::combinations` order.
    ///
    /// Empty groups are included with a zero mean spike.
    pub fn aggregate(&self, summarized: &[SummarizedEvent]) -> Vec<CohortGroup> {
        CohortKey::combinations()
            .iter()
            .map(|key| self.query(summarized, key))
            .collect()
    }

    /// Build the 8 high/low groups under different nutrient thresholds
    pub fn aggregate_with(
        &self,
        summarized: &[SummarizedEvent],
        thresholds: NutrientThresholds,
    ) -> Vec<CohortGroup> {
        Self {
            thresholds,
            ..*self
        }
        .aggregate(summarized)
    }

    /// Build the group for an arbitrary filter selection (levels may be `all`)
    pub fn query(&self, summarized: &[SummarizedEvent], key: &CohortKey) -> CohortGroup {
        let mut curve_totals = CurveAccumulator::new(self.bucket_count);
        let mut member_labels = Vec::new();
        let mut spike_sum = 0.0;

        for event in summarized.iter().filter(|e| self.matches(e, key)) {
            curve_totals.add_curve(&event.bucketed_curve);
            member_labels.push(event.event.label.clone());
            spike_sum += event.max_spike;
        }

        let mean_spike = if member_labels.is_empty() {
            0.0
        } else {
            spike_sum / member_labels.len() as f64
        };

        CohortGroup {
            key: *key,
            mean_spike,
            averaged_curve: curve_totals.mean(),
            member_labels,
            severity: self.classifier.classify(mean_spike),
            curve_totals,
        }
    }

    /// Spike distribution of the events in a cohort
    pub fn distribution(
        &self,
        summarized: &[SummarizedEvent],
        key: &CohortKey,
        bin_width: f64,
    ) -> SpikeDistribution {
        let spikes: Vec<f64> = summarized
            .iter()
            .filter(|e| self.matches(e, key))
            .map(|e| e.max_spike)
            .collect();
        SpikeDistribution::from_spikes(&spikes, bin_width)
    }
}

/// One histogram bin, `[lower, upper)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Histogram and extent of a set of spikes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeDistribution {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub bins: Vec<SpikeBin>,
}

impl SpikeDistribution {
    /// Bin spikes into fixed-width bins aligned to multiples of `bin_width`.
    ///
    /// `bins` is left empty when `bin_width` is not a positive finite number
    /// or when the spikes would need more than `MAX_SPIKE_BINS` bins.
    pub fn from_spikes(spikes: &[f64], bin_width: f64) -> Self {
        let min = spikes.iter().copied().reduce(f64::min);
        let max = spikes.iter().copied().reduce(f64::max);
        let mean = (!spikes.is_empty()).then(|| spikes.iter().sum::<f64>() / spikes.len() as f64);

        let bins = match (min, max) {
            (Some(lo), Some(hi)) => bin_spikes(spikes, lo, hi, bin_width).unwrap_or_default(),
            _ => Vec::new(),
        };

        Self {
            count: spikes.len(),
            min,
            max,
            mean,
            bins,
        }
    }
}

/// Upper bound on the number of histogram bins
pub const MAX_SPIKE_BINS: usize = 10_000;

// bin indices stay well inside the range where i64 and f64 agree
const MAX_BIN_INDEX: f64 = 1e15;

fn bin_spikes(spikes: &[f64], lo: f64, hi: f64, bin_width: f64) -> Option<Vec<SpikeBin>> {
    if !(bin_width.is_finite() && bin_width > 0.0) {
        return None;
    }
    let first = (lo / bin_width).floor();
    let last = (hi / bin_width).floor();
    if !(first.abs() <= MAX_BIN_INDEX && last.abs() <= MAX_BIN_INDEX) {
        return None;
    }
    if last - first >= MAX_SPIKE_BINS as f64 {
        tracing::warn!(bin_width, lo, hi, "Too many histogram bins, skipping");
        return None;
    }

    let (first, last) = (first as i64, last as i64);
    let mut bins: Vec<SpikeBin> = (first..=last)
        .map(|i| SpikeBin {
            lower: i as f64 * bin_width,
            upper: (i + 1) as f64 * bin_width,
            count: 0,
        })
        .collect();
    for spike in spikes {
        let offset = (spike / bin_width).floor() as i64 - first;
        if let Some(bin) = usize::try_from(offset).ok().and_then(|i| bins.get_mut(i)) {
            bin.count += 1;
        }
    }
    Some(bins)
}
