//! Running history of explored cohort combinations
//!
//! The history is append-only and order-sensitive: each combination is
//! recorded at most once, and its members' curves are folded into the
//! running totals of its severity band. Band curves are therefore the mean
//! over every member curve in the band, not a mean of group means.

use crate::types::{BandCurve, CohortGroup, CohortKey, CurveAccumulator, HistoryEntry, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct BandTotals {
    combinations: usize,
    members: usize,
    curve: CurveAccumulator,
}

/// Owned history of explored combinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortHistory {
    entries: Vec<HistoryEntry>,
    bands: HashMap<Severity, BandTotals>,
    bucket_count: usize,
}

impl CohortHistory {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            entries: Vec::new(),
            bands: HashMap::new(),
            bucket_count,
        }
    }

    /// Record an explored group.
    ///
    /// Returns `false` without changing anything when the combination was
    /// already recorded.
    pub fn record(&mut self, group: &CohortGroup) -> bool {
        if self.is_explored(&group.key) {
            tracing::debug!(combination = %group.key.label(), "Combination already explored");
            return false;
        }

        let bucket_count = self.bucket_count;
        let band = self
            .bands
            .entry(group.severity)
            .or_insert_with(|| BandTotals {
                curve: CurveAccumulator::new(bucket_count),
                ..BandTotals::default()
            });
        band.combinations += 1;
        band.members += group.member_count();
        band.curve.merge(&group.curve_totals);

        self.entries.push(HistoryEntry {
            key: group.key,
            mean_spike: group.mean_spike,
            severity: group.severity,
            member_count: group.member_count(),
        });

        tracing::debug!(
            combination = %group.key.label(),
            mean_spike = group.mean_spike,
            severity = group.severity.as_str(),
            explored = self.entries.len(),
            "Recorded combination"
        );
        true
    }

    pub fn is_explored(&self, key: &CohortKey) -> bool {
        self.entries.iter().any(|e| &e.key == key)
    }

    /// Explored combinations in the order they were recorded
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Averaged curve of one band, if anything was recorded into it
    pub fn band_curve(&self, severity: Severity) -> Option<BandCurve> {
        self.bands.get(&severity).map(|totals| BandCurve {
            severity,
            curve: totals.curve.mean(),
            combinations: totals.combinations,
            members: totals.members,
        })
    }

    /// Curves for every band with at least one recorded combination, low to high
    pub fn band_curves(&self) -> Vec<BandCurve> {
        Severity::ALL
            .iter()
            .filter_map(|s| self.band_curve(*s))
            .collect()
    }

    /// Discard all history
    pub fn reset(&mut self) {
        tracing::debug!(discarded = self.entries.len(), "Resetting cohort history");
        self.entries.clear();
        self.bands.clear();
    }
}
