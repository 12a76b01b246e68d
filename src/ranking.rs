//! Top foods by nutrient content
//!
//! Picks the foods with the most carbohydrate (or sugar) together with the
//! spike each produced. A label is ranked once, using the occurrence with
//! the largest nutrient value; events without the nutrient are not ranked.

use crate::types::{Nutrient, SummarizedEvent};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// A ranked food
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFood {
    pub label: String,
    pub nutrient: Nutrient,
    /// Nutrient amount (g)
    pub amount: f64,
    pub max_spike: f64,
}

/// Top `limit` unique labels by descending `nutrient`
pub fn top_foods_by(
    summarized: &[SummarizedEvent],
    nutrient: Nutrient,
    limit: usize,
) -> Vec<RankedFood> {
    let mut candidates: Vec<(&SummarizedEvent, f64)> = summarized
        .iter()
        .filter(|e| !e.event.label.is_empty())
        .filter_map(|e| e.event.nutrient(nutrient).map(|amount| (e, amount)))
        .collect();

    // stable, so ties keep input order
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|(e, _)| seen.insert(e.event.label.as_str()))
        .take(limit)
        .map(|(e, amount)| RankedFood {
            label: e.event.label.clone(),
            nutrient,
            amount,
            max_spike: e.max_spike,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FoodEvent;
    use chrono::{TimeZone, Utc};

    fn event(label: &str, carb: Option<f64>, sugar: Option<f64>, spike: f64) -> SummarizedEvent {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        SummarizedEvent {
            event: FoodEvent::new(at, label).with_macros(carb, sugar, None),
            baseline_glucose: 100.0,
            max_spike: spike,
            bucketed_curve: vec![],
        }
    }

    #[test]
    fn test_top_by_carb_unique_labels() {
        let events = vec![
            event("bagel", Some(48.0), Some(6.0), 55.0),
            event("apple", Some(25.0), Some(19.0), 20.0),
            event("bagel", Some(50.0), Some(6.0), 61.0),
            event("steak", None, None, 3.0),
            event("rice", Some(45.0), Some(0.1), 38.0),
        ];

        let top = top_foods_by(&events, Nutrient::Carb, 5);
        let labels: Vec<&str> = top.iter().map(|f| f.label.as_str()).collect();

        assert_eq!(labels, vec!["bagel", "rice", "apple"]);
        assert_eq!(top[0].amount, 50.0);
        assert_eq!(top[0].max_spike, 61.0);
    }

    #[test]
    fn test_limit_and_sugar() {
        let events = vec![
            event("juice", Some(26.0), Some(22.0), 45.0),
            event("apple", Some(25.0), Some(19.0), 20.0),
            event("bread", Some(15.0), Some(1.5), 30.0),
        ];

        let top = top_foods_by(&events, Nutrient::Sugar, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].label, "juice");
        assert_eq!(top[1].label, "apple");
    }

    #[test]
    fn test_zero_is_ranked_absent_is_not() {
        let events = vec![
            event("water", Some(0.0), None, -1.0),
            event("unknown", None, None, 10.0),
        ];
        let top = top_foods_by(&events, Nutrient::Carb, 5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].label, "water");
    }
}
