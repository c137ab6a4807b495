//! Property-Based Tests for Metrics
//!
//! # Test Properties
//!
//! 1. **Exact Sums**: concurrent increments never lose an update
//! 2. **Label Order Independence**: any permutation of labels hits one series
//! 3. **Bounded Histograms**: retained samples never exceed the cap and are
//!    always the most recent ones

#![cfg(test)]

use std::sync::Arc;

use proptest::prelude::*;

use super::service::ServiceMetrics;
use crate::config::ObservabilityConfig;

// =============================================================================
// Property Strategies
// =============================================================================

/// Integral increments so float sums are exact regardless of order.
fn increments_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..1_000, 0..400)
}

fn labels_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{1,6}", 1..6)
        .prop_map(|labels| labels.into_iter().collect())
}

// =============================================================================
// Counter Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: the counter equals the sum of increments split across threads.
    #[test]
    fn prop_concurrent_increment_sum(
        values in increments_strategy(),
        threads in 1usize..=8,
    ) {
        let metrics = Arc::new(ServiceMetrics::new("prop"));
        let expected: f64 = values.iter().map(|v| f64::from(*v)).sum();

        let chunk = values.len().div_ceil(threads).max(1);
        let handles: Vec<_> = values
            .chunks(chunk)
            .map(|part| {
                let metrics = Arc::clone(&metrics);
                let part = part.to_vec();
                std::thread::spawn(move || {
                    for v in part {
                        metrics.increment_by("total", f64::from(v), &[]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        prop_assert_eq!(metrics.count("total"), expected);
    }

    /// Property: reversing label order addresses the same series.
    #[test]
    fn prop_label_order_independent(labels in labels_strategy()) {
        let metrics = ServiceMetrics::new("prop");
        let forward: Vec<(&str, &str)> =
            labels.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        metrics.increment_by("hits", 1.0, &forward);
        metrics.increment_by("hits", 1.0, &reversed);

        prop_assert_eq!(metrics.count_with("hits", &forward), 2.0);
        prop_assert_eq!(metrics.get_stats().counters.len(), 1);
    }

    /// Property: a histogram never holds more than the cap and keeps the tail.
    #[test]
    fn prop_histogram_bounded(
        inserts in 1usize..300,
        max in 5usize..50,
    ) {
        let retain = max / 2;
        let config = ObservabilityConfig {
            histogram_max_samples: max,
            histogram_retain_samples: retain,
            ..ObservabilityConfig::default()
        };
        let metrics = ServiceMetrics::with_config("prop", config);

        for i in 0..inserts {
            metrics.histogram("h", i as f64);
        }

        let len = metrics.histogram_len("h");
        prop_assert!(len <= max);
        if inserts <= max {
            prop_assert_eq!(len, inserts);
        }

        let summary = metrics.get_stats().histograms.get("prop.h").cloned();
        if let Some(summary) = summary {
            prop_assert_eq!(summary.max, (inserts - 1) as f64);
            prop_assert_eq!(summary.min, (inserts - len) as f64);
        }
    }
}
