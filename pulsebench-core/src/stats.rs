// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Descriptive statistics over latency sample vectors.
//!
//! Every aggregate is optional: a statistic that cannot be computed from the
//! available samples is left unset instead of being reported as NaN or zero.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Width of the name column in the rendered report.
const NAME_WIDTH: usize = 10;

/// Aggregates computed from one sample vector. Values are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Population standard deviation (divisor n).
    pub std: Option<f64>,
    /// Pearson's second skewness coefficient.
    pub skew: Option<f64>,
    /// Excess kurtosis.
    pub kurtosis: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

/// Compute statistics for `samples`. Returns `None` for fewer than 2 samples.
///
/// The input order is irrelevant: a sorted copy feeds every order statistic.
pub fn compute(samples: &[f64]) -> Option<Stats> {
    if samples.len() < 2 {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));

    let mean = mean(&sorted);
    let median = percentile(&sorted, 50.0);
    let std = mean.and_then(|m| population_std(&sorted, m));

    let (skew, kurtosis) = match (mean, median, std) {
        (Some(m), Some(med), Some(s)) if sorted.len() >= 3 && s.is_finite() && s > 0.0 => {
            (Some(3.0 * (m - med) / s), Some(excess_kurtosis(&sorted, m, s)))
        }
        _ => (None, None),
    };

    Some(Stats {
        count: sorted.len(),
        mean,
        median,
        min: percentile(&sorted, 0.0),
        max: percentile(&sorted, 100.0),
        std,
        skew,
        kurtosis,
        p75: percentile(&sorted, 75.0),
        p90: percentile(&sorted, 90.0),
        p95: percentile(&sorted, 95.0),
        p99: percentile(&sorted, 99.0),
    })
}

/// Linear-interpolated percentile of an ascending slice.
///
/// Uses the 1-based rank `p/100 * (n-1) + 1`; integral ranks select an
/// element, fractional ranks interpolate between neighbours.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }

    let rank = (p / 100.0) * (sorted.len() - 1) as f64 + 1.0;
    let whole = rank.floor();
    let lower = (whole as usize).clamp(1, sorted.len()) - 1;

    if rank == whole {
        return Some(sorted[lower]);
    }

    let upper = (lower + 1).min(sorted.len() - 1);
    let fraction = rank - whole;
    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// Arithmetic mean, unset for an empty slice.
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Population standard deviation around `mean`.
pub fn population_std(samples: &[f64], mean: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let variance = samples
        .iter()
        .map(|&x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
        / samples.len() as f64;
    Some(variance.sqrt())
}

fn excess_kurtosis(samples: &[f64], mean: f64, std: f64) -> f64 {
    let fourth: f64 = samples.iter().map(|&x| ((x - mean) / std).powi(4)).sum();
    fourth / samples.len() as f64 - 3.0
}

/// Header line of the fixed-width report table.
pub fn report_header() -> String {
    format!(
        "{:<width$}|{:<14}|{:<14}|{:<14}|{:<14}|{:<14}|{:<14}|{:<14}|{:<14}|{:<14}|{:<14}|",
        "",
        "Mean",
        "Min",
        "Max",
        "STD",
        "SKEW",
        "Median",
        "Kurtosis",
        "90%",
        "95%",
        "99%",
        width = NAME_WIDTH
    )
}

/// One report row. Names are padded or truncated to the name column; unset
/// values render as `-`.
pub fn report_row(name: &str, stats: &Stats) -> String {
    let mut row: String = name.chars().take(NAME_WIDTH).collect();
    while row.chars().count() < NAME_WIDTH {
        row.push(' ');
    }
    row.push('|');

    for value in [
        stats.mean,
        stats.min,
        stats.max,
        stats.std,
        stats.skew,
        stats.median,
        stats.kurtosis,
        stats.p90,
        stats.p95,
        stats.p99,
    ] {
        match value {
            Some(v) => {
                let _ = write!(row, "{:<14.9}|", v);
            }
            None => {
                let _ = write!(row, "{:<14}|", "-");
            }
        }
    }
    row
}

/// Format a latency in seconds in human-readable form (auto-selects unit).
pub fn format_seconds(seconds: f64) -> String {
    let ns = seconds * 1e9;
    if ns < 1_000.0 {
        format!("{:.0}ns", ns)
    } else if ns < 1_000_000.0 {
        format!("{:.2}μs", ns / 1_000.0)
    } else if ns < 1_000_000_000.0 {
        format!("{:.2}ms", ns / 1_000_000.0)
    } else {
        format!("{:.2}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.map(|v| (v - b).abs() < 1e-12).unwrap_or(false)
    }

    #[test]
    fn test_four_sample_scenario() {
        let stats = compute(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(approx(stats.mean, 2.5));
        assert!(approx(stats.min, 1.0));
        assert!(approx(stats.max, 4.0));
        assert!(approx(stats.median, 2.5));
        assert_eq!(stats.count, 4);
    }

    #[test]
    fn test_too_few_samples() {
        assert!(compute(&[]).is_none());
        assert!(compute(&[0.5]).is_none());
    }

    #[test]
    fn test_two_samples_have_no_shape_statistics() {
        let stats = compute(&[1.0, 3.0]).unwrap();
        assert!(stats.mean.is_some());
        assert!(stats.std.is_some());
        assert!(stats.p99.is_some());
        assert!(stats.skew.is_none());
        assert!(stats.kurtosis.is_none());
    }

    #[test]
    fn test_min_max_are_extreme_percentiles() {
        let samples = [0.7, 0.1, 0.9, 0.3, 0.3, 0.25, 0.0001];
        let stats = compute(&samples).unwrap();
        assert_eq!(stats.min, Some(0.0001));
        assert_eq!(stats.max, Some(0.9));
    }

    #[test]
    fn test_order_independent() {
        let a = compute(&[5.0, 1.0, 4.0, 2.0, 3.0]).unwrap();
        let b = compute(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_population_std() {
        // Population variance of 2,4,4,4,5,5,7,9 is exactly 4.
        let stats = compute(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!(approx(stats.std, 2.0));
        assert!(approx(stats.mean, 5.0));
        // 3 * (5.0 - 4.5) / 2.0
        assert!(approx(stats.skew, 0.75));
    }

    #[test]
    fn test_kurtosis_of_symmetric_two_point_distribution() {
        // Values +-1 around 0: every standardized value is +-1, so the
        // fourth moment is 1 and the excess kurtosis is -2.
        let stats = compute(&[-1.0, 1.0, -1.0, 1.0]).unwrap();
        assert!(approx(stats.kurtosis, -2.0));
    }

    #[test]
    fn test_constant_samples_leave_shape_unset() {
        let stats = compute(&[0.25, 0.25, 0.25, 0.25]).unwrap();
        assert_eq!(stats.std, Some(0.0));
        assert!(stats.skew.is_none());
        assert!(stats.kurtosis.is_none());
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&sorted, 0.0), Some(10.0));
        assert_eq!(percentile(&sorted, 25.0), Some(20.0));
        assert!(approx(percentile(&sorted, 90.0), 46.0));
        assert_eq!(percentile(&sorted, 100.0), Some(50.0));
        assert_eq!(percentile(&sorted, 101.0), None);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_report_row_renders_unset_as_dash() {
        let stats = compute(&[1.0, 2.0]).unwrap();
        let row = report_row("subscribe-latency", &stats);
        assert!(row.starts_with("subscribe-|"));
        assert!(row.contains("1.500000000"));
        assert!(row.contains("-"));
        assert_eq!(report_header().matches('|').count(), row.matches('|').count());
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0000005), "500ns");
        assert_eq!(format_seconds(0.0000015), "1.50μs");
        assert_eq!(format_seconds(0.0015), "1.50ms");
        assert_eq!(format_seconds(1.5), "1.50s");
    }
}
