//! Plaintext versions of the statistics, over pooled values.
//!
//! These functions see every value, so they are only meant to check the
//! federated results.

use itertools::Itertools;

/// Pools the values of every participant and sorts them.
pub fn sorted_union<V: AsRef<[f64]>>(parts: &[V]) -> Vec<f64> {
    parts
        .iter()
        .flat_map(|part| part.as_ref().iter().copied())
        .sorted_by(f64::total_cmp)
        .collect()
}

/// The `k`-th smallest value, 1-based.
pub fn kth_smallest(values: &[f64], k: usize) -> Option<f64> {
    if k == 0 {
        return None;
    }
    values
        .iter()
        .copied()
        .sorted_by(f64::total_cmp)
        .nth(k - 1)
}

/// The mean of the values.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// The population variance of the values.
pub fn population_variance(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    Some(values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64)
}

/// The extrema of the values.
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().copied().minmax_by(f64::total_cmp).into_option()
}
