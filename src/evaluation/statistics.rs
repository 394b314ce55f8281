//! Aggregate distribution metrics over an evaluated bid set.

use crate::domain::evaluation::BidStatistics;
use crate::evaluation::scoring::round2;

/// Computes the statistics block. Returns `None` for an empty set; the
/// report carries an explicit "no submitted bids" summary instead.
pub fn compute(amounts: &[f64], delivery_days: &[i64], estimated_value: f64) -> Option<BidStatistics> {
    if amounts.is_empty() {
        return None;
    }

    let count = amounts.len();
    let min_amount = amounts.iter().copied().fold(f64::INFINITY, f64::min);
    let max_amount = amounts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let average = amounts.iter().sum::<f64>() / count as f64;
    let median = median(amounts);

    let variance = amounts
        .iter()
        .map(|a| (a - average).powi(2))
        .sum::<f64>()
        / count as f64;
    let std_deviation = variance.sqrt();
    let coefficient_of_variation = if average != 0.0 {
        std_deviation / average * 100.0
    } else {
        0.0
    };

    let min_delivery = delivery_days.iter().copied().min().unwrap_or(0);
    let max_delivery = delivery_days.iter().copied().max().unwrap_or(0);
    let average_delivery = if delivery_days.is_empty() {
        0.0
    } else {
        delivery_days.iter().sum::<i64>() as f64 / delivery_days.len() as f64
    };

    let average_vs_estimate_pct = if estimated_value != 0.0 {
        (average - estimated_value) / estimated_value * 100.0
    } else {
        0.0
    };

    Some(BidStatistics {
        bid_count: count,
        min_amount: round2(min_amount),
        max_amount: round2(max_amount),
        average_amount: round2(average),
        median_amount: round2(median),
        amount_range: round2(max_amount - min_amount),
        std_deviation: round2(std_deviation),
        coefficient_of_variation: round2(coefficient_of_variation),
        min_delivery_days: min_delivery,
        max_delivery_days: max_delivery,
        average_delivery_days: round2(average_delivery),
        average_vs_estimate_pct: round2(average_vs_estimate_pct),
    })
}

/// Population median; even counts average the two middle values.
fn median(amounts: &[f64]) -> f64 {
    let mut sorted = amounts.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_yields_none() {
        assert!(compute(&[], &[], 100000.0).is_none());
    }

    #[test]
    fn two_bid_example() {
        let stats = compute(&[65000.0, 90000.0], &[10, 30], 100000.0).unwrap();
        assert_eq!(stats.bid_count, 2);
        assert_eq!(stats.min_amount, 65000.0);
        assert_eq!(stats.max_amount, 90000.0);
        assert_eq!(stats.average_amount, 77500.0);
        assert_eq!(stats.median_amount, 77500.0);
        assert_eq!(stats.amount_range, 25000.0);
        assert_eq!(stats.std_deviation, 12500.0);
        assert_eq!(stats.coefficient_of_variation, 16.13);
        assert_eq!(stats.min_delivery_days, 10);
        assert_eq!(stats.max_delivery_days, 30);
        assert_eq!(stats.average_delivery_days, 20.0);
        assert_eq!(stats.average_vs_estimate_pct, -22.5);
    }

    #[test]
    fn odd_count_median_takes_middle_value() {
        let stats = compute(&[50.0, 70.0, 200.0], &[5, 10, 15], 0.0).unwrap();
        assert_eq!(stats.median_amount, 70.0);
        // estimate of 0 pins the comparison metric at 0
        assert_eq!(stats.average_vs_estimate_pct, 0.0);
    }

    #[test]
    fn identical_amounts_have_zero_spread() {
        let stats = compute(&[100.0, 100.0], &[7, 7], 100.0).unwrap();
        assert_eq!(stats.std_deviation, 0.0);
        assert_eq!(stats.coefficient_of_variation, 0.0);
        assert_eq!(stats.amount_range, 0.0);
    }
}
