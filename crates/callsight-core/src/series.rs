//! Numeric series helpers used by the aggregation layer.
//!
//! All functions tolerate empty input (an empty series divides by a length
//! of one, matching the reporting convention of "zero, not NaN").

/// Round half up to `decimals` decimal places.
///
/// Uses scaling rather than string formatting; adequate for the magnitudes
/// this pipeline reports (milliseconds, percentages, packet counts).
#[must_use]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    #[allow(clippy::cast_possible_wrap)]
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Arithmetic mean; `0.0` for an empty series.
#[must_use]
pub fn mean(series: &[f64]) -> f64 {
    let len = series.len().max(1);
    #[allow(clippy::cast_precision_loss)]
    let divisor = len as f64;
    series.iter().sum::<f64>() / divisor
}

/// Arithmetic mean rounded to `decimals` places.
#[must_use]
pub fn fixed_dec_mean(series: &[f64], decimals: u32) -> f64 {
    round_to(mean(series), decimals)
}

/// Standardized central moment of the given order.
///
/// order 2: variance, order 3: skewness, order 4: kurtosis.
#[must_use]
pub fn standardized_moment(series: &[f64], order: i32) -> f64 {
    let len = series.len().max(1);
    #[allow(clippy::cast_precision_loss)]
    let divisor = len as f64;
    let m = mean(series);
    series.iter().map(|v| (v - m).powi(order)).sum::<f64>() / divisor
}

/// `part` as a percentage of `whole`, rounded to two decimals.
///
/// Returns `None` when `whole` is zero; a percentage of nothing is not a
/// number, not 0.
#[must_use]
pub fn percent_of(part: f64, whole: f64) -> Option<f64> {
    if whole == 0.0 {
        return None;
    }
    Some(round_to(part / whole * 100.0, 2))
}

/// Median of a series (lower middle for even lengths), `None` when empty.
#[must_use]
pub fn median(series: &[f64]) -> Option<f64> {
    if series.is_empty() {
        return None;
    }
    let mut sorted = series.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(sorted[sorted.len() / 2])
}

/// Most common element of a series; `None` when empty.
///
/// Ties break toward the element seen first.
#[must_use]
pub fn mode(series: &[i64]) -> Option<i64> {
    let mut counts: Vec<(i64, usize)> = Vec::new();
    for &item in series {
        match counts.iter_mut().find(|(v, _)| *v == item) {
            Some((_, n)) => *n += 1,
            None => counts.push((item, 1)),
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(_, n)| n)
        .map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_two_places() {
        assert_eq!(round_to(1.005, 2), 1.01);
        assert_eq!(round_to(2.344, 2), 2.34);
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn mean_of_values() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
    }

    #[test]
    fn variance_via_moment() {
        // series 2,4,4,4,5,5,7,9 has variance 4
        let series = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(standardized_moment(&series, 2), 4.0);
    }

    #[test]
    fn percent_of_whole() {
        assert_eq!(percent_of(5.0, 200.0), Some(2.5));
        assert_eq!(percent_of(5.0, 0.0), None);
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(3.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn mode_prefers_most_common() {
        assert_eq!(mode(&[1, 2, 2, 3]), Some(2));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn fixed_dec_mean_rounds() {
        assert_eq!(fixed_dec_mean(&[1.0, 2.0], 1), 1.5);
        assert_eq!(fixed_dec_mean(&[1.0, 1.0, 2.0], 2), 1.33);
    }
}
