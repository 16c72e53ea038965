//! Small numeric helpers shared by the builders.

/// Ordinary-least-squares slope of `values` against their index `0..n`.
///
/// Zero for fewer than two points.
///
/// # Examples
///
/// ```
/// use chronos_history::stats::linear_slope;
///
/// assert!((linear_slope(&[1, 2, 3, 4]) - 1.0).abs() < 1e-12);
/// assert_eq!(linear_slope(&[5]), 0.0);
/// ```
pub fn linear_slope(values: &[u32]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &v) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (f64::from(v) - y_mean);
        denominator += dx * dx;
    }

    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Population standard deviation divided by the mean.
///
/// Zero when there are fewer than two values or the mean is zero.
///
/// # Examples
///
/// ```
/// use chronos_history::stats::coefficient_of_variation;
///
/// assert_eq!(coefficient_of_variation(&[3, 3, 3]), 0.0);
/// assert!((coefficient_of_variation(&[0, 2]) - 1.0).abs() < 1e-12);
/// ```
pub fn coefficient_of_variation(values: &[u32]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let total: u64 = values.iter().map(|&v| u64::from(v)).sum();
    if total == 0 {
        return 0.0;
    }

    let mean = total as f64 / n as f64;
    let variance = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;

    variance.sqrt() / mean
}

/// Shannon entropy in bits of the distribution proportional to `counts`.
///
/// Zero entries are ignored; an all-zero input has entropy zero.
///
/// # Examples
///
/// ```
/// use chronos_history::stats::shannon_entropy;
///
/// assert_eq!(shannon_entropy([7u32]), 0.0);
/// assert!((shannon_entropy([1u32, 1]) - 1.0).abs() < 1e-12);
/// assert!((shannon_entropy([1u32, 1, 1, 1]) - 2.0).abs() < 1e-12);
/// ```
pub fn shannon_entropy<I>(counts: I) -> f64
where
    I: IntoIterator<Item = u32>,
    I::IntoIter: Clone,
{
    let iter = counts.into_iter();
    let total: u64 = iter.clone().map(u64::from).sum();
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    let entropy: f64 = iter
        .filter(|&c| c > 0)
        .map(|c| {
            let p = f64::from(c) / total;
            -p * p.log2()
        })
        .sum();

    // A single category sums to -0.0.
    if entropy <= 0.0 {
        0.0
    } else {
        entropy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_series_has_zero_slope() {
        assert_eq!(linear_slope(&[2, 2, 2, 2]), 0.0);
    }

    #[test]
    fn falling_series_has_negative_slope() {
        let slope = linear_slope(&[6, 4, 2, 0]);
        assert!((slope + 2.0).abs() < 1e-12);
    }

    #[test]
    fn empty_series_has_zero_slope_and_cv() {
        assert_eq!(linear_slope(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[]), 0.0);
    }

    #[test]
    fn cv_of_equal_nonzero_values_is_zero() {
        assert_eq!(coefficient_of_variation(&[4, 4, 4, 4, 4]), 0.0);
    }

    #[test]
    fn cv_of_all_zero_values_is_zero() {
        assert_eq!(coefficient_of_variation(&[0, 0, 0]), 0.0);
    }

    #[test]
    fn cv_matches_hand_computation() {
        // mean 2, population variance ((1)^2 + 0 + 1^2) / 3 = 2/3
        let cv = coefficient_of_variation(&[1, 2, 3]);
        let expected = (2.0f64 / 3.0).sqrt() / 2.0;
        assert!((cv - expected).abs() < 1e-12);
    }

    #[test]
    fn entropy_of_single_category_is_zero() {
        assert_eq!(shannon_entropy([42u32]), 0.0);
        assert!(shannon_entropy([42u32]).is_sign_positive());
    }

    #[test]
    fn entropy_ignores_zero_entries() {
        let with_zeros = shannon_entropy([0u32, 3, 0, 3]);
        assert!((with_zeros - 1.0).abs() < 1e-12);
    }

    #[test]
    fn entropy_of_empty_input_is_zero() {
        assert_eq!(shannon_entropy(Vec::<u32>::new()), 0.0);
    }

    #[test]
    fn entropy_of_skewed_distribution() {
        // p = (0.75, 0.25)
        let h = shannon_entropy([3u32, 1]);
        let expected = -(0.75f64 * 0.75f64.log2() + 0.25f64 * 0.25f64.log2());
        assert!((h - expected).abs() < 1e-12);
    }
}
