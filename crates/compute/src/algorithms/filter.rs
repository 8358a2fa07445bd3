//! Series filters applied before and after n-sigma scoring.
//!
//! NaN marks a missing value throughout: it is skipped when computing
//! statistics and stays NaN in the output.

/// Window of the rolling median used by [`median_filter`].
pub const MEDIAN_WINDOW: usize = 30;

/// Min-max scale onto `[0, 1]`. A flat series maps to zeros.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if min > max {
        return values.to_vec();
    }
    let span = max - min;
    values
        .iter()
        .map(|v| {
            if v.is_nan() {
                f64::NAN
            } else if span == 0.0 {
                0.0
            } else {
                (v - min) / span
            }
        })
        .collect()
}

/// Distance of every value from the median of the trailing `window`
/// values (itself included). Windows shorter than `window` at the start
/// use what is there.
pub fn median_filter(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut scratch: Vec<f64> = Vec::with_capacity(window);
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            if v.is_nan() {
                return f64::NAN;
            }
            scratch.clear();
            let start = (i + 1).saturating_sub(window);
            scratch.extend(values[start..=i].iter().copied().filter(|x| !x.is_nan()));
            scratch.sort_by(f64::total_cmp);
            (v - median(&scratch)).abs()
        })
        .collect()
}

/// Median of a sorted, non-empty slice.
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Keep only flags that have a flagged neighbour; isolated outliers are dropped.
pub fn fix_result(flags: &[bool]) -> Vec<bool> {
    let mut fixed = vec![false; flags.len()];
    for i in 1..flags.len() {
        if flags[i - 1] && flags[i] {
            fixed[i - 1] = true;
            fixed[i] = true;
        }
    }
    fixed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_scales_to_unit_range() {
        assert_eq!(normalize(&[2.0, 4.0, 6.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(normalize(&[3.0, 3.0]), vec![0.0, 0.0]);
        assert!(normalize(&[]).is_empty());

        let out = normalize(&[0.0, f64::NAN, 10.0]);
        assert_eq!(out[0], 0.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn median_filter_measures_distance_from_trailing_median() {
        let out = median_filter(&[1.0, 1.0, 1.0, 9.0, 1.0], 3);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 8.0, 0.0]);

        // Even window: median of [1, 3] is 2
        assert_eq!(median_filter(&[1.0, 3.0], 4), vec![0.0, 1.0]);
    }

    #[test]
    fn median_filter_skips_missing_values() {
        let out = median_filter(&[2.0, f64::NAN, 2.0, 5.0], 30);
        assert_eq!(out[0], 0.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 0.0);
        assert_eq!(out[3], 3.0);
    }

    #[test]
    fn fix_result_drops_isolated_flags() {
        assert_eq!(
            fix_result(&[true, false, true, true, false, true]),
            vec![false, false, true, true, false, false]
        );
        assert!(fix_result(&[]).is_empty());
        assert_eq!(fix_result(&[true]), vec![false]);
    }
}
