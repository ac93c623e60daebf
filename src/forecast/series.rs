//! Daily regularisation of an observed series

use chrono::NaiveDate;

/// Place `(date, value)` pairs on a strict daily grid from the first to the
/// last date.
///
/// Interior gaps are interpolated linearly in time; gaps at either edge take
/// the nearest known value. Input must be sorted by date. Non-finite values
/// count as gaps.
#[must_use]
pub fn to_daily(dates: &[NaiveDate], values: &[f64]) -> Vec<f64> {
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return Vec::new();
    };
    let span = usize::try_from((last - first).num_days()).unwrap_or(0) + 1;

    let mut grid: Vec<Option<f64>> = vec![None; span];
    for (date, value) in dates.iter().zip(values) {
        if let Ok(offset) = usize::try_from((*date - first).num_days()) {
            if let Some(slot) = grid.get_mut(offset) {
                if value.is_finite() {
                    *slot = Some(*value);
                }
            }
        }
    }
    fill_gaps(&grid)
}

/// Linear interpolation between known points with edge fill.
/// All-missing input yields zeros.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fill_gaps(grid: &[Option<f64>]) -> Vec<f64> {
    let known: Vec<(usize, f64)> = grid
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    let (Some(&(first_i, first_v)), Some(&(last_i, last_v))) = (known.first(), known.last()) else {
        return vec![0.0; grid.len()];
    };

    let mut out = vec![0.0; grid.len()];
    for slot in out.iter_mut().take(first_i) {
        *slot = first_v;
    }
    for pair in known.windows(2) {
        let (i0, v0) = pair[0];
        let (i1, v1) = pair[1];
        let width = (i1 - i0) as f64;
        for (k, slot) in out.iter_mut().enumerate().take(i1).skip(i0) {
            *slot = v0 + (v1 - v0) * (k - i0) as f64 / width;
        }
    }
    for slot in out.iter_mut().skip(last_i) {
        *slot = last_v;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_interior_gap_is_interpolated() {
        let daily = to_daily(&[d(1), d(4)], &[0.0, 3.0]);
        assert_eq!(daily, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_edges_take_nearest_value() {
        let grid = [None, Some(2.0), None, Some(4.0), None];
        assert_eq!(fill_gaps(&grid), vec![2.0, 2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn test_nan_counts_as_gap() {
        let daily = to_daily(&[d(1), d(2), d(3)], &[1.0, f64::NAN, 5.0]);
        assert_eq!(daily, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_empty_input() {
        assert!(to_daily(&[], &[]).is_empty());
        assert_eq!(fill_gaps(&[None, None]), vec![0.0, 0.0]);
    }
}
