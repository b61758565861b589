//! Downsampling of finer archive points into one coarser point.

use whisper_common::AggregationMethod;

/// Combine the known values of one rollup window.
///
/// Values must be in time order so that `Last` picks the newest. Returns
/// `None` for an empty window or the `Unknown` method.
pub fn aggregate(method: AggregationMethod, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    match method {
        AggregationMethod::Average => Some(values.iter().sum::<f64>() / values.len() as f64),
        AggregationMethod::Sum => Some(values.iter().sum()),
        AggregationMethod::Last => values.last().copied(),
        AggregationMethod::Max => values.iter().copied().reduce(f64::max),
        AggregationMethod::Min => values.iter().copied().reduce(f64::min),
        AggregationMethod::Unknown => None,
    }
}

/// Whether `known` of `total` slots clear the xFilesFactor threshold.
pub fn meets_x_files_factor(known: usize, total: usize, x_files_factor: f32) -> bool {
    if known == 0 || total == 0 {
        return false;
    }
    known as f32 / total as f32 >= x_files_factor
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUES: [f64; 4] = [4.0, 1.0, 9.0, 2.0];

    #[test]
    fn test_methods() {
        assert_eq!(aggregate(AggregationMethod::Average, &VALUES), Some(4.0));
        assert_eq!(aggregate(AggregationMethod::Sum, &VALUES), Some(16.0));
        assert_eq!(aggregate(AggregationMethod::Last, &VALUES), Some(2.0));
        assert_eq!(aggregate(AggregationMethod::Max, &VALUES), Some(9.0));
        assert_eq!(aggregate(AggregationMethod::Min, &VALUES), Some(1.0));
    }

    #[test]
    fn test_empty_and_unknown() {
        assert_eq!(aggregate(AggregationMethod::Sum, &[]), None);
        assert_eq!(aggregate(AggregationMethod::Unknown, &VALUES), None);
    }

    #[test]
    fn test_x_files_factor() {
        assert!(meets_x_files_factor(3, 5, 0.5));
        assert!(!meets_x_files_factor(2, 5, 0.5));
        assert!(meets_x_files_factor(5, 5, 1.0));
        // A window with nothing known never produces a point, even at 0.0.
        assert!(!meets_x_files_factor(0, 5, 0.0));
        assert!(meets_x_files_factor(1, 5, 0.0));
    }
}
