/// Summary of the fitness scores of one generation.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FitnessStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

impl FitnessStats {
    /// Computes statistics from unsorted scores.
    ///
    /// Returns `None` if there are no scores.
    ///
    /// # Examples
    ///
    /// ```
    /// # use mci_evolution::stats::FitnessStats;
    /// let stats = FitnessStats::new([4.0, 1.0, 3.0, 2.0]).unwrap();
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.max, 4.0);
    /// assert_eq!(stats.mean, 2.5);
    /// assert_eq!(stats.median, 2.5);
    /// ```
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values = values.into_iter().collect::<Vec<_>>();
        values.sort_by(f64::total_cmp);
        Self::from_sorted(&values)
    }

    /// Computes statistics from scores sorted in ascending order.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_sorted(sorted_values: &[f64]) -> Option<Self> {
        debug_assert!(sorted_values.is_sorted_by(|a, b| a <= b));

        let min = *sorted_values.first()?;
        let max = *sorted_values.last()?;
        let count = sorted_values.len();
        let n = count as f64;
        let mean = sorted_values.iter().sum::<f64>() / n;
        let median = if count % 2 == 0 {
            f64::midpoint(sorted_values[count / 2 - 1], sorted_values[count / 2])
        } else {
            sorted_values[count / 2]
        };
        let variance = sorted_values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / n;

        Some(Self {
            count,
            min,
            max,
            mean,
            median,
            std_dev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_stats() {
        assert_eq!(FitnessStats::new(Vec::<f64>::new()), None);
    }

    #[test]
    fn test_single_value() {
        let stats = FitnessStats::new([0.7]).unwrap();
        assert_eq!(stats.count, 1);
        assert!((stats.min - 0.7).abs() < 1e-12);
        assert!((stats.median - 0.7).abs() < 1e-12);
        assert!(stats.std_dev.abs() < 1e-12);
    }

    #[test]
    fn test_odd_count() {
        let stats = FitnessStats::new([2.0, 9.0, 4.0, 4.0, 5.0, 5.0, 7.0, 4.0, 1.0]).unwrap();
        assert_eq!(stats.count, 9);
        assert!((stats.min - 1.0).abs() < 1e-12);
        assert!((stats.max - 9.0).abs() < 1e-12);
        assert!((stats.median - 4.0).abs() < 1e-12);
        assert!((stats.mean - 41.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_population_std_dev() {
        let stats = FitnessStats::new([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
        assert!((stats.median - 4.5).abs() < 1e-12);
    }
}
