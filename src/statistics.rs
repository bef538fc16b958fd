/// A simple statistics module with some utility functions such as calculation of percentiles.
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, OrderStatistics};

pub fn percentile(numbers: &[f64], percentile: usize) -> f64 {
    let numbers = numbers.to_vec();
    let mut data = Data::new(numbers);

    data.percentile(percentile)
}

pub fn median(numbers: &[f64]) -> f64 {
    Data::new(numbers.to_vec()).median()
}

/// How far the fitted region totals ended up from their targets, as relative deviations.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DeviationSummary {
    pub max_column_deviation: f64,
    pub median_column_deviation: f64,
    pub p90_column_deviation: f64,
}

impl DeviationSummary {
    pub fn from_deviations(deviations: &[f64]) -> Self {
        if deviations.is_empty() {
            return Default::default();
        }

        Self {
            max_column_deviation: deviations.iter().copied().fold(0., f64::max),
            median_column_deviation: median(deviations),
            p90_column_deviation: percentile(deviations, 90),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn numbers() -> [f64; 10] {
        [9.0, 3.0, 3.0, 4.0, 5.0, 4.9, 8.0, 3.3, 2.0, 0.1]
    }

    #[rstest]
    fn test_percentile(numbers: [f64; 10]) {
        assert_relative_eq!(percentile(&numbers, 70), 4.95, max_relative = 1e-2);
        assert_relative_eq!(percentile(&numbers, 50), 3.65, max_relative = 1e-2);
    }

    #[rstest]
    fn test_median(numbers: [f64; 10]) {
        assert_relative_eq!(median(&numbers), 3.65);
    }

    #[rstest]
    fn test_deviation_summary() {
        let summary = DeviationSummary::from_deviations(&[0.0, 0.25, 0.01]);

        assert_eq!(summary.max_column_deviation, 0.25);
        assert_relative_eq!(summary.median_column_deviation, 0.01);
    }

    #[rstest]
    fn test_deviation_summary_of_nothing_is_zero() {
        assert_eq!(
            DeviationSummary::from_deviations(&[]),
            DeviationSummary::default()
        );
    }
}
