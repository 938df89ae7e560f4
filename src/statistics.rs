/// Summary statistics over the simulated houses.
use statrs::statistics::{Data, OrderStatistics, Statistics};

pub fn percentile(numbers: &[f64], percentile: usize) -> f64 {
    let mut data = Data::new(numbers.to_vec());

    data.percentile(percentile)
}

pub fn mean(numbers: &[f64]) -> Option<f64> {
    if numbers.is_empty() {
        return None;
    }
    Some(numbers.mean())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn numbers() -> [f64; 10] {
        [9.0, 3.0, 3.0, 4.0, 5.0, 4.9, 8.0, 3.3, 2.0, 0.1]
    }

    #[rstest]
    fn test_percentile(numbers: [f64; 10]) {
        assert_abs_diff_eq!(percentile(&numbers, 70), 4.95, epsilon = 1e-2);
        assert_abs_diff_eq!(percentile(&numbers, 50), 3.65, epsilon = 1e-2);
    }

    #[rstest]
    fn test_mean(numbers: [f64; 10]) {
        assert_abs_diff_eq!(mean(&numbers).unwrap(), 4.23, epsilon = 1e-9);
        assert_eq!(mean(&[]), None);
    }
}
