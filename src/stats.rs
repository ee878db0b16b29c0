/// Calculate the arithmetic mean of a collection of values
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculate the sample standard deviation of a collection of values
///
/// # Arguments
/// * `values` - The data points
/// * `mean_value` - Optional pre-calculated mean to avoid recalculation
pub fn standard_deviation(values: &[f64], mean_value: Option<f64>) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mean = mean_value.unwrap_or_else(|| mean(values));
    let variance = values.iter()
        .map(|x| (x - mean).powi(2))
        .sum::<f64>() / (values.len() - 1) as f64;

    variance.sqrt()
}

/// Upper median of a collection: the element at index `len / 2` after sorting.
/// Returns 0.0 for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[sorted.len() / 2]
}
