//! Distribution metrics used by the diversity checks.
//!
//! All functions take raw category counts; zero counts are allowed and
//! contribute nothing to entropy.

/// Calculates Shannon entropy (natural log) of a distribution.
///
/// # Arguments
///
/// * `counts` - Count per category.
///
/// # Returns
///
/// Entropy in nats; 0.0 for an empty or single-category distribution.
///
/// # Example
///
/// ```
/// use golden_forge::diversity::shannon_entropy;
///
/// let entropy = shannon_entropy(&[10, 10]);
/// // For a uniform distribution, entropy equals ln(n)
/// assert!((entropy - 2f64.ln()).abs() < 1e-10);
/// ```
pub fn shannon_entropy(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }

    let total_f = total as f64;

    counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total_f;
            -p * p.ln()
        })
        .sum()
}

/// Calculates normalized entropy (0.0 to 1.0).
///
/// Normalized by the maximum possible entropy for the given number of
/// categories (`ln(counts.len())`).
pub fn normalized_entropy(counts: &[usize]) -> f64 {
    let entropy = shannon_entropy(counts);
    let max_entropy = (counts.len() as f64).ln();

    if max_entropy > 0.0 {
        (entropy / max_entropy).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Calculates the Gini coefficient of a distribution.
///
/// A Gini coefficient of 0 indicates perfect equality (all categories have
/// the same count); values approach 1 as one category dominates.
pub fn gini_coefficient(counts: &[usize]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }

    let mut values: Vec<f64> = counts.iter().map(|&v| v as f64).collect();
    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len() as f64;
    let total: f64 = values.iter().sum();

    if total == 0.0 {
        return 0.0;
    }

    let mut gini_sum = 0.0;

    for (i, &value) in values.iter().enumerate() {
        gini_sum += (2.0 * (i as f64 + 1.0) - n - 1.0) * value;
    }

    gini_sum / (n * total)
}
