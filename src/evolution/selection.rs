//! Parent selection strategies.

use super::EvolutionError;
use rand::Rng;

/// Fitness-proportionate ("roulette wheel") sampling of `count` indices.
///
/// Negative weights count as zero. Each draw is uniform in `[0, total)` and
/// picks the first index whose cumulative weight exceeds it.
///
/// # Errors
/// * `DegenerateSelection` when the total weight is not positive (or not finite)
pub fn roulette_select<R: Rng + ?Sized>(
    weights: &[f64],
    count: usize,
    rng: &mut R,
) -> Result<Vec<usize>, EvolutionError> {
    let clipped: Vec<f64> = weights.iter().map(|w| w.max(0.0)).collect();
    let total: f64 = clipped.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(EvolutionError::DegenerateSelection { total });
    }

    let cumulative: Vec<f64> = clipped
        .iter()
        .scan(0.0, |acc, w| {
            *acc += w;
            Some(*acc)
        })
        .collect();

    let picks = (0..count)
        .map(|_| {
            let draw = rng.random_range(0.0..total);
            cumulative
                .iter()
                .position(|&c| c > draw)
                // rounding can leave the last cumulative a hair below `total`
                .unwrap_or_else(|| last_positive(&clipped))
        })
        .collect();
    Ok(picks)
}

/// Uniform sampling with replacement, the fallback for degenerate weights.
pub fn uniform_select<R: Rng + ?Sized>(len: usize, count: usize, rng: &mut R) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    (0..count).map(|_| rng.random_range(0..len)).collect()
}

fn last_positive(weights: &[f64]) -> usize {
    weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
}
