//! Synthetic point sets and brute-force ground truth for tests and
//! benchmarks.
//!
//! The interesting regime for a projection index is data whose intrinsic
//! dimensionality sits far below the ambient one, so the main generator
//! draws latent low-dimensional points and pushes them through a random
//! linear map.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::distance::euclidean_distance;
use crate::linalg;

/// Points uniform in [-1, 1)^dim, flat layout.
pub fn generate_uniform(dim: usize, num_points: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..dim * num_points)
        .map(|_| 2.0 * rng.random::<f64>() - 1.0)
        .collect()
}

/// Standard-normal points, flat layout.
pub fn generate_normal(dim: usize, num_points: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..dim * num_points)
        .map(|_| rng.sample(StandardNormal))
        .collect()
}

/// Points on a random `intrinsic_dim`-dimensional subspace of ambient
/// `dim`-space: latent points uniform in [-1, 1) times a random linear
/// transformation.
pub fn generate_low_intrinsic(
    dim: usize,
    intrinsic_dim: usize,
    num_points: usize,
    seed: u64,
) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let latent: Vec<f64> = (0..intrinsic_dim * num_points)
        .map(|_| 2.0 * rng.random::<f64>() - 1.0)
        .collect();
    let transformation: Vec<f64> = (0..intrinsic_dim * dim)
        .map(|_| 2.0 * rng.random::<f64>() - 1.0)
        .collect();

    // transformation is intrinsic_dim × dim, latent is intrinsic_dim ×
    // num_points; the product is dim × num_points, column-major, which is
    // exactly the flat point layout.
    let mut data = vec![0.0; dim * num_points];
    linalg::matmul_at_b(dim, num_points, intrinsic_dim, &transformation, &latent, &mut data);
    data
}

/// Exact k nearest neighbours of `query` by brute force, ascending by
/// Euclidean distance.
pub fn ground_truth(query: &[f64], data: &[f64], dim: usize, k: usize) -> Vec<(usize, f64)> {
    let mut distances: Vec<(usize, f64)> = data
        .chunks_exact(dim)
        .enumerate()
        .map(|(i, point)| (i, euclidean_distance(query, point)))
        .collect();
    distances.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    distances.truncate(k);
    distances
}

/// Fraction of the true top-k present among the retrieved ids.
pub fn recall_at_k(truth: &[usize], retrieved: &[usize], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let truth: std::collections::HashSet<usize> = truth.iter().take(k).copied().collect();
    let hits = retrieved
        .iter()
        .take(k)
        .filter(|id| truth.contains(id))
        .count();
    hits as f64 / k as f64
}
