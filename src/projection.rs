//! Random projection bank.
//!
//! Directions are sampled uniformly on the unit sphere by drawing
//! standard-normal entries and normalizing each column. Bulk projection is
//! a single Aᵀ·B product against the point matrix.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

use crate::linalg;

/// Column-major dim × count matrix of unit-norm projection directions.
#[derive(Debug, Clone)]
pub(crate) struct ProjectionBank {
    dim: usize,
    count: usize,
    columns: Vec<f64>,
}

impl ProjectionBank {
    /// Samples `count` independent directions from the uniform distribution
    /// on the (dim−1)-sphere.
    pub fn sample(dim: usize, count: usize, rng: &mut StdRng) -> Self {
        let mut columns = vec![0.0; dim * count];
        for col in columns.chunks_exact_mut(dim) {
            loop {
                for v in col.iter_mut() {
                    *v = rng.sample(StandardNormal);
                }
                let norm = col.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for v in col.iter_mut() {
                        *v /= norm;
                    }
                    break;
                }
            }
        }
        Self { dim, count, columns }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Projects `num_points` points (each `dim` consecutive values) onto
    /// every direction. The result is count × num_points, column-major: the
    /// projections of one point are contiguous.
    pub fn project(&self, points: &[f64], num_points: usize) -> Vec<f64> {
        debug_assert_eq!(points.len(), self.dim * num_points);
        let mut out = vec![0.0; self.count * num_points];
        linalg::matmul_at_b(self.count, num_points, self.dim, &self.columns, points, &mut out);
        out
    }

    /// Projections of a single point onto every direction.
    pub fn project_one(&self, point: &[f64]) -> Vec<f64> {
        self.project(point, 1)
    }

    #[cfg(test)]
    pub fn column(&self, i: usize) -> &[f64] {
        &self.columns[i * self.dim..(i + 1) * self.dim]
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn columns_have_unit_norm() {
        let mut rng = StdRng::seed_from_u64(0);
        let bank = ProjectionBank::sample(50, 12, &mut rng);
        for i in 0..bank.count() {
            let norm: f64 = bank.column(i).iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-12, "column {i} has norm {norm}");
        }
    }

    #[test]
    fn sampling_is_deterministic() {
        let a = ProjectionBank::sample(10, 4, &mut StdRng::seed_from_u64(7));
        let b = ProjectionBank::sample(10, 4, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.columns, b.columns);
    }

    #[test]
    fn projection_matches_manual_dot_products() {
        let mut rng = StdRng::seed_from_u64(1);
        let bank = ProjectionBank::sample(3, 5, &mut rng);
        let point = [0.5, -2.0, 1.5];
        let proj = bank.project_one(&point);
        for i in 0..bank.count() {
            let expected: f64 = bank
                .column(i)
                .iter()
                .zip(point.iter())
                .map(|(c, p)| c * p)
                .sum();
            assert!((proj[i] - expected).abs() < 1e-15);
        }
    }
}
