//! The one dense-linear-algebra routine the index needs.

/// Computes `C = Aᵀ·B` over column-major storage.
///
/// `A` is k×m, `B` is k×n and `C` is m×n. Every output entry is the dot
/// product of one column of `A` with one column of `B`, so both inner loops
/// run over contiguous memory.
pub(crate) fn matmul_at_b(m: usize, n: usize, k: usize, a: &[f64], b: &[f64], c: &mut [f64]) {
    debug_assert_eq!(a.len(), k * m);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(c.len(), m * n);

    for j in 0..n {
        let b_col = &b[j * k..(j + 1) * k];
        let c_col = &mut c[j * m..(j + 1) * m];
        for (i, out) in c_col.iter_mut().enumerate() {
            let a_col = &a[i * k..(i + 1) * k];
            *out = a_col.iter().zip(b_col).map(|(x, y)| x * y).sum();
        }
    }
}
