//! Sparse linear algebra plumbing.
//!
//! Sparse vectors back the objective gradient and Jacobian rows; the
//! symmetric COO matrix backs Lagrangian Hessians and KKT systems, with a
//! CSC bridge into the LDL^T backend.

pub mod sparse_vector;
pub mod symmetric;

pub use sparse_vector::SparseVector;
pub use symmetric::SymmetricMatrix;

/// Dense dot product.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}

/// Infinity norm of a dense vector.
#[inline]
pub fn norm_inf(v: &[f64]) -> f64 {
    v.iter().map(|x| x.abs()).fold(0.0_f64, f64::max)
}

/// 1-norm of a dense vector.
#[inline]
pub fn norm_1(v: &[f64]) -> f64 {
    v.iter().map(|x| x.abs()).sum()
}
