//! Sparse LDL^T factorization with inertia.
//!
//! Wraps the `ldl` crate (elimination-tree symbolic pass, up-looking numeric
//! factorization, triangular solves). The factorization is reliable on
//! quasi-definite matrices; the interior-point layers keep their KKT systems
//! quasi-definite through diagonal regularization, and a refused pivot is
//! reported upward as a factorization failure so the regularization can grow.
//!
//! The inertia of the matrix is read off the signs of D, which is what the
//! interior-point correction acts on.

use crate::error::SolverError;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::solvers::{Inertia, SymmetricIndefiniteSolver};

/// Pivots below this magnitude count as zero eigenvalues.
const ZERO_PIVOT_THRESHOLD: f64 = 1e-13;

/// LDL^T backend.
pub struct LdlSolver {
    n: usize,

    // symbolic analysis, reused while the pattern is unchanged
    etree: Vec<Option<usize>>,
    l_nz: Vec<usize>,
    pattern: Option<(Vec<usize>, Vec<usize>)>,

    // numeric factors: L in CSC (l_p, l_cols, l_x) and the diagonal D
    l_p: Vec<usize>,
    l_cols: Vec<usize>,
    l_x: Vec<f64>,
    d: Vec<f64>,
    d_inv: Vec<f64>,
    factorized: bool,

    // reusable workspaces
    bwork: Vec<ldl::Marker>,
    iwork: Vec<usize>,
    fwork: Vec<f64>,
}

impl LdlSolver {
    /// New solver for systems of dimension `n`.
    pub fn new(n: usize) -> Self {
        LdlSolver {
            n,
            etree: vec![None; n],
            l_nz: vec![0; n],
            pattern: None,
            l_p: vec![0; n + 1],
            l_cols: Vec::new(),
            l_x: Vec::new(),
            d: vec![0.0; n],
            d_inv: vec![0.0; n],
            factorized: false,
            bwork: vec![ldl::Marker::Unused; n],
            iwork: vec![0; 3 * n],
            fwork: vec![0.0; n],
        }
    }

    /// Dimension of the systems this solver factors.
    pub fn dimension(&self) -> usize {
        self.n
    }

    fn symbolic(&mut self, a_p: &[usize], a_i: &[usize]) -> Result<(), SolverError> {
        let mut work = vec![0usize; self.n];
        self.etree.iter_mut().for_each(|e| *e = None);
        self.l_nz.iter_mut().for_each(|c| *c = 0);

        ldl::etree(self.n, a_p, a_i, &mut work, &mut self.l_nz, &mut self.etree)
            .map_err(|_| SolverError::LinearSolver("elimination tree failed (pattern not upper triangular?)".into()))?;

        let nnz_l: usize = self.l_nz.iter().sum();
        self.l_cols.resize(nnz_l, 0);
        self.l_x.resize(nnz_l, 0.0);
        self.pattern = Some((a_p.to_vec(), a_i.to_vec()));
        Ok(())
    }
}

impl SymmetricIndefiniteSolver for LdlSolver {
    fn factorize(&mut self, matrix: &SymmetricMatrix) -> Result<(), SolverError> {
        assert_eq!(matrix.dimension(), self.n, "matrix dimension changed under the solver");
        self.factorized = false;

        let csc = matrix.to_upper_csc();
        let indptr = csc.indptr();
        let a_p = indptr.raw_storage();
        let a_i = csc.indices();
        let a_x = csc.data();

        let pattern_unchanged = match &self.pattern {
            Some((p, i)) => p.as_slice() == a_p && i.as_slice() == a_i,
            None => false,
        };
        if !pattern_unchanged {
            self.symbolic(a_p, a_i)?;
        }

        self.bwork.iter_mut().for_each(|m| *m = ldl::Marker::Unused);
        self.iwork.iter_mut().for_each(|w| *w = 0);
        self.fwork.iter_mut().for_each(|w| *w = 0.0);

        ldl::factor(
            self.n,
            a_p,
            a_i,
            a_x,
            &mut self.l_p,
            &mut self.l_cols,
            &mut self.l_x,
            &mut self.d,
            &mut self.d_inv,
            &self.l_nz,
            &self.etree,
            &mut self.bwork,
            &mut self.iwork,
            &mut self.fwork,
        )
        .map_err(|_| SolverError::LinearSolver("numeric LDL^T factorization failed".into()))?;

        if self.d.iter().any(|pivot| !pivot.is_finite()) {
            return Err(SolverError::LinearSolver("non-finite pivot in LDL^T factorization".into()));
        }
        self.factorized = true;
        Ok(())
    }

    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, SolverError> {
        if !self.factorized {
            return Err(SolverError::LinearSolver("solve called before a successful factorization".into()));
        }
        assert_eq!(rhs.len(), self.n);
        let mut solution = rhs.to_vec();
        ldl::solve(self.n, &self.l_p, &self.l_cols, &self.l_x, &self.d_inv, &mut solution);
        Ok(solution)
    }

    fn inertia(&self) -> Inertia {
        let mut inertia = Inertia { positive: 0, negative: 0, zero: 0 };
        for &pivot in &self.d {
            if pivot.abs() <= ZERO_PIVOT_THRESHOLD {
                inertia.zero += 1;
            } else if 0.0 < pivot {
                inertia.positive += 1;
            } else {
                inertia.negative += 1;
            }
        }
        inertia
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_definite_solve() {
        // [[2, 1], [1, 2]] x = [3, 3] has solution [1, 1]
        let mut matrix = SymmetricMatrix::with_capacity(2, 3, false);
        matrix.insert(2.0, 0, 0);
        matrix.insert(1.0, 1, 0);
        matrix.insert(2.0, 1, 1);

        let mut solver = LdlSolver::new(2);
        solver.factorize(&matrix).unwrap();
        let x = solver.solve(&[3.0, 3.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-10);
        assert!((x[1] - 1.0).abs() < 1e-10);
        assert_eq!(solver.inertia(), Inertia { positive: 2, negative: 0, zero: 0 });
        assert!(!solver.is_singular());
        assert_eq!(solver.rank(), 2);
    }

    #[test]
    fn quasi_definite_inertia() {
        // [[1, 0, 1], [0, 1, 1], [1, 1, -1]]: one negative eigenvalue
        let mut matrix = SymmetricMatrix::with_capacity(3, 6, false);
        matrix.insert(1.0, 0, 0);
        matrix.insert(1.0, 1, 1);
        matrix.insert(1.0, 2, 0);
        matrix.insert(1.0, 2, 1);
        matrix.insert(-1.0, 2, 2);

        let mut solver = LdlSolver::new(3);
        solver.factorize(&matrix).unwrap();
        let inertia = solver.inertia();
        assert_eq!(inertia.positive, 2);
        assert_eq!(inertia.negative, 1);
        assert_eq!(inertia.zero, 0);
    }

    #[test]
    fn refactorize_with_same_pattern() {
        let mut matrix = SymmetricMatrix::with_capacity(2, 3, false);
        matrix.insert(2.0, 0, 0);
        matrix.insert(1.0, 1, 0);
        matrix.insert(2.0, 1, 1);

        let mut solver = LdlSolver::new(2);
        solver.factorize(&matrix).unwrap();

        let mut harder = SymmetricMatrix::with_capacity(2, 3, false);
        harder.insert(4.0, 0, 0);
        harder.insert(1.0, 1, 0);
        harder.insert(4.0, 1, 1);
        solver.factorize(&harder).unwrap();
        let x = solver.solve(&[5.0, 5.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-10);
        assert!((x[1] - 1.0).abs() < 1e-10);
    }
}
