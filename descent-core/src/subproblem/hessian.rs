//! Hessian models.
//!
//! The subproblem is parameterized by how it obtains second derivatives:
//! exact Lagrangian Hessians from the model, damped BFGS or SR1 dense
//! quasi-Newton approximations, or no curvature at all. Models used without
//! a trust region convexify the matrix (geometric diagonal regularization
//! until the factorization shows no nonpositive pivots) so the local model
//! stays bounded and descent directions exist.

use nalgebra::{DMatrix, DVector};

use crate::error::SolverError;
use crate::iterate::Iterate;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::problem::Problem;
use crate::solvers::ldl::LdlSolver;
use crate::solvers::SymmetricIndefiniteSolver;

/// Which curvature source to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HessianModelKind {
    Exact,
    Bfgs,
    Sr1,
    Zero,
}

impl HessianModelKind {
    /// Parse an option value.
    pub fn from_option(value: &str) -> Result<Self, SolverError> {
        match value {
            "exact" => Ok(HessianModelKind::Exact),
            "BFGS" | "bfgs" => Ok(HessianModelKind::Bfgs),
            "SR1" | "sr1" => Ok(HessianModelKind::Sr1),
            "zero" => Ok(HessianModelKind::Zero),
            other => Err(SolverError::InvalidOption(format!("unknown hessian_model '{other}'"))),
        }
    }
}

/// Curvature provider for the local models.
pub struct HessianModel {
    kind: HessianModelKind,
    dimension: usize,
    /// Assembled matrix, with reserved diagonal regularization slots
    pub hessian: SymmetricMatrix,
    evaluation_count: usize,
    convexify: bool,

    // dense quasi-Newton state
    approximation: Option<DMatrix<f64>>,
    previous_point: Option<DVector<f64>>,
    previous_gradient: Option<DVector<f64>>,
}

impl HessianModel {
    /// New model over `dimension` variables with room for
    /// `maximum_number_nonzeros` entries. `convexify` is set when no trust
    /// region bounds the model.
    pub fn new(
        kind: HessianModelKind,
        dimension: usize,
        maximum_number_nonzeros: usize,
        convexify: bool,
    ) -> Self {
        let quasi_newton = matches!(kind, HessianModelKind::Bfgs | HessianModelKind::Sr1);
        HessianModel {
            kind,
            dimension,
            hessian: SymmetricMatrix::with_capacity(dimension, maximum_number_nonzeros, true),
            evaluation_count: 0,
            convexify,
            approximation: quasi_newton.then(|| DMatrix::identity(dimension, dimension)),
            previous_point: None,
            previous_gradient: None,
        }
    }

    /// Number of (exact or approximate) Hessian evaluations so far.
    pub fn evaluation_count(&self) -> usize {
        self.evaluation_count
    }

    /// Assemble the Hessian of the Lagrangian at the iterate.
    pub fn evaluate(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
        constraints_multipliers: &[f64],
    ) -> Result<(), SolverError> {
        self.hessian.reset();
        match self.kind {
            HessianModelKind::Zero => {}
            HessianModelKind::Exact => {
                iterate.evaluate_lagrangian_hessian(
                    problem,
                    objective_multiplier,
                    constraints_multipliers,
                    &mut self.hessian,
                );
                self.evaluation_count += 1;
            }
            HessianModelKind::Bfgs | HessianModelKind::Sr1 => {
                self.update_quasi_newton(problem, iterate, objective_multiplier, constraints_multipliers)?;
                self.evaluation_count += 1;
            }
        }
        if self.convexify && self.kind != HessianModelKind::Zero {
            self.make_convex()?;
        }
        Ok(())
    }

    fn update_quasi_newton(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
        constraints_multipliers: &[f64],
    ) -> Result<(), SolverError> {
        let n = problem.number_variables();
        let mut multipliers = iterate.multipliers.clone();
        let copy_len = constraints_multipliers.len().min(multipliers.constraints.len());
        multipliers.constraints[..copy_len]
            .copy_from_slice(&constraints_multipliers[..copy_len]);
        let gradient = iterate.lagrangian_gradient(problem, objective_multiplier, &multipliers)?;
        let gradient = DVector::from_vec(gradient);
        let point = DVector::from_column_slice(&iterate.x[..n]);

        let approximation = self.approximation.as_mut().expect("quasi-Newton state missing");
        if let (Some(previous_point), Some(previous_gradient)) = (&self.previous_point, &self.previous_gradient) {
            let step = &point - previous_point;
            let gradient_change = &gradient - previous_gradient;
            if 1e-12 < step.norm() {
                match self.kind {
                    HessianModelKind::Bfgs => damped_bfgs_update(approximation, &step, &gradient_change),
                    HessianModelKind::Sr1 => sr1_update(approximation, &step, &gradient_change),
                    _ => unreachable!(),
                }
            }
        }
        self.previous_point = Some(point);
        self.previous_gradient = Some(gradient);

        // write the dense approximation into the sparse model
        for row in 0..n {
            for column in 0..=row {
                let value = approximation[(row, column)];
                if 1e-14 < value.abs() {
                    self.hessian.insert(value, row, column);
                }
            }
        }
        Ok(())
    }

    /// Grow the diagonal regularization until the factorization reports all
    /// positive pivots.
    fn make_convex(&mut self) -> Result<(), SolverError> {
        let n = self.dimension;
        let mut ldl = LdlSolver::new(n);

        let positive_definite = |ldl: &mut LdlSolver, hessian: &SymmetricMatrix| -> bool {
            match ldl.factorize(hessian) {
                Ok(()) => {
                    let inertia = ldl.inertia();
                    inertia.positive == n && inertia.negative == 0 && inertia.zero == 0
                }
                Err(_) => false,
            }
        };

        if positive_definite(&mut ldl, &self.hessian) {
            return Ok(());
        }
        let smallest = self.hessian.smallest_diagonal_entry(n);
        let mut regularization = 1e-4_f64.max(2.0 * smallest.abs());
        loop {
            self.hessian.set_regularization(|_| regularization);
            if positive_definite(&mut ldl, &self.hessian) {
                return Ok(());
            }
            regularization *= 8.0;
            if 1e40 < regularization {
                return Err(SolverError::Regularization(
                    "Hessian could not be convexified".into(),
                ));
            }
        }
    }
}

fn damped_bfgs_update(approximation: &mut DMatrix<f64>, step: &DVector<f64>, gradient_change: &DVector<f64>) {
    let b_step = &*approximation * step;
    let step_b_step = step.dot(&b_step);
    if step_b_step <= 1e-16 {
        return;
    }
    let step_dot_change = step.dot(gradient_change);

    // Powell damping keeps the update positive definite
    let theta = if 0.2 * step_b_step <= step_dot_change {
        1.0
    } else {
        0.8 * step_b_step / (step_b_step - step_dot_change)
    };
    let r = theta * gradient_change + (1.0 - theta) * &b_step;
    let step_dot_r = step.dot(&r);
    if step_dot_r <= 1e-16 {
        return;
    }
    *approximation += &r * r.transpose() / step_dot_r - &b_step * b_step.transpose() / step_b_step;
}

fn sr1_update(approximation: &mut DMatrix<f64>, step: &DVector<f64>, gradient_change: &DVector<f64>) {
    let v = gradient_change - &*approximation * step;
    let step_dot_v = step.dot(&v);
    // skip nearly orthogonal updates
    if step_dot_v.abs() < 1e-8 * step.norm() * v.norm() {
        return;
    }
    *approximation += &v * v.transpose() / step_dot_v;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bfgs_update_stays_positive_definite() {
        let mut b = DMatrix::identity(2, 2);
        // curvature information with negative s'y forces damping
        let step = DVector::from_vec(vec![1.0, 0.0]);
        let gradient_change = DVector::from_vec(vec![-0.5, 0.1]);
        damped_bfgs_update(&mut b, &step, &gradient_change);

        // positive definiteness via leading minors
        let det = b[(0, 0)] * b[(1, 1)] - b[(0, 1)] * b[(1, 0)];
        assert!(0.0 < b[(0, 0)]);
        assert!(0.0 < det);
    }

    #[test]
    fn sr1_skips_orthogonal_updates() {
        let mut b = DMatrix::identity(2, 2);
        let step = DVector::from_vec(vec![1.0, 0.0]);
        // y = B s makes v = 0: no update
        let gradient_change = DVector::from_vec(vec![1.0, 0.0]);
        sr1_update(&mut b, &step, &gradient_change);
        assert_eq!(b, DMatrix::identity(2, 2));
    }

    #[test]
    fn convexification_fixes_an_indefinite_matrix() {
        let mut model = HessianModel::new(HessianModelKind::Zero, 2, 4, true);
        // hand the model an indefinite matrix
        model.hessian.reset();
        model.hessian.insert(-3.0, 0, 0);
        model.hessian.insert(1.0, 1, 1);
        model.make_convex().unwrap();

        let mut ldl = LdlSolver::new(2);
        ldl.factorize(&model.hessian).unwrap();
        let inertia = ldl.inertia();
        assert_eq!(inertia.positive, 2);
    }
}
