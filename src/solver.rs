//! Solution of the assembled linear systems.
use eyre::eyre;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

/// A solver for general (non-symmetric) sparse linear systems.
pub trait LinearSolver {
    fn solve(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> eyre::Result<DVector<f64>>;
}

impl<S: LinearSolver + ?Sized> LinearSolver for &S {
    fn solve(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        (**self).solve(matrix, rhs)
    }
}

impl<S: LinearSolver + ?Sized> LinearSolver for Box<S> {
    fn solve(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        (**self).solve(matrix, rhs)
    }
}

/// Solves the system with a dense LU factorization with partial pivoting.
///
/// The matrix is stored densely and the cost is cubic in the number of unknowns, so this is only
/// suitable for small meshes. See [`WaterFloodingModel::space_mesh`](crate::model::WaterFloodingModel::space_mesh)
/// for the system size as a function of the mesh resolution.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DenseLuSolver;

impl LinearSolver for DenseLuSolver {
    fn solve(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        if matrix.nrows() != matrix.ncols() {
            return Err(eyre!(
                "cannot solve a non-square system of dimensions {}x{}",
                matrix.nrows(),
                matrix.ncols()
            ));
        }
        if matrix.nrows() != rhs.len() {
            return Err(eyre!(
                "right-hand side has length {}, but the matrix has {} rows",
                rhs.len(),
                matrix.nrows()
            ));
        }

        let dense = DMatrix::from(matrix);
        let solution = dense
            .lu()
            .solve(rhs)
            .ok_or_else(|| eyre!("linear system is singular"))?;
        if solution.iter().any(|x| !x.is_finite()) {
            return Err(eyre!("linear solve produced non-finite values"));
        }
        Ok(solution)
    }
}
