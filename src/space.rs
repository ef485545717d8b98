//! Finite element spaces on triangle meshes.
//!
//! Every space exposes its degree-of-freedom maps (cell to DOF, face to DOF) and the
//! evaluation of its basis functions at barycentric points of a cell. DOF maps are built
//! once at construction and are immutable afterwards.
use crate::mesh::TriangleMesh2d;
use eyre::eyre;
use nalgebra::{DMatrixViewMut, Vector3};

mod constant;
mod discontinuous;
mod lagrange;
mod raviart_thomas;

pub use constant::*;
pub use discontinuous::*;
pub use lagrange::*;
pub use raviart_thomas::*;

/// Identifies the kind of a finite element space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SpaceKind {
    /// Piecewise constant functions, one DOF per cell.
    PiecewiseConstant,
    /// Linear functions on each cell without continuity across faces.
    DiscontinuousLinear,
    /// Continuous piecewise linear functions, one DOF per vertex.
    Lagrange,
    /// Lowest-order Raviart-Thomas vector fields, one DOF per face.
    RaviartThomas,
}

pub trait FunctionSpace {
    fn kind(&self) -> SpaceKind;

    fn mesh(&self) -> &TriangleMesh2d;

    fn num_global_dofs(&self) -> usize;

    fn num_cells(&self) -> usize {
        self.mesh().num_cells()
    }

    /// Number of components of the basis functions (1 for scalar spaces).
    fn value_dim(&self) -> usize {
        1
    }

    /// Number of DOFs associated with each cell.
    fn cell_dof_count(&self) -> usize;

    /// Global DOF indices of the cell, ordered consistently with the local basis.
    fn cell_dofs(&self, cell_index: usize) -> &[usize];

    /// Global DOF indices that live on the face.
    ///
    /// Spaces whose DOFs are all interior to cells return an empty slice.
    fn face_dofs(&self, face_index: usize) -> &[usize];

    /// Evaluates the local basis functions at the given barycentric point of a cell.
    ///
    /// The output has dimensions `value_dim x cell_dof_count`, with column `j` holding the value
    /// of local basis function `j`.
    fn populate_basis(&self, cell_index: usize, bc: &Vector3<f64>, output: DMatrixViewMut<f64>);

    /// Evaluates the physical gradients of the local basis functions of a scalar space.
    ///
    /// The output has dimensions `2 x cell_dof_count`.
    fn populate_basis_gradients(
        &self,
        _cell_index: usize,
        _bc: &Vector3<f64>,
        _output: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        Err(eyre!("basis gradients are not available for spaces of kind {:?}", self.kind()))
    }

    /// Evaluates the divergence of the local basis functions of a vector-valued space.
    fn populate_basis_divergence(
        &self,
        _cell_index: usize,
        _bc: &Vector3<f64>,
        _output: &mut [f64],
    ) -> eyre::Result<()> {
        Err(eyre!("basis divergence is not available for spaces of kind {:?}", self.kind()))
    }
}

/// Builds a flat cell-to-DOF table from a function producing the DOFs of each cell.
fn build_cell_dof_table<const N: usize>(mesh: &TriangleMesh2d, f: impl Fn(usize) -> [usize; N]) -> Vec<usize> {
    (0..mesh.num_cells()).flat_map(f).collect()
}
