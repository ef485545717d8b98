use crate::mesh::TriangleMesh2d;
use crate::space::{build_cell_dof_table, FunctionSpace, SpaceKind};
use nalgebra::{DMatrixViewMut, Vector3};
use std::sync::Arc;

/// Piecewise linear functions without inter-element continuity.
///
/// Each cell owns three DOFs, which are the values at its vertices.
#[derive(Debug, Clone)]
pub struct DiscontinuousLinearSpace {
    mesh: Arc<TriangleMesh2d>,
    cell_dofs: Vec<usize>,
}

impl DiscontinuousLinearSpace {
    pub fn new(mesh: Arc<TriangleMesh2d>) -> Self {
        let cell_dofs = build_cell_dof_table(&mesh, |c| [3 * c, 3 * c + 1, 3 * c + 2]);
        Self { mesh, cell_dofs }
    }
}

impl FunctionSpace for DiscontinuousLinearSpace {
    fn kind(&self) -> SpaceKind {
        SpaceKind::DiscontinuousLinear
    }

    fn mesh(&self) -> &TriangleMesh2d {
        &self.mesh
    }

    fn num_global_dofs(&self) -> usize {
        3 * self.mesh.num_cells()
    }

    fn cell_dof_count(&self) -> usize {
        3
    }

    fn cell_dofs(&self, cell_index: usize) -> &[usize] {
        &self.cell_dofs[3 * cell_index..3 * cell_index + 3]
    }

    fn face_dofs(&self, _face_index: usize) -> &[usize] {
        &[]
    }

    fn populate_basis(&self, _cell_index: usize, bc: &Vector3<f64>, mut output: DMatrixViewMut<f64>) {
        assert_eq!(output.shape(), (1, 3), "Output buffer dimension mismatch");
        output.copy_from(&bc.transpose());
    }

    fn populate_basis_gradients(
        &self,
        cell_index: usize,
        _bc: &Vector3<f64>,
        mut output: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        assert_eq!(output.shape(), (2, 3), "Output buffer dimension mismatch");
        for (i, gradient) in self.mesh.grad_lambda(cell_index).iter().enumerate() {
            output.set_column(i, gradient);
        }
        Ok(())
    }
}
