use crate::mesh::TriangleMesh2d;
use crate::space::{build_cell_dof_table, FunctionSpace, SpaceKind};
use nalgebra::{DMatrixViewMut, Vector3};
use std::sync::Arc;

/// Continuous piecewise linear (P1) Lagrange functions.
///
/// DOFs coincide with mesh vertices, and the local basis functions of a cell are its
/// barycentric coordinates.
#[derive(Debug, Clone)]
pub struct LagrangeSpace {
    mesh: Arc<TriangleMesh2d>,
    cell_dofs: Vec<usize>,
}

impl LagrangeSpace {
    pub fn new(mesh: Arc<TriangleMesh2d>) -> Self {
        let cell_dofs = build_cell_dof_table(&mesh, |c| mesh.connectivity()[c].0);
        Self { mesh, cell_dofs }
    }
}

impl FunctionSpace for LagrangeSpace {
    fn kind(&self) -> SpaceKind {
        SpaceKind::Lagrange
    }

    fn mesh(&self) -> &TriangleMesh2d {
        &self.mesh
    }

    fn num_global_dofs(&self) -> usize {
        self.mesh.num_vertices()
    }

    fn cell_dof_count(&self) -> usize {
        3
    }

    fn cell_dofs(&self, cell_index: usize) -> &[usize] {
        &self.cell_dofs[3 * cell_index..3 * cell_index + 3]
    }

    fn face_dofs(&self, face_index: usize) -> &[usize] {
        &self.mesh.faces()[face_index].0
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
