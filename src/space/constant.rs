use crate::mesh::TriangleMesh2d;
use crate::space::{FunctionSpace, SpaceKind};
use nalgebra::{DMatrixViewMut, Vector3};
use std::sync::Arc;

/// Piecewise constant functions on a triangle mesh.
///
/// DOF `c` is the value on cell `c`. The mass matrix of this space is diagonal, which the
/// pressure assembly exploits.
#[derive(Debug, Clone)]
pub struct PiecewiseConstantSpace {
    mesh: Arc<TriangleMesh2d>,
    cell_dofs: Vec<usize>,
}

impl PiecewiseConstantSpace {
    pub fn new(mesh: Arc<TriangleMesh2d>) -> Self {
        let cell_dofs = (0..mesh.num_cells()).collect();
        Self { mesh, cell_dofs }
    }
}

impl FunctionSpace for PiecewiseConstantSpace {
    fn kind(&self) -> SpaceKind {
        SpaceKind::PiecewiseConstant
    }

    fn mesh(&self) -> &TriangleMesh2d {
        &self.mesh
    }

    fn num_global_dofs(&self) -> usize {
        self.mesh.num_cells()
    }

    fn cell_dof_count(&self) -> usize {
        1
    }

    fn cell_dofs(&self, cell_index: usize) -> &[usize] {
        &self.cell_dofs[cell_index..=cell_index]
    }

    fn face_dofs(&self, _face_index: usize) -> &[usize] {
        &[]
    }

    fn populate_basis(&self, _cell_index: usize, _bc: &Vector3<f64>, mut output: DMatrixViewMut<f64>) {
        assert_eq!(output.shape(), (1, 1), "Output buffer dimension mismatch");
        output[(0, 0)] = 1.0;
    }

    fn populate_basis_gradients(
        &self,
        _cell_index: usize,
        _bc: &Vector3<f64>,
        mut output: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        assert_eq!(output.shape(), (2, 1), "Output buffer dimension mismatch");
        output.fill(0.0);
        Ok(())
    }
}
