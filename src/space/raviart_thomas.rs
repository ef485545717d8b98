use crate::mesh::TriangleMesh2d;
use crate::space::{build_cell_dof_table, FunctionSpace, SpaceKind};
use nalgebra::{DMatrixViewMut, Vector3};
use std::sync::Arc;

/// Lowest-order Raviart-Thomas vector fields on triangles.
///
/// There is one DOF per face, representing the normal component of the field across the face,
/// measured along the face's unit normal (which points out of the face's left cell).
///
/// On a cell $K$ with local face $i$ opposite to vertex $x_i$, the local basis function is
///
/// $$
/// \phi_i(x) = s_i \frac{|e_i|}{2 |K|} (x - x_i),
/// $$
///
/// where $s_i = 1$ if $K$ is the left cell of the face and $s_i = -1$ otherwise. Its divergence is
/// the constant $s_i |e_i| / |K|$.
#[derive(Debug, Clone)]
pub struct RaviartThomasSpace {
    mesh: Arc<TriangleMesh2d>,
    cell_dofs: Vec<usize>,
    face_dofs: Vec<usize>,
    cell_signs: Vec<[f64; 3]>,
}

impl RaviartThomasSpace {
    pub fn new(mesh: Arc<TriangleMesh2d>) -> Self {
        let cell_dofs = build_cell_dof_table(&mesh, |c| mesh.cell_to_face()[c]);
        let face_dofs = (0..mesh.num_faces()).collect();
        let cell_signs = (0..mesh.num_cells())
            .map(|c| {
                let mut signs = [1.0; 3];
                for (local, &face) in mesh.cell_to_face()[c].iter().enumerate() {
                    let [left, _, left_local, _] = mesh.face_to_cell()[face];
                    if left != c || left_local != local {
                        signs[local] = -1.0;
                    }
                }
                signs
            })
            .collect();
        Self {
            mesh,
            cell_dofs,
            face_dofs,
            cell_signs,
        }
    }

    /// The orientation signs $s_i$ of the local basis functions of the cell.
    pub fn cell_signs(&self, cell_index: usize) -> &[f64; 3] {
        &self.cell_signs[cell_index]
    }

    fn basis_scale(&self, cell_index: usize, local_index: usize) -> f64 {
        let face = self.mesh.cell_to_face()[cell_index][local_index];
        self.cell_signs[cell_index][local_index] * self.mesh.face_measure(face)
            / (2.0 * self.mesh.cell_measure(cell_index))
    }
}

impl FunctionSpace for RaviartThomasSpace {
    fn kind(&self) -> SpaceKind {
        SpaceKind::RaviartThomas
    }

    fn mesh(&self) -> &TriangleMesh2d {
        &self.mesh
    }

    fn num_global_dofs(&self) -> usize {
        self.mesh.num_faces()
    }

    fn value_dim(&self) -> usize {
        2
    }

    fn cell_dof_count(&self) -> usize {
        3
    }

    fn cell_dofs(&self, cell_index: usize) -> &[usize] {
        &self.cell_dofs[3 * cell_index..3 * cell_index + 3]
    }

    fn face_dofs(&self, face_index: usize) -> &[usize] {
        &self.face_dofs[face_index..=face_index]
    }

    fn populate_basis(&self, cell_index: usize, bc: &Vector3<f64>, mut output: DMatrixViewMut<f64>) {
        assert_eq!(output.shape(), (2, 3), "Output buffer dimension mismatch");
        let x = self.mesh.bc_to_point(cell_index, bc);
        let cell = &self.mesh.connectivity()[cell_index];
        for i in 0..3 {
            let x_i = &self.mesh.vertices()[cell[i]];
            let phi_i = (x - x_i) * self.basis_scale(cell_index, i);
            output.set_column(i, &phi_i);
        }
    }

    fn populate_basis_divergence(
        &self,
        cell_index: usize,
        _bc: &Vector3<f64>,
        output: &mut [f64],
    ) -> eyre::Result<()> {
        assert_eq!(output.len(), 3, "Output buffer dimension mismatch");
        for (i, div) in output.iter_mut().enumerate() {
            // div (x - x_i) = 2 in two dimensions
            *div = 2.0 * self.basis_scale(cell_index, i);
        }
        Ok(())
    }
}
