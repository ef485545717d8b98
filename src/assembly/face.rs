//! Assembly of integrals over the faces of the mesh.
//!
//! Every face contributes separately to its left and its right cell. Boundary faces are
//! self-paired in the mesh topology, so their right contribution must be discarded to avoid
//! counting the left cell twice.
use crate::coefficient::Coefficient;
use crate::mesh::TriangleMesh2d;
use crate::quadrature::{Quadrature, SegmentQuadrature};
use crate::space::{DiscontinuousLinearSpace, FunctionSpace, PiecewiseConstantSpace, RaviartThomasSpace};
use eyre::eyre;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, Vector2};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// The contributions `[left, right]` of a face to $\int_K \mathrm{div}\, \phi_e \, dx$ for its left
/// and right cell.
///
/// The right contribution of a boundary face is exactly zero.
pub fn face_divergence_contributions(mesh: &TriangleMesh2d, face_index: usize) -> [f64; 2] {
    let measure = mesh.face_measure(face_index);
    if mesh.is_boundary_face(face_index) {
        [measure, 0.0]
    } else {
        [measure, -measure]
    }
}

/// Assembles the divergence coupling $B_{eK} = \int_K \mathrm{div}\, \phi_e \, dx$ between the
/// Raviart-Thomas velocity space (rows) and the piecewise constant pressure space (columns).
pub fn assemble_divergence_coupling(
    velocity_space: &RaviartThomasSpace,
    pressure_space: &PiecewiseConstantSpace,
) -> eyre::Result<CsrMatrix<f64>> {
    let mesh = velocity_space.mesh();
    if mesh.num_cells() != pressure_space.num_cells() {
        return Err(eyre!(
            "velocity space has {} cells, but pressure space has {}",
            mesh.num_cells(),
            pressure_space.num_cells()
        ));
    }

    let mut coo = CooMatrix::new(velocity_space.num_global_dofs(), pressure_space.num_global_dofs());
    for face in 0..mesh.num_faces() {
        let [left, right, _, _] = mesh.face_to_cell()[face];
        let [left_value, right_value] = face_divergence_contributions(mesh, face);
        for &row in velocity_space.face_dofs(face) {
            // Duplicate entries (as for boundary faces) are summed when converting to CSR
            coo.push(row, pressure_space.cell_dofs(left)[0], left_value);
            coo.push(row, pressure_space.cell_dofs(right)[0], right_value);
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Assembles the interface vector of the discontinuous linear space,
/// $-\int_f c \, \phi_L (\nabla \phi_L \cdot n)$ for the left cell and
/// $\int_f c \, \phi_R (\nabla \phi_R \cdot n)$ for the right cell, where $n$ is the unit
/// normal pointing out of the left cell. Boundary faces only have the left contribution.
///
/// The coefficient is sampled on faces: per-entity values are per face, and per-quadrature-point
/// values have one column per face. Tensor coefficients act on the gradient.
pub fn assemble_interface_vector(
    space: &DiscontinuousLinearSpace,
    quadrature: &SegmentQuadrature,
    coefficient: &Coefficient,
) -> eyre::Result<DVector<f64>> {
    let mesh = space.mesh();
    coefficient.validate(quadrature.len(), mesh.num_faces())?;

    let mut output = DVector::zeros(space.num_global_dofs());
    let mut phi = DMatrix::zeros(1, 3);
    let mut grad_phi = DMatrix::zeros(2, 3);

    for face in 0..mesh.num_faces() {
        let [left, right, _, _] = mesh.face_to_cell()[face];
        let normal = mesh.face_unit_normal(face);
        let measure = mesh.face_measure(face);
        // Boundary faces are self-paired and only contribute to their left cell
        let sides = [(left, -1.0), (right, 1.0)];
        let num_sides = if left == right { 1 } else { 2 };

        for (q, (w, face_bc)) in quadrature.weights().iter().zip(quadrature.points()).enumerate() {
            for &(cell, sign) in &sides[..num_sides] {
                let bc = mesh.face_bc_to_cell_bc(face, cell, face_bc);
                space.populate_basis(cell, &bc, DMatrixViewMut::from(&mut phi));
                space.populate_basis_gradients(cell, &bc, DMatrixViewMut::from(&mut grad_phi))?;
                for (i, &dof) in space.cell_dofs(cell).iter().enumerate() {
                    let grad_phi_i: Vector2<f64> = grad_phi.fixed_view::<2, 1>(0, i).into_owned();
                    let flux = coefficient.contract(q, face, &normal, &grad_phi_i);
                    output[dof] += sign * w * measure * phi[(0, i)] * flux;
                }
            }
        }
    }

    Ok(output)
}
