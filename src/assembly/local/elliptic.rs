use crate::assembly::local::{basis_gradients_at, delegate_cell_connectivity, CellSpaces, ElementMatrixAssembler};
use crate::coefficient::Coefficient;
use crate::model::LameParameters;
use crate::quadrature::{Quadrature, TriangleQuadrature};
use crate::space::FunctionSpace;
use crate::util::clone_upper_to_lower;
use nalgebra::{DMatrixViewMut, Vector2};

/// Assembles the stiffness matrix $\int_K \nabla \phi_i \cdot (C \nabla \phi_j) \, dx$ of a scalar
/// space, with $C$ a scalar or a symmetric tensor.
pub struct ElementStiffnessAssembler<'a> {
    spaces: CellSpaces<'a>,
    quadrature: &'a TriangleQuadrature,
    coefficient: &'a Coefficient,
}

impl<'a> ElementStiffnessAssembler<'a> {
    pub fn new(
        space: &'a dyn FunctionSpace,
        quadrature: &'a TriangleQuadrature,
        coefficient: &'a Coefficient,
    ) -> eyre::Result<Self> {
        coefficient.validate(quadrature.len(), space.num_cells())?;
        Ok(Self {
            spaces: CellSpaces::symmetric(space),
            quadrature,
            coefficient,
        })
    }
}

delegate_cell_connectivity!(ElementStiffnessAssembler);

impl<'a> ElementMatrixAssembler for ElementStiffnessAssembler<'a> {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        let space = self.spaces.test;
        let n = space.cell_dof_count();
        assert_eq!(output.shape(), (n, n), "Output matrix dimension mismatch");
        let measure = space.mesh().cell_measure(element_index);

        for (q, (w, bc)) in self.quadrature.weights().iter().zip(self.quadrature.points()).enumerate() {
            let grad_phi = basis_gradients_at(space, element_index, bc)?;
            for j in 0..n {
                let grad_phi_j: Vector2<f64> = grad_phi.fixed_view::<2, 1>(0, j).into_owned();
                for i in 0..=j {
                    let grad_phi_i: Vector2<f64> = grad_phi.fixed_view::<2, 1>(0, i).into_owned();
                    output[(i, j)] +=
                        w * measure * self.coefficient.contract(q, element_index, &grad_phi_i, &grad_phi_j);
                }
            }
        }

        clone_upper_to_lower(&mut output);
        Ok(())
    }
}

/// Assembles the block $(a, b)$ of the linear elasticity stiffness matrix of a scalar space used
/// for each displacement component,
///
/// $$
/// \int_K \mu \left( \delta_{ab} \nabla \phi_i \cdot \nabla \phi_j + \partial_b \phi_i \, \partial_a \phi_j \right)
///   + \lambda \, \partial_a \phi_i \, \partial_b \phi_j \, dx.
/// $$
///
/// Rows correspond to component $a$ of the test function and columns to component $b$ of the
/// trial function.
pub struct ElementElasticityAssembler<'a> {
    spaces: CellSpaces<'a>,
    quadrature: &'a TriangleQuadrature,
    lame: LameParameters,
    components: (usize, usize),
}

impl<'a> ElementElasticityAssembler<'a> {
    pub fn new(
        space: &'a dyn FunctionSpace,
        quadrature: &'a TriangleQuadrature,
        lame: LameParameters,
        components: (usize, usize),
    ) -> Self {
        assert!(components.0 < 2 && components.1 < 2, "Displacement component out of bounds");
        Self {
            spaces: CellSpaces::symmetric(space),
            quadrature,
            lame,
            components,
        }
    }
}

delegate_cell_connectivity!(ElementElasticityAssembler);

impl<'a> ElementMatrixAssembler for ElementElasticityAssembler<'a> {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        let space = self.spaces.test;
        let n = space.cell_dof_count();
        assert_eq!(output.shape(), (n, n), "Output matrix dimension mismatch");
        let measure = space.mesh().cell_measure(element_index);
        let LameParameters { lambda, mu } = self.lame;
        let (a, b) = self.components;
        let delta_ab = if a == b { 1.0 } else { 0.0 };

        for (w, bc) in self.quadrature.weights().iter().zip(self.quadrature.points()) {
            let grad = basis_gradients_at(space, element_index, bc)?;
            for i in 0..n {
                for j in 0..n {
                    let gi = grad.column(i);
                    let gj = grad.column(j);
                    let value = mu * (delta_ab * gi.dot(&gj) + gi[b] * gj[a]) + lambda * gi[a] * gj[b];
                    output[(i, j)] += w * measure * value;
                }
            }
        }
        Ok(())
    }
}
