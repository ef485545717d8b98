use crate::assembly::local::{basis_at, delegate_cell_connectivity, CellSpaces, ElementMatrixAssembler};
use crate::coefficient::Coefficient;
use crate::quadrature::{Quadrature, TriangleQuadrature};
use crate::space::FunctionSpace;
use crate::util::clone_upper_to_lower;
use eyre::eyre;
use nalgebra::{DMatrixViewMut, Vector2};

/// Assembles the weighted mass matrix $\int_K c \, \phi_i \cdot \phi_j \, dx$ of a single space.
///
/// Vector-valued spaces (Raviart-Thomas) accept tensor coefficients, in which case the integrand
/// is $\phi_i \cdot (C \phi_j)$. The tensor is assumed to be symmetric.
pub struct ElementMassAssembler<'a> {
    spaces: CellSpaces<'a>,
    quadrature: &'a TriangleQuadrature,
    coefficient: &'a Coefficient,
}

impl<'a> ElementMassAssembler<'a> {
    pub fn new(
        space: &'a dyn FunctionSpace,
        quadrature: &'a TriangleQuadrature,
        coefficient: &'a Coefficient,
    ) -> eyre::Result<Self> {
        coefficient.validate(quadrature.len(), space.num_cells())?;
        if coefficient.is_tensor() && space.value_dim() != 2 {
            return Err(eyre!(
                "a tensor coefficient requires a vector-valued space, but the {:?} space has {} component(s)",
                space.kind(),
                space.value_dim()
            ));
        }
        Ok(Self {
            spaces: CellSpaces::symmetric(space),
            quadrature,
            coefficient,
        })
    }
}

delegate_cell_connectivity!(ElementMassAssembler);

impl<'a> ElementMatrixAssembler for ElementMassAssembler<'a> {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        let space = self.spaces.test;
        let n = space.cell_dof_count();
        assert_eq!(output.shape(), (n, n), "Output matrix dimension mismatch");
        let measure = space.mesh().cell_measure(element_index);

        for (q, (w, bc)) in self.quadrature.weights().iter().zip(self.quadrature.points()).enumerate() {
            let phi = basis_at(space, element_index, bc);
            let as_vector = |j: usize| {
                if phi.nrows() == 2 {
                    Vector2::new(phi[(0, j)], phi[(1, j)])
                } else {
                    Vector2::new(phi[(0, j)], 0.0)
                }
            };
            for j in 0..n {
                let phi_j = as_vector(j);
                for i in 0..=j {
                    let phi_i = as_vector(i);
                    output[(i, j)] += w * measure * self.coefficient.contract(q, element_index, &phi_i, &phi_j);
                }
            }
        }

        clone_upper_to_lower(&mut output);
        Ok(())
    }
}

/// Assembles $\int_K c \, \phi_i \psi_j \, dx$ for scalar test functions $\phi_i$ and scalar trial
/// functions $\psi_j$ from different spaces.
pub struct ElementMixedMassAssembler<'a> {
    spaces: CellSpaces<'a>,
    quadrature: &'a TriangleQuadrature,
    coefficient: &'a Coefficient,
}

impl<'a> ElementMixedMassAssembler<'a> {
    pub fn new(
        test_space: &'a dyn FunctionSpace,
        trial_space: &'a dyn FunctionSpace,
        quadrature: &'a TriangleQuadrature,
        coefficient: &'a Coefficient,
    ) -> eyre::Result<Self> {
        coefficient.validate(quadrature.len(), test_space.num_cells())?;
        if coefficient.is_tensor() {
            return Err(eyre!("mixed mass matrices of scalar spaces require a scalar coefficient"));
        }
        if test_space.value_dim() != 1 || trial_space.value_dim() != 1 {
            return Err(eyre!("mixed mass matrices are only supported for scalar spaces"));
        }
        Ok(Self {
            spaces: CellSpaces::new(test_space, trial_space),
            quadrature,
            coefficient,
        })
    }
}

delegate_cell_connectivity!(ElementMixedMassAssembler);

impl<'a> ElementMatrixAssembler for ElementMixedMassAssembler<'a> {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        let CellSpaces { test, trial } = self.spaces;
        assert_eq!(
            output.shape(),
            (test.cell_dof_count(), trial.cell_dof_count()),
            "Output matrix dimension mismatch"
        );
        let measure = test.mesh().cell_measure(element_index);

        for (q, (w, bc)) in self.quadrature.weights().iter().zip(self.quadrature.points()).enumerate() {
            let phi = basis_at(test, element_index, bc);
            let psi = basis_at(trial, element_index, bc);
            let c = self.coefficient.scalar_at(q, element_index)?;
            // Outer product of the test and trial basis values
            output.gemm_tr(w * measure * c, &phi, &psi, 1.0);
        }
        Ok(())
    }
}
