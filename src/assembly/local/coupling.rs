use crate::assembly::local::{
    basis_at, basis_gradients_at, delegate_cell_connectivity, CellSpaces, ElementMatrixAssembler,
};
use crate::coefficient::Coefficient;
use crate::quadrature::{Quadrature, TriangleQuadrature};
use crate::space::FunctionSpace;
use eyre::eyre;
use nalgebra::DMatrixViewMut;

/// Assembles $\int_K c \, \phi_i \, \partial_a \psi_j \, dx$, coupling scalar test functions to the
/// derivative along axis $a$ of scalar trial functions.
///
/// With a piecewise constant test space this is the discrete volumetric strain rate of a
/// displacement component, as used in the pressure and saturation equations.
pub struct ElementGradientCouplingAssembler<'a> {
    spaces: CellSpaces<'a>,
    quadrature: &'a TriangleQuadrature,
    coefficient: &'a Coefficient,
    axis: usize,
}

impl<'a> ElementGradientCouplingAssembler<'a> {
    pub fn new(
        test_space: &'a dyn FunctionSpace,
        trial_space: &'a dyn FunctionSpace,
        quadrature: &'a TriangleQuadrature,
        coefficient: &'a Coefficient,
        axis: usize,
    ) -> eyre::Result<Self> {
        assert!(axis < 2, "Axis out of bounds");
        coefficient.validate(quadrature.len(), test_space.num_cells())?;
        if coefficient.is_tensor() {
            return Err(eyre!("gradient coupling requires a scalar coefficient"));
        }
        Ok(Self {
            spaces: CellSpaces::new(test_space, trial_space),
            quadrature,
            coefficient,
            axis,
        })
    }
}

delegate_cell_connectivity!(ElementGradientCouplingAssembler);

impl<'a> ElementMatrixAssembler for ElementGradientCouplingAssembler<'a> {
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
            let grad_psi = basis_gradients_at(trial, element_index, bc)?;
            let c = self.coefficient.scalar_at(q, element_index)?;
            output.gemm_tr(w * measure * c, &phi, &grad_psi.rows(self.axis, 1), 1.0);
        }
        Ok(())
    }
}

/// Assembles the transport term $\int_K c \, \nabla \phi_i \cdot \psi_j \, dx$ between a scalar test
/// space and a vector-valued trial space.
pub struct ElementTransportAssembler<'a> {
    spaces: CellSpaces<'a>,
    quadrature: &'a TriangleQuadrature,
    coefficient: &'a Coefficient,
}

impl<'a> ElementTransportAssembler<'a> {
    pub fn new(
        test_space: &'a dyn FunctionSpace,
        trial_space: &'a dyn FunctionSpace,
        quadrature: &'a TriangleQuadrature,
        coefficient: &'a Coefficient,
    ) -> eyre::Result<Self> {
        coefficient.validate(quadrature.len(), test_space.num_cells())?;
        if trial_space.value_dim() != 2 {
            return Err(eyre!(
                "transport terms require a vector-valued trial space, got {:?}",
                trial_space.kind()
            ));
        }
        Ok(Self {
            spaces: CellSpaces::new(test_space, trial_space),
            quadrature,
            coefficient,
        })
    }
}

delegate_cell_connectivity!(ElementTransportAssembler);

impl<'a> ElementMatrixAssembler for ElementTransportAssembler<'a> {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        let CellSpaces { test, trial } = self.spaces;
        assert_eq!(
            output.shape(),
            (test.cell_dof_count(), trial.cell_dof_count()),
            "Output matrix dimension mismatch"
        );
        let measure = test.mesh().cell_measure(element_index);

        for (q, (w, bc)) in self.quadrature.weights().iter().zip(self.quadrature.points()).enumerate() {
            let grad_phi = basis_gradients_at(test, element_index, bc)?;
            let psi = basis_at(trial, element_index, bc);
            for i in 0..test.cell_dof_count() {
                let grad_phi_i = grad_phi.fixed_view::<2, 1>(0, i).into_owned();
                for j in 0..trial.cell_dof_count() {
                    let psi_j = psi.fixed_view::<2, 1>(0, j).into_owned();
                    output[(i, j)] += w * measure * self.coefficient.contract(q, element_index, &grad_phi_i, &psi_j);
                }
            }
        }
        Ok(())
    }
}
