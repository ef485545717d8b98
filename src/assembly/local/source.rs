use crate::assembly::local::{basis_at, delegate_cell_connectivity, CellSpaces, ElementVectorAssembler};
use crate::coefficient::Coefficient;
use crate::quadrature::{Quadrature, TriangleQuadrature};
use crate::space::FunctionSpace;
use eyre::eyre;
use nalgebra::DVectorViewMut;

/// Assembles the load vector $\int_K f \, \phi_i \, dx$ of a scalar space.
pub struct ElementSourceAssembler<'a> {
    spaces: CellSpaces<'a>,
    quadrature: &'a TriangleQuadrature,
    source: &'a Coefficient,
}

impl<'a> ElementSourceAssembler<'a> {
    pub fn new(
        space: &'a dyn FunctionSpace,
        quadrature: &'a TriangleQuadrature,
        source: &'a Coefficient,
    ) -> eyre::Result<Self> {
        source.validate(quadrature.len(), space.num_cells())?;
        if source.is_tensor() || space.value_dim() != 1 {
            return Err(eyre!("source vectors require a scalar source and a scalar space"));
        }
        Ok(Self {
            spaces: CellSpaces::symmetric(space),
            quadrature,
            source,
        })
    }
}

delegate_cell_connectivity!(ElementSourceAssembler);

impl<'a> ElementVectorAssembler for ElementSourceAssembler<'a> {
    fn assemble_element_vector_into(&self, element_index: usize, mut output: DVectorViewMut<f64>) -> eyre::Result<()> {
        let space = self.spaces.test;
        assert_eq!(output.len(), space.cell_dof_count(), "Output vector dimension mismatch");
        let measure = space.mesh().cell_measure(element_index);

        for (q, (w, bc)) in self.quadrature.weights().iter().zip(self.quadrature.points()).enumerate() {
            let phi = basis_at(space, element_index, bc);
            let f = self.source.scalar_at(q, element_index)?;
            output.axpy(w * measure * f, &phi.row(0).transpose(), 1.0);
        }
        Ok(())
    }
}
