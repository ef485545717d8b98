//! Evaluation of finite element functions given by coefficient vectors.
use crate::quadrature::{Quadrature, TriangleQuadrature};
use crate::space::FunctionSpace;
use crate::util::gather_global_to_local;
use itertools::izip;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, Vector2, Vector3};

/// A finite element function: a coefficient vector tied to a function space.
///
/// Functions with several components (such as a displacement field discretized with a scalar
/// space) store the coefficients component by component, i.e. as `[u_0 | u_1 | ...]`, where each
/// block has one entry per global DOF of the space.
#[derive(Debug, Clone)]
pub struct DiscreteFunction<'a, Space: ?Sized> {
    space: &'a Space,
    coefficients: DVectorView<'a, f64>,
    num_components: usize,
}

impl<'a, Space> DiscreteFunction<'a, Space>
where
    Space: ?Sized + FunctionSpace,
{
    /// Creates a single-component function.
    ///
    /// # Panics
    ///
    /// Panics if the number of coefficients does not match the number of DOFs of the space.
    pub fn new(space: &'a Space, coefficients: impl Into<DVectorView<'a, f64>>) -> Self {
        Self::with_components(space, coefficients, 1)
    }

    pub fn with_components(
        space: &'a Space,
        coefficients: impl Into<DVectorView<'a, f64>>,
        num_components: usize,
    ) -> Self {
        let coefficients = coefficients.into();
        assert_eq!(
            coefficients.len(),
            num_components * space.num_global_dofs(),
            "Coefficient vector does not match the number of DOFs of the space"
        );
        Self {
            space,
            coefficients,
            num_components,
        }
    }

    pub fn space(&self) -> &Space {
        self.space
    }

    pub fn coefficients(&self) -> DVectorView<f64> {
        self.coefficients.clone()
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    fn component_offset(&self, component: usize) -> usize {
        assert!(component < self.num_components, "Component out of bounds");
        component * self.space.num_global_dofs()
    }

    /// Evaluates the given component of a scalar-space function at a barycentric point of a cell.
    pub fn component_value(&self, cell_index: usize, bc: &Vector3<f64>, component: usize) -> f64 {
        let offset = self.component_offset(component);
        let n = self.space.cell_dof_count();
        let mut phi = DMatrix::zeros(self.space.value_dim(), n);
        self.space
            .populate_basis(cell_index, bc, DMatrixViewMut::from(&mut phi));
        izip!(self.space.cell_dofs(cell_index), phi.row(0).iter())
            .map(|(&dof, phi_j)| self.coefficients[offset + dof] * phi_j)
            .sum()
    }

    /// Evaluates a single-component scalar function at a barycentric point of a cell.
    pub fn value(&self, cell_index: usize, bc: &Vector3<f64>) -> f64 {
        self.component_value(cell_index, bc, 0)
    }

    /// Evaluates a function of a vector-valued space (such as Raviart-Thomas) at a barycentric
    /// point of a cell.
    pub fn vector_value(&self, cell_index: usize, bc: &Vector3<f64>) -> Vector2<f64> {
        assert_eq!(self.space.value_dim(), 2, "Space is not vector-valued");
        let n = self.space.cell_dof_count();
        let mut phi = DMatrix::zeros(2, n);
        self.space
            .populate_basis(cell_index, bc, DMatrixViewMut::from(&mut phi));
        let mut value = Vector2::zeros();
        for (j, &dof) in self.space.cell_dofs(cell_index).iter().enumerate() {
            value += phi.fixed_view::<2, 1>(0, j) * self.coefficients[dof];
        }
        value
    }

    /// Evaluates the gradient of the given component at a barycentric point of a cell.
    pub fn component_gradient(
        &self,
        cell_index: usize,
        bc: &Vector3<f64>,
        component: usize,
    ) -> eyre::Result<Vector2<f64>> {
        let offset = self.component_offset(component);
        let n = self.space.cell_dof_count();
        let mut grad_phi = DMatrix::zeros(2, n);
        self.space
            .populate_basis_gradients(cell_index, bc, DMatrixViewMut::from(&mut grad_phi))?;
        let mut local = DVector::zeros(n);
        let component_coefficients = self.coefficients.rows(offset, self.space.num_global_dofs());
        gather_global_to_local(component_coefficients, &mut local, self.space.cell_dofs(cell_index));
        let gradient = grad_phi * local;
        Ok(Vector2::new(gradient[0], gradient[1]))
    }

    /// Evaluates a scalar component at every quadrature point of every cell.
    ///
    /// The result has one row per quadrature point and one column per cell.
    pub fn component_values_at_quadrature_points(
        &self,
        quadrature: &TriangleQuadrature,
        component: usize,
    ) -> DMatrix<f64> {
        let num_cells = self.space.num_cells();
        DMatrix::from_fn(quadrature.len(), num_cells, |q, c| {
            self.component_value(c, &quadrature.points()[q], component)
        })
    }

    pub fn values_at_quadrature_points(&self, quadrature: &TriangleQuadrature) -> DMatrix<f64> {
        self.component_values_at_quadrature_points(quadrature, 0)
    }
}
