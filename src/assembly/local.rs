//! Element-level (local) assembly of bilinear and linear forms over cells.
use crate::space::FunctionSpace;
use nalgebra::{DMatrix, DMatrixViewMut, DVectorViewMut, Vector3};

/// Implements [`ElementConnectivityAssembler`] for an assembler with a `spaces: CellSpaces` field.
macro_rules! delegate_cell_connectivity {
    ($assembler:ident) => {
        impl<'a> $crate::assembly::local::ElementConnectivityAssembler for $assembler<'a> {
            fn num_elements(&self) -> usize {
                self.spaces.num_elements()
            }

            fn num_rows(&self) -> usize {
                self.spaces.num_rows()
            }

            fn num_cols(&self) -> usize {
                self.spaces.num_cols()
            }

            fn element_row_dofs(&self, element_index: usize) -> &[usize] {
                self.spaces.element_row_dofs(element_index)
            }

            fn element_col_dofs(&self, element_index: usize) -> &[usize] {
                self.spaces.element_col_dofs(element_index)
            }
        }
    };
}

pub(crate) use delegate_cell_connectivity;

mod coupling;
mod elliptic;
mod mass;
mod source;

pub use coupling::*;
pub use elliptic::*;
pub use mass::*;
pub use source::*;

/// Maps the local rows and columns of each element to global matrix indices.
pub trait ElementConnectivityAssembler {
    fn num_elements(&self) -> usize;

    fn num_rows(&self) -> usize;

    fn num_cols(&self) -> usize;

    /// Global row indices of the element, in the order of the local rows.
    fn element_row_dofs(&self, element_index: usize) -> &[usize];

    /// Global column indices of the element, in the order of the local columns.
    fn element_col_dofs(&self, element_index: usize) -> &[usize];
}

pub trait ElementMatrixAssembler: ElementConnectivityAssembler {
    /// Writes the local matrix of the element into the (zero-initialized) output.
    fn assemble_element_matrix_into(&self, element_index: usize, output: DMatrixViewMut<f64>) -> eyre::Result<()>;
}

pub trait ElementVectorAssembler: ElementConnectivityAssembler {
    /// Writes the local vector of the element into the (zero-initialized) output.
    fn assemble_element_vector_into(&self, element_index: usize, output: DVectorViewMut<f64>) -> eyre::Result<()>;
}

/// A test space and a trial space over the cells of the same mesh.
///
/// The rows of the assembled matrix correspond to the test space and the columns to the trial
/// space.
#[derive(Clone, Copy)]
pub struct CellSpaces<'a> {
    pub test: &'a dyn FunctionSpace,
    pub trial: &'a dyn FunctionSpace,
}

impl<'a> CellSpaces<'a> {
    pub fn new(test: &'a dyn FunctionSpace, trial: &'a dyn FunctionSpace) -> Self {
        assert_eq!(
            test.num_cells(),
            trial.num_cells(),
            "Test and trial spaces must be defined on the same mesh"
        );
        Self { test, trial }
    }

    /// Uses the same space for test and trial functions.
    pub fn symmetric(space: &'a dyn FunctionSpace) -> Self {
        Self {
            test: space,
            trial: space,
        }
    }
}

impl<'a> ElementConnectivityAssembler for CellSpaces<'a> {
    fn num_elements(&self) -> usize {
        self.test.num_cells()
    }

    fn num_rows(&self) -> usize {
        self.test.num_global_dofs()
    }

    fn num_cols(&self) -> usize {
        self.trial.num_global_dofs()
    }

    fn element_row_dofs(&self, element_index: usize) -> &[usize] {
        self.test.cell_dofs(element_index)
    }

    fn element_col_dofs(&self, element_index: usize) -> &[usize] {
        self.trial.cell_dofs(element_index)
    }
}

/// Evaluates the basis functions of a space at a quadrature point into a freshly sized buffer.
fn basis_at(space: &dyn FunctionSpace, cell_index: usize, bc: &Vector3<f64>) -> DMatrix<f64> {
    let mut phi = DMatrix::zeros(space.value_dim(), space.cell_dof_count());
    space.populate_basis(cell_index, bc, DMatrixViewMut::from(&mut phi));
    phi
}

/// Evaluates the basis gradients of a scalar space at a quadrature point.
fn basis_gradients_at(
    space: &dyn FunctionSpace,
    cell_index: usize,
    bc: &Vector3<f64>,
) -> eyre::Result<DMatrix<f64>> {
    let mut grad_phi = DMatrix::zeros(2, space.cell_dof_count());
    space.populate_basis_gradients(cell_index, bc, DMatrixViewMut::from(&mut grad_phi))?;
    Ok(grad_phi)
}
