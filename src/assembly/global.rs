use crate::assembly::local::{ElementConnectivityAssembler, ElementMatrixAssembler, ElementVectorAssembler};
use crate::util::scatter_local_to_global_add;
use eyre::{eyre, WrapErr};
use nalgebra::base::storage::RawStorage;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut, Dyn, Matrix, U1};
use nalgebra_sparse::csr::CsrRowMut;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::cell::RefCell;
use std::collections::BTreeSet;

/// An assembler for (possibly rectangular) CSR matrices.
///
/// Local element matrices are added into the global matrix, so that contributions of several
/// elements to the same `(row, col)` entry accumulate.
#[derive(Debug, Clone, Default)]
pub struct CsrAssembler {
    // Buffers reused between elements and between assembled matrices
    workspace: RefCell<CsrAssemblerWorkspace>,
}

#[derive(Debug, Clone)]
struct CsrAssemblerWorkspace {
    col_permutation: Vec<usize>,
    element_matrix: DMatrix<f64>,
}

impl Default for CsrAssemblerWorkspace {
    fn default() -> Self {
        Self {
            col_permutation: Vec::new(),
            element_matrix: DMatrix::zeros(0, 0),
        }
    }
}

impl CsrAssembler {
    pub fn assemble_pattern(&self, element_assembler: &dyn ElementConnectivityAssembler) -> SparsityPattern {
        // Collecting into a BTreeSet stores each entry exactly once and gives the row-major
        // ordering required by the CSR format
        let mut matrix_entries = BTreeSet::new();
        for e in 0..element_assembler.num_elements() {
            for &i in element_assembler.element_row_dofs(e) {
                for &j in element_assembler.element_col_dofs(e) {
                    matrix_entries.insert((i, j));
                }
            }
        }

        let num_rows = element_assembler.num_rows();
        let num_cols = element_assembler.num_cols();
        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(matrix_entries.len());

        offsets.push(0);
        for (i, j) in matrix_entries {
            assert!(
                i < num_rows && j < num_cols,
                "Element DOF ({}, {}) is out of bounds for a {}x{} matrix",
                i,
                j,
                num_rows,
                num_cols
            );
            // A while loop is needed to handle consecutive empty rows
            while i + 1 > offsets.len() {
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }

        // Fill out offsets for the remaining empty rows
        while offsets.len() < (num_rows + 1) {
            offsets.push(column_indices.len());
        }

        SparsityPattern::try_from_offsets_and_indices(num_rows, num_cols, offsets, column_indices)
            .expect("Offsets and indices built from a sorted set are always valid")
    }

    pub fn assemble(&self, element_assembler: &dyn ElementMatrixAssembler) -> eyre::Result<CsrMatrix<f64>> {
        let pattern = self.assemble_pattern(element_assembler);
        let initial_values = vec![0.0; pattern.nnz()];
        let mut matrix = CsrMatrix::try_from_pattern_and_values(pattern, initial_values)
            .map_err(|err| eyre!("failed to create CSR matrix from pattern: {}", err))?;
        self.assemble_into_csr(&mut matrix, element_assembler)?;
        Ok(matrix)
    }

    /// Adds the element contributions into an existing matrix.
    ///
    /// # Panics
    ///
    /// Panics if the sparsity pattern of the matrix does not contain every entry that an element
    /// contributes to.
    pub fn assemble_into_csr(
        &self,
        csr: &mut CsrMatrix<f64>,
        element_assembler: &dyn ElementMatrixAssembler,
    ) -> eyre::Result<()> {
        assert_eq!(
            (csr.nrows(), csr.ncols()),
            (element_assembler.num_rows(), element_assembler.num_cols()),
            "Matrix dimensions do not match the element assembler"
        );

        let ws = &mut *self.workspace.borrow_mut();
        let col_permutation = &mut ws.col_permutation;
        let element_matrix = &mut ws.element_matrix;

        for e in 0..element_assembler.num_elements() {
            let row_dofs = element_assembler.element_row_dofs(e);
            let col_dofs = element_assembler.element_col_dofs(e);

            element_matrix.resize_mut(row_dofs.len(), col_dofs.len(), 0.0);
            element_matrix.fill(0.0);
            element_assembler
                .assemble_element_matrix_into(e, DMatrixViewMut::from(&mut *element_matrix))
                .wrap_err_with(|| format!("failed to assemble element matrix of element {}", e))?;

            col_permutation.clear();
            col_permutation.extend(0..col_dofs.len());
            col_permutation.sort_unstable_by_key(|&j| col_dofs[j]);

            for (local_row, &global_row) in row_dofs.iter().enumerate() {
                let mut csr_row = csr.row_mut(global_row);
                add_element_row_to_csr_row(&mut csr_row, col_dofs, col_permutation, &element_matrix.row(local_row));
            }
        }

        Ok(())
    }
}

/// Assembles a global vector from element vectors, accumulating shared entries.
pub fn assemble_vector(element_assembler: &dyn ElementVectorAssembler) -> eyre::Result<DVector<f64>> {
    let mut output = DVector::zeros(element_assembler.num_rows());
    assemble_vector_into(DVectorViewMut::from(&mut output), element_assembler)?;
    Ok(output)
}

pub fn assemble_vector_into(
    mut output: DVectorViewMut<f64>,
    element_assembler: &dyn ElementVectorAssembler,
) -> eyre::Result<()> {
    assert_eq!(
        output.len(),
        element_assembler.num_rows(),
        "Output vector dimension does not match the element assembler"
    );
    let mut element_vector = DVector::zeros(0);
    for e in 0..element_assembler.num_elements() {
        let row_dofs = element_assembler.element_row_dofs(e);
        element_vector.resize_vertically_mut(row_dofs.len(), 0.0);
        element_vector.fill(0.0);
        element_assembler
            .assemble_element_vector_into(e, DVectorViewMut::from(&mut element_vector))
            .wrap_err_with(|| format!("failed to assemble element vector of element {}", e))?;
        scatter_local_to_global_add(&element_vector, &mut output, row_dofs);
    }
    Ok(())
}

/// Builds a square diagonal CSR matrix with the given diagonal entries.
pub fn diagonal_csr(diagonal: &[f64]) -> CsrMatrix<f64> {
    let n = diagonal.len();
    let offsets = (0..=n).collect();
    let column_indices = (0..n).collect();
    CsrMatrix::try_from_csr_data(n, n, offsets, column_indices, diagonal.to_vec())
        .expect("A diagonal pattern is always a valid CSR pattern")
}

/// Add a row of a local element matrix to the provided row of a CSR matrix.
///
/// `col_dofs`: The global column indices of the element.
/// `sorted_permutation`: The local column indices, ordered such that the corresponding global
///    indices are sorted.
/// `local_row`: The local row of the element matrix that should be added to the CSR matrix.
fn add_element_row_to_csr_row<S>(
    row: &mut CsrRowMut<f64>,
    col_dofs: &[usize],
    sorted_permutation: &[usize],
    local_row: &Matrix<f64, U1, Dyn, S>,
) where
    S: RawStorage<f64, U1, Dyn>,
{
    assert_eq!(col_dofs.len(), sorted_permutation.len());
    assert_eq!(col_dofs.len(), local_row.ncols());

    let (column_indices, values) = row.cols_and_values_mut();
    let mut csr_col_idx_iter = column_indices.iter().copied().enumerate();

    for &local_col in sorted_permutation {
        let global_col = col_dofs[local_col];
        let (local_csr_idx, _) = csr_col_idx_iter
            .find(|&(_, csr_col)| csr_col == global_col)
            .expect("Could not find column index associated with element DOF in CSR row");
        values[local_csr_idx] += local_row[local_col];
    }
}
