use eyre::eyre;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};
use poroflow::assembly::global::{assemble_vector, diagonal_csr, CsrAssembler};
use poroflow::assembly::local::{ElementConnectivityAssembler, ElementMatrixAssembler, ElementVectorAssembler};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::sample::subsequence;

/// Element assembler with prescribed connectivity, whose local entries encode element, row and
/// column.
#[derive(Debug, Clone)]
struct MockElementAssembler {
    num_rows: usize,
    num_cols: usize,
    row_dofs: Vec<Vec<usize>>,
    col_dofs: Vec<Vec<usize>>,
}

impl MockElementAssembler {
    fn symmetric(num_dofs: usize, elements: Vec<Vec<usize>>) -> Self {
        Self {
            num_rows: num_dofs,
            num_cols: num_dofs,
            row_dofs: elements.clone(),
            col_dofs: elements,
        }
    }

    fn local_entry(e: usize, i: usize, j: usize) -> f64 {
        (e + 1) as f64 * (10 * i + j + 1) as f64
    }

    /// The expected global matrix, assembled densely.
    fn dense_reference(&self) -> DMatrix<f64> {
        let mut matrix = DMatrix::zeros(self.num_rows, self.num_cols);
        for e in 0..self.row_dofs.len() {
            for (i, &row) in self.row_dofs[e].iter().enumerate() {
                for (j, &col) in self.col_dofs[e].iter().enumerate() {
                    matrix[(row, col)] += Self::local_entry(e, i, j);
                }
            }
        }
        matrix
    }
}

impl ElementConnectivityAssembler for MockElementAssembler {
    fn num_elements(&self) -> usize {
        self.row_dofs.len()
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_cols(&self) -> usize {
        self.num_cols
    }

    fn element_row_dofs(&self, element_index: usize) -> &[usize] {
        &self.row_dofs[element_index]
    }

    fn element_col_dofs(&self, element_index: usize) -> &[usize] {
        &self.col_dofs[element_index]
    }
}

impl ElementMatrixAssembler for MockElementAssembler {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        for i in 0..output.nrows() {
            for j in 0..output.ncols() {
                output[(i, j)] = Self::local_entry(element_index, i, j);
            }
        }
        Ok(())
    }
}

impl ElementVectorAssembler for MockElementAssembler {
    fn assemble_element_vector_into(&self, element_index: usize, mut output: DVectorViewMut<f64>) -> eyre::Result<()> {
        for i in 0..output.len() {
            output[i] = Self::local_entry(element_index, i, 0);
        }
        Ok(())
    }
}

struct FailingElementAssembler {
    dofs: [usize; 2],
}

impl ElementConnectivityAssembler for FailingElementAssembler {
    fn num_elements(&self) -> usize {
        2
    }

    fn num_rows(&self) -> usize {
        2
    }

    fn num_cols(&self) -> usize {
        2
    }

    fn element_row_dofs(&self, element_index: usize) -> &[usize] {
        &self.dofs[element_index..=element_index]
    }

    fn element_col_dofs(&self, element_index: usize) -> &[usize] {
        self.element_row_dofs(element_index)
    }
}

impl ElementMatrixAssembler for FailingElementAssembler {
    fn assemble_element_matrix_into(&self, element_index: usize, _output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        if element_index == 1 {
            Err(eyre!("mock failure"))
        } else {
            Ok(())
        }
    }
}

#[test]
fn csr_assemble_pattern_of_rectangular_matrix_with_empty_rows() {
    let element_assembler = MockElementAssembler {
        num_rows: 5,
        num_cols: 3,
        row_dofs: vec![vec![3, 1], vec![1]],
        col_dofs: vec![vec![2, 0], vec![1]],
    };
    let pattern = CsrAssembler::default().assemble_pattern(&element_assembler);

    assert_eq!(pattern.major_dim(), 5);
    assert_eq!(pattern.minor_dim(), 3);
    assert_eq!(pattern.major_offsets(), &[0, 0, 3, 3, 5, 5]);
    assert_eq!(pattern.minor_indices(), &[0, 1, 2, 0, 2]);
}

#[test]
fn csr_assemble_accumulates_shared_and_duplicated_elements() {
    // The second and third element coincide, so their contributions add up
    let element_assembler = MockElementAssembler::symmetric(4, vec![vec![0, 2, 1], vec![3, 2], vec![3, 2]]);
    let matrix = CsrAssembler::default().assemble(&element_assembler).unwrap();

    let expected = element_assembler.dense_reference();
    assert_matrix_eq!(DMatrix::from(&matrix), expected, comp = abs, tol = 1e-12);
    // Entry (3, 3) is local (0, 0) of elements 1 and 2
    assert_eq!(matrix.get_entry(3, 3).unwrap().into_value(), 2.0 + 3.0);
}

#[test]
fn csr_assemble_reports_failing_element() {
    let result = CsrAssembler::default().assemble(&FailingElementAssembler { dofs: [0, 1] });
    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("element 1"));
    assert!(format!("{:#}", err).contains("mock failure"));
}

#[test]
fn assemble_vector_accumulates_shared_entries() {
    let element_assembler = MockElementAssembler::symmetric(3, vec![vec![2, 0], vec![0, 1]]);
    let vector = assemble_vector(&element_assembler).unwrap();
    // Element 0 adds (1, 11) and element 1 adds (2, 22)
    assert_eq!(vector, DVector::from_vec(vec![11.0 + 2.0, 22.0, 1.0]));
}

#[test]
fn diagonal_csr_has_given_diagonal() {
    let matrix = diagonal_csr(&[1.0, -2.0, 0.5]);
    assert_eq!(matrix.nnz(), 3);
    assert_eq!(DMatrix::from(&matrix), DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, -2.0, 0.5])));
}

fn element_assembler_strategy() -> impl Strategy<Value = MockElementAssembler> {
    (1usize..8, 1usize..8).prop_flat_map(|(num_rows, num_cols)| {
        let rows = (0..num_rows).collect::<Vec<_>>();
        let cols = (0..num_cols).collect::<Vec<_>>();
        let element = (
            subsequence(rows, 0..=num_rows.min(3)).prop_shuffle(),
            subsequence(cols, 0..=num_cols.min(3)).prop_shuffle(),
        );
        vec(element, 0..6).prop_map(move |elements| {
            let (row_dofs, col_dofs): (Vec<_>, Vec<_>) = elements.into_iter().unzip();
            MockElementAssembler {
                num_rows,
                num_cols,
                row_dofs,
                col_dofs,
            }
        })
    })
}

proptest! {
    #[test]
    fn csr_assemble_matches_dense_assembly(element_assembler in element_assembler_strategy()) {
        let assembler = CsrAssembler::default();
        let matrix = assembler.assemble(&element_assembler).unwrap();
        prop_assert_eq!((matrix.nrows(), matrix.ncols()), (element_assembler.num_rows, element_assembler.num_cols));
        assert_matrix_eq!(DMatrix::from(&matrix), element_assembler.dense_reference(), comp = abs, tol = 1e-12);

        // Reusing the assembler gives the same result
        let again = assembler.assemble(&element_assembler).unwrap();
        prop_assert_eq!(matrix, again);
    }
}
