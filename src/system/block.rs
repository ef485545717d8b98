use crate::system::{DisplacementBlocks, PressureBlocks, SaturationBlocks, SystemLayout, VelocityBlocks};
use eyre::eyre;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::fmt::{Display, Formatter};

pub const NUM_BLOCKS: usize = 5;

/// The unknown fields of the coupled system, in block order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Velocity,
    Pressure,
    Saturation,
    Displacement0,
    Displacement1,
}

impl Field {
    pub const ALL: [Field; NUM_BLOCKS] = [
        Field::Velocity,
        Field::Pressure,
        Field::Saturation,
        Field::Displacement0,
        Field::Displacement1,
    ];

    pub fn index(&self) -> usize {
        match self {
            Field::Velocity => 0,
            Field::Pressure => 1,
            Field::Saturation => 2,
            Field::Displacement0 => 3,
            Field::Displacement1 => 4,
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Field::Velocity => "v",
            Field::Pressure => "p",
            Field::Saturation => "s",
            Field::Displacement0 => "u0",
            Field::Displacement1 => "u1",
        };
        write!(f, "{}", name)
    }
}

/// Which blocks of the coupled matrix exist, indexed by (equation, unknown).
///
/// The velocity equation does not see the saturation or the displacement, and neither the
/// pressure nor the displacement equation contains the saturation.
#[rustfmt::skip]
const BLOCK_STRUCTURE: [[bool; NUM_BLOCKS]; NUM_BLOCKS] = [
    [true,  true, false, false, false],
    [true,  true, false, true,  true ],
    [true,  true, true,  true,  true ],
    [false, true, false, true,  true ],
    [false, true, false, true,  true ],
];

/// Returns whether the block in the row of `equation` and column of `unknown` is part of the
/// coupled system.
pub fn is_structurally_present(equation: Field, unknown: Field) -> bool {
    BLOCK_STRUCTURE[equation.index()][unknown.index()]
}

/// A 5x5 block matrix of sparse blocks.
///
/// Structurally absent blocks are `None` and can never be set.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMatrix {
    layout: SystemLayout,
    blocks: Vec<Option<CsrMatrix<f64>>>,
}

impl BlockMatrix {
    pub fn new(layout: SystemLayout) -> Self {
        Self {
            layout,
            blocks: vec![None; NUM_BLOCKS * NUM_BLOCKS],
        }
    }

    pub fn layout(&self) -> &SystemLayout {
        &self.layout
    }

    pub fn get(&self, equation: Field, unknown: Field) -> Option<&CsrMatrix<f64>> {
        self.blocks[NUM_BLOCKS * equation.index() + unknown.index()].as_ref()
    }

    /// Sets a block, checking it against the coupling structure and the layout.
    pub fn set(&mut self, equation: Field, unknown: Field, matrix: CsrMatrix<f64>) -> eyre::Result<()> {
        if !is_structurally_present(equation, unknown) {
            return Err(eyre!(
                "block ({}, {}) is structurally absent from the coupled system",
                equation,
                unknown
            ));
        }
        let expected = (
            self.layout.block_size(equation.index()),
            self.layout.block_size(unknown.index()),
        );
        if (matrix.nrows(), matrix.ncols()) != expected {
            return Err(eyre!(
                "block ({}, {}) has shape {:?}, expected {:?}",
                equation,
                unknown,
                (matrix.nrows(), matrix.ncols()),
                expected
            ));
        }
        self.blocks[NUM_BLOCKS * equation.index() + unknown.index()] = Some(matrix);
        Ok(())
    }
}

/// A prescribed value for one DOF of one field.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EssentialConstraint {
    pub field: Field,
    pub dof: usize,
    pub value: f64,
}

impl EssentialConstraint {
    pub fn new(field: Field, dof: usize, value: f64) -> Self {
        Self { field, dof, value }
    }
}

/// The blocks of all four equations of one time step.
#[derive(Debug, Clone)]
pub struct CoupledBlocks {
    pub velocity: VelocityBlocks,
    pub pressure: PressureBlocks,
    pub saturation: SaturationBlocks,
    pub displacement: DisplacementBlocks,
}

impl CoupledBlocks {
    /// Arranges the blocks in the block matrix and stacks the right-hand sides.
    pub fn into_block_system(self, layout: SystemLayout) -> eyre::Result<(BlockMatrix, DVector<f64>)> {
        use Field::*;
        let CoupledBlocks {
            velocity,
            pressure,
            saturation,
            displacement,
        } = self;

        let mut matrix = BlockMatrix::new(layout);
        matrix.set(Velocity, Velocity, velocity.v)?;
        matrix.set(Velocity, Pressure, velocity.vp)?;

        let [pu0, pu1] = pressure.pu;
        matrix.set(Pressure, Velocity, pressure.pv)?;
        matrix.set(Pressure, Pressure, pressure.p)?;
        matrix.set(Pressure, Displacement0, pu0)?;
        matrix.set(Pressure, Displacement1, pu1)?;

        let [su0, su1] = saturation.su;
        matrix.set(Saturation, Velocity, saturation.sv)?;
        matrix.set(Saturation, Pressure, saturation.sp)?;
        matrix.set(Saturation, Saturation, saturation.s)?;
        matrix.set(Saturation, Displacement0, su0)?;
        matrix.set(Saturation, Displacement1, su1)?;

        let [up0, up1] = displacement.up;
        let [[u00, u01], [u10, u11]] = displacement.u;
        matrix.set(Displacement0, Pressure, up0)?;
        matrix.set(Displacement0, Displacement0, u00)?;
        matrix.set(Displacement0, Displacement1, u01)?;
        matrix.set(Displacement1, Pressure, up1)?;
        matrix.set(Displacement1, Displacement0, u10)?;
        matrix.set(Displacement1, Displacement1, u11)?;

        let [fu0, fu1] = displacement.rhs;
        let rhs_blocks = [velocity.rhs, pressure.rhs, saturation.rhs, fu0, fu1];
        let mut rhs = DVector::zeros(layout.total_size());
        for (block, block_rhs) in rhs_blocks.iter().enumerate() {
            let (offset, size) = layout.block_range(block);
            if block_rhs.len() != size {
                return Err(eyre!(
                    "right-hand side of block {} has length {}, expected {}",
                    Field::ALL[block],
                    block_rhs.len(),
                    size
                ));
            }
            rhs.rows_mut(offset, size).copy_from(block_rhs);
        }

        Ok((matrix, rhs))
    }
}

/// The assembled global system of one linearized time step.
#[derive(Debug, Clone, PartialEq)]
pub struct CoupledSystem {
    layout: SystemLayout,
    matrix: CsrMatrix<f64>,
    rhs: DVector<f64>,
}

impl CoupledSystem {
    /// Composes the global matrix and right-hand side from the equation blocks.
    ///
    /// Each essential constraint replaces the row of its DOF by a scaled identity row, with the
    /// scale taken from the diagonal block of the constrained field.
    pub fn compose(
        blocks: CoupledBlocks,
        layout: SystemLayout,
        constraints: &[EssentialConstraint],
    ) -> eyre::Result<Self> {
        let (matrix, rhs) = blocks.into_block_system(layout)?;
        Self::from_block_matrix(&matrix, rhs, constraints)
    }

    pub fn from_block_matrix(
        blocks: &BlockMatrix,
        mut rhs: DVector<f64>,
        constraints: &[EssentialConstraint],
    ) -> eyre::Result<Self> {
        let layout = *blocks.layout();
        let n = layout.total_size();
        assert_eq!(rhs.len(), n, "Right-hand side does not match the system layout");

        let mut constrained = vec![false; n];
        for constraint in constraints {
            let (offset, size) = layout.block_range(constraint.field.index());
            if constraint.dof >= size {
                return Err(eyre!(
                    "constrained DOF {} of field {} is out of bounds (field has {} DOFs)",
                    constraint.dof,
                    constraint.field,
                    size
                ));
            }
            constrained[offset + constraint.dof] = true;
        }

        let mut coo = CooMatrix::new(n, n);
        for equation in Field::ALL {
            for unknown in Field::ALL {
                if let Some(block) = blocks.get(equation, unknown) {
                    let row_offset = layout.block_offset(equation.index());
                    let col_offset = layout.block_offset(unknown.index());
                    for (i, j, &v) in block.triplet_iter() {
                        if !constrained[row_offset + i] {
                            coo.push(row_offset + i, col_offset + j, v);
                        }
                    }
                }
            }
        }

        for constraint in constraints {
            let scale = diagonal_scale(blocks.get(constraint.field, constraint.field));
            let row = layout.block_offset(constraint.field.index()) + constraint.dof;
            coo.push(row, row, scale);
            rhs[row] = scale * constraint.value;
        }

        Ok(Self {
            layout,
            matrix: CsrMatrix::from(&coo),
            rhs,
        })
    }

    pub fn layout(&self) -> &SystemLayout {
        &self.layout
    }

    pub fn matrix(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Splits a solution vector into the blocks `[v, p, s, u_0, u_1]`.
    pub fn split_solution(&self, solution: &DVector<f64>) -> [DVector<f64>; NUM_BLOCKS] {
        assert_eq!(solution.len(), self.layout.total_size(), "Solution does not match the system layout");
        let block = |b: usize| {
            let (offset, size) = self.layout.block_range(b);
            solution.rows(offset, size).clone_owned()
        };
        [block(0), block(1), block(2), block(3), block(4)]
    }
}

/// The magnitude of the first non-zero diagonal entry of a block, or 1 if there is none.
fn diagonal_scale(block: Option<&CsrMatrix<f64>>) -> f64 {
    block
        .and_then(|matrix| {
            (0..matrix.nrows().min(matrix.ncols()))
                .filter_map(|i| matrix.get_entry(i, i))
                .map(|entry| entry.into_value().abs())
                .find(|&x| x != 0.0)
        })
        .unwrap_or(1.0)
}

/// Multiplies every stored entry of the matrix by a factor.
pub fn scaled(mut matrix: CsrMatrix<f64>, factor: f64) -> CsrMatrix<f64> {
    matrix.values_mut().iter_mut().for_each(|v| *v *= factor);
    matrix
}
