use crate::assembly::face::assemble_divergence_coupling;
use crate::assembly::global::{assemble_vector, diagonal_csr, CsrAssembler};
use crate::assembly::local::{ElementGradientCouplingAssembler, ElementSourceAssembler};
use crate::coefficient::Coefficient;
use crate::quadrature::{Quadrature, TriangleQuadrature};
use crate::space::FunctionSpace;
use crate::system::{scaled, AssemblyContext, FieldSpaces, WellSources};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Blocks of the mass balance of the total fluid, multiplied by the time step length.
#[derive(Debug, Clone)]
pub struct PressureBlocks {
    /// Divergence of the velocity, $\Delta t B^T$.
    pub pv: CsrMatrix<f64>,
    /// Diagonal compressibility matrix.
    pub p: CsrMatrix<f64>,
    /// Volumetric strain of each displacement component.
    pub pu: [CsrMatrix<f64>; 2],
    pub rhs: DVector<f64>,
}

/// Assembles $PU_a$ with entries $b \int_K \partial_a \lambda_j \, dx$, coupling the pressure test
/// functions to displacement component $a$.
pub fn assemble_pressure_displacement_coupling(
    spaces: &FieldSpaces,
    quadrature: &TriangleQuadrature,
    biot: f64,
) -> eyre::Result<[CsrMatrix<f64>; 2]> {
    let biot = Coefficient::Constant(biot);
    let assembler = CsrAssembler::default();
    let assemble_axis = |axis| -> eyre::Result<CsrMatrix<f64>> {
        assembler.assemble(&ElementGradientCouplingAssembler::new(
            spaces.pressure(),
            spaces.scalar(),
            quadrature,
            &biot,
            axis,
        )?)
    };
    Ok([assemble_axis(0)?, assemble_axis(1)?])
}

pub fn assemble_pressure_blocks(context: &AssemblyContext, sources: &WellSources) -> eyre::Result<PressureBlocks> {
    let spaces = context.spaces;
    let quadrature = context.quadrature;
    let mesh = spaces.mesh();
    let dt = context.dt;

    // The pressure space is piecewise constant, so the weighted mass matrix is diagonal
    let c = context.coefficients.pressure_mass(context.current);
    let diagonal: Vec<f64> = (0..mesh.num_cells())
        .map(|cell| {
            let integral: f64 = quadrature
                .weights()
                .iter()
                .enumerate()
                .map(|(q, w)| w * c[(q, cell)])
                .sum();
            integral * mesh.cell_measure(cell)
        })
        .collect();
    let p = diagonal_csr(&diagonal);

    let pv = scaled(assemble_divergence_coupling(spaces.velocity(), spaces.pressure())?.transpose(), dt);
    let pu = assemble_pressure_displacement_coupling(spaces, quadrature, context.model.rock().biot)?;

    let total_source = Coefficient::PerQuadraturePoint(sources.total_at_quadrature_points(spaces, quadrature));
    let mut rhs = assemble_vector(&ElementSourceAssembler::new(spaces.pressure(), quadrature, &total_source)?)?;
    rhs *= dt;
    rhs += &p * &context.previous.pressure;
    for (axis, pu_a) in pu.iter().enumerate() {
        rhs += pu_a * &context.previous.displacement_component(axis);
    }
    debug_assert_eq!(rhs.len(), spaces.pressure().num_global_dofs());

    Ok(PressureBlocks { pv, p, pu, rhs })
}
