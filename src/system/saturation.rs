use crate::assembly::global::{assemble_vector, CsrAssembler};
use crate::assembly::local::{
    ElementGradientCouplingAssembler, ElementMassAssembler, ElementMixedMassAssembler, ElementSourceAssembler,
    ElementStiffnessAssembler, ElementTransportAssembler,
};
use crate::coefficient::Coefficient;
use crate::system::{scaled, AssemblyContext, WellSources};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Blocks of the water transport equation, multiplied by the time step length.
#[derive(Debug, Clone)]
pub struct SaturationBlocks {
    /// Advection by the total velocity, weighted by the water fractional flow.
    pub sv: CsrMatrix<f64>,
    /// Compressibility coupling to the pressure.
    pub sp: CsrMatrix<f64>,
    /// Porosity-weighted mass matrix plus artificial diffusion.
    pub s: CsrMatrix<f64>,
    /// Coupling to the volumetric strain of each displacement component.
    pub su: [CsrMatrix<f64>; 2],
    pub rhs: DVector<f64>,
}

pub fn assemble_saturation_blocks(context: &AssemblyContext, sources: &WellSources) -> eyre::Result<SaturationBlocks> {
    let spaces = context.spaces;
    let quadrature = context.quadrature;
    let coefficients = &context.coefficients;
    let (previous, current) = (context.previous, context.current);
    let dt = context.dt;
    let assembler = CsrAssembler::default();

    // Explicit in the fractional flow: it is taken from the previous time level
    let fractional_flow = Coefficient::PerQuadraturePoint(coefficients.water_fractional_flow(previous));
    let sv = assembler.assemble(&ElementTransportAssembler::new(
        spaces.scalar(),
        spaces.velocity(),
        quadrature,
        &fractional_flow,
    )?)?;
    let sv = scaled(sv, -dt);

    let saturation_pressure = Coefficient::PerQuadraturePoint(coefficients.saturation_pressure(current));
    let sp = assembler.assemble(&ElementMixedMassAssembler::new(
        spaces.scalar(),
        spaces.pressure(),
        quadrature,
        &saturation_pressure,
    )?)?;

    let porosity = Coefficient::PerEntity(previous.porosity.clone());
    let mass = assembler.assemble(&ElementMassAssembler::new(spaces.scalar(), quadrature, &porosity)?)?;
    let unit = Coefficient::Constant(1.0);
    let stiffness = assembler.assemble(&ElementStiffnessAssembler::new(spaces.scalar(), quadrature, &unit)?)?;
    let s = &mass + &scaled(stiffness, dt * context.stabilization);

    let saturation_displacement = Coefficient::PerQuadraturePoint(coefficients.saturation_displacement(current));
    let assemble_axis = |axis| -> eyre::Result<CsrMatrix<f64>> {
        assembler.assemble(&ElementGradientCouplingAssembler::new(
            spaces.scalar(),
            spaces.scalar(),
            quadrature,
            &saturation_displacement,
            axis,
        )?)
    };
    let su = [assemble_axis(0)?, assemble_axis(1)?];

    let water_source = Coefficient::PerQuadraturePoint(sources.water_at_quadrature_points(spaces, quadrature));
    let mut rhs = assemble_vector(&ElementSourceAssembler::new(spaces.scalar(), quadrature, &water_source)?)?;
    rhs *= dt;
    rhs += &mass * &previous.saturation;
    rhs += &sp * &previous.pressure;
    for (axis, su_a) in su.iter().enumerate() {
        rhs += su_a * &previous.displacement_component(axis);
    }

    Ok(SaturationBlocks { sv, sp, s, su, rhs })
}
