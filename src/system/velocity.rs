use crate::assembly::face::assemble_divergence_coupling;
use crate::assembly::global::CsrAssembler;
use crate::assembly::local::ElementMassAssembler;
use crate::coefficient::Coefficient;
use crate::space::FunctionSpace;
use crate::system::{scaled, AssemblyContext};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Blocks of the Darcy equation $K^{-1} \lambda_t^{-1} v + \nabla p = 0$.
#[derive(Debug, Clone)]
pub struct VelocityBlocks {
    /// Velocity mass matrix weighted by the reciprocal total mobility.
    pub v: CsrMatrix<f64>,
    /// Negative divergence coupling, $-B$.
    pub vp: CsrMatrix<f64>,
    pub rhs: DVector<f64>,
}

pub fn assemble_velocity_blocks(context: &AssemblyContext) -> eyre::Result<VelocityBlocks> {
    let spaces = context.spaces;
    let quadrature = context.quadrature;

    // The mobility follows the latest saturation iterate
    let flux = Coefficient::PerQuadraturePoint(context.coefficients.flux(context.current));
    let v = CsrAssembler::default().assemble(&ElementMassAssembler::new(spaces.velocity(), quadrature, &flux)?)?;
    let vp = scaled(assemble_divergence_coupling(spaces.velocity(), spaces.pressure())?, -1.0);
    let rhs = DVector::zeros(spaces.velocity().num_global_dofs());

    Ok(VelocityBlocks { v, vp, rhs })
}
