use crate::assembly::global::CsrAssembler;
use crate::assembly::local::ElementElasticityAssembler;
use crate::system::{assemble_pressure_displacement_coupling, scaled, AssemblyContext};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Blocks of the quasi-static linear elasticity equation of the rock skeleton.
///
/// The displacement is measured from the equilibrium at the initial pressure.
#[derive(Debug, Clone)]
pub struct DisplacementBlocks {
    /// Effective pressure load, $UP_a = -PU_a^T$.
    pub up: [CsrMatrix<f64>; 2],
    /// Elasticity blocks, indexed by (test component, trial component).
    pub u: [[CsrMatrix<f64>; 2]; 2],
    pub rhs: [DVector<f64>; 2],
}

pub fn assemble_displacement_blocks(context: &AssemblyContext) -> eyre::Result<DisplacementBlocks> {
    let spaces = context.spaces;
    let quadrature = context.quadrature;
    let rock = context.model.rock();
    let assembler = CsrAssembler::default();

    let assemble_block = |a, b| {
        assembler.assemble(&ElementElasticityAssembler::new(spaces.scalar(), quadrature, rock.lame, (a, b)))
    };
    let u = [
        [assemble_block(0, 0)?, assemble_block(0, 1)?],
        [assemble_block(1, 0)?, assemble_block(1, 1)?],
    ];

    let [pu0, pu1] = assemble_pressure_displacement_coupling(spaces, quadrature, rock.biot)?;
    let up = [scaled(pu0.transpose(), -1.0), scaled(pu1.transpose(), -1.0)];

    let initial_pressure = DVector::repeat(context.previous.pressure.len(), rock.initial_pressure);
    let rhs = [&up[0] * &initial_pressure, &up[1] * &initial_pressure];

    Ok(DisplacementBlocks { up, u, rhs })
}
