//! The coupled block system of one linearized time step.
//!
//! The unknowns are ordered as `[v, p, s, u_0, u_1]`: the Raviart-Thomas velocity, the piecewise
//! constant pressure, the continuous linear saturation and the two components of the continuous
//! linear displacement.
use crate::coefficient::CoefficientEvaluator;
use crate::mesh::TriangleMesh2d;
use crate::model::{WaterFloodingModel, WellSpec};
use crate::quadrature::TriangleQuadrature;
use crate::space::{FunctionSpace, LagrangeSpace, PiecewiseConstantSpace, RaviartThomasSpace};
use crate::state::FieldSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod block;
mod displacement;
mod pressure;
mod saturation;
mod velocity;
mod wells;

pub use block::*;
pub use displacement::*;
pub use pressure::*;
pub use saturation::*;
pub use velocity::*;
pub use wells::*;

/// The function spaces of the coupled problem, all defined on one shared mesh.
#[derive(Debug, Clone)]
pub struct FieldSpaces {
    mesh: Arc<TriangleMesh2d>,
    velocity: RaviartThomasSpace,
    pressure: PiecewiseConstantSpace,
    scalar: LagrangeSpace,
}

impl FieldSpaces {
    pub fn new(mesh: Arc<TriangleMesh2d>) -> Self {
        Self {
            velocity: RaviartThomasSpace::new(Arc::clone(&mesh)),
            pressure: PiecewiseConstantSpace::new(Arc::clone(&mesh)),
            scalar: LagrangeSpace::new(Arc::clone(&mesh)),
            mesh,
        }
    }

    pub fn mesh(&self) -> &TriangleMesh2d {
        &self.mesh
    }

    pub fn velocity(&self) -> &RaviartThomasSpace {
        &self.velocity
    }

    pub fn pressure(&self) -> &PiecewiseConstantSpace {
        &self.pressure
    }

    /// The space of the saturation and of each displacement component.
    pub fn scalar(&self) -> &LagrangeSpace {
        &self.scalar
    }

    pub fn layout(&self) -> SystemLayout {
        SystemLayout::new(
            self.velocity.num_global_dofs(),
            self.pressure.num_global_dofs(),
            self.scalar.num_global_dofs(),
            self.scalar.num_global_dofs(),
        )
    }
}

/// Sizes and offsets of the five unknown blocks `[v, p, s, u_0, u_1]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLayout {
    sizes: [usize; NUM_BLOCKS],
}

impl SystemLayout {
    pub fn new(num_velocity: usize, num_pressure: usize, num_saturation: usize, num_displacement: usize) -> Self {
        Self {
            sizes: [
                num_velocity,
                num_pressure,
                num_saturation,
                num_displacement,
                num_displacement,
            ],
        }
    }

    pub fn num_velocity_dofs(&self) -> usize {
        self.sizes[Field::Velocity.index()]
    }

    pub fn num_pressure_dofs(&self) -> usize {
        self.sizes[Field::Pressure.index()]
    }

    pub fn num_saturation_dofs(&self) -> usize {
        self.sizes[Field::Saturation.index()]
    }

    /// Number of DOFs of a single displacement component.
    pub fn num_displacement_dofs(&self) -> usize {
        self.sizes[Field::Displacement0.index()]
    }

    pub fn block_size(&self, block: usize) -> usize {
        self.sizes[block]
    }

    pub fn block_offset(&self, block: usize) -> usize {
        self.sizes[..block].iter().sum()
    }

    /// Offset and size of the block.
    pub fn block_range(&self, block: usize) -> (usize, usize) {
        (self.block_offset(block), self.block_size(block))
    }

    pub fn total_size(&self) -> usize {
        self.sizes.iter().sum()
    }
}

/// Everything the assembly of one linearized time step reads.
///
/// `previous` is the converged state of the previous time level and `current` the latest iterate.
/// Neither is modified during assembly.
pub struct AssemblyContext<'a> {
    pub spaces: &'a FieldSpaces,
    pub model: &'a WaterFloodingModel,
    pub quadrature: &'a TriangleQuadrature,
    pub coefficients: CoefficientEvaluator<'a>,
    pub previous: &'a FieldSnapshot,
    pub current: &'a FieldSnapshot,
    pub wells: &'a [WellSpec],
    /// Length of the time step.
    pub dt: f64,
    /// Artificial diffusion of the saturation equation.
    pub stabilization: f64,
}

/// Assembles all equation blocks of one linearized time step and composes the coupled system,
/// imposing the boundary conditions of the model.
pub fn assemble_coupled_system(context: &AssemblyContext) -> eyre::Result<CoupledSystem> {
    let sources = WellSources::from_wells(context)?;
    let blocks = CoupledBlocks {
        velocity: assemble_velocity_blocks(context)?,
        pressure: assemble_pressure_blocks(context, &sources)?,
        saturation: assemble_saturation_blocks(context, &sources)?,
        displacement: assemble_displacement_blocks(context)?,
    };
    let constraints = boundary_constraints(context.spaces, context.model);
    CoupledSystem::compose(blocks, context.spaces.layout(), &constraints)
}

/// Zero normal flux through boundary faces and prescribed displacement on boundary vertices.
pub fn boundary_constraints(spaces: &FieldSpaces, model: &WaterFloodingModel) -> Vec<EssentialConstraint> {
    let mesh = spaces.mesh();
    let bc = model.bc();
    let flux = mesh
        .boundary_faces()
        .into_iter()
        .flat_map(|f| spaces.velocity().face_dofs(f).to_vec())
        .map(|dof| EssentialConstraint::new(Field::Velocity, dof, bc.flux));
    let vertices = mesh.boundary_vertices();
    let vertices = &vertices;
    let displacement = [Field::Displacement0, Field::Displacement1]
        .into_iter()
        .flat_map(move |field| {
            vertices
                .iter()
                .map(move |&v| EssentialConstraint::new(field, v, bc.displacement))
        });
    flux.chain(displacement).collect()
}
