use crate::function::DiscreteFunction;
use crate::model::{WellKind, WellSpec};
use crate::quadrature::TriangleQuadrature;
use crate::system::{AssemblyContext, FieldSpaces};
use eyre::eyre;
use nalgebra::{DMatrix, DVector};

/// The source terms of the wells as continuous linear fields, one value per vertex.
///
/// Injected fluid is water. Produced fluid contains water in proportion to the water fractional
/// flow at the previous time level.
///
/// The fitted water curve does not vanish at $S_w = 0$ ($k_{rw}(0) \approx 0.277$), so a
/// production well withdraws water even where there is none. Saturation near such a well can
/// become negative; it is not clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct WellSources {
    pub total: DVector<f64>,
    pub water: DVector<f64>,
}

impl WellSources {
    pub fn from_wells(context: &AssemblyContext) -> eyre::Result<Self> {
        let previous_saturation = &context.previous.saturation;
        Self::from_well_specs(context.wells, previous_saturation.len(), |node| {
            context
                .coefficients
                .water_fractional_flow_at(previous_saturation[node])
        })
    }

    /// Builds the source fields from the well list, with `water_fraction(node)` giving the share
    /// of water in the fluid produced at a vertex.
    pub fn from_well_specs(
        wells: &[WellSpec],
        num_vertices: usize,
        water_fraction: impl Fn(usize) -> f64,
    ) -> eyre::Result<Self> {
        let mut total = DVector::zeros(num_vertices);
        let mut water = DVector::zeros(num_vertices);
        for well in wells {
            if well.node >= num_vertices {
                return Err(eyre!(
                    "well at vertex {} is outside of the mesh, which has {} vertices",
                    well.node,
                    num_vertices
                ));
            }
            if !(well.rate.is_finite() && well.rate >= 0.0) {
                return Err(eyre!(
                    "well at vertex {} has invalid rate {} (rates must be finite and non-negative)",
                    well.node,
                    well.rate
                ));
            }
            total[well.node] += well.signed_rate();
            water[well.node] += match well.kind {
                WellKind::Injection => well.rate,
                WellKind::Production => -well.rate * water_fraction(well.node),
            };
        }
        Ok(Self { total, water })
    }

    pub fn total_at_quadrature_points(&self, spaces: &FieldSpaces, quadrature: &TriangleQuadrature) -> DMatrix<f64> {
        DiscreteFunction::new(spaces.scalar(), &self.total).values_at_quadrature_points(quadrature)
    }

    pub fn water_at_quadrature_points(&self, spaces: &FieldSpaces, quadrature: &TriangleQuadrature) -> DMatrix<f64> {
        DiscreteFunction::new(spaces.scalar(), &self.water).values_at_quadrature_points(quadrature)
    }
}
