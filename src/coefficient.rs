//! Coefficients of the bilinear forms, and their evaluation from the field state.
use crate::function::DiscreteFunction;
use crate::model::WaterFloodingModel;
use crate::quadrature::{Quadrature, TriangleQuadrature};
use crate::space::LagrangeSpace;
use crate::state::FieldSnapshot;
use eyre::eyre;
use log::warn;
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// A coefficient of an integrand, sampled in one of several layouts.
///
/// The entities are cells for volume integrals and faces for face integrals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Coefficient {
    /// The same value everywhere.
    Constant(f64),
    /// One value per entity.
    PerEntity(DVector<f64>),
    /// One value per quadrature point and entity, stored with one row per quadrature point
    /// and one column per entity.
    PerQuadraturePoint(DMatrix<f64>),
    /// A constant 2x2 tensor.
    Tensor(Matrix2<f64>),
}

impl From<f64> for Coefficient {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl From<Matrix2<f64>> for Coefficient {
    fn from(tensor: Matrix2<f64>) -> Self {
        Self::Tensor(tensor)
    }
}

impl Coefficient {
    /// Checks that the coefficient can be sampled with a quadrature rule of `num_points` points
    /// on `num_entities` entities.
    pub fn validate(&self, num_points: usize, num_entities: usize) -> eyre::Result<()> {
        match self {
            Self::Constant(_) | Self::Tensor(_) => Ok(()),
            Self::PerEntity(values) if values.len() == num_entities => Ok(()),
            Self::PerEntity(values) => Err(eyre!(
                "per-entity coefficient has {} values, but {} entities are being integrated over",
                values.len(),
                num_entities
            )),
            Self::PerQuadraturePoint(values) if values.shape() == (num_points, num_entities) => Ok(()),
            Self::PerQuadraturePoint(values) => Err(eyre!(
                "per-quadrature-point coefficient has shape {:?}, expected {:?} \
                 (quadrature points x entities)",
                values.shape(),
                (num_points, num_entities)
            )),
        }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Self::Tensor(_))
    }

    /// The scalar value at quadrature point `q` of entity `e`.
    ///
    /// Fails for tensor coefficients, which have no scalar value.
    pub fn scalar_at(&self, q: usize, e: usize) -> eyre::Result<f64> {
        match self {
            Self::Constant(c) => Ok(*c),
            Self::PerEntity(values) => Ok(values[e]),
            Self::PerQuadraturePoint(values) => Ok(values[(q, e)]),
            Self::Tensor(_) => Err(eyre!("a 2x2 tensor coefficient cannot be used as a scalar")),
        }
    }

    /// Computes $a \cdot (C b)$ at quadrature point `q` of entity `e`, where $C$ is the coefficient
    /// (a scalar multiple of the identity for scalar variants).
    pub fn contract(&self, q: usize, e: usize, a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
        match self {
            Self::Constant(c) => c * a.dot(b),
            Self::PerEntity(values) => values[e] * a.dot(b),
            Self::PerQuadraturePoint(values) => values[(q, e)] * a.dot(b),
            Self::Tensor(tensor) => a.dot(&(tensor * b)),
        }
    }
}

/// Evaluates the state-dependent coefficients of the coupled equations at the quadrature
/// points of every cell.
///
/// Each method takes the snapshot it reads from explicitly. The coupled assembly decides per
/// term whether this is the previous time level or the current iterate.
#[derive(Debug, Clone)]
pub struct CoefficientEvaluator<'a> {
    model: &'a WaterFloodingModel,
    saturation_space: &'a LagrangeSpace,
    quadrature: &'a TriangleQuadrature,
    mobility_floor: f64,
}

impl<'a> CoefficientEvaluator<'a> {
    pub fn new(
        model: &'a WaterFloodingModel,
        saturation_space: &'a LagrangeSpace,
        quadrature: &'a TriangleQuadrature,
        mobility_floor: f64,
    ) -> Self {
        Self {
            model,
            saturation_space,
            quadrature,
            mobility_floor,
        }
    }

    pub fn model(&self) -> &WaterFloodingModel {
        self.model
    }

    pub fn quadrature(&self) -> &TriangleQuadrature {
        self.quadrature
    }

    pub fn mobility_floor(&self) -> f64 {
        self.mobility_floor
    }

    /// Water saturation at the quadrature points of every cell.
    pub fn saturation(&self, snapshot: &FieldSnapshot) -> DMatrix<f64> {
        DiscreteFunction::new(self.saturation_space, &snapshot.saturation).values_at_quadrature_points(self.quadrature)
    }

    /// The piecewise constant porosity, broadcast to the quadrature points of every cell.
    pub fn porosity(&self, snapshot: &FieldSnapshot) -> DMatrix<f64> {
        let num_points = self.quadrature.len();
        DMatrix::from_fn(num_points, snapshot.porosity.len(), |_, c| snapshot.porosity[c])
    }

    /// Compressibility coefficient of the pressure equation,
    /// $(b - \phi)/K_s + \phi S_w c_w + \phi (1 - S_w) c_o$.
    pub fn pressure_mass(&self, snapshot: &FieldSnapshot) -> DMatrix<f64> {
        let rock = self.model.rock();
        let (c_w, c_o) = (self.model.water().compressibility, self.model.oil().compressibility);
        let s = self.saturation(snapshot);
        let phi = self.porosity(snapshot);
        s.zip_map(&phi, |s, phi| {
            (rock.biot - phi) / rock.solid_grain_stiffness + phi * s * c_w + phi * (1.0 - s) * c_o
        })
    }

    /// Coupling of the pressure rate into the saturation equation,
    /// $((b - \phi)/K_s + \phi c_w) S_w$.
    pub fn saturation_pressure(&self, snapshot: &FieldSnapshot) -> DMatrix<f64> {
        let rock = self.model.rock();
        let c_w = self.model.water().compressibility;
        let s = self.saturation(snapshot);
        let phi = self.porosity(snapshot);
        s.zip_map(&phi, |s, phi| ((rock.biot - phi) / rock.solid_grain_stiffness + phi * c_w) * s)
    }

    /// Reciprocal of the total mobility times the absolute permeability,
    /// $1 / ((k_{rw}/\mu_w + k_{ro}/\mu_o) k)$.
    ///
    /// Total mobilities below the mobility floor are replaced by the floor.
    pub fn flux(&self, snapshot: &FieldSnapshot) -> DMatrix<f64> {
        let k = self.model.absolute_permeability();
        let mut floored = 0;
        let result = self.saturation(snapshot).map(|s| {
            let (lambda_w, lambda_o) = self.model.mobilities(s);
            let total = self.floor_total_mobility(lambda_w + lambda_o, &mut floored);
            1.0 / (total * k)
        });
        self.report_floored("flux", floored);
        result
    }

    /// Water fractional flow $\lambda_w / (\lambda_w + \lambda_o)$.
    pub fn water_fractional_flow(&self, snapshot: &FieldSnapshot) -> DMatrix<f64> {
        let mut floored = 0;
        let result = self
            .saturation(snapshot)
            .map(|s| self.fractional_flow_with_count(s, &mut floored));
        self.report_floored("water fractional flow", floored);
        result
    }

    /// Water fractional flow at a single saturation value.
    pub fn water_fractional_flow_at(&self, saturation: f64) -> f64 {
        let mut floored = 0;
        let f_w = self.fractional_flow_with_count(saturation, &mut floored);
        self.report_floored("water fractional flow", floored);
        f_w
    }

    /// Biot coefficient times the water saturation, used in the saturation-displacement coupling.
    pub fn saturation_displacement(&self, snapshot: &FieldSnapshot) -> DMatrix<f64> {
        let biot = self.model.rock().biot;
        self.saturation(snapshot).map(|s| biot * s)
    }

    fn fractional_flow_with_count(&self, saturation: f64, floored: &mut usize) -> f64 {
        let (lambda_w, lambda_o) = self.model.mobilities(saturation);
        lambda_w / self.floor_total_mobility(lambda_w + lambda_o, floored)
    }

    fn floor_total_mobility(&self, total: f64, floored: &mut usize) -> f64 {
        if total < self.mobility_floor {
            *floored += 1;
            self.mobility_floor
        } else {
            total
        }
    }

    fn report_floored(&self, name: &str, floored: usize) {
        if floored > 0 {
            warn!(
                "Total mobility below {:e} at {} point(s) while evaluating the {} coefficient",
                self.mobility_floor, floored, name
            );
        }
    }
}
