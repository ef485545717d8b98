//! Physical properties of rock and fluids for the water-flooding problem.
//!
//! Pressures are in MPa, viscosities in centipoise and absolute permeability in darcy.
use crate::mesh::procedural::create_rectangular_uniform_tri_mesh_2d;
use crate::mesh::TriangleMesh2d;
use crate::timeline::UniformTimeLine;
use crate::util::{polyfit, polyval};
use eyre::{eyre, WrapErr};
use nalgebra::{DMatrix, DVector, Vector2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Factor converting absolute permeability to units consistent with viscosity in cP and
/// pressure in MPa ($1 \mathrm{d} = 9.869233 \times 10^{-13} \mathrm{m}^2$, $1 \mathrm{cP} = 10^{-9} \mathrm{MPa \cdot s}$).
pub const PERMEABILITY_UNIT_CONVERSION: f64 = 9.869233e-4;

/// Water-oil relative permeability table, with columns $S_w$, $k_{rw}$ and $k_{ro}$.
#[rustfmt::skip]
pub const WATER_OIL_RELATIVE_PERMEABILITY_TABLE: [[f64; 3]; 15] = [
    [0.200000, 0.000000, 0.510200],
    [0.235714, 0.000010, 0.439917],
    [0.271429, 0.000163, 0.374841],
    [0.307143, 0.000824, 0.314970],
    [0.342857, 0.002603, 0.260306],
    [0.378571, 0.006355, 0.210848],
    [0.414286, 0.013177, 0.166596],
    [0.450000, 0.024412, 0.127550],
    [0.485714, 0.041647, 0.093710],
    [0.521429, 0.066710, 0.065077],
    [0.557143, 0.101676, 0.041649],
    [0.592857, 0.148864, 0.023428],
    [0.628571, 0.210836, 0.010412],
    [0.664286, 0.290398, 0.002603],
    [0.700000, 0.390600, 0.000000],
];

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LameParameters {
    pub lambda: f64,
    pub mu: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RockProperties {
    /// Absolute permeability in darcy.
    pub permeability: f64,
    pub porosity: f64,
    pub lame: LameParameters,
    pub biot: f64,
    /// Initial pore pressure in MPa.
    pub initial_pressure: f64,
    /// Initial stress in MPa. Stress is not yet part of the coupled system.
    pub initial_stress: f64,
    /// Bulk stiffness of the solid grains in MPa.
    pub solid_grain_stiffness: f64,
}

impl Default for RockProperties {
    fn default() -> Self {
        Self {
            permeability: 2.0,
            porosity: 0.3,
            lame: LameParameters {
                lambda: 1.0e8,
                mu: 3.0e8,
            },
            biot: 1.0,
            initial_pressure: 3.0,
            initial_stress: 60.66,
            solid_grain_stiffness: 6.25,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterProperties {
    /// Viscosity in cP.
    pub viscosity: f64,
    /// Compressibility in 1/MPa.
    pub compressibility: f64,
    pub initial_saturation: f64,
    /// Injected volume per unit time and unit volume (1/s).
    pub injection_rate: f64,
}

impl Default for WaterProperties {
    fn default() -> Self {
        Self {
            viscosity: 1.0,
            compressibility: 1.0e-3,
            initial_saturation: 0.0,
            injection_rate: 3.51e-6,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OilProperties {
    /// Viscosity in cP.
    pub viscosity: f64,
    /// Compressibility in 1/MPa.
    pub compressibility: f64,
    pub initial_saturation: f64,
    /// Produced volume per unit time and unit volume (1/s).
    pub production_rate: f64,
}

impl Default for OilProperties {
    fn default() -> Self {
        Self {
            viscosity: 2.0,
            compressibility: 2.0e-3,
            initial_saturation: 1.0,
            production_rate: 3.50e-6,
        }
    }
}

/// Prescribed values on the boundary of the domain.
///
/// The displacement is prescribed on every boundary vertex and the normal flux on every
/// boundary face.
#[derive(Copy, Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConditions {
    pub displacement: f64,
    pub flux: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WellKind {
    Injection,
    Production,
}

/// A point source or sink located at a mesh vertex.
///
/// The rate is always non-negative; the kind determines whether fluid is added or removed.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WellSpec {
    pub node: usize,
    pub rate: f64,
    pub kind: WellKind,
}

impl WellSpec {
    pub fn injection(node: usize, rate: f64) -> Self {
        Self {
            node,
            rate,
            kind: WellKind::Injection,
        }
    }

    pub fn production(node: usize, rate: f64) -> Self {
        Self {
            node,
            rate,
            kind: WellKind::Production,
        }
    }

    /// The rate with sign: positive for injection, negative for production.
    pub fn signed_rate(&self) -> f64 {
        match self.kind {
            WellKind::Injection => self.rate,
            WellKind::Production => -self.rate,
        }
    }
}

/// The plain, serializable parameters of a water-flooding model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    /// The rectangular domain `[x_min, x_max, y_min, y_max]` in meters.
    pub domain: [f64; 4],
    pub rock: RockProperties,
    pub water: WaterProperties,
    pub oil: OilProperties,
    pub bc: BoundaryConditions,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            domain: [0.0, 10.0, 0.0, 10.0],
            rock: Default::default(),
            water: Default::default(),
            oil: Default::default(),
            bc: Default::default(),
        }
    }
}

/// A relative permeability curve given by a fitted polynomial, clamped to $[0, 1]$.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativePermeabilityCurve {
    coefficients: Vec<f64>,
}

impl RelativePermeabilityCurve {
    /// Fits a quadratic to tabulated saturation/permeability pairs in the least-squares sense.
    pub fn fit_quadratic(saturation: &[f64], permeability: &[f64]) -> eyre::Result<Self> {
        let coefficients = polyfit(saturation, permeability, 2)?;
        Ok(Self {
            coefficients: coefficients.as_slice().to_vec(),
        })
    }

    /// Coefficients of the fitted polynomial in order of increasing degree.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Evaluates the curve. Values of the polynomial outside $[0, 1]$ are clamped.
    pub fn evaluate(&self, saturation: f64) -> f64 {
        let value = polyval(&self.coefficients, saturation);
        if value < 0.0 {
            0.0
        } else if value > 1.0 {
            1.0
        } else {
            value
        }
    }
}

/// Rock and fluid properties of the water-flooding model, including the fitted
/// relative permeability curves.
///
/// The model is immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct WaterFloodingModel {
    parameters: ModelParameters,
    krw: RelativePermeabilityCurve,
    kro: RelativePermeabilityCurve,
}

impl Default for WaterFloodingModel {
    fn default() -> Self {
        Self::new(ModelParameters::default())
            .expect("The embedded relative permeability table always admits a quadratic fit")
    }
}

impl WaterFloodingModel {
    pub fn new(parameters: ModelParameters) -> eyre::Result<Self> {
        let table = &WATER_OIL_RELATIVE_PERMEABILITY_TABLE;
        let sw: Vec<_> = table.iter().map(|row| row[0]).collect();
        let krw: Vec<_> = table.iter().map(|row| row[1]).collect();
        let kro: Vec<_> = table.iter().map(|row| row[2]).collect();
        let krw = RelativePermeabilityCurve::fit_quadratic(&sw, &krw).wrap_err("failed to fit water curve")?;
        let kro = RelativePermeabilityCurve::fit_quadratic(&sw, &kro).wrap_err("failed to fit oil curve")?;
        Ok(Self { parameters, krw, kro })
    }

    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        let parameters: ModelParameters =
            serde_json::from_str(json).wrap_err("failed to parse water-flooding model parameters")?;
        Self::new(parameters)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }

    pub fn rock(&self) -> &RockProperties {
        &self.parameters.rock
    }

    pub fn water(&self) -> &WaterProperties {
        &self.parameters.water
    }

    pub fn oil(&self) -> &OilProperties {
        &self.parameters.oil
    }

    pub fn bc(&self) -> &BoundaryConditions {
        &self.parameters.bc
    }

    pub fn water_curve(&self) -> &RelativePermeabilityCurve {
        &self.krw
    }

    pub fn oil_curve(&self) -> &RelativePermeabilityCurve {
        &self.kro
    }

    /// Relative permeability of water at the given water saturation, clamped to $[0, 1]$.
    pub fn relative_permeability_water(&self, sw: f64) -> f64 {
        self.krw.evaluate(sw)
    }

    /// Relative permeability of oil at the given water saturation, clamped to $[0, 1]$.
    pub fn relative_permeability_oil(&self, sw: f64) -> f64 {
        self.kro.evaluate(sw)
    }

    /// Element-wise water relative permeability of an array of saturations.
    pub fn relative_permeability_water_array(&self, sw: &DMatrix<f64>) -> DMatrix<f64> {
        sw.map(|s| self.relative_permeability_water(s))
    }

    /// Element-wise oil relative permeability of an array of saturations.
    pub fn relative_permeability_oil_array(&self, sw: &DMatrix<f64>) -> DMatrix<f64> {
        sw.map(|s| self.relative_permeability_oil(s))
    }

    /// Absolute permeability converted to units consistent with cP and MPa.
    pub fn absolute_permeability(&self) -> f64 {
        self.rock().permeability * PERMEABILITY_UNIT_CONVERSION
    }

    /// Mobilities $(\lambda_w, \lambda_o) = (k_{rw}/\mu_w, k_{ro}/\mu_o)$ at the given saturation.
    pub fn mobilities(&self, sw: f64) -> (f64, f64) {
        (
            self.relative_permeability_water(sw) / self.water().viscosity,
            self.relative_permeability_oil(sw) / self.oil().viscosity,
        )
    }

    /// A uniform mesh of the domain with `n` squares per side, each split into two triangles.
    ///
    /// The coupled system has $3n^2 + 2n$ velocity, $2n^2$ pressure and $3(n + 1)^2$ saturation
    /// and displacement unknowns. The bundled [`DenseLuSolver`](crate::solver::DenseLuSolver)
    /// factorizes it densely with $O(N^2)$ memory and $O(N^3)$ work, so $n = 32$ (about 8.5k
    /// unknowns) already needs roughly 570 MB. Use a sparse [`LinearSolver`](crate::solver::LinearSolver)
    /// for anything but small meshes.
    pub fn space_mesh(&self, n: usize) -> eyre::Result<TriangleMesh2d> {
        create_rectangular_uniform_tri_mesh_2d(self.parameters.domain, n, n)
    }

    pub fn time_mesh(&self, end_time: f64, num_steps: usize) -> eyre::Result<UniformTimeLine> {
        UniformTimeLine::new(0.0, end_time, num_steps)
    }

    /// Injection at the vertex nearest the lower left corner of the mesh bounding box and
    /// production at the vertex nearest the upper right corner.
    ///
    /// The vertices are chosen by their coordinates, so the result does not depend on the
    /// vertex ordering of the mesh.
    pub fn corner_wells(&self, mesh: &TriangleMesh2d) -> eyre::Result<Vec<WellSpec>> {
        let vertices = mesh.vertices();
        let first = vertices
            .first()
            .ok_or_else(|| eyre!("cannot place wells on a mesh without vertices"))?;
        let (min, max) = vertices
            .iter()
            .fold((first.coords, first.coords), |(min, max), v| (min.inf(&v.coords), max.sup(&v.coords)));
        let nearest = |corner: Vector2<f64>| {
            vertices
                .iter()
                .map(|v| (v.coords - corner).norm_squared())
                .enumerate()
                .min_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(index, _)| index)
                .unwrap_or(0)
        };
        Ok(vec![
            WellSpec::injection(nearest(min), self.water().injection_rate),
            WellSpec::production(nearest(max), self.oil().production_rate),
        ])
    }

    pub fn initial_porosity(&self, num_cells: usize) -> DVector<f64> {
        DVector::repeat(num_cells, self.rock().porosity)
    }
}
