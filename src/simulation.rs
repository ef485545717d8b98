//! Time stepping of the coupled water-flooding problem.
use crate::coefficient::CoefficientEvaluator;
use crate::function::DiscreteFunction;
use crate::mesh::TriangleMesh2d;
use crate::model::{WaterFloodingModel, WellSpec};
use crate::quadrature::{self, Quadrature, TriangleQuadrature};
use crate::solver::{DenseLuSolver, LinearSolver};
use crate::state::{FieldSnapshot, SolverState};
use crate::system::{assemble_coupled_system, AssemblyContext, CoupledSystem, FieldSpaces, WellSources};
use crate::timeline::UniformTimeLine;
use eyre::{eyre, WrapErr};
use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

/// Settings of the fixed-point (Picard) iteration within each time step.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PicardSettings {
    /// Maximum number of linearized solves per time step. A value of 1 gives a single
    /// linearization around the previous time level.
    pub max_iterations: usize,
    /// Tolerance on the relative change $\|x_{k+1} - x_k\| / \|x_{k+1}\|$ of the unknowns.
    pub tolerance: f64,
    /// Accept the last iterate instead of failing when the iteration does not converge.
    pub accept_unconverged: bool,
}

impl Default for PicardSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 1e-8,
            accept_unconverged: false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Strength of the triangle quadrature used for all cell integrals.
    pub quadrature_strength: usize,
    /// Artificial diffusion coefficient of the saturation equation.
    pub stabilization: f64,
    /// Lower bound for the total mobility.
    pub mobility_floor: f64,
    pub picard: PicardSettings,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            quadrature_strength: 2,
            stabilization: 1e-3,
            mobility_floor: 1e-12,
            picard: PicardSettings::default(),
        }
    }
}

impl SolverSettings {
    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        serde_json::from_str(json).wrap_err("failed to parse solver settings")
    }
}

#[derive(Debug)]
pub enum PicardError {
    /// The iteration did not reach the tolerance within the maximum number of iterations.
    MaximumIterationsReached { iterations: usize, relative_change: f64 },
    /// Assembling the linearized system failed.
    Assembly(eyre::Report),
    /// Solving the linearized system failed.
    LinearSolve(eyre::Report),
}

impl Display for PicardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PicardError::MaximumIterationsReached {
                iterations,
                relative_change,
            } => write!(
                f,
                "Failed to converge within maximum number of iterations ({}), last relative change {:e}.",
                iterations, relative_change
            ),
            PicardError::Assembly(err) => write!(f, "Failed to assemble linearized system. Error: {:#}", err),
            PicardError::LinearSolve(err) => write!(f, "Failed to solve linearized system. Error: {:#}", err),
        }
    }
}

impl Error for PicardError {}

#[derive(Debug)]
pub enum StepError {
    /// All steps of the time line have already been taken.
    TimeLineExhausted,
    /// The nonlinear iteration of the step failed.
    Picard { step: usize, source: PicardError },
}

impl Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::TimeLineExhausted => write!(f, "The time line is exhausted."),
            StepError::Picard { step, source } => write!(f, "Time step {} failed: {}", step, source),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StepError::TimeLineExhausted => None,
            StepError::Picard { source, .. } => Some(source),
        }
    }
}

/// The phase of the driver within a time step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StepPhase {
    /// Between steps: the current iterate equals the previous time level.
    AtRest,
    /// A linearized system is being assembled or solved.
    Assembling,
    /// A solution has been obtained but not yet committed.
    Solved,
}

/// Summary of a completed time step.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StepReport {
    /// Index of the completed step, starting at 1.
    pub step: usize,
    pub time: f64,
    pub iterations: usize,
    pub relative_change: f64,
}

/// Drives the coupled problem across a uniform time line.
pub struct WaterFloodingSolver {
    model: WaterFloodingModel,
    spaces: FieldSpaces,
    quadrature: TriangleQuadrature,
    settings: SolverSettings,
    wells: Vec<WellSpec>,
    timeline: UniformTimeLine,
    state: SolverState,
    phase: StepPhase,
    linear_solver: Box<dyn LinearSolver>,
}

impl fmt::Debug for WaterFloodingSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaterFloodingSolver")
            .field("settings", &self.settings)
            .field("wells", &self.wells)
            .field("timeline", &self.timeline)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl WaterFloodingSolver {
    /// Creates a solver at the rest state of the model with the given wells and a dense LU
    /// linear solver.
    ///
    /// Fails if a well refers to a vertex outside the mesh or has a negative rate.
    pub fn new(
        model: WaterFloodingModel,
        mesh: Arc<TriangleMesh2d>,
        wells: Vec<WellSpec>,
        timeline: UniformTimeLine,
        settings: SolverSettings,
    ) -> eyre::Result<Self> {
        if settings.picard.max_iterations == 0 {
            return Err(eyre!("the Picard iteration needs at least one iteration per step"));
        }
        if !(settings.mobility_floor > 0.0) {
            return Err(eyre!("mobility floor must be positive, got {}", settings.mobility_floor));
        }
        let quadrature = quadrature::triangle(settings.quadrature_strength)?;
        WellSources::from_well_specs(&wells, mesh.num_vertices(), |_| 0.0)?;
        let spaces = FieldSpaces::new(mesh);
        let state = SolverState::new(FieldSnapshot::initial(&model, &spaces.layout()));
        Ok(Self {
            model,
            spaces,
            quadrature,
            settings,
            wells,
            timeline,
            state,
            phase: StepPhase::AtRest,
            linear_solver: Box::new(DenseLuSolver),
        })
    }

    /// Replaces the wells.
    pub fn with_wells(mut self, wells: Vec<WellSpec>) -> eyre::Result<Self> {
        // Validates the well list against the mesh
        WellSources::from_well_specs(&wells, self.spaces.mesh().num_vertices(), |_| 0.0)?;
        self.wells = wells;
        Ok(self)
    }

    pub fn with_linear_solver(mut self, solver: impl LinearSolver + 'static) -> Self {
        self.linear_solver = Box::new(solver);
        self
    }

    /// Replaces the initial state. Only permitted before the first step.
    pub fn with_initial_state(mut self, initial: FieldSnapshot) -> eyre::Result<Self> {
        if self.timeline.current() != 0 {
            return Err(eyre!("the initial state can only be set before the first step"));
        }
        let layout = self.spaces.layout();
        if initial.stacked_unknowns().len() != layout.total_size()
            || initial.porosity.len() != layout.num_pressure_dofs()
        {
            return Err(eyre!("initial state does not match the function spaces of the solver"));
        }
        self.state = SolverState::new(initial);
        Ok(self)
    }

    pub fn model(&self) -> &WaterFloodingModel {
        &self.model
    }

    pub fn spaces(&self) -> &FieldSpaces {
        &self.spaces
    }

    pub fn quadrature(&self) -> &TriangleQuadrature {
        &self.quadrature
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn wells(&self) -> &[WellSpec] {
        &self.wells
    }

    pub fn timeline(&self) -> &UniformTimeLine {
        &self.timeline
    }

    pub fn state(&self) -> &SolverState {
        &self.state
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    fn coefficient_evaluator(&self) -> CoefficientEvaluator {
        CoefficientEvaluator::new(
            &self.model,
            self.spaces.scalar(),
            &self.quadrature,
            self.settings.mobility_floor,
        )
    }

    /// Assembles the coupled system linearized around the current iterate.
    pub fn assemble_system(&self) -> eyre::Result<CoupledSystem> {
        let context = AssemblyContext {
            spaces: &self.spaces,
            model: &self.model,
            quadrature: &self.quadrature,
            coefficients: self.coefficient_evaluator(),
            previous: self.state.previous(),
            current: self.state.current(),
            wells: &self.wells,
            dt: self.timeline.current_time_step_length(),
            stabilization: self.settings.stabilization,
        };
        assemble_coupled_system(&context)
    }

    /// Advances the solution by one time step.
    ///
    /// On failure the current iterate is reset to the previous time level and the time line does
    /// not advance.
    pub fn step(&mut self) -> Result<StepReport, StepError> {
        if self.timeline.stop() {
            return Err(StepError::TimeLineExhausted);
        }
        let step = self.timeline.current() + 1;

        match self.picard_iterate() {
            Ok((iterations, relative_change)) => {
                let solved = self.state.current().clone();
                self.state.commit(solved);
                self.timeline.advance();
                self.phase = StepPhase::AtRest;
                let report = StepReport {
                    step,
                    time: self.timeline.current_time(),
                    iterations,
                    relative_change,
                };
                info!(
                    "Completed time step {}/{} (t = {}) in {} iteration(s), relative change {:e}",
                    step,
                    self.timeline.num_steps(),
                    report.time,
                    iterations,
                    relative_change
                );
                Ok(report)
            }
            Err(source) => {
                self.state.reset_current();
                self.phase = StepPhase::AtRest;
                Err(StepError::Picard { step, source })
            }
        }
    }

    /// Takes all remaining steps of the time line and returns the final state.
    pub fn run(&mut self) -> Result<&FieldSnapshot, StepError> {
        while !self.timeline.stop() {
            self.step()?;
        }
        Ok(self.state.previous())
    }

    fn picard_iterate(&mut self) -> Result<(usize, f64), PicardError> {
        let PicardSettings {
            max_iterations,
            tolerance,
            accept_unconverged,
        } = self.settings.picard;
        let layout = self.spaces.layout();

        self.state.reset_current();
        let mut relative_change = f64::INFINITY;
        for iteration in 1..=max_iterations {
            self.phase = StepPhase::Assembling;
            let system = self.assemble_system().map_err(PicardError::Assembly)?;
            let solution = self
                .linear_solver
                .solve(system.matrix(), system.rhs())
                .map_err(PicardError::LinearSolve)?;

            let old = self.state.current().stacked_unknowns();
            relative_change = (&solution - &old).norm() / solution.norm().max(f64::MIN_POSITIVE);

            let mut next = self.state.current().with_stacked_unknowns(&layout, &solution);
            next.porosity = update_porosity(&self.spaces, &self.model, self.state.previous(), &next);
            self.state.set_current(next);
            self.phase = StepPhase::Solved;

            debug!("Picard iteration {}: relative change {:e}", iteration, relative_change);
            if relative_change <= tolerance {
                return Ok((iteration, relative_change));
            }
        }

        if accept_unconverged {
            warn!(
                "Picard iteration did not converge within {} iteration(s) (relative change {:e}), \
                 accepting last iterate",
                max_iterations, relative_change
            );
            Ok((max_iterations, relative_change))
        } else {
            Err(PicardError::MaximumIterationsReached {
                iterations: max_iterations,
                relative_change,
            })
        }
    }

    /// The volume of water $\int_\Omega \phi S_w \, dx$ for the given porosity and saturation.
    pub fn water_in_place(&self, porosity: &DVector<f64>, saturation: &DVector<f64>) -> f64 {
        water_in_place(&self.spaces, &self.quadrature, porosity, saturation)
    }

    /// The net rate $\int_\Omega f_w \, dx$ at which the wells add water, with the production
    /// weighted by the fractional flow at the previous time level.
    pub fn water_source_volume_rate(&self) -> eyre::Result<f64> {
        let evaluator = self.coefficient_evaluator();
        let saturation = &self.state.previous().saturation;
        let sources = WellSources::from_well_specs(&self.wells, saturation.len(), |node| {
            evaluator.water_fractional_flow_at(saturation[node])
        })?;
        let values = sources.water_at_quadrature_points(&self.spaces, &self.quadrature);
        Ok(integrate_cellwise(&self.spaces, &self.quadrature, |q, cell| values[(q, cell)]))
    }
}

/// The volume of water $\int_\Omega \phi S_w \, dx$ for a piecewise constant porosity and a
/// continuous linear saturation.
pub fn water_in_place(
    spaces: &FieldSpaces,
    quadrature: &TriangleQuadrature,
    porosity: &DVector<f64>,
    saturation: &DVector<f64>,
) -> f64 {
    let s = DiscreteFunction::new(spaces.scalar(), saturation).values_at_quadrature_points(quadrature);
    integrate_cellwise(spaces, quadrature, |q, cell| porosity[cell] * s[(q, cell)])
}

fn integrate_cellwise(
    spaces: &FieldSpaces,
    quadrature: &TriangleQuadrature,
    integrand: impl Fn(usize, usize) -> f64,
) -> f64 {
    let mesh = spaces.mesh();
    (0..mesh.num_cells())
        .map(|cell| {
            let integral: f64 = quadrature
                .weights()
                .iter()
                .enumerate()
                .map(|(q, w)| w * integrand(q, cell))
                .sum();
            integral * mesh.cell_measure(cell)
        })
        .sum()
}

/// Porosity after a change of the volumetric strain and the pore pressure,
/// $\phi = \phi_{n} + (b - \phi_{n}) (\Delta \varepsilon_v + \Delta p / K_s)$, clamped to $[0, 1]$.
pub fn update_porosity(
    spaces: &FieldSpaces,
    model: &WaterFloodingModel,
    previous: &FieldSnapshot,
    next: &FieldSnapshot,
) -> DVector<f64> {
    let mesh = spaces.mesh();
    let rock = model.rock();
    let du = [
        &next.displacement_component(0) - &previous.displacement_component(0),
        &next.displacement_component(1) - &previous.displacement_component(1),
    ];

    DVector::from_fn(mesh.num_cells(), |cell, _| {
        let grad_lambda = mesh.grad_lambda(cell);
        let volumetric_strain: f64 = mesh.connectivity()[cell]
            .iter()
            .zip(grad_lambda.iter())
            .map(|(&vertex, gradient)| du[0][vertex] * gradient.x + du[1][vertex] * gradient.y)
            .sum();
        let dp = next.pressure[cell] - previous.pressure[cell];
        let phi = previous.porosity[cell];
        let updated = phi + (rock.biot - phi) * (volumetric_strain + dp / rock.solid_grain_stiffness);
        updated.clamp(0.0, 1.0)
    })
}
