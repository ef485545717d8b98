use eyre::eyre;
use matrixcompare::assert_scalar_eq;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use poroflow::model::WaterFloodingModel;
use poroflow::simulation::{PicardError, PicardSettings, SolverSettings, StepError, StepPhase, WaterFloodingSolver};
use poroflow::solver::LinearSolver;
use poroflow::system::Field;
use std::sync::Arc;

/// Settings for a fixed number of Picard iterations per step, accepting the last iterate.
fn fixed_iteration_settings(iterations: usize) -> SolverSettings {
    SolverSettings {
        picard: PicardSettings {
            max_iterations: iterations,
            tolerance: 1e-6,
            accept_unconverged: true,
        },
        ..Default::default()
    }
}

fn create_solver(cells_per_dim: usize, end_time: f64, num_steps: usize, settings: SolverSettings) -> WaterFloodingSolver {
    let model = WaterFloodingModel::default();
    let mesh = Arc::new(model.space_mesh(cells_per_dim).unwrap());
    let timeline = model.time_mesh(end_time, num_steps).unwrap();
    let wells = model.corner_wells(&mesh).unwrap();
    WaterFloodingSolver::new(model, mesh, wells, timeline, settings).unwrap()
}

#[test]
fn first_step_conserves_water() {
    // With zero initial saturation the compressibility and strain terms of the water balance
    // vanish in the first linearization, leaving storage and sources
    let mut solver = create_solver(4, 100.0, 10, fixed_iteration_settings(1));
    let before = solver.state().previous().clone();
    let rate = solver.water_source_volume_rate().unwrap();
    let dt = solver.timeline().current_time_step_length();
    assert!(rate > 0.0);

    solver.step().unwrap();
    let after = solver.state().previous();

    let stored = solver.water_in_place(&before.porosity, &after.saturation)
        - solver.water_in_place(&before.porosity, &before.saturation);
    assert_scalar_eq!(stored, dt * rate, comp = abs, tol = 1e-5 * dt * rate);
}

#[test]
fn system_has_full_size_and_finite_entries() {
    let solver = create_solver(3, 30.0, 3, SolverSettings::default());
    let system = solver.assemble_system().unwrap();
    let n = solver.spaces().layout().total_size();
    assert_eq!(n, 33 + 18 + 3 * 16);
    assert_eq!((system.matrix().nrows(), system.matrix().ncols()), (n, n));
    assert!(system.matrix().values().iter().all(|x| x.is_finite()));
    assert!(system.rhs().iter().all(|x| x.is_finite()));
}

#[test]
fn multiple_steps_keep_boundary_conditions() {
    let mut solver = create_solver(3, 30.0, 3, fixed_iteration_settings(20));
    let mut reports = Vec::new();
    for _ in 0..3 {
        reports.push(solver.step().unwrap());
    }

    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.step, i + 1);
        assert_scalar_eq!(report.time, 10.0 * (i + 1) as f64, comp = abs, tol = 1e-12);
        assert!(report.iterations >= 1 && report.iterations <= 20);
        assert!(report.relative_change.is_finite());
    }
    assert!(solver.timeline().stop());
    assert_eq!(solver.phase(), StepPhase::AtRest);
    assert_eq!(solver.state().previous(), solver.state().current());

    let state = solver.state().previous();
    assert!(state.stacked_unknowns().iter().all(|x| x.is_finite()));
    assert!(state.porosity.iter().all(|phi| (0.0..=1.0).contains(phi)));

    let mesh = solver.spaces().mesh();
    for face in mesh.boundary_faces() {
        assert!(state.velocity[face].abs() <= 1e-12);
    }
    for axis in 0..2 {
        let u = state.displacement_component(axis);
        for vertex in mesh.boundary_vertices() {
            assert!(u[vertex].abs() <= 1e-12);
        }
    }

    // Water enters at the injection well
    let injection = solver.wells()[0].node;
    assert!(state.saturation[injection] > 0.0);
}

#[test]
fn stepping_past_the_end_fails() {
    let mut solver = create_solver(2, 20.0, 2, fixed_iteration_settings(2));
    solver.run().unwrap();
    assert_eq!(solver.timeline().current(), 2);
    let previous = solver.state().previous().clone();

    assert!(matches!(solver.step(), Err(StepError::TimeLineExhausted)));
    assert_eq!(solver.state().previous(), &previous);
}

#[test]
fn unconverged_step_is_rolled_back() {
    let settings = SolverSettings {
        picard: PicardSettings {
            max_iterations: 1,
            tolerance: 0.0,
            accept_unconverged: false,
        },
        ..Default::default()
    };
    let mut solver = create_solver(2, 20.0, 2, settings);
    let initial = solver.state().previous().clone();

    match solver.step() {
        Err(StepError::Picard {
            step: 1,
            source: PicardError::MaximumIterationsReached { iterations: 1, relative_change },
        }) => assert!(relative_change > 0.0),
        other => panic!("unexpected step result: {:?}", other),
    }
    assert_eq!(solver.phase(), StepPhase::AtRest);
    assert_eq!(solver.timeline().current(), 0);
    assert_eq!(solver.state().previous(), &initial);
    assert_eq!(solver.state().current(), &initial);
}

#[test]
fn unconverged_step_can_be_accepted() {
    let settings = SolverSettings {
        picard: PicardSettings {
            max_iterations: 1,
            tolerance: 0.0,
            accept_unconverged: true,
        },
        ..Default::default()
    };
    let mut solver = create_solver(2, 20.0, 2, settings);
    let report = solver.step().unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(solver.timeline().current(), 1);
}

struct FailingSolver;

impl LinearSolver for FailingSolver {
    fn solve(&self, _matrix: &CsrMatrix<f64>, _rhs: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        Err(eyre!("solver unavailable"))
    }
}

#[test]
fn linear_solver_failure_is_reported() {
    let mut solver = create_solver(2, 20.0, 2, SolverSettings::default()).with_linear_solver(FailingSolver);
    let initial = solver.state().previous().clone();

    let err = solver.step().unwrap_err();
    assert!(matches!(
        err,
        StepError::Picard {
            step: 1,
            source: PicardError::LinearSolve(_)
        }
    ));
    assert!(format!("{}", err).contains("solver unavailable"));
    assert_eq!(solver.state().current(), &initial);
    assert_eq!(solver.timeline().current(), 0);
}

#[test]
fn solution_blocks_follow_field_order() {
    let solver = create_solver(2, 20.0, 2, SolverSettings::default());
    let layout = solver.spaces().layout();
    let system = solver.assemble_system().unwrap();
    let stacked = solver.state().current().stacked_unknowns();
    let [v, p, s, u0, u1] = system.split_solution(&stacked);
    let current = solver.state().current();
    assert_eq!(v, current.velocity);
    assert_eq!(p, current.pressure);
    assert_eq!(s, current.saturation);
    assert_eq!(u0, current.displacement_component(0).clone_owned());
    assert_eq!(u1, current.displacement_component(1).clone_owned());
    assert_eq!(
        layout.block_offset(Field::Displacement1.index()),
        layout.total_size() - layout.num_displacement_dofs()
    );
}
