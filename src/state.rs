//! Field values at the previous time level and the current iterate.
use crate::model::WaterFloodingModel;
use crate::system::SystemLayout;
use nalgebra::{DVector, DVectorView};
use serde::{Deserialize, Serialize};

/// The coefficient vectors of all fields at one instant.
///
/// The displacement stores its two components in consecutive blocks, `[u_0 | u_1]`, each with one
/// entry per vertex. The porosity has one value per cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub velocity: DVector<f64>,
    pub pressure: DVector<f64>,
    pub saturation: DVector<f64>,
    pub displacement: DVector<f64>,
    pub porosity: DVector<f64>,
}

impl FieldSnapshot {
    /// The rest state of the model: zero flux and displacement, uniform pressure, saturation
    /// and porosity.
    pub fn initial(model: &WaterFloodingModel, layout: &SystemLayout) -> Self {
        Self {
            velocity: DVector::zeros(layout.num_velocity_dofs()),
            pressure: DVector::repeat(layout.num_pressure_dofs(), model.rock().initial_pressure),
            saturation: DVector::repeat(layout.num_saturation_dofs(), model.water().initial_saturation),
            displacement: DVector::zeros(2 * layout.num_displacement_dofs()),
            porosity: model.initial_porosity(layout.num_pressure_dofs()),
        }
    }

    pub fn displacement_component(&self, component: usize) -> DVectorView<f64> {
        assert!(component < 2, "Displacement component out of bounds");
        let n = self.displacement.len() / 2;
        self.displacement.rows(component * n, n)
    }

    /// The unknowns of the coupled system stacked as `[v, p, s, u_0, u_1]`.
    pub fn stacked_unknowns(&self) -> DVector<f64> {
        let values: Vec<f64> = self
            .velocity
            .iter()
            .chain(self.pressure.iter())
            .chain(self.saturation.iter())
            .chain(self.displacement.iter())
            .copied()
            .collect();
        DVector::from_vec(values)
    }

    /// Replaces the unknowns of the coupled system by those of a stacked solution vector,
    /// keeping the porosity.
    pub fn with_stacked_unknowns(&self, layout: &SystemLayout, solution: &DVector<f64>) -> Self {
        assert_eq!(solution.len(), layout.total_size(), "Solution vector does not match the system layout");
        let range = |block| {
            let (offset, size) = layout.block_range(block);
            solution.rows(offset, size).clone_owned()
        };
        let (u_offset, u_size) = layout.block_range(3);
        Self {
            velocity: range(0),
            pressure: range(1),
            saturation: range(2),
            displacement: solution.rows(u_offset, 2 * u_size).clone_owned(),
            porosity: self.porosity.clone(),
        }
    }
}

/// The state of the nonlinear time-stepping: a read-only snapshot of the previous time level
/// and the current iterate.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    previous: FieldSnapshot,
    current: FieldSnapshot,
}

impl SolverState {
    pub fn new(initial: FieldSnapshot) -> Self {
        Self {
            previous: initial.clone(),
            current: initial,
        }
    }

    pub fn previous(&self) -> &FieldSnapshot {
        &self.previous
    }

    pub fn current(&self) -> &FieldSnapshot {
        &self.current
    }

    /// Replaces the current iterate.
    pub fn set_current(&mut self, current: FieldSnapshot) {
        self.current = current;
    }

    /// Restarts the iteration from the previous time level.
    pub fn reset_current(&mut self) {
        self.current = self.previous.clone();
    }

    /// Makes the solved snapshot the new previous time level.
    ///
    /// Both snapshots hold exactly the solved values afterwards.
    pub fn commit(&mut self, solved: FieldSnapshot) {
        self.previous = solved.clone();
        self.current = solved;
    }
}
