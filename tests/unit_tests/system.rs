use crate::unit_square_mesh;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use poroflow::assembly::face::assemble_divergence_coupling;
use poroflow::coefficient::CoefficientEvaluator;
use poroflow::model::{WaterFloodingModel, WellSpec};
use poroflow::quadrature::{triangle, TriangleQuadrature};
use poroflow::state::FieldSnapshot;
use poroflow::system::{
    assemble_coupled_system, assemble_displacement_blocks, assemble_pressure_blocks,
    assemble_pressure_displacement_coupling, assemble_saturation_blocks, assemble_velocity_blocks,
    boundary_constraints, is_structurally_present, AssemblyContext, BlockMatrix, CoupledBlocks, CoupledSystem,
    EssentialConstraint, Field, FieldSpaces, SystemLayout, WellSources,
};

const DT: f64 = 10.0;
const STABILIZATION: f64 = 1e-3;

struct Fixture {
    model: WaterFloodingModel,
    spaces: FieldSpaces,
    quadrature: TriangleQuadrature,
    initial: FieldSnapshot,
    wells: Vec<WellSpec>,
}

impl Fixture {
    fn new(cells_per_dim: usize) -> Self {
        let model = WaterFloodingModel::default();
        let spaces = FieldSpaces::new(unit_square_mesh(cells_per_dim));
        let initial = FieldSnapshot::initial(&model, &spaces.layout());
        let wells = model.corner_wells(spaces.mesh()).unwrap();
        Self {
            model,
            spaces,
            quadrature: triangle(2).unwrap(),
            initial,
            wells,
        }
    }

    fn context<'a>(&'a self, previous: &'a FieldSnapshot, current: &'a FieldSnapshot) -> AssemblyContext<'a> {
        AssemblyContext {
            spaces: &self.spaces,
            model: &self.model,
            quadrature: &self.quadrature,
            coefficients: CoefficientEvaluator::new(&self.model, self.spaces.scalar(), &self.quadrature, 1e-12),
            previous,
            current,
            wells: &self.wells,
            dt: DT,
            stabilization: STABILIZATION,
        }
    }
}

fn dense(matrix: &CsrMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from(matrix)
}

#[test]
fn layout_offsets_follow_block_order() {
    let fixture = Fixture::new(2);
    let layout = fixture.spaces.layout();
    let mesh = fixture.spaces.mesh();
    assert_eq!(layout.num_velocity_dofs(), mesh.num_faces());
    assert_eq!(layout.num_pressure_dofs(), mesh.num_cells());
    assert_eq!(layout.num_saturation_dofs(), mesh.num_vertices());
    assert_eq!(layout.num_displacement_dofs(), mesh.num_vertices());
    assert_eq!(layout.total_size(), 16 + 8 + 3 * 9);
    assert_eq!(layout.block_range(Field::Saturation.index()), (24, 9));
    assert_eq!(layout.block_range(Field::Displacement1.index()), (42, 9));
}

#[test]
fn block_structure() {
    use Field::*;
    assert!(is_structurally_present(Velocity, Velocity));
    assert!(is_structurally_present(Saturation, Displacement1));
    assert!(!is_structurally_present(Velocity, Saturation));
    assert!(!is_structurally_present(Velocity, Displacement0));
    assert!(!is_structurally_present(Pressure, Saturation));
    assert!(!is_structurally_present(Displacement0, Velocity));
    assert!(!is_structurally_present(Displacement1, Saturation));

    let count = Field::ALL
        .iter()
        .flat_map(|&eq| Field::ALL.iter().map(move |&unknown| (eq, unknown)))
        .filter(|&(eq, unknown)| is_structurally_present(eq, unknown))
        .count();
    assert_eq!(count, 18);
}

#[test]
fn block_matrix_rejects_absent_blocks_and_shape_mismatches() {
    let layout = SystemLayout::new(2, 1, 1, 1);
    let mut blocks = BlockMatrix::new(layout);

    assert!(blocks
        .set(Field::Velocity, Field::Saturation, CsrMatrix::zeros(2, 1))
        .is_err());
    assert!(blocks.get(Field::Velocity, Field::Saturation).is_none());

    assert!(blocks.set(Field::Velocity, Field::Pressure, CsrMatrix::zeros(1, 2)).is_err());
    assert!(blocks.set(Field::Velocity, Field::Pressure, CsrMatrix::zeros(2, 1)).is_ok());
    assert!(blocks.get(Field::Velocity, Field::Pressure).is_some());
}

#[test]
fn essential_constraints_replace_rows() {
    use Field::*;
    let layout = SystemLayout::new(2, 1, 1, 1);
    let mut blocks = BlockMatrix::new(layout);
    let block = |rows, cols, values: &[f64]| CsrMatrix::from(&DMatrix::from_row_slice(rows, cols, values));
    blocks.set(Velocity, Velocity, block(2, 2, &[0.0, 1.0, 1.0, 4.0])).unwrap();
    blocks.set(Velocity, Pressure, block(2, 1, &[1.0, 1.0])).unwrap();
    blocks.set(Pressure, Velocity, block(1, 2, &[3.0, -1.0])).unwrap();
    blocks.set(Pressure, Pressure, block(1, 1, &[5.0])).unwrap();

    let constraints = [
        EssentialConstraint::new(Velocity, 0, 2.0),
        // No saturation block, so the unit scale is used
        EssentialConstraint::new(Saturation, 0, 7.0),
    ];
    let rhs = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let system = CoupledSystem::from_block_matrix(&blocks, rhs, &constraints).unwrap();

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(6, 6, &[
        4.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        1.0, 4.0, 1.0, 0.0, 0.0, 0.0,
        3.0, -1.0, 5.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    ]);
    assert_matrix_eq!(dense(system.matrix()), expected);
    assert_eq!(system.rhs(), &DVector::from_vec(vec![8.0, 2.0, 3.0, 7.0, 5.0, 6.0]));

    let solution = DVector::from_fn(6, |i, _| i as f64);
    let [v, p, s, u0, u1] = system.split_solution(&solution);
    assert_eq!(v.as_slice(), &[0.0, 1.0]);
    assert_eq!(p.as_slice(), &[2.0]);
    assert_eq!(s.as_slice(), &[3.0]);
    assert_eq!(u0.as_slice(), &[4.0]);
    assert_eq!(u1.as_slice(), &[5.0]);

    let out_of_bounds = [EssentialConstraint::new(Pressure, 1, 0.0)];
    assert!(CoupledSystem::from_block_matrix(&blocks, DVector::zeros(6), &out_of_bounds).is_err());
}

#[test]
fn velocity_blocks() {
    let fixture = Fixture::new(2);
    let initial = &fixture.initial;
    let context = fixture.context(initial, initial);
    let blocks = assemble_velocity_blocks(&context).unwrap();

    let b = assemble_divergence_coupling(fixture.spaces.velocity(), fixture.spaces.pressure()).unwrap();
    assert_matrix_eq!(dense(&blocks.vp), -dense(&b));
    let v = dense(&blocks.v);
    assert_matrix_eq!(v, v.transpose(), comp = abs, tol = 1e-12);
    assert!(v.diagonal().iter().all(|&d| d > 0.0));
    assert_eq!(blocks.rhs, DVector::zeros(fixture.spaces.mesh().num_faces()));
}

#[test]
fn pressure_blocks() {
    let fixture = Fixture::new(2);
    let initial = &fixture.initial;
    let context = fixture.context(initial, initial);
    let no_sources = WellSources::from_well_specs(&[], fixture.spaces.mesh().num_vertices(), |_| 0.0).unwrap();
    let blocks = assemble_pressure_blocks(&context, &no_sources).unwrap();
    let mesh = fixture.spaces.mesh();

    let b = assemble_divergence_coupling(fixture.spaces.velocity(), fixture.spaces.pressure()).unwrap();
    assert_matrix_eq!(dense(&blocks.pv), DT * dense(&b).transpose(), comp = abs, tol = 1e-12);

    let rock = fixture.model.rock();
    let c_p = (rock.biot - rock.porosity) / rock.solid_grain_stiffness
        + rock.porosity * fixture.model.oil().compressibility;
    let p = dense(&blocks.p);
    assert_eq!(blocks.p.nnz(), mesh.num_cells());
    for cell in 0..mesh.num_cells() {
        assert_scalar_eq!(p[(cell, cell)], c_p * mesh.cell_measure(cell), comp = abs, tol = 1e-14);
    }

    // Without sources and displacement the right-hand side is P p_prev
    let expected_rhs = &blocks.p * &initial.pressure;
    assert_matrix_eq!(blocks.rhs, expected_rhs, comp = abs, tol = 1e-14);

    let pu = assemble_pressure_displacement_coupling(&fixture.spaces, &fixture.quadrature, rock.biot).unwrap();
    assert_eq!(blocks.pu, pu);
}

#[test]
fn pressure_rhs_includes_time_step_weighted_sources() {
    let fixture = Fixture::new(2);
    let initial = &fixture.initial;
    let context = fixture.context(initial, initial);
    let sources = WellSources::from_wells(&context).unwrap();
    let blocks = assemble_pressure_blocks(&context, &sources).unwrap();

    // The injection and production rates nearly cancel, and each source integrates to
    // its rate times the integral of the vertex basis function
    let source_total: f64 = (&blocks.rhs - &blocks.p * &initial.pressure).sum();
    let mesh = fixture.spaces.mesh();
    let corner_basis_integral = 2.0 * mesh.cell_measure(0) / 3.0;
    let expected = DT * corner_basis_integral * (3.51e-6 - 3.50e-6);
    assert_scalar_eq!(source_total, expected, comp = abs, tol = 1e-15);
}

#[test]
fn saturation_blocks_at_zero_saturation() {
    let fixture = Fixture::new(2);
    let initial = &fixture.initial;
    let context = fixture.context(initial, initial);
    let sources = WellSources::from_wells(&context).unwrap();
    let blocks = assemble_saturation_blocks(&context, &sources).unwrap();
    let layout = fixture.spaces.layout();

    // Both couplings carry the saturation as a factor
    assert!(blocks.sp.values().iter().all(|&x| x == 0.0));
    assert!(blocks.su.iter().all(|su| su.values().iter().all(|&x| x == 0.0)));
    assert_eq!(
        (blocks.sv.nrows(), blocks.sv.ncols()),
        (layout.num_saturation_dofs(), layout.num_velocity_dofs())
    );

    let s = dense(&blocks.s);
    assert_matrix_eq!(s, s.transpose(), comp = abs, tol = 1e-14);
    // Columns of the stiffness part sum to zero, so the column sums are the porosity-weighted
    // integrals of the basis functions
    let porosity_volume: f64 = s.sum();
    assert_scalar_eq!(porosity_volume, fixture.model.rock().porosity, comp = abs, tol = 1e-12);

    // The advection term is orthogonal to constant test functions
    let sv_column_sums = dense(&blocks.sv).row_sum();
    assert_scalar_eq!(sv_column_sums.norm(), 0.0, comp = abs, tol = 1e-10);
}

#[test]
fn saturation_pressure_coupling_follows_current_iterate() {
    let fixture = Fixture::new(2);
    let previous = &fixture.initial;
    let mut current = previous.clone();
    current.saturation.fill(0.5);
    let context = fixture.context(previous, &current);
    let sources = WellSources::from_wells(&context).unwrap();
    let blocks = assemble_saturation_blocks(&context, &sources).unwrap();

    let rock = fixture.model.rock();
    let c_sp = ((rock.biot - rock.porosity) / rock.solid_grain_stiffness
        + rock.porosity * fixture.model.water().compressibility)
        * 0.5;
    // Column sums of the mixed mass matrix are c |K|
    let sp_column_sums = dense(&blocks.sp).row_sum();
    for cell in 0..fixture.spaces.mesh().num_cells() {
        let expected = c_sp * fixture.spaces.mesh().cell_measure(cell);
        assert_scalar_eq!(sp_column_sums[cell], expected, comp = abs, tol = 1e-14);
    }
}

#[test]
fn velocity_flux_coefficient_follows_current_iterate() {
    let fixture = Fixture::new(2);
    let previous = &fixture.initial;
    let mut current = previous.clone();
    current.saturation.fill(0.5);

    let lagged = assemble_velocity_blocks(&fixture.context(previous, previous)).unwrap();
    let updated = assemble_velocity_blocks(&fixture.context(previous, &current)).unwrap();

    // The total mobility differs between S = 0 and S = 0.5, so V must change with the iterate
    let (v_lagged, v_updated) = (dense(&lagged.v), dense(&updated.v));
    assert!((&v_updated - &v_lagged).norm() > 1e-3 * v_lagged.norm());
    assert_eq!(dense(&updated.vp), dense(&lagged.vp));
}

#[test]
fn fractional_flow_terms_stay_at_previous_time_level() {
    let fixture = Fixture::new(2);
    let previous = &fixture.initial;
    let mut current = previous.clone();
    current.saturation.fill(0.5);
    let lagged_context = fixture.context(previous, previous);
    let updated_context = fixture.context(previous, &current);

    let lagged_sources = WellSources::from_wells(&lagged_context).unwrap();
    let updated_sources = WellSources::from_wells(&updated_context).unwrap();
    assert_eq!(updated_sources, lagged_sources);

    // Production at S = 0 still withdraws water, since the water curve does not vanish there
    let production = fixture.wells[1].node;
    let f_w = updated_context.coefficients.water_fractional_flow_at(0.0);
    assert!(f_w > 0.0);
    assert_eq!(updated_sources.water[production], -fixture.model.oil().production_rate * f_w);

    let lagged = assemble_saturation_blocks(&lagged_context, &lagged_sources).unwrap();
    let updated = assemble_saturation_blocks(&updated_context, &updated_sources).unwrap();
    assert_eq!(dense(&updated.sv), dense(&lagged.sv));
    assert_eq!(dense(&updated.s), dense(&lagged.s));
    assert!(dense(&updated.sp).norm() > 0.0);
    assert!(dense(&lagged.sp).norm() == 0.0);
}

#[test]
fn displacement_blocks() {
    let fixture = Fixture::new(2);
    let initial = &fixture.initial;
    let context = fixture.context(initial, initial);
    let blocks = assemble_displacement_blocks(&context).unwrap();
    let rock = fixture.model.rock();

    let pu = assemble_pressure_displacement_coupling(&fixture.spaces, &fixture.quadrature, rock.biot).unwrap();
    for a in 0..2 {
        assert_matrix_eq!(dense(&blocks.up[a]), -dense(&pu[a]).transpose());
        let p_init = DVector::repeat(fixture.spaces.mesh().num_cells(), rock.initial_pressure);
        assert_matrix_eq!(blocks.rhs[a], &blocks.up[a] * &p_init, comp = abs, tol = 1e-12);
    }
    assert_matrix_eq!(dense(&blocks.u[0][1]), dense(&blocks.u[1][0]).transpose(), comp = abs, tol = 1e-4);
}

#[test]
fn wells_become_nodal_sources() {
    let wells = [WellSpec::injection(0, 2.0), WellSpec::production(3, 1.0), WellSpec::production(3, 0.5)];
    let sources = WellSources::from_well_specs(&wells, 4, |_| 0.25).unwrap();
    assert_eq!(sources.total.as_slice(), &[2.0, 0.0, 0.0, -1.5]);
    assert_eq!(sources.water.as_slice(), &[2.0, 0.0, 0.0, -0.375]);

    assert!(WellSources::from_well_specs(&[WellSpec::injection(4, 1.0)], 4, |_| 0.0).is_err());
    assert!(WellSources::from_well_specs(&[WellSpec::injection(0, -1.0)], 4, |_| 0.0).is_err());
    assert!(WellSources::from_well_specs(&[WellSpec::production(0, f64::NAN)], 4, |_| 0.0).is_err());
}

#[test]
fn boundary_constraints_cover_boundary_faces_and_vertices() {
    let fixture = Fixture::new(3);
    let mesh = fixture.spaces.mesh();
    let constraints = boundary_constraints(&fixture.spaces, &fixture.model);
    let count = |field| constraints.iter().filter(|c| c.field == field).count();
    assert_eq!(count(Field::Velocity), mesh.boundary_faces().len());
    assert_eq!(count(Field::Displacement0), mesh.boundary_vertices().len());
    assert_eq!(count(Field::Displacement1), mesh.boundary_vertices().len());
    assert_eq!(count(Field::Pressure) + count(Field::Saturation), 0);
}

#[test]
fn coupled_system_composition() {
    let fixture = Fixture::new(2);
    let initial = &fixture.initial;
    let context = fixture.context(initial, initial);
    let layout = fixture.spaces.layout();

    let sources = WellSources::from_wells(&context).unwrap();
    let blocks = CoupledBlocks {
        velocity: assemble_velocity_blocks(&context).unwrap(),
        pressure: assemble_pressure_blocks(&context, &sources).unwrap(),
        saturation: assemble_saturation_blocks(&context, &sources).unwrap(),
        displacement: assemble_displacement_blocks(&context).unwrap(),
    };
    let (block_matrix, _) = blocks.clone().into_block_system(layout).unwrap();
    for equation in Field::ALL {
        for unknown in Field::ALL {
            assert_eq!(
                block_matrix.get(equation, unknown).is_some(),
                is_structurally_present(equation, unknown)
            );
        }
    }

    let system = assemble_coupled_system(&context).unwrap();
    let composed = CoupledSystem::compose(blocks, layout, &boundary_constraints(&fixture.spaces, &fixture.model)).unwrap();
    assert_eq!(system, composed);

    let n = layout.total_size();
    assert_eq!((system.matrix().nrows(), system.matrix().ncols()), (n, n));
    assert_eq!(system.rhs().len(), n);

    let matrix = dense(system.matrix());
    let mesh = fixture.spaces.mesh();
    for face in mesh.boundary_faces() {
        let row = matrix.row(face);
        assert!(row[face] > 0.0);
        assert_eq!(row.iter().filter(|&&x| x != 0.0).count(), 1);
        assert_eq!(system.rhs()[face], 0.0);
    }
    let u1_offset = layout.block_offset(Field::Displacement1.index());
    for vertex in mesh.boundary_vertices() {
        let row = matrix.row(u1_offset + vertex);
        assert!(row[u1_offset + vertex] > 0.0);
        assert_eq!(row.iter().filter(|&&x| x != 0.0).count(), 1);
    }

    // The unconstrained saturation rows are untouched
    let s_offset = layout.block_offset(Field::Saturation.index());
    let s_block = matrix.view((s_offset, s_offset), (layout.num_saturation_dofs(), layout.num_saturation_dofs()));
    let s_expected = {
        let sources = WellSources::from_wells(&context).unwrap();
        dense(&assemble_saturation_blocks(&context, &sources).unwrap().s)
    };
    assert_matrix_eq!(s_block.clone_owned(), s_expected, comp = abs, tol = 1e-14);
}
