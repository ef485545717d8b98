//! Basic procedural mesh generation routines.
use crate::connectivity::Tri3d2Connectivity;
use crate::mesh::TriangleMesh2d;
use eyre::eyre;
use nalgebra::Point2;

pub fn create_unit_square_uniform_tri_mesh_2d(cells_per_dim: usize) -> eyre::Result<TriangleMesh2d> {
    create_rectangular_uniform_tri_mesh_2d([0.0, 1.0, 0.0, 1.0], cells_per_dim, cells_per_dim)
}

/// Generates an axis-aligned rectangular uniform triangle mesh.
///
/// The domain is given as `[x_min, x_max, y_min, y_max]`. The rectangle is divided into
/// `nx` by `ny` quadrilaterals, each of which is split into two counter-clockwise triangles.
///
/// Vertices are numbered row by row starting from `(x_min, y_min)`, so that vertex `0` is the
/// lower-left corner and the last vertex is the upper-right corner.
pub fn create_rectangular_uniform_tri_mesh_2d(
    domain: [f64; 4],
    nx: usize,
    ny: usize,
) -> eyre::Result<TriangleMesh2d> {
    let [x_min, x_max, y_min, y_max] = domain;
    if nx == 0 || ny == 0 {
        return Err(eyre!("number of cells must be positive, got nx = {}, ny = {}", nx, ny));
    }
    if !(x_max > x_min && y_max > y_min) {
        return Err(eyre!("domain {:?} has non-positive extents", domain));
    }

    let hx = (x_max - x_min) / nx as f64;
    let hy = (y_max - y_min) / ny as f64;
    let to_global_vertex_index = |i, j| (nx + 1) * j + i;

    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push(Point2::new(x_min + i as f64 * hx, y_min + j as f64 * hy));
        }
    }

    let mut cells = Vec::with_capacity(2 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let v00 = to_global_vertex_index(i, j);
            let v10 = to_global_vertex_index(i + 1, j);
            let v11 = to_global_vertex_index(i + 1, j + 1);
            let v01 = to_global_vertex_index(i, j + 1);
            cells.push(Tri3d2Connectivity([v10, v11, v00]));
            cells.push(Tri3d2Connectivity([v01, v00, v11]));
        }
    }

    TriangleMesh2d::try_from_vertices_and_connectivity(vertices, cells)
}
