use crate::connectivity::{Connectivity, Segment2d2Connectivity, Tri3d2Connectivity};
use eyre::eyre;
use nalgebra::{Point2, Vector2, Vector3};
use std::collections::BTreeMap;

pub mod procedural;

/// Sentinel used in `face_to_cell` to mark a face that has not yet been seen from a second cell.
const UNPAIRED: usize = usize::MAX;

/// Index-based conforming triangle mesh in two dimensions, together with its face topology.
///
/// In two dimensions the faces of a cell are its edges, and the two terms are used
/// interchangeably. The face topology is computed once at construction and never changes
/// afterwards, so that degree-of-freedom maps derived from it stay consistent.
///
/// Each face has a *left* cell, the first cell in which it was encountered, and a *right* cell.
/// Faces on the boundary of the domain are self-paired: their left and right cells coincide.
/// The face is stored with the orientation it has in its left cell, and the unit normal of a face
/// always points out of its left cell.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh2d {
    vertices: Vec<Point2<f64>>,
    connectivity: Vec<Tri3d2Connectivity>,
    faces: Vec<Segment2d2Connectivity>,
    face_to_cell: Vec<[usize; 4]>,
    cell_to_face: Vec<[usize; 3]>,
}

impl TriangleMesh2d {
    /// Construct a mesh from vertices and connectivity, building the face topology.
    ///
    /// Fails if a cell references a vertex out of bounds, if a cell is degenerate or if an edge
    /// is shared by more than two cells.
    pub fn try_from_vertices_and_connectivity(
        vertices: Vec<Point2<f64>>,
        connectivity: Vec<Tri3d2Connectivity>,
    ) -> eyre::Result<Self> {
        for (cell_index, cell) in connectivity.iter().enumerate() {
            if let Some(&v) = cell.iter().find(|&&v| v >= vertices.len()) {
                return Err(eyre!(
                    "cell {} references vertex {} but the mesh only has {} vertices",
                    cell_index,
                    v,
                    vertices.len()
                ));
            }
        }

        let mut faces = Vec::new();
        let mut face_to_cell: Vec<[usize; 4]> = Vec::new();
        let mut cell_to_face = Vec::with_capacity(connectivity.len());

        // Use a BTreeMap so that face numbering does not depend on hashing
        let mut face_lookup = BTreeMap::new();
        for (cell_index, cell) in connectivity.iter().enumerate() {
            let mut cell_faces = [0; 3];
            for local_index in 0..cell.num_faces() {
                let face = cell
                    .get_face_connectivity(local_index)
                    .ok_or_else(|| eyre!("triangle has no local face {}", local_index))?;
                let face_index = *face_lookup.entry(face.sorted()).or_insert_with(|| {
                    faces.push(face);
                    face_to_cell.push([cell_index, UNPAIRED, local_index, UNPAIRED]);
                    faces.len() - 1
                });

                let entry = &mut face_to_cell[face_index];
                if entry[0] != cell_index {
                    if entry[1] != UNPAIRED {
                        return Err(eyre!(
                            "edge {:?} is shared by more than two cells (cells {}, {} and {})",
                            face.sorted().0,
                            entry[0],
                            entry[1],
                            cell_index
                        ));
                    }
                    entry[1] = cell_index;
                    entry[3] = local_index;
                }
                cell_faces[local_index] = face_index;
            }
            cell_to_face.push(cell_faces);
        }

        // Faces seen from only one cell are boundary faces, which we encode as self-paired
        for entry in &mut face_to_cell {
            if entry[1] == UNPAIRED {
                entry[1] = entry[0];
                entry[3] = entry[2];
            }
        }

        let mesh = Self {
            vertices,
            connectivity,
            faces,
            face_to_cell,
            cell_to_face,
        };

        for cell_index in 0..mesh.num_cells() {
            if mesh.cell_measure(cell_index) <= 0.0 {
                return Err(eyre!("cell {} is degenerate (zero area)", cell_index));
            }
        }

        Ok(mesh)
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[Tri3d2Connectivity] {
        &self.connectivity
    }

    pub fn faces(&self) -> &[Segment2d2Connectivity] {
        &self.faces
    }

    /// For each face, `[left cell, right cell, local index in left, local index in right]`.
    pub fn face_to_cell(&self) -> &[[usize; 4]] {
        &self.face_to_cell
    }

    /// For each cell, the global indices of its faces, ordered by local face index.
    pub fn cell_to_face(&self) -> &[[usize; 3]] {
        &self.cell_to_face
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.connectivity.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn is_boundary_face(&self, face_index: usize) -> bool {
        let [left, right, _, _] = self.face_to_cell[face_index];
        left == right
    }

    pub fn boundary_faces(&self) -> Vec<usize> {
        (0..self.num_faces())
            .filter(|&f| self.is_boundary_face(f))
            .collect()
    }

    /// Vertices that belong to at least one boundary face, sorted by index.
    pub fn boundary_vertices(&self) -> Vec<usize> {
        let mut vertices: Vec<_> = self
            .boundary_faces()
            .into_iter()
            .flat_map(|f| self.faces[f].0)
            .collect();
        vertices.sort_unstable();
        vertices.dedup();
        vertices
    }

    fn cell_vertices(&self, cell_index: usize) -> [&Point2<f64>; 3] {
        let [a, b, c] = self.connectivity[cell_index].0;
        [&self.vertices[a], &self.vertices[b], &self.vertices[c]]
    }

    /// Twice the signed area of the cell (positive for counter-clockwise vertex ordering).
    fn cell_signed_double_area(&self, cell_index: usize) -> f64 {
        let [a, b, c] = self.cell_vertices(cell_index);
        (b - a).perp(&(c - a))
    }

    pub fn cell_measure(&self, cell_index: usize) -> f64 {
        0.5 * self.cell_signed_double_area(cell_index).abs()
    }

    pub fn cell_measures(&self) -> Vec<f64> {
        (0..self.num_cells()).map(|c| self.cell_measure(c)).collect()
    }

    pub fn face_measure(&self, face_index: usize) -> f64 {
        let [a, b] = self.faces[face_index].0;
        (self.vertices[b] - self.vertices[a]).norm()
    }

    pub fn face_measures(&self) -> Vec<f64> {
        (0..self.num_faces()).map(|f| self.face_measure(f)).collect()
    }

    /// Unit normal of the face, pointing out of its left cell.
    pub fn face_unit_normal(&self, face_index: usize) -> Vector2<f64> {
        let [left, _, left_local, _] = self.face_to_cell[face_index];
        let [a, b] = self.faces[face_index].0;
        let tangent = self.vertices[b] - self.vertices[a];
        let normal = Vector2::new(tangent.y, -tangent.x).normalize();

        // The vertex opposite to the face lies on the inner side
        let opposite = &self.vertices[self.connectivity[left][left_local]];
        if normal.dot(&(self.vertices[a] - opposite)) >= 0.0 {
            normal
        } else {
            -normal
        }
    }

    /// Gradients of the barycentric coordinates $\lambda_0, \lambda_1, \lambda_2$ of the cell.
    ///
    /// These are constant on each cell and coincide with the gradients of the linear Lagrange
    /// basis functions.
    pub fn grad_lambda(&self, cell_index: usize) -> [Vector2<f64>; 3] {
        let x = self.cell_vertices(cell_index);
        let double_area = self.cell_signed_double_area(cell_index);
        let mut gradients = [Vector2::zeros(); 3];
        for i in 0..3 {
            let e = x[(i + 2) % 3] - x[(i + 1) % 3];
            gradients[i] = Vector2::new(-e.y, e.x) / double_area;
        }
        gradients
    }

    /// Maps barycentric coordinates in the given cell to physical coordinates.
    pub fn bc_to_point(&self, cell_index: usize, bc: &Vector3<f64>) -> Point2<f64> {
        let [a, b, c] = self.cell_vertices(cell_index);
        Point2::from(a.coords * bc[0] + b.coords * bc[1] + c.coords * bc[2])
    }

    /// Maps barycentric coordinates on the given face to physical coordinates.
    pub fn face_bc_to_point(&self, face_index: usize, bc: &Vector2<f64>) -> Point2<f64> {
        let [a, b] = self.faces[face_index].0;
        Point2::from(self.vertices[a].coords * bc[0] + self.vertices[b].coords * bc[1])
    }

    /// Maps barycentric coordinates on a face to barycentric coordinates in the cell that has
    /// the face at the given local index.
    ///
    /// The face vertex order of the *left* cell is used, which is also the orientation stored
    /// in the mesh. For the right cell, the face is traversed in the opposite direction.
    pub fn face_bc_to_cell_bc(&self, face_index: usize, cell_index: usize, face_bc: &Vector2<f64>) -> Vector3<f64> {
        let [a, b] = self.faces[face_index].0;
        let cell = &self.connectivity[cell_index];
        let mut bc = Vector3::zeros();
        for (local_vertex, &global_vertex) in cell.iter().enumerate() {
            if global_vertex == a {
                bc[local_vertex] = face_bc[0];
            } else if global_vertex == b {
                bc[local_vertex] = face_bc[1];
            }
        }
        bc
    }

    /// Returns the index of a cell containing the given vertex.
    pub fn find_cell_with_vertex(&self, vertex_index: usize) -> Option<usize> {
        self.connectivity
            .iter()
            .position(|cell| cell.contains(&vertex_index))
    }
}
