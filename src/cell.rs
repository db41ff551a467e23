//! Reference cell shapes and their topology.
//!
//! The fixed set of reference-cell topologies shared by all other
//! components. Reference cells are the unit cells: the unit interval
//! `[0, 1]`, the unit right triangle with vertices `(0,0), (1,0), (0,1)`,
//! the unit tetrahedron, and the unit square/cube with vertices in
//! lexicographic order. Mesh entities of dimension `d` are `d`-dimensional
//! topological sub-entities of a cell (vertices, edges, faces, the cell
//! itself).

use serde::{Deserialize, Serialize};

/// The shape of a reference cell.
///
/// The ordinal values are part of the binary contract for generated
/// artifacts and must not be reordered across a minor version.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CellShape {
    Interval = 0,
    Triangle = 1,
    Quadrilateral = 2,
    Tetrahedron = 3,
    Hexahedron = 4,
    Vertex = 5,
}

/// Geometric handedness of a cell relative to the reference convention.
///
/// Only relevant on manifolds (topological dimension strictly less than
/// geometric dimension), where it resolves the sign of the pseudo-determinant
/// and pseudo-inverse of the Jacobian, and at interior facets shared by two
/// cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Consistent with the reference convention.
    Standard,
    /// Flipped with respect to the reference convention.
    Flipped,
}

impl Orientation {
    /// The sign factor applied to pseudo-determinants on manifold cells.
    pub fn sign<T: crate::Real>(self) -> T {
        match self {
            Orientation::Standard => T::one(),
            Orientation::Flipped => -T::one(),
        }
    }
}

// Entity-vertex incidence tables. Edges and faces are numbered by the
// conventions of the unit reference cells: simplex sub-entities are ordered
// opposite-vertex-major (edge i of a triangle is opposite vertex i), tensor
// product sub-entities lexicographically by their vertex tuples.

const INTERVAL_VERTICES: [&[usize]; 2] = [&[0], &[1]];
const INTERVAL_CELL: [&[usize]; 1] = [&[0, 1]];

const TRIANGLE_VERTICES: [&[usize]; 3] = [&[0], &[1], &[2]];
const TRIANGLE_EDGES: [&[usize]; 3] = [&[1, 2], &[0, 2], &[0, 1]];
const TRIANGLE_CELL: [&[usize]; 1] = [&[0, 1, 2]];

const QUADRILATERAL_VERTICES: [&[usize]; 4] = [&[0], &[1], &[2], &[3]];
const QUADRILATERAL_EDGES: [&[usize]; 4] = [&[0, 1], &[0, 2], &[1, 3], &[2, 3]];
const QUADRILATERAL_CELL: [&[usize]; 1] = [&[0, 1, 2, 3]];

const TETRAHEDRON_VERTICES: [&[usize]; 4] = [&[0], &[1], &[2], &[3]];
const TETRAHEDRON_EDGES: [&[usize]; 6] = [&[2, 3], &[1, 3], &[1, 2], &[0, 3], &[0, 2], &[0, 1]];
const TETRAHEDRON_FACES: [&[usize]; 4] = [&[1, 2, 3], &[0, 2, 3], &[0, 1, 3], &[0, 1, 2]];
const TETRAHEDRON_CELL: [&[usize]; 1] = [&[0, 1, 2, 3]];

const HEXAHEDRON_VERTICES: [&[usize]; 8] = [&[0], &[1], &[2], &[3], &[4], &[5], &[6], &[7]];
const HEXAHEDRON_EDGES: [&[usize]; 12] = [
    &[0, 1],
    &[0, 2],
    &[0, 4],
    &[1, 3],
    &[1, 5],
    &[2, 3],
    &[2, 6],
    &[3, 7],
    &[4, 5],
    &[4, 6],
    &[5, 7],
    &[6, 7],
];
const HEXAHEDRON_FACES: [&[usize]; 6] = [
    &[0, 1, 2, 3],
    &[0, 1, 4, 5],
    &[0, 2, 4, 6],
    &[1, 3, 5, 7],
    &[2, 3, 6, 7],
    &[4, 5, 6, 7],
];
const HEXAHEDRON_CELL: [&[usize]; 1] = [&[0, 1, 2, 3, 4, 5, 6, 7]];

const VERTEX_VERTICES: [&[usize]; 1] = [&[0]];

// Reference vertex coordinates, flattened row-major with stride equal to the
// topological dimension.
const INTERVAL_COORDS: &[f64] = &[0.0, 1.0];
const TRIANGLE_COORDS: &[f64] = &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
const QUADRILATERAL_COORDS: &[f64] = &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
const TETRAHEDRON_COORDS: &[f64] = &[
    0.0, 0.0, 0.0, //
    1.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, //
    0.0, 0.0, 1.0,
];
const HEXAHEDRON_COORDS: &[f64] = &[
    0.0, 0.0, 0.0, //
    1.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, //
    1.0, 1.0, 0.0, //
    0.0, 0.0, 1.0, //
    1.0, 0.0, 1.0, //
    0.0, 1.0, 1.0, //
    1.0, 1.0, 1.0,
];
const VERTEX_COORDS: &[f64] = &[];

const INTERVAL_MIDPOINT: &[f64] = &[0.5];
const TRIANGLE_MIDPOINT: &[f64] = &[1.0 / 3.0, 1.0 / 3.0];
const QUADRILATERAL_MIDPOINT: &[f64] = &[0.5, 0.5];
const TETRAHEDRON_MIDPOINT: &[f64] = &[0.25, 0.25, 0.25];
const HEXAHEDRON_MIDPOINT: &[f64] = &[0.5, 0.5, 0.5];
const VERTEX_MIDPOINT: &[f64] = &[];

impl CellShape {
    /// Topological dimension of the cell.
    pub fn dimension(self) -> usize {
        match self {
            CellShape::Vertex => 0,
            CellShape::Interval => 1,
            CellShape::Triangle | CellShape::Quadrilateral => 2,
            CellShape::Tetrahedron | CellShape::Hexahedron => 3,
        }
    }

    /// Number of vertices of the cell.
    pub fn num_vertices(self) -> usize {
        self.num_entities(0)
    }

    /// Number of facets (co-dimension-1 sub-entities) of the cell.
    pub fn num_facets(self) -> usize {
        self.num_entities(self.dimension().saturating_sub(1))
    }

    /// Shape of the cell's facets.
    ///
    /// # Panics
    ///
    /// Panics for [`CellShape::Vertex`], which has no facets.
    pub fn facet_shape(self) -> CellShape {
        match self {
            CellShape::Interval => CellShape::Vertex,
            CellShape::Triangle | CellShape::Quadrilateral => CellShape::Interval,
            CellShape::Tetrahedron => CellShape::Triangle,
            CellShape::Hexahedron => CellShape::Quadrilateral,
            CellShape::Vertex => panic!("vertex cells have no facets"),
        }
    }

    fn entity_table(self, dim: usize) -> &'static [&'static [usize]] {
        match (self, dim) {
            (CellShape::Interval, 0) => &INTERVAL_VERTICES,
            (CellShape::Interval, 1) => &INTERVAL_CELL,
            (CellShape::Triangle, 0) => &TRIANGLE_VERTICES,
            (CellShape::Triangle, 1) => &TRIANGLE_EDGES,
            (CellShape::Triangle, 2) => &TRIANGLE_CELL,
            (CellShape::Quadrilateral, 0) => &QUADRILATERAL_VERTICES,
            (CellShape::Quadrilateral, 1) => &QUADRILATERAL_EDGES,
            (CellShape::Quadrilateral, 2) => &QUADRILATERAL_CELL,
            (CellShape::Tetrahedron, 0) => &TETRAHEDRON_VERTICES,
            (CellShape::Tetrahedron, 1) => &TETRAHEDRON_EDGES,
            (CellShape::Tetrahedron, 2) => &TETRAHEDRON_FACES,
            (CellShape::Tetrahedron, 3) => &TETRAHEDRON_CELL,
            (CellShape::Hexahedron, 0) => &HEXAHEDRON_VERTICES,
            (CellShape::Hexahedron, 1) => &HEXAHEDRON_EDGES,
            (CellShape::Hexahedron, 2) => &HEXAHEDRON_FACES,
            (CellShape::Hexahedron, 3) => &HEXAHEDRON_CELL,
            (CellShape::Vertex, 0) => &VERTEX_VERTICES,
            (shape, dim) => panic!("cell shape {shape:?} has no entities of dimension {dim}"),
        }
    }

    /// Number of sub-entities of dimension `dim`.
    ///
    /// # Panics
    ///
    /// Panics if `dim` exceeds the topological dimension.
    pub fn num_entities(self, dim: usize) -> usize {
        self.entity_table(dim).len()
    }

    /// Local vertex indices of sub-entity `(dim, index)`.
    ///
    /// # Panics
    ///
    /// Panics if `dim` exceeds the topological dimension or `index` is out of
    /// range.
    pub fn entity_vertices(self, dim: usize, index: usize) -> &'static [usize] {
        let table = self.entity_table(dim);
        assert!(
            index < table.len(),
            "entity index {index} out of range for dimension {dim} of {self:?}"
        );
        table[index]
    }

    /// All sub-entities in the closure of entity `(dim, index)`, including
    /// the entity itself, ordered entity-dimension-major then
    /// entity-index-minor.
    pub fn entity_closure(self, dim: usize, index: usize) -> Vec<(usize, usize)> {
        let entity_vertices = self.entity_vertices(dim, index);
        let mut closure = Vec::new();
        for sub_dim in 0..=dim {
            for sub_index in 0..self.num_entities(sub_dim) {
                let sub_vertices = self.entity_vertices(sub_dim, sub_index);
                if sub_vertices.iter().all(|v| entity_vertices.contains(v)) {
                    closure.push((sub_dim, sub_index));
                }
            }
        }
        closure
    }

    /// Reference coordinates of all vertices, flattened row-major with
    /// stride [`CellShape::dimension`].
    pub fn reference_vertices(self) -> &'static [f64] {
        match self {
            CellShape::Interval => INTERVAL_COORDS,
            CellShape::Triangle => TRIANGLE_COORDS,
            CellShape::Quadrilateral => QUADRILATERAL_COORDS,
            CellShape::Tetrahedron => TETRAHEDRON_COORDS,
            CellShape::Hexahedron => HEXAHEDRON_COORDS,
            CellShape::Vertex => VERTEX_COORDS,
        }
    }

    /// Reference coordinates of the cell midpoint.
    pub fn midpoint(self) -> &'static [f64] {
        match self {
            CellShape::Interval => INTERVAL_MIDPOINT,
            CellShape::Triangle => TRIANGLE_MIDPOINT,
            CellShape::Quadrilateral => QUADRILATERAL_MIDPOINT,
            CellShape::Tetrahedron => TETRAHEDRON_MIDPOINT,
            CellShape::Hexahedron => HEXAHEDRON_MIDPOINT,
            CellShape::Vertex => VERTEX_MIDPOINT,
        }
    }

    /// Whether the shape is a simplex (affine under a degree-1 coordinate
    /// field).
    pub fn is_simplex(self) -> bool {
        matches!(
            self,
            CellShape::Vertex | CellShape::Interval | CellShape::Triangle | CellShape::Tetrahedron
        )
    }
}

#[cfg(test)]
mod tests {
    use super::CellShape;

    #[test]
    fn ordinals_are_stable() {
        assert_eq!(CellShape::Interval as u32, 0);
        assert_eq!(CellShape::Triangle as u32, 1);
        assert_eq!(CellShape::Quadrilateral as u32, 2);
        assert_eq!(CellShape::Tetrahedron as u32, 3);
        assert_eq!(CellShape::Hexahedron as u32, 4);
        assert_eq!(CellShape::Vertex as u32, 5);
    }

    #[test]
    fn entity_counts_match_euler_characteristic() {
        // V - E + F - C alternating sums for the standard cell complexes
        assert_eq!(CellShape::Triangle.num_entities(0), 3);
        assert_eq!(CellShape::Triangle.num_entities(1), 3);
        assert_eq!(CellShape::Tetrahedron.num_entities(1), 6);
        assert_eq!(CellShape::Tetrahedron.num_entities(2), 4);
        assert_eq!(CellShape::Hexahedron.num_entities(1), 12);
        assert_eq!(CellShape::Hexahedron.num_entities(2), 6);
        assert_eq!(CellShape::Quadrilateral.num_facets(), 4);
    }

    #[test]
    fn facet_vertices_are_vertices_of_the_cell() {
        for shape in [
            CellShape::Interval,
            CellShape::Triangle,
            CellShape::Quadrilateral,
            CellShape::Tetrahedron,
            CellShape::Hexahedron,
        ] {
            let facet_dim = shape.dimension() - 1;
            for facet in 0..shape.num_facets() {
                for &v in shape.entity_vertices(facet_dim, facet) {
                    assert!(v < shape.num_vertices());
                }
            }
        }
    }

    #[test]
    fn closure_of_triangle_edge_contains_its_vertices() {
        let closure = CellShape::Triangle.entity_closure(1, 0);
        assert_eq!(closure, vec![(0, 1), (0, 2), (1, 0)]);
    }
}
