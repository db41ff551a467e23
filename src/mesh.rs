//! A minimal simplicial/tensor-cell mesh for exercising the contract.
//!
//! The mesh is a collaborator of the reference assembly driver, not part of
//! the contract itself: it supplies exactly what the contract consumes —
//! global entity counts and per-cell entity indices for dofmaps, coordinate
//! dofs for mappings, facet adjacency for facet integrals, and subdomain
//! markers for dispatch. Entities of intermediate dimension are derived from
//! the cell-vertex connectivity by keying each entity on its sorted vertex
//! tuple; their global numbering is the order of first appearance.

use crate::cell::{CellShape, Orientation};
use crate::error::ContractError;
use crate::Real;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One exterior (boundary) facet: its global facet index and the single
/// incident cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExteriorFacet {
    pub facet: usize,
    pub cell: usize,
    pub local_facet: usize,
}

/// One interior facet: its global facet index and both incident cells, in
/// cell-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteriorFacet {
    pub facet: usize,
    pub cell_0: usize,
    pub local_facet_0: usize,
    pub cell_1: usize,
    pub local_facet_1: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Mesh<T: Real> {
    shape: CellShape,
    geometric_dimension: usize,
    /// Vertex coordinates, `[num_vertices][gdim]`.
    vertices: Vec<T>,
    /// Per-dimension cell-to-entity connectivity, each flat
    /// `[num_cells][entities_per_cell]`.
    entities: Vec<Vec<usize>>,
    /// Global entity counts per dimension.
    num_entities: Vec<usize>,
    exterior_facets: Vec<ExteriorFacet>,
    interior_facets: Vec<InteriorFacet>,
    /// Lowest incident `(cell, local vertex)` per global vertex.
    vertex_cells: Vec<(usize, usize)>,
    cell_markers: Vec<Option<usize>>,
    facet_markers: Vec<Option<usize>>,
    vertex_markers: Vec<Option<usize>>,
    orientations: Vec<Orientation>,
}

impl<T: Real> Mesh<T> {
    /// Builds a mesh from flat vertex coordinates (`[num_vertices][gdim]`)
    /// and cell-vertex connectivity (`[num_cells][vertices_per_cell]`),
    /// deriving all intermediate entities.
    pub fn from_cells(
        shape: CellShape,
        geometric_dimension: usize,
        vertices: Vec<T>,
        cells: Vec<usize>,
    ) -> Result<Self, ContractError> {
        let tdim = shape.dimension();
        if geometric_dimension < tdim || geometric_dimension > 3 {
            return Err(ContractError::OutOfRange {
                what: "geometric dimension",
                index: geometric_dimension,
                bound: 4,
            });
        }
        let num_vertices = vertices.len() / geometric_dimension;
        if vertices.len() != num_vertices * geometric_dimension {
            return Err(ContractError::SizeMismatch {
                what: "vertex coordinates",
                expected: num_vertices * geometric_dimension,
                actual: vertices.len(),
            });
        }
        let vertices_per_cell = shape.num_vertices();
        let num_cells = cells.len() / vertices_per_cell;
        if cells.len() != num_cells * vertices_per_cell {
            return Err(ContractError::SizeMismatch {
                what: "cell connectivity",
                expected: num_cells * vertices_per_cell,
                actual: cells.len(),
            });
        }
        if let Some(&bad) = cells.iter().find(|&&v| v >= num_vertices) {
            return Err(ContractError::OutOfRange {
                what: "cell vertex",
                index: bad,
                bound: num_vertices,
            });
        }

        // Derive global numbering of every entity dimension. Dimension 0 is
        // the vertex connectivity itself, dimension tdim the cell indices.
        let mut entities = vec![Vec::new(); tdim + 1];
        let mut num_entities = vec![0; tdim + 1];
        entities[0] = cells.clone();
        num_entities[0] = num_vertices;
        entities[tdim] = (0..num_cells).collect();
        num_entities[tdim] = num_cells;
        for dim in 1..tdim {
            let per_cell = shape.num_entities(dim);
            let mut keys: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
            let mut connectivity = Vec::with_capacity(num_cells * per_cell);
            for cell in 0..num_cells {
                let cell_vertices = &cells[cell * vertices_per_cell..(cell + 1) * vertices_per_cell];
                for entity in 0..per_cell {
                    let mut key: Vec<usize> = shape
                        .entity_vertices(dim, entity)
                        .iter()
                        .map(|&local| cell_vertices[local])
                        .collect();
                    key.sort_unstable();
                    let next = keys.len();
                    let global = *keys.entry(key).or_insert(next);
                    connectivity.push(global);
                }
            }
            num_entities[dim] = keys.len();
            entities[dim] = connectivity;
        }

        // Facet adjacency: a facet with one incident cell is exterior, with
        // two interior.
        let facet_dim = tdim - 1;
        let facets_per_cell = shape.num_entities(facet_dim);
        let mut incidence: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_entities[facet_dim]];
        for cell in 0..num_cells {
            for local_facet in 0..facets_per_cell {
                let facet = entities[facet_dim][cell * facets_per_cell + local_facet];
                incidence[facet].push((cell, local_facet));
            }
        }
        let mut exterior_facets = Vec::new();
        let mut interior_facets = Vec::new();
        for (facet, cells_of_facet) in incidence.iter().enumerate() {
            match cells_of_facet.as_slice() {
                [(cell, local_facet)] => exterior_facets.push(ExteriorFacet {
                    facet,
                    cell: *cell,
                    local_facet: *local_facet,
                }),
                [(cell_0, local_0), (cell_1, local_1)] => interior_facets.push(InteriorFacet {
                    facet,
                    cell_0: *cell_0,
                    local_facet_0: *local_0,
                    cell_1: *cell_1,
                    local_facet_1: *local_1,
                }),
                _ => {
                    return Err(ContractError::UnsupportedOperation(
                        "non-manifold meshes (facets shared by more than two cells)",
                    ))
                }
            }
        }

        let mut vertex_cells = vec![(usize::MAX, 0); num_vertices];
        for cell in (0..num_cells).rev() {
            for (local, &vertex) in cells
                [cell * vertices_per_cell..(cell + 1) * vertices_per_cell]
                .iter()
                .enumerate()
            {
                vertex_cells[vertex] = (cell, local);
            }
        }
        // Vertex sweeps attach every vertex to an incident cell, so a
        // vertex outside all cells has no well-defined attachment.
        if vertex_cells.iter().any(|&(cell, _)| cell == usize::MAX) {
            return Err(ContractError::UnsupportedOperation(
                "meshes with isolated vertices (vertex not referenced by any cell)",
            ));
        }

        let num_facets = num_entities[facet_dim];
        Ok(Self {
            shape,
            geometric_dimension,
            vertices,
            entities,
            num_entities,
            exterior_facets,
            interior_facets,
            vertex_cells,
            cell_markers: vec![None; num_cells],
            facet_markers: vec![None; num_facets],
            vertex_markers: vec![None; num_vertices],
            orientations: vec![Orientation::Standard; num_cells],
        })
    }

    pub fn cell_shape(&self) -> CellShape {
        self.shape
    }

    pub fn topological_dimension(&self) -> usize {
        self.shape.dimension()
    }

    pub fn geometric_dimension(&self) -> usize {
        self.geometric_dimension
    }

    pub fn num_cells(&self) -> usize {
        self.num_entities[self.shape.dimension()]
    }

    pub fn num_vertices(&self) -> usize {
        self.num_entities[0]
    }

    /// Global number of entities of each dimension, indexed by dimension.
    pub fn num_global_entities(&self) -> &[usize] {
        &self.num_entities
    }

    /// Global vertex indices of one cell.
    pub fn cell_vertices(&self, cell: usize) -> &[usize] {
        let per_cell = self.shape.num_vertices();
        &self.entities[0][cell * per_cell..(cell + 1) * per_cell]
    }

    /// Global entity indices of one cell for every dimension, in the layout
    /// [`crate::dofmap::Dofmap::tabulate_dofs`] consumes.
    pub fn cell_entity_indices(&self, cell: usize) -> Vec<&[usize]> {
        (0..=self.shape.dimension())
            .map(|dim| {
                let per_cell = self.shape.num_entities(dim);
                &self.entities[dim][cell * per_cell..(cell + 1) * per_cell]
            })
            .collect()
    }

    /// Global facet index of a cell-local facet.
    pub fn facet_index(&self, cell: usize, local_facet: usize) -> usize {
        let facet_dim = self.shape.dimension() - 1;
        let per_cell = self.shape.num_entities(facet_dim);
        self.entities[facet_dim][cell * per_cell + local_facet]
    }

    pub fn exterior_facets(&self) -> &[ExteriorFacet] {
        &self.exterior_facets
    }

    pub fn interior_facets(&self) -> &[InteriorFacet] {
        &self.interior_facets
    }

    /// The lowest-indexed incident cell of a global vertex, with the
    /// vertex's local index in that cell.
    pub fn vertex_cell(&self, vertex: usize) -> (usize, usize) {
        self.vertex_cells[vertex]
    }

    /// Gathers the degree-1 coordinate dofs of one cell into `out`, laid
    /// out `[vertices_per_cell][gdim]`.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than `vertices_per_cell * gdim`.
    pub fn populate_cell_coordinate_dofs(&self, cell: usize, out: &mut [T]) {
        let gdim = self.geometric_dimension;
        for (node, &vertex) in self.cell_vertices(cell).iter().enumerate() {
            out[node * gdim..(node + 1) * gdim]
                .copy_from_slice(&self.vertices[vertex * gdim..(vertex + 1) * gdim]);
        }
    }

    pub fn cell_orientation(&self, cell: usize) -> Orientation {
        self.orientations[cell]
    }

    pub fn set_cell_orientation(&mut self, cell: usize, orientation: Orientation) {
        self.orientations[cell] = orientation;
    }

    pub fn cell_marker(&self, cell: usize) -> Option<usize> {
        self.cell_markers[cell]
    }

    pub fn set_cell_marker(&mut self, cell: usize, subdomain_id: usize) {
        self.cell_markers[cell] = Some(subdomain_id);
    }

    pub fn facet_marker(&self, facet: usize) -> Option<usize> {
        self.facet_markers[facet]
    }

    pub fn set_facet_marker(&mut self, facet: usize, subdomain_id: usize) {
        self.facet_markers[facet] = Some(subdomain_id);
    }

    pub fn vertex_marker(&self, vertex: usize) -> Option<usize> {
        self.vertex_markers[vertex]
    }

    pub fn set_vertex_marker(&mut self, vertex: usize, subdomain_id: usize) {
        self.vertex_markers[vertex] = Some(subdomain_id);
    }
}

/// A single unit reference triangle.
pub fn unit_triangle<T: Real>() -> Mesh<T> {
    let vertices = CellShape::Triangle
        .reference_vertices()
        .iter()
        .map(|&coordinate| T::from_f64(coordinate).expect("literal must be representable in T"))
        .collect();
    match Mesh::from_cells(CellShape::Triangle, 2, vertices, vec![0, 1, 2]) {
        Ok(mesh) => mesh,
        Err(_) => unreachable!("the reference triangle is always valid"),
    }
}

/// A structured triangulation of the unit square: `nx` by `ny` squares,
/// each split along its lower-left-to-upper-right diagonal.
///
/// # Panics
///
/// Panics if `nx` or `ny` is zero.
pub fn unit_square_triangulation<T: Real>(nx: usize, ny: usize) -> Mesh<T> {
    assert!(nx > 0 && ny > 0, "resolution must be positive");
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1) * 2);
    for j in 0..=ny {
        for i in 0..=nx {
            let x = i as f64 / nx as f64;
            let y = j as f64 / ny as f64;
            vertices.push(T::from_f64(x).expect("literal must be representable in T"));
            vertices.push(T::from_f64(y).expect("literal must be representable in T"));
        }
    }
    let vertex = |i: usize, j: usize| j * (nx + 1) + i;
    let mut cells = Vec::with_capacity(nx * ny * 6);
    for j in 0..ny {
        for i in 0..nx {
            cells.extend_from_slice(&[vertex(i, j), vertex(i + 1, j), vertex(i + 1, j + 1)]);
            cells.extend_from_slice(&[vertex(i, j), vertex(i + 1, j + 1), vertex(i, j + 1)]);
        }
    }
    match Mesh::from_cells(CellShape::Triangle, 2, vertices, cells) {
        Ok(mesh) => mesh,
        Err(_) => unreachable!("the structured triangulation is always valid"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_triangle_has_three_boundary_facets() {
        let mesh = unit_triangle::<f64>();
        assert_eq!(mesh.num_cells(), 1);
        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.num_global_entities(), &[3, 3, 1]);
        assert_eq!(mesh.exterior_facets().len(), 3);
        assert!(mesh.interior_facets().is_empty());
    }

    #[test]
    fn unit_square_entity_counts_satisfy_euler_formula() {
        let mesh = unit_square_triangulation::<f64>(2, 2);
        let [v, e, c] = [
            mesh.num_global_entities()[0],
            mesh.num_global_entities()[1],
            mesh.num_global_entities()[2],
        ];
        assert_eq!(v, 9);
        assert_eq!(c, 8);
        // V - E + C = 1 for a disc.
        assert_eq!(v + c, e + 1);
        assert_eq!(mesh.exterior_facets().len(), 8);
        assert_eq!(mesh.interior_facets().len(), e - 8);
    }

    #[test]
    fn shared_facet_indices_agree_between_cells() {
        let mesh = unit_square_triangulation::<f64>(1, 1);
        let interior = mesh.interior_facets();
        assert_eq!(interior.len(), 1);
        let facet = interior[0];
        assert_eq!(
            mesh.facet_index(facet.cell_0, facet.local_facet_0),
            mesh.facet_index(facet.cell_1, facet.local_facet_1)
        );
    }

    #[test]
    fn markers_default_to_none() {
        let mut mesh = unit_triangle::<f64>();
        assert_eq!(mesh.cell_marker(0), None);
        mesh.set_cell_marker(0, 4);
        assert_eq!(mesh.cell_marker(0), Some(4));
        mesh.set_vertex_marker(2, 1);
        assert_eq!(mesh.vertex_marker(2), Some(1));
    }

    #[test]
    fn isolated_vertices_are_rejected() {
        // Four vertices, but only the first three belong to a cell.
        let vertices = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 2.0, 2.0];
        let result = Mesh::<f64>::from_cells(CellShape::Triangle, 2, vertices, vec![0, 1, 2]);
        assert!(matches!(
            result,
            Err(ContractError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn coordinate_dofs_are_vertex_major() {
        let mesh = unit_square_triangulation::<f64>(1, 1);
        let mut dofs = [0.0; 6];
        mesh.populate_cell_coordinate_dofs(0, &mut dofs);
        assert_eq!(dofs, [0.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
    }
}
