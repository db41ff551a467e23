//! Degree-of-freedom maps: local-to-global numbering of dofs on a cell.
//!
//! A dofmap is pure topology; it never sees coordinates. Dofs are attached
//! to cell sub-entities (and optionally to the mesh as a whole, for global
//! support functions such as multiplier constants) and enumerated in one
//! canonical order everywhere: entity-dimension-major, then entity-index,
//! then per-entity dof index, with global-support dofs numbered last.

use crate::cell::CellShape;
use crate::element::lagrange::{check_lagrange_supported, scalar_entity_dof_counts};
use crate::error::ContractError;

/// Local-to-global dof numbering queries for one cell type.
///
/// Implementations are immutable and shareable across threads; the trait is
/// object safe so drivers can hold heterogeneous dofmaps behind
/// `Box<dyn Dofmap>`.
pub trait Dofmap: Send + Sync {
    /// String identifying the dofmap, used by drivers for caching and
    /// dispatch.
    fn signature(&self) -> &str;

    /// The reference cell the dofmap is defined on.
    fn cell_shape(&self) -> CellShape;

    fn topological_dimension(&self) -> usize {
        self.cell_shape().dimension()
    }

    /// Number of dofs associated with the mesh as a whole rather than any
    /// entity (e.g. the constant of a pure-Neumann multiplier space).
    fn num_global_support_dofs(&self) -> usize;

    /// Number of dofs attached to the cell's own sub-entities.
    fn num_element_support_dofs(&self) -> usize;

    /// Total dofs per cell: element support plus global support.
    fn num_element_dofs(&self) -> usize {
        self.num_element_support_dofs() + self.num_global_support_dofs()
    }

    /// Number of dofs whose support touches one facet (the closure dofs of
    /// a co-dimension-1 entity).
    fn num_facet_dofs(&self) -> usize {
        self.num_entity_closure_dofs(self.topological_dimension() - 1)
    }

    /// Dofs attached to each single entity of dimension `dim`.
    ///
    /// # Panics
    ///
    /// Panics if `dim` exceeds the topological dimension.
    fn num_entity_dofs(&self, dim: usize) -> usize;

    /// Dofs attached to the closure of one entity of dimension `dim` (the
    /// entity and all its sub-entities).
    ///
    /// # Panics
    ///
    /// Panics if `dim` exceeds the topological dimension.
    fn num_entity_closure_dofs(&self, dim: usize) -> usize;

    /// Computes the local-to-global dof index array for one cell.
    ///
    /// `num_global_entities[d]` is the number of mesh entities of dimension
    /// `d` and `entity_indices[d][i]` the global index of the cell's local
    /// entity `(d, i)`. Global numbering is entity-dimension-major over the
    /// whole mesh, with global-support dofs numbered after all entity dofs.
    ///
    /// # Panics
    ///
    /// Panics if `dofs` is shorter than [`num_element_dofs`], or the entity
    /// arrays do not cover dimensions `0..=topological_dimension`.
    ///
    /// [`num_element_dofs`]: Dofmap::num_element_dofs
    fn tabulate_dofs(
        &self,
        dofs: &mut [usize],
        num_global_entities: &[usize],
        entity_indices: &[&[usize]],
    );

    /// Local indices of the dofs whose support touches local facet `facet`.
    ///
    /// # Panics
    ///
    /// Panics if `facet` is out of range or `dofs` is shorter than
    /// [`num_facet_dofs`].
    ///
    /// [`num_facet_dofs`]: Dofmap::num_facet_dofs
    fn tabulate_facet_dofs(&self, dofs: &mut [usize], facet: usize);

    /// Local indices of the dofs attached to entity `(dim, index)` itself.
    ///
    /// # Panics
    ///
    /// Panics on out-of-range `dim`/`index` or an undersized buffer.
    fn tabulate_entity_dofs(&self, dofs: &mut [usize], dim: usize, index: usize);

    /// Local indices of the dofs attached to the closure of entity
    /// `(dim, index)`, in entity-dimension-major order.
    ///
    /// # Panics
    ///
    /// Panics on out-of-range `dim`/`index` or an undersized buffer.
    fn tabulate_entity_closure_dofs(&self, dofs: &mut [usize], dim: usize, index: usize);

    /// Number of sub-dofmaps; mirrors the sub-element decomposition of the
    /// associated element.
    fn num_sub_dofmaps(&self) -> usize;

    /// Creates sub-dofmap `index`, independently owned by the caller.
    fn create_sub_dofmap(&self, index: usize) -> Result<Box<dyn Dofmap>, ContractError>;

    /// Creates a new instance of this dofmap.
    fn create(&self) -> Box<dyn Dofmap>;
}

/// The concrete dofmap for the built-in element families: a per-dimension
/// dof count table over one reference cell, plus optional global-support
/// dofs and sub-dofmaps.
#[derive(Debug, Clone)]
pub struct CellDofmap {
    shape: CellShape,
    entity_dofs: Vec<usize>,
    num_global_support_dofs: usize,
    sub_dofmaps: Vec<CellDofmap>,
    signature: String,
}

impl CellDofmap {
    /// Dofmap of the scalar Lagrange element of the given degree.
    pub fn lagrange(shape: CellShape, degree: usize) -> Result<Self, ContractError> {
        check_lagrange_supported(shape, degree)?;
        Ok(Self {
            shape,
            entity_dofs: scalar_entity_dof_counts(shape, degree),
            num_global_support_dofs: 0,
            sub_dofmaps: Vec::new(),
            signature: format!("Dofmap(Lagrange, {shape:?}, {degree})"),
        })
    }

    /// Dofmap of the blocked vector Lagrange element: per-entity counts are
    /// the scalar counts times the component count, and each component
    /// contributes one scalar sub-dofmap.
    pub fn vector_lagrange(
        shape: CellShape,
        degree: usize,
        num_components: usize,
    ) -> Result<Self, ContractError> {
        if num_components == 0 {
            return Err(ContractError::OutOfRange {
                what: "vector dofmap component count",
                index: 0,
                bound: usize::MAX,
            });
        }
        let scalar = Self::lagrange(shape, degree)?;
        let entity_dofs = scalar.entity_dofs.iter().map(|n| n * num_components).collect();
        Ok(Self {
            shape,
            entity_dofs,
            num_global_support_dofs: 0,
            sub_dofmaps: vec![scalar; num_components],
            signature: format!("Dofmap(VectorLagrange, {shape:?}, {degree}, {num_components})"),
        })
    }

    /// Dofmap of a mixed element: per-entity counts are summed over the
    /// parts, which become the sub-dofmaps.
    pub fn mixed(parts: Vec<CellDofmap>) -> Result<Self, ContractError> {
        if parts.is_empty() {
            return Err(ContractError::SizeMismatch {
                what: "mixed dofmap parts",
                expected: 1,
                actual: 0,
            });
        }
        let shape = parts[0].shape;
        if parts.iter().any(|part| part.shape != shape) {
            return Err(ContractError::UnsupportedOperation(
                "mixed dofmap parts must share one cell shape",
            ));
        }
        let mut entity_dofs = vec![0; shape.dimension() + 1];
        let mut num_global_support_dofs = 0;
        for part in &parts {
            for (total, &count) in entity_dofs.iter_mut().zip(&part.entity_dofs) {
                *total += count;
            }
            num_global_support_dofs += part.num_global_support_dofs;
        }
        let signature = format!(
            "Dofmap(Mixed, [{}])",
            parts.iter().map(|p| p.signature.as_str()).collect::<Vec<_>>().join("; ")
        );
        Ok(Self {
            shape,
            entity_dofs,
            num_global_support_dofs,
            sub_dofmaps: parts,
            signature,
        })
    }

    /// Dofmap of a global constant space: no entity dofs, one dof supported
    /// on the whole mesh.
    pub fn global_constant(shape: CellShape) -> Self {
        Self {
            shape,
            entity_dofs: vec![0; shape.dimension() + 1],
            num_global_support_dofs: 1,
            sub_dofmaps: Vec::new(),
            signature: format!("Dofmap(GlobalConstant, {shape:?})"),
        }
    }

    /// Local dof offset of entity `(dim, index)` in the canonical order.
    fn entity_offset(&self, dim: usize, index: usize) -> usize {
        let prior: usize = (0..dim)
            .map(|d| self.entity_dofs[d] * self.shape.num_entities(d))
            .sum();
        prior + index * self.entity_dofs[dim]
    }
}

impl Dofmap for CellDofmap {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn cell_shape(&self) -> CellShape {
        self.shape
    }

    fn num_global_support_dofs(&self) -> usize {
        self.num_global_support_dofs
    }

    fn num_element_support_dofs(&self) -> usize {
        self.entity_dofs
            .iter()
            .enumerate()
            .map(|(dim, count)| count * self.shape.num_entities(dim))
            .sum()
    }

    fn num_entity_dofs(&self, dim: usize) -> usize {
        self.entity_dofs[dim]
    }

    fn num_entity_closure_dofs(&self, dim: usize) -> usize {
        self.shape
            .entity_closure(dim, 0)
            .iter()
            .map(|&(sub_dim, _)| self.entity_dofs[sub_dim])
            .sum()
    }

    fn tabulate_dofs(
        &self,
        dofs: &mut [usize],
        num_global_entities: &[usize],
        entity_indices: &[&[usize]],
    ) {
        let tdim = self.shape.dimension();
        assert!(num_global_entities.len() > tdim, "missing global entity counts");
        assert!(entity_indices.len() > tdim, "missing entity index arrays");
        assert!(dofs.len() >= self.num_element_dofs(), "dof buffer too short");

        let mut local = 0;
        let mut global_offset = 0;
        for dim in 0..=tdim {
            let per_entity = self.entity_dofs[dim];
            if per_entity > 0 {
                for entity in 0..self.shape.num_entities(dim) {
                    let global_entity = entity_indices[dim][entity];
                    for k in 0..per_entity {
                        dofs[local] = global_offset + global_entity * per_entity + k;
                        local += 1;
                    }
                }
            }
            global_offset += per_entity * num_global_entities[dim];
        }
        for k in 0..self.num_global_support_dofs {
            dofs[local] = global_offset + k;
            local += 1;
        }
    }

    fn tabulate_facet_dofs(&self, dofs: &mut [usize], facet: usize) {
        self.tabulate_entity_closure_dofs(dofs, self.shape.dimension() - 1, facet);
    }

    fn tabulate_entity_dofs(&self, dofs: &mut [usize], dim: usize, index: usize) {
        assert!(index < self.shape.num_entities(dim), "entity index out of range");
        let count = self.entity_dofs[dim];
        assert!(dofs.len() >= count, "dof buffer too short");
        let offset = self.entity_offset(dim, index);
        for (k, dof) in dofs[..count].iter_mut().enumerate() {
            *dof = offset + k;
        }
    }

    fn tabulate_entity_closure_dofs(&self, dofs: &mut [usize], dim: usize, index: usize) {
        let mut written = 0;
        for (sub_dim, sub_index) in self.shape.entity_closure(dim, index) {
            let count = self.entity_dofs[sub_dim];
            assert!(dofs.len() >= written + count, "dof buffer too short");
            self.tabulate_entity_dofs(&mut dofs[written..written + count], sub_dim, sub_index);
            written += count;
        }
    }

    fn num_sub_dofmaps(&self) -> usize {
        self.sub_dofmaps.len()
    }

    fn create_sub_dofmap(&self, index: usize) -> Result<Box<dyn Dofmap>, ContractError> {
        match self.sub_dofmaps.get(index) {
            Some(sub) => Ok(Box::new(sub.clone())),
            None => Err(ContractError::OutOfRange {
                what: "sub-dofmap",
                index,
                bound: self.sub_dofmaps.len(),
            }),
        }
    }

    fn create(&self) -> Box<dyn Dofmap> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2_triangle_dof_counts() {
        let dofmap = CellDofmap::lagrange(CellShape::Triangle, 2).unwrap();
        assert_eq!(dofmap.num_element_dofs(), 6);
        assert_eq!(dofmap.num_entity_dofs(0), 1);
        assert_eq!(dofmap.num_entity_dofs(1), 1);
        assert_eq!(dofmap.num_entity_dofs(2), 0);
        // A facet (edge) closure holds its two vertices plus the edge dof.
        assert_eq!(dofmap.num_facet_dofs(), 3);
        assert_eq!(dofmap.num_entity_closure_dofs(2), 6);
    }

    #[test]
    fn global_support_dofs_are_counted_separately() {
        let dofmap = CellDofmap::global_constant(CellShape::Triangle);
        assert_eq!(dofmap.num_element_support_dofs(), 0);
        assert_eq!(dofmap.num_global_support_dofs(), 1);
        assert_eq!(dofmap.num_element_dofs(), 1);
    }

    #[test]
    fn facet_dofs_of_p2_triangle_cover_the_edge_closure() {
        let dofmap = CellDofmap::lagrange(CellShape::Triangle, 2).unwrap();
        let mut dofs = vec![0; dofmap.num_facet_dofs()];
        // Edge 0 is opposite vertex 0, touching vertices 1 and 2.
        dofmap.tabulate_facet_dofs(&mut dofs, 0);
        assert_eq!(dofs, vec![1, 2, 3]);
    }

    #[test]
    fn tabulate_dofs_is_entity_dimension_major() {
        // One P2 triangle in a mesh of 4 vertices and 5 edges; the cell's
        // vertices have global indices (3, 1, 0) and edges (4, 0, 2).
        let dofmap = CellDofmap::lagrange(CellShape::Triangle, 2).unwrap();
        let mut dofs = vec![0; dofmap.num_element_dofs()];
        dofmap.tabulate_dofs(&mut dofs, &[4, 5, 2], &[&[3, 1, 0], &[4, 0, 2], &[0]]);
        // Vertex dofs equal vertex indices; edge dofs follow all 4 vertices.
        assert_eq!(dofs, vec![3, 1, 0, 4 + 4, 4 + 0, 4 + 2]);
    }

    #[test]
    fn mixed_dofmap_sums_parts() {
        let velocity = CellDofmap::vector_lagrange(CellShape::Triangle, 2, 2).unwrap();
        let pressure = CellDofmap::lagrange(CellShape::Triangle, 1).unwrap();
        let mixed = CellDofmap::mixed(vec![velocity, pressure]).unwrap();
        assert_eq!(mixed.num_element_dofs(), 12 + 3);
        assert_eq!(mixed.num_entity_dofs(0), 3);
        assert_eq!(mixed.num_entity_dofs(1), 2);
        assert_eq!(mixed.num_sub_dofmaps(), 2);
        let sub = mixed.create_sub_dofmap(0).unwrap();
        assert_eq!(sub.num_element_dofs(), 12);
        assert_eq!(sub.num_sub_dofmaps(), 2);
    }
}
