//! Vector and mixed elements built from scalar Lagrange blocks.
//!
//! Both families share one dof ordering rule with the scalar elements:
//! dofs are enumerated entity-dimension-major, then entity-index, and within
//! one entity block-major (all components of the first sub-element, then the
//! next). This keeps element-local dof numbering aligned with the cell
//! dofmaps without any permutation layer.

use crate::cell::{CellShape, Orientation};
use crate::element::lagrange::{
    scalar_dof_coordinates, scalar_entity_dofs, scalar_space_dimension, tabulate_scalar_basis,
    LagrangeElement,
};
use crate::element::{transform_identity_mapped_derivatives, FiniteElement};
use crate::error::{check_buffer_len, ContractError};
use crate::mapping::CoordinateMapping;
use crate::Real;

/// Element-local dof site: which value component it populates and which
/// scalar basis function of its block it evaluates.
#[derive(Debug, Clone, Copy)]
struct DofSite {
    block: usize,
    component: usize,
    base_dof: usize,
}

fn entity_major_sites(blocks: &[(CellShape, usize, usize)]) -> Vec<DofSite> {
    // blocks: (shape, degree, components); all shapes equal by construction.
    let shape = blocks[0].0;
    let mut component_offset = vec![0; blocks.len()];
    let mut offset = 0;
    for (index, &(_, _, components)) in blocks.iter().enumerate() {
        component_offset[index] = offset;
        offset += components;
    }
    let mut sites = Vec::new();
    for dim in 0..=shape.dimension() {
        for entity in 0..shape.num_entities(dim) {
            for (block, &(shape, degree, components)) in blocks.iter().enumerate() {
                for component in 0..components {
                    for base_dof in scalar_entity_dofs(shape, degree, dim, entity) {
                        sites.push(DofSite {
                            block,
                            component: component_offset[block] + component,
                            base_dof,
                        });
                    }
                }
            }
        }
    }
    sites
}

/// A vector-valued Lagrange element: `num_components` independent copies of
/// a scalar Lagrange basis, each feeding one value component.
#[derive(Debug, Clone)]
pub struct VectorLagrangeElement<T: Real> {
    base: LagrangeElement<T>,
    num_components: usize,
    signature: String,
    sites: Vec<DofSite>,
}

impl<T: Real> VectorLagrangeElement<T> {
    pub fn new(base: LagrangeElement<T>, num_components: usize) -> Result<Self, ContractError> {
        if num_components == 0 {
            return Err(ContractError::OutOfRange {
                what: "vector element component count",
                index: 0,
                bound: usize::MAX,
            });
        }
        let signature = format!("VectorElement({}, {num_components})", base.signature());
        let sites = entity_major_sites(&[(base.cell_shape(), base.degree(), num_components)]);
        Ok(Self {
            base,
            num_components,
            signature,
            sites,
        })
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }
}

/// A mixed element: the concatenation of scalar or vector Lagrange blocks on
/// one shared cell shape, with value components stacked block by block.
#[derive(Debug, Clone)]
pub struct MixedElement<T: Real> {
    blocks: Vec<(LagrangeElement<T>, usize)>,
    signature: String,
    sites: Vec<DofSite>,
    value_size: usize,
    degree: usize,
}

impl<T: Real> MixedElement<T> {
    /// Builds a mixed element from `(scalar element, component count)`
    /// blocks; a count of 1 contributes a scalar sub-element, larger counts
    /// a vector sub-element.
    pub fn new(blocks: Vec<(LagrangeElement<T>, usize)>) -> Result<Self, ContractError> {
        if blocks.is_empty() {
            return Err(ContractError::SizeMismatch {
                what: "mixed element blocks",
                expected: 1,
                actual: 0,
            });
        }
        let shape = blocks[0].0.cell_shape();
        let gdim = blocks[0].0.geometric_dimension();
        for (element, components) in &blocks {
            if *components == 0 {
                return Err(ContractError::OutOfRange {
                    what: "mixed element component count",
                    index: 0,
                    bound: usize::MAX,
                });
            }
            if element.cell_shape() != shape || element.geometric_dimension() != gdim {
                return Err(ContractError::UnsupportedOperation(
                    "mixed element blocks must share one cell shape and geometric dimension",
                ));
            }
        }
        let signature = format!(
            "MixedElement({})",
            blocks
                .iter()
                .map(|(element, components)| if *components == 1 {
                    element.signature().to_string()
                } else {
                    format!("VectorElement({}, {components})", element.signature())
                })
                .collect::<Vec<_>>()
                .join("; ")
        );
        let descriptors: Vec<_> = blocks
            .iter()
            .map(|(element, components)| (element.cell_shape(), element.degree(), *components))
            .collect();
        let sites = entity_major_sites(&descriptors);
        let value_size = blocks.iter().map(|(_, components)| components).sum();
        let degree = blocks
            .iter()
            .map(|(element, _)| element.degree())
            .max()
            .unwrap_or(1);
        Ok(Self {
            blocks,
            signature,
            sites,
            value_size,
            degree,
        })
    }
}

/// Shared implementation of basis tabulation for site-scattered elements.
///
/// `block_basis` maps a block index to `(shape, degree, space dimension)`.
#[allow(clippy::too_many_arguments)]
fn evaluate_sites<T: Real>(
    values: &mut [T],
    order: usize,
    points: &[T],
    tdim: usize,
    sites: &[DofSite],
    blocks: &[(CellShape, usize)],
    value_size: usize,
) -> Result<(), ContractError> {
    let num_points = points.len() / tdim;
    check_buffer_len("reference point coordinates", points.len(), num_points * tdim)?;
    let space_dim = sites.len();
    let num_derivatives = tdim.pow(order as u32);
    check_buffer_len(
        "basis derivative values",
        values.len(),
        num_points * space_dim * num_derivatives * value_size,
    )?;
    values.fill(T::zero());

    let mut counts = vec![0usize; tdim];
    let mut scratch: Vec<Vec<T>> = blocks
        .iter()
        .map(|&(shape, degree)| vec![T::zero(); scalar_space_dimension(shape, degree)])
        .collect();
    for p in 0..num_points {
        let x = &points[p * tdim..(p + 1) * tdim];
        for tuple in 0..num_derivatives {
            counts.fill(0);
            let mut rest = tuple;
            for _ in 0..order {
                counts[rest % tdim] += 1;
                rest /= tdim;
            }
            for (&(shape, degree), block_scratch) in blocks.iter().zip(scratch.iter_mut()) {
                tabulate_scalar_basis(shape, degree, &counts, x, block_scratch);
            }
            for (dof, site) in sites.iter().enumerate() {
                let index = ((p * space_dim + dof) * num_derivatives + tuple) * value_size
                    + site.component;
                values[index] = scratch[site.block][site.base_dof];
            }
        }
    }
    Ok(())
}

fn site_dof_coordinates<T: Real>(
    coordinates: &mut [T],
    sites: &[DofSite],
    blocks: &[(CellShape, usize)],
    tdim: usize,
) -> Result<(), ContractError> {
    let base_coordinates: Vec<Vec<f64>> = blocks
        .iter()
        .map(|&(shape, degree)| scalar_dof_coordinates(shape, degree))
        .collect();
    check_buffer_len("dof coordinates", coordinates.len(), sites.len() * tdim)?;
    for (dof, site) in sites.iter().enumerate() {
        for axis in 0..tdim {
            let coordinate = base_coordinates[site.block][site.base_dof * tdim + axis];
            coordinates[dof * tdim + axis] =
                T::from_f64(coordinate).expect("literal must be representable in T");
        }
    }
    Ok(())
}

impl<T: Real> FiniteElement<T> for VectorLagrangeElement<T> {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn cell_shape(&self) -> CellShape {
        self.base.cell_shape()
    }

    fn geometric_dimension(&self) -> usize {
        self.base.geometric_dimension()
    }

    fn space_dimension(&self) -> usize {
        self.sites.len()
    }

    fn value_rank(&self) -> usize {
        1
    }

    fn value_dimension(&self, axis: usize) -> usize {
        assert!(axis == 0, "value axis {axis} out of range for a rank-1 element");
        self.num_components
    }

    fn reference_value_rank(&self) -> usize {
        1
    }

    fn reference_value_dimension(&self, axis: usize) -> usize {
        self.value_dimension(axis)
    }

    fn degree(&self) -> usize {
        self.base.degree()
    }

    fn family(&self) -> &str {
        "Vector Lagrange"
    }

    fn evaluate_reference_basis(&self, values: &mut [T], points: &[T]) -> Result<(), ContractError> {
        self.evaluate_reference_basis_derivatives(values, 0, points)
    }

    fn evaluate_reference_basis_derivatives(
        &self,
        values: &mut [T],
        order: usize,
        points: &[T],
    ) -> Result<(), ContractError> {
        evaluate_sites(
            values,
            order,
            points,
            self.topological_dimension(),
            &self.sites,
            &[(self.base.cell_shape(), self.base.degree())],
            self.num_components,
        )
    }

    fn transform_reference_basis_derivatives(
        &self,
        values: &mut [T],
        order: usize,
        reference_values: &[T],
        _points: &[T],
        _jacobians: &[T],
        _jacobian_determinants: &[T],
        jacobian_inverses: &[T],
        _orientation: Orientation,
    ) -> Result<(), ContractError> {
        let tdim = self.topological_dimension();
        let per_point = self.space_dimension() * tdim.pow(order as u32) * self.num_components;
        let num_points = reference_values.len() / per_point.max(1);
        transform_identity_mapped_derivatives(
            values,
            order,
            reference_values,
            jacobian_inverses,
            num_points,
            self.space_dimension(),
            tdim,
            self.geometric_dimension(),
            self.num_components,
        )
    }

    fn map_dofs(
        &self,
        values: &mut [T],
        dof_values: &[T],
        _coordinate_dofs: &[T],
        _orientation: Orientation,
        _mapping: &dyn CoordinateMapping<T>,
    ) -> Result<(), ContractError> {
        check_buffer_len("dof values", dof_values.len(), self.space_dimension())?;
        check_buffer_len("mapped dof values", values.len(), self.space_dimension())?;
        values.copy_from_slice(dof_values);
        Ok(())
    }

    fn tabulate_reference_dof_coordinates(
        &self,
        coordinates: &mut [T],
    ) -> Result<(), ContractError> {
        site_dof_coordinates(
            coordinates,
            &self.sites,
            &[(self.base.cell_shape(), self.base.degree())],
            self.topological_dimension(),
        )
    }

    fn num_sub_elements(&self) -> usize {
        self.num_components
    }

    fn create_sub_element(&self, index: usize) -> Result<Box<dyn FiniteElement<T>>, ContractError> {
        if index < self.num_components {
            Ok(Box::new(self.base.clone()))
        } else {
            Err(ContractError::OutOfRange {
                what: "sub-element",
                index,
                bound: self.num_components,
            })
        }
    }

    fn create(&self) -> Box<dyn FiniteElement<T>> {
        Box::new(self.clone())
    }
}

impl<T: Real> FiniteElement<T> for MixedElement<T> {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn cell_shape(&self) -> CellShape {
        self.blocks[0].0.cell_shape()
    }

    fn geometric_dimension(&self) -> usize {
        self.blocks[0].0.geometric_dimension()
    }

    fn space_dimension(&self) -> usize {
        self.sites.len()
    }

    fn value_rank(&self) -> usize {
        1
    }

    fn value_dimension(&self, axis: usize) -> usize {
        assert!(axis == 0, "value axis {axis} out of range for a rank-1 element");
        self.value_size
    }

    fn reference_value_rank(&self) -> usize {
        1
    }

    fn reference_value_dimension(&self, axis: usize) -> usize {
        self.value_dimension(axis)
    }

    fn degree(&self) -> usize {
        self.degree
    }

    fn family(&self) -> &str {
        "Mixed"
    }

    fn evaluate_reference_basis(&self, values: &mut [T], points: &[T]) -> Result<(), ContractError> {
        self.evaluate_reference_basis_derivatives(values, 0, points)
    }

    fn evaluate_reference_basis_derivatives(
        &self,
        values: &mut [T],
        order: usize,
        points: &[T],
    ) -> Result<(), ContractError> {
        let blocks: Vec<_> = self
            .blocks
            .iter()
            .map(|(element, _)| (element.cell_shape(), element.degree()))
            .collect();
        evaluate_sites(
            values,
            order,
            points,
            self.topological_dimension(),
            &self.sites,
            &blocks,
            self.value_size,
        )
    }

    fn transform_reference_basis_derivatives(
        &self,
        values: &mut [T],
        order: usize,
        reference_values: &[T],
        _points: &[T],
        _jacobians: &[T],
        _jacobian_determinants: &[T],
        jacobian_inverses: &[T],
        _orientation: Orientation,
    ) -> Result<(), ContractError> {
        let tdim = self.topological_dimension();
        let per_point = self.space_dimension() * tdim.pow(order as u32) * self.value_size;
        let num_points = reference_values.len() / per_point.max(1);
        transform_identity_mapped_derivatives(
            values,
            order,
            reference_values,
            jacobian_inverses,
            num_points,
            self.space_dimension(),
            tdim,
            self.geometric_dimension(),
            self.value_size,
        )
    }

    fn map_dofs(
        &self,
        values: &mut [T],
        dof_values: &[T],
        _coordinate_dofs: &[T],
        _orientation: Orientation,
        _mapping: &dyn CoordinateMapping<T>,
    ) -> Result<(), ContractError> {
        check_buffer_len("dof values", dof_values.len(), self.space_dimension())?;
        check_buffer_len("mapped dof values", values.len(), self.space_dimension())?;
        values.copy_from_slice(dof_values);
        Ok(())
    }

    fn tabulate_reference_dof_coordinates(
        &self,
        coordinates: &mut [T],
    ) -> Result<(), ContractError> {
        let blocks: Vec<_> = self
            .blocks
            .iter()
            .map(|(element, _)| (element.cell_shape(), element.degree()))
            .collect();
        site_dof_coordinates(coordinates, &self.sites, &blocks, self.topological_dimension())
    }

    fn num_sub_elements(&self) -> usize {
        self.blocks.len()
    }

    fn create_sub_element(&self, index: usize) -> Result<Box<dyn FiniteElement<T>>, ContractError> {
        match self.blocks.get(index) {
            Some((element, 1)) => Ok(Box::new(element.clone())),
            Some((element, components)) => {
                Ok(Box::new(VectorLagrangeElement::new(element.clone(), *components)?))
            }
            None => Err(ContractError::OutOfRange {
                what: "sub-element",
                index,
                bound: self.blocks.len(),
            }),
        }
    }

    fn create(&self) -> Box<dyn FiniteElement<T>> {
        Box::new(self.clone())
    }
}
