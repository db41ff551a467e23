//! The finite element contract: basis functions on a reference cell.
//!
//! [`FiniteElement`] is the abstract interface intended for same-binary
//! linkage between generated code and a driver. [`ElementDescriptor`] is the
//! flat plain-data record intended for binary-stable boundaries; the two
//! representations are convertible via [`ElementDescriptor::from_element`].
//!
//! Buffer layouts follow the assembly conventions throughout: basis values
//! are `[num_points][space_dimension][reference_value_size]` row-major,
//! derivative tabulations append a `[num_derivatives]` axis before the value
//! axis with `num_derivatives = topological_dimension ^ order`, and
//! transformed (physical) derivatives use `geometric_dimension ^ order`
//! derivative tuples and `value_size` value components.

use crate::cell::{CellShape, Orientation};
use crate::error::ContractError;
use crate::mapping::CoordinateMapping;
use crate::Real;
use serde::{Deserialize, Serialize};

pub(crate) mod lagrange;
mod mixed;

pub use lagrange::LagrangeElement;
pub use mixed::{MixedElement, VectorLagrangeElement};

/// A scalar-, vector- or tensor-valued basis defined on a reference cell.
///
/// Instances are immutable after creation; all operations are read-only
/// queries or pure computations over caller-supplied buffers, so a single
/// instance may be shared across threads.
pub trait FiniteElement<T: Real>: Send + Sync {
    /// String identifying the element, used by drivers for caching and
    /// dispatch; not consumed by the element itself.
    fn signature(&self) -> &str;

    /// The reference cell the basis is defined on.
    fn cell_shape(&self) -> CellShape;

    /// Topological dimension of the reference cell.
    fn topological_dimension(&self) -> usize {
        self.cell_shape().dimension()
    }

    /// Geometric dimension of the physical cells the element is mapped to.
    /// Exceeds the topological dimension on manifolds.
    fn geometric_dimension(&self) -> usize;

    /// Number of local basis functions.
    fn space_dimension(&self) -> usize;

    /// Rank of the (physical) value space.
    fn value_rank(&self) -> usize;

    /// Dimension of the (physical) value space along `axis`.
    ///
    /// # Panics
    ///
    /// Panics if `axis >= self.value_rank()`.
    fn value_dimension(&self, axis: usize) -> usize;

    /// Number of components of the (physical) value space: the product of
    /// the value dimensions over all axes.
    fn value_size(&self) -> usize {
        (0..self.value_rank())
            .map(|axis| self.value_dimension(axis))
            .product()
    }

    /// Rank of the reference value space. May differ from [`value_rank`]
    /// for elements whose pull-back changes the value shape.
    ///
    /// [`value_rank`]: FiniteElement::value_rank
    fn reference_value_rank(&self) -> usize;

    /// Dimension of the reference value space along `axis`.
    ///
    /// # Panics
    ///
    /// Panics if `axis >= self.reference_value_rank()`.
    fn reference_value_dimension(&self, axis: usize) -> usize;

    /// Number of components of the reference value space.
    fn reference_value_size(&self) -> usize {
        (0..self.reference_value_rank())
            .map(|axis| self.reference_value_dimension(axis))
            .product()
    }

    /// Maximum polynomial degree of the element function space.
    fn degree(&self) -> usize;

    /// Family name of the element function space.
    fn family(&self) -> &str;

    /// Evaluates all basis functions at the given reference points.
    ///
    /// `points` holds `[num_points][topological_dimension]` reference
    /// coordinates; `values` receives
    /// `[num_points][space_dimension][reference_value_size]` basis values.
    fn evaluate_reference_basis(&self, values: &mut [T], points: &[T])
        -> Result<(), ContractError>;

    /// Evaluates all partial derivatives of order exactly `order` of all
    /// basis functions at the given reference points.
    ///
    /// `values` receives
    /// `[num_points][space_dimension][num_derivatives][reference_value_size]`
    /// entries where `num_derivatives = topological_dimension ^ order` and
    /// derivative tuples `(d_1, ..., d_order)` are enumerated
    /// lexicographically. `order == 0` coincides with
    /// [`evaluate_reference_basis`].
    ///
    /// [`evaluate_reference_basis`]: FiniteElement::evaluate_reference_basis
    fn evaluate_reference_basis_derivatives(
        &self,
        values: &mut [T],
        order: usize,
        points: &[T],
    ) -> Result<(), ContractError>;

    /// Pushes reference derivative values forward to physical space.
    ///
    /// `reference_values` is laid out as produced by
    /// [`evaluate_reference_basis_derivatives`]; `values` receives
    /// `[num_points][space_dimension][gdim^order][value_size]` physical
    /// derivatives. `points`, `jacobians`, `jacobian_determinants` and
    /// `jacobian_inverses` are the per-point geometry quantities in the
    /// layouts of [`CoordinateMapping`]; `orientation` is the sign
    /// convention for manifold cells.
    ///
    /// [`evaluate_reference_basis_derivatives`]: FiniteElement::evaluate_reference_basis_derivatives
    #[allow(clippy::too_many_arguments)]
    fn transform_reference_basis_derivatives(
        &self,
        values: &mut [T],
        order: usize,
        reference_values: &[T],
        points: &[T],
        jacobians: &[T],
        jacobian_determinants: &[T],
        jacobian_inverses: &[T],
        orientation: Orientation,
    ) -> Result<(), ContractError>;

    /// Remaps raw dof values according to the coordinate mapping.
    ///
    /// Needed for elements whose basis is not invariant under the geometric
    /// map (e.g. Piola-mapped elements); identity for affine-equivalent
    /// families such as Lagrange.
    fn map_dofs(
        &self,
        values: &mut [T],
        dof_values: &[T],
        coordinate_dofs: &[T],
        orientation: Orientation,
        mapping: &dyn CoordinateMapping<T>,
    ) -> Result<(), ContractError>;

    /// Tabulates the reference-cell coordinates associated with each local
    /// dof into `coordinates`, laid out
    /// `[space_dimension][topological_dimension]`.
    ///
    /// Returns [`ContractError::UnsupportedOperation`] for elements without
    /// point-evaluation dofs.
    fn tabulate_reference_dof_coordinates(&self, coordinates: &mut [T])
        -> Result<(), ContractError>;

    /// Number of sub-elements; 0 for simple elements.
    fn num_sub_elements(&self) -> usize;

    /// Creates sub-element `index`, independently owned by the caller.
    fn create_sub_element(&self, index: usize) -> Result<Box<dyn FiniteElement<T>>, ContractError>;

    /// Creates a new instance of this element.
    fn create(&self) -> Box<dyn FiniteElement<T>>;
}

/// The flat element descriptor: a plain data record of the element's static
/// metadata, the binary-stable counterpart of the [`FiniteElement`] trait.
///
/// Every field is optional; `None` is the explicit "unset / not applicable"
/// state that the original sentinel values (`-1`, null) encoded, and must be
/// checked before use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub signature: Option<String>,
    pub cell_shape: Option<CellShape>,
    pub topological_dimension: Option<usize>,
    pub geometric_dimension: Option<usize>,
    pub space_dimension: Option<usize>,
    pub value_rank: Option<usize>,
    pub value_dimensions: Option<Vec<usize>>,
    pub value_size: Option<usize>,
    pub reference_value_rank: Option<usize>,
    pub reference_value_dimensions: Option<Vec<usize>>,
    pub reference_value_size: Option<usize>,
    pub degree: Option<usize>,
    pub family: Option<String>,
    pub num_sub_elements: Option<usize>,
}

impl ElementDescriptor {
    /// Builds a fully populated descriptor from any element.
    pub fn from_element<T: Real>(element: &dyn FiniteElement<T>) -> Self {
        Self {
            signature: Some(element.signature().to_string()),
            cell_shape: Some(element.cell_shape()),
            topological_dimension: Some(element.topological_dimension()),
            geometric_dimension: Some(element.geometric_dimension()),
            space_dimension: Some(element.space_dimension()),
            value_rank: Some(element.value_rank()),
            value_dimensions: Some((0..element.value_rank()).map(|a| element.value_dimension(a)).collect()),
            value_size: Some(element.value_size()),
            reference_value_rank: Some(element.reference_value_rank()),
            reference_value_dimensions: Some(
                (0..element.reference_value_rank())
                    .map(|a| element.reference_value_dimension(a))
                    .collect(),
            ),
            reference_value_size: Some(element.reference_value_size()),
            degree: Some(element.degree()),
            family: Some(element.family().to_string()),
            num_sub_elements: Some(element.num_sub_elements()),
        }
    }

    /// Checks the value-size invariants: the product of the (reference)
    /// value dimensions must equal the (reference) value size whenever both
    /// are set.
    pub fn validate(&self) -> Result<(), ContractError> {
        if let (Some(dims), Some(size)) = (&self.value_dimensions, self.value_size) {
            let product: usize = dims.iter().product();
            if product != size {
                return Err(ContractError::SizeMismatch {
                    what: "value_dimensions product",
                    expected: size,
                    actual: product,
                });
            }
        }
        if let (Some(dims), Some(size)) = (&self.reference_value_dimensions, self.reference_value_size) {
            let product: usize = dims.iter().product();
            if product != size {
                return Err(ContractError::SizeMismatch {
                    what: "reference_value_dimensions product",
                    expected: size,
                    actual: product,
                });
            }
        }
        Ok(())
    }
}

/// Pushforward of reference derivatives for identity-mapped (affine
/// equivalent) elements: each physical derivative tuple contracts one copy
/// of the inverse Jacobian per derivative axis, and value components map
/// unchanged.
///
/// Shared by the Lagrange element families.
#[allow(clippy::too_many_arguments)]
pub(crate) fn transform_identity_mapped_derivatives<T: Real>(
    values: &mut [T],
    order: usize,
    reference_values: &[T],
    jacobian_inverses: &[T],
    num_points: usize,
    space_dimension: usize,
    tdim: usize,
    gdim: usize,
    value_size: usize,
) -> Result<(), ContractError> {
    let num_ref_derivatives = tdim.pow(order as u32);
    let num_phys_derivatives = gdim.pow(order as u32);
    crate::error::check_buffer_len(
        "reference derivative values",
        reference_values.len(),
        num_points * space_dimension * num_ref_derivatives * value_size,
    )?;
    crate::error::check_buffer_len(
        "transformed derivative values",
        values.len(),
        num_points * space_dimension * num_phys_derivatives * value_size,
    )?;
    crate::error::check_buffer_len(
        "jacobian inverses",
        jacobian_inverses.len(),
        num_points * tdim * gdim,
    )?;

    for p in 0..num_points {
        let k_point = &jacobian_inverses[p * tdim * gdim..(p + 1) * tdim * gdim];
        for dof in 0..space_dimension {
            let ref_base = (p * space_dimension + dof) * num_ref_derivatives * value_size;
            let phys_base = (p * space_dimension + dof) * num_phys_derivatives * value_size;
            for phys_tuple in 0..num_phys_derivatives {
                for component in 0..value_size {
                    let mut value = T::zero();
                    for ref_tuple in 0..num_ref_derivatives {
                        // Weight is the product over derivative axes of
                        // K[ref digit][phys digit].
                        let mut weight = T::one();
                        let mut pt = phys_tuple;
                        let mut rt = ref_tuple;
                        for _ in 0..order {
                            let j = pt % gdim;
                            let k = rt % tdim;
                            pt /= gdim;
                            rt /= tdim;
                            weight *= k_point[k * gdim + j];
                        }
                        value += weight
                            * reference_values[ref_base + ref_tuple * value_size + component];
                    }
                    values[phys_base + phys_tuple * value_size + component] = value;
                }
            }
        }
    }
    Ok(())
}
