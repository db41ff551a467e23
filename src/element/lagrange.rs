//! Scalar Lagrange elements on the reference cells.
//!
//! Supported families: degrees 1 and 2 on the simplex cells (interval,
//! triangle, tetrahedron) and degree 1 on the tensor-product cells
//! (quadrilateral, hexahedron). Dofs are point evaluations ordered
//! entity-dimension-major: vertex dofs in vertex order, then (for degree 2)
//! one dof per dimension-1 entity in reference entity order.

use crate::cell::{CellShape, Orientation};
use crate::element::{transform_identity_mapped_derivatives, FiniteElement};
use crate::error::{check_buffer_len, ContractError};
use crate::mapping::CoordinateMapping;
use crate::Real;
use numeric_literals::replace_float_literals;
use std::marker::PhantomData;

/// Number of local basis functions of the scalar Lagrange space.
pub(crate) fn scalar_space_dimension(shape: CellShape, degree: usize) -> usize {
    scalar_entity_dof_counts(shape, degree)
        .iter()
        .enumerate()
        .map(|(dim, count)| count * shape.num_entities(dim))
        .sum()
}

/// Dofs per entity of each dimension for the scalar Lagrange space.
pub(crate) fn scalar_entity_dof_counts(shape: CellShape, degree: usize) -> Vec<usize> {
    let mut counts = vec![0; shape.dimension() + 1];
    counts[0] = 1;
    if degree == 2 {
        counts[1] = 1;
    }
    counts
}

/// Local dof indices attached to entity `(dim, index)` of the scalar
/// Lagrange space, as a contiguous range in the entity-dimension-major
/// ordering.
pub(crate) fn scalar_entity_dofs(
    shape: CellShape,
    degree: usize,
    dim: usize,
    index: usize,
) -> std::ops::Range<usize> {
    let counts = scalar_entity_dof_counts(shape, degree);
    let offset: usize = (0..dim).map(|d| counts[d] * shape.num_entities(d)).sum();
    let start = offset + index * counts[dim];
    start..start + counts[dim]
}

/// Reference coordinates of the scalar Lagrange dofs, flattened
/// `[space_dimension][topological_dimension]`.
pub(crate) fn scalar_dof_coordinates(shape: CellShape, degree: usize) -> Vec<f64> {
    let tdim = shape.dimension();
    let vertices = shape.reference_vertices();
    let mut coordinates = vertices.to_vec();
    if degree == 2 {
        for entity in 0..shape.num_entities(1) {
            let entity_vertices = shape.entity_vertices(1, entity);
            for axis in 0..tdim {
                let sum: f64 = entity_vertices.iter().map(|&v| vertices[v * tdim + axis]).sum();
                coordinates.push(sum / entity_vertices.len() as f64);
            }
        }
    }
    coordinates
}

pub(crate) fn check_lagrange_supported(
    shape: CellShape,
    degree: usize,
) -> Result<(), ContractError> {
    match shape {
        CellShape::Vertex => Err(ContractError::UnsupportedOperation(
            "Lagrange elements are not defined on vertex cells",
        )),
        CellShape::Interval | CellShape::Triangle | CellShape::Tetrahedron => match degree {
            1 | 2 => Ok(()),
            _ => Err(ContractError::UnsupportedOperation(
                "Lagrange simplex elements support degrees 1 and 2 only",
            )),
        },
        CellShape::Quadrilateral | CellShape::Hexahedron => match degree {
            1 => Ok(()),
            _ => Err(ContractError::UnsupportedOperation(
                "Lagrange tensor-product elements support degree 1 only",
            )),
        },
    }
}

/// Evaluates the derivative `counts` (per-axis derivative multiplicities) of
/// every scalar Lagrange basis function at the reference point `x`, writing
/// one value per basis function into `out`.
pub(crate) fn tabulate_scalar_basis<T: Real>(
    shape: CellShape,
    degree: usize,
    counts: &[usize],
    x: &[T],
    out: &mut [T],
) {
    match shape {
        CellShape::Interval | CellShape::Triangle | CellShape::Tetrahedron => {
            tabulate_simplex(shape, degree, counts, x, out)
        }
        CellShape::Quadrilateral | CellShape::Hexahedron => {
            tabulate_tensor_product(shape.dimension(), counts, x, out)
        }
        CellShape::Vertex => unreachable!("vertex cells carry no Lagrange basis"),
    }
}

/// Gradient of barycentric coordinate `a` along reference axis `i`; constant
/// on the simplex.
fn barycentric_gradient<T: Real>(a: usize, i: usize) -> T {
    if a == 0 {
        -T::one()
    } else if a - 1 == i {
        T::one()
    } else {
        T::zero()
    }
}

#[replace_float_literals(T::from_f64(literal).expect("literal must be representable in T"))]
fn tabulate_simplex<T: Real>(
    shape: CellShape,
    degree: usize,
    counts: &[usize],
    x: &[T],
    out: &mut [T],
) {
    let tdim = shape.dimension();
    let order: usize = counts.iter().sum();
    if order > degree {
        out.fill(T::zero());
        return;
    }

    // Barycentric coordinates; lambda[0] completes the partition of unity.
    let mut lambda = [T::zero(); 4];
    lambda[0] = T::one();
    for i in 0..tdim {
        lambda[0] -= x[i];
        lambda[i + 1] = x[i];
    }
    // Derivative axes with multiplicity, e.g. counts [1, 1] -> [0, 1].
    let mut axes = [0usize; 2];
    let mut num_axes = 0;
    for (axis, &count) in counts.iter().enumerate() {
        for _ in 0..count {
            axes[num_axes] = axis;
            num_axes += 1;
        }
    }

    let num_vertices = tdim + 1;
    match (degree, order) {
        (1, 0) => {
            out[..num_vertices].copy_from_slice(&lambda[..num_vertices]);
        }
        (1, 1) => {
            for a in 0..num_vertices {
                out[a] = barycentric_gradient(a, axes[0]);
            }
        }
        (2, 0) => {
            for a in 0..num_vertices {
                out[a] = lambda[a] * (2.0 * lambda[a] - 1.0);
            }
            for edge in 0..shape.num_entities(1) {
                let ev = shape.entity_vertices(1, edge);
                out[num_vertices + edge] = 4.0 * lambda[ev[0]] * lambda[ev[1]];
            }
        }
        (2, 1) => {
            let i = axes[0];
            for a in 0..num_vertices {
                out[a] = (4.0 * lambda[a] - 1.0) * barycentric_gradient(a, i);
            }
            for edge in 0..shape.num_entities(1) {
                let ev = shape.entity_vertices(1, edge);
                out[num_vertices + edge] = 4.0
                    * (lambda[ev[0]] * barycentric_gradient(ev[1], i)
                        + lambda[ev[1]] * barycentric_gradient(ev[0], i));
            }
        }
        (2, 2) => {
            let (i, j) = (axes[0], axes[1]);
            for a in 0..num_vertices {
                out[a] =
                    4.0 * barycentric_gradient::<T>(a, i) * barycentric_gradient::<T>(a, j);
            }
            for edge in 0..shape.num_entities(1) {
                let ev = shape.entity_vertices(1, edge);
                out[num_vertices + edge] = 4.0
                    * (barycentric_gradient::<T>(ev[0], i) * barycentric_gradient::<T>(ev[1], j)
                        + barycentric_gradient::<T>(ev[1], i)
                            * barycentric_gradient::<T>(ev[0], j));
            }
        }
        _ => unreachable!("order exceeding degree is handled above"),
    }
}

fn tabulate_tensor_product<T: Real>(tdim: usize, counts: &[usize], x: &[T], out: &mut [T]) {
    for v in 0..(1usize << tdim) {
        let mut value = T::one();
        for i in 0..tdim {
            let upper = (v >> i) & 1 == 1;
            let factor = match counts[i] {
                0 => {
                    if upper {
                        x[i]
                    } else {
                        T::one() - x[i]
                    }
                }
                1 => {
                    if upper {
                        T::one()
                    } else {
                        -T::one()
                    }
                }
                _ => T::zero(),
            };
            value *= factor;
        }
        out[v] = value;
    }
}

/// A scalar Lagrange element.
///
/// The geometric dimension defaults to the topological dimension; a larger
/// one embeds the element in a higher-dimensional space for manifold cells.
#[derive(Debug, Clone)]
pub struct LagrangeElement<T: Real> {
    shape: CellShape,
    degree: usize,
    geometric_dimension: usize,
    signature: String,
    marker: PhantomData<fn() -> T>,
}

impl<T: Real> LagrangeElement<T> {
    pub fn new(shape: CellShape, degree: usize) -> Result<Self, ContractError> {
        Self::with_geometric_dimension(shape, degree, shape.dimension())
    }

    /// Creates an element embedded in a `geometric_dimension`-dimensional
    /// space. Must satisfy
    /// `shape.dimension() <= geometric_dimension <= 3`.
    pub fn with_geometric_dimension(
        shape: CellShape,
        degree: usize,
        geometric_dimension: usize,
    ) -> Result<Self, ContractError> {
        check_lagrange_supported(shape, degree)?;
        if geometric_dimension < shape.dimension() || geometric_dimension > 3 {
            return Err(ContractError::OutOfRange {
                what: "geometric dimension",
                index: geometric_dimension,
                bound: 4,
            });
        }
        let signature = if geometric_dimension == shape.dimension() {
            format!("FiniteElement(Lagrange, {shape:?}, {degree})")
        } else {
            format!("FiniteElement(Lagrange, {shape:?}, {degree}, gdim={geometric_dimension})")
        };
        Ok(Self {
            shape,
            degree,
            geometric_dimension,
            signature,
            marker: PhantomData,
        })
    }

    fn check_points(&self, points: &[T]) -> Result<usize, ContractError> {
        let tdim = self.shape.dimension();
        let num_points = points.len() / tdim;
        check_buffer_len("reference point coordinates", points.len(), num_points * tdim)?;
        Ok(num_points)
    }
}

impl<T: Real> FiniteElement<T> for LagrangeElement<T> {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn cell_shape(&self) -> CellShape {
        self.shape
    }

    fn geometric_dimension(&self) -> usize {
        self.geometric_dimension
    }

    fn space_dimension(&self) -> usize {
        scalar_space_dimension(self.shape, self.degree)
    }

    fn value_rank(&self) -> usize {
        0
    }

    fn value_dimension(&self, axis: usize) -> usize {
        panic!("value axis {axis} out of range for a rank-0 element")
    }

    fn reference_value_rank(&self) -> usize {
        0
    }

    fn reference_value_dimension(&self, axis: usize) -> usize {
        panic!("value axis {axis} out of range for a rank-0 element")
    }

    fn degree(&self) -> usize {
        self.degree
    }

    fn family(&self) -> &str {
        "Lagrange"
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
        let tdim = self.shape.dimension();
        let space_dim = self.space_dimension();
        let num_points = self.check_points(points)?;
        let num_derivatives = tdim.pow(order as u32);
        check_buffer_len(
            "basis derivative values",
            values.len(),
            num_points * space_dim * num_derivatives,
        )?;

        let mut counts = vec![0usize; tdim];
        let mut scratch = vec![T::zero(); space_dim];
        for p in 0..num_points {
            let x = &points[p * tdim..(p + 1) * tdim];
            for tuple in 0..num_derivatives {
                counts.fill(0);
                let mut rest = tuple;
                for _ in 0..order {
                    counts[rest % tdim] += 1;
                    rest /= tdim;
                }
                let base = (p * space_dim * num_derivatives) + tuple;
                // Values for one derivative tuple are strided by
                // num_derivatives in the [point][dof][tuple] layout, so
                // tabulate into scratch and scatter.
                tabulate_scalar_basis(self.shape, self.degree, &counts, x, &mut scratch);
                for (dof, &value) in scratch.iter().enumerate() {
                    values[base + dof * num_derivatives] = value;
                }
            }
        }
        Ok(())
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
        let tdim = self.shape.dimension();
        let gdim = self.geometric_dimension;
        let num_ref = tdim.pow(order as u32);
        let num_points = reference_values.len() / (self.space_dimension() * num_ref).max(1);
        transform_identity_mapped_derivatives(
            values,
            order,
            reference_values,
            jacobian_inverses,
            num_points,
            self.space_dimension(),
            tdim,
            gdim,
            1,
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
        // Point evaluations are invariant under the geometric map.
        values.copy_from_slice(dof_values);
        Ok(())
    }

    fn tabulate_reference_dof_coordinates(
        &self,
        coordinates: &mut [T],
    ) -> Result<(), ContractError> {
        let reference = scalar_dof_coordinates(self.shape, self.degree);
        check_buffer_len("dof coordinates", coordinates.len(), reference.len())?;
        for (out, &coordinate) in coordinates.iter_mut().zip(&reference) {
            *out = T::from_f64(coordinate).expect("literal must be representable in T");
        }
        Ok(())
    }

    fn num_sub_elements(&self) -> usize {
        0
    }

    fn create_sub_element(&self, index: usize) -> Result<Box<dyn FiniteElement<T>>, ContractError> {
        Err(ContractError::OutOfRange {
            what: "sub-element",
            index,
            bound: 0,
        })
    }

    fn create(&self) -> Box<dyn FiniteElement<T>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellShape;

    fn basis_at(element: &LagrangeElement<f64>, point: &[f64]) -> Vec<f64> {
        let mut values = vec![0.0; element.space_dimension()];
        element.evaluate_reference_basis(&mut values, point).unwrap();
        values
    }

    #[test]
    fn p1_triangle_is_barycentric() {
        let element = LagrangeElement::<f64>::new(CellShape::Triangle, 1).unwrap();
        let values = basis_at(&element, &[0.25, 0.5]);
        assert_eq!(values, vec![0.25, 0.25, 0.5]);
    }

    #[test]
    fn p2_basis_is_nodal() {
        for shape in [CellShape::Interval, CellShape::Triangle, CellShape::Tetrahedron] {
            let element = LagrangeElement::<f64>::new(shape, 2).unwrap();
            let space_dim = element.space_dimension();
            let tdim = shape.dimension();
            let mut coordinates = vec![0.0; space_dim * tdim];
            element.tabulate_reference_dof_coordinates(&mut coordinates).unwrap();
            for dof in 0..space_dim {
                let values = basis_at(&element, &coordinates[dof * tdim..(dof + 1) * tdim]);
                for (other, &value) in values.iter().enumerate() {
                    let expected = if other == dof { 1.0 } else { 0.0 };
                    assert!(
                        (value - expected).abs() < 1e-14,
                        "basis {other} at dof {dof} of {shape:?}: {value}"
                    );
                }
            }
        }
    }

    #[test]
    fn q1_hexahedron_partitions_unity() {
        let element = LagrangeElement::<f64>::new(CellShape::Hexahedron, 1).unwrap();
        let values = basis_at(&element, &[0.3, 0.7, 0.1]);
        let sum: f64 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-14);
        assert!(values.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn first_derivatives_of_p1_sum_to_zero() {
        let element = LagrangeElement::<f64>::new(CellShape::Tetrahedron, 1).unwrap();
        let mut values = vec![0.0; 4 * 3];
        element
            .evaluate_reference_basis_derivatives(&mut values, 1, &[0.1, 0.2, 0.3])
            .unwrap();
        for axis in 0..3 {
            let sum: f64 = (0..4).map(|dof| values[dof * 3 + axis]).sum();
            assert!(sum.abs() < 1e-14);
        }
    }

    #[test]
    fn second_derivatives_of_p2_interval_are_constant() {
        let element = LagrangeElement::<f64>::new(CellShape::Interval, 2).unwrap();
        let mut values = vec![0.0; 3];
        element
            .evaluate_reference_basis_derivatives(&mut values, 2, &[0.42])
            .unwrap();
        assert_eq!(values, vec![4.0, 4.0, -8.0]);
    }

    #[test]
    fn unsupported_degrees_are_rejected() {
        assert!(matches!(
            LagrangeElement::<f64>::new(CellShape::Triangle, 3),
            Err(ContractError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            LagrangeElement::<f64>::new(CellShape::Quadrilateral, 2),
            Err(ContractError::UnsupportedOperation(_))
        ));
    }
}
