//! Coordinate mappings between reference and physical cells.
//!
//! Buffer layouts, all row-major and caller-allocated: physical points `x`
//! are `[num_points][gdim]`, reference points `X` are `[num_points][tdim]`,
//! Jacobians `J` are `[num_points][gdim][tdim]`, their determinants one
//! scalar per point and their inverses `K` `[num_points][tdim][gdim]`. On
//! manifold cells (`tdim < gdim`) the determinant is the pseudo-determinant
//! `sign * sqrt(det(J^T J))` with the sign taken from the cell orientation,
//! and `K` is the left pseudo-inverse `(J^T J)^{-1} J^T`.

use crate::cell::{CellShape, Orientation};
use crate::dofmap::{CellDofmap, Dofmap};
use crate::element::{FiniteElement, LagrangeElement, VectorLagrangeElement};
use crate::error::{check_buffer_len, ContractError};
use crate::Real;
use log::warn;

/// The geometric map of one cell type.
///
/// Implementations are immutable and shareable across threads.
pub trait CoordinateMapping<T: Real>: Send + Sync {
    /// String identifying the mapping, used by drivers for caching and
    /// dispatch.
    fn signature(&self) -> &str;

    /// The reference cell the mapping is defined on.
    fn cell_shape(&self) -> CellShape;

    fn topological_dimension(&self) -> usize {
        self.cell_shape().dimension()
    }

    fn geometric_dimension(&self) -> usize;

    /// Creates a new instance of this mapping.
    fn create(&self) -> Box<dyn CoordinateMapping<T>>;

    /// The (vector-valued) element of the coordinate field.
    fn create_coordinate_element(&self) -> Box<dyn FiniteElement<T>>;

    /// The dofmap of the coordinate field.
    fn create_coordinate_dofmap(&self) -> Box<dyn Dofmap>;

    /// Maps reference points forward to physical coordinates.
    fn compute_physical_coordinates(
        &self,
        x: &mut [T],
        reference: &[T],
        coordinate_dofs: &[T],
    ) -> Result<(), ContractError>;

    /// Maps physical points back to reference coordinates.
    ///
    /// Affine cells are inverted directly; all other cells run a bounded
    /// Newton iteration from the cell midpoint and return
    /// [`ContractError::NumericDivergence`] when it does not converge, e.g.
    /// for points far outside the cell's image. On manifold cells the
    /// orientation flag fixes the sign convention of the pseudo-inverse
    /// update.
    fn compute_reference_coordinates(
        &self,
        reference: &mut [T],
        x: &[T],
        coordinate_dofs: &[T],
        orientation: Orientation,
    ) -> Result<(), ContractError>;

    /// Combined pull-back: reference coordinates plus Jacobians,
    /// determinants and inverses at those reference points.
    #[allow(clippy::too_many_arguments)]
    fn compute_reference_geometry(
        &self,
        reference: &mut [T],
        jacobians: &mut [T],
        determinants: &mut [T],
        inverses: &mut [T],
        x: &[T],
        coordinate_dofs: &[T],
        orientation: Orientation,
    ) -> Result<(), ContractError>;

    /// Jacobians of the map at the given reference points.
    fn compute_jacobians(
        &self,
        jacobians: &mut [T],
        reference: &[T],
        coordinate_dofs: &[T],
    ) -> Result<(), ContractError>;

    /// (Pseudo-)determinants of precomputed Jacobians.
    fn compute_jacobian_determinants(
        &self,
        determinants: &mut [T],
        jacobians: &[T],
        orientation: Orientation,
    ) -> Result<(), ContractError>;

    /// (Pseudo-)inverses of precomputed Jacobians.
    ///
    /// A degenerate Jacobian produces non-finite entries rather than an
    /// error, matching the division-by-determinant formulation.
    fn compute_jacobian_inverses(
        &self,
        inverses: &mut [T],
        jacobians: &[T],
    ) -> Result<(), ContractError>;

    /// Combined push-forward: physical coordinates plus Jacobians,
    /// determinants and inverses at the given reference points.
    #[allow(clippy::too_many_arguments)]
    fn compute_geometry(
        &self,
        x: &mut [T],
        jacobians: &mut [T],
        determinants: &mut [T],
        inverses: &mut [T],
        reference: &[T],
        coordinate_dofs: &[T],
        orientation: Orientation,
    ) -> Result<(), ContractError>;

    /// Physical coordinates and Jacobian at the reference cell midpoint.
    fn compute_midpoint_geometry(
        &self,
        x: &mut [T],
        jacobians: &mut [T],
        coordinate_dofs: &[T],
    ) -> Result<(), ContractError>;
}

const NEWTON_MAX_ITERATIONS: usize = 30;
const NEWTON_TOLERANCE: f64 = 1e-12;

/// Determinant of a small square matrix stored row-major.
fn determinant_small<T: Real>(m: &[T], n: usize) -> T {
    match n {
        1 => m[0],
        2 => m[0] * m[3] - m[1] * m[2],
        3 => {
            m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
                + m[2] * (m[3] * m[7] - m[4] * m[6])
        }
        _ => unreachable!("dimensions above 3 are not part of the contract"),
    }
}

/// Inverse of a small square matrix via adjugate over determinant; a zero
/// determinant yields non-finite entries.
fn invert_small<T: Real>(m: &[T], n: usize, out: &mut [T]) {
    let det = determinant_small(m, n);
    match n {
        1 => out[0] = T::one() / det,
        2 => {
            out[0] = m[3] / det;
            out[1] = -m[1] / det;
            out[2] = -m[2] / det;
            out[3] = m[0] / det;
        }
        3 => {
            out[0] = (m[4] * m[8] - m[5] * m[7]) / det;
            out[1] = (m[2] * m[7] - m[1] * m[8]) / det;
            out[2] = (m[1] * m[5] - m[2] * m[4]) / det;
            out[3] = (m[5] * m[6] - m[3] * m[8]) / det;
            out[4] = (m[0] * m[8] - m[2] * m[6]) / det;
            out[5] = (m[2] * m[3] - m[0] * m[5]) / det;
            out[6] = (m[3] * m[7] - m[4] * m[6]) / det;
            out[7] = (m[1] * m[6] - m[0] * m[7]) / det;
            out[8] = (m[0] * m[4] - m[1] * m[3]) / det;
        }
        _ => unreachable!("dimensions above 3 are not part of the contract"),
    }
}

/// The built-in coordinate mapping: an isoparametric map spanned by a scalar
/// Lagrange basis with one coordinate node per basis function.
#[derive(Debug, Clone)]
pub struct IsoparametricMapping<T: Real> {
    scalar: LagrangeElement<T>,
    shape: CellShape,
    degree: usize,
    geometric_dimension: usize,
    signature: String,
}

impl<T: Real> IsoparametricMapping<T> {
    pub fn new(shape: CellShape, degree: usize) -> Result<Self, ContractError> {
        Self::with_geometric_dimension(shape, degree, shape.dimension())
    }

    pub fn with_geometric_dimension(
        shape: CellShape,
        degree: usize,
        geometric_dimension: usize,
    ) -> Result<Self, ContractError> {
        let scalar = LagrangeElement::with_geometric_dimension(shape, degree, geometric_dimension)?;
        let signature =
            format!("CoordinateMapping(Lagrange, {shape:?}, {degree}, gdim={geometric_dimension})");
        Ok(Self {
            scalar,
            shape,
            degree,
            geometric_dimension,
            signature,
        })
    }

    /// Number of coordinate nodes per cell (one per scalar basis function).
    pub fn num_coordinate_nodes(&self) -> usize {
        self.scalar.space_dimension()
    }

    /// The map is invertible in closed form when the coordinate field is
    /// affine, i.e. degree 1 on a simplex.
    fn is_affine(&self) -> bool {
        self.shape.is_simplex() && self.degree == 1
    }

    fn check_coordinate_dofs(&self, coordinate_dofs: &[T]) -> Result<(), ContractError> {
        check_buffer_len(
            "coordinate dofs",
            coordinate_dofs.len(),
            self.num_coordinate_nodes() * self.geometric_dimension,
        )
    }

    /// Forward map and Jacobian at a single reference point.
    fn point_geometry(
        &self,
        x: &mut [T],
        jacobian: &mut [T],
        reference: &[T],
        coordinate_dofs: &[T],
    ) -> Result<(), ContractError> {
        let gdim = self.geometric_dimension;
        let tdim = self.shape.dimension();
        let nodes = self.num_coordinate_nodes();
        let mut basis = vec![T::zero(); nodes];
        let mut gradients = vec![T::zero(); nodes * tdim];
        self.scalar.evaluate_reference_basis(&mut basis, reference)?;
        self.scalar
            .evaluate_reference_basis_derivatives(&mut gradients, 1, reference)?;
        for i in 0..gdim {
            let mut coordinate = T::zero();
            for k in 0..nodes {
                coordinate += coordinate_dofs[k * gdim + i] * basis[k];
            }
            x[i] = coordinate;
            for j in 0..tdim {
                let mut entry = T::zero();
                for k in 0..nodes {
                    entry += coordinate_dofs[k * gdim + i] * gradients[k * tdim + j];
                }
                jacobian[i * tdim + j] = entry;
            }
        }
        Ok(())
    }

    /// Pseudo-inverse `(J^T J)^{-1} J^T` of one Jacobian block; reduces to
    /// the plain inverse when `tdim == gdim`.
    fn invert_jacobian(&self, inverse: &mut [T], jacobian: &[T]) {
        let gdim = self.geometric_dimension;
        let tdim = self.shape.dimension();
        if gdim == tdim {
            invert_small(jacobian, tdim, inverse);
            return;
        }
        let mut gram = [T::zero(); 9];
        for a in 0..tdim {
            for b in 0..tdim {
                let mut entry = T::zero();
                for i in 0..gdim {
                    entry += jacobian[i * tdim + a] * jacobian[i * tdim + b];
                }
                gram[a * tdim + b] = entry;
            }
        }
        let mut gram_inverse = [T::zero(); 9];
        invert_small(&gram[..tdim * tdim], tdim, &mut gram_inverse[..tdim * tdim]);
        for a in 0..tdim {
            for i in 0..gdim {
                let mut entry = T::zero();
                for b in 0..tdim {
                    entry += gram_inverse[a * tdim + b] * jacobian[i * tdim + b];
                }
                inverse[a * gdim + i] = entry;
            }
        }
    }

    fn jacobian_determinant(&self, jacobian: &[T], orientation: Orientation) -> T {
        let gdim = self.geometric_dimension;
        let tdim = self.shape.dimension();
        if gdim == tdim {
            return determinant_small(jacobian, tdim);
        }
        let mut gram = [T::zero(); 9];
        for a in 0..tdim {
            for b in 0..tdim {
                let mut entry = T::zero();
                for i in 0..gdim {
                    entry += jacobian[i * tdim + a] * jacobian[i * tdim + b];
                }
                gram[a * tdim + b] = entry;
            }
        }
        orientation.sign::<T>() * determinant_small(&gram[..tdim * tdim], tdim).sqrt()
    }

    fn tolerance() -> T {
        T::from_f64(NEWTON_TOLERANCE).expect("literal must be representable in T")
    }

    /// Inverts the map for one physical point by Newton iteration from the
    /// cell midpoint.
    fn invert_point(
        &self,
        reference: &mut [T],
        x: &[T],
        coordinate_dofs: &[T],
    ) -> Result<(), ContractError> {
        let gdim = self.geometric_dimension;
        let tdim = self.shape.dimension();
        for (coordinate, &midpoint) in reference.iter_mut().zip(self.shape.midpoint()) {
            *coordinate = T::from_f64(midpoint).expect("literal must be representable in T");
        }
        let mut x_norm_sq = T::zero();
        for &coordinate in x {
            x_norm_sq += coordinate * coordinate;
        }
        let threshold = Self::tolerance() * Self::tolerance() * T::one().max(x_norm_sq);

        let mut mapped = vec![T::zero(); gdim];
        let mut jacobian = vec![T::zero(); gdim * tdim];
        let mut inverse = vec![T::zero(); tdim * gdim];
        for _ in 0..NEWTON_MAX_ITERATIONS {
            self.point_geometry(&mut mapped, &mut jacobian, reference, coordinate_dofs)?;
            let mut residual_norm_sq = T::zero();
            for i in 0..gdim {
                let r = x[i] - mapped[i];
                residual_norm_sq += r * r;
            }
            if residual_norm_sq <= threshold {
                return Ok(());
            }
            self.invert_jacobian(&mut inverse, &jacobian);
            for a in 0..tdim {
                let mut step = T::zero();
                for i in 0..gdim {
                    step += inverse[a * gdim + i] * (x[i] - mapped[i]);
                }
                reference[a] += step;
            }
        }
        warn!(
            "reference coordinate inversion did not converge on {:?} after {} iterations",
            self.shape, NEWTON_MAX_ITERATIONS
        );
        Err(ContractError::NumericDivergence {
            iterations: NEWTON_MAX_ITERATIONS,
        })
    }
}

impl<T: Real> CoordinateMapping<T> for IsoparametricMapping<T> {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn cell_shape(&self) -> CellShape {
        self.shape
    }

    fn geometric_dimension(&self) -> usize {
        self.geometric_dimension
    }

    fn create(&self) -> Box<dyn CoordinateMapping<T>> {
        Box::new(self.clone())
    }

    fn create_coordinate_element(&self) -> Box<dyn FiniteElement<T>> {
        // Construction cannot fail: the scalar element was validated when
        // the mapping was built.
        let element = VectorLagrangeElement::new(self.scalar.clone(), self.geometric_dimension);
        match element {
            Ok(element) => Box::new(element),
            Err(_) => unreachable!("geometric dimension is at least 1"),
        }
    }

    fn create_coordinate_dofmap(&self) -> Box<dyn Dofmap> {
        let dofmap =
            CellDofmap::vector_lagrange(self.shape, self.degree, self.geometric_dimension);
        match dofmap {
            Ok(dofmap) => Box::new(dofmap),
            Err(_) => unreachable!("the mapping's element family was already validated"),
        }
    }

    fn compute_physical_coordinates(
        &self,
        x: &mut [T],
        reference: &[T],
        coordinate_dofs: &[T],
    ) -> Result<(), ContractError> {
        let gdim = self.geometric_dimension;
        let tdim = self.shape.dimension();
        let nodes = self.num_coordinate_nodes();
        let num_points = reference.len() / tdim;
        check_buffer_len("reference coordinates", reference.len(), num_points * tdim)?;
        check_buffer_len("physical coordinates", x.len(), num_points * gdim)?;
        self.check_coordinate_dofs(coordinate_dofs)?;

        let mut basis = vec![T::zero(); num_points * nodes];
        self.scalar.evaluate_reference_basis(&mut basis, reference)?;
        for p in 0..num_points {
            for i in 0..gdim {
                let mut coordinate = T::zero();
                for k in 0..nodes {
                    coordinate += coordinate_dofs[k * gdim + i] * basis[p * nodes + k];
                }
                x[p * gdim + i] = coordinate;
            }
        }
        Ok(())
    }

    fn compute_reference_coordinates(
        &self,
        reference: &mut [T],
        x: &[T],
        coordinate_dofs: &[T],
        _orientation: Orientation,
    ) -> Result<(), ContractError> {
        let gdim = self.geometric_dimension;
        let tdim = self.shape.dimension();
        let num_points = x.len() / gdim;
        check_buffer_len("physical coordinates", x.len(), num_points * gdim)?;
        check_buffer_len("reference coordinates", reference.len(), num_points * tdim)?;
        self.check_coordinate_dofs(coordinate_dofs)?;

        if self.is_affine() {
            // X = K (x - x0) with the constant Jacobian; x0 is the image of
            // the reference origin, i.e. the first coordinate node.
            let mut mapped = vec![T::zero(); gdim];
            let mut jacobian = vec![T::zero(); gdim * tdim];
            let mut inverse = vec![T::zero(); tdim * gdim];
            let origin = vec![T::zero(); tdim];
            self.point_geometry(&mut mapped, &mut jacobian, &origin, coordinate_dofs)?;
            self.invert_jacobian(&mut inverse, &jacobian);
            for p in 0..num_points {
                for a in 0..tdim {
                    let mut coordinate = T::zero();
                    for i in 0..gdim {
                        coordinate +=
                            inverse[a * gdim + i] * (x[p * gdim + i] - coordinate_dofs[i]);
                    }
                    reference[p * tdim + a] = coordinate;
                }
            }
            return Ok(());
        }
        for p in 0..num_points {
            self.invert_point(
                &mut reference[p * tdim..(p + 1) * tdim],
                &x[p * gdim..(p + 1) * gdim],
                coordinate_dofs,
            )?;
        }
        Ok(())
    }

    fn compute_reference_geometry(
        &self,
        reference: &mut [T],
        jacobians: &mut [T],
        determinants: &mut [T],
        inverses: &mut [T],
        x: &[T],
        coordinate_dofs: &[T],
        orientation: Orientation,
    ) -> Result<(), ContractError> {
        self.compute_reference_coordinates(reference, x, coordinate_dofs, orientation)?;
        self.compute_jacobians(jacobians, reference, coordinate_dofs)?;
        self.compute_jacobian_determinants(determinants, jacobians, orientation)?;
        self.compute_jacobian_inverses(inverses, jacobians)
    }

    fn compute_jacobians(
        &self,
        jacobians: &mut [T],
        reference: &[T],
        coordinate_dofs: &[T],
    ) -> Result<(), ContractError> {
        let gdim = self.geometric_dimension;
        let tdim = self.shape.dimension();
        let nodes = self.num_coordinate_nodes();
        let num_points = reference.len() / tdim;
        check_buffer_len("reference coordinates", reference.len(), num_points * tdim)?;
        check_buffer_len("jacobians", jacobians.len(), num_points * gdim * tdim)?;
        self.check_coordinate_dofs(coordinate_dofs)?;

        let mut gradients = vec![T::zero(); num_points * nodes * tdim];
        self.scalar
            .evaluate_reference_basis_derivatives(&mut gradients, 1, reference)?;
        for p in 0..num_points {
            for i in 0..gdim {
                for j in 0..tdim {
                    let mut entry = T::zero();
                    for k in 0..nodes {
                        entry += coordinate_dofs[k * gdim + i]
                            * gradients[(p * nodes + k) * tdim + j];
                    }
                    jacobians[(p * gdim + i) * tdim + j] = entry;
                }
            }
        }
        Ok(())
    }

    fn compute_jacobian_determinants(
        &self,
        determinants: &mut [T],
        jacobians: &[T],
        orientation: Orientation,
    ) -> Result<(), ContractError> {
        let gdim = self.geometric_dimension;
        let tdim = self.shape.dimension();
        let num_points = determinants.len();
        check_buffer_len("jacobians", jacobians.len(), num_points * gdim * tdim)?;
        for (p, determinant) in determinants.iter_mut().enumerate() {
            *determinant = self
                .jacobian_determinant(&jacobians[p * gdim * tdim..(p + 1) * gdim * tdim], orientation);
        }
        Ok(())
    }

    fn compute_jacobian_inverses(
        &self,
        inverses: &mut [T],
        jacobians: &[T],
    ) -> Result<(), ContractError> {
        let gdim = self.geometric_dimension;
        let tdim = self.shape.dimension();
        let block = gdim * tdim;
        let num_points = jacobians.len() / block;
        check_buffer_len("jacobians", jacobians.len(), num_points * block)?;
        check_buffer_len("jacobian inverses", inverses.len(), num_points * block)?;
        for p in 0..num_points {
            self.invert_jacobian(
                &mut inverses[p * block..(p + 1) * block],
                &jacobians[p * block..(p + 1) * block],
            );
        }
        Ok(())
    }

    fn compute_geometry(
        &self,
        x: &mut [T],
        jacobians: &mut [T],
        determinants: &mut [T],
        inverses: &mut [T],
        reference: &[T],
        coordinate_dofs: &[T],
        orientation: Orientation,
    ) -> Result<(), ContractError> {
        self.compute_physical_coordinates(x, reference, coordinate_dofs)?;
        self.compute_jacobians(jacobians, reference, coordinate_dofs)?;
        self.compute_jacobian_determinants(determinants, jacobians, orientation)?;
        self.compute_jacobian_inverses(inverses, jacobians)
    }

    fn compute_midpoint_geometry(
        &self,
        x: &mut [T],
        jacobians: &mut [T],
        coordinate_dofs: &[T],
    ) -> Result<(), ContractError> {
        let tdim = self.shape.dimension();
        let gdim = self.geometric_dimension;
        check_buffer_len("physical coordinates", x.len(), gdim)?;
        check_buffer_len("jacobians", jacobians.len(), gdim * tdim)?;
        self.check_coordinate_dofs(coordinate_dofs)?;
        let midpoint: Vec<T> = self
            .shape
            .midpoint()
            .iter()
            .map(|&coordinate| T::from_f64(coordinate).expect("literal must be representable in T"))
            .collect();
        self.point_geometry(x, jacobians, &midpoint, coordinate_dofs)
    }
}
