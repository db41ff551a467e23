//! Reference integral kernels for linear triangles.
//!
//! These are hand-written stand-ins for generated integral code: each one
//! hard-codes its element (P1 on triangles), its quadrature rule and its
//! coefficient usage, exactly as a code generator would emit them. Drivers
//! treat them uniformly through the integral traits.

use crate::cell::{CellShape, Orientation};
use crate::integral::{
    CellIntegral, CustomIntegral, ExteriorFacetIntegral, Integral, InteriorFacetIntegral,
    VertexIntegral,
};
use crate::Real;
use itertools::izip;
use numeric_literals::replace_float_literals;

// Three-point rule on the unit triangle, exact for quadratics.
const TRIANGLE_RULE: [([f64; 2], f64); 3] = [
    ([1.0 / 6.0, 1.0 / 6.0], 1.0 / 6.0),
    ([2.0 / 3.0, 1.0 / 6.0], 1.0 / 6.0),
    ([1.0 / 6.0, 2.0 / 3.0], 1.0 / 6.0),
];

// Two-point Gauss rule on the unit interval.
const EDGE_RULE: [(f64, f64); 2] = [
    (0.21132486540518713, 0.5), // (1 - 1/sqrt(3)) / 2
    (0.7886751345948129, 0.5),  // (1 + 1/sqrt(3)) / 2
];

fn lit<T: Real>(value: f64) -> T {
    T::from_f64(value).expect("literal must be representable in T")
}

/// Barycentric coordinates of a reference point on the unit triangle.
fn barycentric<T: Real>(x: &[T]) -> [T; 3] {
    [T::one() - x[0] - x[1], x[0], x[1]]
}

/// Jacobian and determinant of the affine triangle map.
fn triangle_jacobian<T: Real>(coordinate_dofs: &[T]) -> ([T; 4], T) {
    let j = [
        coordinate_dofs[2] - coordinate_dofs[0],
        coordinate_dofs[4] - coordinate_dofs[0],
        coordinate_dofs[3] - coordinate_dofs[1],
        coordinate_dofs[5] - coordinate_dofs[1],
    ];
    let det = j[0] * j[3] - j[1] * j[2];
    (j, det)
}

/// Barycentric coordinates of a physical point inside an affine triangle.
fn physical_barycentric<T: Real>(coordinate_dofs: &[T], x: &[T]) -> [T; 3] {
    let (j, det) = triangle_jacobian(coordinate_dofs);
    let rx = x[0] - coordinate_dofs[0];
    let ry = x[1] - coordinate_dofs[1];
    let l1 = (j[3] * rx - j[1] * ry) / det;
    let l2 = (j[0] * ry - j[2] * rx) / det;
    [T::one() - l1 - l2, l1, l2]
}

/// Physical length of a triangle edge.
fn edge_length<T: Real>(coordinate_dofs: &[T], facet: usize) -> T {
    let ev = CellShape::Triangle.entity_vertices(1, facet);
    let dx = coordinate_dofs[ev[1] * 2] - coordinate_dofs[ev[0] * 2];
    let dy = coordinate_dofs[ev[1] * 2 + 1] - coordinate_dofs[ev[0] * 2 + 1];
    (dx * dx + dy * dy).sqrt()
}

/// Reference coordinates of edge parameter `t` on facet `facet`.
fn edge_point<T: Real>(facet: usize, t: T) -> [T; 2] {
    let ev = CellShape::Triangle.entity_vertices(1, facet);
    let vertices = CellShape::Triangle.reference_vertices();
    let mut point = [T::zero(); 2];
    for (axis, coordinate) in point.iter_mut().enumerate() {
        let start = lit::<T>(vertices[ev[0] * 2 + axis]);
        let end = lit::<T>(vertices[ev[1] * 2 + axis]);
        *coordinate = (T::one() - t) * start + t * end;
    }
    point
}

/// Cell mass matrix for P1 triangles, optionally weighted by a P1 density
/// coefficient.
#[derive(Debug, Clone)]
pub struct P1TriangleMassIntegral {
    enabled: Vec<bool>,
    use_density: bool,
}

impl P1TriangleMassIntegral {
    pub fn new() -> Self {
        Self {
            enabled: Vec::new(),
            use_density: false,
        }
    }

    /// Reads coefficient 0 as a P1 density field.
    pub fn with_density() -> Self {
        Self {
            enabled: vec![true],
            use_density: true,
        }
    }
}

impl Default for P1TriangleMassIntegral {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> Integral<T> for P1TriangleMassIntegral {
    fn enabled_coefficients(&self) -> &[bool] {
        &self.enabled
    }
}

impl<T: Real> CellIntegral<T> for P1TriangleMassIntegral {
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        w: &[&[T]],
        coordinate_dofs: &[T],
        _orientation: Orientation,
    ) {
        let (_, det) = triangle_jacobian(coordinate_dofs);
        let scale = det.abs();
        a.fill(T::zero());
        for (point, weight) in TRIANGLE_RULE {
            let x = [lit::<T>(point[0]), lit::<T>(point[1])];
            let phi = barycentric(&x);
            let density = if self.use_density {
                let mut value = T::zero();
                for (&w_k, &phi_k) in izip!(w[0], &phi) {
                    value += w_k * phi_k;
                }
                value
            } else {
                T::one()
            };
            let factor = scale * lit::<T>(weight) * density;
            for i in 0..3 {
                for j in 0..3 {
                    a[i * 3 + j] += factor * phi[i] * phi[j];
                }
            }
        }
    }
}

/// Cell stiffness matrix (Laplace operator) for P1 triangles.
///
/// Gradients are constant, so a single midpoint evaluation is exact.
#[derive(Debug, Clone)]
pub struct P1TriangleLaplaceIntegral {
    enabled: Vec<bool>,
}

impl P1TriangleLaplaceIntegral {
    pub fn new() -> Self {
        Self { enabled: Vec::new() }
    }

    /// Declares `num_coefficients` form coefficients, none of which this
    /// integral reads.
    pub fn with_unused_coefficients(num_coefficients: usize) -> Self {
        Self {
            enabled: vec![false; num_coefficients],
        }
    }
}

impl Default for P1TriangleLaplaceIntegral {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> Integral<T> for P1TriangleLaplaceIntegral {
    fn enabled_coefficients(&self) -> &[bool] {
        &self.enabled
    }
}

impl<T: Real> CellIntegral<T> for P1TriangleLaplaceIntegral {
    #[replace_float_literals(T::from_f64(literal).expect("literal must be representable in T"))]
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        _w: &[&[T]],
        coordinate_dofs: &[T],
        _orientation: Orientation,
    ) {
        let (jacobian, det) = triangle_jacobian(coordinate_dofs);
        // Reference gradients of the barycentric basis.
        let ref_grad: [[T; 2]; 3] = [[-1.0, -1.0], [1.0, 0.0], [0.0, 1.0]];
        // Physical gradients through the inverse Jacobian K = J^{-1}.
        let k = [
            jacobian[3] / det,
            -jacobian[1] / det,
            -jacobian[2] / det,
            jacobian[0] / det,
        ];
        let mut grad = [[T::zero(); 2]; 3];
        for (phys, reference) in grad.iter_mut().zip(&ref_grad) {
            phys[0] = k[0] * reference[0] + k[2] * reference[1];
            phys[1] = k[1] * reference[0] + k[3] * reference[1];
        }
        let scale = 0.5 * det.abs();
        for i in 0..3 {
            for j in 0..3 {
                a[i * 3 + j] = scale * (grad[i][0] * grad[j][0] + grad[i][1] * grad[j][1]);
            }
        }
    }
}

/// Boundary load vector for P1 triangles: integrates a P1 coefficient
/// against the test functions over one facet.
#[derive(Debug, Clone)]
pub struct P1TriangleFacetLoadIntegral {
    enabled: Vec<bool>,
}

impl P1TriangleFacetLoadIntegral {
    pub fn new() -> Self {
        Self {
            enabled: vec![true],
        }
    }
}

impl Default for P1TriangleFacetLoadIntegral {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> Integral<T> for P1TriangleFacetLoadIntegral {
    fn enabled_coefficients(&self) -> &[bool] {
        &self.enabled
    }
}

impl<T: Real> ExteriorFacetIntegral<T> for P1TriangleFacetLoadIntegral {
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        w: &[&[T]],
        coordinate_dofs: &[T],
        facet: usize,
        _orientation: Orientation,
    ) {
        let length = edge_length(coordinate_dofs, facet);
        a.fill(T::zero());
        for (t, weight) in EDGE_RULE {
            let x = edge_point::<T>(facet, lit(t));
            let phi = barycentric(&x);
            let mut load = T::zero();
            for (k, &phi_k) in phi.iter().enumerate() {
                load += w[0][k] * phi_k;
            }
            let factor = length * lit::<T>(weight) * load;
            for (value, &phi_i) in a.iter_mut().zip(&phi) {
                *value += factor * phi_i;
            }
        }
    }
}

/// Interior facet jump mass matrix for P1 triangles: integrates the product
/// of jumps `[u][v]` over a shared facet, producing a 6 by 6 macro tensor
/// over the dofs of both incident cells.
#[derive(Debug, Clone)]
pub struct P1TriangleJumpIntegral {
    enabled: Vec<bool>,
}

impl P1TriangleJumpIntegral {
    pub fn new() -> Self {
        Self { enabled: Vec::new() }
    }
}

impl Default for P1TriangleJumpIntegral {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> Integral<T> for P1TriangleJumpIntegral {
    fn enabled_coefficients(&self) -> &[bool] {
        &self.enabled
    }
}

impl<T: Real> InteriorFacetIntegral<T> for P1TriangleJumpIntegral {
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        _w: &[&[T]],
        coordinate_dofs_0: &[T],
        coordinate_dofs_1: &[T],
        facet_0: usize,
        _facet_1: usize,
        _orientation_0: Orientation,
        _orientation_1: Orientation,
    ) {
        let length = edge_length(coordinate_dofs_0, facet_0);
        a.fill(T::zero());
        for (t, weight) in EDGE_RULE {
            // Quadrature is parameterized on cell 0's facet; cell 1 sees the
            // same physical points through its own affine pull-back.
            let reference = edge_point::<T>(facet_0, lit(t));
            let phi_0 = barycentric(&reference);
            let mut physical = [T::zero(); 2];
            for k in 0..3 {
                physical[0] += coordinate_dofs_0[k * 2] * phi_0[k];
                physical[1] += coordinate_dofs_0[k * 2 + 1] * phi_0[k];
            }
            let phi_1 = physical_barycentric(coordinate_dofs_1, &physical);
            // Jump values: side 0 enters positively, side 1 negatively.
            let mut jump = [T::zero(); 6];
            for k in 0..3 {
                jump[k] = phi_0[k];
                jump[3 + k] = -phi_1[k];
            }
            let factor = length * lit::<T>(weight);
            for i in 0..6 {
                for j in 0..6 {
                    a[i * 6 + j] += factor * jump[i] * jump[j];
                }
            }
        }
    }
}

/// Point source vector for P1 triangles: adds the coefficient's value at one
/// cell vertex to the matching test dof.
#[derive(Debug, Clone)]
pub struct P1TriangleVertexSourceIntegral {
    enabled: Vec<bool>,
}

impl P1TriangleVertexSourceIntegral {
    pub fn new() -> Self {
        Self {
            enabled: vec![true],
        }
    }
}

impl Default for P1TriangleVertexSourceIntegral {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> Integral<T> for P1TriangleVertexSourceIntegral {
    fn enabled_coefficients(&self) -> &[bool] {
        &self.enabled
    }
}

impl<T: Real> VertexIntegral<T> for P1TriangleVertexSourceIntegral {
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        w: &[&[T]],
        _coordinate_dofs: &[T],
        vertex: usize,
        _orientation: Orientation,
    ) {
        a.fill(T::zero());
        // The P1 basis is nodal, so only the vertex's own dof is loaded.
        a[vertex] = w[0][vertex];
    }
}

/// Mass matrix for P1 triangles under caller-supplied quadrature, as used
/// for cut cells: points are reference coordinates and weights are physical
/// measures.
#[derive(Debug, Clone)]
pub struct P1TriangleCustomMassIntegral {
    enabled: Vec<bool>,
}

impl P1TriangleCustomMassIntegral {
    pub fn new() -> Self {
        Self { enabled: Vec::new() }
    }
}

impl Default for P1TriangleCustomMassIntegral {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> Integral<T> for P1TriangleCustomMassIntegral {
    fn enabled_coefficients(&self) -> &[bool] {
        &self.enabled
    }
}

impl<T: Real> CustomIntegral<T> for P1TriangleCustomMassIntegral {
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        _w: &[&[T]],
        _coordinate_dofs: &[T],
        num_cells: usize,
        points: &[T],
        weights: &[T],
        _normals: &[T],
        _orientation: Orientation,
    ) {
        assert_eq!(num_cells, 1, "single-cell quadrature only");
        a.fill(T::zero());
        for (&weight, point) in izip!(weights, points.chunks(2)) {
            let phi = barycentric(point);
            for i in 0..3 {
                for j in 0..3 {
                    a[i * 3 + j] += weight * phi[i] * phi[j];
                }
            }
        }
    }
}
