//! Integral kernels: local tensor contributions per mesh entity.
//!
//! An integral tabulates the element tensor of one form over one kind of
//! entity. The five kinds are cells, exterior facets (boundary), interior
//! facets (shared by two cells, producing a macro tensor over both), single
//! vertices, and custom integrals with caller-supplied quadrature.
//!
//! Common argument conventions: `a` is the flattened local tensor, zeroed
//! and filled by the callee; `w` holds one slice of local dof values per
//! form coefficient (slices for disabled coefficients may be empty);
//! `coordinate_dofs` are the cell's coordinate nodes `[nodes][gdim]`.

use crate::cell::Orientation;
use crate::Real;

mod reference;

pub use reference::{
    P1TriangleCustomMassIntegral, P1TriangleFacetLoadIntegral, P1TriangleJumpIntegral,
    P1TriangleLaplaceIntegral, P1TriangleMassIntegral, P1TriangleVertexSourceIntegral,
};

/// Common interface of all integral kinds.
pub trait Integral<T: Real>: Send + Sync {
    /// One flag per form coefficient: whether this integral reads it. A
    /// driver may skip gathering dof values of disabled coefficients.
    fn enabled_coefficients(&self) -> &[bool];
}

/// An integral over whole cells.
pub trait CellIntegral<T: Real>: Integral<T> {
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        w: &[&[T]],
        coordinate_dofs: &[T],
        orientation: Orientation,
    );
}

/// An integral over boundary facets; `facet` is the cell-local facet index.
pub trait ExteriorFacetIntegral<T: Real>: Integral<T> {
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        w: &[&[T]],
        coordinate_dofs: &[T],
        facet: usize,
        orientation: Orientation,
    );
}

/// An integral over interior facets shared by two cells.
///
/// The macro tensor spans the dofs of both incident cells (cell 0 first);
/// coefficient slices in `w` likewise hold the concatenated dof values of
/// both cells.
pub trait InteriorFacetIntegral<T: Real>: Integral<T> {
    #[allow(clippy::too_many_arguments)]
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        w: &[&[T]],
        coordinate_dofs_0: &[T],
        coordinate_dofs_1: &[T],
        facet_0: usize,
        facet_1: usize,
        orientation_0: Orientation,
        orientation_1: Orientation,
    );
}

/// An integral over single vertices; `vertex` is the cell-local vertex
/// index.
pub trait VertexIntegral<T: Real>: Integral<T> {
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        w: &[&[T]],
        coordinate_dofs: &[T],
        vertex: usize,
        orientation: Orientation,
    );
}

/// An integral with caller-supplied quadrature, for cut cells and other
/// non-standard domains.
///
/// `num_cells` is the count of cells participating in the quadrature
/// domain (1 for a single cut cell, 2 for an interface between two cells);
/// `points` are reference-cell coordinates `[num_points][tdim]` and
/// `weights` are physical measures (the caller folds the Jacobian
/// determinant into them); `normals`, when non-empty, hold one physical unit
/// normal per point for interface quadrature.
pub trait CustomIntegral<T: Real>: Integral<T> {
    #[allow(clippy::too_many_arguments)]
    fn tabulate_tensor(
        &self,
        a: &mut [T],
        w: &[&[T]],
        coordinate_dofs: &[T],
        num_cells: usize,
        points: &[T],
        weights: &[T],
        normals: &[T],
        orientation: Orientation,
    );
}
