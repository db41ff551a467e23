//! A reference assembly driver exercising the full contract.
//!
//! The driver walks a [`Mesh`], resolves integrals through the form's
//! subdomain dispatch, tabulates local tensors and scatters them into
//! global structures: a CSR matrix for rank-2 forms, a dense vector for
//! rank-1 forms and a plain scalar for functionals. It is a consumer of the
//! contract rather than part of it; any driver honoring the same call
//! protocol may replace it.
//!
//! Cell geometry is supplied as the mesh's degree-1 coordinate field, so
//! forms whose coordinate mapping requires higher-order nodes are rejected
//! up front.

use crate::dofmap::Dofmap;
use crate::form::Form;
use crate::mesh::Mesh;
use crate::Real;
use eyre::{bail, ensure};
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::cell::RefCell;

/// Gathers `local[i] = global[indices[i]]`.
///
/// # Panics
///
/// Panics if `local` and `indices` differ in length or an index is out of
/// bounds.
pub fn gather_global_to_local<T: Real>(global: &[T], local: &mut [T], indices: &[usize]) {
    assert_eq!(local.len(), indices.len(), "length mismatch in gather");
    for (value, &index) in local.iter_mut().zip(indices) {
        *value = global[index];
    }
}

/// Number of global dofs of a dofmap over a given mesh.
pub fn global_dimension(dofmap: &dyn Dofmap, num_global_entities: &[usize]) -> usize {
    let entity_dofs: usize = (0..=dofmap.topological_dimension())
        .map(|dim| dofmap.num_entity_dofs(dim) * num_global_entities[dim])
        .sum();
    entity_dofs + dofmap.num_global_support_dofs()
}

/// Caller-supplied quadrature for a custom integral on one cell: reference
/// points `[num_points][tdim]`, physical weights, and optionally one unit
/// normal per point.
#[derive(Debug, Clone)]
pub struct CustomRule<T: Real> {
    pub points: Vec<T>,
    pub weights: Vec<T>,
    pub normals: Vec<T>,
}

#[derive(Debug)]
struct Workspace<T> {
    coordinate_dofs: Vec<T>,
    neighbor_coordinate_dofs: Vec<T>,
    local_tensor: Vec<T>,
    coefficient_values: Vec<Vec<T>>,
    coefficient_dofs: Vec<usize>,
}

impl<T: Real> Default for Workspace<T> {
    fn default() -> Self {
        Self {
            coordinate_dofs: Vec::new(),
            neighbor_coordinate_dofs: Vec::new(),
            local_tensor: Vec::new(),
            coefficient_values: Vec::new(),
            coefficient_dofs: Vec::new(),
        }
    }
}

/// Assembles global tensors from a [`Form`] over a [`Mesh`].
///
/// The assembler owns reusable scratch buffers, so a single instance should
/// be reused across assembly calls.
#[derive(Debug)]
pub struct FormAssembler<T: Real> {
    workspace: RefCell<Workspace<T>>,
    custom_rules: FxHashMap<usize, CustomRule<T>>,
}

impl<T: Real> Default for FormAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(Workspace::default()),
            custom_rules: FxHashMap::default(),
        }
    }
}

/// Everything per-entity tabulation needs, validated once per assembly
/// call.
struct AssemblyPlan {
    rank: usize,
    argument_dofmaps: Vec<Box<dyn Dofmap>>,
    coefficient_dofmaps: Vec<Box<dyn Dofmap>>,
    coordinate_dof_len: usize,
}

impl<T: Real> FormAssembler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers caller-supplied quadrature for one cell; cells with a rule
    /// are visited by the form's custom integrals.
    pub fn set_custom_rule(&mut self, cell: usize, rule: CustomRule<T>) {
        self.custom_rules.insert(cell, rule);
    }

    fn plan(&self, form: &dyn Form<T>, mesh: &Mesh<T>) -> eyre::Result<AssemblyPlan> {
        let rank = form.rank();
        ensure!(rank <= 2, "forms of rank {} are not assemblable", rank);

        let mapping = form.create_coordinate_mapping();
        ensure!(
            mapping.cell_shape() == mesh.cell_shape(),
            "form is defined on {:?} cells but the mesh holds {:?} cells",
            mapping.cell_shape(),
            mesh.cell_shape()
        );
        ensure!(
            mapping.geometric_dimension() == mesh.geometric_dimension(),
            "geometric dimension mismatch between form and mesh"
        );
        let gdim = mesh.geometric_dimension();
        let coordinate_dof_len = mapping.create_coordinate_dofmap().num_element_dofs();
        if coordinate_dof_len != mesh.cell_shape().num_vertices() * gdim {
            bail!("this driver supplies affine (degree 1) cell geometry only");
        }

        let argument_dofmaps = (0..rank)
            .map(|index| form.create_dofmap(index))
            .collect::<Result<Vec<_>, _>>()?;
        let coefficient_dofmaps = (rank..rank + form.num_coefficients())
            .map(|index| form.create_dofmap(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AssemblyPlan {
            rank,
            argument_dofmaps,
            coefficient_dofmaps,
            coordinate_dof_len,
        })
    }

    fn check_coefficients(
        &self,
        plan: &AssemblyPlan,
        mesh: &Mesh<T>,
        coefficients: &[&[T]],
    ) -> eyre::Result<()> {
        ensure!(
            coefficients.len() == plan.coefficient_dofmaps.len(),
            "form takes {} coefficients, {} supplied",
            plan.coefficient_dofmaps.len(),
            coefficients.len()
        );
        for (index, (dofmap, values)) in
            plan.coefficient_dofmaps.iter().zip(coefficients).enumerate()
        {
            let expected = global_dimension(dofmap.as_ref(), mesh.num_global_entities());
            ensure!(
                values.len() == expected,
                "coefficient {} has {} global dofs, expected {}",
                index,
                values.len(),
                expected
            );
        }
        Ok(())
    }

    /// Assembles a rank-2 form into a CSR matrix.
    pub fn assemble_matrix(
        &self,
        form: &dyn Form<T>,
        mesh: &Mesh<T>,
        coefficients: &[&[T]],
    ) -> eyre::Result<CsrMatrix<T>> {
        let plan = self.plan(form, mesh)?;
        ensure!(plan.rank == 2, "assemble_matrix requires a rank-2 form");
        self.check_coefficients(&plan, mesh, coefficients)?;
        let nrows = global_dimension(plan.argument_dofmaps[0].as_ref(), mesh.num_global_entities());
        let ncols = global_dimension(plan.argument_dofmaps[1].as_ref(), mesh.num_global_entities());
        debug!(
            "assembling {} x {} matrix over {} cells",
            nrows,
            ncols,
            mesh.num_cells()
        );
        let mut coo = CooMatrix::new(nrows, ncols);
        self.assemble_entities(form, mesh, coefficients, &plan, true, &mut |local, rows, cols| {
            push_block(&mut coo, local, rows, cols);
        })?;
        Ok(CsrMatrix::from(&coo))
    }

    /// Assembles a rank-2 form with the cell-integral sweep parallelized
    /// over rayon; facet, vertex and custom contributions run serially.
    pub fn assemble_matrix_parallel(
        &self,
        form: &dyn Form<T>,
        mesh: &Mesh<T>,
        coefficients: &[&[T]],
    ) -> eyre::Result<CsrMatrix<T>> {
        let plan = self.plan(form, mesh)?;
        ensure!(plan.rank == 2, "assemble_matrix requires a rank-2 form");
        self.check_coefficients(&plan, mesh, coefficients)?;
        let nrows = global_dimension(plan.argument_dofmaps[0].as_ref(), mesh.num_global_entities());
        let ncols = global_dimension(plan.argument_dofmaps[1].as_ref(), mesh.num_global_entities());

        let mut coo = CooMatrix::new(nrows, ncols);
        if form.has_cell_integrals() {
            let cells: Vec<usize> = (0..mesh.num_cells()).collect();
            let triplets = cells
                .par_chunks(128)
                .map(|chunk| {
                    let mut triplets = Vec::new();
                    let mut workspace = Workspace::default();
                    let mut argument_dofs = vec![Vec::new(); plan.argument_dofmaps.len()];
                    for &cell in chunk {
                        tabulate_cell_tensor(
                            form,
                            mesh,
                            coefficients,
                            &plan,
                            cell,
                            &mut workspace,
                            &mut argument_dofs,
                            &mut |local, rows, cols| {
                                for (i, &row) in rows.iter().enumerate() {
                                    for (j, &column) in cols.iter().enumerate() {
                                        let value = local[i * cols.len() + j];
                                        if value != T::zero() {
                                            triplets.push((row, column, value));
                                        }
                                    }
                                }
                            },
                        );
                    }
                    triplets
                })
                .reduce(Vec::new, |mut left, mut right| {
                    left.append(&mut right);
                    left
                });
            debug!("parallel cell sweep produced {} triplets", triplets.len());
            for (row, column, value) in triplets {
                coo.push(row, column, value);
            }
        }
        self.assemble_entities(form, mesh, coefficients, &plan, false, &mut |local, rows, cols| {
            push_block(&mut coo, local, rows, cols);
        })?;
        Ok(CsrMatrix::from(&coo))
    }

    /// Assembles a rank-1 form into a dense vector.
    pub fn assemble_vector(
        &self,
        form: &dyn Form<T>,
        mesh: &Mesh<T>,
        coefficients: &[&[T]],
    ) -> eyre::Result<DVector<T>> {
        let plan = self.plan(form, mesh)?;
        ensure!(plan.rank == 1, "assemble_vector requires a rank-1 form");
        self.check_coefficients(&plan, mesh, coefficients)?;
        let dimension =
            global_dimension(plan.argument_dofmaps[0].as_ref(), mesh.num_global_entities());
        debug!("assembling vector of dimension {dimension}");
        let mut vector = DVector::zeros(dimension);
        self.assemble_entities(form, mesh, coefficients, &plan, true, &mut |local, rows, _| {
            for (i, &row) in rows.iter().enumerate() {
                vector[row] += local[i];
            }
        })?;
        Ok(vector)
    }

    /// Assembles a rank-0 form (functional) into a scalar.
    pub fn assemble_scalar(
        &self,
        form: &dyn Form<T>,
        mesh: &Mesh<T>,
        coefficients: &[&[T]],
    ) -> eyre::Result<T> {
        let plan = self.plan(form, mesh)?;
        ensure!(plan.rank == 0, "assemble_scalar requires a rank-0 form");
        self.check_coefficients(&plan, mesh, coefficients)?;
        let mut total = T::zero();
        self.assemble_entities(form, mesh, coefficients, &plan, true, &mut |local, _, _| {
            total += local[0];
        })?;
        Ok(total)
    }

    /// Runs every applicable integral kind over the mesh, feeding each local
    /// tensor and its global argument dofs to `sink`.
    fn assemble_entities(
        &self,
        form: &dyn Form<T>,
        mesh: &Mesh<T>,
        coefficients: &[&[T]],
        plan: &AssemblyPlan,
        include_cells: bool,
        sink: &mut dyn FnMut(&[T], &[usize], &[usize]),
    ) -> eyre::Result<()> {
        let mut workspace = self.workspace.borrow_mut();
        let mut argument_dofs = vec![Vec::new(); plan.argument_dofmaps.len()];

        if include_cells && form.has_cell_integrals() {
            for cell in 0..mesh.num_cells() {
                tabulate_cell_tensor(
                    form,
                    mesh,
                    coefficients,
                    plan,
                    cell,
                    &mut workspace,
                    &mut argument_dofs,
                    sink,
                );
            }
        }

        if form.has_exterior_facet_integrals() {
            for exterior in mesh.exterior_facets() {
                let integral = match mesh.facet_marker(exterior.facet) {
                    Some(id) => form.exterior_facet_integral(id),
                    None => form.create_default_exterior_facet_integral(),
                };
                let Some(integral) = integral else { continue };
                gather_cell_context(
                    mesh,
                    coefficients,
                    plan,
                    exterior.cell,
                    integral.enabled_coefficients(),
                    &mut workspace,
                    &mut argument_dofs,
                );
                let size = local_tensor_size(plan, &argument_dofs);
                let Workspace {
                    local_tensor,
                    coordinate_dofs,
                    coefficient_values,
                    ..
                } = &mut *workspace;
                local_tensor.clear();
                local_tensor.resize(size, T::zero());
                let w: Vec<&[T]> = coefficient_values.iter().map(Vec::as_slice).collect();
                integral.tabulate_tensor(
                    local_tensor,
                    &w,
                    coordinate_dofs,
                    exterior.local_facet,
                    mesh.cell_orientation(exterior.cell),
                );
                feed(plan, local_tensor, &argument_dofs, sink);
            }
        }

        if form.has_interior_facet_integrals() {
            for interior in mesh.interior_facets() {
                let integral = match mesh.facet_marker(interior.facet) {
                    Some(id) => form.interior_facet_integral(id),
                    None => form.create_default_interior_facet_integral(),
                };
                let Some(integral) = integral else { continue };

                // Macro-element context: dofs and coefficient values of both
                // incident cells, cell 0 first.
                for (dofmap, dofs) in plan.argument_dofmaps.iter().zip(argument_dofs.iter_mut()) {
                    let n = dofmap.num_element_dofs();
                    dofs.clear();
                    dofs.resize(2 * n, 0);
                    let (first, second) = dofs.split_at_mut(n);
                    dofmap.tabulate_dofs(
                        first,
                        mesh.num_global_entities(),
                        &mesh.cell_entity_indices(interior.cell_0),
                    );
                    dofmap.tabulate_dofs(
                        second,
                        mesh.num_global_entities(),
                        &mesh.cell_entity_indices(interior.cell_1),
                    );
                }
                gather_macro_coefficients(
                    mesh,
                    coefficients,
                    plan,
                    interior.cell_0,
                    interior.cell_1,
                    integral.enabled_coefficients(),
                    &mut workspace,
                );
                let size = local_tensor_size(plan, &argument_dofs);
                let Workspace {
                    coordinate_dofs,
                    neighbor_coordinate_dofs,
                    local_tensor,
                    coefficient_values,
                    ..
                } = &mut *workspace;
                coordinate_dofs.clear();
                coordinate_dofs.resize(plan.coordinate_dof_len, T::zero());
                neighbor_coordinate_dofs.clear();
                neighbor_coordinate_dofs.resize(plan.coordinate_dof_len, T::zero());
                mesh.populate_cell_coordinate_dofs(interior.cell_0, coordinate_dofs);
                mesh.populate_cell_coordinate_dofs(interior.cell_1, neighbor_coordinate_dofs);
                local_tensor.clear();
                local_tensor.resize(size, T::zero());
                let w: Vec<&[T]> = coefficient_values.iter().map(Vec::as_slice).collect();
                integral.tabulate_tensor(
                    local_tensor,
                    &w,
                    coordinate_dofs,
                    neighbor_coordinate_dofs,
                    interior.local_facet_0,
                    interior.local_facet_1,
                    mesh.cell_orientation(interior.cell_0),
                    mesh.cell_orientation(interior.cell_1),
                );
                feed(plan, local_tensor, &argument_dofs, sink);
            }
        }

        if form.has_vertex_integrals() {
            for vertex in 0..mesh.num_vertices() {
                let integral = match mesh.vertex_marker(vertex) {
                    Some(id) => form.vertex_integral(id),
                    None => form.create_default_vertex_integral(),
                };
                let Some(integral) = integral else { continue };
                // Each vertex contributes once, through its lowest-indexed
                // incident cell.
                let (cell, local_vertex) = mesh.vertex_cell(vertex);
                gather_cell_context(
                    mesh,
                    coefficients,
                    plan,
                    cell,
                    integral.enabled_coefficients(),
                    &mut workspace,
                    &mut argument_dofs,
                );
                let size = local_tensor_size(plan, &argument_dofs);
                let Workspace {
                    local_tensor,
                    coordinate_dofs,
                    coefficient_values,
                    ..
                } = &mut *workspace;
                local_tensor.clear();
                local_tensor.resize(size, T::zero());
                let w: Vec<&[T]> = coefficient_values.iter().map(Vec::as_slice).collect();
                integral.tabulate_tensor(
                    local_tensor,
                    &w,
                    coordinate_dofs,
                    local_vertex,
                    mesh.cell_orientation(cell),
                );
                feed(plan, local_tensor, &argument_dofs, sink);
            }
        }

        if form.has_custom_integrals() && !self.custom_rules.is_empty() {
            let mut cells: Vec<usize> = self.custom_rules.keys().copied().collect();
            cells.sort_unstable();
            for cell in cells {
                let rule = &self.custom_rules[&cell];
                let integral = match mesh.cell_marker(cell) {
                    Some(id) => form.custom_integral(id),
                    None => form.create_default_custom_integral(),
                };
                let Some(integral) = integral else { continue };
                gather_cell_context(
                    mesh,
                    coefficients,
                    plan,
                    cell,
                    integral.enabled_coefficients(),
                    &mut workspace,
                    &mut argument_dofs,
                );
                let size = local_tensor_size(plan, &argument_dofs);
                let Workspace {
                    local_tensor,
                    coordinate_dofs,
                    coefficient_values,
                    ..
                } = &mut *workspace;
                local_tensor.clear();
                local_tensor.resize(size, T::zero());
                let w: Vec<&[T]> = coefficient_values.iter().map(Vec::as_slice).collect();
                // Rules are registered per single cell.
                integral.tabulate_tensor(
                    local_tensor,
                    &w,
                    coordinate_dofs,
                    1,
                    &rule.points,
                    &rule.weights,
                    &rule.normals,
                    mesh.cell_orientation(cell),
                );
                feed(plan, local_tensor, &argument_dofs, sink);
            }
        }

        Ok(())
    }
}

/// Local tensor length for the current argument dofs (1 for functionals).
fn local_tensor_size(plan: &AssemblyPlan, argument_dofs: &[Vec<usize>]) -> usize {
    if plan.rank == 0 {
        1
    } else {
        argument_dofs.iter().map(Vec::len).product()
    }
}

/// Scatter-adds one row-major local block into a COO accumulator.
fn push_block<T: Real>(coo: &mut CooMatrix<T>, local: &[T], rows: &[usize], cols: &[usize]) {
    for (i, &row) in rows.iter().enumerate() {
        for (j, &column) in cols.iter().enumerate() {
            let value = local[i * cols.len() + j];
            if value != T::zero() {
                coo.push(row, column, value);
            }
        }
    }
}

/// Tabulates argument dofs, coordinate dofs and coefficient values of one
/// cell into the workspace.
fn gather_cell_context<T: Real>(
    mesh: &Mesh<T>,
    coefficients: &[&[T]],
    plan: &AssemblyPlan,
    cell: usize,
    enabled: &[bool],
    workspace: &mut Workspace<T>,
    argument_dofs: &mut [Vec<usize>],
) {
    let entity_indices = mesh.cell_entity_indices(cell);
    for (dofmap, dofs) in plan.argument_dofmaps.iter().zip(argument_dofs.iter_mut()) {
        dofs.clear();
        dofs.resize(dofmap.num_element_dofs(), 0);
        dofmap.tabulate_dofs(dofs, mesh.num_global_entities(), &entity_indices);
    }

    workspace.coordinate_dofs.clear();
    workspace.coordinate_dofs.resize(plan.coordinate_dof_len, T::zero());
    mesh.populate_cell_coordinate_dofs(cell, &mut workspace.coordinate_dofs);

    workspace
        .coefficient_values
        .resize_with(plan.coefficient_dofmaps.len(), Vec::new);
    for (index, dofmap) in plan.coefficient_dofmaps.iter().enumerate() {
        let values = &mut workspace.coefficient_values[index];
        values.clear();
        // Disabled coefficients keep an empty slice; the kernel never reads
        // them.
        if enabled.get(index).copied().unwrap_or(false) {
            let n = dofmap.num_element_dofs();
            workspace.coefficient_dofs.clear();
            workspace.coefficient_dofs.resize(n, 0);
            dofmap.tabulate_dofs(
                &mut workspace.coefficient_dofs,
                mesh.num_global_entities(),
                &entity_indices,
            );
            values.resize(n, T::zero());
            gather_global_to_local(coefficients[index], values, &workspace.coefficient_dofs);
        }
    }
}

/// Gathers concatenated coefficient values over a macro element of two
/// cells.
fn gather_macro_coefficients<T: Real>(
    mesh: &Mesh<T>,
    coefficients: &[&[T]],
    plan: &AssemblyPlan,
    cell_0: usize,
    cell_1: usize,
    enabled: &[bool],
    workspace: &mut Workspace<T>,
) {
    workspace
        .coefficient_values
        .resize_with(plan.coefficient_dofmaps.len(), Vec::new);
    for (index, dofmap) in plan.coefficient_dofmaps.iter().enumerate() {
        let values = &mut workspace.coefficient_values[index];
        values.clear();
        if !enabled.get(index).copied().unwrap_or(false) {
            continue;
        }
        let n = dofmap.num_element_dofs();
        values.resize(2 * n, T::zero());
        for (half, cell) in [(0, cell_0), (1, cell_1)] {
            workspace.coefficient_dofs.clear();
            workspace.coefficient_dofs.resize(n, 0);
            dofmap.tabulate_dofs(
                &mut workspace.coefficient_dofs,
                mesh.num_global_entities(),
                &mesh.cell_entity_indices(cell),
            );
            gather_global_to_local(
                coefficients[index],
                &mut values[half * n..(half + 1) * n],
                &workspace.coefficient_dofs,
            );
        }
    }
}

/// Tabulates one cell integral contribution and feeds it to `sink`.
#[allow(clippy::too_many_arguments)]
fn tabulate_cell_tensor<T: Real>(
    form: &dyn Form<T>,
    mesh: &Mesh<T>,
    coefficients: &[&[T]],
    plan: &AssemblyPlan,
    cell: usize,
    workspace: &mut Workspace<T>,
    argument_dofs: &mut [Vec<usize>],
    sink: &mut dyn FnMut(&[T], &[usize], &[usize]),
) {
    let integral = match mesh.cell_marker(cell) {
        Some(id) => form.cell_integral(id),
        None => form.create_default_cell_integral(),
    };
    let Some(integral) = integral else { return };
    gather_cell_context(
        mesh,
        coefficients,
        plan,
        cell,
        integral.enabled_coefficients(),
        workspace,
        argument_dofs,
    );
    let size = local_tensor_size(plan, argument_dofs);
    let Workspace {
        local_tensor,
        coordinate_dofs,
        coefficient_values,
        ..
    } = workspace;
    local_tensor.clear();
    local_tensor.resize(size, T::zero());
    let w: Vec<&[T]> = coefficient_values.iter().map(Vec::as_slice).collect();
    integral.tabulate_tensor(local_tensor, &w, coordinate_dofs, mesh.cell_orientation(cell));
    feed(plan, local_tensor, argument_dofs, sink);
}

/// Routes a local tensor to the sink with the dof lists the rank calls for.
fn feed<T: Real>(
    plan: &AssemblyPlan,
    local: &[T],
    argument_dofs: &[Vec<usize>],
    sink: &mut dyn FnMut(&[T], &[usize], &[usize]),
) {
    match plan.rank {
        0 => sink(local, &[], &[]),
        1 => sink(local, &argument_dofs[0], &[]),
        _ => sink(local, &argument_dofs[0], &argument_dofs[1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellShape, Orientation};
    use crate::dofmap::CellDofmap;
    use crate::element::{FiniteElement, LagrangeElement};
    use crate::form::GenericForm;
    use crate::integral::{
        CellIntegral, Integral, P1TriangleCustomMassIntegral, P1TriangleFacetLoadIntegral,
        P1TriangleMassIntegral, P1TriangleVertexSourceIntegral,
    };
    use crate::mapping::{CoordinateMapping, IsoparametricMapping};
    use crate::mesh::{unit_square_triangulation, unit_triangle};
    use matrixcompare::assert_matrix_eq;
    use nalgebra::DMatrix;

    fn p1_element() -> Box<dyn FiniteElement<f64>> {
        Box::new(LagrangeElement::new(CellShape::Triangle, 1).unwrap())
    }

    fn p1_dofmap() -> Box<dyn Dofmap> {
        Box::new(CellDofmap::lagrange(CellShape::Triangle, 1).unwrap())
    }

    fn p1_mapping() -> Box<dyn CoordinateMapping<f64>> {
        Box::new(IsoparametricMapping::new(CellShape::Triangle, 1).unwrap())
    }

    fn mass_form() -> GenericForm<f64> {
        GenericForm::new("a(u, v) = (u, v)", p1_mapping)
            .with_argument(p1_element, p1_dofmap)
            .with_argument(p1_element, p1_dofmap)
            .with_default_cell_integral(|| Box::new(P1TriangleMassIntegral::new()))
    }

    /// Functional measuring the cell's area, for exercising rank-0 assembly.
    struct AreaFunctional;

    impl Integral<f64> for AreaFunctional {
        fn enabled_coefficients(&self) -> &[bool] {
            &[]
        }
    }

    impl CellIntegral<f64> for AreaFunctional {
        fn tabulate_tensor(
            &self,
            a: &mut [f64],
            _w: &[&[f64]],
            coordinate_dofs: &[f64],
            _orientation: Orientation,
        ) {
            let [x0, y0, x1, y1, x2, y2] = coordinate_dofs.try_into().unwrap();
            let det = (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0);
            a[0] = 0.5 * det.abs();
        }
    }

    #[test]
    fn gathers_by_index() {
        let global = [10.0, 20.0, 30.0, 40.0];
        let mut local = [0.0; 3];
        gather_global_to_local(&global, &mut local, &[3, 0, 2]);
        assert_eq!(local, [40.0, 10.0, 30.0]);
    }

    #[test]
    fn global_dimension_counts_all_entity_dofs() {
        let mesh = unit_square_triangulation::<f64>(2, 2);
        // 9 vertices and 16 edges carry one dof each for P2.
        let p2 = CellDofmap::lagrange(CellShape::Triangle, 2).unwrap();
        assert_eq!(global_dimension(&p2, mesh.num_global_entities()), 25);
        let constant = CellDofmap::global_constant(CellShape::Triangle);
        assert_eq!(global_dimension(&constant, mesh.num_global_entities()), 1);
    }

    #[test]
    fn assembled_mass_matrix_matches_hand_values() {
        let mesh = unit_triangle::<f64>();
        let assembler = FormAssembler::new();
        let matrix = assembler.assemble_matrix(&mass_form(), &mesh, &[]).unwrap();
        let expected = DMatrix::from_row_slice(
            3,
            3,
            &[
                1.0 / 12.0,
                1.0 / 24.0,
                1.0 / 24.0,
                1.0 / 24.0,
                1.0 / 12.0,
                1.0 / 24.0,
                1.0 / 24.0,
                1.0 / 24.0,
                1.0 / 12.0,
            ],
        );
        assert_matrix_eq!(matrix, expected, comp = abs, tol = 1e-14);
    }

    #[test]
    fn mass_matrix_entries_sum_to_the_domain_area() {
        let mesh = unit_square_triangulation::<f64>(3, 2);
        let assembler = FormAssembler::new();
        let matrix = assembler.assemble_matrix(&mass_form(), &mesh, &[]).unwrap();
        assert_eq!(matrix.nrows(), mesh.num_vertices());
        let total: f64 = matrix.values().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn parallel_assembly_matches_serial() {
        let mesh = unit_square_triangulation::<f64>(4, 4);
        let form = mass_form();
        let assembler = FormAssembler::new();
        let serial = assembler.assemble_matrix(&form, &mesh, &[]).unwrap();
        let parallel = assembler.assemble_matrix_parallel(&form, &mesh, &[]).unwrap();
        assert_matrix_eq!(serial, parallel, comp = abs, tol = 1e-14);
    }

    #[test]
    fn vertex_sources_attach_once_per_vertex() {
        let mesh = unit_square_triangulation::<f64>(1, 1);
        let form = GenericForm::new("L(v) = sum_p f(p) v(p)", p1_mapping)
            .with_argument(p1_element, p1_dofmap)
            .with_coefficient(0, p1_element, p1_dofmap)
            .with_default_vertex_integral(|| Box::new(P1TriangleVertexSourceIntegral::new()));
        let sources = [1.0, 2.0, 3.0, 4.0];
        let assembler = FormAssembler::new();
        let vector = assembler.assemble_vector(&form, &mesh, &[&sources]).unwrap();
        // Every vertex is shared by both cells yet contributes exactly once.
        assert_eq!(vector.as_slice(), &sources[..]);
    }

    #[test]
    fn facet_loads_assemble_over_the_boundary() {
        let mesh = unit_square_triangulation::<f64>(1, 1);
        let form = GenericForm::new("L(v) = (g, v)_ds", p1_mapping)
            .with_argument(p1_element, p1_dofmap)
            .with_coefficient(0, p1_element, p1_dofmap)
            .with_default_exterior_facet_integral(|| Box::new(P1TriangleFacetLoadIntegral::new()));
        // A unit load integrates the partition of unity over the boundary,
        // so the entries sum to the perimeter.
        let load = [1.0; 4];
        let assembler = FormAssembler::new();
        let vector = assembler.assemble_vector(&form, &mesh, &[&load]).unwrap();
        assert!((vector.sum() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn scalar_assembly_accumulates_cell_contributions() {
        let mesh = unit_square_triangulation::<f64>(2, 2);
        let form = GenericForm::new("M = 1 dx", p1_mapping)
            .with_default_cell_integral(|| Box::new(AreaFunctional));
        let assembler = FormAssembler::new();
        let total = assembler.assemble_scalar(&form, &mesh, &[]).unwrap();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn custom_integrals_run_only_on_registered_cells() {
        let mesh = unit_square_triangulation::<f64>(1, 1);
        let form = GenericForm::new("a(u, v) = (u, v)_dc", p1_mapping)
            .with_argument(p1_element, p1_dofmap)
            .with_argument(p1_element, p1_dofmap)
            .with_default_custom_integral(|| Box::new(P1TriangleCustomMassIntegral::new()));
        // The standard rule of the reference triangle with physical weights;
        // both cells of the mesh are congruent to it.
        let rule = CustomRule {
            points: vec![
                1.0 / 6.0,
                1.0 / 6.0,
                2.0 / 3.0,
                1.0 / 6.0,
                1.0 / 6.0,
                2.0 / 3.0,
            ],
            weights: vec![1.0 / 6.0; 3],
            normals: Vec::new(),
        };
        let mut assembler = FormAssembler::new();
        assembler.set_custom_rule(0, rule);
        let matrix = assembler.assemble_matrix(&form, &mesh, &[]).unwrap();
        // Only the one registered cell contributes, so the entries sum to
        // its area.
        let total: f64 = matrix.values().iter().sum();
        assert!((total - 0.5).abs() < 1e-12);
    }

    #[test]
    fn coefficient_size_mismatch_is_rejected() {
        let mesh = unit_square_triangulation::<f64>(1, 1);
        let form = GenericForm::new("L(v)", p1_mapping)
            .with_argument(p1_element, p1_dofmap)
            .with_coefficient(0, p1_element, p1_dofmap)
            .with_default_vertex_integral(|| Box::new(P1TriangleVertexSourceIntegral::new()));
        let short = [1.0; 3];
        let assembler = FormAssembler::new();
        assert!(assembler.assemble_vector(&form, &mesh, &[&short]).is_err());
    }
}
