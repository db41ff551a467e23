use formkit::assembly::FormAssembler;
use formkit::cell::CellShape;
use formkit::dofmap::{CellDofmap, Dofmap};
use formkit::element::{FiniteElement, LagrangeElement};
use formkit::form::{Form, GenericForm};
use formkit::integral::{
    P1TriangleJumpIntegral, P1TriangleLaplaceIntegral, P1TriangleMassIntegral,
};
use formkit::mapping::{CoordinateMapping, IsoparametricMapping};
use formkit::mesh::unit_square_triangulation;
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;

fn p1_element() -> Box<dyn FiniteElement<f64>> {
    Box::new(LagrangeElement::new(CellShape::Triangle, 1).unwrap())
}

fn p1_dofmap() -> Box<dyn Dofmap> {
    Box::new(CellDofmap::lagrange(CellShape::Triangle, 1).unwrap())
}

fn p1_mapping() -> Box<dyn CoordinateMapping<f64>> {
    Box::new(IsoparametricMapping::new(CellShape::Triangle, 1).unwrap())
}

fn p1_bilinear_form(signature: &str) -> GenericForm<f64> {
    GenericForm::new(signature, p1_mapping)
        .with_argument(p1_element, p1_dofmap)
        .with_argument(p1_element, p1_dofmap)
}

#[test]
fn laplace_matrix_annihilates_constants() {
    let mesh = unit_square_triangulation::<f64>(3, 3);
    let form = p1_bilinear_form("a(u, v) = (grad u, grad v)")
        .with_default_cell_integral(|| Box::new(P1TriangleLaplaceIntegral::new()));
    let assembler = FormAssembler::new();
    let matrix = assembler.assemble_matrix(&form, &mesh, &[]).unwrap();
    let ones = DVector::from_element(matrix.ncols(), 1.0);
    let residual = &matrix * &ones;
    assert!(residual.amax() <= 1e-12);
}

#[test]
fn assembled_matrices_are_symmetric() {
    let mesh = unit_square_triangulation::<f64>(2, 3);
    let form = p1_bilinear_form("a(u, v) = (u, v)")
        .with_default_cell_integral(|| Box::new(P1TriangleMassIntegral::new()));
    let assembler = FormAssembler::new();
    let matrix = assembler.assemble_matrix(&form, &mesh, &[]).unwrap();
    assert_matrix_eq!(matrix, matrix.transpose(), comp = abs, tol = 1e-14);
}

#[test]
fn jump_penalty_vanishes_for_conforming_fields() {
    // P1 nodal fields are continuous, so the interior facet jump terms see
    // zero jump whatever the nodal values.
    let mesh = unit_square_triangulation::<f64>(1, 1);
    let form = p1_bilinear_form("a(u, v) = ([[u]], [[v]])_dS")
        .with_default_interior_facet_integral(|| Box::new(P1TriangleJumpIntegral::new()));
    let assembler = FormAssembler::new();
    let matrix = assembler.assemble_matrix(&form, &mesh, &[]).unwrap();
    let values = DVector::from_column_slice(&[1.0, -2.0, 3.0, 0.5]);
    let energy = (&matrix * &values).dot(&values);
    assert!(energy.abs() <= 1e-12);
}

#[test]
fn subdomain_markers_select_between_kernels() {
    // Cell 0 is marked into a mass subdomain while cell 1 falls back to the
    // Laplace default, whose rows sum to zero. The surviving total is the
    // marked cell's area.
    let mut mesh = unit_square_triangulation::<f64>(1, 1);
    mesh.set_cell_marker(0, 1);
    let form = p1_bilinear_form("a(u, v) piecewise")
        .with_cell_integral(1, || Box::new(P1TriangleMassIntegral::new()))
        .with_default_cell_integral(|| Box::new(P1TriangleLaplaceIntegral::new()));
    assert_eq!(form.max_cell_subdomain_id(), 2);
    let assembler = FormAssembler::new();
    let matrix = assembler.assemble_matrix(&form, &mesh, &[]).unwrap();
    let total: f64 = matrix.values().iter().sum();
    assert!((total - 0.5).abs() <= 1e-12);
}
