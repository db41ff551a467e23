use formkit::cell::{CellShape, Orientation};
use formkit::mapping::{CoordinateMapping, IsoparametricMapping};
use proptest::array::uniform6;
use proptest::prelude::*;

use super::element::point_in_triangle_ref_domain;

fn triangle_determinant(dofs: &[f64; 6]) -> f64 {
    let [x0, y0, x1, y1, x2, y2] = *dofs;
    (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0)
}

fn nondegenerate_triangle() -> impl Strategy<Value = [f64; 6]> {
    uniform6(-2.0..=2.0f64)
        .prop_filter("triangle must not be (nearly) degenerate", |dofs| {
            triangle_determinant(dofs).abs() > 0.1
        })
}

proptest! {
    #[test]
    fn physical_and_reference_coordinates_round_trip(
        dofs in nondegenerate_triangle(),
        point in point_in_triangle_ref_domain(),
    ) {
        let mapping = IsoparametricMapping::<f64>::new(CellShape::Triangle, 1).unwrap();
        let mut physical = [0.0; 2];
        mapping.compute_physical_coordinates(&mut physical, &point, &dofs).unwrap();
        let mut recovered = [0.0; 2];
        mapping
            .compute_reference_coordinates(&mut recovered, &physical, &dofs, Orientation::Standard)
            .unwrap();
        prop_assert!((recovered[0] - point[0]).abs() <= 1e-10);
        prop_assert!((recovered[1] - point[1]).abs() <= 1e-10);
    }

    #[test]
    fn jacobian_inverse_composes_to_identity(dofs in nondegenerate_triangle()) {
        let mapping = IsoparametricMapping::<f64>::new(CellShape::Triangle, 1).unwrap();
        let reference = [0.25, 0.25];
        let mut jacobian = [0.0; 4];
        let mut inverse = [0.0; 4];
        mapping.compute_jacobians(&mut jacobian, &reference, &dofs).unwrap();
        mapping.compute_jacobian_inverses(&mut inverse, &jacobian).unwrap();
        for row in 0..2 {
            for column in 0..2 {
                let product: f64 = (0..2)
                    .map(|k| inverse[row * 2 + k] * jacobian[k * 2 + column])
                    .sum();
                let expected = if row == column { 1.0 } else { 0.0 };
                prop_assert!((product - expected).abs() <= 1e-10);
            }
        }
    }
}

#[test]
fn newton_inversion_recovers_points_on_a_skewed_quadrilateral() {
    let mapping = IsoparametricMapping::<f64>::new(CellShape::Quadrilateral, 1).unwrap();
    // Vertices in bit-pattern order, deliberately non-affine.
    let dofs = [0.0, 0.0, 2.0, 0.0, 0.2, 1.0, 1.5, 1.3];
    let reference = [0.3, 0.7];
    let mut physical = [0.0; 2];
    mapping.compute_physical_coordinates(&mut physical, &reference, &dofs).unwrap();
    let mut recovered = [0.0; 2];
    mapping
        .compute_reference_coordinates(&mut recovered, &physical, &dofs, Orientation::Standard)
        .unwrap();
    assert!((recovered[0] - reference[0]).abs() <= 1e-9);
    assert!((recovered[1] - reference[1]).abs() <= 1e-9);
}

#[test]
fn identity_coordinate_dofs_give_the_identity_jacobian() {
    let mapping = IsoparametricMapping::<f64>::new(CellShape::Triangle, 1).unwrap();
    // Coordinate dofs coinciding with the reference vertices make the
    // geometry map the identity.
    let dofs = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
    let reference = [1.0 / 3.0, 1.0 / 3.0];
    let mut jacobian = [0.0; 4];
    mapping.compute_jacobians(&mut jacobian, &reference, &dofs).unwrap();
    assert_eq!(jacobian, [1.0, 0.0, 0.0, 1.0]);
    let mut inverse = [0.0; 4];
    mapping.compute_jacobian_inverses(&mut inverse, &jacobian).unwrap();
    assert_eq!(inverse, [1.0, 0.0, 0.0, 1.0]);
    let mut determinant = [0.0];
    mapping
        .compute_jacobian_determinants(&mut determinant, &jacobian, Orientation::Standard)
        .unwrap();
    assert_eq!(determinant[0], 1.0);
    let mut physical = [0.0; 2];
    mapping.compute_physical_coordinates(&mut physical, &reference, &dofs).unwrap();
    assert!((physical[0] - reference[0]).abs() <= 1e-15);
    assert!((physical[1] - reference[1]).abs() <= 1e-15);
}

#[test]
fn manifold_inversion_recovers_surface_points_for_either_orientation() {
    let mapping =
        IsoparametricMapping::<f64>::with_geometric_dimension(CellShape::Triangle, 1, 3).unwrap();
    let dofs = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0];
    let reference = [0.3, 0.4];
    let mut physical = [0.0; 3];
    mapping.compute_physical_coordinates(&mut physical, &reference, &dofs).unwrap();
    // The orientation flag fixes sign conventions only; the recovered
    // coordinates agree for both values.
    for orientation in [Orientation::Standard, Orientation::Flipped] {
        let mut recovered = [0.0; 2];
        mapping
            .compute_reference_coordinates(&mut recovered, &physical, &dofs, orientation)
            .unwrap();
        assert!((recovered[0] - reference[0]).abs() <= 1e-12);
        assert!((recovered[1] - reference[1]).abs() <= 1e-12);
    }
}

#[test]
fn manifold_pseudo_inverse_is_a_left_inverse() {
    let mapping =
        IsoparametricMapping::<f64>::with_geometric_dimension(CellShape::Triangle, 1, 3).unwrap();
    // A triangle tilted out of the xy plane, with surface measure sqrt(2).
    let dofs = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0];
    let reference = [0.25, 0.5];
    let mut jacobian = [0.0; 6];
    let mut inverse = [0.0; 6];
    mapping.compute_jacobians(&mut jacobian, &reference, &dofs).unwrap();
    mapping.compute_jacobian_inverses(&mut inverse, &jacobian).unwrap();
    // K J = I even though J K is only a projection.
    for row in 0..2 {
        for column in 0..2 {
            let product: f64 = (0..3)
                .map(|k| inverse[row * 3 + k] * jacobian[k * 2 + column])
                .sum();
            let expected = if row == column { 1.0 } else { 0.0 };
            assert!((product - expected).abs() <= 1e-12);
        }
    }
    // The pseudo-determinant carries the surface measure and the
    // orientation sign.
    let mut determinant = [0.0];
    mapping
        .compute_jacobian_determinants(&mut determinant, &jacobian, Orientation::Standard)
        .unwrap();
    assert!((determinant[0] - 2.0f64.sqrt()).abs() <= 1e-12);
    mapping
        .compute_jacobian_determinants(&mut determinant, &jacobian, Orientation::Flipped)
        .unwrap();
    assert!((determinant[0] + 2.0f64.sqrt()).abs() <= 1e-12);
}
