use formkit::cell::CellShape;
use formkit::element::{
    ElementDescriptor, FiniteElement, LagrangeElement, MixedElement, VectorLagrangeElement,
};
use proptest::prelude::*;

pub fn point_in_triangle_ref_domain() -> impl Strategy<Value = [f64; 2]> {
    // Points x, y in [0, 1]^2 with x + y <= 1.
    (0.0..=1.0)
        .prop_flat_map(|x: f64| (Just(x), 0.0..=1.0 - x))
        .prop_map(|(x, y)| [x, y])
}

pub fn point_in_tet_ref_domain() -> impl Strategy<Value = [f64; 3]> {
    (0.0..=1.0)
        .prop_flat_map(|x: f64| (Just(x), 0.0..=1.0 - x))
        .prop_flat_map(|(x, y)| (Just(x), Just(y), 0.0..=1.0 - x - y))
        .prop_map(|(x, y, z)| [x, y, z])
}

pub fn point_in_hex_ref_domain() -> impl Strategy<Value = [f64; 3]> {
    let r = 0.0..=1.0;
    [r.clone(), r.clone(), r]
}

fn basis_values(element: &dyn FiniteElement<f64>, point: &[f64]) -> Vec<f64> {
    let mut values = vec![0.0; element.space_dimension() * element.reference_value_size()];
    element.evaluate_reference_basis(&mut values, point).unwrap();
    values
}

macro_rules! partition_of_unity_test {
    ($test_name:ident, $strategy:expr, $shape:expr, $degree:expr) => {
        proptest! {
            #[test]
            fn $test_name(point in $strategy) {
                let element = LagrangeElement::<f64>::new($shape, $degree).unwrap();
                let sum: f64 = basis_values(&element, &point).iter().sum();
                prop_assert!((sum - 1.0).abs() <= 1e-12);
            }
        }
    };
}

partition_of_unity_test!(
    p1_triangle_basis_is_partition_of_unity,
    point_in_triangle_ref_domain(),
    CellShape::Triangle,
    1
);

partition_of_unity_test!(
    p2_triangle_basis_is_partition_of_unity,
    point_in_triangle_ref_domain(),
    CellShape::Triangle,
    2
);

partition_of_unity_test!(
    p2_tet_basis_is_partition_of_unity,
    point_in_tet_ref_domain(),
    CellShape::Tetrahedron,
    2
);

partition_of_unity_test!(
    q1_hex_basis_is_partition_of_unity,
    point_in_hex_ref_domain(),
    CellShape::Hexahedron,
    1
);

proptest! {
    // Differentiating the partition of unity: the basis gradients cancel
    // at every reference point.
    #[test]
    fn p2_triangle_gradients_sum_to_zero(point in point_in_triangle_ref_domain()) {
        let element = LagrangeElement::<f64>::new(CellShape::Triangle, 2).unwrap();
        let space_dimension = element.space_dimension();
        let mut derivatives = vec![0.0; space_dimension * 2];
        element
            .evaluate_reference_basis_derivatives(&mut derivatives, 1, &point)
            .unwrap();
        for axis in 0..2 {
            let sum: f64 = (0..space_dimension)
                .map(|dof| derivatives[dof * 2 + axis])
                .sum();
            prop_assert!(sum.abs() <= 1e-11);
        }
    }
}

#[test]
fn p1_triangle_barycenter_values_are_equal() {
    let element = LagrangeElement::<f64>::new(CellShape::Triangle, 1).unwrap();
    let values = basis_values(&element, &[1.0 / 3.0, 1.0 / 3.0]);
    for value in values {
        assert!((value - 1.0 / 3.0).abs() <= 1e-15);
    }
}

#[test]
fn nodal_dof_coordinates_reproduce_kronecker_property() {
    let element = LagrangeElement::<f64>::new(CellShape::Tetrahedron, 2).unwrap();
    let n = element.space_dimension();
    let mut coordinates = vec![0.0; n * 3];
    element.tabulate_reference_dof_coordinates(&mut coordinates).unwrap();
    for dof in 0..n {
        let values = basis_values(&element, &coordinates[dof * 3..(dof + 1) * 3]);
        for (other, &value) in values.iter().enumerate() {
            let expected = if other == dof { 1.0 } else { 0.0 };
            assert!(
                (value - expected).abs() <= 1e-12,
                "basis {other} at node {dof} was {value}"
            );
        }
    }
}

#[test]
fn taylor_hood_element_dimensions_are_additive() {
    let velocity = LagrangeElement::<f64>::new(CellShape::Triangle, 2).unwrap();
    let pressure = LagrangeElement::<f64>::new(CellShape::Triangle, 1).unwrap();
    let mixed = MixedElement::new(vec![(velocity.clone(), 2), (pressure.clone(), 1)]).unwrap();

    let vector = VectorLagrangeElement::new(velocity, 2).unwrap();
    assert_eq!(vector.space_dimension(), 12);
    assert_eq!(
        mixed.space_dimension(),
        vector.space_dimension() + pressure.space_dimension()
    );
    assert_eq!(mixed.value_size(), vector.value_size() + pressure.value_size());
    assert_eq!(mixed.num_sub_elements(), 2);
    let sub_dimensions: usize = (0..mixed.num_sub_elements())
        .map(|index| mixed.create_sub_element(index).unwrap().space_dimension())
        .sum();
    assert_eq!(sub_dimensions, mixed.space_dimension());
}

#[test]
fn element_descriptor_round_trips_through_json() {
    let element = LagrangeElement::<f64>::new(CellShape::Tetrahedron, 2).unwrap();
    let descriptor = ElementDescriptor::from_element(&element);
    descriptor.validate().unwrap();
    let json = serde_json::to_string(&descriptor).unwrap();
    let recovered: ElementDescriptor = serde_json::from_str(&json).unwrap();
    assert_eq!(recovered, descriptor);
    assert_eq!(recovered.space_dimension, Some(10));
}
