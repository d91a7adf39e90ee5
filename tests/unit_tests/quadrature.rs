use matrixcompare::assert_scalar_eq;
use nalgebra::{Vector1, Vector2, U2};
use optloop::quadrature::{
    evaluate_function, evaluate_gradient, evaluate_vector_function, ElementQuadrature,
};

#[test]
fn evaluate_function_interpolates_nodal_values() {
    // phi = (0.25, 0.75), u = (2, 4) -> 0.25 * 2 + 0.75 * 4
    let value = evaluate_function(&[0.25, 0.75], &[2.0, 4.0]);
    assert_scalar_eq!(value, 3.5, comp = abs, tol = 1e-14);
}

#[test]
fn evaluate_function_of_constant_field_is_constant() {
    // Basis values at any point of any element sum to one (partition of
    // unity), so a constant field interpolates exactly.
    let value = evaluate_function(&[0.1, 0.2, 0.3, 0.4], &[7.0, 7.0, 7.0, 7.0]);
    assert_scalar_eq!(value, 7.0, comp = abs, tol = 1e-14);
}

#[test]
fn evaluate_gradient_combines_basis_gradients() {
    let gradients = [Vector2::new(-1.0, 0.0), Vector2::new(1.0, 2.0)];
    let gradient = evaluate_gradient(&gradients, &[3.0, 5.0]);
    assert_scalar_eq!(gradient.x, 2.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(gradient.y, 10.0, comp = abs, tol = 1e-14);
}

#[test]
fn evaluate_gradient_of_linear_1d_field_is_its_slope() {
    // Two-node element on [0, h], u(x) = u0 + (u1 - u0) x / h.
    let h = 0.25;
    let gradients = [Vector1::new(-1.0 / h), Vector1::new(1.0 / h)];
    let gradient = evaluate_gradient(&gradients, &[1.0, 3.0]);
    assert_scalar_eq!(gradient.x, 8.0, comp = abs, tol = 1e-13);
}

#[test]
fn evaluate_vector_function_handles_interleaved_values() {
    // Two nodes, two components per node, interleaved per node.
    let value = evaluate_vector_function::<f64, U2>(&[0.5, 0.5], &[2.0, 4.0, 6.0, 8.0]);
    assert_scalar_eq!(value.x, 4.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(value.y, 6.0, comp = abs, tol = 1e-14);
}

#[test]
#[should_panic(expected = "number of nodal values must match")]
fn evaluate_function_panics_on_size_mismatch() {
    evaluate_function(&[0.5, 0.5], &[1.0, 2.0, 3.0]);
}

#[test]
#[should_panic(expected = "number of nodal values must match")]
fn evaluate_gradient_panics_on_size_mismatch() {
    evaluate_gradient(&[Vector2::new(1.0, 0.0)], &[1.0, 2.0]);
}

#[test]
fn element_quadrature_stores_points_point_major() {
    let mut quadrature = ElementQuadrature::<f64, U2>::default();
    quadrature.reset(2);
    quadrature.push_point(0.5, &[1.0, 0.0], &[Vector2::zeros(), Vector2::zeros()]);
    quadrature.push_point(0.25, &[0.0, 1.0], &[Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0)]);

    assert_eq!(quadrature.num_points(), 2);
    assert_eq!(quadrature.node_count(), 2);
    assert_eq!(quadrature.weight(0), 0.5);
    assert_eq!(quadrature.basis_values(1), &[0.0, 1.0]);
    assert_eq!(quadrature.basis_gradients(1)[0], Vector2::new(1.0, 0.0));
}

#[test]
fn element_quadrature_reset_clears_points() {
    let mut quadrature = ElementQuadrature::<f64, U2>::default();
    quadrature.reset(1);
    quadrature.push_point(1.0, &[1.0], &[Vector2::zeros()]);
    quadrature.reset(3);
    assert_eq!(quadrature.num_points(), 0);
    assert_eq!(quadrature.node_count(), 3);
}

#[test]
#[should_panic(expected = "number of basis values must match")]
fn element_quadrature_rejects_wrong_basis_count() {
    let mut quadrature = ElementQuadrature::<f64, U2>::default();
    quadrature.reset(2);
    quadrature.push_point(1.0, &[1.0], &[Vector2::zeros(), Vector2::zeros()]);
}
