//! Evaluation of finite element fields at element quadrature points.
//!
//! The mesh collaborator supplies, per element, a set of quadrature points
//! with *physical* integration weights (the reference weight already scaled by
//! the Jacobian volume form) together with the basis function values and
//! physical basis gradients at each point. The functions in this module
//! interpolate nodal field values at those points. They are pure functions of
//! their inputs; mismatched input sizes are contract violations and panic.
use itertools::izip;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OVector, RealField, Scalar};

/// Quadrature data for a single element, as supplied by the mesh.
///
/// Stored point-major: for each quadrature point there is one weight,
/// `node_count` basis values and `node_count` basis gradients.
#[derive(Debug, Clone)]
pub struct ElementQuadrature<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    node_count: usize,
    weights: Vec<T>,
    basis_values: Vec<T>,
    basis_gradients: Vec<OVector<T, D>>,
}

impl<T, D> Default for ElementQuadrature<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn default() -> Self {
        Self {
            node_count: 0,
            weights: Vec::new(),
            basis_values: Vec::new(),
            basis_gradients: Vec::new(),
        }
    }
}

impl<T, D> ElementQuadrature<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Clears all stored points and sets the number of nodes per element.
    pub fn reset(&mut self, node_count: usize) {
        self.node_count = node_count;
        self.weights.clear();
        self.basis_values.clear();
        self.basis_gradients.clear();
    }

    /// Appends one quadrature point.
    ///
    /// # Panics
    ///
    /// Panics if the number of basis values or gradients differs from the
    /// node count configured with [`reset`](Self::reset).
    pub fn push_point(&mut self, weight: T, basis_values: &[T], basis_gradients: &[OVector<T, D>]) {
        assert_eq!(
            basis_values.len(),
            self.node_count,
            "number of basis values must match the element node count"
        );
        assert_eq!(
            basis_gradients.len(),
            self.node_count,
            "number of basis gradients must match the element node count"
        );
        self.weights.push(weight);
        self.basis_values.extend_from_slice(basis_values);
        self.basis_gradients.extend_from_slice(basis_gradients);
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    /// The physical integration weight of quadrature point `i`.
    pub fn weight(&self, i: usize) -> T {
        self.weights[i].clone()
    }

    /// Basis function values at quadrature point `i`, one per element node.
    pub fn basis_values(&self, i: usize) -> &[T] {
        &self.basis_values[i * self.node_count..(i + 1) * self.node_count]
    }

    /// Physical basis function gradients at quadrature point `i`.
    pub fn basis_gradients(&self, i: usize) -> &[OVector<T, D>] {
        &self.basis_gradients[i * self.node_count..(i + 1) * self.node_count]
    }
}

/// Interpolates a scalar field at a quadrature point.
///
/// Computes $u_h = \sum_i \varphi_i u_i$ from the basis values $\varphi_i$
/// and the element-local nodal values $u_i$.
///
/// # Panics
///
/// Panics if the two slices have different lengths.
pub fn evaluate_function<T: RealField>(basis_values: &[T], element_values: &[T]) -> T {
    assert_eq!(
        basis_values.len(),
        element_values.len(),
        "number of nodal values must match the number of basis values"
    );
    let mut value = T::zero();
    for (phi, u) in izip!(basis_values, element_values) {
        value += phi.clone() * u.clone();
    }
    value
}

/// Interpolates the gradient of a scalar field at a quadrature point.
///
/// Computes $\nabla u_h = \sum_i u_i \nabla \varphi_i$ from the physical
/// basis gradients $\nabla \varphi_i$ and the element-local nodal values.
///
/// # Panics
///
/// Panics if the two slices have different lengths.
pub fn evaluate_gradient<T, D>(basis_gradients: &[OVector<T, D>], element_values: &[T]) -> OVector<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    assert_eq!(
        basis_gradients.len(),
        element_values.len(),
        "number of nodal values must match the number of basis gradients"
    );
    let mut gradient = OVector::<T, D>::zeros();
    for (phi_grad, u) in izip!(basis_gradients, element_values) {
        gradient += phi_grad * u.clone();
    }
    gradient
}

/// Interpolates a vector-valued field at a quadrature point.
///
/// Nodal values are interleaved per node, i.e. `element_values` has length
/// `S::dim() * basis_values.len()`.
///
/// # Panics
///
/// Panics if the nodal value slice does not have the expected length.
pub fn evaluate_vector_function<T, S>(basis_values: &[T], element_values: &[T]) -> OVector<T, S>
where
    T: RealField,
    S: DimName,
    DefaultAllocator: Allocator<T, S>,
{
    let s = S::dim();
    assert_eq!(
        element_values.len(),
        s * basis_values.len(),
        "nodal value count must be the solution dimension times the number of basis values"
    );
    let mut value = OVector::<T, S>::zeros();
    for (i, phi) in basis_values.iter().enumerate() {
        for j in 0..s {
            value[j] += phi.clone() * element_values[s * i + j].clone();
        }
    }
    value
}
