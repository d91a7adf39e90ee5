//! Accumulation of cost functionals and control norms over one mesh level.
//!
//! Both accumulators walk elements in order and quadrature points within each
//! element. Element contributions are independent, so they are evaluated in
//! parallel; the final reduction always folds the per-element values in
//! element-index order with compensated summation, which makes the result
//! both numerically stable and bit-reproducible across thread counts.
use crate::mesh::ControlMesh;
use crate::quadrature::{evaluate_function, evaluate_gradient, ElementQuadrature};
use crate::region::ControlFlags;
use crate::util::{sum_compensated, CompensatedSum};
use eyre::bail;
use nalgebra::allocator::Allocator;
use nalgebra::{DVectorView, DefaultAllocator, DimName, RealField};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

/// Which derivative terms of the control field enter its penalty norm.
///
/// The mesh interface supplies field values and first derivatives at
/// quadrature points, so orders beyond one are not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegularizationOrder {
    /// Plain $L^2$ norm of the control field.
    L2,
    /// $H^1$-type norm: adds the squared magnitude of the control gradient.
    H1,
}

impl RegularizationOrder {
    /// Maps a numeric order from configuration to the enum.
    ///
    /// Orders greater than one would require higher derivatives than the
    /// mesh interface provides and are rejected as configuration errors.
    pub fn from_order(order: u32) -> eyre::Result<Self> {
        match order {
            0 => Ok(RegularizationOrder::L2),
            1 => Ok(RegularizationOrder::H1),
            order => bail!("regularization order {order} is not supported (available orders: 0, 1)"),
        }
    }

    pub fn order(self) -> u32 {
        match self {
            RegularizationOrder::L2 => 0,
            RegularizationOrder::H1 => 1,
        }
    }

    fn includes_gradient(self) -> bool {
        matches!(self, RegularizationOrder::H1)
    }
}

/// The density integrated by [`compute_integral`].
///
/// What exactly constitutes the cost of an iterate (state misfit, control
/// cost or a combination) depends on the optimal-control problem at hand, so
/// the integrand is a required configuration input of the loop rather than a
/// fixed formula. It is evaluated from the interpolated state, adjoint and
/// control values at each quadrature point.
pub trait CostIntegrand<T>: Sync {
    fn evaluate(&self, state: T, adjoint: T, control: T) -> T;
}

impl<T, F> CostIntegrand<T> for F
where
    F: Fn(T, T, T) -> T + Sync,
{
    fn evaluate(&self, state: T, adjoint: T, control: T) -> T {
        self(state, adjoint, control)
    }
}

/// Computes the integral of the configured cost density over all elements of
/// the mesh.
///
/// A mesh with zero elements yields 0. The field arrays must be indexed
/// consistently with the mesh node numbering; a length mismatch is a contract
/// violation and panics.
pub fn compute_integral<'a, T, D, M, F>(
    mesh: &M,
    state: impl Into<DVectorView<'a, T>>,
    adjoint: impl Into<DVectorView<'a, T>>,
    control: impl Into<DVectorView<'a, T>>,
    integrand: &F,
) -> eyre::Result<T>
where
    T: RealField + Send + Sync,
    D: DimName,
    M: ControlMesh<T, D> + Sync,
    F: CostIntegrand<T> + ?Sized,
    DefaultAllocator: Allocator<T, D>,
{
    let state = state.into();
    let adjoint = adjoint.into();
    let control = control.into();
    assert_eq!(state.len(), mesh.num_nodes(), "state field length must match mesh node count");
    assert_eq!(adjoint.len(), mesh.num_nodes(), "adjoint field length must match mesh node count");
    assert_eq!(control.len(), mesh.num_nodes(), "control field length must match mesh node count");

    let contributions: Vec<T> = (0..mesh.num_elements())
        .into_par_iter()
        .with_min_len(50)
        .map(|element_index| {
            let element = ElementFields::gather(mesh, element_index, &state, &adjoint, &control);
            let mut element_integral = CompensatedSum::new();
            for qp in 0..element.quadrature.num_points() {
                let phi = element.quadrature.basis_values(qp);
                let u = evaluate_function(phi, &element.state);
                let lambda = evaluate_function(phi, &element.adjoint);
                let c = evaluate_function(phi, &element.control);
                element_integral.add(element.quadrature.weight(qp) * integrand.evaluate(u, lambda, c));
            }
            element_integral.value()
        })
        .collect();

    // Canonical merge order: fold per-element values by element index so the
    // result does not depend on how rayon partitioned the range.
    Ok(sum_compensated(contributions))
}

/// Computes the norm of the control field restricted to the flagged elements.
///
/// Sums the quadrature-weighted squared control values (plus squared control
/// gradients for [`RegularizationOrder::H1`]) over elements whose flag is
/// set, and returns the square root. Elements outside the control region
/// contribute zero; an empty flagged region or an empty mesh yields 0.
///
/// # Panics
///
/// Panics if the flag array length does not match the mesh element count, or
/// if the control field length does not match the mesh node count.
pub fn compute_norm_control<'a, T, D, M>(
    mesh: &M,
    control: impl Into<DVectorView<'a, T>>,
    flags: &ControlFlags,
    regularization_order: RegularizationOrder,
) -> eyre::Result<T>
where
    T: RealField + Send + Sync,
    D: DimName,
    M: ControlMesh<T, D> + Sync,
    DefaultAllocator: Allocator<T, D>,
{
    let control = control.into();
    assert_eq!(
        flags.len(),
        mesh.num_elements(),
        "element flag count must match mesh element count"
    );
    assert_eq!(control.len(), mesh.num_nodes(), "control field length must match mesh node count");

    let contributions: Vec<T> = (0..mesh.num_elements())
        .into_par_iter()
        .with_min_len(50)
        .map(|element_index| {
            if !flags.is_flagged(element_index) {
                return T::zero();
            }
            let node_count = mesh.element_node_count(element_index);
            let mut nodes = vec![0; node_count];
            mesh.populate_element_nodes(&mut nodes, element_index);
            let control_local: Vec<_> = nodes.iter().map(|&node| control[node].clone()).collect();

            let mut quadrature = ElementQuadrature::default();
            mesh.populate_element_quadrature(&mut quadrature, element_index);

            let mut element_norm_squared = CompensatedSum::new();
            for qp in 0..quadrature.num_points() {
                let c = evaluate_function(quadrature.basis_values(qp), &control_local);
                let mut density = c.clone() * c;
                if regularization_order.includes_gradient() {
                    let c_grad = evaluate_gradient(quadrature.basis_gradients(qp), &control_local);
                    density += c_grad.norm_squared();
                }
                element_norm_squared.add(quadrature.weight(qp) * density);
            }
            element_norm_squared.value()
        })
        .collect();

    Ok(sum_compensated(contributions).sqrt())
}

/// Element-local field values gathered from the global arrays.
struct ElementFields<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    quadrature: ElementQuadrature<T, D>,
    state: Vec<T>,
    adjoint: Vec<T>,
    control: Vec<T>,
}

impl<T, D> ElementFields<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn gather<M>(
        mesh: &M,
        element_index: usize,
        state: &DVectorView<'_, T>,
        adjoint: &DVectorView<'_, T>,
        control: &DVectorView<'_, T>,
    ) -> Self
    where
        M: ControlMesh<T, D>,
    {
        let node_count = mesh.element_node_count(element_index);
        let mut nodes = vec![0; node_count];
        mesh.populate_element_nodes(&mut nodes, element_index);

        let gather =
            |field: &DVectorView<'_, T>| -> Vec<T> { nodes.iter().map(|&node| field[node].clone()).collect() };
        let mut quadrature = ElementQuadrature::default();
        mesh.populate_element_quadrature(&mut quadrature, element_index);
        assert_eq!(
            quadrature.node_count(),
            node_count,
            "quadrature node count must match element node count"
        );

        Self {
            quadrature,
            state: gather(state),
            adjoint: gather(adjoint),
            control: gather(control),
        }
    }
}
