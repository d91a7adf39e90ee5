//! The mesh interface consumed by the optimization loop.
//!
//! Mesh construction and refinement are out of scope for this crate; the loop
//! only needs element enumeration, per-element quadrature data, a
//! representative point per element and a way to detect geometry changes.
use crate::quadrature::ElementQuadrature;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, Scalar};

/// Index of one mesh refinement level in a hierarchy, ordered coarse to fine.
pub type Level = usize;

/// One refinement level of an externally owned finite element mesh.
///
/// The mesh is immutable while an optimization loop runs on it, except across
/// level changes; [`geometry_revision`](ControlMesh::geometry_revision) must
/// change whenever the element geometry does, so that cached per-element data
/// (in particular control-region flags) can be invalidated.
pub trait ControlMesh<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn num_elements(&self) -> usize;

    /// Total number of nodes (scalar degrees of freedom) in the mesh.
    fn num_nodes(&self) -> usize;

    fn element_node_count(&self, element_index: usize) -> usize;

    /// Writes the global node indices of the given element into `output`.
    ///
    /// # Panics
    ///
    /// Panics if `output.len()` differs from the element's node count.
    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize);

    /// Fills `quadrature` with the element's quadrature rule: physical
    /// weights, basis values and physical basis gradients per point.
    fn populate_element_quadrature(&self, quadrature: &mut ElementQuadrature<T, D>, element_index: usize);

    /// A representative point of the element, typically its centroid.
    fn element_centroid(&self, element_index: usize) -> OPoint<T, D>;

    /// A counter that changes whenever the mesh geometry changes.
    fn geometry_revision(&self) -> u64;
}
