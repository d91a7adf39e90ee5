//! Mesh and system test doubles shared by the unit tests.
use eyre::eyre;
use nalgebra::{DVector, DVectorView, Point1, Point2, Vector1, Vector2, U1, U2};
use optloop::mesh::{ControlMesh, Level};
use optloop::quadrature::ElementQuadrature;
use optloop::system::PdeSystem;

/// A mesh of disconnected single-node elements.
///
/// Each element carries one node (its own index), a single quadrature point
/// with weight equal to the element measure, basis value 1 and zero basis
/// gradient. This makes analytic values of integrals and norms trivial to
/// write down: the integral of a field is the measure-weighted sum of its
/// nodal values.
pub struct LumpedMesh {
    measures: Vec<f64>,
    centroids: Vec<Point2<f64>>,
    revision: u64,
}

impl LumpedMesh {
    pub fn new(measures: Vec<f64>, centroids: Vec<Point2<f64>>) -> Self {
        assert_eq!(measures.len(), centroids.len());
        Self {
            measures,
            centroids,
            revision: 0,
        }
    }

    /// `num_elements` equal elements along the x axis covering `[0, length]`.
    pub fn uniform_interval(num_elements: usize, length: f64) -> Self {
        let h = length / num_elements.max(1) as f64;
        let measures = vec![h; num_elements];
        let centroids = (0..num_elements)
            .map(|i| Point2::new((i as f64 + 0.5) * h, 0.0))
            .collect();
        Self::new(measures, centroids)
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn bump_revision(&mut self) {
        self.revision += 1;
    }

    pub fn centroids_mut(&mut self) -> &mut [Point2<f64>] {
        &mut self.centroids
    }
}

impl ControlMesh<f64, U2> for LumpedMesh {
    fn num_elements(&self) -> usize {
        self.measures.len()
    }

    fn num_nodes(&self) -> usize {
        self.measures.len()
    }

    fn element_node_count(&self, _element_index: usize) -> usize {
        1
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        assert_eq!(output.len(), 1);
        output[0] = element_index;
    }

    fn populate_element_quadrature(&self, quadrature: &mut ElementQuadrature<f64, U2>, element_index: usize) {
        quadrature.reset(1);
        quadrature.push_point(self.measures[element_index], &[1.0], &[Vector2::zeros()]);
    }

    fn element_centroid(&self, element_index: usize) -> Point2<f64> {
        self.centroids[element_index]
    }

    fn geometry_revision(&self) -> u64 {
        self.revision
    }
}

/// A 1D bar of linear two-node elements with midpoint quadrature.
///
/// Nodal fields interpolate linearly, so the quadrature point sees the nodal
/// average and the (constant) element slope. Used by the tests that need
/// nonzero basis gradients.
pub struct BarMesh1d {
    node_x: Vec<f64>,
    revision: u64,
}

impl BarMesh1d {
    /// `num_elements` equal elements covering `[0, length]`.
    pub fn uniform(num_elements: usize, length: f64) -> Self {
        assert!(num_elements > 0);
        let h = length / num_elements as f64;
        let node_x = (0..=num_elements).map(|i| i as f64 * h).collect();
        Self { node_x, revision: 0 }
    }
}

impl ControlMesh<f64, U1> for BarMesh1d {
    fn num_elements(&self) -> usize {
        self.node_x.len() - 1
    }

    fn num_nodes(&self) -> usize {
        self.node_x.len()
    }

    fn element_node_count(&self, _element_index: usize) -> usize {
        2
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        assert_eq!(output.len(), 2);
        output[0] = element_index;
        output[1] = element_index + 1;
    }

    fn populate_element_quadrature(&self, quadrature: &mut ElementQuadrature<f64, U1>, element_index: usize) {
        let h = self.node_x[element_index + 1] - self.node_x[element_index];
        quadrature.reset(2);
        quadrature.push_point(
            h,
            &[0.5, 0.5],
            &[Vector1::new(-1.0 / h), Vector1::new(1.0 / h)],
        );
    }

    fn element_centroid(&self, element_index: usize) -> Point1<f64> {
        Point1::new(0.5 * (self.node_x[element_index] + self.node_x[element_index + 1]))
    }

    fn geometry_revision(&self) -> u64 {
        self.revision
    }
}

/// The solution fields of one level.
pub struct LevelFields {
    pub state: DVector<f64>,
    pub adjoint: DVector<f64>,
    pub control: DVector<f64>,
}

impl LevelFields {
    pub fn constant(num_nodes: usize, state: f64, adjoint: f64, control: f64) -> Self {
        Self {
            state: DVector::from_element(num_nodes, state),
            adjoint: DVector::from_element(num_nodes, adjoint),
            control: DVector::from_element(num_nodes, control),
        }
    }
}

/// A system whose solve is a no-op; the fields never change.
pub struct StaticSystem {
    pub levels: Vec<LevelFields>,
}

impl PdeSystem<f64> for StaticSystem {
    fn state(&self, level: Level) -> DVectorView<'_, f64> {
        (&self.levels[level].state).into()
    }

    fn adjoint(&self, level: Level) -> DVectorView<'_, f64> {
        (&self.levels[level].adjoint).into()
    }

    fn control(&self, level: Level) -> DVectorView<'_, f64> {
        (&self.levels[level].control).into()
    }

    fn solve(&mut self, _level: Level) -> eyre::Result<()> {
        Ok(())
    }
}

/// A system whose solve shifts the control field by one each call, so the
/// objective keeps changing from iteration to iteration.
pub struct DriftingSystem {
    pub fields: LevelFields,
}

impl PdeSystem<f64> for DriftingSystem {
    fn state(&self, _level: Level) -> DVectorView<'_, f64> {
        (&self.fields.state).into()
    }

    fn adjoint(&self, _level: Level) -> DVectorView<'_, f64> {
        (&self.fields.adjoint).into()
    }

    fn control(&self, _level: Level) -> DVectorView<'_, f64> {
        (&self.fields.control).into()
    }

    fn solve(&mut self, _level: Level) -> eyre::Result<()> {
        self.fields.control.add_scalar_mut(1.0);
        Ok(())
    }
}

/// A system whose solve always fails.
pub struct FailingSystem {
    pub fields: LevelFields,
}

impl PdeSystem<f64> for FailingSystem {
    fn state(&self, _level: Level) -> DVectorView<'_, f64> {
        (&self.fields.state).into()
    }

    fn adjoint(&self, _level: Level) -> DVectorView<'_, f64> {
        (&self.fields.adjoint).into()
    }

    fn control(&self, _level: Level) -> DVectorView<'_, f64> {
        (&self.fields.control).into()
    }

    fn solve(&mut self, _level: Level) -> eyre::Result<()> {
        Err(eyre!("linear solver breakdown"))
    }
}
