//! The PDE system interface and the multi-level problem aggregate.
use crate::mesh::Level;
use nalgebra::{DVectorView, Scalar};

/// The external PDE system: per-level solution fields and a solve step.
///
/// Field arrays are indexed consistently with the mesh node numbering of the
/// corresponding level. The system is mutated only through
/// [`solve`](PdeSystem::solve); the optimization core reads the fields but
/// never writes them.
pub trait PdeSystem<T: Scalar> {
    /// The state field at the given level.
    fn state(&self, level: Level) -> DVectorView<'_, T>;

    /// The adjoint field at the given level.
    fn adjoint(&self, level: Level) -> DVectorView<'_, T>;

    /// The control field at the given level.
    fn control(&self, level: Level) -> DVectorView<'_, T>;

    /// Resolves the state and adjoint equations for the current control
    /// estimate at the given level, updating the field arrays.
    ///
    /// A failed solve leaves the fields in an unspecified state; callers must
    /// not score them. The error is propagated to the caller of the
    /// optimization step.
    fn solve(&mut self, level: Level) -> eyre::Result<()>;
}

/// Bundles one mesh per refinement level with the PDE system defined on them.
///
/// Levels are passed in explicitly at construction; there is no ambient
/// registry of meshes or systems. Level indices are validated on access, and
/// an out-of-range level is a contract violation.
#[derive(Debug)]
pub struct MultiLevelProblem<M, S> {
    meshes: Vec<M>,
    system: S,
}

impl<M, S> MultiLevelProblem<M, S> {
    /// Creates a problem from its per-level meshes (ordered coarse to fine)
    /// and the system defined on them.
    ///
    /// # Panics
    ///
    /// Panics if `meshes` is empty.
    pub fn new(meshes: Vec<M>, system: S) -> Self {
        assert!(!meshes.is_empty(), "a multi-level problem requires at least one mesh level");
        Self { meshes, system }
    }

    pub fn num_levels(&self) -> usize {
        self.meshes.len()
    }

    /// The mesh of the given level.
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of range.
    pub fn mesh(&self, level: Level) -> &M {
        assert!(
            level < self.meshes.len(),
            "level {} out of range: the problem has {} levels",
            level,
            self.meshes.len()
        );
        &self.meshes[level]
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut S {
        &mut self.system
    }
}
