//! Optimal-control iteration loop for multi-level finite element solvers.
//!
//! `optloop` drives the outer iteration of a PDE-constrained optimal-control
//! problem over a hierarchy of mesh refinement levels. The mesh and the PDE
//! system (state, adjoint and control fields together with their solve step)
//! are external collaborators, abstracted by the [`mesh::ControlMesh`] and
//! [`system::PdeSystem`] traits. This crate supplies the pieces that sit on
//! top of them:
//!
//! - quadrature-point evaluation of fields and their gradients
//!   ([`quadrature`]),
//! - classification of elements against a configured control region
//!   ([`region`]),
//! - numerically stable accumulation of cost functionals and control norms
//!   ([`functional`]),
//! - the iterate-until-converged state machine that ties the above together
//!   ([`optimization`]).

pub mod functional;
pub mod mesh;
pub mod optimization;
pub mod quadrature;
pub mod region;
pub mod system;
pub mod util;

pub use crate::mesh::Level;
