//! The outer optimization loop: a state machine driving solve, classify and
//! score steps until convergence, iteration exhaustion or divergence.
use crate::functional::{compute_integral, compute_norm_control, CostIntegrand, RegularizationOrder};
use crate::mesh::{ControlMesh, Level};
use crate::region::{ControlFlags, ControlRegion, ElementClassifier};
use crate::system::{MultiLevelProblem, PdeSystem};
use eyre::{ensure, eyre, WrapErr};
use log::{debug, info};
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, RealField};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration of the optimization loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSettings<T> {
    /// Which derivative terms enter the control penalty norm.
    pub regularization_order: RegularizationOrder,
    /// Non-negative weight of the control penalty in the objective.
    pub regularization_weight: T,
    /// Positive tolerance on the change of the objective between iterations.
    pub tolerance: T,
    /// Positive bound on the number of iterations.
    pub max_iterations: usize,
    /// Objective magnitude above which the iteration is declared diverged;
    /// `None` disables the blow-up check (non-finite objectives are always
    /// treated as divergence).
    pub divergence_threshold: Option<T>,
}

impl<T: RealField> OptimizationSettings<T> {
    pub fn validate(&self) -> eyre::Result<()> {
        ensure!(
            self.regularization_weight >= T::zero(),
            "regularization weight must be non-negative"
        );
        ensure!(self.tolerance > T::zero(), "convergence tolerance must be positive");
        ensure!(self.max_iterations > 0, "maximum iteration count must be positive");
        if let Some(threshold) = &self.divergence_threshold {
            ensure!(*threshold > T::zero(), "divergence threshold must be positive");
        }
        Ok(())
    }
}

/// The distinct terminal outcomes of the loop.
///
/// Callers need to tell success from failure, so these are never collapsed
/// into a single "stopped" signal: `MaxIterReached` is a normal,
/// non-exceptional outcome distinct from `Converged`, and `Diverged` is
/// reported as a state rather than an error so that the caller can decide on
/// remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalState {
    /// The change in the objective fell below the configured tolerance.
    Converged,
    /// The iteration bound was reached without convergence.
    MaxIterReached,
    /// The objective became non-finite or exceeded the blow-up threshold.
    Diverged,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalState::Converged => write!(f, "converged"),
            TerminalState::MaxIterReached => write!(f, "maximum iterations reached"),
            TerminalState::Diverged => write!(f, "diverged"),
        }
    }
}

/// Per-iteration report for reporting/checkpointing collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport<T> {
    /// Zero-based index of the iteration this report describes.
    pub iteration: usize,
    /// Value of the cost integral for this iterate.
    pub cost: T,
    /// Control norm of this iterate, restricted to the control region.
    pub control_norm: T,
    /// Combined objective: cost plus the weighted control penalty.
    pub objective: T,
    /// The terminal state entered by this step, if any.
    pub terminal: Option<TerminalState>,
}

/// Summary returned by [`run_to_completion`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome<T> {
    pub iterations: usize,
    pub final_objective: T,
    pub terminal: TerminalState,
}

/// The stepping capability of an iterative process.
///
/// The optimization loop implements this; generic drivers such as
/// [`run_to_completion`] only talk to the trait, so the loop composes with
/// the generic iterate-until-converged machinery instead of inheriting from
/// it.
pub trait IterationDriver<T> {
    /// Advances the process by one iteration.
    ///
    /// A step is atomic: it either completes fully and is scored, or it
    /// fails, in which case the iteration is abandoned and the error
    /// surfaced without scoring stale data.
    ///
    /// # Panics
    ///
    /// Panics if called after the driver reached a terminal state.
    fn step(&mut self) -> eyre::Result<StepReport<T>>;

    /// Whether a terminal state has been reached.
    fn is_done(&self) -> bool;

    /// The terminal state, once one has been reached.
    fn terminal_state(&self) -> Option<TerminalState>;
}

/// Runs a driver until it reaches a terminal state and summarizes the run.
pub fn run_to_completion<T, L>(driver: &mut L) -> eyre::Result<LoopOutcome<T>>
where
    T: RealField,
    L: IterationDriver<T>,
{
    let mut last = None;
    while !driver.is_done() {
        last = Some(driver.step()?);
    }
    let report = last.ok_or_else(|| eyre!("iteration driver was already terminated before the first step"))?;
    let terminal = report
        .terminal
        .ok_or_else(|| eyre!("iteration driver stopped without reporting a terminal state"))?;
    info!(
        "optimization loop finished after {} iteration(s): {} (objective {:?})",
        report.iteration + 1,
        terminal,
        report.objective
    );
    Ok(LoopOutcome {
        iterations: report.iteration + 1,
        final_objective: report.objective,
        terminal,
    })
}

/// Iteration bookkeeping owned exclusively by the loop.
#[derive(Debug, Clone)]
struct IterationState<T> {
    iteration: usize,
    previous_objective: Option<T>,
    converged: bool,
}

impl<T> IterationState<T> {
    fn new() -> Self {
        Self {
            iteration: 0,
            previous_objective: None,
            converged: false,
        }
    }
}

/// The optimization loop over one level of a multi-level problem.
///
/// Each step performs, in order: the external PDE solve for the current
/// control estimate, a control-region flag refresh if the mesh geometry
/// changed, the cost integral, the control norm, the combined objective and
/// the convergence/divergence/iteration-bound checks.
pub struct OptimizationLoop<'a, T, D, M, S, F>
where
    T: RealField,
    D: DimName,
    M: ControlMesh<T, D>,
    S: PdeSystem<T>,
    DefaultAllocator: Allocator<T, D>,
{
    problem: &'a mut MultiLevelProblem<M, S>,
    level: Level,
    classifier: ElementClassifier<T, D>,
    integrand: F,
    settings: OptimizationSettings<T>,
    flags: Option<ControlFlags>,
    state: IterationState<T>,
    terminal: Option<TerminalState>,
}

impl<'a, T, D, M, S, F> OptimizationLoop<'a, T, D, M, S, F>
where
    T: RealField + Send + Sync,
    D: DimName,
    M: ControlMesh<T, D> + Sync,
    S: PdeSystem<T>,
    F: CostIntegrand<T>,
    DefaultAllocator: Allocator<T, D>,
{
    /// Creates a loop over the given level of the problem.
    ///
    /// Returns an error if the settings are invalid.
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of range for the problem.
    pub fn new(
        problem: &'a mut MultiLevelProblem<M, S>,
        level: Level,
        region: ControlRegion<T, D>,
        integrand: F,
        settings: OptimizationSettings<T>,
    ) -> eyre::Result<Self> {
        settings.validate().wrap_err("invalid optimization settings")?;
        assert!(
            level < problem.num_levels(),
            "level {} out of range: the problem has {} levels",
            level,
            problem.num_levels()
        );
        Ok(Self {
            problem,
            level,
            classifier: ElementClassifier::new(region),
            integrand,
            settings,
            flags: None,
            state: IterationState::new(),
            terminal: None,
        })
    }

    /// The number of completed iterations.
    pub fn iterations(&self) -> usize {
        self.state.iteration
    }

    /// Whether the loop has converged.
    pub fn converged(&self) -> bool {
        self.state.converged
    }

    /// The control-region flags of the current mesh geometry, once the first
    /// step has computed them.
    ///
    /// External assembly that restricts control-dependent terms to the
    /// control region must consume this exact mask rather than reclassify
    /// independently; a mask that disagrees with the one used by the norm
    /// computation silently biases the cost functional.
    pub fn flags(&self) -> Option<&ControlFlags> {
        self.flags.as_ref()
    }

    pub fn settings(&self) -> &OptimizationSettings<T> {
        &self.settings
    }

    /// Combined objective: $J = \text{cost} + \frac{w}{2} \|c\|^2$.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn combined_objective(cost: T, control_norm: T, settings: &OptimizationSettings<T>) -> T {
        cost + 0.5 * settings.regularization_weight.clone() * control_norm.clone() * control_norm
    }

    /// Classifies the objective of a completed iteration, in the order:
    /// divergence, convergence, iteration bound.
    fn classify_step(
        objective: &T,
        previous: Option<&T>,
        settings: &OptimizationSettings<T>,
        completed_iterations: usize,
    ) -> Option<TerminalState> {
        if !objective.is_finite() {
            return Some(TerminalState::Diverged);
        }
        if let Some(threshold) = &settings.divergence_threshold {
            if objective.clone().abs() > *threshold {
                return Some(TerminalState::Diverged);
            }
        }
        if let Some(previous) = previous {
            let delta = (objective.clone() - previous.clone()).abs();
            // Covers both the absolute and the relative criterion.
            let scale = T::one().max(previous.clone().abs());
            if delta <= settings.tolerance.clone() * scale {
                return Some(TerminalState::Converged);
            }
        }
        if completed_iterations >= settings.max_iterations {
            return Some(TerminalState::MaxIterReached);
        }
        None
    }
}

impl<'a, T, D, M, S, F> IterationDriver<T> for OptimizationLoop<'a, T, D, M, S, F>
where
    T: RealField + Send + Sync,
    D: DimName,
    M: ControlMesh<T, D> + Sync,
    S: PdeSystem<T>,
    F: CostIntegrand<T>,
    DefaultAllocator: Allocator<T, D>,
{
    fn step(&mut self) -> eyre::Result<StepReport<T>> {
        assert!(
            self.terminal.is_none(),
            "step() called on a terminated optimization loop"
        );
        let level = self.level;
        let iteration = self.state.iteration;

        // The solve must complete before the iterate can be scored; on
        // failure the iteration is abandoned un-scored.
        self.problem
            .system_mut()
            .solve(level)
            .wrap_err_with(|| format!("PDE solve failed at level {level} in iteration {iteration}"))?;

        let Self {
            problem,
            classifier,
            integrand,
            settings,
            flags,
            state,
            terminal,
            ..
        } = self;
        let mesh = problem.mesh(level);
        let flags = classifier.refreshed_flags(mesh, flags);
        let system = problem.system();

        let cost = compute_integral(
            mesh,
            system.state(level),
            system.adjoint(level),
            system.control(level),
            integrand,
        )?;
        let control_norm = compute_norm_control(mesh, system.control(level), flags, settings.regularization_order)?;
        let objective = Self::combined_objective(cost.clone(), control_norm.clone(), settings);

        state.iteration += 1;
        let step_terminal = Self::classify_step(
            &objective,
            state.previous_objective.as_ref(),
            settings,
            state.iteration,
        );
        state.previous_objective = Some(objective.clone());
        if step_terminal == Some(TerminalState::Converged) {
            state.converged = true;
        }
        *terminal = step_terminal;

        debug!(
            "iteration {}: cost = {:?}, control norm = {:?}, objective = {:?}",
            iteration, cost, control_norm, objective
        );
        Ok(StepReport {
            iteration,
            cost,
            control_norm,
            objective,
            terminal: step_terminal,
        })
    }

    fn is_done(&self) -> bool {
        self.terminal.is_some()
    }

    fn terminal_state(&self) -> Option<TerminalState> {
        self.terminal
    }
}
