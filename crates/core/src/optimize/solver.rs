use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, IterState, Problem as ArgminProblem,
    Solver, State, TerminationReason, TerminationStatus, KV,
};
use argmin_math::{ArgminDot, ArgminScaledAdd, ArgminSub};
use std::collections::VecDeque;
use thiserror::Error;

pub type ObjectiveFn<'a> = dyn Fn(&[f64]) -> f64 + 'a;
pub type GradientFn<'a> = dyn Fn(&[f64]) -> Vec<f64> + 'a;

pub struct Problem<'a> {
    pub objective: &'a ObjectiveFn<'a>,
    pub gradient: Option<&'a GradientFn<'a>>,
    pub initial: Vec<f64>,
    pub equality_sum: f64,
    pub bounds: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub x: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum SolverError {
    #[error("feasible region is empty: bounds sum to [{lower_sum}, {upper_sum}], target {target}")]
    Infeasible {
        lower_sum: f64,
        upper_sum: f64,
        target: f64,
    },

    #[error("malformed problem: {0}")]
    Malformed(String),
}

pub trait ConstrainedSolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn minimize(&self, problem: &Problem<'_>) -> Result<Solution, SolverError>;
}

type BoxState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

const FEASIBILITY_EPS: f64 = 1e-12;
const ARMIJO_C: f64 = 1e-4;
const MIN_ALPHA: f64 = 1e-20;
const MIN_SPECTRAL_STEP: f64 = 1e-10;
const MAX_SPECTRAL_STEP: f64 = 1e10;
const FD_STEP: f64 = 1e-7;

#[derive(Debug, Clone, Copy)]
pub struct ProjectedGradient {
    pub max_iters: usize,
    pub gradient_tol: f64,
    pub memory: usize,
}

impl Default for ProjectedGradient {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            gradient_tol: 1e-9,
            memory: 10,
        }
    }
}

impl ProjectedGradient {
    pub fn with_max_iters(max_iters: usize) -> Self {
        Self {
            max_iters,
            ..Self::default()
        }
    }
}

impl ConstrainedSolver for ProjectedGradient {
    fn name(&self) -> &'static str {
        "spectral_projected_gradient"
    }

    fn minimize(&self, problem: &Problem<'_>) -> Result<Solution, SolverError> {
        validate(problem)?;

        let step = SpectralStep::new(&problem.bounds, problem.equality_sum, self);
        let max_iters = u64::try_from(self.max_iters).unwrap_or(u64::MAX);
        let result = Executor::new(Smooth { problem }, step)
            .configure(|state| state.param(problem.initial.clone()).max_iters(max_iters))
            .run()
            .map_err(|err| SolverError::Malformed(format!("{err:#}")))?;

        let state = result.state();
        let x = state
            .get_param()
            .cloned()
            .ok_or_else(|| SolverError::Malformed("solver finished without a point".into()))?;
        let converged = matches!(
            state.get_termination_status(),
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        );
        let iterations = usize::try_from(state.get_iter()).unwrap_or(usize::MAX);
        if !converged {
            tracing::debug!(iterations, status = ?state.get_termination_status(), "projected gradient stopped");
        }

        Ok(Solution {
            x,
            objective: state.get_cost(),
            iterations,
            converged,
        })
    }
}

struct Smooth<'p, 'a> {
    problem: &'p Problem<'a>,
}

impl CostFunction for Smooth<'_, '_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, ArgminError> {
        Ok((self.problem.objective)(x.as_slice()))
    }
}

impl Gradient for Smooth<'_, '_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, ArgminError> {
        Ok(match self.problem.gradient {
            Some(g) => g(x.as_slice()),
            None => finite_difference(self.problem.objective, x.as_slice()),
        })
    }
}

/// One spectral step per argmin iteration: project `x - λg` onto the feasible set, then
/// backtrack along that direction against the max of the last `memory` objective values.
struct SpectralStep<'b> {
    bounds: &'b [(f64, f64)],
    target: f64,
    gradient_tol: f64,
    memory: usize,
    grad: Vec<f64>,
    history: VecDeque<f64>,
    spectral: f64,
    converged: bool,
}

impl<'b> SpectralStep<'b> {
    fn new(bounds: &'b [(f64, f64)], target: f64, config: &ProjectedGradient) -> Self {
        Self {
            bounds,
            target,
            gradient_tol: config.gradient_tol,
            memory: config.memory.max(1),
            grad: Vec::new(),
            history: VecDeque::new(),
            spectral: 1.0,
            converged: false,
        }
    }

    fn stationarity(&self, x: &[f64]) -> f64 {
        let unit = project(&x.to_vec().scaled_add(&-1.0_f64, &self.grad), self.bounds, self.target);
        max_abs_diff(&unit, x)
    }

    fn ensure_finite(&self, f: f64) -> Result<(), ArgminError> {
        if !f.is_finite() || self.grad.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("objective or gradient is not finite");
        }
        Ok(())
    }

    fn remember(&mut self, f: f64) {
        self.history.push_back(f);
        if self.history.len() > self.memory {
            self.history.pop_front();
        }
    }
}

impl<O> Solver<O, BoxState> for SpectralStep<'_>
where
    O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
    const NAME: &'static str = "spectral projected gradient";

    fn init(
        &mut self,
        problem: &mut ArgminProblem<O>,
        state: BoxState,
    ) -> Result<(BoxState, Option<KV>), ArgminError> {
        let initial = state
            .get_param()
            .ok_or_else(|| anyhow::anyhow!("projected gradient needs an initial point"))?;
        let x = project(initial, self.bounds, self.target);
        let f = problem.cost(&x)?;
        self.grad = problem.gradient(&x)?;
        self.ensure_finite(f)?;
        self.history = VecDeque::from([f]);

        let pg = self.stationarity(&x);
        self.converged = pg <= self.gradient_tol;
        if !self.converged {
            self.spectral = (1.0 / pg).clamp(MIN_SPECTRAL_STEP, MAX_SPECTRAL_STEP);
        }
        Ok((state.param(x).cost(f), None))
    }

    fn next_iter(
        &mut self,
        problem: &mut ArgminProblem<O>,
        mut state: BoxState,
    ) -> Result<(BoxState, Option<KV>), ArgminError> {
        let f = state.get_cost();
        let x = state
            .take_param()
            .ok_or_else(|| anyhow::anyhow!("projected gradient lost its iterate"))?;

        let trial = project(&x.scaled_add(&-self.spectral, &self.grad), self.bounds, self.target);
        let d = trial.sub(&x);
        let slope: f64 = self.grad.dot(&d);
        let f_ref = self.history.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut alpha = 1.0_f64;
        let (next, f_next) = loop {
            let candidate = x.scaled_add(&alpha, &d);
            let fc = problem.cost(&candidate)?;
            if fc <= f_ref + ARMIJO_C * alpha * slope {
                break (candidate, fc);
            }
            alpha *= 0.5;
            if alpha < MIN_ALPHA {
                // No representable step decreases f: stationary to working precision.
                tracing::debug!(iter = state.get_iter(), objective = f, "line search exhausted");
                self.converged = true;
                return Ok((state.param(x).cost(f), None));
            }
        };

        let g_next = problem.gradient(&next)?;
        let s = next.sub(&x);
        let y = g_next.sub(&self.grad);
        let sts: f64 = s.dot(&s);
        let sty: f64 = s.dot(&y);

        self.grad = g_next;
        self.ensure_finite(f_next)?;
        self.remember(f_next);

        self.spectral = if sty <= 0.0 {
            MAX_SPECTRAL_STEP
        } else {
            (sts / sty).clamp(MIN_SPECTRAL_STEP, MAX_SPECTRAL_STEP)
        };
        self.converged = sts == 0.0 || self.stationarity(&next) <= self.gradient_tol;

        Ok((state.param(next).cost(f_next), None))
    }

    fn terminate(&mut self, _state: &BoxState) -> TerminationStatus {
        if self.converged {
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        } else {
            TerminationStatus::NotTerminated
        }
    }
}

fn validate(problem: &Problem<'_>) -> Result<(), SolverError> {
    let n = problem.initial.len();
    if n == 0 {
        return Err(SolverError::Malformed("problem has no variables".into()));
    }
    if problem.bounds.len() != n {
        return Err(SolverError::Malformed(format!(
            "{} bounds for {n} variables",
            problem.bounds.len()
        )));
    }
    if let Some((i, _)) = problem
        .bounds
        .iter()
        .enumerate()
        .find(|(_, (lo, hi))| !(lo.is_finite() && hi.is_finite() && lo <= hi))
    {
        return Err(SolverError::Malformed(format!("bounds for variable {i} are invalid")));
    }
    if problem.initial.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::Malformed("initial point is not finite".into()));
    }

    let lower_sum: f64 = problem.bounds.iter().map(|b| b.0).sum();
    let upper_sum: f64 = problem.bounds.iter().map(|b| b.1).sum();
    let target = problem.equality_sum;
    if lower_sum > target + FEASIBILITY_EPS || upper_sum < target - FEASIBILITY_EPS {
        return Err(SolverError::Infeasible {
            lower_sum,
            upper_sum,
            target,
        });
    }
    Ok(())
}

/// Euclidean projection onto `{x : sum(x) = target, lo_i <= x_i <= hi_i}`: `clip(y - tau)`
/// with `tau` found by bisection. The set must be non-empty.
pub fn project(y: &[f64], bounds: &[(f64, f64)], target: f64) -> Vec<f64> {
    let shifted_sum = |tau: f64| -> f64 {
        y.iter()
            .zip(bounds)
            .map(|(&v, &(lo, hi))| (v - tau).clamp(lo, hi))
            .sum()
    };

    let mut lo_tau = y
        .iter()
        .zip(bounds)
        .map(|(&v, &(_, hi))| v - hi)
        .fold(f64::INFINITY, f64::min);
    let mut hi_tau = y
        .iter()
        .zip(bounds)
        .map(|(&v, &(lo, _))| v - lo)
        .fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..200 {
        let mid = 0.5 * (lo_tau + hi_tau);
        if mid <= lo_tau || mid >= hi_tau {
            break;
        }
        if shifted_sum(mid) > target {
            lo_tau = mid;
        } else {
            hi_tau = mid;
        }
    }

    let tau = 0.5 * (lo_tau + hi_tau);
    y.iter()
        .zip(bounds)
        .map(|(&v, &(lo, hi))| (v - tau).clamp(lo, hi))
        .collect()
}

fn finite_difference(objective: &ObjectiveFn<'_>, x: &[f64]) -> Vec<f64> {
    let mut probe = x.to_vec();
    (0..x.len())
        .map(|i| {
            let h = FD_STEP * x[i].abs().max(1.0);
            probe[i] = x[i] + h;
            let up = objective(&probe);
            probe[i] = x[i] - h;
            let down = objective(&probe);
            probe[i] = x[i];
            (up - down) / (2.0 * h)
        })
        .collect()
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(x: &[f64]) -> f64 {
        x.iter().sum()
    }

    #[test]
    fn projection_restores_sum_and_bounds() {
        let bounds = vec![(0.05, 0.5); 4];
        let p = project(&[2.0, -1.0, 0.3, 0.3], &bounds, 1.0);
        assert!((sum(&p) - 1.0).abs() < 1e-12);
        assert!(p.iter().all(|&v| (0.05..=0.5).contains(&v)));
        assert_eq!(p[0], 0.5);
        assert_eq!(p[1], 0.05);
        assert!((p[2] - 0.225).abs() < 1e-12);
    }

    #[test]
    fn projection_keeps_feasible_points() {
        let bounds = vec![(0.0, 1.0); 3];
        let y = [0.2, 0.3, 0.5];
        let p = project(&y, &bounds, 1.0);
        for (a, b) in p.iter().zip(y) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn minimizes_separable_quadratic_with_numeric_gradient() {
        // min (x0-0.7)^2 + (x1-0.1)^2 + (x2-0.2)^2  s.t. sum = 1, 0 <= x <= 0.6
        let objective = |x: &[f64]| {
            (x[0] - 0.7).powi(2) + (x[1] - 0.1).powi(2) + (x[2] - 0.2).powi(2)
        };
        let problem = Problem {
            objective: &objective,
            gradient: None,
            initial: vec![1.0 / 3.0; 3],
            equality_sum: 1.0,
            bounds: vec![(0.0, 0.6); 3],
        };

        let sol = ProjectedGradient::default().minimize(&problem).unwrap();
        assert!(sol.converged);
        // x0 caps at 0.6, the remaining 0.4 splits with equal shift: x1 = 0.15, x2 = 0.25.
        assert!((sol.x[0] - 0.6).abs() < 1e-6, "{:?}", sol.x);
        assert!((sol.x[1] - 0.15).abs() < 1e-6, "{:?}", sol.x);
        assert!((sol.x[2] - 0.25).abs() < 1e-6, "{:?}", sol.x);
    }

    #[test]
    fn detects_empty_feasible_region() {
        let objective = |x: &[f64]| x[0] * x[0];
        let problem = Problem {
            objective: &objective,
            gradient: None,
            initial: vec![1.0],
            equality_sum: 1.0,
            bounds: vec![(0.05, 0.2)],
        };
        let err = ProjectedGradient::default().minimize(&problem).unwrap_err();
        assert!(matches!(err, SolverError::Infeasible { .. }));
    }

    #[test]
    fn rejects_mismatched_bounds() {
        let objective = |_: &[f64]| 0.0;
        let problem = Problem {
            objective: &objective,
            gradient: None,
            initial: vec![0.5, 0.5],
            equality_sum: 1.0,
            bounds: vec![(0.0, 1.0)],
        };
        assert!(matches!(
            ProjectedGradient::default().minimize(&problem),
            Err(SolverError::Malformed(_))
        ));
    }

    #[test]
    fn stationary_start_converges_without_iterating() {
        let objective = |_: &[f64]| 1.0;
        let gradient = |x: &[f64]| vec![0.0; x.len()];
        let problem = Problem {
            objective: &objective,
            gradient: Some(&gradient),
            initial: vec![0.25; 4],
            equality_sum: 1.0,
            bounds: vec![(0.05, 0.5); 4],
        };
        let sol = ProjectedGradient::default().minimize(&problem).unwrap();
        assert!(sol.converged);
        assert_eq!(sol.iterations, 0);
        assert_eq!(sol.x, vec![0.25; 4]);
    }

    #[test]
    fn non_finite_objective_is_malformed() {
        let objective = |x: &[f64]| x[0].ln();
        let problem = Problem {
            objective: &objective,
            gradient: None,
            // projects to [0, 1], where ln(0) is -inf
            initial: vec![-0.5, 1.5],
            equality_sum: 1.0,
            bounds: vec![(-1.0, 1.0); 2],
        };
        assert!(matches!(
            ProjectedGradient::default().minimize(&problem),
            Err(SolverError::Malformed(_))
        ));
    }

    #[test]
    fn reports_non_convergence_at_iteration_cap() {
        let objective = |x: &[f64]| 3.0 * x[0] * x[0] + x[1] * x[1];
        let problem = Problem {
            objective: &objective,
            gradient: None,
            initial: vec![0.5, 0.5],
            equality_sum: 1.0,
            bounds: vec![(0.0, 1.0); 2],
        };
        let sol = ProjectedGradient::with_max_iters(0).minimize(&problem).unwrap();
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 0);
    }
}
