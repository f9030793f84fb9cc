use crate::domain::allocation::Allocation;
use crate::domain::instruments::{InstrumentSet, RiskScore};
use crate::domain::policy::select_policy;
use crate::error::EngineError;
use crate::market::returns::{ReturnSeries, TRADING_DAYS_PER_YEAR};
use crate::optimize::solver::{ConstrainedSolver, Problem, ProjectedGradient, SolverError};
use ndarray::{Array1, Array2};
use std::sync::Arc;

pub const SUM_TOLERANCE: f64 = 1e-6;
pub const BOUND_TOLERANCE: f64 = 1e-9;

#[derive(Clone)]
pub struct AllocationOptimizer {
    solver: Arc<dyn ConstrainedSolver>,
}

impl Default for AllocationOptimizer {
    fn default() -> Self {
        Self::new(Arc::new(ProjectedGradient::default()))
    }
}

impl std::fmt::Debug for AllocationOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationOptimizer")
            .field("solver", &self.solver.name())
            .finish()
    }
}

impl AllocationOptimizer {
    pub fn new(solver: Arc<dyn ConstrainedSolver>) -> Self {
        Self { solver }
    }

    pub fn recommend(
        &self,
        instruments: &InstrumentSet,
        returns: &ReturnSeries,
        score: RiskScore,
    ) -> Result<Allocation, EngineError> {
        if returns.instruments() != instruments {
            return Err(EngineError::invalid_input(
                "return series columns do not match the requested instruments",
            ));
        }

        let n = instruments.len();
        let policy = select_policy(score);
        if !policy.is_feasible_for(n) {
            return Err(EngineError::Infeasible {
                n,
                lower: policy.lower,
                upper: policy.upper,
            });
        }

        let cov = returns.annualized_covariance();
        let objective = |w: &[f64]| portfolio_volatility(&cov, w);
        let gradient = |w: &[f64]| volatility_gradient(&cov, w);

        let problem = Problem {
            objective: &objective,
            gradient: Some(&gradient),
            initial: vec![1.0 / n as f64; n],
            equality_sum: 1.0,
            bounds: policy.bounds(n),
        };

        let solution = self.solver.minimize(&problem).map_err(|err| match err {
            SolverError::Infeasible { .. } => EngineError::Infeasible {
                n,
                lower: policy.lower,
                upper: policy.upper,
            },
            SolverError::Malformed(msg) => EngineError::invalid_input(msg),
        })?;

        if !solution.converged {
            tracing::warn!(
                solver = self.solver.name(),
                iterations = solution.iterations,
                "allocation solver hit its iteration cap"
            );
            return Err(EngineError::NotConverged {
                iterations: solution.iterations,
            });
        }

        let weights = solution.x;
        let sum: f64 = weights.iter().sum();
        let in_bounds = weights.iter().all(|&w| {
            w >= policy.lower - BOUND_TOLERANCE && w <= policy.upper + BOUND_TOLERANCE
        });
        if (sum - 1.0).abs() > SUM_TOLERANCE || !in_bounds {
            tracing::error!(sum, ?weights, "solver returned a point outside the feasible region");
            return Err(EngineError::NotConverged {
                iterations: solution.iterations,
            });
        }

        let mean = returns.mean();
        let expected_return = Array1::from_vec(weights.clone()).dot(&mean) * TRADING_DAYS_PER_YEAR;

        tracing::info!(
            solver = self.solver.name(),
            tier = policy.tier.number(),
            instruments = n,
            iterations = solution.iterations,
            volatility = solution.objective,
            "optimized allocation"
        );

        Ok(Allocation {
            instruments: instruments.clone(),
            weights,
            policy,
            volatility: solution.objective,
            expected_return,
            iterations: solution.iterations,
        })
    }
}

pub fn portfolio_volatility(cov: &Array2<f64>, w: &[f64]) -> f64 {
    let w = Array1::from_vec(w.to_vec());
    w.dot(&cov.dot(&w)).max(0.0).sqrt()
}

fn volatility_gradient(cov: &Array2<f64>, w: &[f64]) -> Vec<f64> {
    let w = Array1::from_vec(w.to_vec());
    let sigma_w = cov.dot(&w);
    let sigma = w.dot(&sigma_w).max(0.0).sqrt();
    if sigma <= f64::EPSILON {
        return vec![0.0; w.len()];
    }
    (sigma_w / sigma).to_vec()
}
