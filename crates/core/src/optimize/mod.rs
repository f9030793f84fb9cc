pub mod engine;
pub mod solver;

pub use engine::AllocationOptimizer;
pub use solver::{ConstrainedSolver, Problem, ProjectedGradient, Solution, SolverError};
