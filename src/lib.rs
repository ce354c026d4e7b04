//! # datadriven-dynamics
//!
//! Discovery of governing equations from measurement data.
//!
//! The methods in this crate take in state trajectories (and optionally
//! control inputs, derivatives, or known parameters) and return the model
//! that generated the data, without requiring the model structure up
//! front:
//!
//! - **Candidate libraries** ([`Basis`], [`generators`]): monomial,
//!   polynomial, trigonometric, Fourier, and Chebyshev candidate functions
//!   over declared state/control/parameter variables
//! - **Problems** ([`DataDrivenProblem`], [`DataDrivenDataset`]): direct,
//!   discrete, and continuous estimation problems, pooled across
//!   experiments
//! - **Collocation** ([`collocate_data`]): derivative estimation via
//!   analytic differentiation of interpolants or locally weighted kernel
//!   smoothing
//! - **Sparse regression** ([`SparseOptimizer`]): sequential thresholded
//!   least squares with hard, proximal, and implicit (null-space)
//!   thresholding rules
//! - **Spectral identification** ([`koopman_operator`]): rank-truncated
//!   operator approximation from snapshot pairs, with basis lifting for
//!   discrete problems
//! - **Solutions** ([`DataDrivenSolution`]): one queryable result shape
//!   for every algorithm family, with fit statistics where the fit is a
//!   regression
//!
//! ## Quick Start
//!
//! ```rust
//! use datadriven_dynamics::{solve, Algorithm, DataDrivenProblem, SolverOptions};
//!
//! // Two states following dx = A x, with exact derivatives
//! let a = [[-0.1, 2.0], [-2.0, -0.1]];
//! let n = 50;
//! let mut x = faer::Mat::<f64>::zeros(2, n);
//! let mut dx = faer::Mat::<f64>::zeros(2, n);
//! for j in 0..n {
//!     let t = j as f64 * 0.1;
//!     x[(0, j)] = (0.1 * t).cos();
//!     x[(1, j)] = (0.1 * t).sin();
//!     for i in 0..2 {
//!         dx[(i, j)] = a[i][0] * x[(0, j)] + a[i][1] * x[(1, j)];
//!     }
//! }
//!
//! let problem = DataDrivenProblem::continuous(x, dx).unwrap();
//! let solution = solve(
//!     &problem,
//!     None,
//!     &Algorithm::stlsq(0.01),
//!     &SolverOptions::default(),
//! )
//! .unwrap();
//! assert!(solution.is_converged());
//! ```
//!
//! ## References
//!
//! - Brunton, Proctor & Kutz (2016), *PNAS*, 113(15): sparse
//!   identification of nonlinear dynamics
//! - Schmid (2010), *J. Fluid Mech.*, 656, 5-28: dynamic mode
//!   decomposition
//! - Williams, Kevrekidis & Rowley (2015), *J. Nonlin. Sci.*, 25:
//!   extended dynamic mode decomposition
//! - Gavish & Donoho (2014), *IEEE Trans. Inf. Theory*, 60(8): optimal
//!   hard threshold for singular values

pub mod basis;
pub mod collocation;
pub mod generators;
pub mod koopman;
pub mod problem;
pub mod solution;
pub mod solve;
pub mod sparse;
pub mod types;
pub mod utils;

pub use basis::{Basis, BasisOptions, BasisSignature, Expression, Variable};
pub use collocation::{
    collocate_data, CollocationKernel, CollocationMethod, InterpolationMethod,
};
pub use generators::{
    chebyshev_basis, cos_basis, fourier_basis, monomial_basis, polynomial_basis, sin_basis,
    state_variables, CoefficientSet,
};
pub use koopman::{koopman_operator, KoopmanOptions, KoopmanResult};
pub use problem::{
    from_trajectory, DataDrivenDataset, DataDrivenProblem, ProblemKind, RegressionData,
    TrajectorySolution,
};
pub use solution::{DataDrivenSolution, RawResult, ResidualSummary};
pub use solve::{solve, solve_dataset, Algorithm};
pub use sparse::{
    implicit_regression, sparse_regression, SparseOptimizer, SparseResult, Threshold,
};
pub use types::{
    DataDrivenError, DataNormalization, DataProcessing, Result, ReturnCode, SolverOptions,
};
