//! The single solve entry point shared by every algorithm family.
//!
//! A caller builds a problem, optionally a basis of candidate functions,
//! picks an algorithm, and calls [`solve`]. The entry point fills missing
//! derivatives via collocation, evaluates the basis into a design matrix,
//! applies the configured pre-processing, dispatches to the selected
//! solver, and wraps the output in a [`DataDrivenSolution`], so callers
//! cannot distinguish result families at the API boundary.

use faer::Mat;

use crate::basis::{Basis, Expression, Variable};
use crate::collocation::CollocationMethod;
use crate::koopman::{koopman_operator, KoopmanOptions};
use crate::problem::{DataDrivenDataset, DataDrivenProblem, ProblemKind, RegressionData};
use crate::solution::{DataDrivenSolution, RawResult};
use crate::sparse::{
    implicit_regression, residual_sum_of_squares, sparse_regression, SparseOptimizer,
};
use crate::types::{DataDrivenError, Result, SolverOptions};
use crate::utils::{denoise_matrix, round_sig};

/// Algorithm selection, dispatched as a tagged variant: the spectral
/// family or the sparse-regression family. Each satisfies the same fit
/// contract over (problem, basis, options).
#[derive(Debug, Clone)]
pub enum Algorithm {
    /// Spectral operator identification (rank-truncated decomposition).
    Koopman(KoopmanOptions),
    /// Iterative thresholded sparse regression.
    Sparse(SparseOptimizer),
}

impl Algorithm {
    /// Spectral solver with automatic rank selection.
    pub fn dmd() -> Self {
        Algorithm::Koopman(KoopmanOptions::default())
    }

    /// Sequential thresholded least squares with the given threshold.
    pub fn stlsq(threshold: f64) -> Self {
        Algorithm::Sparse(SparseOptimizer::stlsq(threshold))
    }

    /// Identifier used on solutions.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Koopman(_) => "DMD",
            Algorithm::Sparse(opt) => opt.name(),
        }
    }
}

/// Solve a single problem.
///
/// Without a basis, the identity basis over the problem's states is used,
/// which makes the spectral path plain operator identification and the
/// regression path a linear fit.
pub fn solve(
    problem: &DataDrivenProblem,
    basis: Option<&Basis>,
    algorithm: &Algorithm,
    options: &SolverOptions,
) -> Result<DataDrivenSolution> {
    let resolved = if problem.needs_collocation() {
        problem.collocate(&CollocationMethod::default())?
    } else {
        problem.clone()
    };

    let reg = resolved.regression_data()?;
    let basis = match basis {
        Some(b) => b.clone(),
        None => Basis::identity(resolved.n_states()),
    };

    let (coefficients, raw, rss, dof) =
        fit(&reg, &basis, resolved.p(), resolved.kind(), algorithm, options)?;

    let solution = DataDrivenSolution::new(
        basis,
        coefficients,
        algorithm.name(),
        raw,
        resolved,
        rss,
        dof,
    )?;
    Ok(finish(solution, options))
}

/// Solve a dataset of problems jointly over their pooled samples.
///
/// The first member problem serves as the representative back-reference
/// on the solution; residual statistics reflect the pooled target.
pub fn solve_dataset(
    dataset: &DataDrivenDataset,
    basis: Option<&Basis>,
    algorithm: &Algorithm,
    options: &SolverOptions,
) -> Result<DataDrivenSolution> {
    let reg = dataset.pooled()?;
    let representative = dataset.problems()[0].clone();
    let basis = match basis {
        Some(b) => b.clone(),
        None => Basis::identity(representative.n_states()),
    };

    let (coefficients, raw, rss, dof) = fit(
        &reg,
        &basis,
        representative.p(),
        dataset.kind(),
        algorithm,
        options,
    )?;

    let solution = DataDrivenSolution::from_parts(
        basis,
        coefficients,
        algorithm.name(),
        raw,
        representative,
        &reg.target,
        rss,
        dof,
    );
    Ok(finish(solution, options))
}

fn finish(solution: DataDrivenSolution, options: &SolverOptions) -> DataDrivenSolution {
    let solution = if options.eval_expression {
        solution.with_rendered_equations()
    } else {
        solution
    };
    if options.verbose {
        eprintln!(
            "solve ({}) finished: rss {:.6e}, dof {}, {}",
            solution.get_algorithm(),
            solution.rss(),
            solution.dof(),
            solution.retcode()
        );
    }
    solution
}

/// Shared fit core over an extracted regression pair.
fn fit(
    reg: &RegressionData,
    basis: &Basis,
    p: &[f64],
    kind: ProblemKind,
    algorithm: &Algorithm,
    options: &SolverOptions,
) -> Result<(Mat<f64>, RawResult, f64, usize)> {
    match algorithm {
        Algorithm::Sparse(optimizer) => fit_sparse(reg, basis, p, optimizer, options),
        Algorithm::Koopman(kopts) => fit_koopman(reg, basis, p, kind, kopts, options),
    }
}

fn fit_sparse(
    reg: &RegressionData,
    basis: &Basis,
    p: &[f64],
    optimizer: &SparseOptimizer,
    options: &SolverOptions,
) -> Result<(Mat<f64>, RawResult, f64, usize)> {
    let implicit_fit = basis.has_implicits();
    match (implicit_fit, optimizer) {
        (true, SparseOptimizer::Implicit { .. }) | (false, _) => {}
        (true, _) => {
            return Err(DataDrivenError::Configuration(
                "a basis with implicit variables requires the implicit optimizer".into(),
            ))
        }
    }

    let theta = if implicit_fit {
        basis.evaluate_implicit(
            &reg.states,
            &reg.target,
            p,
            reg.times.as_deref(),
            reg.inputs.as_ref(),
        )?
    } else {
        basis.evaluate_controlled(&reg.states, p, reg.times.as_deref(), reg.inputs.as_ref())?
    };

    // Fit on the leading training fraction, report residuals on everything.
    let m = theta.ncols();
    let train = options.data_processing.train_len(m);
    let theta_train = theta.subcols(0, train).to_owned();
    let target_train = reg.target.subcols(0, train).to_owned();

    let result = if implicit_fit {
        implicit_regression(
            &theta_train,
            &basis.implicit_usage(),
            basis.n_implicits(),
            optimizer,
            options,
        )?
    } else {
        sparse_regression(&theta_train, &target_train, optimizer, options)?
    };

    let mut xi = result.coefficients.clone();
    for j in 0..xi.ncols() {
        for i in 0..xi.nrows() {
            xi[(i, j)] = round_sig(xi[(i, j)], options.digits);
        }
    }

    let rss = if implicit_fit {
        let zero = Mat::<f64>::zeros(xi.ncols(), m);
        residual_sum_of_squares(&theta, &zero, &xi)
    } else {
        residual_sum_of_squares(&theta, &reg.target, &xi)
    };
    let dof = count_nonzero(&xi);

    Ok((xi, RawResult::Sparse(result), rss, dof))
}

fn fit_koopman(
    reg: &RegressionData,
    basis: &Basis,
    p: &[f64],
    kind: ProblemKind,
    kopts: &KoopmanOptions,
    options: &SolverOptions,
) -> Result<(Mat<f64>, RawResult, f64, usize)> {
    if basis.has_implicits() {
        return Err(DataDrivenError::Configuration(
            "the spectral solver does not support implicit variables".into(),
        ));
    }
    let continuous = kind == ProblemKind::Continuous;
    if continuous && !is_state_basis(basis) {
        return Err(DataDrivenError::Configuration(
            "lifting a derivative pair requires the chain rule; extended lifting is \
             supported for discrete (shift) problems only"
                .into(),
        ));
    }

    // Lift both snapshot sides through the basis.
    let z = basis.evaluate_controlled(&reg.states, p, reg.times.as_deref(), reg.inputs.as_ref())?;
    let z_prime = if continuous {
        reg.target.clone()
    } else {
        basis.evaluate_controlled(&reg.target, p, reg.times.as_deref(), reg.inputs.as_ref())?
    };

    let (z, z_prime) = if options.denoise {
        (denoise_matrix(&z)?, denoise_matrix(&z_prime)?)
    } else {
        (z, z_prime)
    };

    let dt = match &reg.times {
        Some(t) if t.len() > 1 => t[1] - t[0],
        _ => 1.0,
    };

    let result = koopman_operator(&z, &z_prime, continuous, dt, kopts)?;

    // Project the operator onto the observable rows so the coefficient
    // matrix predicts the raw states, like the regression path.
    let observables: Vec<usize> = basis
        .observables()
        .into_iter()
        .collect::<Option<Vec<usize>>>()
        .ok_or_else(|| {
            DataDrivenError::Configuration(
                "spectral identification requires every state variable among the candidates"
                    .into(),
            )
        })?;

    let k = basis.len();
    let d = observables.len();
    let mut xi = Mat::<f64>::zeros(k, d);
    for (r, &row) in observables.iter().enumerate() {
        for i in 0..k {
            xi[(i, r)] = round_sig(result.operator[(row, i)], options.digits);
        }
    }

    let rss = residual_sum_of_squares(&z, &reg.target, &xi);
    let dof = count_nonzero(&xi);

    Ok((xi, RawResult::Koopman(result), rss, dof))
}

/// True when every candidate is a plain state variable.
fn is_state_basis(basis: &Basis) -> bool {
    basis
        .equations()
        .iter()
        .all(|eq| matches!(eq, Expression::Var(Variable::State(_))))
}

fn count_nonzero(xi: &Mat<f64>) -> usize {
    let mut n = 0;
    for j in 0..xi.ncols() {
        for i in 0..xi.nrows() {
            if xi[(i, j)] != 0.0 {
                n += 1;
            }
        }
    }
    n
}
