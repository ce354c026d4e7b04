use faer::Mat;

use crate::basis::Basis;
use crate::koopman::KoopmanResult;
use crate::problem::{DataDrivenProblem, ProblemKind};
use crate::sparse::SparseResult;
use crate::types::{DataDrivenError, Result, ReturnCode};

/// Raw solver output, tagged by family.
#[derive(Debug, Clone)]
pub enum RawResult {
    Sparse(SparseResult),
    Koopman(KoopmanResult),
}

impl RawResult {
    /// Termination status reported by the solver itself.
    pub fn retcode(&self) -> ReturnCode {
        match self {
            RawResult::Sparse(r) => r.retcode,
            RawResult::Koopman(_) => ReturnCode::Success,
        }
    }

    fn is_regression(&self) -> bool {
        matches!(self, RawResult::Sparse(_))
    }
}

/// Per-output summary of the prediction error.
#[derive(Debug, Clone, Copy)]
pub struct ResidualSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// The result of solving a problem: the recovered basis with its fitted
/// coefficient matrix, the termination status, the algorithm identifier,
/// the raw solver output, the solved problem, and the residual statistics
/// everything else derives from.
///
/// The basis stays immutable; coefficients ride alongside it, keyed by
/// equation index. Derived metrics are pure functions of the stored
/// residuals and degrees of freedom under a Gaussian error assumption and
/// are defined only when the fit is a regression; spectral fits answer
/// them with a not-applicable error.
#[derive(Debug, Clone)]
pub struct DataDrivenSolution {
    basis: Basis,
    coefficients: Mat<f64>,
    retcode: ReturnCode,
    algorithm: String,
    out: RawResult,
    problem: DataDrivenProblem,
    rss: f64,
    null_rss: f64,
    nobs: usize,
    dof: usize,
    expressions: Option<Vec<String>>,
}

impl DataDrivenSolution {
    /// Assemble a solution from solver output.
    ///
    /// `coefficients` is (basis equations x outputs); `residuals` is the
    /// residual sum of squares of the fit; `dof` is the number of active
    /// parameters. The null-model residual (per-output intercept only) is
    /// derived from the problem's target here, once.
    pub fn new(
        basis: Basis,
        coefficients: Mat<f64>,
        algorithm: &str,
        out: RawResult,
        problem: DataDrivenProblem,
        residuals: f64,
        dof: usize,
    ) -> Result<Self> {
        let reg = problem.regression_data()?;
        Ok(Self::from_parts(
            basis,
            coefficients,
            algorithm,
            out,
            problem,
            &reg.target,
            residuals,
            dof,
        ))
    }

    /// Assembly against an explicit target matrix, for pooled (dataset)
    /// fits whose target is not the representative problem's own.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        basis: Basis,
        coefficients: Mat<f64>,
        algorithm: &str,
        out: RawResult,
        problem: DataDrivenProblem,
        target: &Mat<f64>,
        residuals: f64,
        dof: usize,
    ) -> Self {
        let nobs = target.nrows() * target.ncols();

        let mut null_rss = 0.0;
        for i in 0..target.nrows() {
            let mut mean = 0.0;
            for j in 0..target.ncols() {
                mean += target[(i, j)];
            }
            mean /= target.ncols() as f64;
            for j in 0..target.ncols() {
                let d = target[(i, j)] - mean;
                null_rss += d * d;
            }
        }

        let retcode = out.retcode();
        Self {
            basis,
            coefficients,
            retcode,
            algorithm: algorithm.to_string(),
            out,
            problem,
            rss: residuals,
            null_rss,
            nobs,
            dof,
            expressions: None,
        }
    }

    /// Render and cache the printable equations eagerly.
    pub fn with_rendered_equations(mut self) -> Self {
        self.expressions = Some(self.render_equations());
        self
    }

    /// The solved problem.
    pub fn get_problem(&self) -> &DataDrivenProblem {
        &self.problem
    }

    /// The recovered basis.
    pub fn get_basis(&self) -> &Basis {
        &self.basis
    }

    /// Identifier of the algorithm that produced this solution.
    pub fn get_algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The raw solver output.
    pub fn get_result(&self) -> &RawResult {
        &self.out
    }

    /// True iff the solver's own termination condition signalled success,
    /// independent of fit quality.
    pub fn is_converged(&self) -> bool {
        self.retcode.is_success()
    }

    pub fn retcode(&self) -> ReturnCode {
        self.retcode
    }

    /// Fitted coefficient matrix (basis equations x outputs).
    pub fn coefficients(&self) -> &Mat<f64> {
        &self.coefficients
    }

    /// The nonzero coefficients, flattened output by output.
    pub fn parameters(&self) -> Vec<f64> {
        let mut out = Vec::new();
        for j in 0..self.coefficients.ncols() {
            for i in 0..self.coefficients.nrows() {
                let v = self.coefficients[(i, j)];
                if v != 0.0 {
                    out.push(v);
                }
            }
        }
        out
    }

    /// Degrees of freedom: the number of active parameters.
    pub fn dof(&self) -> usize {
        self.dof
    }

    /// Residual sum of squares.
    pub fn rss(&self) -> f64 {
        self.rss
    }

    /// Number of scalar observations entering the fit.
    pub fn nobs(&self) -> usize {
        self.nobs
    }

    fn ensure_regression(&self, what: &str) -> Result<()> {
        if self.out.is_regression() {
            Ok(())
        } else {
            Err(DataDrivenError::NotApplicable(format!(
                "{what} is undefined for a spectral fit"
            )))
        }
    }

    /// Gaussian log-likelihood of the fit.
    pub fn loglikelihood(&self) -> Result<f64> {
        self.ensure_regression("loglikelihood")?;
        Ok(gaussian_loglikelihood(self.rss, self.nobs))
    }

    /// Log-likelihood of the intercept-only null model.
    pub fn nullloglikelihood(&self) -> Result<f64> {
        self.ensure_regression("nullloglikelihood")?;
        Ok(gaussian_loglikelihood(self.null_rss, self.nobs))
    }

    /// Cox-Snell coefficient of determination.
    pub fn r2(&self) -> Result<f64> {
        let ll = self.loglikelihood()?;
        let ll0 = self.nullloglikelihood()?;
        let n = self.nobs as f64;
        Ok(1.0 - (2.0 / n * (ll0 - ll)).exp())
    }

    /// Akaike information criterion, `2 dof - 2 loglikelihood`.
    pub fn aic(&self) -> Result<f64> {
        let ll = self.loglikelihood()?;
        Ok(2.0 * self.dof as f64 - 2.0 * ll)
    }

    /// Per-output summaries of the prediction error. Re-evaluates the
    /// basis against the solved problem.
    pub fn summarystats(&self) -> Result<Vec<ResidualSummary>> {
        let reg = self.problem.regression_data()?;
        let theta = match &self.out {
            RawResult::Sparse(_) if self.basis.has_implicits() => self.basis.evaluate_implicit(
                &reg.states,
                &reg.target,
                self.problem.p(),
                reg.times.as_deref(),
                reg.inputs.as_ref(),
            )?,
            _ => self.basis.evaluate_controlled(
                &reg.states,
                self.problem.p(),
                reg.times.as_deref(),
                reg.inputs.as_ref(),
            )?,
        };

        let d = self.coefficients.ncols();
        let m = theta.ncols();
        let mut out = Vec::with_capacity(d);
        for r in 0..d {
            let mut errors = Vec::with_capacity(m);
            for j in 0..m {
                let mut pred = 0.0;
                for i in 0..theta.nrows() {
                    pred += self.coefficients[(i, r)] * theta[(i, j)];
                }
                // implicit fits measure distance to the null space
                let reference = if self.basis.has_implicits() {
                    0.0
                } else {
                    reg.target[(r, j)]
                };
                errors.push(reference - pred);
            }
            let mean = errors.iter().sum::<f64>() / m as f64;
            let var = errors.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / m as f64;
            out.push(ResidualSummary {
                min: errors.iter().copied().fold(f64::INFINITY, f64::min),
                max: errors.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                mean,
                std_dev: var.sqrt(),
            });
        }
        Ok(out)
    }

    /// Printable form of the recovered model, one line per output.
    pub fn equations(&self) -> Vec<String> {
        match &self.expressions {
            Some(cached) => cached.clone(),
            None => self.render_equations(),
        }
    }

    fn render_equations(&self) -> Vec<String> {
        let names = self.basis.names();
        let implicit = self.basis.has_implicits();
        let mut out = Vec::with_capacity(self.coefficients.ncols());

        for r in 0..self.coefficients.ncols() {
            let lhs = if implicit {
                "0".to_string()
            } else {
                match self.problem.kind() {
                    ProblemKind::Continuous => format!("dx{}", r + 1),
                    ProblemKind::Discrete => format!("x{}(k+1)", r + 1),
                    ProblemKind::Direct => format!("y{}", r + 1),
                }
            };

            let mut rhs = String::new();
            for i in 0..self.coefficients.nrows() {
                let c = self.coefficients[(i, r)];
                if c == 0.0 {
                    continue;
                }
                if rhs.is_empty() {
                    if c < 0.0 {
                        rhs.push('-');
                    }
                } else if c < 0.0 {
                    rhs.push_str(" - ");
                } else {
                    rhs.push_str(" + ");
                }
                let mag = c.abs();
                if (mag - 1.0).abs() < 1e-12 {
                    rhs.push_str(&names[i]);
                } else {
                    rhs.push_str(&format!("{mag} * {}", names[i]));
                }
            }
            if rhs.is_empty() {
                rhs.push('0');
            }
            out.push(format!("{lhs} = {rhs}"));
        }
        out
    }
}

fn gaussian_loglikelihood(rss: f64, nobs: usize) -> f64 {
    let n = nobs as f64;
    let variance = (rss / n).max(f64::MIN_POSITIVE);
    -0.5 * n * ((2.0 * std::f64::consts::PI).ln() + variance.ln() + 1.0)
}
