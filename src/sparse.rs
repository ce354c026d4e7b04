//! Sparse regression over a candidate design matrix.
//!
//! All optimizers share one skeleton: initialize by (ridge) least squares,
//! then repeat threshold -> refit-on-support until the support stops
//! changing and the coefficient change falls below tolerance. The
//! optimizers differ only in the thresholding rule. Exhausting the
//! iteration budget is reported as a status, never an error; the best
//! coefficients found so far are returned.

use faer::Mat;

use crate::types::{DataDrivenError, Result, ReturnCode, SolverOptions};
use crate::utils::{denoise_matrix, least_squares, row_scales, validate_matrix};

/// Magnitude threshold, shared across outputs or set per output column.
#[derive(Debug, Clone)]
pub enum Threshold {
    Global(f64),
    PerColumn(Vec<f64>),
}

impl Threshold {
    fn for_column(&self, j: usize) -> f64 {
        match self {
            Threshold::Global(tau) => *tau,
            Threshold::PerColumn(taus) => taus[j.min(taus.len() - 1)],
        }
    }

    fn validate(&self, n_cols: usize) -> Result<()> {
        let ok = match self {
            Threshold::Global(tau) => tau.is_finite() && *tau >= 0.0,
            Threshold::PerColumn(taus) => {
                !taus.is_empty()
                    && taus.len() <= n_cols.max(1)
                    && taus.iter().all(|t| t.is_finite() && *t >= 0.0)
            }
        };
        if ok {
            Ok(())
        } else {
            Err(DataDrivenError::Configuration(
                "thresholds must be finite, non-negative, and at most one per output".into(),
            ))
        }
    }
}

/// The sparse-regression family. Every member runs the shared
/// fit-threshold-refit loop; only the per-iteration thresholding rule
/// differs.
#[derive(Debug, Clone)]
pub enum SparseOptimizer {
    /// Sequential thresholded least squares: hard threshold, then refit
    /// restricted to the surviving support.
    Stlsq { threshold: Threshold, ridge: f64 },
    /// Proximal variant: refit on the support, then soft-shrink the
    /// surviving coefficients by the threshold.
    SoftThresholding { threshold: Threshold, ridge: f64 },
    /// Null-space estimation for bases with implicit variables: find
    /// coefficient directions with `xi^T Theta ~ 0` via a rank-revealing
    /// decomposition instead of a predictive fit.
    Implicit { threshold: Threshold },
}

impl SparseOptimizer {
    pub fn stlsq(threshold: f64) -> Self {
        SparseOptimizer::Stlsq {
            threshold: Threshold::Global(threshold),
            ridge: 0.0,
        }
    }

    pub fn soft(threshold: f64) -> Self {
        SparseOptimizer::SoftThresholding {
            threshold: Threshold::Global(threshold),
            ridge: 0.0,
        }
    }

    pub fn implicit(threshold: f64) -> Self {
        SparseOptimizer::Implicit {
            threshold: Threshold::Global(threshold),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SparseOptimizer::Stlsq { .. } => "STLSQ",
            SparseOptimizer::SoftThresholding { .. } => "SoftThresholding",
            SparseOptimizer::Implicit { .. } => "ImplicitOptimizer",
        }
    }

    fn threshold(&self) -> &Threshold {
        match self {
            SparseOptimizer::Stlsq { threshold, .. }
            | SparseOptimizer::SoftThresholding { threshold, .. }
            | SparseOptimizer::Implicit { threshold } => threshold,
        }
    }
}

/// Output of a sparse-regression run.
#[derive(Debug, Clone)]
pub struct SparseResult {
    /// Coefficient matrix Xi (candidates x outputs) with
    /// `target ~ Xi^T Theta`.
    pub coefficients: Mat<f64>,
    /// Iterations actually used.
    pub iterations: usize,
    /// Per-output support: `support[j][i]` is true iff candidate `i` is
    /// active for output `j`.
    pub support: Vec<Vec<bool>>,
    /// Final residual sum of squares against the given design and target.
    pub residual: f64,
    /// Termination status.
    pub retcode: ReturnCode,
}

/// Fit a sparse coefficient matrix Xi such that `target ~ Xi^T Theta`.
///
/// `theta` is (candidates x samples), `target` is (outputs x samples).
/// Denoising and normalization from `options` are applied identically to
/// design and target before fitting and inverted on the returned
/// coefficients.
pub fn sparse_regression(
    theta: &Mat<f64>,
    target: &Mat<f64>,
    optimizer: &SparseOptimizer,
    options: &SolverOptions,
) -> Result<SparseResult> {
    validate_matrix(theta, 1, 2)?;
    validate_matrix(target, 1, 2)?;
    if theta.ncols() != target.ncols() {
        return Err(DataDrivenError::Validation(format!(
            "design has {} samples, target has {}",
            theta.ncols(),
            target.ncols()
        )));
    }
    optimizer.threshold().validate(target.nrows())?;

    if let SparseOptimizer::Implicit { .. } = optimizer {
        return Err(DataDrivenError::Configuration(
            "the implicit optimizer requires a basis with implicit variables; \
             use implicit_regression"
                .into(),
        ));
    }

    // Pre-processing, applied identically to design and target
    let (theta_w, target_w) = if options.denoise {
        (denoise_matrix(theta)?, denoise_matrix(target)?)
    } else {
        (theta.clone(), target.clone())
    };
    let theta_scales = row_scales(&theta_w, options.normalize);
    let target_scales = row_scales(&target_w, options.normalize);
    let theta_n = scale_rows(&theta_w, &theta_scales);
    let target_n = scale_rows(&target_w, &target_scales);

    let (ridge, soft) = match optimizer {
        SparseOptimizer::Stlsq { ridge, .. } => (*ridge, false),
        SparseOptimizer::SoftThresholding { ridge, .. } => (*ridge, true),
        SparseOptimizer::Implicit { .. } => unreachable!(),
    };
    let threshold = optimizer.threshold();

    let k = theta_n.nrows();
    let d = target_n.nrows();
    let maxiters = options.maxiters.max(1);

    let mut xi = least_squares(&theta_n, &target_n, ridge)?;
    let mut support = vec![vec![true; k]; d];
    let mut retcode = ReturnCode::MaxIters;
    let mut iterations = 0;

    for iter in 1..=maxiters {
        iterations = iter;
        let prev_xi = xi.clone();
        let prev_support = support.clone();

        // Threshold: decide the surviving support per output column.
        for (j, col_support) in support.iter_mut().enumerate() {
            let tau = threshold.for_column(j);
            for (i, active) in col_support.iter_mut().enumerate() {
                *active = xi[(i, j)].abs() >= tau && xi[(i, j)] != 0.0;
            }
        }

        // Refit restricted to the support, column by column.
        for j in 0..d {
            refit_column(&theta_n, &target_n, &support[j], ridge, j, &mut xi)?;
        }

        // Proximal rule: shrink the refit coefficients.
        if soft {
            for (j, col_support) in support.iter_mut().enumerate() {
                let tau = threshold.for_column(j);
                for (i, active) in col_support.iter_mut().enumerate() {
                    let v = xi[(i, j)];
                    let shrunk = v.signum() * (v.abs() - tau).max(0.0);
                    xi[(i, j)] = shrunk;
                    *active = shrunk != 0.0;
                }
            }
        }

        let delta = max_abs_change(&xi, &prev_xi);
        let scale = max_abs(&prev_xi);
        if options.progress {
            let active: usize = support.iter().flatten().filter(|&&a| a).count();
            eprintln!("sparse regression iteration {iter}: {active} active terms, change {delta:.3e}");
        }

        if support == prev_support && delta <= options.abstol + options.reltol * scale {
            retcode = ReturnCode::Success;
            break;
        }
    }

    // Invert the normalization on the coefficients.
    for j in 0..d {
        for i in 0..k {
            xi[(i, j)] *= target_scales[j] / theta_scales[i];
        }
    }

    let finite = (0..d).flat_map(|j| (0..k).map(move |i| (i, j)));
    let n_finite = finite.clone().filter(|&(i, j)| xi[(i, j)].is_finite()).count();
    if n_finite == 0 {
        return Err(DataDrivenError::Numerical(
            "sparse regression produced no finite coefficients".into(),
        ));
    }
    if n_finite < k * d {
        retcode = ReturnCode::Failed;
    }

    let residual = residual_sum_of_squares(theta, target, &xi);
    if options.verbose {
        eprintln!(
            "sparse regression ({}) finished after {iterations} iterations: rss {residual:.6e}, {retcode}",
            optimizer.name()
        );
    }

    Ok(SparseResult {
        coefficients: xi,
        iterations,
        support,
        residual,
        retcode,
    })
}

/// Null-space variant for bases with implicit variables.
///
/// For each implicit variable, the admissible candidates are those
/// referencing only that implicit variable (or none). The coefficient
/// direction is the left singular vector of the restricted design for its
/// smallest singular value, iterated with hard thresholding over the
/// support. Directions are rescaled so the dominant implicit-bearing
/// candidate carries coefficient -1.
pub fn implicit_regression(
    theta: &Mat<f64>,
    implicit_usage: &[Vec<usize>],
    n_implicits: usize,
    optimizer: &SparseOptimizer,
    options: &SolverOptions,
) -> Result<SparseResult> {
    validate_matrix(theta, 1, 2)?;
    if implicit_usage.len() != theta.nrows() {
        return Err(DataDrivenError::Validation(format!(
            "implicit usage covers {} candidates, design has {}",
            implicit_usage.len(),
            theta.nrows()
        )));
    }
    if n_implicits == 0 {
        return Err(DataDrivenError::Configuration(
            "implicit regression requires at least one implicit variable".into(),
        ));
    }
    let threshold = optimizer.threshold();
    threshold.validate(n_implicits)?;

    let k = theta.nrows();
    let maxiters = options.maxiters.max(1);

    let mut xi = Mat::<f64>::zeros(k, n_implicits);
    let mut support = vec![vec![false; k]; n_implicits];
    let mut retcode = ReturnCode::Success;
    let mut iterations = 0;

    for v in 0..n_implicits {
        // Admissible candidates: reference implicit v only, or none.
        let admissible: Vec<usize> = (0..k)
            .filter(|&i| implicit_usage[i].iter().all(|&w| w == v))
            .collect();
        let anchors: Vec<usize> = admissible
            .iter()
            .copied()
            .filter(|&i| implicit_usage[i].contains(&v))
            .collect();
        if anchors.is_empty() {
            return Err(DataDrivenError::Configuration(format!(
                "no candidate references implicit variable {}",
                v + 1
            )));
        }

        let tau = threshold.for_column(v);
        let mut active = admissible.clone();
        let mut coeffs = null_space_direction(theta, &active)?;
        let mut col_retcode = ReturnCode::MaxIters;
        let mut col_iterations = 0;

        for iter in 1..=maxiters {
            col_iterations = iter;

            // Rescale so the dominant implicit-bearing candidate is -1.
            let anchor_pos = dominant_anchor(&active, &anchors, &coeffs);
            let anchor_pos = match anchor_pos {
                Some(pos) if coeffs[pos].abs() > 1e-14 => pos,
                _ => {
                    return Err(DataDrivenError::Numerical(format!(
                        "implicit variable {} vanished from the null-space direction",
                        v + 1
                    )))
                }
            };
            let scale = -1.0 / coeffs[anchor_pos];
            for c in coeffs.iter_mut() {
                *c *= scale;
            }

            // Hard threshold, never dropping the anchor.
            let survivors: Vec<usize> = active
                .iter()
                .enumerate()
                .filter(|&(pos, _)| pos == anchor_pos || coeffs[pos].abs() >= tau)
                .map(|(_, &row)| row)
                .collect();

            if options.progress {
                eprintln!(
                    "implicit regression (dx{}) iteration {iter}: {} active terms",
                    v + 1,
                    survivors.len()
                );
            }

            if survivors == active {
                col_retcode = ReturnCode::Success;
                break;
            }
            active = survivors;
            coeffs = null_space_direction(theta, &active)?;
        }

        // Final rescale of the surviving direction.
        let anchor_pos = dominant_anchor(&active, &anchors, &coeffs).ok_or_else(|| {
            DataDrivenError::Numerical(format!(
                "implicit variable {} lost every implicit-bearing candidate",
                v + 1
            ))
        })?;
        if coeffs[anchor_pos].abs() <= 1e-14 {
            return Err(DataDrivenError::Numerical(format!(
                "implicit variable {} vanished from the null-space direction",
                v + 1
            )));
        }
        let scale = -1.0 / coeffs[anchor_pos];
        for (pos, &row) in active.iter().enumerate() {
            xi[(row, v)] = coeffs[pos] * scale;
            support[v][row] = true;
        }

        iterations = iterations.max(col_iterations);
        if col_retcode == ReturnCode::MaxIters {
            retcode = ReturnCode::MaxIters;
        }
    }

    // Fit quality: how far the directions are from the null space.
    let mut residual = 0.0;
    for v in 0..n_implicits {
        for j in 0..theta.ncols() {
            let mut dot = 0.0;
            for i in 0..k {
                dot += xi[(i, v)] * theta[(i, j)];
            }
            residual += dot * dot;
        }
    }

    if options.verbose {
        eprintln!(
            "implicit regression finished after {iterations} iterations: rss {residual:.6e}, {retcode}"
        );
    }

    Ok(SparseResult {
        coefficients: xi,
        iterations,
        support,
        residual,
        retcode,
    })
}

/// Position of the largest-magnitude implicit-bearing coefficient within
/// the active set.
fn dominant_anchor(active: &[usize], anchors: &[usize], coeffs: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (pos, row) in active.iter().enumerate() {
        if anchors.contains(row) {
            match best {
                Some(b) if coeffs[b].abs() >= coeffs[pos].abs() => {}
                _ => best = Some(pos),
            }
        }
    }
    best
}

/// Left singular direction of the restricted design for its smallest
/// singular value.
fn null_space_direction(theta: &Mat<f64>, rows: &[usize]) -> Result<Vec<f64>> {
    let r = rows.len();
    if r == 0 {
        return Err(DataDrivenError::Numerical(
            "empty candidate set in null-space step".into(),
        ));
    }
    let mut sub = Mat::<f64>::zeros(r, theta.ncols());
    for (pos, &row) in rows.iter().enumerate() {
        for j in 0..theta.ncols() {
            sub[(pos, j)] = theta[(row, j)];
        }
    }
    let svd = sub
        .svd()
        .map_err(|e| DataDrivenError::Numerical(format!("SVD failed: {e:?}")))?;
    let u = svd.U();
    let n_sv = svd.S().column_vector().nrows();
    let last = n_sv - 1;
    Ok((0..r).map(|i| u[(i, last)]).collect())
}

/// Re-solve one output column restricted to its surviving support.
fn refit_column(
    theta: &Mat<f64>,
    target: &Mat<f64>,
    support: &[bool],
    ridge: f64,
    j: usize,
    xi: &mut Mat<f64>,
) -> Result<()> {
    let rows: Vec<usize> = support
        .iter()
        .enumerate()
        .filter(|(_, &a)| a)
        .map(|(i, _)| i)
        .collect();

    for i in 0..theta.nrows() {
        xi[(i, j)] = 0.0;
    }
    if rows.is_empty() {
        return Ok(());
    }

    let m = theta.ncols();
    let mut sub = Mat::<f64>::zeros(rows.len(), m);
    for (pos, &row) in rows.iter().enumerate() {
        for c in 0..m {
            sub[(pos, c)] = theta[(row, c)];
        }
    }
    let mut rhs = Mat::<f64>::zeros(1, m);
    for c in 0..m {
        rhs[(0, c)] = target[(j, c)];
    }

    let sol = least_squares(&sub, &rhs, ridge)?;
    for (pos, &row) in rows.iter().enumerate() {
        xi[(row, j)] = sol[(pos, 0)];
    }
    Ok(())
}

fn scale_rows(x: &Mat<f64>, scales: &[f64]) -> Mat<f64> {
    let mut out = x.clone();
    for i in 0..x.nrows() {
        if scales[i] != 1.0 {
            for j in 0..x.ncols() {
                out[(i, j)] /= scales[i];
            }
        }
    }
    out
}

fn max_abs_change(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    let mut max = 0.0_f64;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            max = max.max((a[(i, j)] - b[(i, j)]).abs());
        }
    }
    max
}

fn max_abs(a: &Mat<f64>) -> f64 {
    let mut max = 0.0_f64;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            max = max.max(a[(i, j)].abs());
        }
    }
    max
}

/// Residual sum of squares of `target - Xi^T Theta`.
pub fn residual_sum_of_squares(theta: &Mat<f64>, target: &Mat<f64>, xi: &Mat<f64>) -> f64 {
    let mut rss = 0.0;
    for j in 0..target.ncols() {
        for r in 0..target.nrows() {
            let mut pred = 0.0;
            for i in 0..theta.nrows() {
                pred += xi[(i, r)] * theta[(i, j)];
            }
            let diff = target[(r, j)] - pred;
            rss += diff * diff;
        }
    }
    rss
}
