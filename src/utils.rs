use faer::Mat;

use crate::types::{DataDrivenError, DataNormalization, Result};

/// Validate that a matrix meets minimum dimension requirements and contains
/// no NaN/Inf.
pub fn validate_matrix(x: &Mat<f64>, min_rows: usize, min_cols: usize) -> Result<()> {
    let (rows, cols) = (x.nrows(), x.ncols());
    if rows < min_rows {
        return Err(DataDrivenError::Validation(format!(
            "matrix has {rows} rows, need at least {min_rows}"
        )));
    }
    if cols < min_cols {
        return Err(DataDrivenError::Validation(format!(
            "matrix has {cols} columns, need at least {min_cols}"
        )));
    }
    for j in 0..cols {
        for i in 0..rows {
            let val = x[(i, j)];
            if val.is_nan() || val.is_infinite() {
                return Err(DataDrivenError::Numerical(
                    "matrix contains NaN or Inf values".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Solve A X = B for square A via Gaussian elimination with partial pivoting.
pub fn solve_linear_systems(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.nrows() != n {
        return Err(DataDrivenError::Numerical(format!(
            "solve expects square A and matching B, got {}x{} and {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    let m = b.ncols();

    // Augmented [A | B]
    let mut aug = Mat::<f64>::zeros(n, n + m);
    for j in 0..n {
        for i in 0..n {
            aug[(i, j)] = a[(i, j)];
        }
    }
    for j in 0..m {
        for i in 0..n {
            aug[(i, n + j)] = b[(i, j)];
        }
    }

    for col in 0..n {
        // Partial pivoting
        let mut max_abs = aug[(col, col)].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let v = aug[(row, col)].abs();
            if v > max_abs {
                max_abs = v;
                max_row = row;
            }
        }
        if max_abs < 1e-14 {
            return Err(DataDrivenError::Numerical("singular matrix".into()));
        }
        if max_row != col {
            for j in 0..(n + m) {
                let tmp = aug[(col, j)];
                aug[(col, j)] = aug[(max_row, j)];
                aug[(max_row, j)] = tmp;
            }
        }

        let pivot = aug[(col, col)];
        for row in (col + 1)..n {
            let factor = aug[(row, col)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in col..(n + m) {
                aug[(row, j)] -= factor * aug[(col, j)];
            }
        }
    }

    // Back substitution
    let mut x = Mat::<f64>::zeros(n, m);
    for k in 0..m {
        for i in (0..n).rev() {
            let mut sum = aug[(i, n + k)];
            for j in (i + 1)..n {
                sum -= aug[(i, j)] * x[(j, k)];
            }
            x[(i, k)] = sum / aug[(i, i)];
        }
    }

    Ok(x)
}

/// Compute the Moore-Penrose pseudo-inverse via SVD.
pub fn pinv(a: &Mat<f64>, tol: Option<f64>) -> Result<Mat<f64>> {
    let svd = a
        .svd()
        .map_err(|e| DataDrivenError::Numerical(format!("SVD failed: {e:?}")))?;
    let u = svd.U();
    let s_col = svd.S().column_vector();
    let v = svd.V();

    let k = s_col.nrows();
    let max_sv = (0..k).map(|i| s_col[i].abs()).fold(0.0_f64, f64::max);

    let tol = tol.unwrap_or_else(|| {
        let max_dim = a.nrows().max(a.ncols()) as f64;
        max_sv * max_dim * f64::EPSILON
    });

    // pinv(A) = V S_inv U^T
    let m = a.nrows();
    let n = a.ncols();
    let mut result = Mat::<f64>::zeros(n, m);

    for idx in 0..k {
        let si = s_col[idx];
        if si.abs() > tol {
            let si_inv = 1.0 / si;
            for j in 0..n {
                for i in 0..m {
                    result[(j, i)] += v[(j, idx)] * si_inv * u[(i, idx)];
                }
            }
        }
    }

    Ok(result)
}

/// Least-squares fit of coefficients Xi (k x d) such that B ~ Xi^T Theta,
/// where Theta is (k regressors x m samples) and B is (d outputs x m samples).
///
/// Solves the ridge-regularized normal equations
/// (Theta Theta^T + lambda I) Xi = Theta B^T; falls back to the SVD
/// pseudo-inverse when the Gram matrix is singular.
pub fn least_squares(theta: &Mat<f64>, b: &Mat<f64>, lambda: f64) -> Result<Mat<f64>> {
    let k = theta.nrows();
    if theta.ncols() != b.ncols() {
        return Err(DataDrivenError::Numerical(format!(
            "design has {} samples, target has {}",
            theta.ncols(),
            b.ncols()
        )));
    }

    let mut gram = theta * theta.transpose();
    if lambda != 0.0 {
        for i in 0..k {
            gram[(i, i)] += lambda;
        }
    }
    let rhs = theta * b.transpose();

    match solve_linear_systems(&gram, &rhs) {
        Ok(xi) => Ok(xi),
        Err(DataDrivenError::Numerical(_)) => {
            let gram_pinv = pinv(&gram, None)?;
            Ok(&gram_pinv * &rhs)
        }
        Err(e) => Err(e),
    }
}

/// Optimal hard threshold for singular values of an m x n matrix with
/// unknown noise level, relative to the median singular value.
///
/// Uses the rational approximation of the optimal shrinkage coefficient
/// omega(beta) ~ 0.56 b^3 - 0.95 b^2 + 1.82 b + 1.43 with
/// beta = min(m, n) / max(m, n).
pub fn optimal_svht_threshold(singular_values: &[f64], nrows: usize, ncols: usize) -> f64 {
    if singular_values.is_empty() {
        return 0.0;
    }
    let beta = nrows.min(ncols) as f64 / nrows.max(ncols) as f64;
    let omega = 0.56 * beta.powi(3) - 0.95 * beta.powi(2) + 1.82 * beta + 1.43;

    let mut sorted = singular_values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    };

    omega * median
}

/// Number of singular values above the optimal hard threshold. Always at
/// least 1 for a nonzero spectrum.
pub fn optimal_rank(singular_values: &[f64], nrows: usize, ncols: usize) -> usize {
    let tau = optimal_svht_threshold(singular_values, nrows, ncols);
    let r = singular_values.iter().filter(|&&s| s > tau).count();
    r.max(1).min(singular_values.len().max(1))
}

/// Reconstruct a matrix keeping only singular values above the optimal
/// hard threshold.
pub fn denoise_matrix(x: &Mat<f64>) -> Result<Mat<f64>> {
    let svd = x
        .svd()
        .map_err(|e| DataDrivenError::Numerical(format!("SVD failed: {e:?}")))?;
    let u = svd.U();
    let s_col = svd.S().column_vector();
    let v = svd.V();

    let k = s_col.nrows();
    let s_vals: Vec<f64> = (0..k).map(|i| s_col[i]).collect();
    let rank = optimal_rank(&s_vals, x.nrows(), x.ncols());

    let mut out = Mat::<f64>::zeros(x.nrows(), x.ncols());
    for idx in 0..rank {
        let s = s_vals[idx];
        for j in 0..x.ncols() {
            for i in 0..x.nrows() {
                out[(i, j)] += u[(i, idx)] * s * v[(j, idx)];
            }
        }
    }
    Ok(out)
}

/// Per-row scale factors for the requested normalization. Zero rows keep a
/// unit scale so the scaling is always invertible.
pub fn row_scales(x: &Mat<f64>, normalization: DataNormalization) -> Vec<f64> {
    let (nrows, ncols) = (x.nrows(), x.ncols());
    let mut scales = vec![1.0; nrows];
    match normalization {
        DataNormalization::None => {}
        DataNormalization::UnitNorm => {
            for i in 0..nrows {
                let mut sum_sq = 0.0;
                for j in 0..ncols {
                    sum_sq += x[(i, j)] * x[(i, j)];
                }
                let norm = sum_sq.sqrt();
                if norm > 0.0 {
                    scales[i] = norm;
                }
            }
        }
        DataNormalization::MaxAbs => {
            for i in 0..nrows {
                let mut max_abs = 0.0_f64;
                for j in 0..ncols {
                    max_abs = max_abs.max(x[(i, j)].abs());
                }
                if max_abs > 0.0 {
                    scales[i] = max_abs;
                }
            }
        }
    }
    scales
}

/// Squared Frobenius norm of the difference A - B.
pub fn frobenius_distance_sq(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    let mut sum = 0.0;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            let d = a[(i, j)] - b[(i, j)];
            sum += d * d;
        }
    }
    sum
}

/// Round to `digits` significant digits.
pub fn round_sig(x: f64, digits: u32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let d = digits.max(1) as i32;
    let mag = x.abs().log10().floor() as i32;
    let factor = 10f64.powi(d - 1 - mag);
    (x * factor).round() / factor
}
