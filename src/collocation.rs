//! Derivative estimation from sampled trajectories.
//!
//! Two interchangeable strategies: fit an interpolant and differentiate it
//! analytically, or fit a locally weighted polynomial per query point,
//! which denoises and differentiates in one pass.

use faer::Mat;
use rayon::prelude::*;

use crate::types::{DataDrivenError, Result};
use crate::utils::solve_linear_systems;

/// Weighting kernels for the local-polynomial strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollocationKernel {
    Epanechnikov,
    Uniform,
    Triangular,
    Quartic,
    Triweight,
    Tricube,
    Gaussian,
    Cosine,
    Logistic,
    Sigmoid,
    Silverman,
}

impl CollocationKernel {
    /// Kernel weight at normalized distance `x`.
    pub fn weight(&self, x: f64) -> f64 {
        let a = x.abs();
        match self {
            CollocationKernel::Epanechnikov => {
                if a > 1.0 {
                    0.0
                } else {
                    0.75 * (1.0 - x * x)
                }
            }
            CollocationKernel::Uniform => {
                if a > 1.0 {
                    0.0
                } else {
                    0.5
                }
            }
            CollocationKernel::Triangular => {
                if a > 1.0 {
                    0.0
                } else {
                    1.0 - a
                }
            }
            CollocationKernel::Quartic => {
                if a > 1.0 {
                    0.0
                } else {
                    let s = 1.0 - x * x;
                    15.0 / 16.0 * s * s
                }
            }
            CollocationKernel::Triweight => {
                if a > 1.0 {
                    0.0
                } else {
                    let s = 1.0 - x * x;
                    35.0 / 32.0 * s * s * s
                }
            }
            CollocationKernel::Tricube => {
                if a > 1.0 {
                    0.0
                } else {
                    let s = 1.0 - a * a * a;
                    70.0 / 81.0 * s * s * s
                }
            }
            CollocationKernel::Gaussian => {
                (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
            }
            CollocationKernel::Cosine => {
                if a > 1.0 {
                    0.0
                } else {
                    std::f64::consts::FRAC_PI_4 * (std::f64::consts::FRAC_PI_2 * x).cos()
                }
            }
            CollocationKernel::Logistic => 1.0 / (x.exp() + 2.0 + (-x).exp()),
            CollocationKernel::Sigmoid => {
                2.0 / (std::f64::consts::PI * (x.exp() + (-x).exp()))
            }
            CollocationKernel::Silverman => {
                let s = a / std::f64::consts::SQRT_2;
                0.5 * (-s).exp() * (s + std::f64::consts::FRAC_PI_4).sin()
            }
        }
    }
}

/// Interpolants for the interpolation-based strategy, differentiated
/// analytically at the sample points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMethod {
    /// Piecewise constant; derivative is identically zero.
    Constant,
    /// Piecewise linear; derivative is the segment slope.
    Linear,
    /// Piecewise quadratic through consecutive point triples.
    Quadratic,
    /// Global Lagrange polynomial. Exact for polynomial data but
    /// ill-conditioned for large sample counts.
    Lagrange,
    /// Natural cubic spline.
    CubicSpline,
    /// Interpolating basis spline of the given degree.
    BSpline { degree: usize },
    /// Global least-squares polynomial fit of the given degree.
    CurveFit { degree: usize },
}

impl InterpolationMethod {
    /// Minimum sample count the method requires.
    fn min_points(&self) -> usize {
        match self {
            InterpolationMethod::Constant | InterpolationMethod::Linear => 2,
            InterpolationMethod::Quadratic | InterpolationMethod::CubicSpline => 3,
            InterpolationMethod::Lagrange => 2,
            InterpolationMethod::BSpline { degree } => degree + 1,
            InterpolationMethod::CurveFit { degree } => degree + 1,
        }
    }
}

/// Strategy selection for [`collocate_data`].
#[derive(Debug, Clone, Copy)]
pub enum CollocationMethod {
    /// Fit an interpolant through the samples and differentiate it.
    /// `crop` drops the first and last output sample, where boundary
    /// interpolation is least reliable.
    Interpolation {
        method: InterpolationMethod,
        crop: bool,
    },
    /// Locally weighted quadratic fit per query point. `bandwidth` of
    /// `None` uses `span(t) * m^(-1/5) * m^(-3/35) * ln(m)^(-1/16)`.
    Kernel {
        kernel: CollocationKernel,
        bandwidth: Option<f64>,
    },
}

impl CollocationMethod {
    pub fn interpolation(method: InterpolationMethod) -> Self {
        CollocationMethod::Interpolation {
            method,
            crop: false,
        }
    }

    pub fn kernel(kernel: CollocationKernel) -> Self {
        CollocationMethod::Kernel {
            kernel,
            bandwidth: None,
        }
    }
}

impl Default for CollocationMethod {
    fn default() -> Self {
        CollocationMethod::interpolation(InterpolationMethod::Linear)
    }
}

/// Estimate `(du, u, t)` from sampled data, one row per signal.
///
/// The output sample count may differ from the input (cropping) but time
/// ordering is preserved. Fails with a collocation error when fewer points
/// are available than the chosen method or kernel bandwidth requires.
pub fn collocate_data(
    data: &Mat<f64>,
    t: &[f64],
    method: &CollocationMethod,
) -> Result<(Mat<f64>, Mat<f64>, Vec<f64>)> {
    let m = t.len();
    if data.ncols() != m {
        return Err(DataDrivenError::Validation(format!(
            "data has {} columns, t has {m} entries",
            data.ncols()
        )));
    }
    if t.windows(2).any(|w| w[1] <= w[0]) {
        return Err(DataDrivenError::Validation(
            "time points must be strictly increasing".into(),
        ));
    }

    match method {
        CollocationMethod::Interpolation { method, crop } => {
            if m < method.min_points() {
                return Err(DataDrivenError::Collocation(format!(
                    "{method:?} requires at least {} points, got {m}",
                    method.min_points()
                )));
            }
            let n = data.nrows();
            let mut du = Mat::<f64>::zeros(n, m);
            let mut u = Mat::<f64>::zeros(n, m);
            let mut values = vec![0.0; m];
            for r in 0..n {
                for j in 0..m {
                    values[j] = data[(r, j)];
                }
                let (d_row, u_row) = interpolate_derivatives(*method, t, &values)?;
                for j in 0..m {
                    du[(r, j)] = d_row[j];
                    u[(r, j)] = u_row[j];
                }
            }

            if *crop && m > 2 {
                let du_c = du.subcols(1, m - 2).to_owned();
                let u_c = u.subcols(1, m - 2).to_owned();
                Ok((du_c, u_c, t[1..m - 1].to_vec()))
            } else {
                Ok((du, u, t.to_vec()))
            }
        }
        CollocationMethod::Kernel { kernel, bandwidth } => {
            if m < 3 {
                return Err(DataDrivenError::Collocation(format!(
                    "kernel collocation requires at least 3 points, got {m}"
                )));
            }
            let span = t[m - 1] - t[0];
            let mf = m as f64;
            let h = bandwidth.unwrap_or_else(|| {
                span * mf.powf(-0.2) * mf.powf(-3.0 / 35.0) * mf.ln().powf(-1.0 / 16.0)
            });
            if h <= 0.0 {
                return Err(DataDrivenError::Collocation(
                    "kernel bandwidth must be positive".into(),
                ));
            }

            kernel_collocate(data, t, *kernel, h)
        }
    }
}

/// Local quadratic fit at every query point: the linear coefficient of the
/// quadratic fit is the derivative estimate, the intercept of the linear
/// fit is the smoothed value.
fn kernel_collocate(
    data: &Mat<f64>,
    t: &[f64],
    kernel: CollocationKernel,
    h: f64,
) -> Result<(Mat<f64>, Mat<f64>, Vec<f64>)> {
    let n = data.nrows();
    let m = t.len();

    let columns: Vec<(Vec<f64>, Vec<f64>)> = (0..m)
        .into_par_iter()
        .map(|i| -> Result<(Vec<f64>, Vec<f64>)> {
            let ti = t[i];
            let weights: Vec<f64> = t.iter().map(|&tj| kernel.weight((tj - ti) / h)).collect();
            let effective = weights.iter().filter(|&&w| w > 1e-12).count();
            if effective < 3 {
                return Err(DataDrivenError::Collocation(format!(
                    "only {effective} points carry weight at t = {ti}; widen the bandwidth"
                )));
            }

            // Weighted Gram matrices for the linear and quadratic local fits
            let mut a1 = Mat::<f64>::zeros(2, 2);
            let mut a2 = Mat::<f64>::zeros(3, 3);
            let mut b1 = Mat::<f64>::zeros(2, n);
            let mut b2 = Mat::<f64>::zeros(3, n);
            for (j, &tj) in t.iter().enumerate() {
                let w2 = weights[j] * weights[j];
                if w2 == 0.0 {
                    continue;
                }
                let dt = tj - ti;
                let basis1 = [1.0, dt];
                let basis2 = [1.0, dt, dt * dt];
                for (r, &br) in basis1.iter().enumerate() {
                    for (c, &bc) in basis1.iter().enumerate() {
                        a1[(r, c)] += w2 * br * bc;
                    }
                    for s in 0..n {
                        b1[(r, s)] += w2 * br * data[(s, j)];
                    }
                }
                for (r, &br) in basis2.iter().enumerate() {
                    for (c, &bc) in basis2.iter().enumerate() {
                        a2[(r, c)] += w2 * br * bc;
                    }
                    for s in 0..n {
                        b2[(r, s)] += w2 * br * data[(s, j)];
                    }
                }
            }

            let beta1 = solve_linear_systems(&a1, &b1).map_err(|_| {
                DataDrivenError::Collocation(format!(
                    "local fit is singular at t = {ti}; widen the bandwidth"
                ))
            })?;
            let beta2 = solve_linear_systems(&a2, &b2).map_err(|_| {
                DataDrivenError::Collocation(format!(
                    "local fit is singular at t = {ti}; widen the bandwidth"
                ))
            })?;

            let du_col: Vec<f64> = (0..n).map(|s| beta2[(1, s)]).collect();
            let u_col: Vec<f64> = (0..n).map(|s| beta1[(0, s)]).collect();
            Ok((du_col, u_col))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut du = Mat::<f64>::zeros(n, m);
    let mut u = Mat::<f64>::zeros(n, m);
    for (j, (du_col, u_col)) in columns.iter().enumerate() {
        for i in 0..n {
            du[(i, j)] = du_col[i];
            u[(i, j)] = u_col[i];
        }
    }

    Ok((du, u, t.to_vec()))
}

/// Derivative and value of the chosen interpolant at every sample point.
fn interpolate_derivatives(
    method: InterpolationMethod,
    t: &[f64],
    v: &[f64],
) -> Result<(Vec<f64>, Vec<f64>)> {
    let m = t.len();
    match method {
        InterpolationMethod::Constant => Ok((vec![0.0; m], v.to_vec())),
        InterpolationMethod::Linear => {
            let mut du = vec![0.0; m];
            for i in 0..m {
                let seg = i.min(m - 2);
                du[i] = (v[seg + 1] - v[seg]) / (t[seg + 1] - t[seg]);
            }
            Ok((du, v.to_vec()))
        }
        InterpolationMethod::Quadratic => {
            let mut du = vec![0.0; m];
            for i in 0..m {
                // triple centered on i, clamped at the boundaries
                let c = i.clamp(1, m - 2);
                let (ta, tb, tc) = (t[c - 1], t[c], t[c + 1]);
                let (va, vb, vc) = (v[c - 1], v[c], v[c + 1]);
                let ti = t[i];
                // derivative of the Lagrange quadratic through the triple
                du[i] = va * (2.0 * ti - tb - tc) / ((ta - tb) * (ta - tc))
                    + vb * (2.0 * ti - ta - tc) / ((tb - ta) * (tb - tc))
                    + vc * (2.0 * ti - ta - tb) / ((tc - ta) * (tc - tb));
            }
            Ok((du, v.to_vec()))
        }
        InterpolationMethod::Lagrange => {
            let mut du = vec![0.0; m];
            for k in 0..m {
                let mut sum = 0.0;
                for j in 0..m {
                    if j == k {
                        // L_k'(t_k) = sum over other nodes of 1/(t_k - t_m)
                        let s: f64 = (0..m).filter(|&q| q != k).map(|q| 1.0 / (t[k] - t[q])).sum();
                        sum += v[k] * s;
                    } else {
                        let num: f64 = (0..m)
                            .filter(|&q| q != j && q != k)
                            .map(|q| t[k] - t[q])
                            .product();
                        let den: f64 =
                            (0..m).filter(|&q| q != j).map(|q| t[j] - t[q]).product();
                        sum += v[j] * num / den;
                    }
                }
                du[k] = sum;
            }
            Ok((du, v.to_vec()))
        }
        InterpolationMethod::CubicSpline => {
            let m2 = natural_spline_second_derivatives(t, v)?;
            let mut du = vec![0.0; m];
            for i in 0..m {
                if i < m - 1 {
                    let h = t[i + 1] - t[i];
                    du[i] = (v[i + 1] - v[i]) / h - h * (2.0 * m2[i] + m2[i + 1]) / 6.0;
                } else {
                    let h = t[m - 1] - t[m - 2];
                    du[i] = (v[m - 1] - v[m - 2]) / h + h * (2.0 * m2[m - 1] + m2[m - 2]) / 6.0;
                }
            }
            Ok((du, v.to_vec()))
        }
        InterpolationMethod::BSpline { degree } => bspline_derivatives(t, v, degree),
        InterpolationMethod::CurveFit { degree } => {
            // centered Vandermonde for conditioning
            let t0 = t.iter().sum::<f64>() / m as f64;
            let mut theta = Mat::<f64>::zeros(degree + 1, m);
            for (j, &tj) in t.iter().enumerate() {
                let mut pw = 1.0;
                for d in 0..=degree {
                    theta[(d, j)] = pw;
                    pw *= tj - t0;
                }
            }
            let mut target = Mat::<f64>::zeros(1, m);
            for (j, &vj) in v.iter().enumerate() {
                target[(0, j)] = vj;
            }
            let xi = crate::utils::least_squares(&theta, &target, 0.0)?;

            let mut du = vec![0.0; m];
            let mut u = vec![0.0; m];
            for (j, &tj) in t.iter().enumerate() {
                let s = tj - t0;
                let mut val = 0.0;
                let mut der = 0.0;
                let mut pw = 1.0;
                for d in 0..=degree {
                    val += xi[(d, 0)] * pw;
                    if d + 1 <= degree {
                        der += xi[(d + 1, 0)] * (d as f64 + 1.0) * pw;
                    }
                    pw *= s;
                }
                du[j] = der;
                u[j] = val;
            }
            Ok((du, u))
        }
    }
}

/// Second derivatives of the natural cubic spline via the tridiagonal
/// system (Thomas algorithm).
fn natural_spline_second_derivatives(t: &[f64], v: &[f64]) -> Result<Vec<f64>> {
    let m = t.len();
    let mut m2 = vec![0.0; m];
    if m < 3 {
        return Ok(m2);
    }

    let interior = m - 2;
    let mut diag = vec![0.0; interior];
    let mut sub = vec![0.0; interior];
    let mut sup = vec![0.0; interior];
    let mut rhs = vec![0.0; interior];
    for i in 0..interior {
        let h0 = t[i + 1] - t[i];
        let h1 = t[i + 2] - t[i + 1];
        sub[i] = h0;
        diag[i] = 2.0 * (h0 + h1);
        sup[i] = h1;
        rhs[i] = 6.0 * ((v[i + 2] - v[i + 1]) / h1 - (v[i + 1] - v[i]) / h0);
    }

    // forward sweep
    for i in 1..interior {
        let w = sub[i] / diag[i - 1];
        diag[i] -= w * sup[i - 1];
        rhs[i] -= w * rhs[i - 1];
    }
    // back substitution
    let mut sol = vec![0.0; interior];
    sol[interior - 1] = rhs[interior - 1] / diag[interior - 1];
    for i in (0..interior - 1).rev() {
        sol[i] = (rhs[i] - sup[i] * sol[i + 1]) / diag[i];
    }
    m2[1..=interior].copy_from_slice(&sol);
    Ok(m2)
}

/// Interpolating basis spline of the given degree through `(t, v)`, with
/// clamped averaged knots, differentiated analytically at the sample
/// points.
fn bspline_derivatives(t: &[f64], v: &[f64], degree: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    let m = t.len();
    if degree == 0 || degree >= m {
        return Err(DataDrivenError::Collocation(format!(
            "basis spline degree {degree} needs {} < samples ({m})",
            degree + 1
        )));
    }

    // Clamped knot vector with interior knots from parameter averaging
    let mut knots = vec![t[0]; degree + 1];
    for j in 1..(m - degree) {
        let avg: f64 = t[j..j + degree].iter().sum::<f64>() / degree as f64;
        knots.push(avg);
    }
    knots.extend(std::iter::repeat(t[m - 1]).take(degree + 1));

    // Collocation system N c = v
    let mut n_mat = Mat::<f64>::zeros(m, m);
    for (i, &ti) in t.iter().enumerate() {
        let span = find_span(m, degree, &knots, ti);
        let vals = basis_functions(span, ti, degree, &knots);
        for (k, &nv) in vals.iter().enumerate() {
            n_mat[(i, span - degree + k)] = nv;
        }
    }
    let mut rhs = Mat::<f64>::zeros(m, 1);
    for (i, &vi) in v.iter().enumerate() {
        rhs[(i, 0)] = vi;
    }
    let ctrl = solve_linear_systems(&n_mat, &rhs)
        .map_err(|_| DataDrivenError::Collocation("basis spline system is singular".into()))?;

    // Derivative curve: degree-1 spline over the interior knot vector
    let der_knots = &knots[1..knots.len() - 1];
    let n_der = m - 1;
    let mut der_ctrl = vec![0.0; n_der];
    for j in 0..n_der {
        let den = knots[j + degree + 1] - knots[j + 1];
        der_ctrl[j] = if den > 0.0 {
            degree as f64 * (ctrl[(j + 1, 0)] - ctrl[(j, 0)]) / den
        } else {
            0.0
        };
    }

    let mut du = vec![0.0; m];
    for (i, &ti) in t.iter().enumerate() {
        let span = find_span(n_der, degree - 1, der_knots, ti);
        let vals = basis_functions(span, ti, degree - 1, der_knots);
        let mut d = 0.0;
        for (k, &nv) in vals.iter().enumerate() {
            d += nv * der_ctrl[span - (degree - 1) + k];
        }
        du[i] = d;
    }

    Ok((du, v.to_vec()))
}

/// Knot span index containing `t` (the standard search on a clamped knot
/// vector).
fn find_span(n_ctrl: usize, degree: usize, knots: &[f64], t: f64) -> usize {
    if t >= knots[n_ctrl] {
        return n_ctrl - 1;
    }
    let mut low = degree;
    let mut high = n_ctrl;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Nonzero basis functions `N_{span-degree..=span, degree}` at `t`
/// (Cox–de Boor recursion).
fn basis_functions(span: usize, t: f64, degree: usize, knots: &[f64]) -> Vec<f64> {
    let mut vals = vec![0.0; degree + 1];
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];
    vals[0] = 1.0;
    for j in 1..=degree {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let den = right[r + 1] + left[j - r];
            let temp = if den != 0.0 { vals[r] / den } else { 0.0 };
            vals[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        vals[j] = saved;
    }
    vals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(a: f64, b: f64, eps: f64) {
        assert!(
            (a - b).abs() < eps,
            "expected {a} ≈ {b} (diff = {})",
            (a - b).abs()
        );
    }

    fn sampled(f: impl Fn(f64) -> f64, t: &[f64]) -> Mat<f64> {
        let mut data = Mat::<f64>::zeros(1, t.len());
        for (j, &tj) in t.iter().enumerate() {
            data[(0, j)] = f(tj);
        }
        data
    }

    fn grid(n: usize, span: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * span / (n - 1) as f64).collect()
    }

    #[test]
    fn test_linear_interpolation_slope() {
        let t = grid(11, 1.0);
        let data = sampled(|x| 3.0 * x + 1.0, &t);
        let method = CollocationMethod::interpolation(InterpolationMethod::Linear);
        let (du, u, t_out) = collocate_data(&data, &t, &method).unwrap();
        assert_eq!(t_out.len(), 11);
        for j in 0..11 {
            assert_near(du[(0, j)], 3.0, 1e-12);
            assert_near(u[(0, j)], data[(0, j)], 1e-15);
        }
    }

    #[test]
    fn test_quadratic_exact_on_quadratic() {
        let t = grid(15, 2.0);
        let data = sampled(|x| x * x - x, &t);
        let method = CollocationMethod::interpolation(InterpolationMethod::Quadratic);
        let (du, _, _) = collocate_data(&data, &t, &method).unwrap();
        for (j, &tj) in t.iter().enumerate() {
            assert_near(du[(0, j)], 2.0 * tj - 1.0, 1e-10);
        }
    }

    #[test]
    fn test_lagrange_exact_on_cubic() {
        let t = grid(6, 1.0);
        let data = sampled(|x| x.powi(3) - 2.0 * x, &t);
        let method = CollocationMethod::interpolation(InterpolationMethod::Lagrange);
        let (du, _, _) = collocate_data(&data, &t, &method).unwrap();
        for (j, &tj) in t.iter().enumerate() {
            assert_near(du[(0, j)], 3.0 * tj * tj - 2.0, 1e-9);
        }
    }

    #[test]
    fn test_cubic_spline_on_sine() {
        let t = grid(60, std::f64::consts::TAU);
        let data = sampled(f64::sin, &t);
        let method = CollocationMethod::interpolation(InterpolationMethod::CubicSpline);
        let (du, _, _) = collocate_data(&data, &t, &method).unwrap();
        // interior points; natural boundary conditions degrade the edges
        for (j, &tj) in t.iter().enumerate().skip(3).take(54) {
            assert_near(du[(0, j)], tj.cos(), 1e-3);
        }
    }

    #[test]
    fn test_bspline_exact_on_cubic() {
        let t = grid(12, 1.0);
        let data = sampled(|x| x.powi(3) + x, &t);
        let method =
            CollocationMethod::interpolation(InterpolationMethod::BSpline { degree: 3 });
        let (du, u, _) = collocate_data(&data, &t, &method).unwrap();
        for (j, &tj) in t.iter().enumerate() {
            assert_near(u[(0, j)], data[(0, j)], 1e-9);
            assert_near(du[(0, j)], 3.0 * tj * tj + 1.0, 1e-7);
        }
    }

    #[test]
    fn test_curve_fit_exact_on_quadratic() {
        let t = grid(20, 3.0);
        let data = sampled(|x| 0.5 * x * x + 2.0, &t);
        let method =
            CollocationMethod::interpolation(InterpolationMethod::CurveFit { degree: 2 });
        let (du, u, _) = collocate_data(&data, &t, &method).unwrap();
        for (j, &tj) in t.iter().enumerate() {
            assert_near(du[(0, j)], tj, 1e-9);
            assert_near(u[(0, j)], data[(0, j)], 1e-9);
        }
    }

    #[test]
    fn test_crop_drops_boundaries() {
        let t = grid(10, 1.0);
        let data = sampled(|x| x, &t);
        let method = CollocationMethod::Interpolation {
            method: InterpolationMethod::Linear,
            crop: true,
        };
        let (du, u, t_out) = collocate_data(&data, &t, &method).unwrap();
        assert_eq!(t_out.len(), 8);
        assert_eq!(du.ncols(), 8);
        assert_eq!(u.ncols(), 8);
        assert_near(t_out[0], t[1], 1e-15);
    }

    #[test]
    fn test_kernel_exact_on_quadratic() {
        // a local quadratic fit reproduces quadratic data exactly,
        // independent of the kernel
        let t = grid(25, 2.0);
        let data = sampled(|x| x * x, &t);
        for kernel in [
            CollocationKernel::Epanechnikov,
            CollocationKernel::Gaussian,
            CollocationKernel::Tricube,
            CollocationKernel::Logistic,
        ] {
            let method = CollocationMethod::kernel(kernel);
            let (du, _, _) = collocate_data(&data, &t, &method).unwrap();
            for (j, &tj) in t.iter().enumerate() {
                assert_near(du[(0, j)], 2.0 * tj, 1e-7);
            }
        }
    }

    #[test]
    fn test_kernel_smooths_noise() {
        let t = grid(80, 4.0);
        // deterministic small perturbation on a line
        let data = sampled(|x| 2.0 * x + 0.01 * (137.0 * x).sin(), &t);
        let method = CollocationMethod::kernel(CollocationKernel::Gaussian);
        let (du, u, _) = collocate_data(&data, &t, &method).unwrap();
        for (j, &tj) in t.iter().enumerate().skip(5).take(70) {
            assert_near(du[(0, j)], 2.0, 0.1);
            assert_near(u[(0, j)], 2.0 * tj, 0.05);
        }
    }

    #[test]
    fn test_too_few_points() {
        let t = vec![0.0, 1.0];
        let data = sampled(|x| x, &t);
        let method = CollocationMethod::kernel(CollocationKernel::Gaussian);
        assert!(matches!(
            collocate_data(&data, &t, &method),
            Err(DataDrivenError::Collocation(_))
        ));

        let method = CollocationMethod::interpolation(InterpolationMethod::CubicSpline);
        assert!(collocate_data(&data, &t, &method).is_err());
    }

    #[test]
    fn test_narrow_bandwidth_fails() {
        let t = grid(20, 10.0);
        let data = sampled(|x| x, &t);
        let method = CollocationMethod::Kernel {
            kernel: CollocationKernel::Uniform,
            bandwidth: Some(1e-4),
        };
        assert!(matches!(
            collocate_data(&data, &t, &method),
            Err(DataDrivenError::Collocation(_))
        ));
    }

    #[test]
    fn test_kernel_weights_shape() {
        for kernel in [
            CollocationKernel::Epanechnikov,
            CollocationKernel::Uniform,
            CollocationKernel::Triangular,
            CollocationKernel::Quartic,
            CollocationKernel::Triweight,
            CollocationKernel::Tricube,
            CollocationKernel::Cosine,
        ] {
            // compact support
            assert_eq!(kernel.weight(1.5), 0.0);
            assert!(kernel.weight(0.0) > 0.0);
            // symmetry
            assert_near(kernel.weight(0.3), kernel.weight(-0.3), 1e-15);
        }
        for kernel in [
            CollocationKernel::Gaussian,
            CollocationKernel::Logistic,
            CollocationKernel::Sigmoid,
            CollocationKernel::Silverman,
        ] {
            assert!(kernel.weight(1.5) > 0.0);
            assert!(kernel.weight(0.0) >= kernel.weight(2.0));
        }
    }
}
