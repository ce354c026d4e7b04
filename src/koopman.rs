//! Spectral operator identification from snapshot pairs.
//!
//! Approximates the dynamics as a linear operator A mapping one (possibly
//! basis-lifted) snapshot to the next, or to its derivative:
//!
//! 1. Truncated SVD of the snapshot matrix: Z ≈ U Σ Vᵀ
//! 2. Reduced operator: Ã = Uᵀ Z′ V Σ⁻¹
//! 3. Eigendecomposition: Ã W = W Λ
//! 4. Modes: Φ = Z′ V Σ⁻¹ W
//! 5. Full operator: A = Z′ V Σ⁻¹ Uᵀ
//!
//! The truncation rank is either supplied or chosen by the optimal
//! hard-threshold rule also used for denoising.

use faer::{c64, Mat};

use crate::types::{DataDrivenError, Result};
use crate::utils::{frobenius_distance_sq, optimal_rank, validate_matrix};

/// Configuration for the spectral solver.
#[derive(Debug, Clone, Default)]
pub struct KoopmanOptions {
    /// Truncation rank. None selects the rank by the optimal hard
    /// threshold on the singular values.
    pub rank: Option<usize>,
}

/// Result of a spectral operator identification.
#[derive(Debug, Clone)]
pub struct KoopmanResult {
    /// Full operator A on the (lifted) snapshot space, `Z' ~ A Z`.
    pub operator: Mat<f64>,
    /// Reduced operator Ã (rank x rank).
    pub reduced_operator: Mat<f64>,
    /// Eigenvalues of the reduced operator.
    pub eigenvalues: Vec<c64>,
    /// Modes Φ, real part (snapshot dim x rank).
    pub modes_re: Mat<f64>,
    /// Modes Φ, imaginary part.
    pub modes_im: Mat<f64>,
    /// Continuous-time generator eigenvalues: the operator eigenvalues
    /// themselves for derivative pairs, log(lambda)/dt for shift pairs.
    pub generator_eigenvalues: Vec<c64>,
    /// Truncation rank used.
    pub rank: usize,
    /// Relative Frobenius reconstruction residual of `Z' - A Z`.
    pub residual: f64,
    /// Whether the target was a derivative pair.
    pub continuous: bool,
    /// Time step between snapshots (shift pairs).
    pub dt: f64,
}

/// Identify the linear operator mapping `z` to `z_prime`.
///
/// `z` and `z_prime` are aligned (snapshot dim x samples) matrices:
/// the time-shifted state for discrete problems, the derivative for
/// continuous ones. Set `continuous` accordingly so the generator
/// eigenvalues are mapped correctly; `dt` is the snapshot spacing used
/// for the discrete-to-continuous eigenvalue map.
pub fn koopman_operator(
    z: &Mat<f64>,
    z_prime: &Mat<f64>,
    continuous: bool,
    dt: f64,
    options: &KoopmanOptions,
) -> Result<KoopmanResult> {
    validate_matrix(z, 1, 2)?;
    validate_matrix(z_prime, 1, 2)?;
    if z.nrows() != z_prime.nrows() || z.ncols() != z_prime.ncols() {
        return Err(DataDrivenError::Validation(format!(
            "snapshot pair disagrees: {}x{} vs {}x{}",
            z.nrows(),
            z.ncols(),
            z_prime.nrows(),
            z_prime.ncols()
        )));
    }
    if dt <= 0.0 {
        return Err(DataDrivenError::Configuration(
            "snapshot spacing dt must be positive".into(),
        ));
    }

    let n = z.nrows();

    // SVD of the snapshot matrix
    let svd = z
        .svd()
        .map_err(|e| DataDrivenError::Numerical(format!("SVD failed: {e:?}")))?;
    let u_full = svd.U();
    let v_full = svd.V();
    let s_col = svd.S().column_vector();

    let n_sv = s_col.nrows();
    let s_vals: Vec<f64> = (0..n_sv).map(|i| s_col[i]).collect();
    if s_vals.iter().all(|&s| s <= 0.0) {
        return Err(DataDrivenError::Numerical(
            "snapshot matrix has a zero spectrum".into(),
        ));
    }

    let rank = match options.rank {
        Some(r) => r.clamp(1, n_sv),
        None => optimal_rank(&s_vals, z.nrows(), z.ncols()),
    };

    // Truncate to rank r
    let u = u_full.subcols(0, rank).to_owned();
    let v = v_full.subcols(0, rank).to_owned();
    let s: Vec<f64> = s_vals[..rank].to_vec();

    // Z' V Σ⁻¹, shared by the reduced operator, the modes, and A
    let zp_v = z_prime * &v;
    let mut zp_v_sinv = Mat::<f64>::zeros(n, rank);
    for i in 0..n {
        for j in 0..rank {
            zp_v_sinv[(i, j)] = zp_v[(i, j)] / s[j];
        }
    }

    // Reduced operator: Ã = Uᵀ (Z' V Σ⁻¹)
    let reduced_operator = u.transpose() * &zp_v_sinv;

    // Full operator: A = (Z' V Σ⁻¹) Uᵀ
    let operator = &zp_v_sinv * u.transpose();

    // Eigendecomposition of Ã
    let eigen = reduced_operator
        .as_ref()
        .eigen()
        .map_err(|e| DataDrivenError::Numerical(format!("eigendecomposition failed: {e:?}")))?;
    let eigenvalues_diag = eigen.S().column_vector();
    let eigenvectors = eigen.U();

    let mut eigenvalues = Vec::with_capacity(rank);
    let mut w_re = Mat::<f64>::zeros(rank, rank);
    let mut w_im = Mat::<f64>::zeros(rank, rank);
    for j in 0..rank {
        let ev = eigenvalues_diag[j];
        eigenvalues.push(c64::new(ev.re, ev.im));
        for i in 0..rank {
            let w = eigenvectors[(i, j)];
            w_re[(i, j)] = w.re;
            w_im[(i, j)] = w.im;
        }
    }

    // Modes: Φ = (Z' V Σ⁻¹) W
    let modes_re = &zp_v_sinv * &w_re;
    let modes_im = &zp_v_sinv * &w_im;

    // Generator eigenvalues
    let generator_eigenvalues = if continuous {
        eigenvalues.clone()
    } else {
        eigenvalues
            .iter()
            .map(|ev| {
                let r = (ev.re * ev.re + ev.im * ev.im).sqrt();
                let theta = ev.im.atan2(ev.re);
                c64::new(r.ln() / dt, theta / dt)
            })
            .collect()
    };

    // Reconstruction residual, relative to the target norm
    let recon = &operator * z;
    let err_sq = frobenius_distance_sq(z_prime, &recon);
    let mut norm_sq = 0.0;
    for j in 0..z.ncols() {
        for i in 0..n {
            norm_sq += z_prime[(i, j)] * z_prime[(i, j)];
        }
    }
    let residual = if norm_sq > 0.0 {
        (err_sq / norm_sq).sqrt()
    } else {
        err_sq.sqrt()
    };

    Ok(KoopmanResult {
        operator,
        reduced_operator,
        eigenvalues,
        modes_re,
        modes_im,
        generator_eigenvalues,
        rank,
        residual,
        continuous,
        dt,
    })
}

impl KoopmanResult {
    /// Snapshot-space dimension of the identified operator.
    pub fn dim(&self) -> usize {
        self.operator.nrows()
    }

    /// Largest eigenvalue magnitude.
    pub fn spectral_radius(&self) -> f64 {
        self.eigenvalues
            .iter()
            .map(|ev| (ev.re * ev.re + ev.im * ev.im).sqrt())
            .fold(0.0_f64, f64::max)
    }
}
