/// Error types for model discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DataDrivenError {
    /// Malformed basis or algorithm options, undeclared variables.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Shape or kind mismatches during problem/dataset construction.
    #[error("validation error: {0}")]
    Validation(String),

    /// Insufficient data for the chosen derivative estimation method.
    #[error("collocation error: {0}")]
    Collocation(String),

    /// Rank-deficient decomposition or non-finite values entering a solver.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// A metric was requested that is undefined for the given fit.
    #[error("not applicable: {0}")]
    NotApplicable(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DataDrivenError>;

/// Termination status of a solver run.
///
/// Carried on the solution rather than raised: exhausting the iteration
/// budget returns the best coefficients found together with `MaxIters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// The solver's own termination condition signalled success.
    Success,
    /// Iteration budget exhausted before the support stabilized.
    MaxIters,
    /// The solver hit a numerical problem and returned a best-effort result.
    Failed,
}

impl ReturnCode {
    /// True iff the solver converged by its own criterion.
    pub fn is_success(&self) -> bool {
        matches!(self, ReturnCode::Success)
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnCode::Success => write!(f, "success"),
            ReturnCode::MaxIters => write!(f, "maximum iterations reached"),
            ReturnCode::Failed => write!(f, "failed"),
        }
    }
}

/// How regressor rows of the design matrix (and target rows) are scaled
/// before fitting. Recorded scales are inverted on the output coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataNormalization {
    /// No scaling.
    #[default]
    None,
    /// Scale each row to unit Euclidean norm.
    UnitNorm,
    /// Scale each row by its maximum absolute value.
    MaxAbs,
}

/// Sample-split specification applied before fitting.
///
/// `split` is the fraction of samples (leading columns) used for the fit;
/// the remainder, if any, is used to evaluate residuals.
#[derive(Debug, Clone, Copy)]
pub struct DataProcessing {
    /// Training fraction in (0, 1]. Default: 1.0 (fit on everything).
    pub split: f64,
}

impl Default for DataProcessing {
    fn default() -> Self {
        Self { split: 1.0 }
    }
}

impl DataProcessing {
    /// Number of training columns for `n` total samples. Always at least 1.
    pub fn train_len(&self, n: usize) -> usize {
        let k = (self.split * n as f64).ceil() as usize;
        k.clamp(1, n)
    }
}

/// Options shared by every solver family.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Maximum iterations for iterative solvers. Default: 100.
    pub maxiters: usize,
    /// Absolute tolerance on coefficient change. Default: sqrt(machine eps).
    pub abstol: f64,
    /// Relative tolerance on coefficient change. Default: sqrt(machine eps).
    pub reltol: f64,
    /// Emit per-iteration progress lines. Observability only, never
    /// affects results.
    pub progress: bool,
    /// Emit a summary line after the solve.
    pub verbose: bool,
    /// Denoise design and target via optimal hard-threshold singular value
    /// truncation before fitting. Default: false.
    pub denoise: bool,
    /// Regressor/target scaling applied before fitting.
    pub normalize: DataNormalization,
    /// Train/test sample split.
    pub data_processing: DataProcessing,
    /// Significant digits for reported coefficients. Default: 10.
    pub digits: u32,
    /// Render the recovered equations eagerly at assembly.
    pub eval_expression: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            maxiters: 100,
            abstol: f64::EPSILON.sqrt(),
            reltol: f64::EPSILON.sqrt(),
            progress: false,
            verbose: false,
            denoise: false,
            normalize: DataNormalization::None,
            data_processing: DataProcessing::default(),
            digits: 10,
            eval_expression: false,
        }
    }
}
