use faer::Mat;

use crate::collocation::{collocate_data, CollocationMethod};
use crate::types::{DataDrivenError, Result};
use crate::utils::validate_matrix;

/// The causal structure of an estimation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    /// Direct mapping `f(x, p, t, u) -> y`.
    Direct,
    /// Time-discrete system `f(x[i], p, t, u) -> x[i+1]`.
    Discrete,
    /// Time-continuous system `f(x, p, t, u) -> dx/dt`.
    Continuous,
}

impl std::fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProblemKind::Direct => write!(f, "direct"),
            ProblemKind::Discrete => write!(f, "discrete"),
            ProblemKind::Continuous => write!(f, "continuous"),
        }
    }
}

/// Aligned (regressor input, target) views extracted from a problem,
/// ready for design-matrix evaluation and fitting.
#[derive(Debug, Clone)]
pub struct RegressionData {
    /// State columns the design matrix is evaluated at.
    pub states: Mat<f64>,
    /// Target aligned with `states` column by column.
    pub target: Mat<f64>,
    /// Time points aligned with `states`, when available.
    pub times: Option<Vec<f64>>,
    /// Control inputs aligned with `states`, when available.
    pub inputs: Option<Mat<f64>>,
}

/// A single estimation experiment: state measurements plus whatever else
/// was recorded.
///
/// Validated at construction and read-only afterwards; solvers never
/// mutate a problem.
#[derive(Debug, Clone)]
pub struct DataDrivenProblem {
    kind: ProblemKind,
    x: Mat<f64>,
    t: Option<Vec<f64>>,
    dx: Option<Mat<f64>>,
    y: Option<Mat<f64>>,
    u: Option<Mat<f64>>,
    p: Vec<f64>,
    name: String,
}

impl DataDrivenProblem {
    /// Construct a problem of the given kind from raw arrays.
    ///
    /// Fails with a validation error when required fields for the kind are
    /// missing or the sample-count dimension disagrees across fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: ProblemKind,
        x: Mat<f64>,
        t: Option<Vec<f64>>,
        dx: Option<Mat<f64>>,
        u: Option<Mat<f64>>,
        y: Option<Mat<f64>>,
        p: Option<Vec<f64>>,
        name: Option<&str>,
    ) -> Result<Self> {
        let prob = Self {
            kind,
            x,
            t,
            dx,
            y,
            u,
            p: p.unwrap_or_default(),
            name: name.unwrap_or("").to_string(),
        };
        prob.validate()?;
        Ok(prob)
    }

    /// A direct problem `x -> y`.
    pub fn direct(x: Mat<f64>, y: Mat<f64>) -> Result<Self> {
        Self::new(ProblemKind::Direct, x, None, None, None, Some(y), None, None)
    }

    /// A discrete problem from state measurements alone (unit time step).
    pub fn discrete(x: Mat<f64>) -> Result<Self> {
        Self::new(ProblemKind::Discrete, x, None, None, None, None, None, None)
    }

    /// A continuous problem with measured derivatives.
    pub fn continuous(x: Mat<f64>, dx: Mat<f64>) -> Result<Self> {
        Self::new(
            ProblemKind::Continuous,
            x,
            None,
            Some(dx),
            None,
            None,
            None,
            None,
        )
    }

    /// A continuous problem without measured derivatives; they are
    /// estimated from `(x, t)` by collocation, either eagerly via
    /// [`DataDrivenProblem::collocate`] or by the solve entry point with
    /// its default method.
    pub fn continuous_with_time(x: Mat<f64>, t: Vec<f64>) -> Result<Self> {
        Self::new(
            ProblemKind::Continuous,
            x,
            Some(t),
            None,
            None,
            None,
            None,
            None,
        )
    }

    /// A continuous problem with derivatives estimated immediately using
    /// the given collocation method. The states are replaced by their
    /// smoothed estimates.
    pub fn continuous_collocated(
        x: Mat<f64>,
        t: Vec<f64>,
        method: &CollocationMethod,
    ) -> Result<Self> {
        Self::continuous_with_time(x, t)?.collocate(method)
    }

    /// Attach explicit time points, re-validating sample agreement.
    pub fn with_time(mut self, t: Vec<f64>) -> Result<Self> {
        self.t = Some(t);
        self.validate()?;
        Ok(self)
    }

    /// Attach measured control inputs, re-validating sample agreement.
    pub fn with_inputs(mut self, u: Mat<f64>) -> Result<Self> {
        self.u = Some(u);
        self.validate()?;
        Ok(self)
    }

    /// Attach a control signal as a callable `u(x, p, t)`, sampled at the
    /// problem's time points (unit steps when no time is attached) and
    /// stored as a plain input matrix.
    pub fn with_input_fn(self, f: impl Fn(&[f64], &[f64], f64) -> Vec<f64>) -> Result<Self> {
        let m = self.x.ncols();
        let n = self.x.nrows();
        let mut state = vec![0.0; n];
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(m);
        for j in 0..m {
            for i in 0..n {
                state[i] = self.x[(i, j)];
            }
            let time = match &self.t {
                Some(t) => t[j],
                None => j as f64,
            };
            columns.push(f(&state, &self.p, time));
        }
        let n_inputs = columns.first().map(|c| c.len()).unwrap_or(0);
        if n_inputs == 0 || columns.iter().any(|c| c.len() != n_inputs) {
            return Err(DataDrivenError::Validation(
                "input function must return a fixed, nonzero number of inputs".into(),
            ));
        }
        let mut u = Mat::<f64>::zeros(n_inputs, m);
        for (j, col) in columns.iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                u[(i, j)] = v;
            }
        }
        self.with_inputs(u)
    }

    /// Attach known parameters.
    pub fn with_parameters(mut self, p: Vec<f64>) -> Self {
        self.p = p;
        self
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    fn validate(&self) -> Result<()> {
        validate_matrix(&self.x, 1, 2)?;
        let m = self.x.ncols();

        if let Some(t) = &self.t {
            if t.len() != m {
                return Err(DataDrivenError::Validation(format!(
                    "X has {m} samples, t has {}",
                    t.len()
                )));
            }
            if t.windows(2).any(|w| w[1] <= w[0]) {
                return Err(DataDrivenError::Validation(
                    "time points must be strictly increasing".into(),
                ));
            }
            if t.iter().any(|v| !v.is_finite()) {
                return Err(DataDrivenError::Validation(
                    "time points must be finite".into(),
                ));
            }
        }
        if let Some(dx) = &self.dx {
            validate_matrix(dx, 1, 2)?;
            if dx.nrows() != self.x.nrows() || dx.ncols() != m {
                return Err(DataDrivenError::Validation(format!(
                    "DX is {}x{}, expected {}x{m}",
                    dx.nrows(),
                    dx.ncols(),
                    self.x.nrows()
                )));
            }
        }
        if let Some(y) = &self.y {
            validate_matrix(y, 1, 2)?;
            if y.ncols() != m {
                return Err(DataDrivenError::Validation(format!(
                    "Y has {} samples, X has {m}",
                    y.ncols()
                )));
            }
        }
        if let Some(u) = &self.u {
            validate_matrix(u, 1, 2)?;
            if u.ncols() != m {
                return Err(DataDrivenError::Validation(format!(
                    "U has {} samples, X has {m}",
                    u.ncols()
                )));
            }
        }

        match self.kind {
            ProblemKind::Direct => {
                if self.y.is_none() {
                    return Err(DataDrivenError::Validation(
                        "a direct problem requires output measurements Y".into(),
                    ));
                }
            }
            ProblemKind::Discrete => {}
            ProblemKind::Continuous => {
                if self.dx.is_none() && self.t.is_none() {
                    return Err(DataDrivenError::Validation(
                        "a continuous problem requires DX, or t for collocation".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    pub fn x(&self) -> &Mat<f64> {
        &self.x
    }

    pub fn t(&self) -> Option<&[f64]> {
        self.t.as_deref()
    }

    pub fn dx(&self) -> Option<&Mat<f64>> {
        self.dx.as_ref()
    }

    pub fn y(&self) -> Option<&Mat<f64>> {
        self.y.as_ref()
    }

    pub fn u(&self) -> Option<&Mat<f64>> {
        self.u.as_ref()
    }

    pub fn p(&self) -> &[f64] {
        &self.p
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_states(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.x.ncols()
    }

    /// Number of samples entering the regression for this problem's kind.
    /// Discrete problems lose one sample to the shift pairing.
    pub fn regression_samples(&self) -> usize {
        match self.kind {
            ProblemKind::Discrete => self.x.ncols() - 1,
            _ => self.x.ncols(),
        }
    }

    /// True when a continuous problem still needs collocation to obtain
    /// derivatives.
    pub fn needs_collocation(&self) -> bool {
        self.kind == ProblemKind::Continuous && self.dx.is_none()
    }

    /// Estimate derivatives by collocation, returning a new problem whose
    /// states are the smoothed estimates and whose derivatives are filled.
    ///
    /// Requires time points. Inputs are cropped alongside the states when
    /// the method drops boundary samples.
    pub fn collocate(&self, method: &CollocationMethod) -> Result<Self> {
        if self.kind != ProblemKind::Continuous {
            return Err(DataDrivenError::Collocation(format!(
                "collocation applies to continuous problems, this one is {}",
                self.kind
            )));
        }
        let t = self.t.as_ref().ok_or_else(|| {
            DataDrivenError::Collocation("collocation requires time points".into())
        })?;

        let (du, u_smooth, t_out) = collocate_data(&self.x, t, method)?;

        // Boundary cropping removes the first and last sample; inputs
        // follow the same slicing.
        let cropped = t_out.len() != t.len();
        let inputs = match &self.u {
            Some(u) if cropped => Some(u.subcols(1, u.ncols() - 2).to_owned()),
            Some(u) => Some(u.clone()),
            None => None,
        };

        Self::new(
            ProblemKind::Continuous,
            u_smooth,
            Some(t_out),
            Some(du),
            inputs,
            None,
            Some(self.p.clone()),
            Some(self.name.as_str()),
        )
    }

    /// Extract the aligned (regressor input, target) pair for fitting.
    ///
    /// For discrete problems this is the shift pairing (X[:, :-1],
    /// X[:, 1:]); for continuous problems the derivative must already be
    /// present (see [`DataDrivenProblem::collocate`]).
    pub fn regression_data(&self) -> Result<RegressionData> {
        match self.kind {
            ProblemKind::Direct => Ok(RegressionData {
                states: self.x.clone(),
                target: self.y.as_ref().unwrap().clone(),
                times: self.t.clone(),
                inputs: self.u.clone(),
            }),
            ProblemKind::Discrete => {
                let m = self.x.ncols();
                Ok(RegressionData {
                    states: self.x.subcols(0, m - 1).to_owned(),
                    target: self.x.subcols(1, m - 1).to_owned(),
                    times: self.t.as_ref().map(|t| t[..m - 1].to_vec()),
                    inputs: self.u.as_ref().map(|u| u.subcols(0, m - 1).to_owned()),
                })
            }
            ProblemKind::Continuous => {
                let dx = self.dx.as_ref().ok_or_else(|| {
                    DataDrivenError::Validation(
                        "continuous problem has no derivatives; collocate first".into(),
                    )
                })?;
                Ok(RegressionData {
                    states: self.x.clone(),
                    target: dx.clone(),
                    times: self.t.clone(),
                    inputs: self.u.clone(),
                })
            }
        }
    }
}

/// An external trajectory a problem can be sampled from.
///
/// `evaluate_at` re-evaluates the underlying model at a time point;
/// `interpolate_at` queries the stored interpolant instead.
pub trait TrajectorySolution {
    fn time_points(&self) -> Vec<f64>;
    fn evaluate_at(&self, t: f64) -> Vec<f64>;
    fn interpolate_at(&self, t: f64) -> Vec<f64>;
    /// Derivative at a time point, when the trajectory can provide it.
    fn derivative_at(&self, _t: f64) -> Option<Vec<f64>> {
        None
    }
    fn parameters(&self) -> Vec<f64> {
        Vec::new()
    }
}

/// Build a continuous problem by sampling a trajectory at its own time
/// grid with its stored parameters.
///
/// With `use_interpolation` the stored interpolant is queried instead of
/// re-evaluating the underlying model. Derivatives are taken from the
/// trajectory when it provides them; otherwise the problem is left for
/// collocation.
pub fn from_trajectory(
    traj: &dyn TrajectorySolution,
    use_interpolation: bool,
) -> Result<DataDrivenProblem> {
    let t = traj.time_points();
    if t.len() < 2 {
        return Err(DataDrivenError::Validation(
            "trajectory must contain at least 2 time points".into(),
        ));
    }

    let first = if use_interpolation {
        traj.interpolate_at(t[0])
    } else {
        traj.evaluate_at(t[0])
    };
    let n = first.len();
    if n == 0 {
        return Err(DataDrivenError::Validation(
            "trajectory produced an empty state".into(),
        ));
    }

    let mut x = Mat::<f64>::zeros(n, t.len());
    for (j, &tj) in t.iter().enumerate() {
        let state = if use_interpolation {
            traj.interpolate_at(tj)
        } else {
            traj.evaluate_at(tj)
        };
        if state.len() != n {
            return Err(DataDrivenError::Validation(
                "trajectory state dimension changed between samples".into(),
            ));
        }
        for (i, &v) in state.iter().enumerate() {
            x[(i, j)] = v;
        }
    }

    let derivatives: Option<Vec<Vec<f64>>> = t.iter().map(|&tj| traj.derivative_at(tj)).collect();
    let dx = derivatives.map(|cols| {
        let mut dx = Mat::<f64>::zeros(n, t.len());
        for (j, col) in cols.iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                dx[(i, j)] = v;
            }
        }
        dx
    });

    DataDrivenProblem::new(
        ProblemKind::Continuous,
        x,
        Some(t),
        dx,
        None,
        None,
        Some(traj.parameters()),
        None,
    )
}

/// An ordered collection of problems of the same kind, pooled for joint
/// inference.
#[derive(Debug, Clone)]
pub struct DataDrivenDataset {
    problems: Vec<DataDrivenProblem>,
    name: String,
}

impl DataDrivenDataset {
    /// Collect problems into a dataset.
    ///
    /// Fails with a validation error when the collection is empty or the
    /// problems disagree in kind, state dimension, or input dimension.
    pub fn new(problems: Vec<DataDrivenProblem>, name: Option<&str>) -> Result<Self> {
        let first = problems.first().ok_or_else(|| {
            DataDrivenError::Validation("dataset requires at least one problem".into())
        })?;
        let kind = first.kind();
        let n_states = first.n_states();
        let n_inputs = first.u().map(|u| u.nrows());

        for (i, prob) in problems.iter().enumerate() {
            if prob.kind() != kind {
                return Err(DataDrivenError::Validation(format!(
                    "problem {} is {}, dataset is {kind}",
                    i + 1,
                    prob.kind()
                )));
            }
            if prob.n_states() != n_states {
                return Err(DataDrivenError::Validation(format!(
                    "problem {} has {} states, dataset has {n_states}",
                    i + 1,
                    prob.n_states()
                )));
            }
            if prob.u().map(|u| u.nrows()) != n_inputs {
                return Err(DataDrivenError::Validation(format!(
                    "problem {} disagrees on input dimension",
                    i + 1
                )));
            }
        }

        Ok(Self {
            problems,
            name: name.unwrap_or("").to_string(),
        })
    }

    pub fn kind(&self) -> ProblemKind {
        self.problems[0].kind()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn problems(&self) -> &[DataDrivenProblem] {
        &self.problems
    }

    /// Per-problem regression sample counts. Their sum equals the pooled
    /// design-matrix column count, so per-trajectory slices can be
    /// reconstructed from pooled results.
    pub fn sizes(&self) -> Vec<usize> {
        self.problems
            .iter()
            .map(|p| p.regression_samples())
            .collect()
    }

    /// Concatenate every member's regression pair, column-wise, in order.
    ///
    /// Times are pooled only when every member carries them; inputs
    /// likewise.
    pub fn pooled(&self) -> Result<RegressionData> {
        let parts: Vec<RegressionData> = self
            .problems
            .iter()
            .map(|p| p.regression_data())
            .collect::<Result<_>>()?;

        let n_states = parts[0].states.nrows();
        let n_target = parts[0].target.nrows();
        let total: usize = parts.iter().map(|r| r.states.ncols()).sum();

        let mut states = Mat::<f64>::zeros(n_states, total);
        let mut target = Mat::<f64>::zeros(n_target, total);
        let mut offset = 0;
        for part in &parts {
            if part.target.nrows() != n_target {
                return Err(DataDrivenError::Validation(
                    "dataset members disagree on target dimension".into(),
                ));
            }
            for j in 0..part.states.ncols() {
                for i in 0..n_states {
                    states[(i, offset + j)] = part.states[(i, j)];
                }
                for i in 0..n_target {
                    target[(i, offset + j)] = part.target[(i, j)];
                }
            }
            offset += part.states.ncols();
        }

        let times = if parts.iter().all(|r| r.times.is_some()) {
            Some(
                parts
                    .iter()
                    .flat_map(|r| r.times.as_ref().unwrap().iter().copied())
                    .collect(),
            )
        } else {
            None
        };

        let inputs = if parts.iter().all(|r| r.inputs.is_some()) {
            let n_inputs = parts[0].inputs.as_ref().unwrap().nrows();
            let mut u = Mat::<f64>::zeros(n_inputs, total);
            let mut offset = 0;
            for part in &parts {
                let pu = part.inputs.as_ref().unwrap();
                for j in 0..pu.ncols() {
                    for i in 0..n_inputs {
                        u[(i, offset + j)] = pu[(i, j)];
                    }
                }
                offset += pu.ncols();
            }
            Some(u)
        } else {
            None
        };

        Ok(RegressionData {
            states,
            target,
            times,
            inputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n_states: usize, m: usize) -> Mat<f64> {
        let mut x = Mat::<f64>::zeros(n_states, m);
        for j in 0..m {
            for i in 0..n_states {
                x[(i, j)] = (i + 1) as f64 + j as f64 * 0.1;
            }
        }
        x
    }

    #[test]
    fn test_discrete_from_states_alone() {
        let prob = DataDrivenProblem::discrete(ramp(2, 10)).unwrap();
        assert_eq!(prob.kind(), ProblemKind::Discrete);
        assert!(prob.t().is_none());
        assert_eq!(prob.regression_samples(), 9);

        let reg = prob.regression_data().unwrap();
        assert_eq!(reg.states.ncols(), 9);
        assert_eq!(reg.target.ncols(), 9);
        // shift pairing
        assert_eq!(reg.target[(0, 0)], prob.x()[(0, 1)]);
    }

    #[test]
    fn test_continuous_requires_dx_or_t() {
        let err = DataDrivenProblem::new(
            ProblemKind::Continuous,
            ramp(2, 10),
            None,
            None,
            None,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DataDrivenError::Validation(_)));
    }

    #[test]
    fn test_direct_requires_y() {
        let err = DataDrivenProblem::new(
            ProblemKind::Direct,
            ramp(2, 10),
            None,
            None,
            None,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DataDrivenError::Validation(_)));

        let y = ramp(1, 10);
        let prob = DataDrivenProblem::direct(ramp(2, 10), y).unwrap();
        assert_eq!(prob.regression_samples(), 10);
    }

    #[test]
    fn test_sample_count_mismatch() {
        let x = ramp(2, 10);
        let dx = ramp(2, 9);
        assert!(DataDrivenProblem::continuous(x, dx).is_err());

        let prob = DataDrivenProblem::discrete(ramp(2, 10)).unwrap();
        assert!(prob.with_time((0..9).map(|i| i as f64).collect()).is_err());
    }

    #[test]
    fn test_time_must_increase() {
        let x = ramp(1, 3);
        let err = DataDrivenProblem::continuous_with_time(x, vec![0.0, 2.0, 1.0]).unwrap_err();
        assert!(matches!(err, DataDrivenError::Validation(_)));
    }

    #[test]
    fn test_input_function_sampling() {
        let prob = DataDrivenProblem::discrete(ramp(2, 5))
            .unwrap()
            .with_input_fn(|_x, _p, t| vec![t * t])
            .unwrap();
        let u = prob.u().unwrap();
        assert_eq!(u.nrows(), 1);
        // unit steps when no time attached
        assert_eq!(u[(0, 3)], 9.0);
    }

    #[test]
    fn test_from_trajectory() {
        struct Exponential;
        impl TrajectorySolution for Exponential {
            fn time_points(&self) -> Vec<f64> {
                (0..20).map(|i| i as f64 * 0.1).collect()
            }
            fn evaluate_at(&self, t: f64) -> Vec<f64> {
                vec![(-0.5 * t).exp()]
            }
            fn interpolate_at(&self, t: f64) -> Vec<f64> {
                // a deliberately coarse interpolant, to tell the paths apart
                vec![1.0 - 0.5 * t]
            }
            fn derivative_at(&self, t: f64) -> Option<Vec<f64>> {
                Some(vec![-0.5 * (-0.5 * t).exp()])
            }
            fn parameters(&self) -> Vec<f64> {
                vec![0.5]
            }
        }

        let prob = from_trajectory(&Exponential, false).unwrap();
        assert_eq!(prob.kind(), ProblemKind::Continuous);
        assert_eq!(prob.n_samples(), 20);
        assert_eq!(prob.p(), &[0.5]);
        assert!((prob.x()[(0, 10)] - (-0.5_f64).exp()).abs() < 1e-12);
        assert!(prob.dx().is_some());

        let interp = from_trajectory(&Exponential, true).unwrap();
        assert!((interp.x()[(0, 10)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dataset_kind_mismatch() {
        let a = DataDrivenProblem::discrete(ramp(2, 10)).unwrap();
        let b = DataDrivenProblem::continuous(ramp(2, 10), ramp(2, 10)).unwrap();
        let err = DataDrivenDataset::new(vec![a, b], None).unwrap_err();
        assert!(matches!(err, DataDrivenError::Validation(_)));
    }

    #[test]
    fn test_dataset_sizes_and_pooling() {
        let probs = vec![
            DataDrivenProblem::discrete(ramp(2, 10)).unwrap(),
            DataDrivenProblem::discrete(ramp(2, 6)).unwrap(),
            DataDrivenProblem::discrete(ramp(2, 8)).unwrap(),
        ];
        let dataset = DataDrivenDataset::new(probs, Some("experiments")).unwrap();
        assert_eq!(dataset.sizes(), vec![9, 5, 7]);

        let pooled = dataset.pooled().unwrap();
        assert_eq!(pooled.states.ncols(), 21);
        assert_eq!(pooled.target.ncols(), 21);
        assert_eq!(
            dataset.sizes().iter().sum::<usize>(),
            pooled.states.ncols()
        );
    }
}
