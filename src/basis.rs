use faer::Mat;

use crate::types::{DataDrivenError, Result};

/// A variable reference inside a candidate function.
///
/// Indices refer to the arities declared on the enclosing [`Basis`];
/// referencing an index outside the declared range is a configuration
/// error caught at basis construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    /// State variable `x_{i+1}`.
    State(usize),
    /// Exogenous control input `u_{i+1}`.
    Control(usize),
    /// Known parameter `p_{i+1}`.
    Parameter(usize),
    /// Independent variable `t`.
    Independent,
    /// Implicit (measured target) variable `dx_{i+1}`.
    Implicit(usize),
}

/// A closed-form candidate function over declared variables.
///
/// This is deliberately not a general symbolic algebra system: it is just
/// enough structure to evaluate candidate functions numerically, render
/// them deterministically, and let the generators build libraries.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(f64),
    Var(Variable),
    /// Integer power of a subexpression.
    Pow(Box<Expression>, i32),
    Mul(Vec<Expression>),
    Add(Vec<Expression>),
    Sin(Box<Expression>),
    Cos(Box<Expression>),
    Exp(Box<Expression>),
    /// Chebyshev polynomial of the first kind, `T_n(arg)`.
    Chebyshev(usize, Box<Expression>),
}

/// One sample point handed to expression evaluation.
#[derive(Clone, Copy)]
struct Sample<'a> {
    states: &'a [f64],
    controls: &'a [f64],
    parameters: &'a [f64],
    time: f64,
    implicits: &'a [f64],
}

impl Expression {
    /// Convenience constructor for a state variable term.
    pub fn state(i: usize) -> Self {
        Expression::Var(Variable::State(i))
    }

    /// Convenience constructor for a control variable term.
    pub fn control(i: usize) -> Self {
        Expression::Var(Variable::Control(i))
    }

    /// Convenience constructor for a parameter term.
    pub fn parameter(i: usize) -> Self {
        Expression::Var(Variable::Parameter(i))
    }

    /// Convenience constructor for an implicit variable term.
    pub fn implicit(i: usize) -> Self {
        Expression::Var(Variable::Implicit(i))
    }

    fn eval(&self, s: &Sample<'_>) -> f64 {
        match self {
            Expression::Constant(c) => *c,
            Expression::Var(v) => match v {
                Variable::State(i) => s.states[*i],
                Variable::Control(i) => s.controls.get(*i).copied().unwrap_or(0.0),
                Variable::Parameter(i) => s.parameters[*i],
                Variable::Independent => s.time,
                Variable::Implicit(i) => s.implicits[*i],
            },
            Expression::Pow(inner, e) => inner.eval(s).powi(*e),
            Expression::Mul(factors) => factors.iter().map(|f| f.eval(s)).product(),
            Expression::Add(terms) => terms.iter().map(|f| f.eval(s)).sum(),
            Expression::Sin(inner) => inner.eval(s).sin(),
            Expression::Cos(inner) => inner.eval(s).cos(),
            Expression::Exp(inner) => inner.eval(s).exp(),
            Expression::Chebyshev(order, inner) => chebyshev(*order, inner.eval(s)),
        }
    }

    /// Visit every variable reference in the expression.
    fn visit_vars(&self, f: &mut impl FnMut(Variable)) {
        match self {
            Expression::Constant(_) => {}
            Expression::Var(v) => f(*v),
            Expression::Pow(inner, _)
            | Expression::Sin(inner)
            | Expression::Cos(inner)
            | Expression::Exp(inner)
            | Expression::Chebyshev(_, inner) => inner.visit_vars(f),
            Expression::Mul(list) | Expression::Add(list) => {
                for e in list {
                    e.visit_vars(f);
                }
            }
        }
    }

    /// Implicit variable indices referenced by this expression.
    pub fn implicit_indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.visit_vars(&mut |v| {
            if let Variable::Implicit(i) = v {
                if !out.contains(&i) {
                    out.push(i);
                }
            }
        });
        out.sort_unstable();
        out
    }

    /// Constant folding plus product/sum flattening. Does not reorder terms,
    /// so rendering stays deterministic.
    pub fn simplify(self) -> Expression {
        match self {
            Expression::Pow(inner, e) => {
                let inner = inner.simplify();
                match (inner, e) {
                    (_, 0) => Expression::Constant(1.0),
                    (x, 1) => x,
                    (Expression::Constant(c), e) => Expression::Constant(c.powi(e)),
                    (x, e) => Expression::Pow(Box::new(x), e),
                }
            }
            Expression::Mul(factors) => {
                let mut flat = Vec::new();
                let mut constant = 1.0;
                for f in factors {
                    match f.simplify() {
                        Expression::Constant(c) => constant *= c,
                        Expression::Mul(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                if constant == 0.0 {
                    return Expression::Constant(0.0);
                }
                if constant != 1.0 {
                    flat.insert(0, Expression::Constant(constant));
                }
                match flat.len() {
                    0 => Expression::Constant(1.0),
                    1 => flat.pop().unwrap(),
                    _ => Expression::Mul(flat),
                }
            }
            Expression::Add(terms) => {
                let mut flat = Vec::new();
                let mut constant = 0.0;
                for t in terms {
                    match t.simplify() {
                        Expression::Constant(c) => constant += c,
                        Expression::Add(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                if constant != 0.0 {
                    flat.push(Expression::Constant(constant));
                }
                match flat.len() {
                    0 => Expression::Constant(0.0),
                    1 => flat.pop().unwrap(),
                    _ => Expression::Add(flat),
                }
            }
            Expression::Sin(inner) => Expression::Sin(Box::new(inner.simplify())),
            Expression::Cos(inner) => Expression::Cos(Box::new(inner.simplify())),
            Expression::Exp(inner) => Expression::Exp(Box::new(inner.simplify())),
            Expression::Chebyshev(n, inner) => Expression::Chebyshev(n, Box::new(inner.simplify())),
            other => other,
        }
    }

    fn is_composite(&self) -> bool {
        matches!(self, Expression::Mul(_) | Expression::Add(_) | Expression::Pow(_, _))
    }
}

fn chebyshev(order: usize, z: f64) -> f64 {
    match order {
        0 => 1.0,
        1 => z,
        _ => {
            let mut prev = 1.0;
            let mut curr = z;
            for _ in 2..=order {
                let next = 2.0 * z * curr - prev;
                prev = curr;
                curr = next;
            }
            curr
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Constant(c) => write!(f, "{c}"),
            Expression::Var(v) => match v {
                Variable::State(i) => write!(f, "x{}", i + 1),
                Variable::Control(i) => write!(f, "u{}", i + 1),
                Variable::Parameter(i) => write!(f, "p{}", i + 1),
                Variable::Independent => write!(f, "t"),
                Variable::Implicit(i) => write!(f, "dx{}", i + 1),
            },
            Expression::Pow(inner, e) => {
                if inner.is_composite() {
                    write!(f, "({inner})^{e}")
                } else {
                    write!(f, "{inner}^{e}")
                }
            }
            Expression::Mul(factors) => {
                for (k, factor) in factors.iter().enumerate() {
                    if k > 0 {
                        write!(f, " * ")?;
                    }
                    if matches!(factor, Expression::Add(_)) {
                        write!(f, "({factor})")?;
                    } else {
                        write!(f, "{factor}")?;
                    }
                }
                Ok(())
            }
            Expression::Add(terms) => {
                for (k, term) in terms.iter().enumerate() {
                    if k > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
            Expression::Sin(inner) => write!(f, "sin({inner})"),
            Expression::Cos(inner) => write!(f, "cos({inner})"),
            Expression::Exp(inner) => write!(f, "exp({inner})"),
            Expression::Chebyshev(n, inner) => write!(f, "T{n}({inner})"),
        }
    }
}

/// Options controlling basis construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasisOptions {
    /// Split sums into their atoms, drop constant prefactors, and collapse
    /// duplicate candidates so the remaining set is linearly independent by
    /// construction.
    pub linear_independent: bool,
    /// Constant-fold and flatten each candidate before use.
    pub simplify: bool,
}

/// Evaluation signature of a basis, resolved once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisSignature {
    /// No control variables declared.
    Autonomous,
    /// Control variables declared; the autonomous entry point evaluates
    /// with all inputs at zero.
    Controlled,
}

/// An ordered library of named candidate functions over declared state,
/// control, parameter, and implicit variables.
///
/// The number of equations is fixed at construction. Evaluating a basis
/// against data of shape (states x samples) always yields a design matrix
/// of shape (equations x samples). A basis is immutable after construction;
/// fitted coefficients live on the solution, keyed by equation index.
#[derive(Debug, Clone)]
pub struct Basis {
    eqs: Vec<Expression>,
    names: Vec<String>,
    n_states: usize,
    n_controls: usize,
    n_parameters: usize,
    n_implicits: usize,
    signature: BasisSignature,
    name: String,
}

impl Basis {
    /// Construct a basis over the declared variable arities.
    ///
    /// Fails with a configuration error if a candidate references an
    /// undeclared variable, or if the (possibly collapsed) candidate set
    /// is empty.
    pub fn new(
        eqs: Vec<Expression>,
        n_states: usize,
        n_controls: usize,
        n_parameters: usize,
        n_implicits: usize,
        options: BasisOptions,
    ) -> Result<Self> {
        let mut eqs = eqs;
        if options.simplify || options.linear_independent {
            eqs = eqs.into_iter().map(Expression::simplify).collect();
        }
        if options.linear_independent {
            eqs = linear_independent_atoms(eqs);
        }
        if eqs.is_empty() {
            return Err(DataDrivenError::Configuration(
                "basis candidate set is empty".into(),
            ));
        }

        for (k, eq) in eqs.iter().enumerate() {
            let mut bad: Option<String> = None;
            eq.visit_vars(&mut |v| {
                let violation = match v {
                    Variable::State(i) if i >= n_states => Some(format!("state x{}", i + 1)),
                    Variable::Control(i) if i >= n_controls => Some(format!("control u{}", i + 1)),
                    Variable::Parameter(i) if i >= n_parameters => {
                        Some(format!("parameter p{}", i + 1))
                    }
                    Variable::Implicit(i) if i >= n_implicits => {
                        Some(format!("implicit dx{}", i + 1))
                    }
                    _ => None,
                };
                if bad.is_none() {
                    bad = violation;
                }
            });
            if let Some(what) = bad {
                return Err(DataDrivenError::Configuration(format!(
                    "candidate {} references undeclared {what}",
                    k + 1
                )));
            }
        }

        let names = eqs.iter().map(|e| e.to_string()).collect();
        let signature = if n_controls > 0 {
            BasisSignature::Controlled
        } else {
            BasisSignature::Autonomous
        };

        Ok(Self {
            eqs,
            names,
            n_states,
            n_controls,
            n_parameters,
            n_implicits,
            signature,
            name: String::new(),
        })
    }

    /// Basis over states only, with default options.
    pub fn of_states(eqs: Vec<Expression>, n_states: usize) -> Result<Self> {
        Self::new(eqs, n_states, 0, 0, 0, BasisOptions::default())
    }

    /// The identity basis: one candidate per state variable.
    pub fn identity(n_states: usize) -> Self {
        let eqs = (0..n_states).map(Expression::state).collect();
        // always valid by construction
        Self::of_states(eqs, n_states).unwrap()
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn len(&self) -> usize {
        self.eqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eqs.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn equations(&self) -> &[Expression] {
        &self.eqs
    }

    /// Deterministic candidate names, one per equation.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn n_controls(&self) -> usize {
        self.n_controls
    }

    pub fn n_parameters(&self) -> usize {
        self.n_parameters
    }

    pub fn n_implicits(&self) -> usize {
        self.n_implicits
    }

    pub fn signature(&self) -> BasisSignature {
        self.signature
    }

    pub fn has_implicits(&self) -> bool {
        self.n_implicits > 0
    }

    /// Per-equation implicit variable usage.
    pub fn implicit_usage(&self) -> Vec<Vec<usize>> {
        self.eqs.iter().map(|e| e.implicit_indices()).collect()
    }

    /// Indices of equations that are plain state variables, in state order.
    /// `observables()[i] = Some(k)` means equation `k` is exactly `x_{i+1}`.
    pub fn observables(&self) -> Vec<Option<usize>> {
        let mut out = vec![None; self.n_states];
        for (k, eq) in self.eqs.iter().enumerate() {
            if let Expression::Var(Variable::State(i)) = eq {
                if out[*i].is_none() {
                    out[*i] = Some(k);
                }
            }
        }
        out
    }

    /// Evaluate the basis at each sample, autonomous entry point.
    ///
    /// Thin wrapper over [`Basis::evaluate_controlled`] with all control
    /// inputs at zero.
    pub fn evaluate(&self, x: &Mat<f64>, p: &[f64], t: Option<&[f64]>) -> Result<Mat<f64>> {
        self.evaluate_controlled(x, p, t, None)
    }

    /// Evaluate the basis at each sample with explicit control inputs.
    ///
    /// Returns a design matrix of shape (equations x samples).
    pub fn evaluate_controlled(
        &self,
        x: &Mat<f64>,
        p: &[f64],
        t: Option<&[f64]>,
        u: Option<&Mat<f64>>,
    ) -> Result<Mat<f64>> {
        let mut out = Mat::<f64>::zeros(self.eqs.len(), x.ncols());
        self.evaluate_into(x, p, t, u, None, &mut out)?;
        Ok(out)
    }

    /// Evaluate when implicit variables are declared; `dx` supplies the
    /// implicit measurements, one row per implicit variable.
    pub fn evaluate_implicit(
        &self,
        x: &Mat<f64>,
        dx: &Mat<f64>,
        p: &[f64],
        t: Option<&[f64]>,
        u: Option<&Mat<f64>>,
    ) -> Result<Mat<f64>> {
        let mut out = Mat::<f64>::zeros(self.eqs.len(), x.ncols());
        self.evaluate_into(x, p, t, u, Some(dx), &mut out)?;
        Ok(out)
    }

    /// In-place evaluation into a caller-supplied (equations x samples)
    /// buffer.
    pub fn evaluate_into(
        &self,
        x: &Mat<f64>,
        p: &[f64],
        t: Option<&[f64]>,
        u: Option<&Mat<f64>>,
        implicit: Option<&Mat<f64>>,
        out: &mut Mat<f64>,
    ) -> Result<()> {
        let m = x.ncols();
        if x.nrows() != self.n_states {
            return Err(DataDrivenError::Validation(format!(
                "data has {} states, basis declares {}",
                x.nrows(),
                self.n_states
            )));
        }
        if p.len() < self.n_parameters {
            return Err(DataDrivenError::Configuration(format!(
                "basis declares {} parameters, got {}",
                self.n_parameters,
                p.len()
            )));
        }
        if let Some(tv) = t {
            if tv.len() != m {
                return Err(DataDrivenError::Validation(format!(
                    "time has {} entries, data has {m} samples",
                    tv.len()
                )));
            }
        }
        if let Some(um) = u {
            if um.nrows() < self.n_controls || um.ncols() != m {
                return Err(DataDrivenError::Validation(format!(
                    "inputs are {}x{}, expected at least {}x{m}",
                    um.nrows(),
                    um.ncols(),
                    self.n_controls
                )));
            }
        }
        match implicit {
            Some(dm) => {
                if dm.nrows() < self.n_implicits || dm.ncols() != m {
                    return Err(DataDrivenError::Validation(format!(
                        "implicit measurements are {}x{}, expected at least {}x{m}",
                        dm.nrows(),
                        dm.ncols(),
                        self.n_implicits
                    )));
                }
            }
            None => {
                if self.n_implicits > 0 {
                    return Err(DataDrivenError::Configuration(
                        "basis declares implicit variables; implicit measurements required"
                            .into(),
                    ));
                }
            }
        }
        if out.nrows() != self.eqs.len() || out.ncols() != m {
            return Err(DataDrivenError::Validation(format!(
                "output buffer is {}x{}, expected {}x{m}",
                out.nrows(),
                out.ncols(),
                self.eqs.len()
            )));
        }

        let mut states = vec![0.0; self.n_states];
        let mut controls = vec![0.0; self.n_controls];
        let mut implicits = vec![0.0; self.n_implicits];

        for j in 0..m {
            for i in 0..self.n_states {
                states[i] = x[(i, j)];
            }
            if let Some(um) = u {
                for i in 0..self.n_controls {
                    controls[i] = um[(i, j)];
                }
            } else {
                controls.iter_mut().for_each(|c| *c = 0.0);
            }
            if let Some(dm) = implicit {
                for i in 0..self.n_implicits {
                    implicits[i] = dm[(i, j)];
                }
            }
            let sample = Sample {
                states: &states,
                controls: &controls,
                parameters: p,
                time: t.map(|tv| tv[j]).unwrap_or(0.0),
                implicits: &implicits,
            };
            for (k, eq) in self.eqs.iter().enumerate() {
                out[(k, j)] = eq.eval(&sample);
            }
        }

        Ok(())
    }
}

/// Split sums into atoms, drop constant prefactors, and collapse duplicate
/// candidates by their canonical rendering.
fn linear_independent_atoms(eqs: Vec<Expression>) -> Vec<Expression> {
    let mut atoms = Vec::new();
    for eq in eqs {
        match eq {
            Expression::Add(terms) => atoms.extend(terms),
            other => atoms.push(other),
        }
    }

    let mut out: Vec<Expression> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for atom in atoms {
        let atom = strip_constant_factor(atom);
        if matches!(atom, Expression::Constant(c) if c == 0.0) {
            continue;
        }
        let key = atom.to_string();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(atom);
        }
    }
    out
}

fn strip_constant_factor(e: Expression) -> Expression {
    match e {
        Expression::Mul(factors) => {
            let kept: Vec<Expression> = factors
                .into_iter()
                .filter(|f| !matches!(f, Expression::Constant(c) if *c != 0.0))
                .collect();
            match kept.len() {
                0 => Expression::Constant(1.0),
                1 => kept.into_iter().next().unwrap(),
                _ => Expression::Mul(kept),
            }
        }
        Expression::Constant(c) if c != 0.0 => Expression::Constant(1.0),
        other => other,
    }
}
