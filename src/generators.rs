//! Generators for common candidate-function libraries.
//!
//! Every generator produces a deterministic term order, fully determined by
//! the input variable order and the requested degree or coefficient set, so
//! fitted coefficient vectors are reproducible across runs.

use crate::basis::{Expression, Variable};

/// Coefficient selection for the trigonometric and Chebyshev generators.
///
/// An integer `n` expands to `1..=n`; an explicit set is used as given.
#[derive(Debug, Clone)]
pub enum CoefficientSet {
    UpTo(usize),
    Explicit(Vec<f64>),
}

impl CoefficientSet {
    fn values(&self) -> Vec<f64> {
        match self {
            CoefficientSet::UpTo(n) => (1..=*n).map(|k| k as f64).collect(),
            CoefficientSet::Explicit(v) => v.clone(),
        }
    }
}

impl From<usize> for CoefficientSet {
    fn from(n: usize) -> Self {
        CoefficientSet::UpTo(n)
    }
}

impl From<Vec<f64>> for CoefficientSet {
    fn from(v: Vec<f64>) -> Self {
        CoefficientSet::Explicit(v)
    }
}

/// The first `n` state variables, in order.
pub fn state_variables(n: usize) -> Vec<Variable> {
    (0..n).map(Variable::State).collect()
}

/// Monomials in each variable separately:
/// `[x1, x1^2, ..., x1^d, x2, x2^2, ...]`.
pub fn monomial_basis(vars: &[Variable], degree: usize) -> Vec<Expression> {
    let mut out = Vec::with_capacity(vars.len() * degree);
    for &v in vars {
        for d in 1..=degree {
            out.push(if d == 1 {
                Expression::Var(v)
            } else {
                Expression::Pow(Box::new(Expression::Var(v)), d as i32)
            });
        }
    }
    out
}

/// Full polynomial library up to total degree `degree`, mixed cross terms
/// included, in graded order starting with the constant term.
///
/// For `n` variables the library has `binomial(n + degree, degree)` terms.
pub fn polynomial_basis(vars: &[Variable], degree: usize) -> Vec<Expression> {
    let n = vars.len();
    let mut exponents = Vec::new();
    for total in 0..=degree {
        collect_exponents(n, total, &mut Vec::new(), &mut exponents);
    }

    exponents
        .iter()
        .map(|expo| {
            let factors: Vec<Expression> = expo
                .iter()
                .zip(vars)
                .filter(|(&e, _)| e > 0)
                .map(|(&e, &v)| {
                    if e == 1 {
                        Expression::Var(v)
                    } else {
                        Expression::Pow(Box::new(Expression::Var(v)), e as i32)
                    }
                })
                .collect();
            match factors.len() {
                0 => Expression::Constant(1.0),
                1 => factors.into_iter().next().unwrap(),
                _ => Expression::Mul(factors),
            }
        })
        .collect()
}

/// All exponent tuples of `n` variables with the given total degree, in a
/// fixed lexicographic order.
fn collect_exponents(
    n_remaining: usize,
    remaining_degree: usize,
    current: &mut Vec<usize>,
    result: &mut Vec<Vec<usize>>,
) {
    if n_remaining == 1 {
        let mut expo = current.clone();
        expo.push(remaining_degree);
        result.push(expo);
        return;
    }
    for d in 0..=remaining_degree {
        current.push(d);
        collect_exponents(n_remaining - 1, remaining_degree - d, current, result);
        current.pop();
    }
}

/// Sine library: `sin(k * x)` for each variable (outer) and coefficient
/// `k` (inner).
pub fn sin_basis(vars: &[Variable], coefficients: impl Into<CoefficientSet>) -> Vec<Expression> {
    trig_basis(vars, &coefficients.into(), true, false)
}

/// Cosine library: `cos(k * x)` for each variable and coefficient.
pub fn cos_basis(vars: &[Variable], coefficients: impl Into<CoefficientSet>) -> Vec<Expression> {
    trig_basis(vars, &coefficients.into(), false, true)
}

/// Fourier library: interleaved `sin(k * x)`, `cos(k * x)` pairs for each
/// variable and coefficient.
pub fn fourier_basis(vars: &[Variable], coefficients: impl Into<CoefficientSet>) -> Vec<Expression> {
    trig_basis(vars, &coefficients.into(), true, true)
}

fn trig_basis(
    vars: &[Variable],
    coefficients: &CoefficientSet,
    with_sin: bool,
    with_cos: bool,
) -> Vec<Expression> {
    let ks = coefficients.values();
    let mut out = Vec::new();
    for &v in vars {
        for &k in &ks {
            let arg = Expression::Mul(vec![Expression::Constant(k), Expression::Var(v)]).simplify();
            if with_sin {
                out.push(Expression::Sin(Box::new(arg.clone())));
            }
            if with_cos {
                out.push(Expression::Cos(Box::new(arg.clone())));
            }
        }
    }
    out
}

/// Chebyshev library: `T_k(x)` for each variable and order `k`.
/// Non-integer entries in an explicit set are truncated to their integer
/// order.
pub fn chebyshev_basis(vars: &[Variable], orders: impl Into<CoefficientSet>) -> Vec<Expression> {
    let ks = orders.into().values();
    let mut out = Vec::new();
    for &v in vars {
        for &k in &ks {
            out.push(Expression::Chebyshev(k as usize, Box::new(Expression::Var(v))));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::Basis;
    use faer::Mat;

    fn assert_near(a: f64, b: f64, eps: f64) {
        assert!(
            (a - b).abs() < eps,
            "expected {a} ≈ {b} (diff = {})",
            (a - b).abs()
        );
    }

    #[test]
    fn test_monomial_count_and_order() {
        let vars = state_variables(2);
        let eqs = monomial_basis(&vars, 3);
        assert_eq!(eqs.len(), 6);
        let names: Vec<String> = eqs.iter().map(|e| e.to_string()).collect();
        assert_eq!(names, vec!["x1", "x1^2", "x1^3", "x2", "x2^2", "x2^3"]);
    }

    #[test]
    fn test_monomial_values() {
        let vars = state_variables(1);
        let basis = Basis::of_states(monomial_basis(&vars, 3), 1).unwrap();
        let mut x = Mat::<f64>::zeros(1, 1);
        x[(0, 0)] = 2.0;
        let theta = basis.evaluate(&x, &[], None).unwrap();
        assert_near(theta[(0, 0)], 2.0, 1e-15);
        assert_near(theta[(1, 0)], 4.0, 1e-15);
        assert_near(theta[(2, 0)], 8.0, 1e-15);
    }

    #[test]
    fn test_polynomial_count() {
        // binomial(n + d, d): n=2, d=2 -> 6; n=3, d=3 -> 20
        assert_eq!(polynomial_basis(&state_variables(2), 2).len(), 6);
        assert_eq!(polynomial_basis(&state_variables(3), 3).len(), 20);
    }

    #[test]
    fn test_polynomial_includes_cross_terms() {
        let eqs = polynomial_basis(&state_variables(2), 2);
        let names: Vec<String> = eqs.iter().map(|e| e.to_string()).collect();
        assert!(names.contains(&"1".to_string()));
        assert!(names.contains(&"x1 * x2".to_string()));
        assert!(names.contains(&"x2^2".to_string()));
    }

    #[test]
    fn test_polynomial_order_deterministic() {
        let a: Vec<String> = polynomial_basis(&state_variables(2), 2)
            .iter()
            .map(|e| e.to_string())
            .collect();
        let b: Vec<String> = polynomial_basis(&state_variables(2), 2)
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sin_cos_fourier_layout() {
        let vars = state_variables(1);
        let sins = sin_basis(&vars, 2);
        assert_eq!(sins.len(), 2);
        assert_eq!(sins[0].to_string(), "sin(x1)");
        assert_eq!(sins[1].to_string(), "sin(2 * x1)");

        let coss = cos_basis(&vars, 1);
        assert_eq!(coss[0].to_string(), "cos(x1)");

        let four = fourier_basis(&vars, 2);
        assert_eq!(four.len(), 4);
        assert_eq!(four[0].to_string(), "sin(x1)");
        assert_eq!(four[1].to_string(), "cos(x1)");
        assert_eq!(four[2].to_string(), "sin(2 * x1)");
        assert_eq!(four[3].to_string(), "cos(2 * x1)");
    }

    #[test]
    fn test_explicit_coefficients() {
        let vars = state_variables(1);
        let sins = sin_basis(&vars, vec![0.5, 3.0]);
        assert_eq!(sins.len(), 2);
        assert_eq!(sins[0].to_string(), "sin(0.5 * x1)");

        let basis = Basis::of_states(sins, 1).unwrap();
        let mut x = Mat::<f64>::zeros(1, 1);
        x[(0, 0)] = 1.2;
        let theta = basis.evaluate(&x, &[], None).unwrap();
        assert_near(theta[(0, 0)], (0.5 * 1.2_f64).sin(), 1e-15);
        assert_near(theta[(1, 0)], (3.0 * 1.2_f64).sin(), 1e-15);
    }

    #[test]
    fn test_chebyshev_basis_values() {
        let vars = state_variables(1);
        let basis = Basis::of_states(chebyshev_basis(&vars, 3), 1).unwrap();
        let mut x = Mat::<f64>::zeros(1, 1);
        let z = 0.4;
        x[(0, 0)] = z;
        let theta = basis.evaluate(&x, &[], None).unwrap();
        assert_near(theta[(0, 0)], z, 1e-15);
        assert_near(theta[(1, 0)], 2.0 * z * z - 1.0, 1e-15);
        assert_near(theta[(2, 0)], 4.0 * z.powi(3) - 3.0 * z, 1e-15);
    }
}
