//! End-to-end identification scenarios.

use approx::assert_abs_diff_eq;
use datadriven_dynamics::*;
use faer::Mat;

/// Sample a linear ODE dx = A x analytically, returning exact derivatives.
fn linear_ode_data(a: [[f64; 2]; 2], n: usize, dt: f64) -> (Mat<f64>, Mat<f64>, Vec<f64>) {
    // integrate with a fine fixed-step RK4 so the states are accurate,
    // then evaluate the exact derivative at each sample
    let mut x = Mat::<f64>::zeros(2, n);
    let mut dx = Mat::<f64>::zeros(2, n);
    let mut t = Vec::with_capacity(n);
    let mut state = [1.0, 0.5];
    let f = |s: &[f64; 2]| {
        [
            a[0][0] * s[0] + a[0][1] * s[1],
            a[1][0] * s[0] + a[1][1] * s[1],
        ]
    };
    for j in 0..n {
        t.push(j as f64 * dt);
        let d = f(&state);
        for i in 0..2 {
            x[(i, j)] = state[i];
            dx[(i, j)] = d[i];
        }
        state = rk4_step(&f, state, dt);
    }
    (x, dx, t)
}

fn rk4_step(f: &impl Fn(&[f64; 2]) -> [f64; 2], s: [f64; 2], h: f64) -> [f64; 2] {
    let k1 = f(&s);
    let k2 = f(&[s[0] + 0.5 * h * k1[0], s[1] + 0.5 * h * k1[1]]);
    let k3 = f(&[s[0] + 0.5 * h * k2[0], s[1] + 0.5 * h * k2[1]]);
    let k4 = f(&[s[0] + h * k3[0], s[1] + h * k3[1]]);
    [
        s[0] + h / 6.0 * (k1[0] + 2.0 * k2[0] + 2.0 * k3[0] + k4[0]),
        s[1] + h / 6.0 * (k1[1] + 2.0 * k2[1] + 2.0 * k3[1] + k4[1]),
    ]
}

// ============================================================================
// Sparse regression: structural identification
// ============================================================================

#[test]
fn linear_ode_recovered_by_sparse_regression() {
    let a = [[-0.5, 1.0], [-1.0, -0.5]];
    let (x, dx, _) = linear_ode_data(a, 50, 0.1);
    let problem = DataDrivenProblem::continuous(x, dx).unwrap();

    let options = SolverOptions {
        maxiters: 100,
        abstol: 1e-8,
        ..Default::default()
    };
    let solution = solve(&problem, None, &Algorithm::stlsq(0.05), &options).unwrap();

    assert!(solution.is_converged());
    let xi = solution.coefficients();
    for r in 0..2 {
        for i in 0..2 {
            assert_abs_diff_eq!(xi[(i, r)], a[r][i], epsilon = 1e-6);
        }
    }
}

#[test]
fn lorenz_recovered_from_polynomial_library() {
    // the canonical chaotic benchmark: exact derivatives at integrated states
    let (sigma, rho, beta) = (10.0, 28.0, 8.0 / 3.0);
    let f = |s: &[f64; 3]| {
        [
            sigma * (s[1] - s[0]),
            s[0] * (rho - s[2]) - s[1],
            s[0] * s[1] - beta * s[2],
        ]
    };

    let n = 1500;
    let h = 0.005;
    let mut state = [-8.0, 8.0, 27.0];
    let mut x = Mat::<f64>::zeros(3, n);
    let mut dx = Mat::<f64>::zeros(3, n);
    for j in 0..n {
        let d = f(&state);
        for i in 0..3 {
            x[(i, j)] = state[i];
            dx[(i, j)] = d[i];
        }
        // RK4 in three dimensions
        let k1 = f(&state);
        let s2 = [
            state[0] + 0.5 * h * k1[0],
            state[1] + 0.5 * h * k1[1],
            state[2] + 0.5 * h * k1[2],
        ];
        let k2 = f(&s2);
        let s3 = [
            state[0] + 0.5 * h * k2[0],
            state[1] + 0.5 * h * k2[1],
            state[2] + 0.5 * h * k2[2],
        ];
        let k3 = f(&s3);
        let s4 = [
            state[0] + h * k3[0],
            state[1] + h * k3[1],
            state[2] + h * k3[2],
        ];
        let k4 = f(&s4);
        for i in 0..3 {
            state[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
        }
    }

    let problem = DataDrivenProblem::continuous(x, dx).unwrap();
    let basis = Basis::new(
        polynomial_basis(&state_variables(3), 2),
        3,
        0,
        0,
        0,
        BasisOptions::default(),
    )
    .unwrap();

    let solution = solve(
        &problem,
        Some(&basis),
        &Algorithm::stlsq(0.5),
        &SolverOptions::default(),
    )
    .unwrap();
    assert!(solution.is_converged());

    // library order: [1, x3, x2, x1, x3^2, x2*x3, x2^2, x1*x3, x1*x2, x1^2]
    let xi = solution.coefficients();
    assert_abs_diff_eq!(xi[(3, 0)], -sigma, epsilon = 1e-5);
    assert_abs_diff_eq!(xi[(2, 0)], sigma, epsilon = 1e-5);
    assert_abs_diff_eq!(xi[(3, 1)], rho, epsilon = 1e-5);
    assert_abs_diff_eq!(xi[(2, 1)], -1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(xi[(7, 1)], -1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(xi[(8, 2)], 1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(xi[(1, 2)], -beta, epsilon = 1e-5);

    // exactly 7 active terms across the three outputs
    assert_eq!(solution.dof(), 7);
    assert!(solution.r2().unwrap() > 0.999);
}

#[test]
fn trigonometric_dynamics_recovered_with_fourier_library() {
    // dx = -2 sin(x)
    let n = 80;
    let mut x = Mat::<f64>::zeros(1, n);
    let mut dx = Mat::<f64>::zeros(1, n);
    for j in 0..n {
        let v = 0.3 + 2.5 * j as f64 / n as f64;
        x[(0, j)] = v;
        dx[(0, j)] = -2.0 * v.sin();
    }
    let problem = DataDrivenProblem::continuous(x, dx).unwrap();
    let basis = Basis::new(
        fourier_basis(&state_variables(1), 2),
        1,
        0,
        0,
        0,
        BasisOptions::default(),
    )
    .unwrap();

    let solution = solve(
        &problem,
        Some(&basis),
        &Algorithm::stlsq(0.1),
        &SolverOptions::default(),
    )
    .unwrap();

    // library order: [sin(x1), cos(x1), sin(2 x1), cos(2 x1)]
    let xi = solution.coefficients();
    assert_abs_diff_eq!(xi[(0, 0)], -2.0, epsilon = 1e-8);
    assert_eq!(solution.dof(), 1);
    assert_eq!(solution.equations(), vec!["dx1 = -2 * sin(x1)".to_string()]);
}

#[test]
fn direct_problem_maps_states_to_outputs() {
    // y = 3 x - 2 x^2
    let n = 40;
    let mut x = Mat::<f64>::zeros(1, n);
    let mut y = Mat::<f64>::zeros(1, n);
    for j in 0..n {
        let v = -1.0 + 2.0 * j as f64 / (n - 1) as f64;
        x[(0, j)] = v;
        y[(0, j)] = 3.0 * v - 2.0 * v * v;
    }
    let problem = DataDrivenProblem::direct(x, y).unwrap();
    let basis = Basis::new(
        polynomial_basis(&state_variables(1), 3),
        1,
        0,
        0,
        0,
        BasisOptions::default(),
    )
    .unwrap();

    let solution = solve(
        &problem,
        Some(&basis),
        &Algorithm::stlsq(0.1),
        &SolverOptions::default(),
    )
    .unwrap();

    let xi = solution.coefficients();
    assert_abs_diff_eq!(xi[(1, 0)], 3.0, epsilon = 1e-8);
    assert_abs_diff_eq!(xi[(2, 0)], -2.0, epsilon = 1e-8);
    assert_eq!(solution.equations(), vec!["y1 = 3 * x1 - 2 * x1^2".to_string()]);
}

// ============================================================================
// Spectral identification
// ============================================================================

#[test]
fn dmd_eigenvalues_match_the_generator() {
    // A has eigenvalues -0.5 ± 1.0i
    let a = [[-0.5, 1.0], [-1.0, -0.5]];
    let (x, dx, _) = linear_ode_data(a, 50, 0.1);
    let problem = DataDrivenProblem::continuous(x, dx).unwrap();

    let solution = solve(
        &problem,
        None,
        &Algorithm::Koopman(KoopmanOptions { rank: Some(2) }),
        &SolverOptions::default(),
    )
    .unwrap();
    assert!(solution.is_converged());

    match solution.get_result() {
        RawResult::Koopman(k) => {
            assert_eq!(k.rank, 2);
            for ev in &k.generator_eigenvalues {
                assert_abs_diff_eq!(ev.re, -0.5, epsilon = 1e-6);
                assert_abs_diff_eq!(ev.im.abs(), 1.0, epsilon = 1e-6);
            }
        }
        RawResult::Sparse(_) => panic!("expected a spectral result"),
    }
}

#[test]
fn discrete_dmd_recovers_the_map() {
    let n = 30;
    let mut x = Mat::<f64>::zeros(2, n);
    x[(0, 0)] = 1.0;
    x[(1, 0)] = -1.0;
    for j in 1..n {
        x[(0, j)] = 0.9 * x[(0, j - 1)] + 0.2 * x[(1, j - 1)];
        x[(1, j)] = 0.7 * x[(1, j - 1)];
    }
    let problem = DataDrivenProblem::discrete(x).unwrap();

    let solution = solve(
        &problem,
        None,
        &Algorithm::Koopman(KoopmanOptions { rank: Some(2) }),
        &SolverOptions::default(),
    )
    .unwrap();

    let xi = solution.coefficients();
    assert_abs_diff_eq!(xi[(0, 0)], 0.9, epsilon = 1e-7);
    assert_abs_diff_eq!(xi[(1, 0)], 0.2, epsilon = 1e-7);
    assert_abs_diff_eq!(xi[(0, 1)], 0.0, epsilon = 1e-7);
    assert_abs_diff_eq!(xi[(1, 1)], 0.7, epsilon = 1e-7);

    // spectral fits refuse regression statistics
    assert!(matches!(
        solution.aic(),
        Err(DataDrivenError::NotApplicable(_))
    ));
}

// ============================================================================
// Collocation pipeline
// ============================================================================

#[test]
fn kernel_collocation_feeds_the_regression() {
    // dx = -x from states only, derivatives estimated by kernel smoothing
    let n = 100;
    let mut x = Mat::<f64>::zeros(1, n);
    let mut t = Vec::with_capacity(n);
    for j in 0..n {
        let tj = j as f64 * 0.04;
        t.push(tj);
        x[(0, j)] = 2.0 * (-tj).exp();
    }
    let problem = DataDrivenProblem::continuous_collocated(
        x,
        t,
        &CollocationMethod::Kernel {
            kernel: CollocationKernel::Epanechnikov,
            bandwidth: Some(0.3),
        },
    )
    .unwrap();
    assert!(!problem.needs_collocation());

    let solution =
        solve(&problem, None, &Algorithm::stlsq(0.05), &SolverOptions::default()).unwrap();
    assert!(solution.is_converged());
    // the local quadratic fit carries an O(h^2) curvature bias
    assert_abs_diff_eq!(solution.coefficients()[(0, 0)], -1.0, epsilon = 0.05);
}

#[test]
fn spline_collocation_feeds_the_regression() {
    let n = 120;
    let mut x = Mat::<f64>::zeros(1, n);
    let mut t = Vec::with_capacity(n);
    for j in 0..n {
        let tj = j as f64 * 0.03;
        t.push(tj);
        x[(0, j)] = (-0.7 * tj).exp();
    }
    let problem = DataDrivenProblem::continuous_collocated(
        x,
        t,
        &CollocationMethod::Interpolation {
            method: InterpolationMethod::CubicSpline,
            crop: true,
        },
    )
    .unwrap();
    // cropping removed the boundary samples
    assert_eq!(problem.n_samples(), n - 2);

    let solution =
        solve(&problem, None, &Algorithm::stlsq(0.05), &SolverOptions::default()).unwrap();
    assert_abs_diff_eq!(solution.coefficients()[(0, 0)], -0.7, epsilon = 1e-3);
}

// ============================================================================
// Datasets and boundaries
// ============================================================================

#[test]
fn dataset_sizes_sum_to_pooled_columns() {
    let mut problems = Vec::new();
    for &(x0, m) in &[(1.0, 14), (2.0, 9), (-1.5, 20)] {
        let mut x = Mat::<f64>::zeros(1, m);
        for j in 0..m {
            x[(0, j)] = 0.85_f64.powi(j as i32) * x0;
        }
        problems.push(DataDrivenProblem::discrete(x).unwrap());
    }
    let dataset = DataDrivenDataset::new(problems, None).unwrap();

    let sizes = dataset.sizes();
    assert_eq!(sizes, vec![13, 8, 19]);

    let pooled = dataset.pooled().unwrap();
    let basis = Basis::identity(1);
    let theta = basis.evaluate(&pooled.states, &[], None).unwrap();
    assert_eq!(sizes.iter().sum::<usize>(), theta.ncols());

    let solution =
        solve_dataset(&dataset, None, &Algorithm::stlsq(0.01), &SolverOptions::default())
            .unwrap();
    assert_abs_diff_eq!(solution.coefficients()[(0, 0)], 0.85, epsilon = 1e-8);
}

#[test]
fn problem_kind_boundaries() {
    let mut x = Mat::<f64>::zeros(2, 10);
    for j in 0..10 {
        x[(0, j)] = j as f64;
        x[(1, j)] = 1.0 + j as f64;
    }

    // discrete from states alone is fine, no time required
    assert!(DataDrivenProblem::discrete(x.clone()).is_ok());

    // continuous from states alone must fail validation
    let err = DataDrivenProblem::new(
        ProblemKind::Continuous,
        x,
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
fn solution_preserves_its_inputs() {
    let a = [[-0.5, 1.0], [-1.0, -0.5]];
    let (x, dx, _) = linear_ode_data(a, 50, 0.1);
    let problem = DataDrivenProblem::continuous(x, dx)
        .unwrap()
        .with_name("damped rotation");
    let basis = Basis::identity(2).with_name("states");

    let solution = solve(
        &problem,
        Some(&basis),
        &Algorithm::stlsq(0.05),
        &SolverOptions::default(),
    )
    .unwrap();

    assert_eq!(solution.get_problem().name(), "damped rotation");
    assert_eq!(solution.get_basis().name(), "states");
    assert_eq!(solution.get_basis().len(), 2);
    assert_eq!(solution.get_algorithm(), "STLSQ");

    // evaluating the recovered basis twice is bit-identical
    let reg = solution.get_problem().regression_data().unwrap();
    let t1 = solution
        .get_basis()
        .evaluate(&reg.states, &[], None)
        .unwrap();
    let t2 = solution
        .get_basis()
        .evaluate(&reg.states, &[], None)
        .unwrap();
    for j in 0..t1.ncols() {
        for i in 0..t1.nrows() {
            assert_eq!(t1[(i, j)].to_bits(), t2[(i, j)].to_bits());
        }
    }
}

#[test]
fn noisy_data_with_normalization() {
    // a deterministic high-frequency perturbation on the states
    let a = [[-0.5, 1.0], [-1.0, -0.5]];
    let (mut x, dx, _) = linear_ode_data(a, 200, 0.05);
    for j in 0..200 {
        for i in 0..2 {
            x[(i, j)] += 1e-4 * ((31.0 * j as f64) + i as f64).sin();
        }
    }
    let problem = DataDrivenProblem::continuous(x, dx).unwrap();
    let options = SolverOptions {
        normalize: DataNormalization::UnitNorm,
        ..Default::default()
    };
    let solution = solve(&problem, None, &Algorithm::stlsq(0.05), &options).unwrap();
    let xi = solution.coefficients();
    for r in 0..2 {
        for i in 0..2 {
            assert_abs_diff_eq!(xi[(i, r)], a[r][i], epsilon = 1e-2);
        }
    }
}
