//! Recover the Lorenz system from data with a polynomial candidate
//! library.
//!
//! Run with: cargo run --example lorenz

use datadriven_dynamics::*;

fn lorenz(s: &[f64; 3]) -> [f64; 3] {
    let (sigma, rho, beta) = (10.0, 28.0, 8.0 / 3.0);
    [
        sigma * (s[1] - s[0]),
        s[0] * (rho - s[2]) - s[1],
        s[0] * s[1] - beta * s[2],
    ]
}

fn rk4(s: [f64; 3], h: f64) -> [f64; 3] {
    let k1 = lorenz(&s);
    let s2 = std::array::from_fn(|i| s[i] + 0.5 * h * k1[i]);
    let k2 = lorenz(&s2);
    let s3 = std::array::from_fn(|i| s[i] + 0.5 * h * k2[i]);
    let k3 = lorenz(&s3);
    let s4 = std::array::from_fn(|i| s[i] + h * k3[i]);
    let k4 = lorenz(&s4);
    std::array::from_fn(|i| s[i] + h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]))
}

fn main() {
    let n = 2000;
    let h = 0.005;
    let mut state = [-8.0, 8.0, 27.0];
    let mut x = faer::Mat::<f64>::zeros(3, n);
    let mut dx = faer::Mat::<f64>::zeros(3, n);
    for j in 0..n {
        let d = lorenz(&state);
        for i in 0..3 {
            x[(i, j)] = state[i];
            dx[(i, j)] = d[i];
        }
        state = rk4(state, h);
    }

    let problem = DataDrivenProblem::continuous(x, dx)
        .unwrap()
        .with_name("lorenz");
    let basis = Basis::new(
        polynomial_basis(&state_variables(3), 2),
        3,
        0,
        0,
        0,
        BasisOptions::default(),
    )
    .unwrap();
    println!("candidate library ({} terms):", basis.len());
    println!("  {}", basis.names().join(", "));

    let options = SolverOptions {
        digits: 4,
        eval_expression: true,
        ..Default::default()
    };
    let solution = solve(&problem, Some(&basis), &Algorithm::stlsq(0.5), &options).unwrap();

    println!("\nrecovered model:");
    for eq in solution.equations() {
        println!("  {eq}");
    }
    println!("\nactive terms: {}", solution.dof());
    println!("parameters: {:?}", solution.parameters());
    println!("rss: {:.3e}", solution.rss());
    println!("converged: {}", solution.is_converged());
}
