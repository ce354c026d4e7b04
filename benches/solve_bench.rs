use criterion::{black_box, criterion_group, criterion_main, Criterion};
use datadriven_dynamics::*;

fn make_linear_problem(n_states: usize, n_time: usize) -> DataDrivenProblem {
    let mut x = faer::Mat::<f64>::zeros(n_states, n_time);
    let mut dx = faer::Mat::<f64>::zeros(n_states, n_time);
    for j in 0..n_time {
        let t = j as f64 * 0.05;
        for i in 0..n_states {
            x[(i, j)] = ((i + 1) as f64 * t).sin() + 0.1 * ((i + 3) as f64 * t * 2.0).cos();
            dx[(i, j)] = -0.5 * x[(i, j)];
        }
    }
    DataDrivenProblem::continuous(x, dx).unwrap()
}

fn bench_sparse(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_regression");

    for &(n_states, n_time) in &[(2, 100), (5, 500), (10, 1000)] {
        let problem = make_linear_problem(n_states, n_time);
        let basis = Basis::new(
            polynomial_basis(&state_variables(n_states), 2),
            n_states,
            0,
            0,
            0,
            BasisOptions::default(),
        )
        .unwrap();
        let algorithm = Algorithm::stlsq(0.1);
        let options = SolverOptions::default();

        group.bench_function(format!("{n_states}x{n_time}"), |b| {
            b.iter(|| {
                solve(
                    black_box(&problem),
                    black_box(Some(&basis)),
                    &algorithm,
                    &options,
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_spectral(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectral");

    for &(n_states, n_time) in &[(5, 200), (20, 500), (50, 1000)] {
        let problem = make_linear_problem(n_states, n_time);
        let algorithm = Algorithm::dmd();
        let options = SolverOptions::default();

        group.bench_function(format!("{n_states}x{n_time}"), |b| {
            b.iter(|| solve(black_box(&problem), None, &algorithm, &options).unwrap())
        });
    }

    group.finish();
}

fn bench_collocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("collocation");

    for &n_time in &[100usize, 500, 2000] {
        let t: Vec<f64> = (0..n_time).map(|i| i as f64 * 0.01).collect();
        let mut data = faer::Mat::<f64>::zeros(3, n_time);
        for (j, &tj) in t.iter().enumerate() {
            for i in 0..3 {
                data[(i, j)] = ((i + 1) as f64 * tj).sin();
            }
        }

        let kernel = CollocationMethod::kernel(CollocationKernel::Gaussian);
        group.bench_function(format!("kernel_{n_time}"), |b| {
            b.iter(|| collocate_data(black_box(&data), black_box(&t), &kernel).unwrap())
        });

        let spline = CollocationMethod::interpolation(InterpolationMethod::CubicSpline);
        group.bench_function(format!("spline_{n_time}"), |b| {
            b.iter(|| collocate_data(black_box(&data), black_box(&t), &spline).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sparse, bench_spectral, bench_collocation);
criterion_main!(benches);
