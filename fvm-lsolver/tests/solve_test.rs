use fvm_lsolver::algorithms::{Factorizer, SparseLu, SparseLuFactor};
use fvm_lsolver::backends::trilinos;
use fvm_lsolver::residual_correction::ResidualCorrectionSolver;
use fvm_lsolver::{
    handle_counts, solve, Criterion, FactorizationError, LinearSystem, LsolverError,
    PreconditionerKind, Solver, SolverConfig, SolverKind, SparseMatrix, StatusKind,
    ToleranceSpec, Triplet,
};
use std::cell::Cell;
use std::rc::Rc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Helper for float comparison in tests
fn assert_approx_eq_vec(a: &[f64], b: &[f64], tolerance: f64) {
    assert_eq!(a.len(), b.len(), "Vector lengths differ");
    for i in 0..a.len() {
        let diff = (a[i] - b[i]).abs();
        assert!(
            diff <= tolerance,
            "Verification failed at index {}: expected {}, got {}, diff {}",
            i,
            b[i],
            a[i],
            diff
        );
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn residual(a: &SparseMatrix, x: &[f64], b: &[f64]) -> f64 {
    let mut ax = vec![0.0; b.len()];
    a.spmv(x, &mut ax).unwrap();
    let r: Vec<f64> = ax.iter().zip(b).map(|(l, r)| l - r).collect();
    norm(&r)
}

/// 1-D diffusion stencil: strictly diagonally dominant, symmetric.
fn diffusion_system(n: usize) -> (SparseMatrix, Vec<f64>) {
    let mut triplets = Vec::new();
    for i in 0..n {
        let diag = if i == 0 || i == n - 1 { 4.0 } else { 3.0 };
        triplets.push(Triplet::new(i, i, diag));
        if i > 0 {
            triplets.push(Triplet::new(i, i - 1, -1.0));
        }
        if i + 1 < n {
            triplets.push(Triplet::new(i, i + 1, -1.0));
        }
    }
    let a = SparseMatrix::from_triplets(n, n, triplets).unwrap();
    let b = (0..n).map(|i| 1.0 + i as f64).collect();
    (a, b)
}

fn lu_reference(a: &SparseMatrix, b: &[f64]) -> Vec<f64> {
    let mut x = vec![0.0; b.len()];
    let status = solve(&SolverKind::TrilinosLu.into(), a, &mut x, b).unwrap();
    assert!(status.is_converged());
    x
}

#[test]
fn test_diffusion_lu_residual_correction() {
    init_logger();
    let (a, b) = diffusion_system(10);
    for kind in [SolverKind::PysparseLu, SolverKind::ScipyLu, SolverKind::TrilinosLu] {
        let config = SolverConfig::new(kind)
            .with_tolerance(1e-10)
            .with_max_iterations(10);
        let mut x = vec![0.0; 10];
        let status = solve(&config, &a, &mut x, &b).unwrap();
        assert_eq!(status.kind(), StatusKind::Converged, "{}", status);
        assert!(status.iterations() <= 2, "{}", status);
        assert!(status.residual() < 1e-10, "{}", status);
        assert!(residual(&a, &x, &b) < 1e-10);
    }
}

#[test]
fn test_iterative_matches_lu_on_diffusion() {
    init_logger();
    let (a, b) = diffusion_system(10);
    let reference = lu_reference(&a, &b);

    let config = SolverConfig::new(SolverKind::TrilinosCg)
        .with_tolerance(1e-5)
        .with_criterion(Criterion::Initial);
    let mut x = vec![0.0; 10];
    let status = solve(&config, &a, &mut x, &b).unwrap();
    assert!(status.is_converged(), "{}", status);

    let diff: Vec<f64> = x.iter().zip(&reference).map(|(p, q)| p - q).collect();
    assert!(norm(&diff) / norm(&reference) <= 1e-5);
}

#[test]
fn test_every_krylov_solver_on_diffusion() {
    init_logger();
    let (a, b) = diffusion_system(10);
    let reference = lu_reference(&a, &b);
    for kind in SolverKind::ALL.into_iter().filter(|k| !k.is_direct()) {
        let config = SolverConfig::new(kind)
            .with_tolerance(1e-8)
            .with_criterion(Criterion::Initial);
        let mut x = vec![0.0; 10];
        let status = solve(&config, &a, &mut x, &b).unwrap();
        assert!(status.is_converged(), "{}: {}", kind, status);
        // Condition number of the stencil is below 5.
        assert_approx_eq_vec(&x, &reference, 5e-8 * norm(&reference));
    }
}

#[test]
fn test_converged_status_meets_threshold() {
    init_logger();
    let (a, b) = diffusion_system(10);
    let x0 = vec![0.5; 10];
    let r0 = residual(&a, &x0, &b);
    for kind in SolverKind::ALL {
        let tolerance = kind.default_tolerance();
        let config = SolverConfig::new(kind).with_criterion(Criterion::Initial);
        let mut x = x0.clone();
        let status = solve(&config, &a, &mut x, &b).unwrap();
        assert!(status.is_converged(), "{}: {}", kind, status);
        let r = residual(&a, &x, &b);
        assert!(
            r <= tolerance * r0 * 1.01 + 1e-14,
            "{}: residual {:e} above {:e}",
            kind,
            r,
            tolerance * r0
        );
    }
}

#[test]
fn test_identity_with_exact_guess_needs_no_correction() {
    let a = SparseMatrix::identity(4);
    let b = vec![1.0, -2.0, 3.0, 0.5];
    let mut x = b.clone();
    let status = solve(&SolverKind::PysparseLu.into(), &a, &mut x, &b).unwrap();
    assert_eq!(status.kind(), StatusKind::Converged);
    assert_eq!(status.iterations(), 0);
    assert_eq!(status.residual(), 0.0);
    assert_eq!(x, b);
}

#[test]
fn test_zero_iterations_reports_limit() {
    let (a, b) = diffusion_system(10);
    for kind in [SolverKind::PysparseLu, SolverKind::ScipyLu, SolverKind::TrilinosLu] {
        let mut x = vec![0.0; 10];
        let config = SolverConfig::new(kind).with_max_iterations(0);
        let status = solve(&config, &a, &mut x, &b).unwrap();
        assert_eq!(status.kind(), StatusKind::IterationLimitExceeded, "{}", kind);
        assert_eq!(status.iterations(), 0);
        assert_eq!(x, vec![0.0; 10]);
        assert!((status.residual() - norm(&b)).abs() < 1e-12);
    }
}

#[test]
fn test_zero_iterations_with_exact_guess_reports_limit() {
    init_logger();
    let a = SparseMatrix::identity(3);
    let b = vec![2.0, -1.0, 0.5];
    for kind in SolverKind::ALL {
        let mut x = b.clone();
        let config = SolverConfig::new(kind).with_max_iterations(0);
        let status = solve(&config, &a, &mut x, &b).unwrap();
        assert_eq!(status.kind(), StatusKind::IterationLimitExceeded, "{}", kind);
        assert_eq!(status.iterations(), 0, "{}", kind);
        assert_eq!(status.residual(), 0.0, "{}", kind);
        assert_eq!(x, b, "{}", kind);
    }
}

#[derive(Debug)]
struct CountingLu {
    inner: SparseLu,
    calls: Rc<Cell<usize>>,
}

impl Factorizer for CountingLu {
    type Factor = SparseLuFactor;

    fn factorize(&self, matrix: &SparseMatrix) -> Result<SparseLuFactor, FactorizationError> {
        self.calls.set(self.calls.get() + 1);
        self.inner.factorize(matrix)
    }
}

#[test]
fn test_one_factorization_per_solve() {
    let (a, b) = diffusion_system(10);
    let calls = Rc::new(Cell::new(0));
    let solver = ResidualCorrectionSolver::new(
        "counting LU",
        CountingLu {
            inner: SparseLu::default(),
            calls: Rc::clone(&calls),
        },
        trilinos::LU_POLICY,
        &trilinos::LU_CRITERIA,
        // Tight tolerance so more than one correction step may run.
        ToleranceSpec::new(1e-300, Criterion::Initial),
        5,
        PreconditionerKind::Identity,
    )
    .unwrap();

    let mut x = vec![0.0; 10];
    let status = solver
        .solve(&mut LinearSystem::new(&a, &mut x, &b).unwrap())
        .unwrap();
    assert!(status.iterations() >= 1 && status.iterations() <= 5, "{}", status);
    assert_eq!(calls.get(), 1);

    let mut x = vec![0.0; 10];
    solver
        .solve(&mut LinearSystem::new(&a, &mut x, &b).unwrap())
        .unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_preconditioner_handles_balance() {
    let (a, b) = diffusion_system(10);
    let before = handle_counts();
    for kind in SolverKind::ALL {
        let mut x = vec![0.0; 10];
        solve(&kind.into(), &a, &mut x, &b).unwrap();
    }
    // Failing setup must not leak either.
    let singular = SparseMatrix::from_dense(&[vec![0.0, 1.0], vec![1.0, 0.0]]);
    let mut x = vec![0.0; 2];
    let config =
        SolverConfig::new(SolverKind::PysparseCgs).with_preconditioner(PreconditionerKind::Jacobi);
    let status = solve(&config, &singular, &mut x, &[1.0, 1.0]).unwrap();
    assert_eq!(status.kind(), StatusKind::IllConditioned);

    let after = handle_counts();
    assert_eq!(after.outstanding(), before.outstanding());
    assert_eq!(after.acquired - before.acquired, 5);
}

#[test]
fn test_asymmetric_system_with_gmres_and_cgs() {
    let n = 12;
    let mut triplets = Vec::new();
    for i in 0..n {
        triplets.push(Triplet::new(i, i, 2.0));
        if i > 0 {
            triplets.push(Triplet::new(i, i - 1, -1.2));
        }
        if i + 1 < n {
            triplets.push(Triplet::new(i, i + 1, -0.3));
        }
    }
    let a = SparseMatrix::from_triplets(n, n, triplets).unwrap();
    let b = vec![1.0; n];
    let reference = lu_reference(&a, &b);
    for kind in [SolverKind::PysparseGmres, SolverKind::PysparseCgs, SolverKind::TrilinosGmres] {
        assert!(kind.can_solve_asymmetric());
        let mut x = vec![0.0; n];
        let status = solve(&kind.into(), &a, &mut x, &b).unwrap();
        assert!(status.is_converged(), "{}: {}", kind, status);
        assert_approx_eq_vec(&x, &reference, 1e-6);
    }
}

#[test]
fn test_unsupported_options_rejected_before_solving() {
    let (a, b) = diffusion_system(4);
    let mut x = vec![7.0; 4];
    let config = SolverConfig::new(SolverKind::TrilinosLu).with_criterion(Criterion::Matrix);
    let err = solve(&config, &a, &mut x, &b).unwrap_err();
    assert!(matches!(err, LsolverError::UnsupportedCriterion { .. }));
    assert_eq!(x, vec![7.0; 4]);

    let config = SolverConfig::new(SolverKind::PysparseCg)
        .with_preconditioner(PreconditionerKind::multilevel_dd());
    assert!(matches!(
        Solver::from_config(&config),
        Err(LsolverError::UnsupportedPreconditioner { .. })
    ));
}

#[test]
fn test_config_loaded_from_file() {
    let path = std::env::temp_dir().join(format!("fvm-lsolver-config-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{
            "solver": "trilinos_gmres",
            "tolerance": 1e-9,
            "criterion": "solution",
            "preconditioner": { "type": "multilevel_dd", "block_size": 4 }
        }"#,
    )
    .unwrap();
    let config = SolverConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.solver, SolverKind::TrilinosGmres);
    assert_eq!(
        config.effective_preconditioner(),
        PreconditionerKind::MultilevelDd { block_size: 4 }
    );
    let (a, b) = diffusion_system(10);
    let mut x = vec![0.0; 10];
    let status = solve(&config, &a, &mut x, &b).unwrap();
    assert!(status.is_converged(), "{}", status);

    assert!(matches!(
        SolverConfig::from_json_file(path.with_extension("missing")),
        Err(LsolverError::Io(_))
    ));
}
