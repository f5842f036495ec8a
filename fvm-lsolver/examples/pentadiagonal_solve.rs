use fvm_lsolver::{
    solve, Criterion, LsolverError, PreconditionerKind, SolverConfig, SolverKind, SparseMatrix,
    Triplet,
};
use std::time::Instant;

/// Creates a pentadiagonal sparse matrix A of size n x n.
/// Diagonals:
/// - Main: 4.0
/// - Adjacent (+1, -1): -1.0
/// - Outer (+2, -2): -0.5
fn create_pentadiagonal_matrix(n: usize) -> Result<SparseMatrix, LsolverError> {
    let mut triplets = Vec::new();

    for i in 0..n {
        if i >= 2 {
            triplets.push(Triplet::new(i, i - 2, -0.5));
        }
        if i >= 1 {
            triplets.push(Triplet::new(i, i - 1, -1.0));
        }
        triplets.push(Triplet::new(i, i, 4.0));
        if i + 1 < n {
            triplets.push(Triplet::new(i, i + 1, -1.0));
        }
        if i + 2 < n {
            triplets.push(Triplet::new(i, i + 2, -0.5));
        }
    }

    Ok(SparseMatrix::from_triplets(n, n, triplets)?)
}

/// Creates a vector b of size n with b[i] = sin(i / n).
fn create_sin_vector(n: usize) -> Vec<f64> {
    (0..n).map(|i| (i as f64 / n as f64).sin()).collect()
}

fn main() -> Result<(), LsolverError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let n = 500;
    log::info!(
        "Setting up {}x{} pentadiagonal matrix A and sin vector b...",
        n,
        n
    );
    let a = create_pentadiagonal_matrix(n)?;
    let b = create_sin_vector(n);

    let configs = [
        SolverConfig::new(SolverKind::PysparseCg).with_preconditioner(PreconditionerKind::ssor()),
        SolverConfig::new(SolverKind::PysparseGmres)
            .with_preconditioner(PreconditionerKind::Jacobi),
        SolverConfig::new(SolverKind::TrilinosCg)
            .with_criterion(Criterion::Rhs)
            .with_preconditioner(PreconditionerKind::multilevel_dd()),
        SolverConfig::new(SolverKind::ScipyLu),
    ];

    for config in &configs {
        log::info!("Running {} ...", config.solver);
        let mut x = vec![0.0; n];
        let start_time = Instant::now();
        let status = solve(config, &a, &mut x, &b)?;
        let elapsed_time = start_time.elapsed();
        status.log();
        println!("{}: {} in {:?}", config.solver, status, elapsed_time);
    }

    Ok(())
}
