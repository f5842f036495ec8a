use std::error::Error;

use fvm_core::{LinearSystem, SparseMatrix, Triplet};
use fvm_lsolver::{Solver, SolverConfig, SolverKind};

/// Steady 1-D diffusion `d/dx (D dφ/dx) = 0` on `[0, L]` with `φ(0) = 0`
/// and `D dφ/dx = flux_right` at `x = L`.
///
/// `D` is 1 on the outer quarters of the bar and 0.1 in the middle half.
/// With `nx = 4 i + 2` cells the cell-centred scheme reproduces the
/// piecewise linear analytical solution exactly.
struct VariableDiffusion {
    nx: usize,
    length: f64,
    value_left: f64,
    flux_right: f64,
}

impl VariableDiffusion {
    fn new(nx: usize, length: f64) -> Self {
        Self {
            nx,
            length,
            value_left: 0.0,
            flux_right: 1.0,
        }
    }

    fn dx(&self) -> f64 {
        self.length / self.nx as f64
    }

    /// Diffusivity evaluated at face `j`, located at `x = j dx`.
    fn face_diffusivity(&self, j: usize) -> f64 {
        let x = j as f64 * self.dx();
        if x < self.length / 4.0 || x >= 3.0 * self.length / 4.0 {
            1.0
        } else {
            0.1
        }
    }

    fn cell_centers(&self) -> Vec<f64> {
        (0..self.nx).map(|i| (i as f64 + 0.5) * self.dx()).collect()
    }

    /// Assembles `L φ = b`.
    fn assemble(&self) -> Result<(SparseMatrix, Vec<f64>), Box<dyn Error>> {
        let n = self.nx;
        let dx = self.dx();
        let mut triplets = Vec::with_capacity(3 * n);
        let mut b = vec![0.0; n];

        // Interior faces couple cells j - 1 and j.
        for j in 1..n {
            let coeff = self.face_diffusivity(j) / dx;
            triplets.push(Triplet::new(j - 1, j - 1, coeff));
            triplets.push(Triplet::new(j, j, coeff));
            triplets.push(Triplet::new(j - 1, j, -coeff));
            triplets.push(Triplet::new(j, j - 1, -coeff));
        }

        // Fixed value on the left face, half a cell away from the first centre.
        let left = self.face_diffusivity(0) / (dx / 2.0);
        triplets.push(Triplet::new(0, 0, left));
        b[0] += left * self.value_left;

        // Fixed flux into the last cell.
        b[n - 1] += self.flux_right;

        let matrix = SparseMatrix::from_triplets(n, n, triplets)?;
        Ok((matrix, b))
    }

    fn analytical(&self) -> Vec<f64> {
        let l = self.length;
        self.cell_centers()
            .into_iter()
            .map(|x| {
                if x < l / 4.0 {
                    x
                } else if x < 3.0 * l / 4.0 {
                    10.0 * x - 9.0 * l / 4.0
                } else {
                    x + 18.0 * l / 4.0
                }
            })
            .collect()
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let configs: Vec<SolverConfig> = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading solver configuration from {}", path);
            vec![SolverConfig::from_json_file(&path)?]
        }
        None => SolverKind::ALL.into_iter().map(SolverConfig::new).collect(),
    };

    let problem = VariableDiffusion::new(10, 1.0);
    let (matrix, b) = problem.assemble()?;
    let exact = problem.analytical();
    println!(
        "Assembled {}x{} system with {} nonzeros",
        matrix.rows(),
        matrix.cols(),
        matrix.nnz()
    );

    for config in configs {
        let solver = Solver::from_config(&config)?;
        let mut phi = vec![problem.value_left; problem.nx];
        let start_time = std::time::Instant::now();
        let status = solver.solve(&mut LinearSystem::new(&matrix, &mut phi, &b)?)?;
        let elapsed_time = start_time.elapsed();
        status.log();

        let max_error = phi
            .iter()
            .zip(&exact)
            .map(|(p, e)| (p - e).abs())
            .fold(0.0, f64::max);
        println!(
            "{:<16} {:<24} iterations {:>4}  residual {:.3e}  max error {:.3e}  ({:?})",
            solver.name(),
            status.kind().to_string(),
            status.iterations(),
            status.residual(),
            max_error,
            elapsed_time
        );
    }

    Ok(())
}
