use super::PreconditionerOp;
use crate::algorithms::lu::{DenseLu, DenseLuFactor, Factorization};
use crate::error::PreconditionerError;
use fvm_core::SparseMatrix;
use log::debug;
use nalgebra::DMatrix;

/// Two-level domain decomposition.
///
/// Unknowns are split into contiguous subdomains of `block_size`. Each
/// subdomain block of `A` is factorized exactly. A coarse operator with one
/// aggregate per subdomain, `A₀ = Rᵀ A R` for piecewise-constant `R`, corrects
/// the low-frequency error the local solves cannot see. The application is
/// symmetric (subdomain, coarse, subdomain), so the preconditioner is usable
/// with CG on SPD systems.
#[derive(Debug)]
pub struct MultilevelDd<'a> {
    matrix: &'a SparseMatrix,
    blocks: Vec<Subdomain>,
    coarse: Option<DenseLuFactor>,
}

#[derive(Debug)]
struct Subdomain {
    start: usize,
    end: usize,
    factor: DenseLuFactor,
}

impl<'a> MultilevelDd<'a> {
    pub fn new(matrix: &'a SparseMatrix, block_size: usize) -> Result<Self, PreconditionerError> {
        let n = matrix.rows();
        let block_size = block_size.max(1);
        let lu = DenseLu::default();

        let mut blocks = Vec::with_capacity(n.div_ceil(block_size));
        for start in (0..n).step_by(block_size) {
            let end = (start + block_size).min(n);
            let mut local = DMatrix::zeros(end - start, end - start);
            for i in start..end {
                for (c, v) in matrix.row(i) {
                    if (start..end).contains(&c) {
                        local[(i - start, c - start)] = v;
                    }
                }
            }
            let factor = lu.factorize_dense(local)?;
            blocks.push(Subdomain { start, end, factor });
        }

        let coarse = if blocks.len() > 1 {
            let nb = blocks.len();
            let mut a0 = DMatrix::zeros(nb, nb);
            for i in 0..n {
                for (c, v) in matrix.row(i) {
                    a0[(i / block_size, c / block_size)] += v;
                }
            }
            match lu.factorize_dense(a0) {
                Ok(factor) => Some(factor),
                Err(e) => {
                    debug!("Coarse operator unusable ({}), using one level", e);
                    None
                }
            }
        } else {
            None
        };

        debug!(
            "Multilevel preconditioner: {} subdomains of up to {} unknowns, coarse level {}",
            blocks.len(),
            block_size,
            if coarse.is_some() { "on" } else { "off" }
        );
        Ok(Self {
            matrix,
            blocks,
            coarse,
        })
    }

    /// `z = B r` with `B` the block-diagonal inverse.
    fn subdomain_solve(&self, r: &[f64], z: &mut [f64]) {
        for block in &self.blocks {
            let range = block.start..block.end;
            // Factors were verified nonsingular at construction and sizes
            // match by construction.
            if block.factor.solve(&r[range.clone()], &mut z[range.clone()]).is_err() {
                z[range.clone()].copy_from_slice(&r[range]);
            }
        }
    }

    /// `z += R A₀⁻¹ Rᵀ r`
    fn coarse_correct(&self, coarse: &DenseLuFactor, r: &[f64], z: &mut [f64]) {
        let restricted: Vec<f64> = self
            .blocks
            .iter()
            .map(|b| r[b.start..b.end].iter().sum())
            .collect();
        let mut correction = vec![0.0; restricted.len()];
        if coarse.solve(&restricted, &mut correction).is_err() {
            return;
        }
        for (block, c) in self.blocks.iter().zip(correction) {
            for zi in &mut z[block.start..block.end] {
                *zi += c;
            }
        }
    }

    /// `res = r - A z`
    fn defect(&self, r: &[f64], z: &[f64], res: &mut [f64]) {
        self.matrix.spmv_unchecked(z, res);
        for (di, ri) in res.iter_mut().zip(r) {
            *di = ri - *di;
        }
    }
}

impl PreconditionerOp for MultilevelDd<'_> {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        self.subdomain_solve(r, z);
        let Some(coarse) = &self.coarse else {
            return;
        };

        let n = r.len();
        let mut res = vec![0.0; n];
        self.defect(r, z, &mut res);
        self.coarse_correct(coarse, &res, z);

        self.defect(r, z, &mut res);
        let mut dz = vec![0.0; n];
        self.subdomain_solve(&res, &mut dz);
        for (zi, di) in z.iter_mut().zip(dz) {
            *zi += di;
        }
    }
}
