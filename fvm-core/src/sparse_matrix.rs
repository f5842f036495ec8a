use crate::error::FvmCoreError; // Use error from this crate
use crate::traits::Matrix;
use serde::{Deserialize, Serialize};

/// Represents a sparse matrix in Compressed Sparse Row (CSR) format.
///
/// This is the storage the discretization layer hands to the solvers. The
/// solvers never mutate it; anything that needs a modified operator (for
/// instance a pre-scaled copy) works on a clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    /// Number of rows.
    rows: usize,
    /// Number of columns.
    cols: usize,
    /// Vector containing the non-zero values of the matrix.
    pub(crate) values: Vec<f64>,
    /// Vector containing the column indices corresponding to the values.
    pub(crate) col_indices: Vec<usize>,
    /// Vector containing the pointers to the start of each row in `values` and `col_indices`.
    /// The length of this vector is `rows + 1`. `row_ptr[i]` gives the index in `values`
    /// where row `i` starts, and `row_ptr[rows]` gives the total number of non-zero elements (nnz).
    pub(crate) row_ptr: Vec<usize>,
}

impl SparseMatrix {
    /// Creates a new empty SparseMatrix with given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        SparseMatrix {
            rows,
            cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptr: vec![0; rows + 1],
        }
    }

    /// Builds a CSR matrix from coordinate triplets.
    /// Duplicate entries are summed, which is what finite-volume assembly expects.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: Vec<Triplet>,
    ) -> Result<Self, FvmCoreError> {
        let mut coords = triplets;
        coords.sort_unstable_by_key(|&Triplet { row, col, .. }| (row, col));

        let mut values: Vec<f64> = Vec::with_capacity(coords.len());
        let mut col_indices: Vec<usize> = Vec::with_capacity(coords.len());
        let mut row_ptr = vec![0usize; rows + 1];
        let mut last: Option<(usize, usize)> = None;

        for Triplet { row, col, value } in coords {
            if row >= rows {
                return Err(FvmCoreError::InvalidDimensions(
                    "Row index out of bounds".to_string(),
                ));
            }
            if col >= cols {
                return Err(FvmCoreError::InvalidDimensions(
                    "Column index out of bounds".to_string(),
                ));
            }
            if last == Some((row, col)) {
                // Sorted input, so a duplicate is always the previous entry.
                if let Some(v) = values.last_mut() {
                    *v += value;
                }
                continue;
            }
            values.push(value);
            col_indices.push(col);
            row_ptr[row + 1] += 1;
            last = Some((row, col));
        }
        // Convert counts to cumulative row pointers
        for i in 1..=rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        Ok(SparseMatrix {
            rows,
            cols,
            values,
            col_indices,
            row_ptr,
        })
    }

    /// Creates a SparseMatrix from CSR components.
    /// Performs basic validation.
    pub fn from_csr(
        rows: usize,
        cols: usize,
        values: Vec<f64>,
        col_indices: Vec<usize>,
        row_ptr: Vec<usize>,
    ) -> Result<Self, FvmCoreError> {
        if row_ptr.len() != rows + 1 {
            return Err(FvmCoreError::InvalidDimensions(
                "row_ptr length must be rows + 1".to_string(),
            ));
        }
        if values.len() != col_indices.len() {
            return Err(FvmCoreError::InvalidDimensions(
                "values and col_indices must have the same length".to_string(),
            ));
        }
        if let Some(&last_ptr) = row_ptr.last() {
            if last_ptr != values.len() {
                return Err(FvmCoreError::InvalidDimensions(
                    "Last element of row_ptr must equal the number of non-zero values".to_string(),
                ));
            }
        }
        if row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(FvmCoreError::InvalidDimensions(
                "row_ptr must be non-decreasing".to_string(),
            ));
        }
        if col_indices.iter().any(|&c| c >= cols) {
            return Err(FvmCoreError::InvalidDimensions(
                "Column index out of bounds".to_string(),
            ));
        }

        Ok(SparseMatrix {
            rows,
            cols,
            values,
            col_indices,
            row_ptr,
        })
    }

    /// Creates a SparseMatrix from a dense 2D vector representation.
    /// Rows shorter than the first row are padded with implicit zeros.
    pub fn from_dense(dense: &[Vec<f64>]) -> Self {
        let rows = dense.len();
        let cols = dense.first().map_or(0, |row| row.len());
        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptr = vec![0; rows + 1];

        for (r, row_vec) in dense.iter().enumerate() {
            for (c, &val) in row_vec.iter().enumerate().take(cols) {
                if val != 0.0 {
                    values.push(val);
                    col_indices.push(c);
                }
            }
            row_ptr[r + 1] = values.len();
        }

        SparseMatrix {
            rows,
            cols,
            values,
            col_indices,
            row_ptr,
        }
    }

    /// The `n x n` identity matrix.
    pub fn identity(n: usize) -> Self {
        SparseMatrix {
            rows: n,
            cols: n,
            values: vec![1.0; n],
            col_indices: (0..n).collect(),
            row_ptr: (0..=n).collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Returns the number of non-zero elements.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Gets the value at a specific row and column.
    /// This is inefficient for sparse matrices, primarily for testing/debugging.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.row(row).find(|&(c, _)| c == col).map(|(_, v)| v)
    }

    /// Returns a slice containing the non-zero values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns a slice containing the column indices.
    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    /// Returns a slice containing the row pointers.
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    /// Iterates over `(column, value)` pairs of one row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Main diagonal; missing entries are zero.
    pub fn diagonal(&self) -> Vec<f64> {
        let n = self.rows.min(self.cols);
        (0..n)
            .map(|i| {
                self.row(i)
                    .filter(|&(c, _)| c == i)
                    .map(|(_, v)| v)
                    .sum::<f64>()
            })
            .collect()
    }

    /// Largest absolute value on the main diagonal (0 for an empty matrix).
    pub fn max_abs_diagonal(&self) -> f64 {
        self.diagonal()
            .into_iter()
            .fold(0.0_f64, |acc, d| acc.max(d.abs()))
    }

    /// Sparse matrix-vector product `y = self * x`.
    pub fn spmv(&self, x: &[f64], y: &mut [f64]) -> Result<(), FvmCoreError> {
        if x.len() != self.cols || y.len() != self.rows {
            return Err(FvmCoreError::InvalidDimensions(format!(
                "Matrix ({}x{}) incompatible with x ({}) and y ({})",
                self.rows,
                self.cols,
                x.len(),
                y.len()
            )));
        }
        self.spmv_unchecked(x, y);
        Ok(())
    }

    /// `y = self * x` without the shape check, for kernels that validated once up front.
    pub fn spmv_unchecked(&self, x: &[f64], y: &mut [f64]) {
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = self.row(i).map(|(c, v)| v * x[c]).sum();
        }
    }

    /// Returns a copy with every entry multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> SparseMatrix {
        SparseMatrix {
            values: self.values.iter().map(|v| v * factor).collect(),
            ..self.clone()
        }
    }

    /// Returns `selfᵀ`. Column indices of the result stay sorted within each
    /// row. The CSR arrays of the transpose are the CSC arrays of `self`.
    pub fn transpose(&self) -> SparseMatrix {
        let nnz = self.values.len();
        let mut row_ptr = vec![0usize; self.cols + 1];
        for &c in &self.col_indices {
            row_ptr[c + 1] += 1;
        }
        for j in 0..self.cols {
            row_ptr[j + 1] += row_ptr[j];
        }

        let mut next = row_ptr.clone();
        let mut col_indices = vec![0usize; nnz];
        let mut values = vec![0.0; nnz];
        for i in 0..self.rows {
            for (c, v) in self.row(i) {
                let dest = next[c];
                col_indices[dest] = i;
                values[dest] = v;
                next[c] += 1;
            }
        }

        SparseMatrix {
            rows: self.cols,
            cols: self.rows,
            values,
            col_indices,
            row_ptr,
        }
    }

    /// Induced 1-norm: maximum absolute column sum.
    pub fn norm_one(&self) -> f64 {
        let mut sums = vec![0.0_f64; self.cols];
        for (&c, &v) in self.col_indices.iter().zip(self.values.iter()) {
            sums[c] += v.abs();
        }
        sums.into_iter().fold(0.0, f64::max)
    }

    /// Induced infinity-norm: maximum absolute row sum.
    pub fn norm_inf(&self) -> f64 {
        (0..self.rows)
            .map(|i| self.row(i).map(|(_, v)| v.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }

    /// Frobenius norm.
    pub fn norm_frobenius(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Dense row-major copy, for factorization kernels.
    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.rows * self.cols];
        for i in 0..self.rows {
            for (c, v) in self.row(i) {
                dense[i * self.cols + c] += v;
            }
        }
        dense
    }

    pub fn iter(&self) -> SparseMatrixIter<'_> {
        SparseMatrixIter {
            matrix: self,
            row: 0,
            pos: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    row: usize,
    col: usize,
    value: f64,
}

impl Triplet {
    pub fn new(row: usize, col: usize, value: f64) -> Self {
        Triplet { row, col, value }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Iterator over the stored entries of a [`SparseMatrix`], row by row.
pub struct SparseMatrixIter<'a> {
    matrix: &'a SparseMatrix,
    row: usize,
    pos: usize,
}

impl Iterator for SparseMatrixIter<'_> {
    type Item = Triplet;

    fn next(&mut self) -> Option<Self::Item> {
        while self.row < self.matrix.rows {
            if self.pos < self.matrix.row_ptr[self.row + 1] {
                let index = self.pos;
                self.pos += 1;
                return Some(Triplet {
                    row: self.row,
                    col: self.matrix.col_indices[index],
                    value: self.matrix.values[index],
                });
            }
            self.row += 1;
        }
        None
    }
}

impl Matrix for SparseMatrix {
    type Value = f64;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}
