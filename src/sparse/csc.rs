//! Compressed Sparse Column (CSC) matrix format.
//!
//! The column-major mirror of [`CsrMatrix`](crate::sparse::CsrMatrix):
//! - `values`: non-zero entries in column-major order
//! - `row_indices`: row index for each value
//! - `col_ptrs`: index into values/row_indices where each column starts
//!
//! The sparse factorization stores L in this format (columns of multipliers)
//! and consumes its input column by column, so CSC is the natural input form.

use crate::sparse::csr::CsrMatrix;
use crate::traits::ComplexField;
use ndarray::Array2;
use std::ops::Range;

/// Compressed Sparse Column matrix with O(nnz) storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CscMatrix<T: ComplexField> {
    /// Number of rows
    pub num_rows: usize,
    /// Number of columns
    pub num_cols: usize,
    /// Non-zero values in column-major order
    pub values: Vec<T>,
    /// Row indices for each value
    pub row_indices: Vec<usize>,
    /// Column pointers; `col_ptrs[num_cols]` equals nnz
    pub col_ptrs: Vec<usize>,
}

impl<T: ComplexField> CscMatrix<T> {
    /// Create an empty CSC matrix.
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            values: Vec::new(),
            row_indices: Vec::new(),
            col_ptrs: vec![0; num_cols + 1],
        }
    }

    /// Build from a dense matrix, keeping entries with magnitude above
    /// `threshold`.
    pub fn from_dense(dense: &Array2<T>, threshold: T::Real) -> Self {
        let num_rows = dense.nrows();
        let num_cols = dense.ncols();
        let mut values = Vec::new();
        let mut row_indices = Vec::new();
        let mut col_ptrs = vec![0usize; num_cols + 1];

        for j in 0..num_cols {
            for i in 0..num_rows {
                let val = dense[[i, j]];
                if val.norm() > threshold {
                    values.push(val);
                    row_indices.push(i);
                }
            }
            col_ptrs[j + 1] = values.len();
        }

        Self {
            num_rows,
            num_cols,
            values,
            row_indices,
            col_ptrs,
        }
    }

    /// Build from (row, col, value) triplets. Duplicate entries are summed.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        mut triplets: Vec<(usize, usize, T)>,
    ) -> Self {
        triplets.sort_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));

        let mut values: Vec<T> = Vec::with_capacity(triplets.len());
        let mut row_indices = Vec::with_capacity(triplets.len());
        let mut counts = vec![0usize; num_cols];
        let mut prev: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            assert!(row < num_rows && col < num_cols, "triplet out of range");
            if prev == Some((row, col)) {
                let last = values.len() - 1;
                values[last] += val;
            } else {
                values.push(val);
                row_indices.push(row);
                counts[col] += 1;
                prev = Some((row, col));
            }
        }

        let mut col_ptrs = vec![0usize; num_cols + 1];
        for j in 0..num_cols {
            col_ptrs[j + 1] = col_ptrs[j] + counts[j];
        }

        Self {
            num_rows,
            num_cols,
            values,
            row_indices,
            col_ptrs,
        }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Index range of a column in `values`/`row_indices`.
    pub fn col_range(&self, col: usize) -> Range<usize> {
        self.col_ptrs[col]..self.col_ptrs[col + 1]
    }

    /// (row, value) pairs of a column, in row order.
    pub fn col_entries(&self, col: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.col_range(col);
        self.row_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Entry at (i, j), zero if not stored.
    pub fn get(&self, i: usize, j: usize) -> T {
        for idx in self.col_range(j) {
            if self.row_indices[idx] == i {
                return self.values[idx];
            }
        }
        T::zero()
    }

    /// Convert to a dense matrix (debugging and small problems).
    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::from_elem((self.num_rows, self.num_cols), T::zero());
        for j in 0..self.num_cols {
            for idx in self.col_range(j) {
                dense[[self.row_indices[idx], j]] = self.values[idx];
            }
        }
        dense
    }

    /// Convert to row-major storage.
    pub fn to_csr(&self) -> CsrMatrix<T> {
        let mut counts = vec![0usize; self.num_rows];
        for &i in &self.row_indices {
            counts[i] += 1;
        }
        let mut row_ptrs = vec![0usize; self.num_rows + 1];
        for i in 0..self.num_rows {
            row_ptrs[i + 1] = row_ptrs[i] + counts[i];
        }
        let mut values = vec![T::zero(); self.nnz()];
        let mut col_indices = vec![0usize; self.nnz()];
        let mut next = row_ptrs.clone();
        for j in 0..self.num_cols {
            for idx in self.col_range(j) {
                let i = self.row_indices[idx];
                let pos = next[i];
                values[pos] = self.values[idx];
                col_indices[pos] = j;
                next[i] += 1;
            }
        }
        CsrMatrix {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }
}
