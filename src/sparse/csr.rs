//! Compressed Sparse Row (CSR) matrix format.
//!
//! CSR stores:
//! - `values`: non-zero entries in row-major order
//! - `col_indices`: column index for each value
//! - `row_ptrs`: index into values/col_indices where each row starts
//!
//! The sparse factorization keeps the off-diagonal part of U in this format;
//! it is also the natural input form for row-major callers.

use crate::sparse::csc::CscMatrix;
use crate::traits::ComplexField;
use ndarray::{Array1, Array2};
use std::ops::Range;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Compressed Sparse Row matrix with O(nnz) storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T: ComplexField> {
    /// Number of rows
    pub num_rows: usize,
    /// Number of columns
    pub num_cols: usize,
    /// Non-zero values in row-major order
    pub values: Vec<T>,
    /// Column indices for each value
    pub col_indices: Vec<usize>,
    /// Row pointers; `row_ptrs[num_rows]` equals nnz
    pub row_ptrs: Vec<usize>,
}

impl<T: ComplexField> CsrMatrix<T> {
    /// Create an empty CSR matrix.
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptrs: vec![0; num_rows + 1],
        }
    }

    /// Build from a dense matrix, keeping entries with magnitude above
    /// `threshold`.
    pub fn from_dense(dense: &Array2<T>, threshold: T::Real) -> Self {
        let num_rows = dense.nrows();
        let num_cols = dense.ncols();
        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptrs = vec![0usize; num_rows + 1];

        for i in 0..num_rows {
            for j in 0..num_cols {
                let val = dense[[i, j]];
                if val.norm() > threshold {
                    values.push(val);
                    col_indices.push(j);
                }
            }
            row_ptrs[i + 1] = values.len();
        }

        Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Build from (row, col, value) triplets. Duplicate entries are summed.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        mut triplets: Vec<(usize, usize, T)>,
    ) -> Self {
        triplets.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut values: Vec<T> = Vec::with_capacity(triplets.len());
        let mut col_indices = Vec::with_capacity(triplets.len());
        let mut counts = vec![0usize; num_rows];
        let mut prev: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            assert!(row < num_rows && col < num_cols, "triplet out of range");
            if prev == Some((row, col)) {
                let last = values.len() - 1;
                values[last] += val;
            } else {
                values.push(val);
                col_indices.push(col);
                counts[row] += 1;
                prev = Some((row, col));
            }
        }

        let mut row_ptrs = vec![0usize; num_rows + 1];
        for i in 0..num_rows {
            row_ptrs[i + 1] = row_ptrs[i] + counts[i];
        }

        Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Index range of a row in `values`/`col_indices`.
    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_ptrs[row]..self.row_ptrs[row + 1]
    }

    /// (col, value) pairs of a row, in column order.
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.row_range(row);
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Entry at (i, j), zero if not stored.
    pub fn get(&self, i: usize, j: usize) -> T {
        for idx in self.row_range(i) {
            if self.col_indices[idx] == j {
                return self.values[idx];
            }
        }
        T::zero()
    }

    /// Matrix-vector product `y = A x`.
    ///
    /// Uses parallel row sums when the `rayon` feature is enabled and the
    /// matrix is large enough to benefit.
    pub fn matvec(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.num_cols, "input vector size mismatch");

        #[cfg(feature = "rayon")]
        {
            if self.num_rows >= 256 {
                return self.matvec_parallel(x);
            }
        }

        self.matvec_sequential(x)
    }

    fn matvec_sequential(&self, x: &Array1<T>) -> Array1<T> {
        let mut y = Array1::from_elem(self.num_rows, T::zero());
        for i in 0..self.num_rows {
            let mut sum = T::zero();
            for idx in self.row_range(i) {
                let j = self.col_indices[idx];
                sum += self.values[idx] * x[j];
            }
            y[i] = sum;
        }
        y
    }

    #[cfg(feature = "rayon")]
    fn matvec_parallel(&self, x: &Array1<T>) -> Array1<T> {
        let x_slice = x.as_slice().expect("array should be contiguous");
        let results: Vec<T> = (0..self.num_rows)
            .into_par_iter()
            .map(|i| {
                let mut sum = T::zero();
                for idx in self.row_range(i) {
                    let j = self.col_indices[idx];
                    sum += self.values[idx] * x_slice[j];
                }
                sum
            })
            .collect();
        Array1::from_vec(results)
    }

    /// Transpose matrix-vector product `y = Aᵗ x`.
    pub fn matvec_transpose(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.num_rows, "input vector size mismatch");
        let mut y = Array1::from_elem(self.num_cols, T::zero());
        for i in 0..self.num_rows {
            for idx in self.row_range(i) {
                let j = self.col_indices[idx];
                y[j] += self.values[idx] * x[i];
            }
        }
        y
    }

    /// Convert to a dense matrix (debugging and small problems).
    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::from_elem((self.num_rows, self.num_cols), T::zero());
        for i in 0..self.num_rows {
            for idx in self.row_range(i) {
                dense[[i, self.col_indices[idx]]] = self.values[idx];
            }
        }
        dense
    }

    /// Convert to column-major storage.
    pub fn to_csc(&self) -> CscMatrix<T> {
        let mut counts = vec![0usize; self.num_cols];
        for &j in &self.col_indices {
            counts[j] += 1;
        }
        let mut col_ptrs = vec![0usize; self.num_cols + 1];
        for j in 0..self.num_cols {
            col_ptrs[j + 1] = col_ptrs[j] + counts[j];
        }
        let mut values = vec![T::zero(); self.nnz()];
        let mut row_indices = vec![0usize; self.nnz()];
        let mut next = col_ptrs.clone();
        for i in 0..self.num_rows {
            for idx in self.row_range(i) {
                let j = self.col_indices[idx];
                let pos = next[j];
                values[pos] = self.values[idx];
                row_indices[pos] = i;
                next[j] += 1;
            }
        }
        CscMatrix {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            values,
            row_indices,
            col_ptrs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_from_dense_and_get() {
        let dense = array![[1.0_f64, 0.0, 2.0], [0.0, 3.0, 0.0], [4.0, 0.0, 5.0]];
        let csr = CsrMatrix::from_dense(&dense, 1e-15);
        assert_eq!(csr.nnz(), 5);
        assert_relative_eq!(csr.get(0, 0), 1.0);
        assert_relative_eq!(csr.get(0, 2), 2.0);
        assert_relative_eq!(csr.get(2, 2), 5.0);
        assert_relative_eq!(csr.get(1, 0), 0.0);
    }

    #[test]
    fn test_matvec() {
        let dense = array![[1.0_f64, 2.0], [3.0, 4.0]];
        let csr = CsrMatrix::from_dense(&dense, 1e-15);
        let y = csr.matvec(&array![1.0_f64, 2.0]);
        assert_relative_eq!(y[0], 5.0, epsilon = 1e-10);
        assert_relative_eq!(y[1], 11.0, epsilon = 1e-10);
    }

    #[test]
    fn test_matvec_transpose() {
        let dense = array![[1.0_f64, 2.0], [3.0, 4.0]];
        let csr = CsrMatrix::from_dense(&dense, 1e-15);
        let y = csr.matvec_transpose(&array![1.0_f64, 2.0]);
        assert_relative_eq!(y[0], 7.0, epsilon = 1e-10);
        assert_relative_eq!(y[1], 10.0, epsilon = 1e-10);
    }

    #[test]
    fn test_from_triplets_sums_duplicates() {
        let triplets = vec![(0, 0, 1.0_f64), (0, 0, 2.0), (1, 1, 3.0)];
        let csr = CsrMatrix::from_triplets(2, 2, triplets);
        assert_relative_eq!(csr.get(0, 0), 3.0);
        assert_relative_eq!(csr.get(1, 1), 3.0);
    }

    #[test]
    fn test_dense_roundtrip() {
        let dense = array![[1.0_f64, 0.0], [2.0, 3.0]];
        let csr = CsrMatrix::from_dense(&dense, 1e-15);
        assert_eq!(csr.to_dense(), dense);
    }

    #[test]
    fn test_to_csc_roundtrip() {
        let dense = array![[1.0_f64, 0.0, 2.0], [0.0, 3.0, 0.0], [4.0, 0.0, 5.0]];
        let csr = CsrMatrix::from_dense(&dense, 1e-15);
        let csc = csr.to_csc();
        assert_eq!(csc.to_dense(), dense);
    }
}
