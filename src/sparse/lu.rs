//! Sparse LU factorization with partial pivoting.
//!
//! Left-looking elimination: each column of the input is scattered into a
//! dense work vector, updated by the already-computed L columns (visiting
//! only nonzero positions), then pivoted. The pivot scan follows the same
//! order and tie rule as the dense factorizer, so both produce the same
//! permutation, factors, and rank on the same matrix — up to storage
//! representation and tolerance.

use crate::config::LuConfig;
use crate::error::LuError;
use crate::perm::Permutation;
use crate::sparse::{CscMatrix, CsrMatrix};
use crate::traits::ComplexField;
use ndarray::{Array1, Array2};

/// Sparse LU factorization instance.
///
/// L is unit lower triangular in CSC form (strictly-below-diagonal
/// multipliers, diagonal implicit); U is split into a strictly-upper CSR part
/// and a dense diagonal array. Row and column indices of the factors are
/// pivot positions, not original indices; the permutations map between the
/// two worlds.
#[derive(Debug, Clone)]
pub struct SparseLu<T: ComplexField> {
    pub(crate) l: CscMatrix<T>,
    pub(crate) u: CsrMatrix<T>,
    pub(crate) u_diag: Vec<T>,
    pub(crate) row_perm: Permutation,
    pub(crate) col_perm: Permutation,
    pub(crate) rank: usize,
    pub(crate) solvable: bool,
    pub(crate) decomposed: bool,
    pub(crate) m: usize,
    pub(crate) n: usize,
    pub(crate) config: LuConfig<T::Real>,
}

impl<T: ComplexField> SparseLu<T> {
    /// Create an empty instance.
    pub fn new(config: LuConfig<T::Real>) -> Self {
        Self {
            l: CscMatrix::new(0, 0),
            u: CsrMatrix::new(0, 0),
            u_diag: Vec::new(),
            row_perm: Permutation::identity(0),
            col_perm: Permutation::identity(0),
            rank: 0,
            solvable: false,
            decomposed: false,
            m: 0,
            n: 0,
            config,
        }
    }

    /// Factor `a` in one step.
    pub fn factorize(a: &CscMatrix<T>, config: LuConfig<T::Real>) -> Self {
        let mut lu = Self::new(config);
        lu.decompose(a);
        lu
    }

    /// Left-looking sparse elimination with partial pivoting.
    ///
    /// Returns `false` on rank deficiency, leaving a best-effort
    /// factorization in place, exactly like the dense engine.
    pub fn decompose(&mut self, a: &CscMatrix<T>) -> bool {
        let m = a.num_rows;
        let n = a.num_cols;
        let r = m.min(n);
        self.m = m;
        self.n = n;
        self.row_perm.reset(m);
        self.col_perm.reset(n);
        let tol = self.config.zero_tolerance;

        // Dense work column indexed by original row; `touched` records which
        // entries must be cleared before the next column.
        let mut x: Vec<T> = vec![T::zero(); m];
        let mut touched: Vec<usize> = Vec::with_capacity(m);

        // L columns keyed by original row until the permutation is final.
        let mut l_cols: Vec<Vec<(usize, T)>> = vec![Vec::new(); r];
        let mut u_rows: Vec<Vec<(usize, T)>> = vec![Vec::new(); r];
        let mut u_diag = vec![T::zero(); r];
        let mut ok = true;

        for j in 0..n {
            for (i, v) in a.col_entries(j) {
                x[i] = v;
                touched.push(i);
            }

            // Apply the already-computed columns in pivot order, skipping
            // positions where the work value is structurally zero.
            let steps = j.min(r);
            for ipos in 0..steps {
                let pr = self.row_perm.order()[ipos];
                let xi = x[pr];
                if xi.is_zero() {
                    continue;
                }
                if xi.norm() > tol {
                    u_rows[ipos].push((j, xi));
                }
                for &(rr, lv) in &l_cols[ipos] {
                    if x[rr].is_zero() {
                        touched.push(rr);
                    }
                    let upd = lv * xi;
                    x[rr] -= upd;
                }
            }

            if j < r {
                // Pivot scan over positions j..m in order; strict comparison
                // keeps the earliest position on ties (same rule as dense).
                let ord = self.row_perm.order();
                let mut max_pos = j;
                let mut max_val = x[ord[j]].norm();
                for ipos in (j + 1)..m {
                    let v = x[ord[ipos]].norm();
                    if v > max_val {
                        max_val = v;
                        max_pos = ipos;
                    }
                }

                if max_val <= tol {
                    ok = false;
                    u_diag[j] = T::zero();
                } else {
                    self.row_perm.swap(j, max_pos);
                    let ord = self.row_perm.order();
                    let piv = x[ord[j]];
                    u_diag[j] = piv;
                    let mut col = Vec::new();
                    for &rr in &ord[(j + 1)..m] {
                        let xv = x[rr];
                        if xv.norm() > tol {
                            col.push((rr, xv * piv.inv()));
                        }
                    }
                    l_cols[j] = col;
                }
            }

            for &t in &touched {
                x[t] = T::zero();
            }
            touched.clear();
        }

        // Map L's original row keys to final pivot positions.
        let rev = self.row_perm.reverse();
        let mut l_values = Vec::new();
        let mut l_row_indices = Vec::new();
        let mut l_col_ptrs = vec![0usize; r + 1];
        for (j, col) in l_cols.iter().enumerate() {
            let mut mapped: Vec<(usize, T)> = col.iter().map(|&(orig, v)| (rev[orig], v)).collect();
            mapped.sort_unstable_by_key(|&(pos, _)| pos);
            for (pos, v) in mapped {
                debug_assert!(pos > j);
                l_row_indices.push(pos);
                l_values.push(v);
            }
            l_col_ptrs[j + 1] = l_values.len();
        }
        self.l = CscMatrix {
            num_rows: m,
            num_cols: r,
            values: l_values,
            row_indices: l_row_indices,
            col_ptrs: l_col_ptrs,
        };

        let mut u_values = Vec::new();
        let mut u_col_indices = Vec::new();
        let mut u_row_ptrs = vec![0usize; r + 1];
        for (i, row) in u_rows.iter().enumerate() {
            for &(c, v) in row {
                debug_assert!(c > i);
                u_col_indices.push(c);
                u_values.push(v);
            }
            u_row_ptrs[i + 1] = u_values.len();
        }
        self.u = CsrMatrix {
            num_rows: r,
            num_cols: n,
            values: u_values,
            col_indices: u_col_indices,
            row_ptrs: u_row_ptrs,
        };

        self.u_diag = u_diag;
        self.decomposed = true;
        self.recompute_rank();
        log::debug!(
            "sparse decompose: {}x{} matrix, rank {} of {}, nnz L {} / U {}",
            m,
            n,
            self.rank,
            r,
            self.l.nnz(),
            self.u.nnz() + self.rank
        );
        ok
    }

    /// Drop the factors and return to the empty state.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    pub(crate) fn recompute_rank(&mut self) {
        let tol = self.config.zero_tolerance;
        self.rank = self.u_diag.iter().filter(|d| d.norm() > tol).count();
        self.solvable = self.m == self.n && self.rank == self.n;
    }

    /// Unit lower-triangular factor, column-sparse (diagonal implicit).
    pub fn l(&self) -> &CscMatrix<T> {
        &self.l
    }

    /// Strictly-upper part of U, row-sparse.
    pub fn u(&self) -> &CsrMatrix<T> {
        &self.u
    }

    /// Dense diagonal of U.
    pub fn u_diag(&self) -> &[T] {
        &self.u_diag
    }

    pub fn row_perm(&self) -> &Permutation {
        &self.row_perm
    }

    pub fn col_perm(&self) -> &Permutation {
        &self.col_perm
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn is_solvable(&self) -> bool {
        self.solvable
    }

    pub fn is_decomposed(&self) -> bool {
        self.decomposed
    }

    pub fn nrows(&self) -> usize {
        self.m
    }

    pub fn ncols(&self) -> usize {
        self.n
    }

    pub fn config(&self) -> &LuConfig<T::Real> {
        &self.config
    }

    /// Rebuild the factored matrix as a dense array:
    /// `P_rowᵀ · L · U · P_col`.
    pub fn reconstruct(&self) -> Array2<T> {
        assert!(self.decomposed, "reconstruct called before decompose");
        let r = self.m.min(self.n);
        let ro = self.row_perm.order();
        let co = self.col_perm.order();
        let mut out = Array2::from_elem((self.m, self.n), T::zero());
        for k in 0..r {
            // Column k of L including the implicit diagonal, row k of U
            // including the stored diagonal.
            let mut apply = |i: usize, lv: T| {
                let d = self.u_diag[k];
                if !d.is_zero() {
                    out[[ro[i], co[k]]] += lv * d;
                }
                for (j, uv) in self.u.row_entries(k) {
                    out[[ro[i], co[j]]] += lv * uv;
                }
            };
            apply(k, T::one());
            for (i, lv) in self.l.col_entries(k) {
                apply(i, lv);
            }
        }
        out
    }

    /// Solve `A x = rhs` via the factors (forward transformation).
    pub fn ftran(&self, rhs: &Array1<T>) -> Result<Array1<T>, LuError> {
        let mut out = Array1::from_elem(self.n, T::zero());
        self.ftran_into(rhs, &mut out)?;
        Ok(out)
    }

    /// `ftran` into a preallocated buffer; prior contents are overwritten,
    /// never read.
    ///
    /// # Panics
    ///
    /// Panics if the factorization is empty, not square, or the buffer length
    /// does not match.
    pub fn ftran_into(&self, rhs: &Array1<T>, out: &mut Array1<T>) -> Result<(), LuError> {
        assert!(self.decomposed, "ftran called before decompose");
        assert_eq!(self.m, self.n, "ftran requires a square factorization");
        assert_eq!(out.len(), self.n, "preallocated buffer length mismatch");
        if rhs.len() != self.m {
            return Err(LuError::DimensionMismatch {
                expected: self.m,
                got: rhs.len(),
            });
        }
        let n = self.n;

        self.row_perm.permute_into(rhs, out);

        // L z = y, column-oriented forward substitution.
        for i in 0..n {
            let yi = out[i];
            if yi.is_zero() {
                continue;
            }
            for (rr, lv) in self.l.col_entries(i) {
                let upd = lv * yi;
                out[rr] -= upd;
            }
        }

        // U t = z, row-oriented backward substitution.
        for i in (0..n).rev() {
            let mut s = out[i];
            for (j, uv) in self.u.row_entries(i) {
                s -= uv * out[j];
            }
            let d = self.u_diag[i];
            if d.norm() <= self.config.pivot_tolerance {
                return Err(LuError::Singular);
            }
            out[i] = s * d.inv();
        }

        if !self.col_perm.is_identity() {
            let t = out.clone();
            self.col_perm.unpermute_into(&t, out);
        }
        Ok(())
    }

    /// Solve the transposed system `Aᵗ x = rhs` (backward transformation).
    pub fn btran(&self, rhs: &Array1<T>) -> Result<Array1<T>, LuError> {
        let mut out = Array1::from_elem(self.m, T::zero());
        self.btran_into(rhs, &mut out)?;
        Ok(out)
    }

    /// `btran` into a preallocated buffer; same reuse rules as
    /// [`SparseLu::ftran_into`].
    pub fn btran_into(&self, rhs: &Array1<T>, out: &mut Array1<T>) -> Result<(), LuError> {
        assert!(self.decomposed, "btran called before decompose");
        assert_eq!(self.m, self.n, "btran requires a square factorization");
        assert_eq!(out.len(), self.m, "preallocated buffer length mismatch");
        if rhs.len() != self.n {
            return Err(LuError::DimensionMismatch {
                expected: self.n,
                got: rhs.len(),
            });
        }
        let n = self.n;

        self.col_perm.permute_into(rhs, out);

        // Uᵗ z = y: U's rows are Uᵗ's columns, so substitution stays on the
        // stored layout.
        for i in 0..n {
            let d = self.u_diag[i];
            if d.norm() <= self.config.pivot_tolerance {
                return Err(LuError::Singular);
            }
            let zi = out[i] * d.inv();
            out[i] = zi;
            if zi.is_zero() {
                continue;
            }
            for (j, uv) in self.u.row_entries(i) {
                let upd = uv * zi;
                out[j] -= upd;
            }
        }

        // Lᵗ t = z: L's columns are Lᵗ's rows, unit diagonal.
        for i in (0..n).rev() {
            let mut s = out[i];
            for (rr, lv) in self.l.col_entries(i) {
                s -= lv * out[rr];
            }
            out[i] = s;
        }

        if !self.row_perm.is_identity() {
            let t = out.clone();
            self.row_perm.unpermute_into(&t, out);
        }
        Ok(())
    }

    /// Solve `A x = b`. Alias for [`SparseLu::ftran`].
    pub fn solve(&self, b: &Array1<T>) -> Result<Array1<T>, LuError> {
        self.ftran(b)
    }

    /// The (dense) inverse of the factored matrix.
    pub fn inverse(&self) -> Result<Array2<T>, LuError> {
        assert!(self.decomposed, "inverse called before decompose");
        assert_eq!(self.m, self.n, "inverse requires a square factorization");
        if !self.solvable {
            return Err(LuError::Singular);
        }
        let n = self.n;
        let mut inv = Array2::from_elem((n, n), T::zero());
        let mut e = Array1::from_elem(n, T::zero());
        let mut x = Array1::from_elem(n, T::zero());
        for j in 0..n {
            e[j] = T::one();
            self.ftran_into(&e, &mut x)?;
            e[j] = T::zero();
            for i in 0..n {
                inv[[i, j]] = x[i];
            }
        }
        Ok(inv)
    }

    /// Determinant from the U diagonal and the permutation parities.
    pub fn determinant(&self) -> T {
        assert!(self.decomposed, "determinant called before decompose");
        assert_eq!(self.m, self.n, "determinant requires a square factorization");
        let sign = self.row_perm.sign() * self.col_perm.sign();
        let mut det = if sign < 0 { -T::one() } else { T::one() };
        for d in &self.u_diag {
            det *= *d;
        }
        det
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn assert_matrix_eq(a: &Array2<f64>, b: &Array2<f64>, eps: f64) {
        assert_eq!(a.dim(), b.dim());
        for i in 0..a.nrows() {
            for j in 0..a.ncols() {
                assert_relative_eq!(a[[i, j]], b[[i, j]], epsilon = eps);
            }
        }
    }

    #[test]
    fn test_decompose_reconstruct() {
        let dense = array![
            [4.0_f64, -1.0, 0.0, 0.0],
            [-1.0, 4.0, -1.0, 0.0],
            [0.0, -1.0, 4.0, -1.0],
            [0.0, 0.0, -1.0, 4.0]
        ];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let lu = SparseLu::factorize(&a, LuConfig::default());
        assert!(lu.is_solvable());
        assert_eq!(lu.rank(), 4);
        assert_matrix_eq(&lu.reconstruct(), &dense, 1e-12);
    }

    #[test]
    fn test_pivoting_reconstruct() {
        // Forces row exchanges.
        let dense = array![[1.0_f64, 2.0, 0.0], [8.0, 3.0, 1.0], [2.0, 0.0, 5.0]];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let lu = SparseLu::factorize(&a, LuConfig::default());
        assert_eq!(lu.row_perm().order()[0], 1);
        assert_matrix_eq(&lu.reconstruct(), &dense, 1e-12);
    }

    #[test]
    fn test_solve() {
        let dense = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let b = array![1.0_f64, 2.0, 3.0];
        let lu = SparseLu::factorize(&a, LuConfig::default());
        let x = lu.solve(&b).expect("solvable system");
        let ax = dense.dot(&x);
        for i in 0..3 {
            assert_relative_eq!(ax[i], b[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_btran() {
        let dense = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let b = array![1.0_f64, -1.0, 2.0];
        let lu = SparseLu::factorize(&a, LuConfig::default());
        let x = lu.btran(&b).expect("solvable system");
        let atx = dense.t().dot(&x);
        for i in 0..3 {
            assert_relative_eq!(atx[i], b[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_singular_rank() {
        let dense = array![[1.0_f64, 2.0, 3.0], [2.0, 4.0, 6.0], [1.0, 0.0, 1.0]];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let mut lu = SparseLu::new(LuConfig::default());
        assert!(!lu.decompose(&a));
        assert_eq!(lu.rank(), 2);
        assert!(!lu.is_solvable());
        assert_eq!(lu.solve(&array![1.0_f64, 1.0, 1.0]), Err(LuError::Singular));
        assert_matrix_eq(&lu.reconstruct(), &dense, 1e-10);
    }

    #[test]
    fn test_rectangular() {
        let dense = array![[2.0_f64, 1.0], [4.0, 3.0], [6.0, 7.0]];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let lu = SparseLu::factorize(&a, LuConfig::default());
        assert_eq!(lu.rank(), 2);
        assert_matrix_eq(&lu.reconstruct(), &dense, 1e-12);
    }

    #[test]
    fn test_preserves_sparsity() {
        // Tridiagonal input: L and U stay banded, no full fill-in.
        let n = 10;
        let mut dense = Array2::from_elem((n, n), 0.0_f64);
        for i in 0..n {
            dense[[i, i]] = 4.0;
            if i > 0 {
                dense[[i, i - 1]] = -1.0;
            }
            if i + 1 < n {
                dense[[i, i + 1]] = -1.0;
            }
        }
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let lu = SparseLu::factorize(&a, LuConfig::default());
        assert!(lu.is_solvable());
        // Banded elimination with no pivoting churn: one subdiagonal in L,
        // one superdiagonal in U.
        assert!(lu.l().nnz() <= n - 1 + n / 2);
        assert!(lu.u().nnz() <= n - 1 + n / 2);
        assert_matrix_eq(&lu.reconstruct(), &dense, 1e-12);
    }

    #[test]
    fn test_determinant() {
        let dense = array![[4.0_f64, 1.0], [2.0, 3.0]];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let lu = SparseLu::factorize(&a, LuConfig::default());
        assert_relative_eq!(lu.determinant(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse() {
        let dense = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let lu = SparseLu::factorize(&a, LuConfig::default());
        let inv = lu.inverse().expect("nonsingular");
        let prod = dense.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(prod[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }
}
