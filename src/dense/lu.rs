//! Dense LU factorization with partial pivoting.
//!
//! Factors `A` (m × n) into `P_row · A · P_colᵀ = L · U` with `L` unit lower
//! triangular (m × r, diagonal implicit) and `U` upper triangular (r × n),
//! `r = min(m, n)`. The column permutation is the identity after a fresh
//! decompose; column updates may introduce a nontrivial one.

use crate::config::LuConfig;
use crate::error::LuError;
use crate::perm::Permutation;
use crate::traits::ComplexField;
use ndarray::{Array1, Array2};

/// Dense LU factorization instance.
///
/// Lifecycle: created empty via [`DenseLu::new`], populated by
/// [`DenseLu::decompose`], consumed by the solve/inverse/update operations,
/// and returned to the empty state by [`DenseLu::reset`]. An update mutates
/// the instance in place, leaving a new consistent factorization.
#[derive(Debug, Clone)]
pub struct DenseLu<T: ComplexField> {
    pub(crate) l: Array2<T>,
    pub(crate) u: Array2<T>,
    pub(crate) row_perm: Permutation,
    pub(crate) col_perm: Permutation,
    pub(crate) rank: usize,
    pub(crate) solvable: bool,
    pub(crate) decomposed: bool,
    pub(crate) m: usize,
    pub(crate) n: usize,
    pub(crate) config: LuConfig<T::Real>,
}

impl<T: ComplexField> DenseLu<T> {
    /// Create an empty instance. No operation other than `decompose` is valid
    /// until it has been populated.
    pub fn new(config: LuConfig<T::Real>) -> Self {
        Self {
            l: Array2::from_elem((0, 0), T::zero()),
            u: Array2::from_elem((0, 0), T::zero()),
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

    /// Factor `a` in one step. Query [`DenseLu::is_solvable`] and
    /// [`DenseLu::rank`] on the result.
    pub fn factorize(a: &Array2<T>, config: LuConfig<T::Real>) -> Self {
        let mut lu = Self::new(config);
        lu.decompose(a);
        lu
    }

    /// Gaussian elimination with partial pivoting.
    ///
    /// Returns `false` when some pivot column is numerically zero for all
    /// remaining rows. This signals rank deficiency; a best-effort triangular
    /// factorization is still left in place and `rank()` reports the numeric
    /// rank.
    pub fn decompose(&mut self, a: &Array2<T>) -> bool {
        let (m, n) = a.dim();
        let r = m.min(n);
        self.m = m;
        self.n = n;
        self.row_perm.reset(m);
        self.col_perm.reset(n);

        let mut w = a.clone();
        let mut ok = true;

        for k in 0..r {
            // Partial pivoting: largest magnitude in column k among rows >= k.
            // Strict comparison keeps the earliest row on ties.
            let mut max_val = w[[k, k]].norm();
            let mut max_row = k;
            for i in (k + 1)..m {
                let v = w[[i, k]].norm();
                if v > max_val {
                    max_val = v;
                    max_row = i;
                }
            }

            if max_val <= self.config.zero_tolerance {
                // Column is numerically zero below the diagonal: no pivot.
                // Clear the residue so L stays clean and move on.
                for i in k..m {
                    w[[i, k]] = T::zero();
                }
                ok = false;
                continue;
            }

            if max_row != k {
                for j in 0..n {
                    let tmp = w[[k, j]];
                    w[[k, j]] = w[[max_row, j]];
                    w[[max_row, j]] = tmp;
                }
                self.row_perm.swap(k, max_row);
            }

            let pivot = w[[k, k]];
            for i in (k + 1)..m {
                let mult = w[[i, k]] * pivot.inv();
                w[[i, k]] = mult;
                for j in (k + 1)..n {
                    let upd = mult * w[[k, j]];
                    w[[i, j]] -= upd;
                }
            }
        }

        // Split the working matrix into the unit-lower and upper factors.
        self.l = Array2::from_elem((m, r), T::zero());
        self.u = Array2::from_elem((r, n), T::zero());
        for i in 0..m {
            for j in 0..r.min(i) {
                self.l[[i, j]] = w[[i, j]];
            }
        }
        for i in 0..r {
            for j in i..n {
                self.u[[i, j]] = w[[i, j]];
            }
        }

        self.decomposed = true;
        self.recompute_rank();
        log::debug!(
            "dense decompose: {}x{} matrix, rank {} of {}",
            m,
            n,
            self.rank,
            r
        );
        ok
    }

    /// Drop the factors and return to the empty state, forcing the next use
    /// to run a full decompose.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    pub(crate) fn recompute_rank(&mut self) {
        let r = self.m.min(self.n);
        self.rank = (0..r)
            .filter(|&i| self.u[[i, i]].norm() > self.config.zero_tolerance)
            .count();
        self.solvable = self.m == self.n && self.rank == self.n;
    }

    /// Unit lower-triangular factor (diagonal implicit).
    pub fn l(&self) -> &Array2<T> {
        &self.l
    }

    /// Upper-triangular factor.
    pub fn u(&self) -> &Array2<T> {
        &self.u
    }

    pub fn row_perm(&self) -> &Permutation {
        &self.row_perm
    }

    pub fn col_perm(&self) -> &Permutation {
        &self.col_perm
    }

    /// Numeric rank: U diagonal entries above the zero tolerance.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Whether the factorization supports solving: square and full rank.
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

    /// Rebuild the factored matrix: `P_rowᵀ · L · U · P_col`, i.e. the matrix
    /// this factorization currently represents.
    pub fn reconstruct(&self) -> Array2<T> {
        assert!(self.decomposed, "reconstruct called before decompose");
        let r = self.m.min(self.n);
        let ro = self.row_perm.order();
        let co = self.col_perm.order();
        let mut out = Array2::from_elem((self.m, self.n), T::zero());
        for i in 0..self.m {
            for j in 0..self.n {
                let mut s = T::zero();
                for k in 0..r {
                    if k > i || k > j {
                        break;
                    }
                    let lik = if k == i { T::one() } else { self.l[[i, k]] };
                    s += lik * self.u[[k, j]];
                }
                out[[ro[i], co[j]]] = s;
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

    /// `ftran` into a preallocated buffer. The buffer's prior contents are
    /// overwritten, never read, so it can be reused across calls.
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

        // y = P_row · rhs
        self.row_perm.permute_into(rhs, out);

        // L z = y (unit diagonal)
        for i in 1..n {
            let mut s = out[i];
            for j in 0..i {
                s -= self.l[[i, j]] * out[j];
            }
            out[i] = s;
        }

        // U t = z
        for i in (0..n).rev() {
            let mut s = out[i];
            for j in (i + 1)..n {
                s -= self.u[[i, j]] * out[j];
            }
            let u_ii = self.u[[i, i]];
            if u_ii.norm() <= self.config.pivot_tolerance {
                return Err(LuError::Singular);
            }
            out[i] = s * u_ii.inv();
        }

        // x = P_colᵀ · t
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
    /// [`DenseLu::ftran_into`].
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

        // y = P_col · rhs
        self.col_perm.permute_into(rhs, out);

        // Uᵗ z = y: lower triangular with U's diagonal.
        for i in 0..n {
            let mut s = out[i];
            for j in 0..i {
                s -= self.u[[j, i]] * out[j];
            }
            let u_ii = self.u[[i, i]];
            if u_ii.norm() <= self.config.pivot_tolerance {
                return Err(LuError::Singular);
            }
            out[i] = s * u_ii.inv();
        }

        // Lᵗ t = z: unit upper triangular.
        for i in (0..n).rev() {
            let mut s = out[i];
            for j in (i + 1)..n {
                s -= self.l[[j, i]] * out[j];
            }
            out[i] = s;
        }

        // x = P_rowᵀ · t
        if !self.row_perm.is_identity() {
            let t = out.clone();
            self.row_perm.unpermute_into(&t, out);
        }
        Ok(())
    }

    /// Solve `A x = b`. Alias for [`DenseLu::ftran`].
    pub fn solve(&self, b: &Array1<T>) -> Result<Array1<T>, LuError> {
        self.ftran(b)
    }

    /// The inverse of the factored matrix: `ftran` against the identity,
    /// column by column.
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
        for i in 0..self.n {
            det *= self.u[[i, i]];
        }
        det
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use num_complex::Complex64;

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
        let a = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        assert!(lu.is_solvable());
        assert_eq!(lu.rank(), 3);
        assert_matrix_eq(&lu.reconstruct(), &a, 1e-12);
    }

    #[test]
    fn test_pivoting_order() {
        // Row 2 has the largest leading entry and must pivot first.
        let a = array![[1.0_f64, 2.0], [8.0, 3.0]];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        assert_eq!(lu.row_perm().order(), &[1, 0]);
        assert_matrix_eq(&lu.reconstruct(), &a, 1e-12);
    }

    #[test]
    fn test_solve() {
        let a = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let b = array![1.0_f64, 2.0, 3.0];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        let x = lu.solve(&b).expect("solvable system");
        let ax = a.dot(&x);
        for i in 0..3 {
            assert_relative_eq!(ax[i], b[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_btran() {
        let a = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let b = array![1.0_f64, -1.0, 2.0];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        let x = lu.btran(&b).expect("solvable system");
        let atx = a.t().dot(&x);
        for i in 0..3 {
            assert_relative_eq!(atx[i], b[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_ftran_into_buffer_reuse() {
        let a = array![[2.0_f64, 1.0], [1.0, 3.0]];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        let mut buf = array![99.0_f64, 99.0];
        lu.ftran_into(&array![1.0_f64, 0.0], &mut buf).unwrap();
        let first = buf.clone();
        lu.ftran_into(&array![0.0_f64, 1.0], &mut buf).unwrap();
        // Buffer fully overwritten by the second call.
        assert!((buf[0] - first[0]).abs() > 1e-12);
    }

    #[test]
    fn test_rectangular_tall() {
        let a = array![[2.0_f64, 1.0], [4.0, 3.0], [6.0, 7.0]];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        assert_eq!(lu.rank(), 2);
        assert!(!lu.is_solvable());
        assert_matrix_eq(&lu.reconstruct(), &a, 1e-12);
    }

    #[test]
    fn test_rectangular_fat() {
        let a = array![[2.0_f64, 1.0, 5.0], [4.0, 3.0, -1.0]];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        assert_eq!(lu.rank(), 2);
        assert_matrix_eq(&lu.reconstruct(), &a, 1e-12);
    }

    #[test]
    fn test_singular_rank() {
        // Row 1 is twice row 0.
        let a = array![[1.0_f64, 2.0, 3.0], [2.0, 4.0, 6.0], [1.0, 0.0, 1.0]];
        let mut lu = DenseLu::new(LuConfig::default());
        let full_rank = lu.decompose(&a);
        assert!(!full_rank);
        assert_eq!(lu.rank(), 2);
        assert!(!lu.is_solvable());
        assert_eq!(lu.solve(&array![1.0_f64, 1.0, 1.0]), Err(LuError::Singular));
        assert_matrix_eq(&lu.reconstruct(), &a, 1e-10);
    }

    #[test]
    fn test_idempotent_decompose() {
        let a = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let mut lu = DenseLu::new(LuConfig::default());
        lu.decompose(&a);
        let l1 = lu.l().clone();
        let u1 = lu.u().clone();
        lu.decompose(&a);
        assert_eq!(lu.l(), &l1);
        assert_eq!(lu.u(), &u1);
    }

    #[test]
    fn test_determinant() {
        let a = array![[4.0_f64, 1.0], [2.0, 3.0]];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        assert_relative_eq!(lu.determinant(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse() {
        let a = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        let inv = lu.inverse().expect("nonsingular");
        let prod = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(prod[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_inverse_singular_is_recoverable() {
        let a = array![[1.0_f64, 2.0], [2.0, 4.0]];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        assert_eq!(lu.inverse(), Err(LuError::Singular));
    }

    #[test]
    fn test_complex_solve() {
        let a = array![
            [Complex64::new(4.0, 1.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(1.0, 0.0), Complex64::new(3.0, -1.0)],
        ];
        let b = array![Complex64::new(1.0, 1.0), Complex64::new(2.0, -1.0)];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        let x = lu.solve(&b).expect("solvable system");
        let ax = a.dot(&x);
        for i in 0..2 {
            assert_relative_eq!((ax[i] - b[i]).norm(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    #[should_panic]
    fn test_ftran_before_decompose_panics() {
        let lu: DenseLu<f64> = DenseLu::new(LuConfig::default());
        let _ = lu.ftran(&array![1.0_f64]);
    }

    #[test]
    fn test_reset() {
        let a = array![[2.0_f64, 1.0], [1.0, 3.0]];
        let mut lu = DenseLu::factorize(&a, LuConfig::default());
        assert!(lu.is_decomposed());
        lu.reset();
        assert!(!lu.is_decomposed());
    }

    #[test]
    fn test_dimension_mismatch_rhs() {
        let a = array![[2.0_f64, 1.0], [1.0, 3.0]];
        let lu = DenseLu::factorize(&a, LuConfig::default());
        assert_eq!(
            lu.solve(&array![1.0_f64, 2.0, 3.0]),
            Err(LuError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        );
    }
}
