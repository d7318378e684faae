//! Incremental column update for a sparse factorization.
//!
//! Same state machine as the dense engine, operating on the CSC-L /
//! CSR-U-plus-diagonal structures directly. Only the window of U rows and L
//! columns between the updated column position and the spike extent is
//! rewritten; entries outside the window are relabeled in a single rebuild
//! pass and never recomputed, so no nonzero appears outside the touched
//! row/column range.

use crate::sparse::{CscMatrix, CsrMatrix, SparseLu};
use crate::traits::ComplexField;
use ndarray::Array1;

impl<T: ComplexField> SparseLu<T> {
    /// Replace column `k` of the factored matrix with `col`, updating the
    /// permutations, L, and U in place.
    ///
    /// Returns `true` when the updated factorization is solvable.
    ///
    /// # Panics
    ///
    /// Panics if no decompose has run, the factorization is not square, `k`
    /// is out of range, or `col` has the wrong length.
    pub fn update_column(&mut self, k: usize, col: &Array1<T>) -> bool {
        assert!(self.decomposed, "update_column called before decompose");
        assert_eq!(
            self.m, self.n,
            "update_column requires a square factorization"
        );
        assert!(k < self.n, "column index out of range");
        assert_eq!(col.len(), self.m, "replacement column length mismatch");
        let n = self.n;
        let tol = self.config.zero_tolerance;

        // Spike: forward-substitute the permuted column through L.
        let mut w = self.row_perm.permute(col);
        for i in 0..n {
            let wi = w[i];
            if wi.is_zero() {
                continue;
            }
            for (rr, lv) in self.l.col_entries(i) {
                let upd = lv * wi;
                w[rr] -= upd;
            }
        }

        let j0 = self.col_perm.position_of(k);

        let p = match (0..n).rev().find(|&i| w[i].norm() > tol) {
            None => {
                self.replace_u_column(j0, &[], T::zero());
                self.recompute_rank();
                log::warn!(
                    "column update at {k}: transformed column is zero, rank now {}",
                    self.rank
                );
                return false;
            }
            Some(p) if p <= j0 => {
                // Fits the triangular envelope; a straight column write.
                let entries: Vec<(usize, T)> = (0..=p)
                    .filter(|&i| i < j0 && w[i].norm() > tol)
                    .map(|i| (i, w[i]))
                    .collect();
                let diag = if p == j0 { w[j0] } else { T::zero() };
                self.replace_u_column(j0, &entries, diag);
                self.recompute_rank();
                log::debug!("column update at {k}: spike within envelope");
                return self.solvable;
            }
            Some(p) => p,
        };

        let win = p - j0 + 1;

        // Adjacent exchanges move the updated column to position p.
        for j in j0..p {
            self.col_perm.swap(j, j + 1);
        }

        // Window rows of U with shifted column labels; the old column j0 is
        // dropped and the spike lands at label p. Each row vector holds the
        // full row including the diagonal, sorted by label.
        let mut uw: Vec<Vec<(usize, T)>> = Vec::with_capacity(win);
        for i in j0..=p {
            let mut row: Vec<(usize, T)> = Vec::new();
            if i > j0 {
                let d = self.u_diag[i];
                if d.norm() > tol {
                    row.push((i - 1, d));
                }
            }
            for (c, v) in self.u.row_entries(i) {
                let nc = if c > j0 && c <= p { c - 1 } else { c };
                row.push((nc, v));
            }
            if w[i].norm() > tol {
                add_to_entry(&mut row, p, w[i]);
            }
            uw.push(row);
        }

        // Window columns of L, full columns by pivot position.
        let mut lw: Vec<Vec<(usize, T)>> = (j0..=p)
            .map(|c| self.l.col_entries(c).collect())
            .collect();

        // Net permutation of the window rows, applied lazily to L entries in
        // columns left of the window during the rebuild.
        let mut slot_to_old: Vec<usize> = (0..win).collect();

        for ij in j0..p {
            let s = ij - j0;
            let sub = entry_value(&uw[s + 1], ij).unwrap_or_else(T::zero);
            let diag = entry_value(&uw[s], ij).unwrap_or_else(T::zero);

            // Ties keep the existing order to minimize permutation churn.
            if sub.norm() > diag.norm() {
                // Exchange rows ij/ij+1 of U and rows and columns of L. The
                // old multiplier at (ij+1, ij) moves above the diagonal;
                // the compensating pair of operations removes it again.
                let alpha = remove_entry(&mut lw[s], ij + 1).unwrap_or_else(T::zero);
                lw.swap(s, s + 1);
                for colvec in lw.iter_mut() {
                    swap_adjacent_labels(colvec, ij);
                }
                uw.swap(s, s + 1);
                slot_to_old.swap(s, s + 1);
                self.row_perm.swap(ij, ij + 1);
                if !alpha.is_zero() {
                    let merged = merge_axpy(&lw[s + 1], -alpha, &lw[s], tol);
                    lw[s + 1] = merged;
                    let merged = merge_axpy(&uw[s], alpha, &uw[s + 1], tol);
                    uw[s] = merged;
                }
            }

            let sub = entry_value(&uw[s + 1], ij).unwrap_or_else(T::zero);
            if sub.norm() > tol {
                let piv = entry_value(&uw[s], ij).unwrap_or_else(T::zero);
                if piv.norm() <= self.config.pivot_tolerance {
                    remove_entry(&mut uw[s + 1], ij);
                    log::warn!("column update at {k}: vanishing pivot at position {ij}");
                    continue;
                }
                let mult = sub * piv.inv();
                let merged = merge_axpy(&uw[s + 1], -mult, &uw[s], tol);
                uw[s + 1] = merged;
                remove_entry(&mut uw[s + 1], ij);
                // L picks up the inverse transform so L·U is unchanged.
                add_to_entry(&mut lw[s], ij + 1, mult);
                let merged = merge_axpy(&lw[s], mult, &lw[s + 1], tol);
                lw[s] = merged;
            } else {
                remove_entry(&mut uw[s + 1], ij);
            }
        }

        let mut old_to_new = vec![0usize; win];
        for (s, &o) in slot_to_old.iter().enumerate() {
            old_to_new[o] = s;
        }

        // Rebuild U: rows above the window get the relabel and the spike
        // entry, window rows come from the chase, rows below are untouched.
        let mut u_values = Vec::with_capacity(self.u.nnz() + win);
        let mut u_col_indices = Vec::with_capacity(self.u.nnz() + win);
        let mut u_row_ptrs = vec![0usize; n + 1];
        for i in 0..n {
            if i < j0 {
                let mut row: Vec<(usize, T)> = Vec::new();
                for (c, v) in self.u.row_entries(i) {
                    if c == j0 {
                        continue;
                    }
                    let nc = if c > j0 && c <= p { c - 1 } else { c };
                    row.push((nc, v));
                }
                if w[i].norm() > tol {
                    add_to_entry(&mut row, p, w[i]);
                }
                for (c, v) in row {
                    u_col_indices.push(c);
                    u_values.push(v);
                }
            } else if i <= p {
                let mut diag = T::zero();
                for &(c, v) in &uw[i - j0] {
                    if c == i {
                        diag = v;
                    } else {
                        debug_assert!(c > i, "subdiagonal residue after chase");
                        u_col_indices.push(c);
                        u_values.push(v);
                    }
                }
                self.u_diag[i] = diag;
            } else {
                for (c, v) in self.u.row_entries(i) {
                    u_col_indices.push(c);
                    u_values.push(v);
                }
            }
            u_row_ptrs[i + 1] = u_values.len();
        }
        self.u = CsrMatrix {
            num_rows: n,
            num_cols: n,
            values: u_values,
            col_indices: u_col_indices,
            row_ptrs: u_row_ptrs,
        };

        // Rebuild L: columns left of the window only see the net row
        // permutation, window columns come from the chase, columns right of
        // it cannot reference window rows at all.
        let mut l_values = Vec::with_capacity(self.l.nnz() + win);
        let mut l_row_indices = Vec::with_capacity(self.l.nnz() + win);
        let mut l_col_ptrs = vec![0usize; n + 1];
        for c in 0..n {
            if c < j0 {
                let mut coltmp: Vec<(usize, T)> = self
                    .l
                    .col_entries(c)
                    .map(|(pos, v)| {
                        let np = if pos >= j0 && pos <= p {
                            j0 + old_to_new[pos - j0]
                        } else {
                            pos
                        };
                        (np, v)
                    })
                    .collect();
                coltmp.sort_unstable_by_key(|&(pos, _)| pos);
                for (pos, v) in coltmp {
                    l_row_indices.push(pos);
                    l_values.push(v);
                }
            } else if c <= p {
                for &(pos, v) in &lw[c - j0] {
                    debug_assert!(pos > c, "off-triangle residue in L");
                    l_row_indices.push(pos);
                    l_values.push(v);
                }
            } else {
                for (pos, v) in self.l.col_entries(c) {
                    l_row_indices.push(pos);
                    l_values.push(v);
                }
            }
            l_col_ptrs[c + 1] = l_values.len();
        }
        self.l = CscMatrix {
            num_rows: n,
            num_cols: n,
            values: l_values,
            row_indices: l_row_indices,
            col_ptrs: l_col_ptrs,
        };

        self.recompute_rank();
        log::debug!(
            "column update at {k}: spike travelled {} positions, rank {}",
            p - j0,
            self.rank
        );
        if !self.solvable {
            log::warn!("column update at {k} left a rank-deficient factorization");
        }
        self.solvable
    }

    /// Replace the strictly-upper entries and diagonal of U column `j0`
    /// without structural changes elsewhere. `new_entries` are (row, value)
    /// pairs with row < j0, sorted by row.
    fn replace_u_column(&mut self, j0: usize, new_entries: &[(usize, T)], diag: T) {
        let r = self.u.num_rows;
        let mut values = Vec::with_capacity(self.u.nnz() + new_entries.len());
        let mut col_indices = Vec::with_capacity(self.u.nnz() + new_entries.len());
        let mut row_ptrs = vec![0usize; r + 1];

        for i in 0..r {
            let replacement = new_entries
                .binary_search_by_key(&i, |&(row, _)| row)
                .ok()
                .map(|idx| new_entries[idx].1);
            let mut inserted = false;
            for (c, v) in self.u.row_entries(i) {
                if c == j0 {
                    continue;
                }
                if !inserted && c > j0 {
                    if let Some(val) = replacement {
                        col_indices.push(j0);
                        values.push(val);
                    }
                    inserted = true;
                }
                col_indices.push(c);
                values.push(v);
            }
            if !inserted {
                if let Some(val) = replacement {
                    col_indices.push(j0);
                    values.push(val);
                }
            }
            row_ptrs[i + 1] = values.len();
        }

        self.u = CsrMatrix {
            num_rows: r,
            num_cols: self.u.num_cols,
            values,
            col_indices,
            row_ptrs,
        };
        self.u_diag[j0] = diag;
    }
}

/// Value at `label` in a sorted sparse vector.
fn entry_value<T: ComplexField>(vec: &[(usize, T)], label: usize) -> Option<T> {
    vec.binary_search_by_key(&label, |&(l, _)| l)
        .ok()
        .map(|idx| vec[idx].1)
}

/// Remove and return the entry at `label`, if stored.
fn remove_entry<T: ComplexField>(vec: &mut Vec<(usize, T)>, label: usize) -> Option<T> {
    match vec.binary_search_by_key(&label, |&(l, _)| l) {
        Ok(idx) => Some(vec.remove(idx).1),
        Err(_) => None,
    }
}

/// Add `delta` to the entry at `label`, inserting it if absent.
fn add_to_entry<T: ComplexField>(vec: &mut Vec<(usize, T)>, label: usize, delta: T) {
    match vec.binary_search_by_key(&label, |&(l, _)| l) {
        Ok(idx) => vec[idx].1 += delta,
        Err(idx) => vec.insert(idx, (label, delta)),
    }
}

/// Exchange the labels `i` and `i+1` in a sorted sparse vector. Adjacent
/// labels keep the vector sorted without a general resort.
fn swap_adjacent_labels<T: ComplexField>(vec: &mut [(usize, T)], i: usize) {
    let a = vec.binary_search_by_key(&i, |&(l, _)| l);
    let b = vec.binary_search_by_key(&(i + 1), |&(l, _)| l);
    match (a, b) {
        (Ok(ia), Ok(ib)) => {
            let tmp = vec[ia].1;
            vec[ia].1 = vec[ib].1;
            vec[ib].1 = tmp;
        }
        (Ok(ia), Err(_)) => vec[ia].0 = i + 1,
        (Err(_), Ok(ib)) => vec[ib].0 = i,
        (Err(_), Err(_)) => {}
    }
}

/// Sorted-merge `target + coef * source`. Entries only present in `target`
/// are kept as they are; freshly written values below `drop_tol` are dropped
/// to bound fill.
fn merge_axpy<T: ComplexField>(
    target: &[(usize, T)],
    coef: T,
    source: &[(usize, T)],
    drop_tol: T::Real,
) -> Vec<(usize, T)> {
    let mut out = Vec::with_capacity(target.len() + source.len());
    let mut ti = 0;
    let mut si = 0;
    while ti < target.len() || si < source.len() {
        if si >= source.len() || (ti < target.len() && target[ti].0 < source[si].0) {
            out.push(target[ti]);
            ti += 1;
        } else if ti >= target.len() || source[si].0 < target[ti].0 {
            let v = coef * source[si].1;
            if v.norm() > drop_tol {
                out.push((source[si].0, v));
            }
            si += 1;
        } else {
            let v = target[ti].1 + coef * source[si].1;
            if v.norm() > drop_tol {
                out.push((target[ti].0, v));
            }
            ti += 1;
            si += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::config::LuConfig;
    use crate::sparse::{CscMatrix, SparseLu};
    use approx::assert_relative_eq;
    use ndarray::{array, Array1, Array2};

    fn assert_matrix_eq(a: &Array2<f64>, b: &Array2<f64>, eps: f64) {
        assert_eq!(a.dim(), b.dim());
        for i in 0..a.nrows() {
            for j in 0..a.ncols() {
                assert_relative_eq!(a[[i, j]], b[[i, j]], epsilon = eps);
            }
        }
    }

    fn with_column(a: &Array2<f64>, k: usize, col: &Array1<f64>) -> Array2<f64> {
        let mut out = a.clone();
        for i in 0..a.nrows() {
            out[[i, k]] = col[i];
        }
        out
    }

    #[test]
    fn test_update_reconstructs_modified_matrix() {
        let dense = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let c = array![1.0_f64, 4.0, 2.0];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let mut lu = SparseLu::factorize(&a, LuConfig::default());
        assert!(lu.update_column(1, &c));
        let expected = with_column(&dense, 1, &c);
        assert_matrix_eq(&lu.reconstruct(), &expected, 1e-10);
    }

    #[test]
    fn test_update_then_solve() {
        let dense = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let c = array![1.0_f64, 4.0, 2.0];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let mut lu = SparseLu::factorize(&a, LuConfig::default());
        lu.update_column(1, &c);

        let modified = with_column(&dense, 1, &c);
        let b = array![1.0_f64, -2.0, 0.5];
        let x = lu.solve(&b).expect("solvable after update");
        let ax = modified.dot(&x);
        for i in 0..3 {
            assert_relative_eq!(ax[i], b[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_update_within_envelope() {
        let dense = array![[2.0_f64, 1.0, 1.0], [0.0, 3.0, 2.0], [0.0, 0.0, 4.0]];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let mut lu = SparseLu::factorize(&a, LuConfig::default());
        let c = array![5.0_f64, 0.0, 0.0];
        assert!(lu.update_column(0, &c));
        assert!(lu.col_perm().is_identity());
        let expected = with_column(&dense, 0, &c);
        assert_matrix_eq(&lu.reconstruct(), &expected, 1e-12);
    }

    #[test]
    fn test_update_zero_column_drops_rank() {
        let dense = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let mut lu = SparseLu::factorize(&a, LuConfig::default());
        let zero = array![0.0_f64, 0.0, 0.0];
        assert!(!lu.update_column(2, &zero));
        assert_eq!(lu.rank(), 2);
        assert!(!lu.is_solvable());
    }

    #[test]
    fn test_sequential_updates_compose() {
        let dense = array![
            [4.0_f64, 1.0, 0.0, 2.0],
            [2.0, 3.0, 1.0, 0.0],
            [1.0, 1.0, 2.0, 1.0],
            [0.0, 2.0, 1.0, 5.0]
        ];
        let c0 = array![1.0_f64, 2.0, -1.0, 3.0];
        let c2 = array![0.5_f64, 1.5, 4.0, -2.0];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let mut lu = SparseLu::factorize(&a, LuConfig::default());
        assert!(lu.update_column(0, &c0));
        assert!(lu.update_column(2, &c2));
        let expected = with_column(&with_column(&dense, 0, &c0), 2, &c2);
        assert_matrix_eq(&lu.reconstruct(), &expected, 1e-10);
    }

    #[test]
    fn test_update_preserves_pattern_outside_window() {
        // Banded matrix: an update at the last column must leave the leading
        // rows' sparsity untouched.
        let n = 8;
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
        let mut lu = SparseLu::factorize(&a, LuConfig::default());

        // Replacement touching only the last two rows: the spike cannot
        // reach above position n-2.
        let mut c = Array1::from_elem(n, 0.0_f64);
        c[n - 2] = 1.0;
        c[n - 1] = 3.0;
        let u_nnz_before: Vec<usize> = (0..n - 2).map(|i| lu.u().row_range(i).len()).collect();
        assert!(lu.update_column(n - 1, &c));
        let u_nnz_after: Vec<usize> = (0..n - 2).map(|i| lu.u().row_range(i).len()).collect();
        assert_eq!(u_nnz_before, u_nnz_after);

        let expected = with_column(&dense, n - 1, &c);
        assert_matrix_eq(&lu.reconstruct(), &expected, 1e-10);
    }

    #[test]
    fn test_repeated_update_same_column() {
        let dense = array![[4.0_f64, 1.0, 0.0], [2.0, 3.0, 1.0], [1.0, 1.0, 2.0]];
        let c1 = array![1.0_f64, 4.0, 2.0];
        let c2 = array![3.0_f64, -1.0, 1.0];
        let a = CscMatrix::from_dense(&dense, 1e-15);
        let mut lu = SparseLu::factorize(&a, LuConfig::default());
        lu.update_column(1, &c1);
        lu.update_column(1, &c2);
        let expected = with_column(&dense, 1, &c2);
        assert_matrix_eq(&lu.reconstruct(), &expected, 1e-10);
    }
}
