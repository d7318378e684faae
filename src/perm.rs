//! Row/column permutation tracking.
//!
//! A [`Permutation`] holds a reordering of `[0, n)` together with its inverse,
//! kept consistent on every edit. Position `i` of the order names the source
//! index that maps to `i`, so applying the permutation to a vector `v` is the
//! gather `out[i] = v[order[i]]`.

use crate::traits::ComplexField;
use ndarray::Array1;

/// A bijection on `[0, n)` with O(1) inverse lookup and O(1) transposition
/// edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    /// `order[i]` is the source index mapped to position `i`.
    order: Vec<usize>,
    /// Inverse: `rev[order[i]] == i`.
    rev: Vec<usize>,
}

impl Permutation {
    /// The identity permutation of size `n`.
    pub fn identity(n: usize) -> Self {
        Self {
            order: (0..n).collect(),
            rev: (0..n).collect(),
        }
    }

    /// Reset to the identity of size `n`, reusing the allocations when the
    /// size is unchanged.
    pub fn reset(&mut self, n: usize) {
        self.order.clear();
        self.order.extend(0..n);
        self.rev.clear();
        self.rev.extend(0..n);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.order.iter().enumerate().all(|(i, &k)| i == k)
    }

    /// Exchange positions `i` and `j` of the order, recording a transposition.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is out of range.
    pub fn swap(&mut self, i: usize, j: usize) {
        assert!(
            i < self.order.len() && j < self.order.len(),
            "permutation index out of range: swap({i}, {j}) on size {}",
            self.order.len()
        );
        self.order.swap(i, j);
        self.rev[self.order[i]] = i;
        self.rev[self.order[j]] = j;
    }

    /// The current order: `order()[i]` is the source index at position `i`.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// The inverse order: `reverse()[k]` is the position of source index `k`.
    pub fn reverse(&self) -> &[usize] {
        &self.rev
    }

    /// Position of source index `k` under the current order, O(1).
    pub fn position_of(&self, k: usize) -> usize {
        self.rev[k]
    }

    /// Parity of the permutation: +1 for an even number of transpositions,
    /// -1 for odd. Computed from the cycle structure.
    pub fn sign(&self) -> i32 {
        let n = self.order.len();
        let mut seen = vec![false; n];
        let mut sign = 1;
        for start in 0..n {
            if seen[start] {
                continue;
            }
            let mut len = 0;
            let mut i = start;
            while !seen[i] {
                seen[i] = true;
                i = self.order[i];
                len += 1;
            }
            if len % 2 == 0 {
                sign = -sign;
            }
        }
        sign
    }

    /// Gather `v` by the current order: `out[i] = v[order[i]]`.
    pub fn permute<T: ComplexField>(&self, v: &Array1<T>) -> Array1<T> {
        let mut out = Array1::from_elem(self.order.len(), T::zero());
        self.permute_into(v, &mut out);
        out
    }

    /// Gather into a preallocated buffer. Prior contents are overwritten.
    ///
    /// # Panics
    ///
    /// Panics if either length differs from the permutation size.
    pub fn permute_into<T: ComplexField>(&self, v: &Array1<T>, out: &mut Array1<T>) {
        assert_eq!(v.len(), self.order.len(), "vector length mismatch");
        assert_eq!(out.len(), self.order.len(), "output buffer length mismatch");
        for (i, &k) in self.order.iter().enumerate() {
            out[i] = v[k];
        }
    }

    /// Scatter `v` by the current order: `out[order[i]] = v[i]`. This is the
    /// application of the inverse permutation.
    pub fn unpermute<T: ComplexField>(&self, v: &Array1<T>) -> Array1<T> {
        let mut out = Array1::from_elem(self.order.len(), T::zero());
        self.unpermute_into(v, &mut out);
        out
    }

    /// Scatter into a preallocated buffer. Prior contents are overwritten.
    ///
    /// # Panics
    ///
    /// Panics if either length differs from the permutation size.
    pub fn unpermute_into<T: ComplexField>(&self, v: &Array1<T>, out: &mut Array1<T>) {
        assert_eq!(v.len(), self.order.len(), "vector length mismatch");
        assert_eq!(out.len(), self.order.len(), "output buffer length mismatch");
        for (i, &k) in self.order.iter().enumerate() {
            out[k] = v[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identity() {
        let p = Permutation::identity(4);
        assert!(p.is_identity());
        assert_eq!(p.order(), &[0, 1, 2, 3]);
        assert_eq!(p.reverse(), &[0, 1, 2, 3]);
        assert_eq!(p.sign(), 1);
    }

    #[test]
    fn test_swap_keeps_inverse() {
        let mut p = Permutation::identity(4);
        p.swap(0, 2);
        p.swap(1, 3);
        assert_eq!(p.order(), &[2, 3, 0, 1]);
        for k in 0..4 {
            assert_eq!(p.order()[p.position_of(k)], k);
        }
        assert!(!p.is_identity());
    }

    #[test]
    fn test_sign() {
        let mut p = Permutation::identity(3);
        assert_eq!(p.sign(), 1);
        p.swap(0, 1);
        assert_eq!(p.sign(), -1);
        p.swap(1, 2);
        assert_eq!(p.sign(), 1);
    }

    #[test]
    fn test_permute_unpermute_roundtrip() {
        let mut p = Permutation::identity(4);
        p.swap(0, 3);
        p.swap(1, 2);

        let v = array![10.0_f64, 20.0, 30.0, 40.0];
        let gathered = p.permute(&v);
        assert_eq!(gathered, array![40.0, 30.0, 20.0, 10.0]);

        let back = p.unpermute(&gathered);
        assert_eq!(back, v);
    }

    #[test]
    fn test_permute_into_overwrites() {
        let mut p = Permutation::identity(3);
        p.swap(0, 1);
        let v = array![1.0_f64, 2.0, 3.0];
        let mut buf = array![9.0_f64, 9.0, 9.0];
        p.permute_into(&v, &mut buf);
        assert_eq!(buf, array![2.0, 1.0, 3.0]);
    }

    #[test]
    #[should_panic]
    fn test_swap_out_of_range() {
        let mut p = Permutation::identity(3);
        p.swap(0, 5);
    }

    #[test]
    fn test_reset_reuses() {
        let mut p = Permutation::identity(3);
        p.swap(0, 2);
        p.reset(3);
        assert!(p.is_identity());
    }
}
