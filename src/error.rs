//! Error types for factorization and solve operations.

use thiserror::Error;

/// Errors a caller can recover from.
///
/// Rank deficiency detected during `decompose` or `update_column` is not an
/// error: it is reported through the boolean return value and queryable via
/// `rank()` / `is_solvable()`. An error is raised only when an operation is
/// asked to produce something a singular factorization cannot deliver.
/// Precondition violations (out-of-range indices, mismatched preallocated
/// buffers, solving before decomposing) are caller bugs and panic instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LuError {
    /// A diagonal pivot of U is below the pivot tolerance; the system has no
    /// trustworthy solution.
    #[error("matrix is singular or nearly singular")]
    Singular,
    /// Right-hand side length does not match the factorized matrix.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
