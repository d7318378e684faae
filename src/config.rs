//! Numeric tolerance context shared by the dense and sparse engines.

use num_traits::{Float, FromPrimitive};

/// Tolerance configuration for factorization, solve, and update.
///
/// Two thresholds are kept apart on purpose: `zero_tolerance` decides what
/// counts as structurally zero (rank counting, spike extent, pivot search),
/// while `pivot_tolerance` is the much smaller bound below which a diagonal
/// pivot of U must not be divided by during substitution.
#[derive(Debug, Clone, Copy)]
pub struct LuConfig<R> {
    /// Magnitude below which a value is treated as numerically zero.
    pub zero_tolerance: R,
    /// Magnitude below which a U diagonal makes the system unsolvable.
    pub pivot_tolerance: R,
}

impl Default for LuConfig<f64> {
    fn default() -> Self {
        Self {
            zero_tolerance: 1e-12,
            pivot_tolerance: 1e-30,
        }
    }
}

impl Default for LuConfig<f32> {
    fn default() -> Self {
        Self {
            zero_tolerance: 1e-5,
            pivot_tolerance: 1e-20,
        }
    }
}

impl<R: Float + FromPrimitive> LuConfig<R> {
    /// Create a config with a custom zero tolerance and a pivot tolerance
    /// scaled well below it.
    pub fn with_tolerance(zero_tolerance: R) -> Self {
        Self {
            zero_tolerance,
            pivot_tolerance: zero_tolerance * R::from_f64(1e-18).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ordering() {
        let config = LuConfig::<f64>::default();
        assert!(config.pivot_tolerance < config.zero_tolerance);
    }

    #[test]
    fn test_with_tolerance() {
        let config = LuConfig::with_tolerance(1e-9_f64);
        assert_eq!(config.zero_tolerance, 1e-9);
        assert!(config.pivot_tolerance < config.zero_tolerance);
    }
}
