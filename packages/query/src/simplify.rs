//! Geometry simplification tolerances for admin-region queries.

/// Countries whose boundaries are large enough to warrant a coarser
/// tolerance.
pub const LARGE_COUNTRIES: &[&str] = &["USA", "RUS", "CAN", "CHN", "BRA", "IDN"];

/// Admin level a tolerance is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminLevel {
    /// Whole country.
    National,
    /// First- or second-level unit, one hundredth of the national tolerance.
    Subnational,
}

impl AdminLevel {
    /// `(large country, default)` tolerances at this level.
    const fn tolerances(self) -> (f64, f64) {
        match self {
            Self::National => (0.05, 0.005),
            Self::Subnational => (0.0005, 0.000_05),
        }
    }
}

/// Simplification tolerance for `iso` at `level`.
///
/// `iso` is expected upper-cased.
#[must_use]
pub fn threshold(iso: &str, level: AdminLevel) -> f64 {
    let (large, default) = level.tolerances();
    if LARGE_COUNTRIES.contains(&iso) {
        large
    } else {
        default
    }
}
