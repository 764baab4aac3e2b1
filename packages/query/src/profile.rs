//! Per-generation behavior, gathered into one strategy value.
//!
//! The legacy and revised schemas differ in where the region area comes
//! from, how rows are labelled, how far the composer falls back when the
//! aggregation is empty, and how download SQL is derived. Everything that
//! varies lives here so the composer has a single code path.

use imazon_alerts_models::{Generation, RegionKind};

/// Strategy describing how one generation composes its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationProfile {
    /// Generation this profile describes.
    pub generation: Generation,
    /// Resolve every region through the resolver before querying, and take
    /// the reported area from it.
    pub resolve_regions: bool,
    /// Take the reported area from the first aggregation row.
    pub area_from_rows: bool,
    /// Map categories to labels with a unit instead of echoing them.
    pub label_rows: bool,
    /// Walk the plain-area and resolver tiers when the aggregation is empty.
    pub tiered_fallback: bool,
    /// Echo the region id and period in the result.
    pub echo_request: bool,
    /// Add geometry columns to download SQL.
    pub rewrite_download_columns: bool,
    /// Countries the alert dataset covers.
    pub covered_countries: &'static [&'static str],
    /// Region kinds only queried inside [`Self::covered_countries`].
    pub gated_kinds: &'static [RegionKind],
    /// Rows returned by the latest-date endpoint when no limit is given.
    pub default_latest_limit: u32,
    /// Column the latest-date template reports its date under.
    pub latest_column: &'static str,
}

/// Legacy schema.
pub const V1: GenerationProfile = GenerationProfile {
    generation: Generation::V1,
    resolve_regions: true,
    area_from_rows: false,
    label_rows: false,
    tiered_fallback: false,
    echo_request: false,
    rewrite_download_columns: true,
    covered_countries: &["BRA"],
    gated_kinds: &[RegionKind::National, RegionKind::Province],
    default_latest_limit: 3,
    latest_column: "date",
};

/// Revised schema.
pub const V2: GenerationProfile = GenerationProfile {
    generation: Generation::V2,
    resolve_regions: false,
    area_from_rows: true,
    label_rows: true,
    tiered_fallback: true,
    echo_request: true,
    rewrite_download_columns: false,
    covered_countries: &["BRA"],
    gated_kinds: &[RegionKind::National],
    default_latest_limit: 1,
    latest_column: "latest",
};

impl GenerationProfile {
    /// The profile for `generation`.
    #[must_use]
    pub const fn for_generation(generation: Generation) -> &'static Self {
        match generation {
            Generation::V1 => &V1,
            Generation::V2 => &V2,
        }
    }

    /// Whether a region of `kind` in `iso` lies outside the dataset, so the
    /// aggregation query must be skipped.
    #[must_use]
    pub fn is_uncovered(&self, kind: RegionKind, iso: Option<&str>) -> bool {
        self.gated_kinds.contains(&kind)
            && iso.is_some_and(|iso| !self.covered_countries.contains(&iso))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_brazil_is_covered() {
        for profile in [V1, V2] {
            assert!(!profile.is_uncovered(RegionKind::National, Some("BRA")));
            assert!(profile.is_uncovered(RegionKind::National, Some("PER")));
        }
    }

    #[test]
    fn legacy_gates_provinces_too() {
        assert!(V1.is_uncovered(RegionKind::Province, Some("COL")));
        assert!(!V2.is_uncovered(RegionKind::Province, Some("COL")));
    }

    #[test]
    fn non_admin_regions_are_never_gated() {
        for profile in [V1, V2] {
            assert!(!profile.is_uncovered(RegionKind::ProtectedArea, None));
            assert!(!profile.is_uncovered(RegionKind::World, None));
        }
    }

    #[test]
    fn profiles_match_generation() {
        assert_eq!(
            GenerationProfile::for_generation(Generation::V2).generation,
            Generation::V2
        );
        assert!(GenerationProfile::for_generation(Generation::V1).resolve_regions);
    }
}
