//! `GeoJSON` normalization for polygon queries.
//!
//! Callers may post a bare geometry, a single feature, or a feature
//! collection. Queries always read the first feature of a collection, so
//! everything is wrapped into one before use.

use geojson::{Feature, FeatureCollection, GeoJson, Geometry};

/// Wraps a bare geometry or feature into a one-feature collection.
///
/// Feature collections are returned unchanged, so normalizing twice is a
/// no-op.
#[must_use]
pub fn normalize(geojson: GeoJson) -> FeatureCollection {
    match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(feature) => FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        GeoJson::Geometry(geometry) => FeatureCollection {
            bbox: None,
            features: vec![Feature::from(geometry)],
            foreign_members: None,
        },
    }
}

/// The geometry a polygon query intersects with: that of the first feature.
#[must_use]
pub fn first_geometry(collection: &FeatureCollection) -> Option<&Geometry> {
    collection.features.first()?.geometry.as_ref()
}
