//! Small in-memory gazetteer shared by the unit tests.
//!
//! Coordinates are real enough for distance checks; polygons are boxes.

use std::sync::Arc;
use std::time::Duration;

use crate::gazetteer::{GazetteerFeature, GazetteerIndex, MemoryStore, StoreKind};
use crate::geometry::Shape;
use crate::hierarchy::{default_field_list, validate_field_list, HierarchyResolver};

pub const US: &str = "admin:US";
pub const ILLINOIS: &str = "admin:IL";
pub const MISSOURI: &str = "admin:MO";
pub const SANGAMON: &str = "admin:IL-SANGAMON";
pub const SHELBY: &str = "admin:IL-SHELBY";
pub const GREENE: &str = "admin:MO-GREENE";
pub const SPRINGFIELD_IL: &str = "geonames:4250542";
pub const SPRINGFIELD_MO: &str = "geonames:4409896";
pub const SHELBYVILLE: &str = "geonames:4249901";
pub const PORT_FOURCHON: &str = "geonames:4338124";
pub const GULF: &str = "oceans:gulf-of-mexico";
pub const BLUFF_SITE: &str = "custom:sangamon-bluff";
pub const PLSS_SECTION: &str = "plss:IL030050N0030E0:12";

pub fn point_feature(id: &str, name: &str, code: &str, lat: f64, lon: f64, ancestors: &[&str]) -> GazetteerFeature {
    GazetteerFeature {
        id: id.into(),
        name: name.into(),
        alt_names: Vec::new(),
        feature_code: code.into(),
        geometry: Shape::point(lat, lon),
        ancestors: ancestors.iter().map(|a| a.to_string()).collect(),
    }
}

pub fn polygon_feature(id: &str, name: &str, code: &str, geometry: Shape, ancestors: &[&str]) -> GazetteerFeature {
    GazetteerFeature {
        id: id.into(),
        name: name.into(),
        alt_names: Vec::new(),
        feature_code: code.into(),
        geometry,
        ancestors: ancestors.iter().map(|a| a.to_string()).collect(),
    }
}

fn with_alt(mut f: GazetteerFeature, alt: &str) -> GazetteerFeature {
    f.alt_names.push(alt.into());
    f
}

pub fn admin_features() -> Vec<GazetteerFeature> {
    vec![
        with_alt(
            polygon_feature(US, "United States", "PCLI", Shape::bbox(-125.0, 24.0, -66.0, 50.0), &[]),
            "USA",
        ),
        with_alt(
            polygon_feature(ILLINOIS, "Illinois", "ADM1", Shape::bbox(-91.5, 37.0, -87.5, 42.5), &[US]),
            "IL",
        ),
        with_alt(
            polygon_feature(MISSOURI, "Missouri", "ADM1", Shape::bbox(-95.8, 36.0, -91.5, 40.6), &[US]),
            "MO",
        ),
        with_alt(
            polygon_feature(
                SANGAMON,
                "Sangamon County",
                "ADM2",
                Shape::bbox(-89.99, 39.52, -89.22, 40.00),
                &[US, ILLINOIS],
            ),
            "Sangamon",
        ),
        with_alt(
            polygon_feature(SHELBY, "Shelby County", "ADM2", Shape::bbox(-89.03, 39.17, -88.47, 39.60), &[US, ILLINOIS]),
            "Shelby",
        ),
        with_alt(
            polygon_feature(GREENE, "Greene County", "ADM2", Shape::bbox(-93.62, 37.05, -93.07, 37.42), &[US, MISSOURI]),
            "Greene",
        ),
    ]
}

pub fn geonames_features() -> Vec<GazetteerFeature> {
    vec![
        point_feature(SPRINGFIELD_IL, "Springfield", "PPL", 39.8017, -89.6437, &[US, ILLINOIS, SANGAMON]),
        // no ancestry: containment has to come from the admin polygons
        point_feature(SPRINGFIELD_MO, "Springfield", "PPL", 37.2090, -93.2923, &[]),
        point_feature(SHELBYVILLE, "Shelbyville", "PPL", 39.4064, -88.7901, &[US, ILLINOIS, SHELBY]),
        point_feature("geonames:4249310", "Sangamon", "PPL", 39.85, -89.55, &[]),
        point_feature(PORT_FOURCHON, "Port Fourchon", "PPL", 29.105, -90.195, &[US]),
    ]
}

pub fn custom_features() -> Vec<GazetteerFeature> {
    vec![polygon_feature(
        BLUFF_SITE,
        "Sangamon Bluff Site",
        "AREA",
        Shape::bbox(-89.56, 39.92, -89.54, 39.94),
        &[US, ILLINOIS, SANGAMON],
    )]
}

pub fn ocean_features() -> Vec<GazetteerFeature> {
    vec![polygon_feature(GULF, "Gulf of Mexico", "GULF", Shape::bbox(-97.0, 18.5, -82.0, 29.0), &[])]
}

pub fn plss_features() -> Vec<GazetteerFeature> {
    vec![polygon_feature(
        PLSS_SECTION,
        "IL T5N R3E S12",
        "PLSS",
        Shape::bbox(-88.95, 39.30, -88.93, 39.3145),
        &[US, ILLINOIS],
    )]
}

/// Every fixture store, no cache, no retries.
pub fn index() -> GazetteerIndex {
    GazetteerIndex::new()
        .with_store(Arc::new(MemoryStore::new(StoreKind::Admin, admin_features())))
        .with_store(Arc::new(MemoryStore::new(StoreKind::GeoNames, geonames_features())))
        .with_store(Arc::new(MemoryStore::new(StoreKind::Custom, custom_features())))
        .with_store(Arc::new(MemoryStore::new(StoreKind::Oceans, ocean_features())))
        .with_store(Arc::new(MemoryStore::new(StoreKind::Plss, plss_features())))
        .with_retry(0, Duration::ZERO)
}

pub fn resolver() -> HierarchyResolver {
    let fields = validate_field_list(default_field_list()).unwrap();
    HierarchyResolver::new(Arc::new(index()), fields)
}
