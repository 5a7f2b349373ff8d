//! Gazetteer index: read-only named-place lookup over several stores.
//!
//! Lookup flow:  normalize name → ResultCache (store + name) → store query
//! (with retry/backoff on `GazetteerUnavailable`) → feature-code filter.

pub mod feature_codes;
pub mod memory;
pub mod remote;

use geo::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::error::{ConfigError, ResolveError};
use crate::geometry::Shape;
use crate::text::normalize;

pub use memory::MemoryStore;
pub use remote::{GeoNamesStore, PlssService};

/// The named stores the index can consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Administrative divisions (countries, states, counties).
    Admin,
    /// Curated local localities.
    Custom,
    /// The general gazetteer.
    GeoNames,
    NaturalEarth,
    Oceans,
    /// Public Land Survey System sections.
    Plss,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Custom => write!(f, "custom"),
            Self::GeoNames => write!(f, "geonames"),
            Self::NaturalEarth => write!(f, "natural_earth"),
            Self::Oceans => write!(f, "oceans"),
            Self::Plss => write!(f, "plss"),
        }
    }
}

/// A named place held by one of the stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazetteerFeature {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub alt_names: Vec<String>,
    pub feature_code: String,
    pub geometry: Shape,
    /// Identifiers of the administrative units containing this feature.
    #[serde(default)]
    pub ancestors: Vec<String>,
}

impl GazetteerFeature {
    /// True if the canonical or any alternate name normalizes to `key`.
    pub fn matches_name(&self, key: &str) -> bool {
        normalize(&self.name) == key || self.alt_names.iter().any(|n| normalize(n) == key)
    }

    pub fn specificity(&self) -> u8 {
        feature_codes::specificity(&self.feature_code)
    }

    pub fn centroid(&self) -> Point<f64> {
        self.geometry.centroid()
    }

    /// Own extent for polygons, catalog radius for points.
    pub fn extent_km(&self) -> f64 {
        if self.geometry.is_point() {
            feature_codes::typical_radius_km(&self.feature_code)
        } else {
            self.geometry.bounding_radius_km()
        }
    }
}

/// A backing store of gazetteer features.
pub trait GazetteerStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Features whose name matches `name`. An empty result is a normal miss.
    fn query(&self, name: &str) -> Result<Vec<GazetteerFeature>, ResolveError>;

    /// Polygon features containing `point`.
    fn containing(&self, _point: &Point<f64>) -> Result<Vec<GazetteerFeature>, ResolveError> {
        Ok(Vec::new())
    }

    /// Startup reachability check.
    fn ping(&self) -> Result<(), ResolveError> {
        Ok(())
    }
}

/// Canonical lookup key for a PLSS section, e.g. `IL T5N R3E S12`.
pub fn plss_key(state: &str, township: &str, range: &str, section: u32) -> String {
    format!("{} {} {} S{}", state.to_uppercase(), township, range, section)
}

/// Lookup over the configured stores, optionally backed by a shared cache.
pub struct GazetteerIndex {
    stores: BTreeMap<StoreKind, Arc<dyn GazetteerStore>>,
    cache: Option<Arc<ResultCache>>,
    retries: u32,
    backoff: Duration,
}

impl GazetteerIndex {
    pub fn new() -> Self {
        Self {
            stores: BTreeMap::new(),
            cache: None,
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn GazetteerStore>) -> Self {
        self.stores.insert(store.kind(), store);
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn has_store(&self, kind: StoreKind) -> bool {
        self.stores.contains_key(&kind)
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    /// Ping every configured store. Unreachable stores are batch-fatal.
    pub fn check_stores(&self) -> Result<(), ConfigError> {
        for (kind, store) in &self.stores {
            store.ping().map_err(|e| ConfigError::StoreUnreachable {
                store: kind.to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Features in `store` named `name_or_code`, filtered to `feature_codes`.
    ///
    /// Results are ordered by id. A store that is not configured yields no
    /// features.
    pub fn lookup(
        &self,
        name_or_code: &str,
        store: StoreKind,
        feature_codes: Option<&[String]>,
    ) -> Result<Vec<GazetteerFeature>, ResolveError> {
        let key = match store {
            // township codes: "CO" and "MT" are states, not abbreviations
            StoreKind::Plss => name_or_code.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
            _ => normalize(name_or_code),
        };
        if key.is_empty() {
            return Ok(Vec::new());
        }
        let Some(backend) = self.stores.get(&store) else {
            return Ok(Vec::new());
        };

        // the store sees the same canonical name the cache is keyed on
        let signature = format!("{}|{}", store, key);
        let query = || self.with_retry_loop(store, || backend.query(&key));
        let mut features = match &self.cache {
            Some(cache) => cache.get_or_compute(&signature, query)?,
            None => query()?,
        };

        if let Some(codes) = feature_codes {
            features.retain(|f| codes.iter().any(|c| c.eq_ignore_ascii_case(&f.feature_code)));
        }
        features.sort_by(|a, b| a.id.cmp(&b.id));
        features.dedup_by(|a, b| a.id == b.id);
        debug!("lookup {} in {} → {} feature(s)", name_or_code, store, features.len());
        Ok(features)
    }

    /// Polygon features in `store` that contain `point`. Not cached.
    pub fn containing(&self, point: &Point<f64>, store: StoreKind) -> Result<Vec<GazetteerFeature>, ResolveError> {
        let Some(backend) = self.stores.get(&store) else {
            return Ok(Vec::new());
        };
        let mut features = self.with_retry_loop(store, || backend.containing(point))?;
        features.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(features)
    }

    fn with_retry_loop<T>(
        &self,
        store: StoreKind,
        mut call: impl FnMut() -> Result<T, ResolveError>,
    ) -> Result<T, ResolveError> {
        let mut attempt = 0;
        loop {
            match call() {
                Err(e @ ResolveError::GazetteerUnavailable { .. }) if attempt < self.retries => {
                    attempt += 1;
                    warn!("{} unavailable (attempt {}/{}): {}", store, attempt, self.retries, e);
                    thread::sleep(self.backoff * attempt);
                }
                other => return other,
            }
        }
    }
}

impl Default for GazetteerIndex {
    fn default() -> Self {
        Self::new()
    }
}
