//! In-memory store loaded from a JSON array of features.

use geo::Point;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::{GazetteerFeature, GazetteerStore, StoreKind};
use crate::error::{ConfigError, ResolveError};
use crate::text::normalize;

pub struct MemoryStore {
    kind: StoreKind,
    features: Vec<GazetteerFeature>,
    by_name: HashMap<String, Vec<usize>>,
}

impl MemoryStore {
    pub fn new(kind: StoreKind, features: Vec<GazetteerFeature>) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, feature) in features.iter().enumerate() {
            let mut keys: Vec<String> = std::iter::once(&feature.name)
                .chain(feature.alt_names.iter())
                .map(|n| normalize(n))
                .filter(|k| !k.is_empty())
                .collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                by_name.entry(key).or_default().push(i);
            }
        }
        Self { kind, features, by_name }
    }

    /// Load `[GazetteerFeature, ..]` from a JSON file.
    pub fn load(kind: StoreKind, path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let features: Vec<GazetteerFeature> =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        for f in &features {
            f.geometry.validate().map_err(|e| {
                ConfigError::Invalid(format!("{}: feature {} has invalid geometry: {}", path.display(), f.id, e))
            })?;
        }
        Ok(Self::new(kind, features))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl GazetteerStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn query(&self, name: &str) -> Result<Vec<GazetteerFeature>, ResolveError> {
        let key = normalize(name);
        Ok(self
            .by_name
            .get(&key)
            .map(|idx| idx.iter().map(|&i| self.features[i].clone()).collect())
            .unwrap_or_default())
    }

    fn containing(&self, point: &Point<f64>) -> Result<Vec<GazetteerFeature>, ResolveError> {
        Ok(self
            .features
            .iter()
            .filter(|f| !f.geometry.is_point() && f.geometry.contains(point))
            .cloned()
            .collect())
    }
}
