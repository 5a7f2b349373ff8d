//! Run configuration, read from JSON (default ~/.georef/config.json).
//!
//! Every field has a default, so an empty object is a valid file. The
//! ordered field list is validated and its feature classes expanded on load.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::error::ConfigError;
use crate::gazetteer::{GazetteerIndex, GeoNamesStore, MemoryStore, PlssService, StoreKind};
use crate::georeferencer::{BatchPolicy, JobStore};
use crate::hierarchy::{default_field_list, validate_field_list, FieldSpec, HierarchyResolver};
use crate::pipes::{PipeChain, PipeContext};
use crate::uncertainty::UncertaintyParams;

/// Feature files per store, plus the remote services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub admin: Option<PathBuf>,
    pub custom: Option<PathBuf>,
    pub geonames: Option<PathBuf>,
    pub natural_earth: Option<PathBuf>,
    pub oceans: Option<PathBuf>,
    pub plss: Option<PathBuf>,
    /// GeoNames web service account, used when no local GeoNames file is set.
    pub geonames_username: Option<String>,
    /// Query the BLM PLSS service when no local PLSS file is set.
    pub blm_plss: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub timeout_secs: u64,
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            min_interval_ms: 1000,
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Defaults to ~/.georef/cache.json.
    pub path: Option<PathBuf>,
    pub max_entries: usize,
    pub ttl_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            max_entries: 50_000,
            ttl_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoreferenceConfig {
    pub policy: BatchPolicy,
    /// Most specific first. Order is significant.
    pub ordered_field_list: Vec<FieldSpec>,
    pub params: UncertaintyParams,
    pub stores: StoreConfig,
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    /// Defaults to ~/.georef/jobs.jsonl.
    pub jobs_path: Option<PathBuf>,
    pub workers: usize,
}

impl Default for GeoreferenceConfig {
    fn default() -> Self {
        Self {
            policy: BatchPolicy::default(),
            ordered_field_list: default_field_list(),
            params: UncertaintyParams::default(),
            stores: StoreConfig::default(),
            remote: RemoteConfig::default(),
            cache: CacheConfig::default(),
            jobs_path: None,
            workers: 1,
        }
    }
}

impl GeoreferenceConfig {
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".georef")
            .join("config.json")
    }

    /// `explicit` must exist. Without it the default path is used if
    /// present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Self::default().validated()
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("loaded configuration from {}", path.display());
        config.validated()
    }

    /// Check option ranges and expand the field list.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.ordered_field_list = validate_field_list(self.ordered_field_list)?;
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        let p = &self.params;
        if !(p.resize_when_testing_intersection >= 1.0) {
            return Err(ConfigError::Invalid("resize_when_testing_intersection must be >= 1".into()));
        }
        let distances = [
            ("dist_km_to_extend_sites_offshore", p.dist_km_to_extend_sites_offshore),
            ("border_buffer_km", p.border_buffer_km),
            ("between_min_buffer_km", p.between_min_buffer_km),
            ("manual_default_radius_km", p.manual_default_radius_km),
            ("undirected_max_dist_km", p.undirected_max_dist_km),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be a non-negative number", name)));
            }
        }
        Ok(self)
    }

    pub fn open_cache(&self) -> Option<Arc<ResultCache>> {
        if !self.cache.enabled {
            return None;
        }
        let path = self.cache.path.clone().unwrap_or_else(ResultCache::default_path);
        Some(Arc::new(ResultCache::open(path, self.cache.max_entries, self.cache.ttl_days)))
    }

    pub fn open_jobs(&self) -> Result<JobStore, ConfigError> {
        let path = self.jobs_path.clone().unwrap_or_else(JobStore::default_path);
        JobStore::open(path.clone()).map_err(|source| ConfigError::Io { path, source })
    }

    /// Open every configured store. Remote stores are used only where no
    /// local file is configured.
    pub fn build_index(&self) -> Result<GazetteerIndex, ConfigError> {
        let timeout = Duration::from_secs(self.remote.timeout_secs);
        let s = &self.stores;
        let files = [
            (StoreKind::Admin, &s.admin),
            (StoreKind::Custom, &s.custom),
            (StoreKind::GeoNames, &s.geonames),
            (StoreKind::NaturalEarth, &s.natural_earth),
            (StoreKind::Oceans, &s.oceans),
            (StoreKind::Plss, &s.plss),
        ];

        let mut index = GazetteerIndex::new().with_retry(
            self.remote.max_retries,
            Duration::from_millis(self.remote.backoff_ms),
        );
        for (kind, path) in files {
            let Some(path) = path else { continue };
            let store = MemoryStore::load(kind, path)?;
            info!("{} store: {} feature(s) from {}", kind, store.len(), path.display());
            index = index.with_store(Arc::new(store));
        }
        if s.geonames.is_none() {
            if let Some(username) = &s.geonames_username {
                let store = GeoNamesStore::new(
                    username.clone(),
                    timeout,
                    Duration::from_millis(self.remote.min_interval_ms),
                );
                index = index.with_store(Arc::new(store));
            }
        }
        if s.plss.is_none() && s.blm_plss {
            index = index.with_store(Arc::new(PlssService::new(timeout)));
        }
        if !index.has_store(StoreKind::GeoNames) && !index.has_store(StoreKind::Admin) {
            warn!("no general gazetteer or admin store configured; most localities will not resolve");
        }
        if let Some(cache) = self.open_cache() {
            index = index.with_cache(cache);
        }
        Ok(index)
    }

    /// Build the index, ping its stores and assemble the standard chain.
    pub fn build_chain(&self) -> Result<PipeChain, ConfigError> {
        let index = self.build_index()?;
        index.check_stores()?;
        let resolver = HierarchyResolver::new(Arc::new(index), self.ordered_field_list.clone());
        Ok(PipeChain::standard(PipeContext::new(Arc::new(resolver), self.params.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::georeferencer::CoordType;
    use crate::hierarchy::FieldSpec;
    use crate::record::{HintField, LocalityRecord};
    use crate::testing;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "config.json",
            r#"{"policy": {"coord_type": "marine", "limit": 50}, "params": {"border_buffer_km": 5}}"#,
        );
        let config = GeoreferenceConfig::load(Some(&path)).unwrap();
        assert_eq!(config.policy.coord_type, CoordType::Marine);
        assert_eq!(config.policy.limit, Some(50));
        assert!(config.policy.include_failed);
        assert_eq!(config.params.border_buffer_km, 5.0);
        assert_eq!(config.params.resize_when_testing_intersection, 1.1);
        assert_eq!(config.remote.max_retries, 3);
        assert_eq!(config.workers, 1);
        // classes were expanded
        assert!(config.ordered_field_list[0].codes.contains(&"PPL".to_string()));
    }

    #[test]
    fn test_field_list_order_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "config.json",
            r#"{"ordered_field_list": [
                {"field": "county", "codes": ["ADM2"]},
                {"field": "locality", "codes": ["P"]}
            ]}"#,
        );
        let config = GeoreferenceConfig::load(Some(&path)).unwrap();
        let fields: Vec<HintField> = config.ordered_field_list.iter().map(|f| f.field).collect();
        assert_eq!(fields, vec![HintField::County, HintField::Locality]);
    }

    #[test]
    fn test_bad_field_list_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.json", r#"{"ordered_field_list": []}"#);
        assert!(matches!(
            GeoreferenceConfig::load(Some(&path)),
            Err(ConfigError::FieldList(_))
        ));
        let mut config = GeoreferenceConfig::default();
        config.ordered_field_list = vec![FieldSpec::new(HintField::County, &["Z"])];
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_missing_or_malformed_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(GeoreferenceConfig::load(Some(&missing)), Err(ConfigError::Io { .. })));
        let bad = write(&dir, "bad.json", "{ not json");
        assert!(matches!(GeoreferenceConfig::load(Some(&bad)), Err(ConfigError::Parse { .. })));
        let zero = write(&dir, "zero.json", r#"{"workers": 0}"#);
        assert!(matches!(GeoreferenceConfig::load(Some(&zero)), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_chain_from_store_files() {
        let dir = TempDir::new().unwrap();
        let admin = write(&dir, "admin.json", &serde_json::to_string(&testing::admin_features()).unwrap());
        let geonames = write(&dir, "geonames.json", &serde_json::to_string(&testing::geonames_features()).unwrap());
        let mut config = GeoreferenceConfig::default();
        config.stores.admin = Some(admin);
        config.stores.geonames = Some(geonames);
        config.cache.path = Some(dir.path().join("cache.json"));
        let config = config.validated().unwrap();

        let chain = config.build_chain().unwrap();
        let record = LocalityRecord::new("r1", "Springfield").with_hint(HintField::StateProvince, "Missouri");
        let result = chain.resolve(&record).unwrap();
        assert_eq!(result.sources[0].feature_id, testing::SPRINGFIELD_MO);
        let cache = chain.context().index().cache().unwrap();
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_unreadable_store_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = GeoreferenceConfig::default();
        config.stores.custom = Some(dir.path().join("missing.json"));
        config.cache.enabled = false;
        assert!(matches!(config.build_index(), Err(ConfigError::Io { .. })));
    }
}
