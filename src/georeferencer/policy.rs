//! Batch policy: which records are processed and which are failed up front.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ResolveError;
use crate::record::{Context, Determination, LocalityRecord};

/// Marine/terrestrial filter over records with existing coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordType {
    #[default]
    Any,
    Marine,
    Terrestrial,
}

/// How existing coordinates were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceType {
    #[default]
    Any,
    Georeferenced,
    Measured,
}

impl FromStr for CoordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "marine" => Ok(Self::Marine),
            "terrestrial" => Ok(Self::Terrestrial),
            other => Err(format!("unknown coord_type '{}' (any, marine, terrestrial)", other)),
        }
    }
}

impl FromStr for PlaceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "georeferenced" => Ok(Self::Georeferenced),
            "measured" => Ok(Self::Measured),
            other => Err(format!("unknown place_type '{}' (any, georeferenced, measured)", other)),
        }
    }
}

impl fmt::Display for CoordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Marine => write!(f, "marine"),
            Self::Terrestrial => write!(f, "terrestrial"),
        }
    }
}

impl fmt::Display for PlaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Georeferenced => write!(f, "georeferenced"),
            Self::Measured => write!(f, "measured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchPolicy {
    /// Raw field used as the record identifier.
    pub id_key: String,
    pub allow_sparse: bool,
    pub allow_invalid_coords: bool,
    pub coord_type: CoordType,
    pub place_type: PlaceType,
    /// Leave records without coordinates out of the batch entirely.
    pub require_coords: bool,
    pub include_failed: bool,
    /// Eligible records passed over before processing starts.
    pub skip: usize,
    /// Records processed in one run. `None` is unbounded.
    pub limit: Option<usize>,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            id_key: "id".into(),
            allow_sparse: false,
            allow_invalid_coords: false,
            coord_type: CoordType::Any,
            place_type: PlaceType::Any,
            require_coords: false,
            include_failed: true,
            skip: 0,
            limit: None,
        }
    }
}

/// Whether a record takes part in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Not part of the batch; no entry is written.
    Excluded,
    /// Part of the batch but filtered out; recorded as skipped.
    Ineligible(String),
    Eligible,
}

/// What to do with an eligible record before any pipe runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Preflight {
    Fail(ResolveError),
    Resolve(LocalityRecord),
}

impl BatchPolicy {
    /// Apply the record filters. `marine` is only called for records with
    /// coordinates and only when the filter needs it.
    pub fn admit(&self, record: &LocalityRecord, marine: impl FnOnce() -> bool) -> Admission {
        let Some(coords) = &record.coordinates else {
            return if self.require_coords {
                Admission::Excluded
            } else {
                Admission::Eligible
            };
        };

        let wanted = match self.place_type {
            PlaceType::Any => true,
            PlaceType::Georeferenced => coords.determination == Determination::Georeferenced,
            PlaceType::Measured => coords.determination == Determination::Measured,
        };
        if !wanted {
            return Admission::Ineligible(format!("place_type is {}", self.place_type));
        }

        let wanted = match self.coord_type {
            CoordType::Any => true,
            CoordType::Marine => marine(),
            CoordType::Terrestrial => !marine(),
        };
        if !wanted {
            return Admission::Ineligible(format!("coord_type is {}", self.coord_type));
        }
        Admission::Eligible
    }

    /// Coordinate and sparseness gates for an eligible record.
    ///
    /// Invalid coordinates fail the record unless `allow_invalid_coords`,
    /// in which case they are dropped and the description is resolved.
    /// Sparseness only applies to records left without coordinates. A
    /// record naming nothing below country or state level passes when
    /// `admin_radius_km` reports that unit as small enough.
    pub fn preflight(
        &self,
        record: &LocalityRecord,
        admin_radius_km: impl FnOnce(&LocalityRecord) -> Option<f64>,
    ) -> Preflight {
        let mut record = record.clone();
        if let Some(coords) = &record.coordinates {
            if let Err(e) = coords.validate() {
                if !self.allow_invalid_coords {
                    return Preflight::Fail(e);
                }
                record.coordinates = None;
            }
        }
        if record.coordinates.is_none() && !self.allow_sparse {
            let enough = match record.context() {
                Context::Specific => true,
                Context::Missing => false,
                Context::AdminOnly => {
                    admin_radius_km(&record).is_some_and(|r| r <= record.admin_radius_limit_km())
                }
            };
            if !enough {
                return Preflight::Fail(ResolveError::SparseData(format!(
                    "{} has no broad context or no specific locality",
                    record.id
                )));
            }
        }
        Preflight::Resolve(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Coordinates, HintField};

    fn with_coords(determination: Determination, lat: f64) -> LocalityRecord {
        LocalityRecord::new("r1", "Springfield").with_coordinates(Coordinates {
            lat,
            lon: -92.2,
            determination,
            precision_m: None,
            datum: None,
        })
    }

    #[test]
    fn test_require_coords_excludes() {
        let policy = BatchPolicy {
            require_coords: true,
            ..BatchPolicy::default()
        };
        assert_eq!(policy.admit(&LocalityRecord::new("r1", "x"), || false), Admission::Excluded);
        assert_eq!(policy.admit(&with_coords(Determination::Measured, 38.5), || false), Admission::Eligible);
    }

    #[test]
    fn test_place_type_filter() {
        let policy = BatchPolicy {
            place_type: PlaceType::Georeferenced,
            ..BatchPolicy::default()
        };
        assert_eq!(policy.admit(&with_coords(Determination::Georeferenced, 38.5), || false), Admission::Eligible);
        assert!(matches!(
            policy.admit(&with_coords(Determination::Measured, 38.5), || false),
            Admission::Ineligible(_)
        ));
        // records without coordinates are not filtered
        assert_eq!(policy.admit(&LocalityRecord::new("r1", "x"), || false), Admission::Eligible);
    }

    #[test]
    fn test_coord_type_filter() {
        let policy = BatchPolicy {
            coord_type: CoordType::Terrestrial,
            ..BatchPolicy::default()
        };
        let record = with_coords(Determination::Measured, 38.5);
        assert_eq!(policy.admit(&record, || false), Admission::Eligible);
        assert!(matches!(policy.admit(&record, || true), Admission::Ineligible(_)));
    }

    #[test]
    fn test_invalid_coordinates() {
        let record = with_coords(Determination::Measured, 138.5);
        let strict = BatchPolicy::default();
        assert!(matches!(
            strict.preflight(&record, |_| None),
            Preflight::Fail(ResolveError::InvalidCoordinate(_))
        ));

        let lenient = BatchPolicy {
            allow_invalid_coords: true,
            allow_sparse: true,
            ..BatchPolicy::default()
        };
        match lenient.preflight(&record, |_| None) {
            Preflight::Resolve(r) => assert!(r.coordinates.is_none()),
            other => panic!("expected resolution, got {:?}", other),
        }
    }

    #[test]
    fn test_sparse_records() {
        let record = LocalityRecord::new("r1", "under a rock");
        let strict = BatchPolicy::default();
        assert!(matches!(strict.preflight(&record, |_| None), Preflight::Fail(ResolveError::SparseData(_))));
        let lenient = BatchPolicy {
            allow_sparse: true,
            ..BatchPolicy::default()
        };
        assert!(matches!(lenient.preflight(&record, |_| None), Preflight::Resolve(_)));

        // valid coordinates are enough context on their own
        let located = with_coords(Determination::Measured, 38.5);
        assert!(matches!(strict.preflight(&located, |_| None), Preflight::Resolve(_)));

        let rich = record.with_hint(HintField::Country, "United States");
        assert!(matches!(strict.preflight(&rich, |_| None), Preflight::Resolve(_)));
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!("Marine".parse::<CoordType>(), Ok(CoordType::Marine));
        assert_eq!("measured".parse::<PlaceType>(), Ok(PlaceType::Measured));
        assert!("wet".parse::<CoordType>().is_err());
    }

    #[test]
    fn test_small_admin_unit_is_enough_context() {
        let strict = BatchPolicy::default();
        let state_only = LocalityRecord::new("r1", "")
            .with_hint(HintField::StateProvince, "Delaware")
            .with_hint(HintField::Country, "United States");
        assert!(matches!(strict.preflight(&state_only, |_| Some(120.0)), Preflight::Resolve(_)));
        assert!(matches!(
            strict.preflight(&state_only, |_| Some(800.0)),
            Preflight::Fail(ResolveError::SparseData(_))
        ));
        assert!(matches!(
            strict.preflight(&state_only, |_| None),
            Preflight::Fail(ResolveError::SparseData(_))
        ));

        // marine records get a wider allowance
        let sea = state_only.clone().with_hint(HintField::SeaGulf, "Gulf of Mexico");
        assert!(matches!(strict.preflight(&sea, |_| Some(800.0)), Preflight::Resolve(_)));

        // the admin lookup is never made for records with a specific field
        let rich = LocalityRecord::new("r2", "Springfield").with_hint(HintField::Country, "United States");
        let checked = std::cell::Cell::new(false);
        strict.preflight(&rich, |_| {
            checked.set(true);
            None
        });
        assert!(!checked.get());
    }
}
