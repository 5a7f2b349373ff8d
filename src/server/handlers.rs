use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::FailureKind;
use crate::georeferencer::{process, ExportedResult};
use crate::record::{Coordinates, Determination, HintField, LocalityRecord};

use super::state::AppState;

// ─── Rejected requests ───────────────────────────────────────────

/// A request turned away before any record was built or resolved.
#[derive(Debug, thiserror::Error)]
pub(super) enum RequestError {
    #[error("provide both 'lat' and 'lon'")]
    HalfCoordinates,
    #[error("provide 'locality' or 'lat'+'lon'")]
    NothingToResolve,
    #[error("resolution task failed: {0}")]
    Task(String),
}

#[derive(Serialize)]
struct Rejected {
    status: &'static str,
    reason: String,
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let code = match self {
            Self::HalfCoordinates | Self::NothingToResolve => StatusCode::BAD_REQUEST,
            Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Rejected {
            status: "rejected",
            reason: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

// ─── GET /api/healthz ────────────────────────────────────────────

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub pipes: Vec<String>,
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        pipes: state.chain.kinds().iter().map(|k| k.to_string()).collect(),
    })
}

// ─── GET /api/georeference ───────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct GeoreferenceQuery {
    pub locality: Option<String>,
    pub county: Option<String>,
    pub state_province: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl GeoreferenceQuery {
    fn into_record(self) -> Result<LocalityRecord, RequestError> {
        let locality = self.locality.unwrap_or_default();
        let has_coords = match (self.lat, self.lon) {
            (Some(_), Some(_)) => true,
            (None, None) => false,
            _ => return Err(RequestError::HalfCoordinates),
        };
        if locality.trim().is_empty() && !has_coords {
            return Err(RequestError::NothingToResolve);
        }

        let mut record = LocalityRecord::new("request", locality.trim());
        let hints = [
            (HintField::County, self.county),
            (HintField::StateProvince, self.state_province),
            (HintField::Country, self.country),
        ];
        for (field, value) in hints {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                record = record.with_hint(field, value.trim());
            }
        }
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            record = record.with_coordinates(Coordinates {
                lat,
                lon,
                determination: Determination::Unknown,
                precision_m: None,
                datum: None,
            });
        }
        Ok(record)
    }
}

fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::NoMatch => StatusCode::NOT_FOUND,
        FailureKind::Ambiguous => StatusCode::MULTIPLE_CHOICES,
        FailureKind::InvalidCoordinate | FailureKind::SparseData | FailureKind::Malformed => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FailureKind::GazetteerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::CacheInconsistency | FailureKind::InvalidGeometry => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn georeference(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeoreferenceQuery>,
) -> Result<Json<ExportedResult>, Response> {
    let start = Instant::now();
    let record = params.into_record().map_err(IntoResponse::into_response)?;
    let summary = record.summary();

    let worker = Arc::clone(&state);
    let entry = tokio::task::spawn_blocking(move || process(&worker.chain, &worker.policy, &record, 0))
        .await
        .map_err(|e| {
            warn!("{}: resolution task failed: {}", summary, e);
            RequestError::Task(e.to_string()).into_response()
        })?;
    let exported = ExportedResult::from(&entry);

    info!(
        "GET /api/georeference {} -> {} ({:.1}ms)",
        summary,
        entry.status,
        start.elapsed().as_secs_f64() * 1000.0,
    );

    match exported.failure {
        Some(kind) => Err((failure_status(kind), Json(exported)).into_response()),
        None => Ok(Json(exported)),
    }
}
