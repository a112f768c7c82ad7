use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{Admission, EngineError, NewRequest, Scheduler};
use crate::model::*;
use crate::observability::{self, error_label};
use crate::orchestrator::Orchestrator;
use crate::planner::Planner;

/// Header names are case-insensitive; `http` wants the lowercase form.
pub const CALLBACK_HEADER: &str = "cpee-callback";

/// Form fields with a fixed meaning; everything else is kept as metadata.
const RESERVED_FIELDS: [&str; 6] = ["id", "stage", "arrival", "duration", "patient_type", "callback"];

pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub planner: Arc<dyn Planner>,
    pub orchestrator: Option<Arc<dyn Orchestrator>>,
    pub horizon: Minutes,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/booking", post(booking))
        .route("/replan", post(replan))
        .route("/stages/:stage/bookings", get(stage_bookings))
        .route("/status", get(status))
        .route("/healthz", get(healthz))
        .with_state(state)
}

// ── Field parsing ────────────────────────────────────────────────

/// Query string and form body merged; body wins on conflicts.
fn merge_fields(
    query: HashMap<String, String>,
    form: Option<Form<HashMap<String, String>>>,
) -> HashMap<String, String> {
    let mut fields = query;
    if let Some(Form(body)) = form {
        fields.extend(body);
    }
    fields
}

fn required<'a>(fields: &'a HashMap<String, String>, name: &'static str) -> Result<&'a str, EngineError> {
    fields
        .get(name)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or(EngineError::MissingField(name))
}

/// Parse a time or duration in minutes; fractional values are rounded.
pub fn parse_minutes(field: &'static str, raw: &str) -> Result<Minutes, EngineError> {
    let invalid = || EngineError::InvalidNumber {
        field,
        value: raw.to_string(),
    };
    let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value.abs() > i64::MAX as f64 / 2.0 {
        return Err(invalid());
    }
    Ok(value.round() as Minutes)
}

fn optional_id(fields: &HashMap<String, String>) -> Result<Option<i64>, EngineError> {
    match fields.get("id").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| EngineError::InvalidNumber {
            field: "id",
            value: raw.to_string(),
        }),
    }
}

fn metadata(fields: &HashMap<String, String>) -> Result<Metadata, EngineError> {
    let mut metadata = Metadata::new(required(fields, "patient_type")?);
    for (k, v) in fields {
        if !RESERVED_FIELDS.contains(&k.as_str()) {
            metadata.extra.insert(k.clone(), v.clone());
        }
    }
    Ok(metadata)
}

/// Turn raw request fields plus headers into a booking request.
pub fn parse_booking(
    fields: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<NewRequest, EngineError> {
    let stage = required(fields, "stage")?.to_string();
    let arrival = parse_minutes("arrival", required(fields, "arrival")?)?;
    let duration = parse_minutes("duration", required(fields, "duration")?)?;
    let entity = optional_id(fields)?;
    let metadata = metadata(fields)?;
    // A deferred answer has nowhere to go without one.
    let callback = headers
        .get(CALLBACK_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| fields.get("callback").map(String::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(EngineError::MissingField("callback"))?;
    Ok(NewRequest {
        entity,
        stage,
        arrival,
        duration,
        metadata,
        callback: Some(callback.to_string()),
    })
}

// ── Responses ────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::UnknownStage(_) | EngineError::UnknownPatientType(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::Orchestrator(_) => StatusCode::BAD_GATEWAY,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("request failed: {}", self.0);
        }
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "kind": error_label(&self.0),
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct Deferred {
    deferred: bool,
    reason: &'static str,
}

#[derive(Debug, Serialize)]
struct Replanned {
    id: EntityId,
    arrival: Minutes,
    instance: String,
}

fn observe(route: &'static str, started: Instant, status: StatusCode) {
    metrics::counter!(
        observability::REQUESTS_TOTAL,
        "route" => route,
        "status" => status.as_str().to_string()
    )
    .increment(1);
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "route" => route)
        .record(started.elapsed().as_secs_f64());
}

// ── Handlers ─────────────────────────────────────────────────────

async fn booking(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    form: Option<Form<HashMap<String, String>>>,
) -> Response {
    let started = Instant::now();
    let fields = merge_fields(query, form);
    let response = match handle_booking(&state, &fields, &headers).await {
        Ok(r) => r,
        Err(e) => e.into_response(),
    };
    observe("booking", started, response.status());
    response
}

async fn handle_booking(
    state: &AppState,
    fields: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let request = parse_booking(fields, headers)?;
    match state.scheduler.submit(request).await? {
        Admission::Admitted(reply) => Ok((StatusCode::OK, Json(reply)).into_response()),
        Admission::Deferred(reason) => {
            let mut response = (
                StatusCode::ACCEPTED,
                Json(Deferred {
                    deferred: true,
                    reason: reason.label(),
                }),
            )
                .into_response();
            response
                .headers_mut()
                .insert(CALLBACK_HEADER, HeaderValue::from_static("true"));
            Ok(response)
        }
    }
}

async fn replan(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    form: Option<Form<HashMap<String, String>>>,
) -> Response {
    let started = Instant::now();
    let fields = merge_fields(query, form);
    let response = match handle_replan(&state, &fields).await {
        Ok(r) => Json(r).into_response(),
        Err(e) => e.into_response(),
    };
    let outcome = if response.status().is_success() { "ok" } else { "failed" };
    metrics::counter!(observability::REPLANS_TOTAL, "status" => outcome).increment(1);
    observe("replan", started, response.status());
    response
}

async fn handle_replan(
    state: &AppState,
    fields: &HashMap<String, String>,
) -> Result<Replanned, ApiError> {
    let id = optional_id(fields)?
        .filter(|id| *id > 0)
        .ok_or(EngineError::MissingField("id"))? as EntityId;
    let arrival = parse_minutes("arrival", required(fields, "arrival")?)?;
    let metadata = metadata(fields)?;

    let domain = state.scheduler.domain().await;
    if !domain.is_known_patient_type(&metadata.patient_type) {
        return Err(EngineError::UnknownPatientType(metadata.patient_type).into());
    }

    let planned = state.planner.plan(arrival);
    if planned > state.horizon {
        return Err(EngineError::BeyondHorizon {
            arrival: planned,
            horizon: state.horizon,
        }
        .into());
    }
    let orchestrator = state
        .orchestrator
        .as_ref()
        .ok_or_else(|| EngineError::Orchestrator("no orchestrator configured".into()))?;
    let instance = orchestrator.spawn_instance(id, planned, &metadata).await?;
    info!(id, from = arrival, to = planned, instance = %instance, "replanned");
    Ok(Replanned {
        id,
        arrival: planned,
        instance,
    })
}

async fn stage_bookings(
    State(state): State<SharedState>,
    Path(stage): Path<String>,
) -> Response {
    let started = Instant::now();
    let response = match state.scheduler.stage_bookings(&stage).await {
        Ok(bookings) => Json(bookings).into_response(),
        Err(EngineError::UnknownStage(stage)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown stage: {stage}") })),
        )
            .into_response(),
        Err(e) => ApiError(e).into_response(),
    };
    observe("stage_bookings", started, response.status());
    response
}

async fn status(State(state): State<SharedState>) -> Json<StatusInfo> {
    Json(state.scheduler.status().await)
}

async fn healthz() -> &'static str {
    "ok"
}
