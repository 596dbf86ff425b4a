// SPDX-License-Identifier: MIT

//! Routine catalog and assignment endpoints.

use crate::error::{AppError, Result};
use crate::models::{Routine, RoutineKind, RoutineStep};
use crate::services::routine::{
    AssignmentOutcome, ReconcileReport, RoutineDraft, UnassignOutcome,
};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/routines", get(list_routines).post(create_routine))
        .route(
            "/api/routines/{id}",
            get(get_routine).put(update_routine).delete(delete_routine),
        )
        .route("/api/routines/{id}/assign", post(assign_routine))
        .route(
            "/api/assignments/{routine_id}",
            axum::routing::delete(unassign_routine),
        )
        .route("/api/users/{user_id}/routines", get(user_routines))
        .route(
            "/api/maintenance/reconcile-clones",
            post(reconcile_clones),
        )
}

// ─── Responses ───────────────────────────────────────────────

/// Routine as returned by the API (document id included).
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RoutineSummary {
    pub id: String,
    pub nombre: String,
    pub tipo: String,
    #[serde(rename = "userID")]
    pub user_id: String,
}

impl From<&Routine> for RoutineSummary {
    fn from(r: &Routine) -> Self {
        Self {
            id: r.doc_id().to_string(),
            nombre: r.nombre.clone(),
            tipo: r.tipo.as_str().to_string(),
            user_id: r.user_id.clone(),
        }
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StepResponse {
    pub id: String,
    #[serde(rename = "exerciseID")]
    pub exercise_id: String,
    #[serde(rename = "exerciseNombre")]
    pub exercise_nombre: String,
    #[serde(rename = "exerciseMediaURL")]
    pub exercise_media_url: String,
    pub orden: i64,
    pub series: String,
    pub repeticiones: String,
    #[serde(rename = "tiempoDescansoSegundos")]
    pub tiempo_descanso_segundos: i64,
}

impl From<&RoutineStep> for StepResponse {
    fn from(s: &RoutineStep) -> Self {
        Self {
            id: s.id.clone().unwrap_or_default(),
            exercise_id: s.exercise_id.clone(),
            exercise_nombre: s.exercise_nombre.clone(),
            exercise_media_url: s.exercise_media_url.clone(),
            orden: s.orden,
            series: s.series.clone(),
            repeticiones: s.repeticiones.clone(),
            tiempo_descanso_segundos: s.tiempo_descanso_segundos,
        }
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RoutineDetailResponse {
    #[serde(flatten)]
    #[cfg_attr(feature = "binding-generation", ts(flatten))]
    pub routine: RoutineSummary,
    pub steps: Vec<StepResponse>,
}

// ─── Requests ────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    /// Filter by routine kind ("predefinida" or "personal").
    tipo: Option<String>,
}

fn parse_kind(raw: &str) -> Result<RoutineKind> {
    match raw {
        "predefinida" => Ok(RoutineKind::Predefinida),
        "personal" => Ok(RoutineKind::Personal),
        other => Err(AppError::BadRequest(format!(
            "Invalid 'tipo' parameter: {}",
            other
        ))),
    }
}

#[derive(Deserialize, Validate)]
pub struct SaveStepRequest {
    #[serde(rename = "exerciseID")]
    #[validate(length(min = 1, message = "exerciseID must not be empty"))]
    pub exercise_id: String,
    #[serde(rename = "exerciseNombre", default)]
    pub exercise_nombre: String,
    #[serde(rename = "exerciseMediaURL", default)]
    pub exercise_media_url: String,
    #[serde(default)]
    pub series: String,
    #[serde(default)]
    pub repeticiones: String,
    #[serde(rename = "tiempoDescansoSegundos", default)]
    pub tiempo_descanso_segundos: i64,
}

#[derive(Deserialize, Validate)]
pub struct SaveRoutineRequest {
    #[validate(length(min = 1, max = 200, message = "nombre must not be empty"))]
    pub nombre: String,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[validate(nested)]
    #[serde(default)]
    pub steps: Vec<SaveStepRequest>,
}

impl SaveRoutineRequest {
    fn into_draft(self) -> Result<RoutineDraft> {
        let tipo = match self.tipo.as_deref() {
            None => RoutineKind::Predefinida,
            Some(raw) => parse_kind(raw)?,
        };

        let steps = self
            .steps
            .into_iter()
            .map(|s| RoutineStep {
                id: None,
                routine_id: String::new(),
                exercise_id: s.exercise_id,
                exercise_nombre: s.exercise_nombre,
                exercise_media_url: s.exercise_media_url,
                // Stamped from list position on save.
                orden: 0,
                series: s.series,
                repeticiones: s.repeticiones,
                tiempo_descanso_segundos: s.tiempo_descanso_segundos,
            })
            .collect();

        Ok(RoutineDraft {
            nombre: self.nombre,
            tipo,
            user_id: self.user_id,
            steps,
        })
    }
}

#[derive(Deserialize, Validate)]
pub struct AssignRequest {
    #[serde(rename = "userID")]
    #[validate(length(min = 1, message = "userID must not be empty"))]
    pub user_id: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SaveRoutineResponse {
    pub id: String,
}

// ─── Handlers ────────────────────────────────────────────────

/// List routines, optionally filtered by `?tipo=`.
async fn list_routines(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RoutineSummary>>> {
    let kind = query.tipo.as_deref().map(parse_kind).transpose()?;
    let routines = state.db.list_routines(kind).await?;
    Ok(Json(routines.iter().map(RoutineSummary::from).collect()))
}

/// Fetch a routine with its steps, sorted by `orden`.
async fn get_routine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RoutineDetailResponse>> {
    let (routine, steps) = state.routines.load_routine_with_steps(&id).await?;
    Ok(Json(RoutineDetailResponse {
        routine: RoutineSummary::from(&routine),
        steps: steps.iter().map(StepResponse::from).collect(),
    }))
}

/// Create a routine from the builder.
async fn create_routine(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveRoutineRequest>,
) -> Result<Json<SaveRoutineResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let id = state.routines.save_routine(None, request.into_draft()?).await?;
    Ok(Json(SaveRoutineResponse { id }))
}

/// Update a routine; the step list replaces the stored one wholesale.
async fn update_routine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SaveRoutineRequest>,
) -> Result<Json<SaveRoutineResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let id = state
        .routines
        .save_routine(Some(&id), request.into_draft()?)
        .await?;
    Ok(Json(SaveRoutineResponse { id }))
}

/// Delete a routine and all of its steps.
async fn delete_routine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let steps_deleted = state.routines.delete_routine(&id).await?;
    Ok(Json(serde_json::json!({ "stepsDeleted": steps_deleted })))
}

/// Clone a catalog routine as a personal copy for a user.
async fn assign_routine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<AssignmentOutcome>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let outcome = state.routines.assign_routine(&id, &request.user_id).await?;
    Ok(Json(outcome))
}

/// Remove a personal routine. Safe to repeat.
async fn unassign_routine(
    State(state): State<Arc<AppState>>,
    Path(routine_id): Path<String>,
) -> Result<Json<UnassignOutcome>> {
    let outcome = state.routines.unassign_routine(&routine_id).await?;
    Ok(Json(outcome))
}

/// List a user's personal routines.
async fn user_routines(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<RoutineSummary>>> {
    let routines = state.db.personal_routines_for_user(&user_id).await?;
    Ok(Json(routines.iter().map(RoutineSummary::from).collect()))
}

/// Roll back clones that crashed mid-commit.
async fn reconcile_clones(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReconcileReport>> {
    let stuck_before = chrono::Utc::now()
        - chrono::Duration::minutes(crate::services::routine::STUCK_CLONE_TIMEOUT_MINUTES);
    Ok(Json(
        state.routines.reconcile_pending_clones(stuck_before).await?,
    ))
}
