// SPDX-License-Identifier: MIT

//! Exercise catalog and workout log endpoints.

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::{Exercise, ExerciseLog};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
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
        .route("/api/exercises", get(list_exercises).post(create_exercise))
        .route(
            "/api/exercises/{id}",
            axum::routing::put(update_exercise).delete(delete_exercise),
        )
        .route("/api/logs", post(record_log))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ExerciseResponse {
    pub id: String,
    pub nombre: String,
    #[serde(rename = "grupoMuscular")]
    pub grupo_muscular: String,
    pub descripcion: String,
    #[serde(rename = "mediaURL")]
    pub media_url: String,
}

impl From<&Exercise> for ExerciseResponse {
    fn from(e: &Exercise) -> Self {
        Self {
            id: e.id.clone().unwrap_or_default(),
            nombre: e.nombre.clone(),
            grupo_muscular: e.grupo_muscular.clone(),
            descripcion: e.descripcion.clone(),
            media_url: e.media_url.clone(),
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct ExerciseRequest {
    #[validate(length(min = 1, max = 200, message = "nombre must not be empty"))]
    pub nombre: String,
    #[serde(rename = "grupoMuscular", default)]
    pub grupo_muscular: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(rename = "mediaURL", default)]
    pub media_url: String,
}

impl ExerciseRequest {
    fn into_model(self) -> Exercise {
        Exercise {
            id: None,
            nombre: self.nombre,
            grupo_muscular: self.grupo_muscular,
            descripcion: self.descripcion,
            media_url: self.media_url,
        }
    }
}

/// List the exercise catalog.
async fn list_exercises(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ExerciseResponse>>> {
    let exercises = state.db.list_exercises().await?;
    Ok(Json(exercises.iter().map(ExerciseResponse::from).collect()))
}

/// Add a catalog exercise.
///
/// Catalog edits never propagate to authored routines; steps carry their
/// own snapshot of the exercise name and media URL.
async fn create_exercise(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExerciseRequest>,
) -> Result<Json<ExerciseResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let id = FirestoreDb::generate_document_id()?;
    let exercise = request.into_model();
    state.db.upsert_exercise(&id, &exercise).await?;

    let mut stored = exercise;
    stored.id = Some(id);
    Ok(Json(ExerciseResponse::from(&stored)))
}

/// Replace a catalog exercise.
async fn update_exercise(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ExerciseRequest>,
) -> Result<Json<ExerciseResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut exercise = request.into_model();
    state.db.upsert_exercise(&id, &exercise).await?;
    exercise.id = Some(id);
    Ok(Json(ExerciseResponse::from(&exercise)))
}

#[derive(Deserialize, Validate)]
pub struct LogRequest {
    #[serde(rename = "exerciseName")]
    #[validate(length(min = 1, max = 200, message = "exerciseName must not be empty"))]
    pub exercise_name: String,
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
pub struct LogResponse {
    pub id: String,
    #[serde(rename = "exerciseName")]
    pub exercise_name: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Server-assigned time of the set, RFC3339.
    pub timestamp: String,
}

/// Record a workout set. The timestamp is assigned server-side.
async fn record_log(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LogRequest>,
) -> Result<Json<LogResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state
        .db
        .get_user_profile(&request.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", request.user_id)))?;

    let now = chrono::Utc::now();
    let log = ExerciseLog {
        id: None,
        exercise_name: request.exercise_name,
        user_id: request.user_id,
        timestamp: Some(now),
    };
    let id = state.db.insert_exercise_log(&log).await?;

    Ok(Json(LogResponse {
        id,
        exercise_name: log.exercise_name,
        user_id: log.user_id,
        timestamp: format_utc_rfc3339(now),
    }))
}

/// Delete a catalog exercise.
async fn delete_exercise(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.db.delete_exercise_doc(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
