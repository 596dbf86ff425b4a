// SPDX-License-Identifier: MIT

//! Challenge management endpoints.

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::{Challenge, ChallengeKind};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/challenges",
            get(list_challenges).post(create_challenge),
        )
        .route(
            "/api/challenges/{id}",
            axum::routing::put(update_challenge).delete(delete_challenge),
        )
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChallengeResponse {
    pub id: String,
    pub nombre: String,
    pub descripcion: String,
    pub reglas: String,
    #[serde(rename = "fechaInicio")]
    pub fecha_inicio: Option<String>,
    #[serde(rename = "fechaFin")]
    pub fecha_fin: Option<String>,
    pub tipo: String,
    #[serde(rename = "assignedUserID")]
    pub assigned_user_id: Option<String>,
}

impl From<&Challenge> for ChallengeResponse {
    fn from(c: &Challenge) -> Self {
        Self {
            id: c.doc_id().to_string(),
            nombre: c.nombre.clone(),
            descripcion: c.descripcion.clone(),
            reglas: c.reglas.clone(),
            fecha_inicio: c.fecha_inicio.map(format_utc_rfc3339),
            fecha_fin: c.fecha_fin.map(format_utc_rfc3339),
            tipo: match c.tipo {
                ChallengeKind::Comunitario => "comunitario".to_string(),
                ChallengeKind::Asignado => "asignado".to_string(),
            },
            assigned_user_id: c.assigned_user_id.clone(),
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct ChallengeRequest {
    #[validate(length(min = 1, max = 200, message = "nombre must not be empty"))]
    pub nombre: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default)]
    pub reglas: String,
    /// RFC3339 datetimes.
    #[serde(rename = "fechaInicio", default)]
    pub fecha_inicio: Option<String>,
    #[serde(rename = "fechaFin", default)]
    pub fecha_fin: Option<String>,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(rename = "assignedUserID", default)]
    pub assigned_user_id: Option<String>,
}

fn parse_fecha(label: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| {
                AppError::BadRequest(format!("Invalid '{}': must be RFC3339 datetime", label))
            })
    })
    .transpose()
}

impl ChallengeRequest {
    fn into_model(self, challenge_id: &str) -> Result<Challenge> {
        let tipo = match self.tipo.as_deref() {
            None | Some("comunitario") => ChallengeKind::Comunitario,
            Some("asignado") => ChallengeKind::Asignado,
            Some(other) => {
                return Err(AppError::BadRequest(format!(
                    "Invalid 'tipo' parameter: {}",
                    other
                )))
            }
        };

        let assigned_user_id = self.assigned_user_id.filter(|id| !id.is_empty());
        if tipo == ChallengeKind::Asignado && assigned_user_id.is_none() {
            return Err(AppError::BadRequest(
                "An 'asignado' challenge requires assignedUserID".to_string(),
            ));
        }

        Ok(Challenge {
            id: None,
            challenge_id: challenge_id.to_string(),
            nombre: self.nombre,
            descripcion: self.descripcion,
            reglas: self.reglas,
            fecha_inicio: parse_fecha("fechaInicio", self.fecha_inicio.as_deref())?,
            fecha_fin: parse_fecha("fechaFin", self.fecha_fin.as_deref())?,
            tipo,
            assigned_user_id,
        })
    }
}

/// List all challenges.
async fn list_challenges(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChallengeResponse>>> {
    let challenges = state.db.list_challenges().await?;
    Ok(Json(
        challenges.iter().map(ChallengeResponse::from).collect(),
    ))
}

/// Create a challenge. `challengeID` always mirrors the document id.
async fn create_challenge(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let id = FirestoreDb::generate_document_id()?;
    let challenge = request.into_model(&id)?;
    state.db.upsert_challenge(&id, &challenge).await?;
    Ok(Json(ChallengeResponse::from(&challenge)))
}

/// Replace a challenge, re-aligning `challengeID` with the document id.
async fn update_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let challenge = request.into_model(&id)?;
    state.db.upsert_challenge(&id, &challenge).await?;
    Ok(Json(ChallengeResponse::from(&challenge)))
}

/// Delete a challenge.
async fn delete_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.db.delete_challenge_doc(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
