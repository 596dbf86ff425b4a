// SPDX-License-Identifier: MIT

//! User listing and cascading deletion.

use crate::error::Result;
use crate::models::UserProfile;
use crate::services::routine::PurgeReport;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", axum::routing::delete(delete_user))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub id: String,
    pub nombre: String,
    pub email: String,
    pub tipo: String,
}

impl From<&UserProfile> for UserResponse {
    fn from(u: &UserProfile) -> Self {
        Self {
            id: u.id.clone().unwrap_or_default(),
            nombre: u.nombre.clone(),
            email: u.email.clone(),
            tipo: u.tipo.as_str().to_string(),
        }
    }
}

/// List all user profiles.
async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UserResponse>>> {
    let users = state.db.list_users().await?;
    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

/// Delete a user with all their personal routines, steps, claims and logs.
async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PurgeReport>> {
    Ok(Json(state.routines.purge_user(&id).await?))
}
