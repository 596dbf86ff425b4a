// SPDX-License-Identifier: MIT

//! Chart-data endpoints for the admin dashboard.

use crate::error::{AppError, Result};
use crate::models::RoutineKind;
use crate::services::charts::{self, DateCounts, KeyCount};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/stats/exercises", get(exercise_popularity))
        .route("/api/stats/challenges", get(challenge_dates))
        .route("/api/stats/overview", get(overview))
}

#[derive(Deserialize)]
struct RangeQuery {
    /// Start of the range, RFC3339.
    from: Option<String>,
    /// End of the range, RFC3339.
    to: Option<String>,
}

fn parse_bound(
    label: &str,
    raw: Option<&str>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    raw.map(|s| {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|_| {
                AppError::BadRequest(format!("Invalid '{}': must be RFC3339 datetime", label))
            })
    })
    .transpose()
}

/// Most-logged exercises, optionally within a date range.
async fn exercise_popularity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<KeyCount>>> {
    let from = parse_bound("from", query.from.as_deref())?;
    let to = parse_bound("to", query.to.as_deref())?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(AppError::BadRequest(
                "'from' must not be after 'to'".to_string(),
            ));
        }
    }

    let logs = state.db.exercise_logs_between(from, to).await?;
    Ok(Json(charts::count_by_key(&logs, |l| &l.exercise_name)))
}

/// Challenge start/end counts per calendar date.
async fn challenge_dates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DateCounts>>> {
    let challenges = state.db.list_challenges().await?;
    Ok(Json(charts::count_by_date_key(
        &challenges,
        |c| c.fecha_inicio,
        |c| c.fecha_fin,
    )))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct OverviewResponse {
    pub users: usize,
    #[serde(rename = "catalogRoutines")]
    pub catalog_routines: usize,
    #[serde(rename = "personalRoutines")]
    pub personal_routines: usize,
    pub exercises: usize,
    pub challenges: usize,
}

/// Top-line counts for the dashboard header.
async fn overview(State(state): State<Arc<AppState>>) -> Result<Json<OverviewResponse>> {
    let routines = state.db.list_routines(None).await?;
    let (catalog, personal): (Vec<_>, Vec<_>) = routines
        .iter()
        .partition(|r| r.tipo == RoutineKind::Predefinida);

    Ok(Json(OverviewResponse {
        users: state.db.list_users().await?.len(),
        catalog_routines: catalog.len(),
        personal_routines: personal.len(),
        exercises: state.db.list_exercises().await?.len(),
        challenges: state.db.list_challenges().await?.len(),
    }))
}
