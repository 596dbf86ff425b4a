// SPDX-License-Identifier: MIT

//! Exercise catalog model.

use serde::{Deserialize, Serialize};

/// Catalog exercise in the `exercises` collection, admin-managed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default)]
    pub nombre: String,
    #[serde(rename = "grupoMuscular", default)]
    pub grupo_muscular: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(rename = "mediaURL", default)]
    pub media_url: String,
}

/// A logged workout set in the `exercise_logs` collection.
///
/// Written by the log-intake endpoint; read back for the popularity chart
/// aggregation and the user purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseLog {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    #[serde(rename = "exerciseName", default)]
    pub exercise_name: String,
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(
        default,
        with = "firestore::serialize_as_optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}
