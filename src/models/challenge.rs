// SPDX-License-Identifier: MIT

//! Challenge model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Challenge audience.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    /// Visible to the whole community.
    #[default]
    Comunitario,
    /// Targeted at a single user (`assignedUserID` set).
    Asignado,
}

/// Challenge document in the `challenges` collection, admin-managed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    /// Mirrors the document id, same pattern as `routineID`.
    #[serde(rename = "challengeID", default)]
    pub challenge_id: String,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default)]
    pub reglas: String,
    #[serde(
        rename = "fechaInicio",
        default,
        with = "firestore::serialize_as_optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub fecha_inicio: Option<DateTime<Utc>>,
    #[serde(
        rename = "fechaFin",
        default,
        with = "firestore::serialize_as_optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub fecha_fin: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tipo: ChallengeKind,
    #[serde(
        rename = "assignedUserID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_user_id: Option<String>,
}

impl Challenge {
    /// Effective document id: the store id when present, otherwise the
    /// `challengeID` field. Same precedence as [`super::Routine::doc_id`];
    /// a legacy document whose field diverged must still be addressed by
    /// its real id.
    pub fn doc_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.challenge_id)
    }
}
