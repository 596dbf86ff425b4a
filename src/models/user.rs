// SPDX-License-Identifier: MIT

//! User profile model.

use serde::{Deserialize, Serialize};

/// Account role stored on the user document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Entrenador,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::Entrenador => "entrenador",
        }
    }
}

/// User profile in the `users` collection. Read-only input for the
/// assignment engine; account creation happens in the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub tipo: UserRole,
}

impl UserProfile {
    /// Name shown in notifications: `nombre`, falling back to the email.
    pub fn display_name(&self) -> &str {
        if self.nombre.is_empty() {
            &self.email
        } else {
            &self.nombre
        }
    }
}
