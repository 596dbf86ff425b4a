// SPDX-License-Identifier: MIT

//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const ROUTINES: &str = "routines";
    pub const ROUTINE_EXERCISES: &str = "routine_exercises";
    /// Create-if-absent claims keyed by `(userID, nombre)`
    pub const ROUTINE_ASSIGNMENTS: &str = "routine_assignments";
    pub const EXERCISES: &str = "exercises";
    pub const EXERCISE_LOGS: &str = "exercise_logs";
    pub const CHALLENGES: &str = "challenges";
}
