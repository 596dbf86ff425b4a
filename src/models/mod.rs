// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod challenge;
pub mod exercise;
pub mod routine;
pub mod user;

pub use challenge::{Challenge, ChallengeKind};
pub use exercise::{Exercise, ExerciseLog};
pub use routine::{AssignmentClaim, CloneStatus, Routine, RoutineKind, RoutineStep};
pub use user::{UserProfile, UserRole};
