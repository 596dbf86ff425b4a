// SPDX-License-Identifier: MIT

//! Allenare API: backend for the Allenare training app.
//!
//! Manages the routine catalog, per-user routine assignment (deep clone of
//! a template routine plus its exercise steps), the exercise catalog,
//! challenges and the admin statistics endpoints.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::RoutineService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub routines: RoutineService,
}
