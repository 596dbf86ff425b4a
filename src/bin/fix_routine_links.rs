// SPDX-License-Identifier: MIT

//! One-off migration: re-align `routine_exercises.routineID` (and the
//! routine's own `routineID` field) with the routine document id.
//!
//! Legacy data created routines whose stored `routineID` diverged from the
//! document id, leaving steps linked to an id nothing else uses. Dry-run by
//! default; pass `--apply` to persist the rewrites.
//!
//! Usage:
//!   fix-routine-links            # report what would change
//!   fix-routine-links --apply    # write the fixes

use allenare_api::config::Config;
use allenare_api::db::FirestoreDb;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let apply = match std::env::args().nth(1).as_deref() {
        None => false,
        Some("--apply") => true,
        Some(other) => {
            eprintln!("Unknown argument: {} (expected --apply)", other);
            std::process::exit(2);
        }
    };

    let config = Config::from_env()?;
    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    if !apply {
        tracing::info!("Dry run; pass --apply to persist changes");
    }

    let routines = db.list_routines(None).await?;
    let mut routines_fixed = 0usize;
    let mut steps_fixed = 0usize;

    for routine in &routines {
        let Some(doc_id) = routine.id.clone() else {
            continue;
        };
        if routine.routine_id == doc_id {
            continue;
        }

        tracing::info!(
            routine = %doc_id,
            stored = %routine.routine_id,
            nombre = %routine.nombre,
            "routineID diverges from document id"
        );

        // Steps still linked through the stale id.
        let link_ids = vec![routine.routine_id.clone()];
        let stale_steps = db.steps_for_routine_ids(&link_ids).await?;

        for step in &stale_steps {
            let Some(step_id) = step.id.clone() else {
                continue;
            };
            tracing::info!(
                step = %step_id,
                exercise = %step.exercise_nombre,
                old = %step.routine_id,
                new = %doc_id,
                "relink step"
            );
            if apply {
                let mut fixed = step.clone();
                fixed.routine_id = doc_id.clone();
                db.upsert_step(&step_id, &fixed).await?;
            }
            steps_fixed += 1;
        }

        if apply {
            let mut fixed = routine.clone();
            fixed.routine_id = doc_id.clone();
            db.upsert_routine(&doc_id, &fixed).await?;
        }
        routines_fixed += 1;
    }

    tracing::info!(
        routines = routines_fixed,
        steps = steps_fixed,
        applied = apply,
        "Link repair finished"
    );

    Ok(())
}
