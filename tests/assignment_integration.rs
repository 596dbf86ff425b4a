// SPDX-License-Identifier: MIT

//! Assignment and unassignment integration tests.
//!
//! These tests require the Firestore emulator to be running:
//!   FIRESTORE_EMULATOR_HOST=localhost:8080 cargo test

use allenare_api::db::{collections, FirestoreDb};
use allenare_api::error::AppError;
use allenare_api::models::{AssignmentClaim, CloneStatus, Routine, RoutineKind, RoutineStep};
use allenare_api::services::RoutineService;

mod common;
use common::{test_db, unique_id};

async fn seed_user(db: &FirestoreDb, user_id: &str, nombre: &str) {
    db.upsert_raw(
        collections::USERS,
        user_id,
        &serde_json::json!({
            "nombre": nombre,
            "email": format!("{}@example.com", user_id),
            "tipo": "user",
        }),
    )
    .await
    .unwrap();
}

fn catalog_routine(routine_id: &str, nombre: &str) -> Routine {
    Routine {
        id: None,
        routine_id: routine_id.to_string(),
        nombre: nombre.to_string(),
        tipo: RoutineKind::Predefinida,
        user_id: String::new(),
        clone_status: None,
    }
}

fn step(routine_id: &str, orden: i64, exercise: &str) -> RoutineStep {
    RoutineStep {
        id: None,
        routine_id: routine_id.to_string(),
        exercise_id: format!("ex-{}", exercise),
        exercise_nombre: exercise.to_string(),
        exercise_media_url: format!("https://example.com/{}.gif", exercise),
        orden,
        series: "4".to_string(),
        repeticiones: "12".to_string(),
        tiempo_descanso_segundos: 60,
    }
}

async fn seed_catalog(
    db: &FirestoreDb,
    nombre: &str,
    steps: &[RoutineStep],
) -> String {
    let routine_id = unique_id("routine");
    db.upsert_routine(&routine_id, &catalog_routine(&routine_id, nombre))
        .await
        .unwrap();

    let linked: Vec<RoutineStep> = steps
        .iter()
        .map(|s| {
            let mut s = s.clone();
            s.routine_id = routine_id.clone();
            s
        })
        .collect();
    db.insert_steps(&linked).await.unwrap();

    routine_id
}

// ═══════════════════════════════════════════════════════════════════════════
// ASSIGNMENT
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_assign_clones_steps_faithfully() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;

    let steps = vec![
        step("", 0, "Sentadilla"),
        step("", 1, "Press banca"),
        step("", 2, "Dominadas"),
    ];
    let source_id = seed_catalog(&db, &unique_id("Full Body"), &steps).await;

    let outcome = service.assign_routine(&source_id, &user_id).await.unwrap();
    assert_eq!(outcome.steps_cloned, 3);
    assert_eq!(outcome.batches_committed, 1);
    assert_ne!(outcome.routine_id, source_id);

    let (personal, cloned) = service
        .load_routine_with_steps(&outcome.routine_id)
        .await
        .unwrap();
    assert_eq!(personal.tipo, RoutineKind::Personal);
    assert_eq!(personal.user_id, user_id);
    assert_eq!(personal.routine_id, outcome.routine_id);
    assert_eq!(personal.clone_status, Some(CloneStatus::Complete));

    assert_eq!(cloned.len(), steps.len());
    for (original, copy) in steps.iter().zip(cloned.iter()) {
        assert_eq!(copy.routine_id, outcome.routine_id);
        assert_eq!(copy.exercise_id, original.exercise_id);
        assert_eq!(copy.exercise_nombre, original.exercise_nombre);
        assert_eq!(copy.exercise_media_url, original.exercise_media_url);
        assert_eq!(copy.orden, original.orden);
        assert_eq!(copy.series, original.series);
        assert_eq!(copy.repeticiones, original.repeticiones);
        assert_eq!(
            copy.tiempo_descanso_segundos,
            original.tiempo_descanso_segundos
        );
    }
}

#[tokio::test]
async fn test_assign_zero_step_routine() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;

    let source_id = seed_catalog(&db, &unique_id("Empty"), &[]).await;

    let outcome = service.assign_routine(&source_id, &user_id).await.unwrap();
    assert_eq!(outcome.steps_cloned, 0);
    assert_eq!(outcome.batches_committed, 1);

    let (personal, cloned) = service
        .load_routine_with_steps(&outcome.routine_id)
        .await
        .unwrap();
    assert_eq!(personal.clone_status, Some(CloneStatus::Complete));
    assert!(cloned.is_empty());
}

#[tokio::test]
async fn test_duplicate_assignment_rejected_without_writes() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;

    let nombre = unique_id("Leg Day");
    let source_id = seed_catalog(&db, &nombre, &[step("", 0, "Sentadilla")]).await;

    service.assign_routine(&source_id, &user_id).await.unwrap();

    let err = service
        .assign_routine(&source_id, &user_id)
        .await
        .unwrap_err();
    assert!(
        matches!(err, AppError::DuplicateAssignment { .. }),
        "expected DuplicateAssignment, got {:?}",
        err
    );

    // Exactly one personal copy; the failed attempt wrote nothing.
    let personal = db.personal_routines_for_user(&user_id).await.unwrap();
    assert_eq!(personal.len(), 1);
    let (_, steps) = service
        .load_routine_with_steps(personal[0].doc_id())
        .await
        .unwrap();
    assert_eq!(steps.len(), 1);
}

#[tokio::test]
async fn test_existing_claim_blocks_assignment() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;

    let nombre = unique_id("Push Day");
    let source_id = seed_catalog(&db, &nombre, &[step("", 0, "Fondos")]).await;

    // A concurrent assignment's claim exists but its routine doc does not
    // yet, so the uniqueness query alone would pass.
    let claimed = db
        .try_claim_assignment(&AssignmentClaim {
            user_id: user_id.clone(),
            nombre: nombre.clone(),
            routine_id: "in-flight".to_string(),
            assigned_at: chrono::Utc::now().to_rfc3339(),
        })
        .await
        .unwrap();
    assert!(claimed);

    let err = service
        .assign_routine(&source_id, &user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateAssignment { .. }));
    assert!(db.personal_routines_for_user(&user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_claim_is_reusable_after_unassign() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;

    let source_id = seed_catalog(&db, &unique_id("Pull Day"), &[step("", 0, "Remo")]).await;

    let first = service.assign_routine(&source_id, &user_id).await.unwrap();
    service.unassign_routine(&first.routine_id).await.unwrap();

    // The claim was released with the routine, so the name is free again.
    let second = service.assign_routine(&source_id, &user_id).await.unwrap();
    assert_ne!(second.routine_id, first.routine_id);
}

#[tokio::test]
async fn test_assign_missing_user_or_routine() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());

    let err = service
        .assign_routine("no-such-routine", "no-such-user")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;
    let err = service
        .assign_routine("no-such-routine", &user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ═══════════════════════════════════════════════════════════════════════════
// CHUNKING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_clone_spanning_batch_boundary() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;

    // 501 steps: parent + steps no longer fit in one 500-op batch.
    let steps: Vec<RoutineStep> = (0..501)
        .map(|i| step("", i, &format!("Ejercicio {}", i)))
        .collect();
    let source_id = seed_catalog(&db, &unique_id("Marathon"), &steps).await;

    let outcome = service.assign_routine(&source_id, &user_id).await.unwrap();
    assert_eq!(outcome.steps_cloned, 501);
    assert!(
        outcome.batches_committed >= 2,
        "501 steps must span multiple batches, got {}",
        outcome.batches_committed
    );

    let (personal, cloned) = service
        .load_routine_with_steps(&outcome.routine_id)
        .await
        .unwrap();
    assert_eq!(personal.clone_status, Some(CloneStatus::Complete));
    assert_eq!(cloned.len(), 501);
    // Sorted by orden, positions preserved without renumbering.
    for (i, s) in cloned.iter().enumerate() {
        assert_eq!(s.orden, i as i64);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LEGACY DATA
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_legacy_typed_steps_normalized_on_read() {
    require_emulator!();

    let db = test_db().await;
    let routine_id = unique_id("legacy");
    db.upsert_routine(&routine_id, &catalog_routine(&routine_id, "Legacy"))
        .await
        .unwrap();

    // Written by an old client: series numeric, rest seconds as a string.
    db.upsert_raw(
        collections::ROUTINE_EXERCISES,
        &unique_id("step"),
        &serde_json::json!({
            "routineID": routine_id,
            "exerciseID": "ex-1",
            "exerciseNombre": "Sentadilla",
            "orden": "2",
            "series": 4,
            "repeticiones": null,
            "tiempoDescansoSegundos": "60",
        }),
    )
    .await
    .unwrap();

    let steps = db
        .steps_for_routine_ids(&[routine_id.clone()])
        .await
        .unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].series, "4");
    assert_eq!(steps[0].repeticiones, "");
    assert_eq!(steps[0].orden, 2);
    assert_eq!(steps[0].tiempo_descanso_segundos, 60);
}

#[tokio::test]
async fn test_diverged_routine_id_steps_found() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());

    // Legacy routine whose stored routineID differs from the document id;
    // its steps link through the stored field.
    let doc_id = unique_id("legacy-doc");
    let stale_link = unique_id("stale-link");
    db.upsert_raw(
        collections::ROUTINES,
        &doc_id,
        &serde_json::json!({
            "routineID": stale_link,
            "nombre": "Diverged",
            "tipo": "predefinida",
            "userID": "",
        }),
    )
    .await
    .unwrap();
    db.upsert_raw(
        collections::ROUTINE_EXERCISES,
        &unique_id("step"),
        &serde_json::json!({
            "routineID": stale_link,
            "exerciseID": "ex-1",
            "exerciseNombre": "Peso muerto",
            "orden": 0,
            "series": "5",
            "repeticiones": "5",
            "tiempoDescansoSegundos": 120,
        }),
    )
    .await
    .unwrap();

    let (routine, steps) = service.load_routine_with_steps(&doc_id).await.unwrap();
    assert_eq!(routine.step_link_ids().len(), 2);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].exercise_nombre, "Peso muerto");
}

// ═══════════════════════════════════════════════════════════════════════════
// UNASSIGNMENT
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_unassign_is_idempotent() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;

    let source_id = seed_catalog(&db, &unique_id("Core"), &[step("", 0, "Plancha")]).await;
    let outcome = service.assign_routine(&source_id, &user_id).await.unwrap();

    let first = service.unassign_routine(&outcome.routine_id).await.unwrap();
    assert!(first.removed);
    assert_eq!(first.steps_deleted, 1);

    // Second pass: everything already gone, still success.
    let second = service.unassign_routine(&outcome.routine_id).await.unwrap();
    assert!(!second.removed);
    assert_eq!(second.steps_deleted, 0);

    assert!(db.get_routine(&outcome.routine_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unassign_removes_only_target_routine() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;

    let source_a = seed_catalog(&db, &unique_id("A"), &[step("", 0, "Sentadilla")]).await;
    let source_b =
        seed_catalog(&db, &unique_id("B"), &[step("", 0, "Press militar"), step("", 1, "Remo")])
            .await;

    let a = service.assign_routine(&source_a, &user_id).await.unwrap();
    let b = service.assign_routine(&source_b, &user_id).await.unwrap();

    service.unassign_routine(&a.routine_id).await.unwrap();

    assert!(db.get_routine(&a.routine_id).await.unwrap().is_none());
    let (survivor, steps) = service.load_routine_with_steps(&b.routine_id).await.unwrap();
    assert_eq!(survivor.user_id, user_id);
    assert_eq!(steps.len(), 2);

    // The catalog sources are untouched.
    assert!(db.get_routine(&source_a).await.unwrap().is_some());
    assert!(db.get_routine(&source_b).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unassign_keeps_same_named_routine_of_other_user() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());

    let user_a = unique_id("user-a");
    let user_b = unique_id("user-b");
    seed_user(&db, &user_a, "Ana").await;
    seed_user(&db, &user_b, "Berta").await;

    // Same source, so both personal copies share a name.
    let source_id = seed_catalog(&db, &unique_id("Shared"), &[step("", 0, "Sentadilla")]).await;
    let a = service.assign_routine(&source_id, &user_a).await.unwrap();
    let b = service.assign_routine(&source_id, &user_b).await.unwrap();

    service.unassign_routine(&a.routine_id).await.unwrap();

    let (survivor, steps) = service.load_routine_with_steps(&b.routine_id).await.unwrap();
    assert_eq!(survivor.user_id, user_b);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].exercise_nombre, "Sentadilla");
}

#[tokio::test]
async fn test_unassign_rejects_catalog_routine() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());

    let source_id = seed_catalog(&db, &unique_id("Catalog"), &[]).await;
    let err = service.unassign_routine(&source_id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(db.get_routine(&source_id).await.unwrap().is_some());
}

// ═══════════════════════════════════════════════════════════════════════════
// RECONCILIATION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_reconcile_rolls_back_pending_clone() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    let nombre = unique_id("Stuck");

    // Simulate a clone that crashed between batches: pending parent, some
    // steps, a live claim.
    let routine_id = unique_id("pending");
    db.upsert_raw(
        collections::ROUTINES,
        &routine_id,
        &serde_json::json!({
            "routineID": routine_id,
            "nombre": nombre,
            "tipo": "personal",
            "userID": user_id,
            "cloneStatus": "pending",
        }),
    )
    .await
    .unwrap();
    db.insert_steps(&[step(&routine_id, 0, "Sentadilla")])
        .await
        .unwrap();
    db.try_claim_assignment(&AssignmentClaim {
        user_id: user_id.clone(),
        nombre: nombre.clone(),
        routine_id: routine_id.clone(),
        // Old enough to be past any in-flight grace period.
        assigned_at: "2020-01-01T00:00:00Z".to_string(),
    })
    .await
    .unwrap();

    // A pending clone with a fresh claim may still be committing and
    // must survive the pass.
    let fresh_id = unique_id("fresh");
    let fresh_nombre = unique_id("InFlight");
    db.upsert_raw(
        collections::ROUTINES,
        &fresh_id,
        &serde_json::json!({
            "routineID": fresh_id,
            "nombre": fresh_nombre,
            "tipo": "personal",
            "userID": user_id,
            "cloneStatus": "pending",
        }),
    )
    .await
    .unwrap();
    db.try_claim_assignment(&AssignmentClaim {
        user_id: user_id.clone(),
        nombre: fresh_nombre.clone(),
        routine_id: fresh_id.clone(),
        assigned_at: chrono::Utc::now().to_rfc3339(),
    })
    .await
    .unwrap();

    let stuck_before = chrono::Utc::now() - chrono::Duration::minutes(15);
    let report = service
        .reconcile_pending_clones(stuck_before)
        .await
        .unwrap();
    assert!(report.routine_ids.contains(&routine_id));
    assert!(!report.routine_ids.contains(&fresh_id));
    assert!(db.get_routine(&fresh_id).await.unwrap().is_some());

    assert!(db.get_routine(&routine_id).await.unwrap().is_none());
    assert!(db
        .steps_for_routine_ids(&[routine_id.clone()])
        .await
        .unwrap()
        .is_empty());

    // Claim released: the pair can be claimed again.
    let reclaimed = db
        .try_claim_assignment(&AssignmentClaim {
            user_id: user_id.clone(),
            nombre: nombre.clone(),
            routine_id: "retry".to_string(),
            assigned_at: chrono::Utc::now().to_rfc3339(),
        })
        .await
        .unwrap();
    assert!(reclaimed);
}

#[tokio::test]
async fn test_reconcile_releases_claim_without_routine() {
    require_emulator!();

    let db = test_db().await;
    let service = RoutineService::new(db.clone());
    let user_id = unique_id("user");
    seed_user(&db, &user_id, "Ana").await;

    let nombre = unique_id("Orphan");
    let source_id = seed_catalog(&db, &nombre, &[step("", 0, "Sentadilla")]).await;

    // A crash after the claim write but before the first batch leaves a
    // claim with no routine behind it and no pending marker to find.
    db.try_claim_assignment(&AssignmentClaim {
        user_id: user_id.clone(),
        nombre: nombre.clone(),
        routine_id: unique_id("never-written"),
        assigned_at: "2020-01-01T00:00:00Z".to_string(),
    })
    .await
    .unwrap();

    // Every retry is blocked by the leftover claim.
    let err = service
        .assign_routine(&source_id, &user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateAssignment { .. }));

    // A fresh claim for another name may belong to an assignment still
    // writing its first batch and must survive the pass.
    let fresh_nombre = unique_id("FreshOrphan");
    db.try_claim_assignment(&AssignmentClaim {
        user_id: user_id.clone(),
        nombre: fresh_nombre.clone(),
        routine_id: unique_id("in-flight"),
        assigned_at: chrono::Utc::now().to_rfc3339(),
    })
    .await
    .unwrap();

    let stuck_before = chrono::Utc::now() - chrono::Duration::minutes(15);
    let report = service
        .reconcile_pending_clones(stuck_before)
        .await
        .unwrap();
    assert!(report.orphan_claims_released >= 1);

    // The pair is usable again.
    let outcome = service.assign_routine(&source_id, &user_id).await.unwrap();
    assert_eq!(outcome.steps_cloned, 1);

    // The fresh claim still blocks its pair.
    let held = db
        .try_claim_assignment(&AssignmentClaim {
            user_id: user_id.clone(),
            nombre: fresh_nombre.clone(),
            routine_id: "retry".to_string(),
            assigned_at: chrono::Utc::now().to_rfc3339(),
        })
        .await
        .unwrap();
    assert!(!held);
}
