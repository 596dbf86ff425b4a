// SPDX-License-Identifier: MIT

//! Routine assignment, unassignment and builder persistence.
//!
//! Personal routines are created exclusively by cloning a catalog template
//! for a user; the clone is a deep copy (parent document plus one document
//! per exercise step) committed in chunked atomic batches.

use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::{AssignmentClaim, Routine, RoutineKind, RoutineStep};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// How long a clone may stay in `cloneStatus=pending` before the
/// reconciliation pass treats it as crashed rather than in flight.
pub const STUCK_CLONE_TIMEOUT_MINUTES: i64 = 15;

/// Result of a successful assignment.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    /// Document id of the freshly created personal routine.
    #[serde(rename = "routineID")]
    pub routine_id: String,
    #[serde(rename = "stepsCloned")]
    pub steps_cloned: usize,
    #[serde(rename = "batchesCommitted")]
    pub batches_committed: usize,
    /// Display name of the user the routine was assigned to.
    #[serde(rename = "userName")]
    pub user_name: String,
}

/// Result of an unassignment. `removed=false` means the routine was already
/// gone (idempotent success).
#[derive(Debug, Clone, Serialize)]
pub struct UnassignOutcome {
    pub removed: bool,
    #[serde(rename = "stepsDeleted")]
    pub steps_deleted: usize,
}

/// Result of a reconciliation pass over stuck clones.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    #[serde(rename = "rolledBack")]
    pub rolled_back: usize,
    #[serde(rename = "routineIDs")]
    pub routine_ids: Vec<String>,
    /// Claims released because their routine was never written.
    #[serde(rename = "orphanClaimsReleased")]
    pub orphan_claims_released: usize,
}

/// What a routine save or cascade delete touched.
#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    #[serde(rename = "routinesDeleted")]
    pub routines_deleted: usize,
    #[serde(rename = "stepsDeleted")]
    pub steps_deleted: usize,
    #[serde(rename = "logsDeleted")]
    pub logs_deleted: usize,
}

/// Input for the routine builder: a routine and its full ordered step list.
/// Saving an existing routine replaces the step set wholesale.
#[derive(Debug, Clone)]
pub struct RoutineDraft {
    pub nombre: String,
    pub tipo: RoutineKind,
    /// Owner; empty for catalog templates.
    pub user_id: String,
    /// Steps in display order. `orden` and `routineID` are stamped on save.
    pub steps: Vec<RoutineStep>,
}

/// Service wrapping all routine lifecycle operations.
#[derive(Clone)]
pub struct RoutineService {
    db: FirestoreDb,
}

impl RoutineService {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    /// Fetch a routine with its steps, sorted by `orden`.
    ///
    /// Steps are matched against both the document id and a divergent
    /// legacy `routineID` field, then de-duplicated.
    pub async fn load_routine_with_steps(
        &self,
        routine_id: &str,
    ) -> Result<(Routine, Vec<RoutineStep>), AppError> {
        let routine = self
            .db
            .get_routine(routine_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Routine {}", routine_id)))?;

        let mut steps = self.db.steps_for_routine_ids(&routine.step_link_ids()).await?;
        steps.sort_by_key(|s| s.orden);

        Ok((routine, steps))
    }

    /// Clone a catalog routine as a personal copy for a user.
    ///
    /// Fails with [`AppError::DuplicateAssignment`] before writing anything
    /// if the user already has a personal routine with the same name; the
    /// check is backed by a create-if-absent claim so two concurrent
    /// assignments cannot both pass it.
    pub async fn assign_routine(
        &self,
        source_routine_id: &str,
        target_user_id: &str,
    ) -> Result<AssignmentOutcome, AppError> {
        let user = self
            .db
            .get_user_profile(target_user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", target_user_id)))?;

        let (source, steps) = self.load_routine_with_steps(source_routine_id).await?;

        let existing = self
            .db
            .find_personal_assignment(target_user_id, &source.nombre)
            .await?;
        if !existing.is_empty() {
            return Err(AppError::DuplicateAssignment {
                user: user.display_name().to_string(),
                routine: source.nombre.clone(),
            });
        }

        let new_routine_id = FirestoreDb::generate_document_id()?;

        let claim = AssignmentClaim {
            user_id: target_user_id.to_string(),
            nombre: source.nombre.clone(),
            routine_id: new_routine_id.clone(),
            assigned_at: format_utc_rfc3339(chrono::Utc::now()),
        };
        if !self.db.try_claim_assignment(&claim).await? {
            // Lost the race: another assignment claimed this name first.
            return Err(AppError::DuplicateAssignment {
                user: user.display_name().to_string(),
                routine: source.nombre.clone(),
            });
        }

        let parent = Routine {
            id: None,
            routine_id: new_routine_id.clone(),
            nombre: source.nombre.clone(),
            tipo: RoutineKind::Personal,
            user_id: target_user_id.to_string(),
            clone_status: None,
        };
        let cloned: Vec<RoutineStep> = steps.iter().map(|s| s.clone_for(&new_routine_id)).collect();

        let batches_committed = match self
            .db
            .commit_personal_clone(&new_routine_id, &parent, &cloned)
            .await
        {
            Ok(batches) => batches,
            Err(err @ AppError::PartialCommit { .. }) => {
                // Keep the claim: the pending parent exists and the
                // reconciliation pass will clean both up together.
                return Err(err);
            }
            Err(err) => {
                // Nothing was persisted; give the name back.
                if let Err(release_err) = self
                    .db
                    .release_assignment_claim(target_user_id, &source.nombre)
                    .await
                {
                    tracing::warn!(
                        user_id = target_user_id,
                        nombre = %source.nombre,
                        error = %release_err,
                        "Failed to release assignment claim after aborted clone"
                    );
                }
                return Err(err);
            }
        };

        tracing::info!(
            routine_id = %new_routine_id,
            source_routine_id,
            user_id = target_user_id,
            steps = cloned.len(),
            batches = batches_committed,
            "Assigned routine"
        );

        Ok(AssignmentOutcome {
            routine_id: new_routine_id,
            steps_cloned: cloned.len(),
            batches_committed,
            user_name: user.display_name().to_string(),
        })
    }

    /// Remove a personal routine: its steps, its document, its claim.
    ///
    /// Idempotent; unassigning an already-absent routine reports success.
    pub async fn unassign_routine(&self, routine_id: &str) -> Result<UnassignOutcome, AppError> {
        let Some(routine) = self.db.get_routine(routine_id).await? else {
            return Ok(UnassignOutcome {
                removed: false,
                steps_deleted: 0,
            });
        };

        if routine.tipo != RoutineKind::Personal {
            return Err(AppError::BadRequest(format!(
                "Routine {} is not a personal routine",
                routine_id
            )));
        }

        let steps_deleted = self.cascade_delete(&routine).await?;

        tracing::info!(routine_id, steps = steps_deleted, "Unassigned routine");

        Ok(UnassignOutcome {
            removed: true,
            steps_deleted,
        })
    }

    /// Delete any routine with its steps and claims (admin catalog delete).
    /// Absent routines are a no-op.
    pub async fn delete_routine(&self, routine_id: &str) -> Result<usize, AppError> {
        let Some(routine) = self.db.get_routine(routine_id).await? else {
            return Ok(0);
        };
        let steps_deleted = self.cascade_delete(&routine).await?;
        tracing::info!(routine_id, steps = steps_deleted, "Deleted routine");
        Ok(steps_deleted)
    }

    /// Delete a routine's steps, its document and any claims pointing at it.
    async fn cascade_delete(&self, routine: &Routine) -> Result<usize, AppError> {
        let steps = self.db.steps_for_routine_ids(&routine.step_link_ids()).await?;
        self.db.delete_steps(&steps).await?;
        self.db.delete_routine_doc(routine.doc_id()).await?;

        // The deterministic claim id covers routines created here; the query
        // catches claims whose name no longer matches the routine's.
        if routine.tipo == RoutineKind::Personal && !routine.user_id.is_empty() {
            self.db
                .release_assignment_claim(&routine.user_id, &routine.nombre)
                .await?;
        }
        for claim in self.db.claims_for_routine(routine.doc_id()).await? {
            self.db
                .release_assignment_claim(&claim.user_id, &claim.nombre)
                .await?;
        }

        Ok(steps.len())
    }

    /// Create or update a routine from the builder.
    ///
    /// Edits replace the step set wholesale; steps are stamped with
    /// `orden = 0..n-1` in list order and `routineID` equal to the routine's
    /// document id (repairing any legacy divergence on edit).
    pub async fn save_routine(
        &self,
        existing_id: Option<&str>,
        draft: RoutineDraft,
    ) -> Result<String, AppError> {
        let routine_id = match existing_id {
            Some(id) => {
                let (current, old_steps) = self.load_routine_with_steps(id).await?;
                self.db.delete_steps(&old_steps).await?;
                current.doc_id().to_string()
            }
            None => FirestoreDb::generate_document_id()?,
        };

        let routine = Routine {
            id: None,
            routine_id: routine_id.clone(),
            nombre: draft.nombre,
            tipo: draft.tipo,
            user_id: draft.user_id,
            clone_status: None,
        };

        let steps: Vec<RoutineStep> = draft
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, mut step)| {
                step.id = None;
                step.routine_id = routine_id.clone();
                step.orden = index as i64;
                step
            })
            .collect();

        self.db.upsert_routine(&routine_id, &routine).await?;
        self.db.insert_steps(&steps).await?;

        tracing::info!(
            routine_id = %routine_id,
            steps = steps.len(),
            created = existing_id.is_none(),
            "Saved routine"
        );

        Ok(routine_id)
    }

    /// Roll back personal routines stuck in `cloneStatus=pending` and
    /// release claims whose routine was never written.
    ///
    /// A pending marker means the assignment crashed between batches; the
    /// partial clone (parent, any committed steps, the claim) is removed so
    /// the assignment can be retried cleanly. A claim whose `routineID`
    /// resolves to nothing means the assignment crashed before its first
    /// batch; no pending marker points at it, so stale claims are checked
    /// against the routine collection directly. Anything newer than
    /// `stuck_before` is skipped: it may still be committing.
    pub async fn reconcile_pending_clones(
        &self,
        stuck_before: DateTime<Utc>,
    ) -> Result<ReconcileReport, AppError> {
        let pending = self.db.pending_personal_clones().await?;
        let mut routine_ids = Vec::with_capacity(pending.len());

        for routine in &pending {
            let claims = self.db.claims_for_routine(routine.doc_id()).await?;
            let newest_claim = claims
                .iter()
                .filter_map(|c| DateTime::parse_from_rfc3339(&c.assigned_at).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .max();
            // A missing or unparseable claim timestamp counts as stuck.
            if newest_claim.is_some_and(|at| at >= stuck_before) {
                continue;
            }

            let steps_deleted = self.cascade_delete(routine).await?;
            tracing::warn!(
                routine_id = routine.doc_id(),
                user_id = %routine.user_id,
                steps = steps_deleted,
                "Rolled back partial clone"
            );
            routine_ids.push(routine.doc_id().to_string());
        }

        let mut orphan_claims_released = 0usize;
        for claim in self.db.list_assignment_claims().await? {
            let assigned_at = DateTime::parse_from_rfc3339(&claim.assigned_at)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
            // A missing or unparseable claim timestamp counts as stuck.
            if assigned_at.is_some_and(|at| at >= stuck_before) {
                continue;
            }
            if self.db.get_routine(&claim.routine_id).await?.is_some() {
                continue;
            }

            self.db
                .release_assignment_claim(&claim.user_id, &claim.nombre)
                .await?;
            tracing::warn!(
                user_id = %claim.user_id,
                nombre = %claim.nombre,
                routine_id = %claim.routine_id,
                "Released orphaned assignment claim"
            );
            orphan_claims_released += 1;
        }

        Ok(ReconcileReport {
            rolled_back: routine_ids.len(),
            routine_ids,
            orphan_claims_released,
        })
    }

    /// Delete everything owned by a user: personal routines (with steps and
    /// claims), workout logs, then the profile document.
    pub async fn purge_user(&self, user_id: &str) -> Result<PurgeReport, AppError> {
        let routines = self.db.personal_routines_for_user(user_id).await?;

        let mut steps_deleted = 0;
        for routine in &routines {
            steps_deleted += self.cascade_delete(routine).await?;
        }

        let logs_deleted = self.db.delete_exercise_logs_for_user(user_id).await?;
        self.db.delete_user_doc(user_id).await?;

        tracing::info!(
            user_id,
            routines = routines.len(),
            steps = steps_deleted,
            logs = logs_deleted,
            "Purged user data"
        );

        Ok(PurgeReport {
            routines_deleted: routines.len(),
            steps_deleted,
            logs_deleted,
        })
    }
}
