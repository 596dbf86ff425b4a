// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Routines and their exercise steps (catalog + personal clones)
//! - Assignment claims (create-if-absent uniqueness guards)
//! - Exercise catalog and workout logs
//! - Users and challenges

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    AssignmentClaim, Challenge, CloneStatus, Exercise, ExerciseLog, Routine, RoutineKind,
    RoutineStep, UserProfile,
};
use futures_util::{stream, StreamExt};
use std::collections::HashMap;

const MAX_CONCURRENT_DB_OPS: usize = 50;
/// Firestore caps batch/transaction writes at 500 operations.
pub const MAX_BATCH_OPS: usize = 500;

/// Alphabet used by the Firestore client SDKs for auto-generated ids.
const AUTO_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const AUTO_ID_LEN: usize = 20;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Generate a Firestore-style document id client-side.
    ///
    /// Needed because the clone writes the new routine's id into its own
    /// `routineID` field and into every cloned step before anything is
    /// committed.
    pub fn generate_document_id() -> Result<String, AppError> {
        use ring::rand::{SecureRandom, SystemRandom};

        let rng = SystemRandom::new();
        let mut bytes = [0u8; AUTO_ID_LEN];
        rng.fill(&mut bytes)
            .map_err(|_| AppError::Database("Failed to generate document id".to_string()))?;

        Ok(bytes
            .iter()
            .map(|b| AUTO_ID_ALPHABET[*b as usize % AUTO_ID_ALPHABET.len()] as char)
            .collect())
    }

    // ─── Routine Operations ──────────────────────────────────────

    /// Get a routine by document id.
    pub async fn get_routine(&self, routine_id: &str) -> Result<Option<Routine>, AppError> {
        let routine: Option<Routine> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ROUTINES)
            .obj()
            .one(routine_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Older documents may predate the id alias; keep `id` authoritative.
        Ok(routine.map(|mut r| {
            if r.id.is_none() {
                r.id = Some(routine_id.to_string());
            }
            r
        }))
    }

    /// List routines, optionally filtered by kind.
    pub async fn list_routines(&self, kind: Option<RoutineKind>) -> Result<Vec<Routine>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROUTINES)
            .filter(move |q| q.for_all([kind.and_then(|k| q.field("tipo").eq(k.as_str()))]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List a user's personal routines.
    pub async fn personal_routines_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Routine>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROUTINES)
            .filter(move |q| {
                q.for_all([
                    q.field("userID").eq(user_id.clone()),
                    q.field("tipo").eq(RoutineKind::Personal.as_str()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Uniqueness query: personal routines already carrying this name for
    /// this user.
    pub async fn find_personal_assignment(
        &self,
        user_id: &str,
        nombre: &str,
    ) -> Result<Vec<Routine>, AppError> {
        let user_id = user_id.to_string();
        let nombre = nombre.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROUTINES)
            .filter(move |q| {
                q.for_all([
                    q.field("userID").eq(user_id.clone()),
                    q.field("nombre").eq(nombre.clone()),
                    q.field("tipo").eq(RoutineKind::Personal.as_str()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Personal routines whose clone never finished (cloneStatus=pending).
    pub async fn pending_personal_clones(&self) -> Result<Vec<Routine>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROUTINES)
            .filter(|q| {
                q.for_all([
                    q.field("tipo").eq(RoutineKind::Personal.as_str()),
                    q.field("cloneStatus").eq("pending"),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a routine document.
    pub async fn upsert_routine(&self, routine_id: &str, routine: &Routine) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ROUTINES)
            .document_id(routine_id)
            .object(routine)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a routine document. Deleting an absent document is a no-op.
    pub async fn delete_routine_doc(&self, routine_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::ROUTINES)
            .document_id(routine_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Routine Step Operations ─────────────────────────────────

    /// Fetch all steps whose `routineID` matches any of the given link ids.
    ///
    /// Legacy data may reference a routine by either its document id or a
    /// divergent `routineID` field, so one equality query runs per candidate
    /// id and results are de-duplicated by step document id (same strategy
    /// as the link-repair tooling).
    pub async fn steps_for_routine_ids(
        &self,
        link_ids: &[String],
    ) -> Result<Vec<RoutineStep>, AppError> {
        let mut by_doc_id: HashMap<String, RoutineStep> = HashMap::new();

        for link_id in link_ids {
            let link = link_id.clone();
            let matched: Vec<RoutineStep> = self
                .get_client()?
                .fluent()
                .select()
                .from(collections::ROUTINE_EXERCISES)
                .filter(move |q| q.for_all([q.field("routineID").eq(link.clone())]))
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            for step in matched {
                if let Some(doc_id) = step.id.clone() {
                    by_doc_id.insert(doc_id, step);
                }
            }
        }

        Ok(by_doc_id.into_values().collect())
    }

    /// Store multiple steps with generated ids.
    ///
    /// Uses concurrent writes with a limit to avoid overloading Firestore.
    /// Used by the routine builder, where per-document atomicity is enough.
    pub async fn insert_steps(&self, steps: &[RoutineStep]) -> Result<(), AppError> {
        let client = self.get_client()?;

        stream::iter(steps.to_vec())
            .map(|step| async move {
                let doc_id = Self::generate_document_id()?;

                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::ROUTINE_EXERCISES)
                    .document_id(&doc_id)
                    .object(&step)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                Ok::<_, AppError>(())
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(())
    }

    /// Overwrite a single step document (link-repair tooling).
    pub async fn upsert_step(&self, step_id: &str, step: &RoutineStep) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ROUTINE_EXERCISES)
            .document_id(step_id)
            .object(step)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete the given steps in chunked atomic batches.
    pub async fn delete_steps(&self, steps: &[RoutineStep]) -> Result<(), AppError> {
        let doc_ids: Vec<String> = steps.iter().filter_map(|s| s.id.clone()).collect();
        self.batch_delete(collections::ROUTINE_EXERCISES, &doc_ids)
            .await
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete(&self, collection: &str, doc_ids: &[String]) -> Result<(), AppError> {
        let client = self.get_client()?;

        for chunk in doc_ids.chunks(MAX_BATCH_OPS) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for doc_id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }

    // ─── Clone Commit ────────────────────────────────────────────

    /// Commit a personal routine clone: the parent document plus all step
    /// copies, as a sequence of atomic batches of at most [`MAX_BATCH_OPS`]
    /// writes. The parent write is the first operation of the first batch.
    ///
    /// When everything fits in one batch the parent is written with
    /// `cloneStatus=complete` and the whole clone is atomic. Otherwise the
    /// parent starts as `pending` and the final batch flips it to
    /// `complete`; a failure in between surfaces as `PartialCommit` and
    /// leaves the pending marker in place for reconciliation.
    ///
    /// Returns the number of batches committed.
    pub async fn commit_personal_clone(
        &self,
        routine_id: &str,
        routine: &Routine,
        steps: &[RoutineStep],
    ) -> Result<usize, AppError> {
        let client = self.get_client()?;
        let single_batch = 1 + steps.len() <= MAX_BATCH_OPS;

        let mut parent = routine.clone();
        parent.id = None;
        parent.routine_id = routine_id.to_string();
        parent.clone_status = Some(if single_batch {
            CloneStatus::Complete
        } else {
            CloneStatus::Pending
        });

        let mut committed = 0usize;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::ROUTINES)
            .document_id(routine_id)
            .object(&parent)
            .add_to_transaction(&mut transaction)
            .map_err(|e| clone_commit_error(routine_id, committed, e))?;
        let mut ops_in_batch = 1usize;

        for step in steps {
            if ops_in_batch >= MAX_BATCH_OPS {
                transaction
                    .commit()
                    .await
                    .map_err(|e| clone_commit_error(routine_id, committed, e))?;
                committed += 1;

                transaction = client
                    .begin_transaction()
                    .await
                    .map_err(|e| clone_commit_error(routine_id, committed, e))?;
                ops_in_batch = 0;
            }

            let step_id = Self::generate_document_id()?;
            client
                .fluent()
                .update()
                .in_col(collections::ROUTINE_EXERCISES)
                .document_id(&step_id)
                .object(step)
                .add_to_transaction(&mut transaction)
                .map_err(|e| clone_commit_error(routine_id, committed, e))?;
            ops_in_batch += 1;
        }

        if !single_batch {
            if ops_in_batch >= MAX_BATCH_OPS {
                transaction
                    .commit()
                    .await
                    .map_err(|e| clone_commit_error(routine_id, committed, e))?;
                committed += 1;

                transaction = client
                    .begin_transaction()
                    .await
                    .map_err(|e| clone_commit_error(routine_id, committed, e))?;
                ops_in_batch = 0;
            }

            // Final op: flip the pending marker within the last batch so a
            // routine observed as pending is definitively incomplete.
            parent.clone_status = Some(CloneStatus::Complete);
            client
                .fluent()
                .update()
                .in_col(collections::ROUTINES)
                .document_id(routine_id)
                .object(&parent)
                .add_to_transaction(&mut transaction)
                .map_err(|e| clone_commit_error(routine_id, committed, e))?;
            ops_in_batch += 1;
        }

        debug_assert!(ops_in_batch > 0);
        transaction
            .commit()
            .await
            .map_err(|e| clone_commit_error(routine_id, committed, e))?;
        committed += 1;

        Ok(committed)
    }

    // ─── Assignment Claims ───────────────────────────────────────

    /// Atomically claim the `(user, routine name)` pair with a
    /// create-if-absent write.
    ///
    /// Returns `false` if the claim already exists, meaning another
    /// assignment holds (or is concurrently creating) a personal routine
    /// with this name for this user.
    pub async fn try_claim_assignment(&self, claim: &AssignmentClaim) -> Result<bool, AppError> {
        let doc_id = AssignmentClaim::doc_id(&claim.user_id, &claim.nombre);

        let created = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::ROUTINE_ASSIGNMENTS)
            .document_id(&doc_id)
            .object(claim)
            .execute::<()>()
            .await;

        match created {
            Ok(_) => Ok(true),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => {
                let msg = e.to_string();
                // Depending on transport the conflict can also surface as a
                // plain gRPC status.
                if msg.contains("AlreadyExists") || msg.to_lowercase().contains("already exists") {
                    Ok(false)
                } else {
                    Err(AppError::Database(msg))
                }
            }
        }
    }

    /// Delete the claim for a `(user, routine name)` pair.
    pub async fn release_assignment_claim(
        &self,
        user_id: &str,
        nombre: &str,
    ) -> Result<(), AppError> {
        let doc_id = AssignmentClaim::doc_id(user_id, nombre);
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::ROUTINE_ASSIGNMENTS)
            .document_id(&doc_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// All claims pointing at a personal routine (normally zero or one).
    pub async fn claims_for_routine(
        &self,
        routine_id: &str,
    ) -> Result<Vec<AssignmentClaim>, AppError> {
        let routine_id = routine_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROUTINE_ASSIGNMENTS)
            .filter(move |q| q.for_all([q.field("routineID").eq(routine_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All assignment claims. Scanned by the reconciliation pass, which has
    /// no routine-side marker to find claims whose clone never started.
    pub async fn list_assignment_claims(&self) -> Result<Vec<AssignmentClaim>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ROUTINE_ASSIGNMENTS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Exercise Catalog ────────────────────────────────────────

    /// List the full exercise catalog.
    pub async fn list_exercises(&self) -> Result<Vec<Exercise>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::EXERCISES)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a catalog exercise.
    pub async fn upsert_exercise(
        &self,
        exercise_id: &str,
        exercise: &Exercise,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::EXERCISES)
            .document_id(exercise_id)
            .object(exercise)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a catalog exercise.
    pub async fn delete_exercise_doc(&self, exercise_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::EXERCISES)
            .document_id(exercise_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Workout log entries, optionally restricted to a date range.
    pub async fn exercise_logs_between(
        &self,
        from: Option<chrono::DateTime<chrono::Utc>>,
        to: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<ExerciseLog>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::EXERCISE_LOGS)
            .filter(move |q| {
                q.for_all([
                    from.and_then(|f| {
                        q.field("timestamp")
                            .greater_than_or_equal(firestore::FirestoreTimestamp(f))
                    }),
                    to.and_then(|t| {
                        q.field("timestamp")
                            .less_than_or_equal(firestore::FirestoreTimestamp(t))
                    }),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a workout log entry under a generated id. Returns the id.
    pub async fn insert_exercise_log(&self, log: &ExerciseLog) -> Result<String, AppError> {
        let doc_id = Self::generate_document_id()?;
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::EXERCISE_LOGS)
            .document_id(&doc_id)
            .object(log)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(doc_id)
    }

    /// Delete all workout log entries owned by a user. Returns the number
    /// of deleted documents.
    pub async fn delete_exercise_logs_for_user(&self, user_id: &str) -> Result<usize, AppError> {
        let owner = user_id.to_string();
        let logs: Vec<ExerciseLog> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::EXERCISE_LOGS)
            .filter(move |q| q.for_all([q.field("userID").eq(owner.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let doc_ids: Vec<String> = logs.into_iter().filter_map(|l| l.id).collect();
        self.batch_delete(collections::EXERCISE_LOGS, &doc_ids)
            .await?;
        Ok(doc_ids.len())
    }

    // ─── Users ───────────────────────────────────────────────────

    /// Get a user profile by id.
    pub async fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List all user profiles.
    pub async fn list_users(&self) -> Result<Vec<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a user profile document.
    pub async fn delete_user_doc(&self, user_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(user_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Challenges ──────────────────────────────────────────────

    /// List all challenges.
    pub async fn list_challenges(&self) -> Result<Vec<Challenge>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::CHALLENGES)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a challenge.
    pub async fn upsert_challenge(
        &self,
        challenge_id: &str,
        challenge: &Challenge,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CHALLENGES)
            .document_id(challenge_id)
            .object(challenge)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a challenge.
    pub async fn delete_challenge_doc(&self, challenge_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::CHALLENGES)
            .document_id(challenge_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Raw Access (tests and tooling) ──────────────────────────

    /// Write an arbitrary document shape.
    ///
    /// Lets integration tests and tooling plant legacy documents with
    /// off-type fields (numeric `series`, string rest seconds) that the
    /// typed models would never produce.
    pub async fn upsert_raw<T>(
        &self,
        collection: &str,
        doc_id: &str,
        document: &T,
    ) -> Result<(), AppError>
    where
        T: serde::Serialize + for<'de> serde::Deserialize<'de> + Send + Sync,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(document)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Map a mid-clone failure: once a batch has committed, the clone is
/// partially persisted and must be reported as such.
fn clone_commit_error(
    routine_id: &str,
    batches_committed: usize,
    err: impl std::fmt::Display,
) -> AppError {
    if batches_committed > 0 {
        AppError::PartialCommit {
            routine_id: routine_id.to_string(),
            batches_committed,
            source_error: err.to_string(),
        }
    } else {
        AppError::Database(err.to_string())
    }
}
