// SPDX-License-Identifier: MIT

//! Routine and routine-step models.
//!
//! Field names mirror the documents written by the original web client
//! (`routineID`, `exerciseNombre`, ...), so this backend can operate on
//! pre-existing data unchanged. Legacy documents stored some numeric-looking
//! fields as numbers and some numbers as strings; the serde deserializers in
//! [`field_compat`] normalize them on every read.

use serde::{Deserialize, Serialize};

/// Routine kind: catalog template or user-owned copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineKind {
    /// Catalog template authored by an admin.
    #[default]
    Predefinida,
    /// Owned by exactly one user, created only by cloning.
    Personal,
}

impl RoutineKind {
    /// Stored string form, usable as a query value.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutineKind::Predefinida => "predefinida",
            RoutineKind::Personal => "personal",
        }
    }
}

/// Clone progress marker on personal routines.
///
/// A multi-batch clone writes the parent as `pending` in its first batch and
/// flips it to `complete` in the last one. A routine stuck in `pending` is a
/// partial clone and gets rolled back by the reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneStatus {
    Pending,
    Complete,
}

/// Routine document in the `routines` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    /// Firestore document id (populated on reads, never stored as a field).
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    /// Should always equal the document id for routines created by this
    /// backend. Legacy data may diverge; see the dual-id lookup in the
    /// routine service.
    #[serde(rename = "routineID", default)]
    pub routine_id: String,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub tipo: RoutineKind,
    /// Owning user id; empty for catalog templates.
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(
        rename = "cloneStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub clone_status: Option<CloneStatus>,
}

impl Routine {
    /// Effective document id: the store id when present, otherwise the
    /// stored `routineID` field.
    pub fn doc_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.routine_id)
    }

    /// The identifier values child steps may reference.
    ///
    /// Legacy data allowed `routine_exercises.routineID` to point at either
    /// the document id or a divergent `routineID` field; both must be
    /// checked when loading or deleting steps.
    pub fn step_link_ids(&self) -> Vec<String> {
        let mut ids = vec![self.doc_id().to_string()];
        if !self.routine_id.is_empty() && self.routine_id != ids[0] {
            ids.push(self.routine_id.clone());
        }
        ids
    }
}

/// Exercise step document in the `routine_exercises` collection.
///
/// Carries a denormalized snapshot of the referenced exercise
/// (`exerciseNombre`, `exerciseMediaURL`) taken at authoring time; catalog
/// edits must not retroactively change authored routines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineStep {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    /// The parent routine's `routineID` value (link by value, not reference).
    #[serde(rename = "routineID", default)]
    pub routine_id: String,
    #[serde(rename = "exerciseID", default)]
    pub exercise_id: String,
    #[serde(rename = "exerciseNombre", default)]
    pub exercise_nombre: String,
    #[serde(rename = "exerciseMediaURL", default)]
    pub exercise_media_url: String,
    /// Zero-based position within the routine.
    #[serde(default, deserialize_with = "field_compat::lenient_int")]
    pub orden: i64,
    /// Stored as a string even when numeric-looking; empty if unset.
    #[serde(default, deserialize_with = "field_compat::lenient_string")]
    pub series: String,
    #[serde(default, deserialize_with = "field_compat::lenient_string")]
    pub repeticiones: String,
    #[serde(
        rename = "tiempoDescansoSegundos",
        default,
        deserialize_with = "field_compat::lenient_int"
    )]
    pub tiempo_descanso_segundos: i64,
}

impl RoutineStep {
    /// Build the payload for a cloned step pointing at a new parent routine.
    ///
    /// Everything except the parent link is copied as-is; `orden` is not
    /// renumbered. The typed fields are already normalized by
    /// [`field_compat`] at read time, so the clone writes canonical types.
    pub fn clone_for(&self, new_routine_id: &str) -> RoutineStep {
        RoutineStep {
            id: None,
            routine_id: new_routine_id.to_string(),
            exercise_id: self.exercise_id.clone(),
            exercise_nombre: self.exercise_nombre.clone(),
            exercise_media_url: self.exercise_media_url.clone(),
            orden: self.orden,
            series: self.series.clone(),
            repeticiones: self.repeticiones.clone(),
            tiempo_descanso_segundos: self.tiempo_descanso_segundos,
        }
    }
}

/// Assignment claim document in the `routine_assignments` collection.
///
/// Keyed by `(userID, nombre)` so that a personal routine with a given name
/// can be claimed for a user with a single create-if-absent write, closing
/// the check-then-act race of the uniqueness query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentClaim {
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(default)]
    pub nombre: String,
    /// The personal routine this claim belongs to.
    #[serde(rename = "routineID", default)]
    pub routine_id: String,
    #[serde(rename = "assignedAt", default)]
    pub assigned_at: String,
}

impl AssignmentClaim {
    /// Deterministic document id for a `(user, routine name)` pair.
    pub fn doc_id(user_id: &str, nombre: &str) -> String {
        format!("{}_{}", user_id, urlencoding::encode(nombre))
    }
}

/// Tolerant deserializers for fields that legacy documents stored with
/// inconsistent types (numbers vs strings, null vs missing vs empty).
pub(crate) mod field_compat {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    /// Coerce to a string; null/missing/empty become `""`.
    pub fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Option::<Loose>::deserialize(d)? {
            None => String::new(),
            Some(Loose::Str(s)) => s,
            Some(Loose::Int(i)) => i.to_string(),
            Some(Loose::Float(f)) => f.to_string(),
            Some(Loose::Bool(b)) => b.to_string(),
        })
    }

    /// Coerce to an integer; null/missing/empty/unparseable become 0.
    /// String forms get a base-10 parse of their leading integer, matching
    /// how the web client always parsed these fields.
    pub fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(match Option::<Loose>::deserialize(d)? {
            None => 0,
            Some(Loose::Str(s)) => parse_int_prefix(&s),
            Some(Loose::Int(i)) => i,
            Some(Loose::Float(f)) => f.trunc() as i64,
            Some(Loose::Bool(_)) => 0,
        })
    }

    fn parse_int_prefix(raw: &str) -> i64 {
        let s = raw.trim();
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, s.strip_prefix('+').unwrap_or(s)),
        };
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        digits[..end].parse::<i64>().map(|v| sign * v).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_from_json(value: serde_json::Value) -> RoutineStep {
        serde_json::from_value(value).expect("step should deserialize")
    }

    #[test]
    fn test_step_normalizes_numeric_series_to_string() {
        let step = step_from_json(serde_json::json!({
            "routineID": "r1",
            "exerciseID": "e1",
            "exerciseNombre": "Sentadilla",
            "series": 4,
            "repeticiones": "12",
            "orden": 0,
            "tiempoDescansoSegundos": "60",
        }));

        assert_eq!(step.series, "4");
        assert_eq!(step.repeticiones, "12");
        assert_eq!(step.tiempo_descanso_segundos, 60);
    }

    #[test]
    fn test_step_missing_and_null_fields_default() {
        let step = step_from_json(serde_json::json!({
            "routineID": "r1",
            "exerciseID": "e1",
            "series": null,
            "orden": null,
        }));

        assert_eq!(step.series, "");
        assert_eq!(step.repeticiones, "");
        assert_eq!(step.orden, 0);
        assert_eq!(step.tiempo_descanso_segundos, 0);
    }

    #[test]
    fn test_step_int_from_messy_strings() {
        let step = step_from_json(serde_json::json!({
            "routineID": "r1",
            "exerciseID": "e1",
            "orden": " 3 ",
            "tiempoDescansoSegundos": "90s",
        }));

        assert_eq!(step.orden, 3);
        assert_eq!(step.tiempo_descanso_segundos, 90);

        let empty = step_from_json(serde_json::json!({
            "routineID": "r1",
            "exerciseID": "e1",
            "tiempoDescansoSegundos": "",
        }));
        assert_eq!(empty.tiempo_descanso_segundos, 0);
    }

    #[test]
    fn test_step_serializes_canonical_types() {
        let step = step_from_json(serde_json::json!({
            "routineID": "r1",
            "exerciseID": "e1",
            "series": 4,
            "tiempoDescansoSegundos": "60",
        }));

        let out = serde_json::to_value(&step).unwrap();
        assert_eq!(out["series"], serde_json::json!("4"));
        assert_eq!(out["tiempoDescansoSegundos"], serde_json::json!(60));
        // The document id must never be written as a field.
        assert!(out.get("id").is_none());
        assert!(out.get("_firestore_id").is_none());
    }

    #[test]
    fn test_clone_for_repoints_parent_only() {
        let step = step_from_json(serde_json::json!({
            "routineID": "old",
            "exerciseID": "e9",
            "exerciseNombre": "Press banca",
            "exerciseMediaURL": "https://example.com/press.gif",
            "orden": 7,
            "series": "5",
            "repeticiones": "8",
            "tiempoDescansoSegundos": 120,
        }));

        let cloned = step.clone_for("new");

        assert_eq!(cloned.routine_id, "new");
        assert!(cloned.id.is_none());
        assert_eq!(cloned.orden, 7); // no renumbering
        assert_eq!(cloned.exercise_id, step.exercise_id);
        assert_eq!(cloned.series, step.series);
        assert_eq!(cloned.repeticiones, step.repeticiones);
        assert_eq!(
            cloned.tiempo_descanso_segundos,
            step.tiempo_descanso_segundos
        );
    }

    #[test]
    fn test_routine_step_link_ids() {
        let aligned: Routine = serde_json::from_value(serde_json::json!({
            "_firestore_id": "abc",
            "routineID": "abc",
            "nombre": "Leg Day",
            "tipo": "predefinida",
            "userID": "",
        }))
        .unwrap();
        assert_eq!(aligned.step_link_ids(), vec!["abc"]);

        let diverged: Routine = serde_json::from_value(serde_json::json!({
            "_firestore_id": "abc",
            "routineID": "legacy-id",
            "nombre": "Leg Day",
            "tipo": "predefinida",
        }))
        .unwrap();
        assert_eq!(diverged.step_link_ids(), vec!["abc", "legacy-id"]);
    }

    #[test]
    fn test_routine_kind_round_trip() {
        let r: Routine = serde_json::from_value(serde_json::json!({
            "routineID": "x",
            "nombre": "n",
            "tipo": "personal",
            "userID": "u1",
        }))
        .unwrap();
        assert_eq!(r.tipo, RoutineKind::Personal);
        assert_eq!(
            serde_json::to_value(&r).unwrap()["tipo"],
            serde_json::json!("personal")
        );
    }

    #[test]
    fn test_claim_doc_id_encodes_name() {
        assert_eq!(
            AssignmentClaim::doc_id("u1", "Leg Day"),
            "u1_Leg%20Day".to_string()
        );
    }
}
