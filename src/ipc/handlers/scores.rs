use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::actor::{ActorContext, RecordScope, Role};
use crate::grading::{is_in_score_range, GradingPolicy};
use crate::ipc::error::HandlerError;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    db_conn, optional_str, optional_term_name, parse_actor, parse_page, require_admin,
    required_str, required_term, respond, score_patch, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{ScoreComponents, ScoreRecord, Term};
use crate::records::{Paged, RecordStore, ScoreFilter};

/// Checks that `actor` may write scores for the course offering.
pub fn authorize_course_write(
    store: &RecordStore<'_>,
    actor: &ActorContext,
    course_id: &str,
    term: &Term,
) -> Result<(), HandlerError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Student => Err(HandlerError::forbidden("students cannot write scores")),
        Role::Lecturer => {
            let lecturer_id = actor.lecturer_id().unwrap_or_default();
            if store.lecturer_teaches(lecturer_id, course_id, term)? {
                Ok(())
            } else {
                Err(HandlerError::forbidden(format!(
                    "lecturer does not teach {} in {} {}",
                    course_id, term.academic_year, term.term_name
                )))
            }
        }
    }
}

fn apply_patch(current: Option<f64>, patch: Option<Option<f64>>) -> Option<f64> {
    match patch {
        None => current,
        Some(v) => v,
    }
}

/// Merges the submitted components over the stored row (if any), recomputes
/// the final score under `policy` and writes the result.
fn upsert_one(
    store: &RecordStore<'_>,
    actor: &ActorContext,
    policy: &GradingPolicy,
    entry: &Value,
) -> Result<(ScoreRecord, bool), HandlerError> {
    let student_id = required_str(entry, "studentId")?;
    let course_id = required_str(entry, "courseId")?;
    let term = required_term(entry)?;
    let assignment = score_patch(entry, "assignmentScore")?;
    let midterm = score_patch(entry, "midtermScore")?;
    let final_exam = score_patch(entry, "finalScore")?;

    if store.course(&course_id)?.is_none() {
        return Err(HandlerError::not_found(format!("course not found: {}", course_id)));
    }
    if !store.student_exists(&student_id)? {
        return Err(HandlerError::not_found(format!("student not found: {}", student_id)));
    }
    authorize_course_write(store, actor, &course_id, &term)?;

    for (key, v) in [
        ("assignmentScore", assignment),
        ("midtermScore", midterm),
        ("finalScore", final_exam),
    ] {
        if let Some(Some(n)) = v {
            if !is_in_score_range(n) {
                warn!(%student_id, %course_id, field = key, value = n, "score outside 0..=100 accepted");
            }
        }
    }

    let existing = store.score_record(&student_id, &course_id, &term)?;
    let created = existing.is_none();
    let record = match existing {
        Some(mut rec) => {
            let components = ScoreComponents {
                assignment: apply_patch(rec.components.assignment, assignment),
                midterm: apply_patch(rec.components.midterm, midterm),
                final_exam: apply_patch(rec.components.final_exam, final_exam),
            };
            rec.set_components(components, policy);
            rec
        }
        None => ScoreRecord::new(
            student_id,
            course_id,
            term,
            ScoreComponents {
                assignment: assignment.flatten(),
                midterm: midterm.flatten(),
                final_exam: final_exam.flatten(),
            },
            policy,
        ),
    };
    store
        .upsert_score(&record)
        .map_err(HandlerError::update("score_records"))?;
    info!(
        student_id = %record.student_id,
        course_id = %record.course_id,
        academic_year = %record.term.academic_year,
        term_name = %record.term.term_name,
        computed_final = record.computed_final(),
        letter_grade = %record.letter_grade(),
        created,
        "score record upserted"
    );
    Ok((record, created))
}

fn handle_scores_upsert(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let policy = setup::grading_policy(conn)?;

    let tx = conn.unchecked_transaction()?;
    let (record, created) = upsert_one(&RecordStore::new(&tx), &actor, &policy, &req.params)?;
    tx.commit().map_err(HandlerError::update("score_records"))?;
    Ok(json!({ "record": record, "created": created }))
}

/// Shared `courseId`/`academicYear`/`termName` at the top level apply to
/// every entry that does not set its own.
fn entry_with_defaults(params: &Value, entry: &Value) -> Result<Value, HandlerError> {
    let Some(obj) = entry.as_object() else {
        return Err(HandlerError::bad_params("entries must be objects"));
    };
    let mut merged = Map::new();
    for key in ["courseId", "academicYear", "termName"] {
        if let Some(v) = params.get(key) {
            merged.insert(key.to_string(), v.clone());
        }
    }
    for (k, v) in obj {
        merged.insert(k.clone(), v.clone());
    }
    Ok(Value::Object(merged))
}

/// All-or-nothing: any failing entry rolls back the whole batch.
fn handle_scores_bulk_upsert(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let policy = setup::grading_policy(conn)?;
    let entries = req
        .params
        .get("entries")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerError::bad_params("entries must be an array"))?;

    let tx = conn.unchecked_transaction()?;
    let store = RecordStore::new(&tx);
    let mut records = Vec::with_capacity(entries.len());
    let mut created = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        let entry = entry_with_defaults(&req.params, entry)?;
        let (record, was_created) = upsert_one(&store, &actor, &policy, &entry).map_err(|e| {
            debug!(index = i, error = %e, "bulk score entry rejected");
            e
        })?;
        if was_created {
            created += 1;
        }
        records.push(record);
    }
    tx.commit().map_err(HandlerError::update("score_records"))?;
    Ok(json!({
        "ok": true,
        "upserted": records.len(),
        "created": created,
        "records": records
    }))
}

fn handle_scores_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let paging = setup::paging_settings(conn)?;
    let page = parse_page(&req.params, &paging)?;
    let filter = ScoreFilter {
        student_id: optional_str(&req.params, "studentId")?,
        course_id: optional_str(&req.params, "courseId")?,
        academic_year: optional_str(&req.params, "academicYear")?,
        term_name: optional_term_name(&req.params, "termName")?,
        search: optional_str(&req.params, "search")?,
    };
    let scope = actor.scope();
    let store = RecordStore::new(conn);
    let total = store.count_scores(&scope, &filter)?;
    let items = store.list_scores(&scope, &filter, Some(page))?;
    to_json(&Paged::new(items, total, page))
}

/// Re-grades stored rows under the current policy, optionally for one course.
/// Rows whose final and grade already match are left alone.
fn handle_scores_recompute(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    require_admin(&parse_actor(&req.params)?)?;
    let policy = setup::grading_policy(conn)?;
    let filter = ScoreFilter {
        course_id: optional_str(&req.params, "courseId")?,
        ..ScoreFilter::default()
    };

    let tx = conn.unchecked_transaction()?;
    let store = RecordStore::new(&tx);
    let rows = store.list_scores(&RecordScope::All, &filter, None)?;
    let checked = rows.len();
    let mut updated = 0usize;
    for row in rows {
        let mut record = row.record;
        let before = (record.computed_final(), record.letter_grade());
        let components = record.components;
        record.set_components(components, &policy);
        if (record.computed_final(), record.letter_grade()) == before {
            continue;
        }
        store
            .upsert_score(&record)
            .map_err(HandlerError::update("score_records"))?;
        updated += 1;
    }
    tx.commit().map_err(HandlerError::update("score_records"))?;
    info!(checked, updated, "score records recomputed");
    Ok(json!({ "ok": true, "checked": checked, "updated": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "scores.upsert" => handle_scores_upsert(state, req),
        "scores.bulkUpsert" => handle_scores_bulk_upsert(state, req),
        "scores.list" => handle_scores_list(state, req),
        "scores.recompute" => handle_scores_recompute(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_semantics() {
        assert_eq!(apply_patch(Some(70.0), None), Some(70.0));
        assert_eq!(apply_patch(Some(70.0), Some(None)), None);
        assert_eq!(apply_patch(None, Some(Some(88.0))), Some(88.0));
    }

    #[test]
    fn entry_overrides_shared_fields() {
        let params = json!({ "courseId": "c1", "academicYear": "2024/2025", "termName": "odd" });
        let merged =
            entry_with_defaults(&params, &json!({ "studentId": "s1", "termName": "even" }))
                .expect("merge");
        assert_eq!(merged["courseId"], json!("c1"));
        assert_eq!(merged["termName"], json!("even"));
        assert!(entry_with_defaults(&params, &json!(3)).is_err());
    }
}
