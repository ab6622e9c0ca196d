use serde_json::{json, Value};
use tracing::{debug, info};

use crate::actor::{ActorContext, Role};
use crate::attendance::{AttendanceRecord, AttendanceStatus};
use crate::ipc::error::HandlerError;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    db_conn, optional_date, optional_str, parse_actor, parse_page, required_date, required_str,
    respond, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{AttendanceFilter, Paged, RecordStore, Schedule};

fn parse_status(v: &Value) -> Result<AttendanceStatus, HandlerError> {
    v.get("status")
        .and_then(|s| s.as_str())
        .and_then(AttendanceStatus::parse)
        .ok_or_else(|| {
            HandlerError::bad_params("status must be one of: present, permitted, sick, absent")
        })
}

/// Loads the schedule and checks that `actor` may record attendance for it.
fn writable_schedule(
    store: &RecordStore<'_>,
    actor: &ActorContext,
    schedule_id: &str,
) -> Result<Schedule, HandlerError> {
    let schedule = store
        .schedule(schedule_id)?
        .ok_or_else(|| HandlerError::not_found(format!("schedule not found: {}", schedule_id)))?;
    match actor.role {
        Role::Admin => Ok(schedule),
        Role::Student => Err(HandlerError::forbidden("students cannot record attendance")),
        Role::Lecturer => {
            if actor.lecturer_id() == Some(schedule.lecturer_id.as_str()) {
                Ok(schedule)
            } else {
                Err(HandlerError::forbidden("schedule is assigned to another lecturer"))
            }
        }
    }
}

fn handle_attendance_upsert(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let store = RecordStore::new(conn);
    let schedule_id = required_str(&req.params, "scheduleId")?;
    let schedule = writable_schedule(&store, &actor, &schedule_id)?;

    let record = AttendanceRecord {
        student_id: required_str(&req.params, "studentId")?,
        schedule_id: schedule.id,
        date: required_date(&req.params, "date")?,
        status: parse_status(&req.params)?,
        note: optional_str(&req.params, "note")?,
    };
    if !store.student_exists(&record.student_id)? {
        return Err(HandlerError::not_found(format!(
            "student not found: {}",
            record.student_id
        )));
    }
    store
        .upsert_attendance(&record)
        .map_err(HandlerError::update("attendance_records"))?;
    info!(
        student_id = %record.student_id,
        schedule_id = %record.schedule_id,
        date = %record.date,
        status = record.status.as_str(),
        "attendance upserted"
    );
    Ok(json!({ "record": record }))
}

/// Stamps one date for many students of a schedule. Entries naming an unknown
/// student are skipped and reported; any other failure rolls back the batch.
fn handle_attendance_bulk_upsert(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let schedule_id = required_str(&req.params, "scheduleId")?;
    let date = required_date(&req.params, "date")?;
    let entries = req
        .params
        .get("entries")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerError::bad_params("entries must be an array"))?;

    let tx = conn.unchecked_transaction()?;
    let store = RecordStore::new(&tx);
    let schedule = writable_schedule(&store, &actor, &schedule_id)?;
    let mut upserted = 0usize;
    let mut skipped: Vec<String> = Vec::new();
    for entry in entries {
        let student_id = required_str(entry, "studentId")?;
        let status = parse_status(entry)?;
        let note = optional_str(entry, "note")?;
        if !store.student_exists(&student_id)? {
            debug!(%student_id, "bulk attendance skipped unknown student");
            skipped.push(student_id);
            continue;
        }
        store
            .upsert_attendance(&AttendanceRecord {
                student_id,
                schedule_id: schedule.id.clone(),
                date,
                status,
                note,
            })
            .map_err(HandlerError::update("attendance_records"))?;
        upserted += 1;
    }
    tx.commit().map_err(HandlerError::update("attendance_records"))?;
    info!(schedule_id = %schedule.id, %date, upserted, skipped = skipped.len(), "attendance stamped");
    Ok(json!({
        "ok": true,
        "upserted": upserted,
        "skippedStudentIds": skipped
    }))
}

pub fn attendance_filter(params: &Value) -> Result<AttendanceFilter, HandlerError> {
    let filter = AttendanceFilter {
        student_id: optional_str(params, "studentId")?,
        schedule_id: optional_str(params, "scheduleId")?,
        course_id: optional_str(params, "courseId")?,
        from: optional_date(params, "from")?,
        to: optional_date(params, "to")?,
    };
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(HandlerError::bad_params("from must not be after to"));
        }
    }
    Ok(filter)
}

fn handle_attendance_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let paging = setup::paging_settings(conn)?;
    let page = parse_page(&req.params, &paging)?;
    let filter = attendance_filter(&req.params)?;
    let scope = actor.scope();
    let store = RecordStore::new(conn);
    let total = store.count_attendance(&scope, &filter)?;
    let items = store.list_attendance(&scope, &filter, Some(page))?;
    to_json(&Paged::new(items, total, page))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "attendance.upsert" => handle_attendance_upsert(state, req),
        "attendance.bulkUpsert" => handle_attendance_bulk_upsert(state, req),
        "attendance.list" => handle_attendance_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
