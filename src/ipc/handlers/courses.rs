use chrono::NaiveTime;
use rusqlite::Error::InvalidColumnType;
use rusqlite::{params, params_from_iter, types::Type, types::Value as SqlValue, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::actor::RecordScope;
use crate::ipc::error::HandlerError;
use crate::ipc::helpers::{
    db_conn, optional_str, optional_term_name, parse_actor, require_admin, required_str,
    required_term, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{Course, Term, TermName};
use crate::records::{now_rfc3339, RecordStore, Schedule};

const MAX_CREDIT_HOURS: i64 = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleView {
    #[serde(flatten)]
    schedule: Schedule,
    course_code: String,
    course_name: String,
    lecturer_name: String,
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    require_admin(&parse_actor(&req.params)?)?;
    let code = required_str(&req.params, "code")?;
    let name = required_str(&req.params, "name")?;
    let credit_hours = req
        .params
        .get("creditHours")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerError::bad_params("missing creditHours"))?;
    if !(1..=MAX_CREDIT_HOURS).contains(&credit_hours) {
        return Err(HandlerError::bad_params(format!(
            "creditHours must be an integer in 1..={}",
            MAX_CREDIT_HOURS
        )));
    }
    let course = Course {
        id: Uuid::new_v4().to_string(),
        code,
        name,
        credit_hours: credit_hours as u32,
    };
    conn.execute(
        "INSERT INTO courses(id, code, name, credit_hours, created_at) VALUES(?, ?, ?, ?, ?)",
        params![
            course.id,
            course.code,
            course.name,
            course.credit_hours,
            now_rfc3339()
        ],
    )
    .map_err(HandlerError::update("courses"))?;
    info!(course_id = %course.id, code = %course.code, credit_hours = course.credit_hours, "course created");
    Ok(json!({ "course": course }))
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    parse_actor(&req.params)?;
    let mut courses: Vec<Course> = RecordStore::new(conn).course_catalog()?.into_values().collect();
    courses.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(json!({ "courses": courses }))
}

/// Removes the course, its schedules and their attendance. Score records are
/// left behind; reports skip rows whose course no longer resolves.
fn handle_courses_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    require_admin(&parse_actor(&req.params)?)?;
    let course_id = required_str(&req.params, "courseId")?;
    if RecordStore::new(conn).course(&course_id)?.is_none() {
        return Err(HandlerError::not_found("course not found"));
    }

    let tx = conn.unchecked_transaction()?;
    let attendance = tx
        .execute(
            "DELETE FROM attendance_records
             WHERE schedule_id IN (SELECT id FROM schedules WHERE course_id = ?)",
            [&course_id],
        )
        .map_err(HandlerError::update("attendance_records"))?;
    let schedules = tx
        .execute("DELETE FROM schedules WHERE course_id = ?", [&course_id])
        .map_err(HandlerError::update("schedules"))?;
    tx.execute("DELETE FROM courses WHERE id = ?", [&course_id])
        .map_err(HandlerError::update("courses"))?;
    let orphaned: i64 = tx.query_row(
        "SELECT COUNT(*) FROM score_records WHERE course_id = ?",
        [&course_id],
        |r| r.get(0),
    )?;
    tx.commit().map_err(HandlerError::update("courses"))?;
    info!(%course_id, schedules, attendance, orphaned, "course deleted");
    Ok(json!({
        "ok": true,
        "deletedSchedules": schedules,
        "deletedAttendance": attendance,
        "orphanedScoreRecords": orphaned
    }))
}

fn parse_time(params: &Value, key: &str) -> Result<NaiveTime, HandlerError> {
    let raw = required_str(params, key)?;
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .map_err(|_| HandlerError::bad_params(format!("{} must be HH:MM", key)))
}

fn handle_schedules_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    require_admin(&parse_actor(&req.params)?)?;
    let course_id = required_str(&req.params, "courseId")?;
    let lecturer_id = required_str(&req.params, "lecturerId")?;
    let term = required_term(&req.params)?;
    let day_of_week = req
        .params
        .get("dayOfWeek")
        .and_then(|v| v.as_i64())
        .filter(|d| (1..=7).contains(d))
        .ok_or_else(|| HandlerError::bad_params("dayOfWeek must be 1..=7"))?;
    let start = parse_time(&req.params, "startTime")?;
    let end = parse_time(&req.params, "endTime")?;
    if end <= start {
        return Err(HandlerError::bad_params("endTime must be after startTime"));
    }
    let room = optional_str(&req.params, "room")?;

    let store = RecordStore::new(conn);
    if store.course(&course_id)?.is_none() {
        return Err(HandlerError::not_found("course not found"));
    }
    let lecturer: Option<i64> = conn
        .query_row("SELECT 1 FROM lecturers WHERE id = ?", [&lecturer_id], |r| r.get(0))
        .optional()?;
    if lecturer.is_none() {
        return Err(HandlerError::not_found("lecturer not found"));
    }

    let schedule = Schedule {
        id: Uuid::new_v4().to_string(),
        course_id,
        lecturer_id,
        term,
        day_of_week,
        start_time: start.format("%H:%M").to_string(),
        end_time: end.format("%H:%M").to_string(),
        room,
    };
    conn.execute(
        "INSERT INTO schedules(id, course_id, lecturer_id, academic_year, term_name,
                               day_of_week, start_time, end_time, room, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            schedule.id,
            schedule.course_id,
            schedule.lecturer_id,
            schedule.term.academic_year,
            schedule.term.term_name.key(),
            schedule.day_of_week,
            schedule.start_time,
            schedule.end_time,
            schedule.room,
            now_rfc3339(),
        ],
    )
    .map_err(HandlerError::update("schedules"))?;
    info!(schedule_id = %schedule.id, course_id = %schedule.course_id, "schedule created");
    Ok(json!({ "schedule": schedule }))
}

/// Lecturers see their own schedules; students see schedules of courses they
/// hold a score record for in the same term.
fn handle_schedules_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();
    match actor.scope() {
        RecordScope::All => {}
        RecordScope::Lecturer(id) => {
            clauses.push("s.lecturer_id = ?");
            args.push(SqlValue::Text(id));
        }
        RecordScope::Student(id) => {
            clauses.push(
                "EXISTS (SELECT 1 FROM score_records sr
                         WHERE sr.student_id = ? AND sr.course_id = s.course_id
                           AND sr.academic_year = s.academic_year
                           AND sr.term_name = s.term_name)",
            );
            args.push(SqlValue::Text(id));
        }
    }
    if let Some(v) = optional_str(&req.params, "courseId")? {
        clauses.push("s.course_id = ?");
        args.push(SqlValue::Text(v));
    }
    if let Some(v) = optional_str(&req.params, "academicYear")? {
        clauses.push("s.academic_year = ?");
        args.push(SqlValue::Text(v));
    }
    if let Some(v) = optional_term_name(&req.params, "termName")? {
        clauses.push("s.term_name = ?");
        args.push(SqlValue::Text(v.key()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT s.id, s.course_id, s.lecturer_id, s.academic_year, s.term_name,
                s.day_of_week, s.start_time, s.end_time, s.room, c.code, c.name, l.name
         FROM schedules s
         JOIN courses c ON c.id = s.course_id
         JOIN lecturers l ON l.id = s.lecturer_id{}
         ORDER BY s.academic_year DESC, s.day_of_week, s.start_time, c.code",
        where_sql
    ))?;
    let schedules = stmt
        .query_map(params_from_iter(args.iter()), |r| {
            let term_raw: String = r.get(4)?;
            let term_name = TermName::parse(&term_raw)
                .ok_or_else(|| InvalidColumnType(4, "term_name".to_string(), Type::Text))?;
            Ok(ScheduleView {
                schedule: Schedule {
                    id: r.get(0)?,
                    course_id: r.get(1)?,
                    lecturer_id: r.get(2)?,
                    term: Term::new(r.get::<_, String>(3)?, term_name),
                    day_of_week: r.get(5)?,
                    start_time: r.get(6)?,
                    end_time: r.get(7)?,
                    room: r.get(8)?,
                },
                course_code: r.get(9)?,
                course_name: r.get(10)?,
                lecturer_name: r.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "schedules": schedules }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "courses.create" => handle_courses_create(state, req),
        "courses.list" => handle_courses_list(state, req),
        "courses.delete" => handle_courses_delete(state, req),
        "schedules.create" => handle_schedules_create(state, req),
        "schedules.list" => handle_schedules_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
