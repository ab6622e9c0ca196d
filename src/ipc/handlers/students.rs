use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::actor::Role;
use crate::ipc::error::HandlerError;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    db_conn, optional_str, parse_actor, parse_page, require_admin, required_str, respond, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{like_pattern, now_rfc3339, Paged};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentView {
    id: String,
    student_no: String,
    name: String,
    program: Option<String>,
    enrollment_year: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LecturerView {
    id: String,
    employee_no: String,
    name: String,
}

fn optional_year(params: &Value) -> Result<Option<i64>, HandlerError> {
    match params.get("enrollmentYear") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .filter(|y| (1900..=9999).contains(y))
            .map(Some)
            .ok_or_else(|| HandlerError::bad_params("enrollmentYear must be a four-digit year")),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    require_admin(&parse_actor(&req.params)?)?;
    let student = StudentView {
        id: Uuid::new_v4().to_string(),
        student_no: required_str(&req.params, "studentNo")?,
        name: required_str(&req.params, "name")?,
        program: optional_str(&req.params, "program")?,
        enrollment_year: optional_year(&req.params)?,
    };
    conn.execute(
        "INSERT INTO students(id, student_no, name, program, enrollment_year, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student.id,
            &student.student_no,
            &student.name,
            &student.program,
            student.enrollment_year,
            now_rfc3339(),
        ),
    )
    .map_err(HandlerError::update("students"))?;
    info!(student_id = %student.id, student_no = %student.student_no, "student created");
    Ok(json!({ "student": student }))
}

fn list_students(
    conn: &Connection,
    search: Option<&str>,
    per_page: u32,
    offset: i64,
) -> Result<(Vec<StudentView>, i64), HandlerError> {
    let mut where_sql = String::new();
    let mut args: Vec<SqlValue> = Vec::new();
    if let Some(s) = search {
        where_sql.push_str(" WHERE (name LIKE ? ESCAPE '\\' OR student_no LIKE ? ESCAPE '\\')");
        let pattern = like_pattern(s);
        args.push(SqlValue::Text(pattern.clone()));
        args.push(SqlValue::Text(pattern));
    }
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM students{}", where_sql),
        params_from_iter(args.iter()),
        |r| r.get(0),
    )?;
    args.push(SqlValue::Integer(per_page as i64));
    args.push(SqlValue::Integer(offset));
    let mut stmt = conn.prepare(&format!(
        "SELECT id, student_no, name, program, enrollment_year
         FROM students{}
         ORDER BY student_no
         LIMIT ? OFFSET ?",
        where_sql
    ))?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |r| {
            Ok(StudentView {
                id: r.get(0)?,
                student_no: r.get(1)?,
                name: r.get(2)?,
                program: r.get(3)?,
                enrollment_year: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, total))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    if actor.role == Role::Student {
        return Err(HandlerError::forbidden("students cannot list other students"));
    }
    let paging = setup::paging_settings(conn)?;
    let page = parse_page(&req.params, &paging)?;
    let search = optional_str(&req.params, "search")?;
    let (items, total) = list_students(conn, search.as_deref(), page.per_page, page.offset())?;
    to_json(&Paged::new(items, total, page))
}

/// Removes the student together with their score and attendance rows.
fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    require_admin(&parse_actor(&req.params)?)?;
    let student_id = required_str(&req.params, "studentId")?;

    let tx = conn.unchecked_transaction()?;
    let attendance = tx
        .execute(
            "DELETE FROM attendance_records WHERE student_id = ?",
            [&student_id],
        )
        .map_err(HandlerError::update("attendance_records"))?;
    let scores = tx
        .execute("DELETE FROM score_records WHERE student_id = ?", [&student_id])
        .map_err(HandlerError::update("score_records"))?;
    let deleted = tx
        .execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(HandlerError::update("students"))?;
    if deleted == 0 {
        return Err(HandlerError::not_found("student not found"));
    }
    tx.commit().map_err(HandlerError::update("students"))?;
    info!(%student_id, scores, attendance, "student deleted");
    Ok(json!({
        "ok": true,
        "deletedScores": scores,
        "deletedAttendance": attendance
    }))
}

fn handle_lecturers_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    require_admin(&parse_actor(&req.params)?)?;
    let lecturer = LecturerView {
        id: Uuid::new_v4().to_string(),
        employee_no: required_str(&req.params, "employeeNo")?,
        name: required_str(&req.params, "name")?,
    };
    conn.execute(
        "INSERT INTO lecturers(id, employee_no, name, created_at) VALUES(?, ?, ?, ?)",
        (
            &lecturer.id,
            &lecturer.employee_no,
            &lecturer.name,
            now_rfc3339(),
        ),
    )
    .map_err(HandlerError::update("lecturers"))?;
    info!(lecturer_id = %lecturer.id, "lecturer created");
    Ok(json!({ "lecturer": lecturer }))
}

fn handle_lecturers_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    parse_actor(&req.params)?;
    let mut stmt = conn.prepare("SELECT id, employee_no, name FROM lecturers ORDER BY name")?;
    let lecturers = stmt
        .query_map([], |r| {
            Ok(LecturerView {
                id: r.get(0)?,
                employee_no: r.get(1)?,
                name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "lecturers": lecturers }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.create" => handle_students_create(state, req),
        "students.list" => handle_students_list(state, req),
        "students.delete" => handle_students_delete(state, req),
        "lecturers.create" => handle_lecturers_create(state, req),
        "lecturers.list" => handle_lecturers_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
