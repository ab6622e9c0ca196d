#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .env_remove("CAMPUSD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn send_line(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, line: &str) -> Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");
    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    assert!(!out.trim().is_empty(), "empty response for {}", line);
    serde_json::from_str(out.trim()).expect("parse response json")
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    let value = send_line(stdin, reader, &payload.to_string());
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(Value::Null)
}

/// Returns the error code of a request that is expected to fail.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

pub fn admin() -> Value {
    json!({ "role": "admin" })
}

pub fn lecturer(id: &str) -> Value {
    json!({ "role": "lecturer", "profileId": id })
}

pub fn student(id: &str) -> Value {
    json!({ "role": "student", "profileId": id })
}

pub fn str_at(v: &Value, pointer: &str) -> String {
    v.pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing string at {} in {}", pointer, v))
        .to_string()
}

/// Ids created by `seed_campus`.
pub struct Campus {
    pub student_a: String,
    pub student_b: String,
    pub lecturer_a: String,
    pub lecturer_b: String,
    /// IF101, 3 credit hours, taught by `lecturer_a` in 2024/2025 odd.
    pub course_a: String,
    /// IF102, 4 credit hours, taught by `lecturer_b` in 2024/2025 odd.
    pub course_b: String,
    pub schedule_a: String,
    pub schedule_b: String,
}

pub fn seed_campus(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Campus {
    let mut create = |id: &str, method: &str, params: Value, pointer: &str| {
        let res = request_ok(stdin, reader, id, method, params);
        str_at(&res, pointer)
    };
    let student_a = create(
        "seed-s1",
        "students.create",
        json!({ "actor": admin(), "studentNo": "2101", "name": "Ayu Lestari", "program": "Informatics", "enrollmentYear": 2021 }),
        "/student/id",
    );
    let student_b = create(
        "seed-s2",
        "students.create",
        json!({ "actor": admin(), "studentNo": "2102", "name": "Bima Santoso" }),
        "/student/id",
    );
    let lecturer_a = create(
        "seed-l1",
        "lecturers.create",
        json!({ "actor": admin(), "employeeNo": "E01", "name": "Dr. Rahman" }),
        "/lecturer/id",
    );
    let lecturer_b = create(
        "seed-l2",
        "lecturers.create",
        json!({ "actor": admin(), "employeeNo": "E02", "name": "Dr. Wulan" }),
        "/lecturer/id",
    );
    let course_a = create(
        "seed-c1",
        "courses.create",
        json!({ "actor": admin(), "code": "IF101", "name": "Algorithms", "creditHours": 3 }),
        "/course/id",
    );
    let course_b = create(
        "seed-c2",
        "courses.create",
        json!({ "actor": admin(), "code": "IF102", "name": "Databases", "creditHours": 4 }),
        "/course/id",
    );
    let schedule_a = create(
        "seed-k1",
        "schedules.create",
        json!({
            "actor": admin(),
            "courseId": course_a,
            "lecturerId": lecturer_a,
            "academicYear": "2024/2025",
            "termName": "odd",
            "dayOfWeek": 1,
            "startTime": "08:00",
            "endTime": "09:40",
            "room": "R101"
        }),
        "/schedule/id",
    );
    let schedule_b = create(
        "seed-k2",
        "schedules.create",
        json!({
            "actor": admin(),
            "courseId": course_b,
            "lecturerId": lecturer_b,
            "academicYear": "2024/2025",
            "termName": "odd",
            "dayOfWeek": 3,
            "startTime": "10:00",
            "endTime": "11:40"
        }),
        "/schedule/id",
    );
    Campus {
        student_a,
        student_b,
        lecturer_a,
        lecturer_b,
        course_a,
        course_b,
        schedule_a,
        schedule_b,
    }
}

pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    workspace
}
