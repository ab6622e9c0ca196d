use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::actor::{ActorContext, Role};
use crate::attendance::{summarize, summarize_groups, AttendanceRecord, AttendanceSummary};
use crate::grading::{round_half_up, LetterGrade};
use crate::ipc::error::HandlerError;
use crate::ipc::handlers::attendance::attendance_filter;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    db_conn, optional_str, optional_term_name, parse_actor, required_str, respond, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{Course, Term};
use crate::records::{RecordStore, ScoreFilter, ScoreRow};
use crate::transcript::{build_transcript, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupBy {
    Course,
    Student,
    Schedule,
}

impl GroupBy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "course" => Some(Self::Course),
            "student" => Some(Self::Student),
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceGroup {
    key: String,
    label: String,
    #[serde(flatten)]
    summary: AttendanceSummary,
    below_threshold: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceReport {
    overall: AttendanceSummary,
    low_attendance_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<AttendanceGroup>>,
}

fn handle_attendance_summary(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let filter = attendance_filter(&req.params)?;
    let group_by = match optional_str(&req.params, "groupBy")? {
        None => None,
        Some(raw) => Some(GroupBy::parse(&raw).ok_or_else(|| {
            HandlerError::bad_params("groupBy must be one of: course, student, schedule")
        })?),
    };
    let threshold = setup::attendance_settings(conn)?.low_attendance_pct;

    let rows = RecordStore::new(conn).list_attendance(&actor.scope(), &filter, None)?;
    let mut course_of_schedule: HashMap<String, (String, String)> = HashMap::new();
    let mut student_label: HashMap<String, String> = HashMap::new();
    let mut records: Vec<AttendanceRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        course_of_schedule
            .entry(row.record.schedule_id.clone())
            .or_insert_with(|| (row.course_id.clone(), row.course_code.clone()));
        student_label
            .entry(row.record.student_id.clone())
            .or_insert_with(|| format!("{} {}", row.student_no, row.student_name));
        records.push(row.record);
    }

    let overall = summarize(&records);
    let groups = group_by.map(|g| {
        let course_key = |r: &AttendanceRecord| {
            course_of_schedule
                .get(&r.schedule_id)
                .cloned()
                .unwrap_or_default()
        };
        let keyed: BTreeMap<(String, String), AttendanceSummary> = match g {
            GroupBy::Course => summarize_groups(&records, course_key),
            GroupBy::Student => summarize_groups(&records, |r| {
                let label = student_label.get(&r.student_id).cloned().unwrap_or_default();
                (r.student_id.clone(), label)
            }),
            GroupBy::Schedule => summarize_groups(&records, |r| {
                let (_, code) = course_key(r);
                (r.schedule_id.clone(), code)
            }),
        };
        keyed
            .into_iter()
            .map(|((key, label), summary)| AttendanceGroup {
                key,
                label,
                below_threshold: summary.is_below(threshold),
                summary,
            })
            .collect::<Vec<_>>()
    });

    to_json(&AttendanceReport {
        overall,
        low_attendance_pct: threshold,
        groups,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentHeader {
    id: String,
    student_no: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptReport {
    student: StudentHeader,
    #[serde(flatten)]
    transcript: Transcript,
}

/// Admins may read any transcript; students only their own.
fn transcript_student_id(actor: &ActorContext, params: &Value) -> Result<String, HandlerError> {
    let requested = optional_str(params, "studentId")?;
    match actor.role {
        Role::Admin => requested.ok_or_else(|| HandlerError::bad_params("missing studentId")),
        Role::Lecturer => Err(HandlerError::forbidden("lecturers cannot read transcripts")),
        Role::Student => {
            let own = actor.student_id().unwrap_or_default().to_string();
            match requested {
                Some(other) if other != own => {
                    Err(HandlerError::forbidden("students may only read their own transcript"))
                }
                _ => Ok(own),
            }
        }
    }
}

fn handle_transcript(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let student_id = transcript_student_id(&actor, &req.params)?;
    let store = RecordStore::new(conn);
    let (student_no, name) = store
        .student_name(&student_id)?
        .ok_or_else(|| HandlerError::not_found("student not found"))?;

    let records = store.student_scores(&student_id)?;
    let catalog = store.course_catalog()?;
    let transcript = build_transcript(&records, &catalog);
    if transcript.skipped_records > 0 {
        debug!(
            %student_id,
            skipped = transcript.skipped_records,
            "transcript skipped records with unknown courses"
        );
    }
    to_json(&TranscriptReport {
        student: StudentHeader {
            id: student_id,
            student_no,
            name,
        },
        transcript,
    })
}

/// Course roster rows visible to `actor`, optionally narrowed to one term.
pub fn course_score_rows(
    conn: &Connection,
    actor: &ActorContext,
    params: &Value,
) -> Result<(Course, Option<Term>, Vec<ScoreRow>), HandlerError> {
    let course_id = required_str(params, "courseId")?;
    let academic_year = optional_str(params, "academicYear")?;
    let term_name = optional_term_name(params, "termName")?;
    let term = match (&academic_year, term_name) {
        (Some(y), Some(t)) => Some(Term::new(y.clone(), t)),
        _ => None,
    };
    let store = RecordStore::new(conn);
    let course = store
        .course(&course_id)?
        .ok_or_else(|| HandlerError::not_found("course not found"))?;

    match actor.role {
        Role::Admin => {}
        Role::Student => return Err(HandlerError::forbidden("students cannot read course rosters")),
        Role::Lecturer => {
            let lecturer_id = actor.lecturer_id().unwrap_or_default();
            let teaches = match &term {
                Some(t) => store.lecturer_teaches(lecturer_id, &course_id, t)?,
                None => store.lecturer_teaches_course(lecturer_id, &course_id)?,
            };
            if !teaches {
                return Err(HandlerError::forbidden("lecturer does not teach this course"));
            }
        }
    }

    let filter = ScoreFilter {
        course_id: Some(course_id),
        academic_year,
        term_name,
        ..ScoreFilter::default()
    };
    let rows = store.list_scores(&actor.scope(), &filter, None)?;
    Ok((course, term, rows))
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ScoreStats {
    count: usize,
    average: f64,
    highest: Option<f64>,
    lowest: Option<f64>,
    distribution: BTreeMap<&'static str, usize>,
}

fn score_stats(rows: &[ScoreRow]) -> ScoreStats {
    let finals: Vec<f64> = rows.iter().map(|r| r.record.computed_final()).collect();
    let mut distribution: BTreeMap<&'static str, usize> =
        LetterGrade::ALL.iter().map(|g| (g.as_str(), 0)).collect();
    for r in rows {
        *distribution.entry(r.record.letter_grade().as_str()).or_default() += 1;
    }
    let average = if finals.is_empty() {
        0.0
    } else {
        round_half_up(finals.iter().sum::<f64>() / finals.len() as f64, 2)
    };
    ScoreStats {
        count: finals.len(),
        average,
        highest: finals.iter().copied().reduce(f64::max),
        lowest: finals.iter().copied().reduce(f64::min),
        distribution,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseScoresReport {
    course: Course,
    #[serde(skip_serializing_if = "Option::is_none")]
    term: Option<Term>,
    stats: ScoreStats,
    rows: Vec<ScoreRow>,
}

fn handle_course_scores(state: &mut AppState, req: &Request) -> Result<Value, HandlerError> {
    let conn = db_conn(state)?;
    let actor = parse_actor(&req.params)?;
    let (course, term, rows) = course_score_rows(conn, &actor, &req.params)?;
    to_json(&CourseScoresReport {
        course,
        term,
        stats: score_stats(&rows),
        rows,
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.attendanceSummary" => handle_attendance_summary(state, req),
        "reports.transcript" => handle_transcript(state, req),
        "reports.courseScores" => handle_course_scores(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
