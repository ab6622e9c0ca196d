use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, types::Type, types::Value, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::actor::RecordScope;
use crate::attendance::{AttendanceRecord, AttendanceStatus};
use crate::grading::LetterGrade;
use crate::models::{Course, ScoreComponents, ScoreRecord, Term, TermName};

/// Most recent term first, keyed like `TermName`'s ordering: the number
/// (odd 1, even 2, or the semester number), then numbered after named on a tie.
const TERM_ORDER_DESC_SQL: &str = "CASE {t} WHEN 'even' THEN 2 WHEN 'odd' THEN 1 ELSE CAST({t} AS INTEGER) END DESC,
     CASE WHEN {t} IN ('odd', 'even') THEN 0 ELSE 1 END DESC";

#[derive(Debug, Error)]
#[error("unrecognized stored value {value:?} in {column}")]
struct StoredValueError {
    column: &'static str,
    value: String,
}

fn bad_stored(idx: usize, column: &'static str, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(StoredValueError { column, value }))
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// `%` and `_` are matched literally; pair with `ESCAPE '\'`.
pub fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        Self {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub course_id: String,
    pub lecturer_id: String,
    pub term: Term,
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
    pub room: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreFilter {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub academic_year: Option<String>,
    pub term_name: Option<TermName>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub student_id: Option<String>,
    pub schedule_id: Option<String>,
    pub course_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRow {
    #[serde(flatten)]
    pub record: ScoreRecord,
    pub student_no: String,
    pub student_name: String,
    pub course_code: Option<String>,
    pub course_name: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub course_id: String,
    pub course_code: String,
    pub student_no: String,
    pub student_name: String,
}

struct WhereClause {
    clauses: Vec<String>,
    args: Vec<Value>,
}

impl WhereClause {
    fn new() -> Self {
        Self {
            clauses: Vec::new(),
            args: Vec::new(),
        }
    }

    fn push(&mut self, clause: &str, arg: impl Into<Value>) {
        self.clauses.push(clause.to_string());
        self.args.push(arg.into());
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn parse_term_name(idx: usize, raw: String) -> rusqlite::Result<TermName> {
    TermName::parse(&raw).ok_or_else(|| bad_stored(idx, "term_name", raw))
}

fn parse_date(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| bad_stored(idx, "date", raw))
}

/// Columns 0..=8 of every score query.
const SCORE_COLUMNS: &str = "sr.student_id, sr.course_id, sr.academic_year, sr.term_name,
     sr.assignment_score, sr.midterm_score, sr.final_score, sr.computed_final, sr.letter_grade";

fn score_record_from_row(r: &Row<'_>) -> rusqlite::Result<ScoreRecord> {
    let term_name = parse_term_name(3, r.get(3)?)?;
    let grade_raw: String = r.get(8)?;
    let letter_grade =
        LetterGrade::parse(&grade_raw).ok_or_else(|| bad_stored(8, "letter_grade", grade_raw))?;
    Ok(ScoreRecord::from_stored(
        r.get(0)?,
        r.get(1)?,
        Term::new(r.get::<_, String>(2)?, term_name),
        ScoreComponents {
            assignment: r.get(4)?,
            midterm: r.get(5)?,
            final_exam: r.get(6)?,
        },
        r.get(7)?,
        letter_grade,
    ))
}

/// Query and upsert access to the score and attendance tables. Upserts are a
/// single `INSERT .. ON CONFLICT` on the natural key, so the last writer wins.
pub struct RecordStore<'a> {
    conn: &'a Connection,
}

impl<'a> RecordStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn course(&self, course_id: &str) -> rusqlite::Result<Option<Course>> {
        self.conn
            .query_row(
                "SELECT id, code, name, credit_hours FROM courses WHERE id = ?",
                [course_id],
                |r| {
                    Ok(Course {
                        id: r.get(0)?,
                        code: r.get(1)?,
                        name: r.get(2)?,
                        credit_hours: r.get(3)?,
                    })
                },
            )
            .optional()
    }

    pub fn course_catalog(&self) -> rusqlite::Result<HashMap<String, Course>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, code, name, credit_hours FROM courses")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Course {
                    id: r.get(0)?,
                    code: r.get(1)?,
                    name: r.get(2)?,
                    credit_hours: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(|c| (c.id.clone(), c)).collect())
    }

    pub fn student_exists(&self, student_id: &str) -> rusqlite::Result<bool> {
        self.conn
            .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()
            .map(|v| v.is_some())
    }

    pub fn student_name(&self, student_id: &str) -> rusqlite::Result<Option<(String, String)>> {
        self.conn
            .query_row(
                "SELECT student_no, name FROM students WHERE id = ?",
                [student_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
    }

    pub fn schedule(&self, schedule_id: &str) -> rusqlite::Result<Option<Schedule>> {
        self.conn
            .query_row(
                "SELECT id, course_id, lecturer_id, academic_year, term_name,
                        day_of_week, start_time, end_time, room
                 FROM schedules WHERE id = ?",
                [schedule_id],
                |r| {
                    let term_name = parse_term_name(4, r.get(4)?)?;
                    Ok(Schedule {
                        id: r.get(0)?,
                        course_id: r.get(1)?,
                        lecturer_id: r.get(2)?,
                        term: Term::new(r.get::<_, String>(3)?, term_name),
                        day_of_week: r.get(5)?,
                        start_time: r.get(6)?,
                        end_time: r.get(7)?,
                        room: r.get(8)?,
                    })
                },
            )
            .optional()
    }

    /// A lecturer may grade a course in a term only if one of its schedules
    /// for that term is assigned to them.
    pub fn lecturer_teaches(
        &self,
        lecturer_id: &str,
        course_id: &str,
        term: &Term,
    ) -> rusqlite::Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM schedules
                 WHERE lecturer_id = ? AND course_id = ? AND academic_year = ? AND term_name = ?
                 LIMIT 1",
                (
                    lecturer_id,
                    course_id,
                    term.academic_year.as_str(),
                    term.term_name.key(),
                ),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.is_some())
    }

    pub fn lecturer_teaches_course(&self, lecturer_id: &str, course_id: &str) -> rusqlite::Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM schedules WHERE lecturer_id = ? AND course_id = ? LIMIT 1",
                (lecturer_id, course_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.is_some())
    }

    pub fn score_record(
        &self,
        student_id: &str,
        course_id: &str,
        term: &Term,
    ) -> rusqlite::Result<Option<ScoreRecord>> {
        let sql = format!(
            "SELECT {} FROM score_records sr
             WHERE sr.student_id = ? AND sr.course_id = ? AND sr.academic_year = ? AND sr.term_name = ?",
            SCORE_COLUMNS
        );
        self.conn
            .query_row(
                &sql,
                (
                    student_id,
                    course_id,
                    term.academic_year.as_str(),
                    term.term_name.key(),
                ),
                score_record_from_row,
            )
            .optional()
    }

    pub fn upsert_score(&self, record: &ScoreRecord) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO score_records(
                id, student_id, course_id, academic_year, term_name,
                assignment_score, midterm_score, final_score,
                computed_final, letter_grade, updated_at
             )
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, course_id, academic_year, term_name) DO UPDATE SET
               assignment_score = excluded.assignment_score,
               midterm_score = excluded.midterm_score,
               final_score = excluded.final_score,
               computed_final = excluded.computed_final,
               letter_grade = excluded.letter_grade,
               updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                record.student_id,
                record.course_id,
                record.term.academic_year,
                record.term.term_name.key(),
                record.components.assignment,
                record.components.midterm,
                record.components.final_exam,
                record.computed_final(),
                record.letter_grade().as_str(),
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn score_where(&self, scope: &RecordScope, filter: &ScoreFilter) -> WhereClause {
        let mut w = WhereClause::new();
        match scope {
            RecordScope::All => {}
            RecordScope::Student(id) => w.push("sr.student_id = ?", id.clone()),
            RecordScope::Lecturer(id) => w.push(
                "EXISTS (SELECT 1 FROM schedules sc
                         WHERE sc.course_id = sr.course_id
                           AND sc.academic_year = sr.academic_year
                           AND sc.term_name = sr.term_name
                           AND sc.lecturer_id = ?)",
                id.clone(),
            ),
        }
        if let Some(v) = &filter.student_id {
            w.push("sr.student_id = ?", v.clone());
        }
        if let Some(v) = &filter.course_id {
            w.push("sr.course_id = ?", v.clone());
        }
        if let Some(v) = &filter.academic_year {
            w.push("sr.academic_year = ?", v.clone());
        }
        if let Some(v) = &filter.term_name {
            w.push("sr.term_name = ?", v.key());
        }
        if let Some(s) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = like_pattern(s);
            w.clauses.push(
                "(st.name LIKE ? ESCAPE '\\' OR st.student_no LIKE ? ESCAPE '\\'
                  OR c.code LIKE ? ESCAPE '\\' OR c.name LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            for _ in 0..4 {
                w.args.push(Value::Text(pattern.clone()));
            }
        }
        w
    }

    pub fn count_scores(&self, scope: &RecordScope, filter: &ScoreFilter) -> rusqlite::Result<i64> {
        let w = self.score_where(scope, filter);
        let sql = format!(
            "SELECT COUNT(*)
             FROM score_records sr
             JOIN students st ON st.id = sr.student_id
             LEFT JOIN courses c ON c.id = sr.course_id{}",
            w.sql()
        );
        self.conn
            .query_row(&sql, params_from_iter(w.args.iter()), |r| r.get(0))
    }

    /// `page = None` returns every matching row.
    pub fn list_scores(
        &self,
        scope: &RecordScope,
        filter: &ScoreFilter,
        page: Option<Page>,
    ) -> rusqlite::Result<Vec<ScoreRow>> {
        let mut w = self.score_where(scope, filter);
        let mut sql = format!(
            "SELECT {}, st.student_no, st.name, c.code, c.name, sr.updated_at
             FROM score_records sr
             JOIN students st ON st.id = sr.student_id
             LEFT JOIN courses c ON c.id = sr.course_id{}
             ORDER BY sr.academic_year DESC, {}, c.code, st.student_no",
            SCORE_COLUMNS,
            w.sql(),
            TERM_ORDER_DESC_SQL.replace("{t}", "sr.term_name")
        );
        if let Some(p) = page {
            sql.push_str(" LIMIT ? OFFSET ?");
            w.args.push(Value::Integer(p.per_page as i64));
            w.args.push(Value::Integer(p.offset()));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(w.args.iter()), |r| {
                Ok(ScoreRow {
                    record: score_record_from_row(r)?,
                    student_no: r.get(9)?,
                    student_name: r.get(10)?,
                    course_code: r.get(11)?,
                    course_name: r.get(12)?,
                    updated_at: r.get(13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn student_scores(&self, student_id: &str) -> rusqlite::Result<Vec<ScoreRecord>> {
        let sql = format!(
            "SELECT {} FROM score_records sr WHERE sr.student_id = ?",
            SCORE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([student_id], score_record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn upsert_attendance(&self, record: &AttendanceRecord) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO attendance_records(id, student_id, schedule_id, date, status, note, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, schedule_id, date) DO UPDATE SET
               status = excluded.status,
               note = excluded.note,
               updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                record.student_id,
                record.schedule_id,
                record.date.format("%Y-%m-%d").to_string(),
                record.status.as_str(),
                record.note,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn attendance_where(&self, scope: &RecordScope, filter: &AttendanceFilter) -> WhereClause {
        let mut w = WhereClause::new();
        match scope {
            RecordScope::All => {}
            RecordScope::Student(id) => w.push("ar.student_id = ?", id.clone()),
            RecordScope::Lecturer(id) => w.push("sch.lecturer_id = ?", id.clone()),
        }
        if let Some(v) = &filter.student_id {
            w.push("ar.student_id = ?", v.clone());
        }
        if let Some(v) = &filter.schedule_id {
            w.push("ar.schedule_id = ?", v.clone());
        }
        if let Some(v) = &filter.course_id {
            w.push("sch.course_id = ?", v.clone());
        }
        if let Some(d) = filter.from {
            w.push("ar.date >= ?", d.format("%Y-%m-%d").to_string());
        }
        if let Some(d) = filter.to {
            w.push("ar.date <= ?", d.format("%Y-%m-%d").to_string());
        }
        w
    }

    const ATTENDANCE_FROM: &'static str = "FROM attendance_records ar
             JOIN schedules sch ON sch.id = ar.schedule_id
             JOIN courses c ON c.id = sch.course_id
             JOIN students st ON st.id = ar.student_id";

    pub fn count_attendance(
        &self,
        scope: &RecordScope,
        filter: &AttendanceFilter,
    ) -> rusqlite::Result<i64> {
        let w = self.attendance_where(scope, filter);
        let sql = format!("SELECT COUNT(*) {}{}", Self::ATTENDANCE_FROM, w.sql());
        self.conn
            .query_row(&sql, params_from_iter(w.args.iter()), |r| r.get(0))
    }

    pub fn list_attendance(
        &self,
        scope: &RecordScope,
        filter: &AttendanceFilter,
        page: Option<Page>,
    ) -> rusqlite::Result<Vec<AttendanceRow>> {
        let mut w = self.attendance_where(scope, filter);
        let mut sql = format!(
            "SELECT ar.student_id, ar.schedule_id, ar.date, ar.status, ar.note,
                    sch.course_id, c.code, st.student_no, st.name
             {}{}
             ORDER BY ar.date, c.code, sch.id, st.student_no",
            Self::ATTENDANCE_FROM,
            w.sql()
        );
        if let Some(p) = page {
            sql.push_str(" LIMIT ? OFFSET ?");
            w.args.push(Value::Integer(p.per_page as i64));
            w.args.push(Value::Integer(p.offset()));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(w.args.iter()), |r| {
                let date = parse_date(2, r.get(2)?)?;
                let status_raw: String = r.get(3)?;
                let status = AttendanceStatus::parse(&status_raw)
                    .ok_or_else(|| bad_stored(3, "status", status_raw))?;
                Ok(AttendanceRow {
                    record: AttendanceRecord {
                        student_id: r.get(0)?,
                        schedule_id: r.get(1)?,
                        date,
                        status,
                        note: r.get(4)?,
                    },
                    course_id: r.get(5)?,
                    course_code: r.get(6)?,
                    student_no: r.get(7)?,
                    student_name: r.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::grading::GradingPolicy;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_conn(prefix: &str) -> Connection {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        db::open_db(&p).expect("open db")
    }

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO students(id, student_no, name, created_at) VALUES
               ('s1', '2101', 'Ayu Lestari', ''),
               ('s2', '2102', 'Bima Santoso', '');
             INSERT INTO lecturers(id, employee_no, name, created_at) VALUES
               ('l1', 'E1', 'Dr. Rahman', ''),
               ('l2', 'E2', 'Dr. Wulan', '');
             INSERT INTO courses(id, code, name, credit_hours, created_at) VALUES
               ('c1', 'IF101', 'Algorithms', 3, ''),
               ('c2', 'IF102', 'Databases', 4, '');
             INSERT INTO schedules(id, course_id, lecturer_id, academic_year, term_name,
                                   day_of_week, start_time, end_time, room, created_at) VALUES
               ('k1', 'c1', 'l1', '2024/2025', 'odd', 1, '08:00', '09:40', 'R1', ''),
               ('k2', 'c2', 'l2', '2024/2025', 'odd', 2, '10:00', '11:40', NULL, '');",
        )
        .expect("seed");
    }

    fn odd_term() -> Term {
        Term::new("2024/2025", TermName::Odd)
    }

    fn score(student: &str, course: &str, a: f64) -> ScoreRecord {
        ScoreRecord::new(
            student,
            course,
            odd_term(),
            ScoreComponents {
                assignment: Some(a),
                midterm: Some(a),
                final_exam: Some(a),
            },
            &GradingPolicy::default(),
        )
    }

    #[test]
    fn score_upsert_replaces_on_natural_key() {
        let conn = temp_conn("campusd-records-upsert");
        seed(&conn);
        let store = RecordStore::new(&conn);
        store.upsert_score(&score("s1", "c1", 60.0)).expect("insert");
        store.upsert_score(&score("s1", "c1", 90.0)).expect("update");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM score_records", [], |r| r.get(0))
            .expect("count");
        assert_eq!(count, 1);
        let stored = store
            .score_record("s1", "c1", &odd_term())
            .expect("query")
            .expect("row");
        assert_eq!(stored.computed_final(), 90.0);
        assert_eq!(stored.letter_grade(), LetterGrade::A);
    }

    #[test]
    fn score_listing_respects_scope_and_search() {
        let conn = temp_conn("campusd-records-scope");
        seed(&conn);
        let store = RecordStore::new(&conn);
        store.upsert_score(&score("s1", "c1", 80.0)).expect("s1c1");
        store.upsert_score(&score("s2", "c1", 70.0)).expect("s2c1");
        store.upsert_score(&score("s1", "c2", 75.0)).expect("s1c2");

        let filter = ScoreFilter::default();
        assert_eq!(store.count_scores(&RecordScope::All, &filter).expect("all"), 3);
        assert_eq!(
            store
                .count_scores(&RecordScope::Student("s1".to_string()), &filter)
                .expect("student"),
            2
        );
        let lecturer_rows = store
            .list_scores(&RecordScope::Lecturer("l2".to_string()), &filter, None)
            .expect("lecturer");
        assert_eq!(lecturer_rows.len(), 1);
        assert_eq!(lecturer_rows[0].course_code.as_deref(), Some("IF102"));

        let search = ScoreFilter {
            search: Some("bima".to_string()),
            ..ScoreFilter::default()
        };
        let rows = store.list_scores(&RecordScope::All, &search, None).expect("search");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_name, "Bima Santoso");

        let paged = store
            .list_scores(&RecordScope::All, &filter, Some(Page { page: 2, per_page: 2 }))
            .expect("page 2");
        assert_eq!(paged.len(), 1);
    }

    #[test]
    fn score_listing_orders_terms_like_term_name() {
        let conn = temp_conn("campusd-records-term-order");
        seed(&conn);
        let store = RecordStore::new(&conn);
        let terms = [
            TermName::Odd,
            TermName::Semester(2),
            TermName::Even,
            TermName::Semester(1),
            TermName::Semester(3),
        ];
        for t in terms {
            let mut rec = score("s1", "c1", 70.0);
            rec.term = Term::new("2024/2025", t);
            store.upsert_score(&rec).expect("upsert");
        }

        let listed: Vec<TermName> = store
            .list_scores(&RecordScope::All, &ScoreFilter::default(), None)
            .expect("list")
            .into_iter()
            .map(|r| r.record.term.term_name)
            .collect();
        let mut expected = terms.to_vec();
        expected.sort();
        expected.reverse();
        assert_eq!(listed, expected);
        assert_eq!(listed[1], TermName::Semester(2));
        assert_eq!(listed[2], TermName::Even);
    }

    #[test]
    fn lecturer_assignment_checks_term() {
        let conn = temp_conn("campusd-records-teaches");
        seed(&conn);
        let store = RecordStore::new(&conn);
        assert!(store.lecturer_teaches("l1", "c1", &odd_term()).expect("q"));
        assert!(!store.lecturer_teaches("l1", "c2", &odd_term()).expect("q"));
        assert!(!store
            .lecturer_teaches("l1", "c1", &Term::new("2024/2025", TermName::Even))
            .expect("q"));
    }

    #[test]
    fn attendance_upsert_and_date_range() {
        let conn = temp_conn("campusd-records-attendance");
        seed(&conn);
        let store = RecordStore::new(&conn);
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 9, d).expect("date");
        let rec = |student: &str, d: u32, status: AttendanceStatus| AttendanceRecord {
            student_id: student.to_string(),
            schedule_id: "k1".to_string(),
            date: day(d),
            status,
            note: None,
        };
        store.upsert_attendance(&rec("s1", 2, AttendanceStatus::Absent)).expect("a");
        store.upsert_attendance(&rec("s1", 2, AttendanceStatus::Sick)).expect("b");
        store.upsert_attendance(&rec("s1", 9, AttendanceStatus::Present)).expect("c");
        store.upsert_attendance(&rec("s2", 9, AttendanceStatus::Present)).expect("d");

        let all = store
            .list_attendance(&RecordScope::All, &AttendanceFilter::default(), None)
            .expect("all");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].record.status, AttendanceStatus::Sick);
        assert_eq!(all[0].course_code, "IF101");

        let ranged = AttendanceFilter {
            from: Some(day(5)),
            to: Some(day(30)),
            ..AttendanceFilter::default()
        };
        assert_eq!(store.count_attendance(&RecordScope::All, &ranged).expect("range"), 2);
        assert_eq!(
            store
                .count_attendance(&RecordScope::Lecturer("l2".to_string()), &AttendanceFilter::default())
                .expect("other lecturer"),
            0
        );
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_a"), "%50\\%\\_a%");
    }
}
