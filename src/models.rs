use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

use crate::grading::{compute_final, FinalScore, GradingPolicy, LetterGrade};

/// Semester label within an academic year. `Odd` is the first half of the
/// year and `Even` the second; some programs number semesters instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermName {
    Odd,
    Even,
    Semester(u32),
}

impl TermName {
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("odd") {
            return Some(TermName::Odd);
        }
        if t.eq_ignore_ascii_case("even") {
            return Some(TermName::Even);
        }
        match t.parse::<u32>() {
            Ok(n) if n > 0 => Some(TermName::Semester(n)),
            _ => None,
        }
    }

    pub fn key(&self) -> String {
        match self {
            TermName::Odd => "odd".to_string(),
            TermName::Even => "even".to_string(),
            TermName::Semester(n) => n.to_string(),
        }
    }

    fn sort_key(&self) -> (u32, u8) {
        match self {
            TermName::Odd => (1, 0),
            TermName::Even => (2, 0),
            TermName::Semester(n) => (*n, 1),
        }
    }
}

impl Ord for TermName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for TermName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TermName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl Serialize for TermName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub academic_year: String,
    pub term_name: TermName,
}

impl Term {
    pub fn new(academic_year: impl Into<String>, term_name: TermName) -> Self {
        Self {
            academic_year: academic_year.into(),
            term_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub credit_hours: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComponents {
    pub assignment: Option<f64>,
    pub midterm: Option<f64>,
    pub final_exam: Option<f64>,
}

/// A student's component scores for one course in one term. The final score
/// and letter grade are only ever produced by the grading policy, never set
/// directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub student_id: String,
    pub course_id: String,
    pub term: Term,
    pub components: ScoreComponents,
    computed_final: f64,
    letter_grade: LetterGrade,
}

impl ScoreRecord {
    pub fn new(
        student_id: impl Into<String>,
        course_id: impl Into<String>,
        term: Term,
        components: ScoreComponents,
        policy: &GradingPolicy,
    ) -> Self {
        let FinalScore { score, grade } = compute_final(
            policy,
            components.assignment,
            components.midterm,
            components.final_exam,
        );
        Self {
            student_id: student_id.into(),
            course_id: course_id.into(),
            term,
            components,
            computed_final: score,
            letter_grade: grade,
        }
    }

    /// Rebuilds a row read back from storage, where the derived pair was
    /// written by `new`/`set_components` at upsert time.
    pub fn from_stored(
        student_id: String,
        course_id: String,
        term: Term,
        components: ScoreComponents,
        computed_final: f64,
        letter_grade: LetterGrade,
    ) -> Self {
        Self {
            student_id,
            course_id,
            term,
            components,
            computed_final,
            letter_grade,
        }
    }

    pub fn set_components(&mut self, components: ScoreComponents, policy: &GradingPolicy) {
        let r = compute_final(
            policy,
            components.assignment,
            components.midterm,
            components.final_exam,
        );
        self.components = components;
        self.computed_final = r.score;
        self.letter_grade = r.grade;
    }

    pub fn computed_final(&self) -> f64 {
        self.computed_final
    }

    pub fn letter_grade(&self) -> LetterGrade {
        self.letter_grade
    }
}
