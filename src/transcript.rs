use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::grading::{round_half_up, LetterGrade};
use crate::models::{Course, ScoreRecord, Term};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptCourse {
    pub course_id: String,
    pub code: String,
    pub name: String,
    pub credit_hours: u32,
    pub assignment_score: Option<f64>,
    pub midterm_score: Option<f64>,
    pub final_score: Option<f64>,
    pub computed_final: f64,
    pub letter_grade: LetterGrade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermSummary {
    pub term: Term,
    pub courses: Vec<TranscriptCourse>,
    pub term_credit_hours: u64,
    #[serde(rename = "termGPA")]
    pub term_gpa: f64,
}

/// `overall_gpa` and `term_gpa` are credit-hour-weighted means of the 0-100
/// final score, not a 4-point index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub by_term: Vec<TermSummary>,
    #[serde(rename = "overallGPA")]
    pub overall_gpa: f64,
    pub total_credit_hours: u64,
    /// Records dropped because their course no longer resolves.
    pub skipped_records: usize,
}

/// Credits accumulate in `u64` so many large courses cannot wrap the total.
fn weighted_mean<I>(rows: I) -> (f64, u64)
where
    I: IntoIterator<Item = (f64, u32)>,
{
    let mut sum = 0.0;
    let mut credits: u64 = 0;
    for (score, credit_hours) in rows {
        sum += score * f64::from(credit_hours);
        credits += u64::from(credit_hours);
    }
    if credits == 0 {
        return (0.0, 0);
    }
    (round_half_up(sum / credits as f64, 2), credits)
}

/// Terms come out most recent first. The overall mean is a separate pass
/// over every included record rather than a blend of the per-term means, so
/// terms with heavier loads weigh more.
pub fn build_transcript(records: &[ScoreRecord], courses: &HashMap<String, Course>) -> Transcript {
    let mut included: Vec<(&ScoreRecord, &Course)> = Vec::with_capacity(records.len());
    let mut skipped_records = 0usize;
    for r in records {
        match courses.get(&r.course_id) {
            Some(course) => included.push((r, course)),
            None => skipped_records += 1,
        }
    }

    let mut grouped: BTreeMap<&Term, Vec<TranscriptCourse>> = BTreeMap::new();
    for (r, course) in &included {
        grouped.entry(&r.term).or_default().push(TranscriptCourse {
            course_id: course.id.clone(),
            code: course.code.clone(),
            name: course.name.clone(),
            credit_hours: course.credit_hours,
            assignment_score: r.components.assignment,
            midterm_score: r.components.midterm,
            final_score: r.components.final_exam,
            computed_final: r.computed_final(),
            letter_grade: r.letter_grade(),
        });
    }

    let by_term: Vec<TermSummary> = grouped
        .into_iter()
        .rev()
        .map(|(term, mut rows)| {
            rows.sort_by(|a, b| a.code.cmp(&b.code));
            let (term_gpa, term_credit_hours) =
                weighted_mean(rows.iter().map(|c| (c.computed_final, c.credit_hours)));
            TermSummary {
                term: term.clone(),
                courses: rows,
                term_credit_hours,
                term_gpa,
            }
        })
        .collect();

    let (overall_gpa, total_credit_hours) = weighted_mean(
        included
            .iter()
            .map(|(r, course)| (r.computed_final(), course.credit_hours)),
    );

    Transcript {
        by_term,
        overall_gpa,
        total_credit_hours,
        skipped_records,
    }
}
