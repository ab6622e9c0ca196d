use serde::{Deserialize, Serialize};
use std::fmt;

/// Slack added before flooring so values like `84.285 * 100` that land a hair
/// under the half mark still round up.
const ROUNDING_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    E,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 5] = [
        LetterGrade::A,
        LetterGrade::B,
        LetterGrade::C,
        LetterGrade::D,
        LetterGrade::E,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::E => "E",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(LetterGrade::A),
            "B" => Some(LetterGrade::B),
            "C" => Some(LetterGrade::C),
            "D" => Some(LetterGrade::D),
            "E" => Some(LetterGrade::E),
            _ => None,
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component weights (percent) and grade band floors used to derive a final
/// score. Defaults reproduce the fixed 30/30/40 weighting and 85/70/60/50 bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingPolicy {
    pub assignment_weight: f64,
    pub midterm_weight: f64,
    pub final_weight: f64,
    pub threshold_a: f64,
    pub threshold_b: f64,
    pub threshold_c: f64,
    pub threshold_d: f64,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            assignment_weight: 30.0,
            midterm_weight: 30.0,
            final_weight: 40.0,
            threshold_a: 85.0,
            threshold_b: 70.0,
            threshold_c: 60.0,
            threshold_d: 50.0,
        }
    }
}

impl GradingPolicy {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            ("assignmentWeight", self.assignment_weight),
            ("midtermWeight", self.midterm_weight),
            ("finalWeight", self.final_weight),
        ];
        for (key, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("{} must be a non-negative number", key));
            }
        }
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if (total - 100.0).abs() > 1e-9 {
            return Err(format!("weights must sum to 100 (got {})", total));
        }

        let floors = [
            self.threshold_a,
            self.threshold_b,
            self.threshold_c,
            self.threshold_d,
        ];
        if floors.iter().any(|t| !t.is_finite()) {
            return Err("grade thresholds must be finite numbers".to_string());
        }
        if !floors.windows(2).all(|w| w[0] > w[1]) {
            return Err("grade thresholds must be strictly descending A > B > C > D".to_string());
        }
        Ok(())
    }

    /// Bands are evaluated high to low; each floor is inclusive.
    pub fn grade_for(&self, score: f64) -> LetterGrade {
        if score >= self.threshold_a {
            LetterGrade::A
        } else if score >= self.threshold_b {
            LetterGrade::B
        } else if score >= self.threshold_c {
            LetterGrade::C
        } else if score >= self.threshold_d {
            LetterGrade::D
        } else {
            LetterGrade::E
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinalScore {
    pub score: f64,
    pub grade: LetterGrade,
}

/// Round half up (toward +inf at the half mark) to `places` decimals.
pub fn round_half_up(x: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    ((x * factor) + 0.5 + ROUNDING_EPSILON).floor() / factor
}

/// Missing components count as 0. Out-of-range inputs are not clamped.
pub fn compute_final(
    policy: &GradingPolicy,
    assignment: Option<f64>,
    midterm: Option<f64>,
    final_exam: Option<f64>,
) -> FinalScore {
    let weighted = assignment.unwrap_or(0.0) * policy.assignment_weight
        + midterm.unwrap_or(0.0) * policy.midterm_weight
        + final_exam.unwrap_or(0.0) * policy.final_weight;
    let score = round_half_up(weighted / 100.0, 2);
    FinalScore {
        score,
        grade: policy.grade_for(score),
    }
}

pub fn is_in_score_range(v: f64) -> bool {
    (0.0..=100.0).contains(&v)
}

/// Largest component magnitude accepted on input. Values past 0..=100 are
/// allowed, but the weighted sum has to stay finite.
pub const MAX_SCORE_MAGNITUDE: f64 = 1e6;

pub fn is_acceptable_score(v: f64) -> bool {
    v.is_finite() && v.abs() <= MAX_SCORE_MAGNITUDE
}
