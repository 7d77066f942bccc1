use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound of a subject's final score.
pub const FINAL_CAP: f64 = 10.0;
/// A final score must be strictly above this to pass.
pub const PASS_THRESHOLD: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// Coursework, 0 to 5.
    Work,
    /// Mock exam, 0 to 1. There are two per record.
    Partial,
    /// Final exam, 0 to 5.
    Exam,
}

impl ComponentKind {
    pub fn bounds(self) -> (f64, f64) {
        match self {
            ComponentKind::Work | ComponentKind::Exam => (0.0, 5.0),
            ComponentKind::Partial => (0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum ScoreError {
    #[error("score is empty")]
    Empty,
    #[error("'{raw}' is not a number")]
    NotNumeric { raw: String },
    #[error("{value} is outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

/// Parses a typed-in score. Accepts `,` or `.` as the decimal separator and
/// requires the value to sit inside the closed range for `kind`.
pub fn parse_score(raw: &str, kind: ComponentKind) -> Result<f64, ScoreError> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(ScoreError::Empty);
    }
    let value: f64 = t.replace(',', ".").parse().map_err(|_| ScoreError::NotNumeric {
        raw: raw.to_string(),
    })?;
    let (min, max) = kind.bounds();
    // NaN and infinities fail both comparisons.
    if !(value >= min && value <= max) {
        return Err(ScoreError::OutOfRange { value, min, max });
    }
    Ok(value)
}

pub fn is_valid_score(raw: &str, kind: ComponentKind) -> bool {
    parse_score(raw, kind).is_ok()
}

/// Stored scores keep two decimals.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeComponents {
    pub work: Option<f64>,
    pub partial1: Option<f64>,
    pub partial2: Option<f64>,
    pub exam: Option<f64>,
}

impl GradeComponents {
    pub fn is_empty(&self) -> bool {
        self.work.is_none()
            && self.partial1.is_none()
            && self.partial2.is_none()
            && self.exam.is_none()
    }
}

/// Raw text for the four components as the user typed them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawComponents {
    pub work: Option<String>,
    pub partial1: Option<String>,
    pub partial2: Option<String>,
    pub exam: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedComponent {
    pub component: &'static str,
    pub error: ScoreError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedComponents {
    pub values: GradeComponents,
    /// Inputs that were typed in but did not validate. Blank inputs are
    /// simply absent and do not show up here.
    pub rejected: Vec<RejectedComponent>,
}

pub fn validate_components(raw: &RawComponents) -> ValidatedComponents {
    let mut rejected = Vec::new();
    let mut check = |name: &'static str, input: &Option<String>, kind: ComponentKind| {
        let input = input.as_deref()?;
        match parse_score(input, kind) {
            Ok(v) => Some(round_2_decimals(v)),
            Err(ScoreError::Empty) => None,
            Err(error) => {
                rejected.push(RejectedComponent {
                    component: name,
                    error,
                });
                None
            }
        }
    };

    let values = GradeComponents {
        work: check("work", &raw.work, ComponentKind::Work),
        partial1: check("partial1", &raw.partial1, ComponentKind::Partial),
        partial2: check("partial2", &raw.partial2, ComponentKind::Partial),
        exam: check("exam", &raw.exam, ComponentKind::Exam),
    };

    ValidatedComponents { values, rejected }
}

/// Scores are stored with two decimals, so sums and the pass check run on
/// whole hundredths. Summing the raw `f64`s can land a hair above 6.0.
fn hundredths(x: f64) -> i64 {
    (x * 100.0).round() as i64
}

fn final_hundredths(c: &GradeComponents) -> i64 {
    let sum: i64 = [c.work, c.partial1, c.partial2, c.exam]
        .into_iter()
        .flatten()
        .map(hundredths)
        .sum();
    sum.min(hundredths(FINAL_CAP))
}

/// Sum of the components with absent ones counted as zero, capped at 10.
pub fn final_score(c: &GradeComponents) -> f64 {
    final_hundredths(c) as f64 / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GradeStatus {
    Pending,
    Approved,
    Failed,
}

impl GradeStatus {
    /// Label shown in the school's UI.
    pub fn label(self) -> &'static str {
        match self {
            GradeStatus::Pending => "Pendente",
            GradeStatus::Approved => "Aprovado",
            GradeStatus::Failed => "Reprovado",
        }
    }
}

/// Work and exam are mandatory; without both the record stays pending no
/// matter how high the partials push the sum.
pub fn grade_status(c: &GradeComponents) -> GradeStatus {
    if c.work.is_none() || c.exam.is_none() {
        return GradeStatus::Pending;
    }
    if final_hundredths(c) > hundredths(PASS_THRESHOLD) {
        GradeStatus::Approved
    } else {
        GradeStatus::Failed
    }
}

/// One decimal, blank for a zero final.
pub fn display_final(final_score: f64) -> String {
    if final_score > 0.0 {
        format!("{final_score:.1}")
    } else {
        String::new()
    }
}

/// Component cells are blank when absent or zero.
pub fn display_component(value: Option<f64>) -> String {
    match value {
        Some(v) if v != 0.0 => format!("{v}"),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEvaluation {
    pub final_score: f64,
    pub final_display: String,
    pub status: GradeStatus,
    pub status_label: &'static str,
}

pub fn evaluate(c: &GradeComponents) -> GradeEvaluation {
    let final_score = final_score(c);
    let status = grade_status(c);
    GradeEvaluation {
        final_score,
        final_display: display_final(final_score),
        status,
        status_label: status.label(),
    }
}

/// Sum of the per-subject capped finals. Display only.
pub fn student_total<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a GradeComponents>,
{
    let sum: i64 = records.into_iter().map(final_hundredths).sum();
    sum as f64 / 100.0
}

const ABBREVIATION_STOPWORDS: [&str; 6] = ["de", "da", "do", "das", "dos", "e"];

/// Short course tag shown next to a student's name in grade listings,
/// e.g. "Ciência da Computação" -> "Ciê. Computação".
pub fn course_abbreviation(course_name: &str) -> String {
    let words: Vec<&str> = course_name
        .split_whitespace()
        .filter(|w| !ABBREVIATION_STOPWORDS.contains(w))
        .collect();
    let first3 = |w: &str| w.chars().take(3).collect::<String>();
    match words.as_slice() {
        [] => String::new(),
        [only] => first3(only),
        [first, second, ..] => format!("{}. {}", first3(first), second),
    }
}
