use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::grading::GradeScale;

/// Mark bounds and grading table for one exam. Supplied by the caller or the
/// backend; the engine never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSpec {
    pub total_marks: f64,
    pub passing_marks: f64,
    #[serde(default)]
    pub grade_scale: GradeScale,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExamSpecError {
    #[error("totalMarks must be a positive number (got {0})")]
    TotalMarks(f64),
    #[error("passingMarks must be within [0, {total}] (got {passing})")]
    PassingMarks { passing: f64, total: f64 },
}

impl ExamSpec {
    pub fn new(total_marks: f64, passing_marks: f64, grade_scale: GradeScale) -> Self {
        Self {
            total_marks,
            passing_marks,
            grade_scale,
        }
    }

    pub fn validate(&self) -> Result<(), ExamSpecError> {
        if !self.total_marks.is_finite() || self.total_marks <= 0.0 {
            return Err(ExamSpecError::TotalMarks(self.total_marks));
        }
        if !self.passing_marks.is_finite()
            || self.passing_marks < 0.0
            || self.passing_marks > self.total_marks
        {
            return Err(ExamSpecError::PassingMarks {
                passing: self.passing_marks,
                total: self.total_marks,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchKey {
    pub class_id: String,
    pub subject_id: String,
    pub exam_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub roll_number: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(" ");
        }
        match self.roll_number.as_deref().map(str::trim) {
            Some(roll) if !roll.is_empty() => format!("Roll {}", roll),
            _ => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exam_type: Option<String>,
    #[serde(default)]
    pub total_marks: Option<f64>,
    #[serde(default)]
    pub passing_marks: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
}

impl Exam {
    /// Only exams that carry both mark bounds can grade drafts.
    pub fn spec(&self, grade_scale: GradeScale) -> Option<ExamSpec> {
        match (self.total_marks, self.passing_marks) {
            (Some(total), Some(passing)) => Some(ExamSpec::new(total, passing, grade_scale)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordStatus {
    Draft,
    Submitted,
    Published,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Draft => "Draft",
            RecordStatus::Submitted => "Submitted",
            RecordStatus::Published => "Published",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(RecordStatus::Draft),
            "submitted" => Some(RecordStatus::Submitted),
            "published" => Some(RecordStatus::Published),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for RecordStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RecordStatus::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown result status: {raw}")))
    }
}

/// Server-side result row. Only `status` is ever changed, and only by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub exam_id: Option<String>,
    #[serde(default)]
    pub marks_obtained: Option<f64>,
    #[serde(default)]
    pub total_marks: Option<f64>,
    #[serde(default)]
    pub grade: Option<String>,
    pub status: RecordStatus,
}

impl ResultRecord {
    pub fn is_publishable(&self) -> bool {
        self.status == RecordStatus::Submitted
    }
}
