use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::grading::{compute, DivisionError, Grade, PassStatus};
use crate::marks::{validate_mark, MarkError, MarkInput};
use crate::model::{BatchKey, ExamSpec, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Pending,
    Pass,
    Fail,
}

impl From<PassStatus> for DraftStatus {
    fn from(s: PassStatus) -> Self {
        match s {
            PassStatus::Pass => DraftStatus::Pass,
            PassStatus::Fail => DraftStatus::Fail,
        }
    }
}

/// Unsaved candidate result for one student. Grade, status and percentage only
/// ever change together with a valid `raw_marks`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDraft {
    pub student_id: String,
    pub display_name: String,
    pub raw_marks: Option<f64>,
    pub grade: Option<Grade>,
    pub status: DraftStatus,
    pub percentage: Option<f64>,
    pub remarks: String,
}

impl ResultDraft {
    fn new(student: &Student) -> Self {
        Self {
            student_id: student.id.clone(),
            display_name: student.display_name(),
            raw_marks: None,
            grade: None,
            status: DraftStatus::Pending,
            percentage: None,
            remarks: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DraftError {
    #[error(transparent)]
    Mark(#[from] MarkError),
    #[error("no draft for student {0}")]
    UnknownStudent(String),
    #[error(transparent)]
    Grade(#[from] DivisionError),
}

impl DraftError {
    pub fn code(&self) -> &'static str {
        match self {
            DraftError::Mark(e) => e.code(),
            DraftError::UnknownStudent(_) => "unknown_student",
            DraftError::Grade(_) => "division_by_zero",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("marks have not been entered for {} student(s)", missing.len())]
pub struct IncompleteDraftError {
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionEntry {
    pub student: String,
    pub marks: f64,
    pub grade: Grade,
    pub status: PassStatus,
    pub remarks: String,
    pub subject: String,
    pub class: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSummary {
    pub total: usize,
    pub entered: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub pending_count: usize,
    pub average_percent: Option<f64>,
}

/// Per-student drafts for one (class, subject, exam) batch.
#[derive(Debug, Clone)]
pub struct ResultDraftStore {
    batch: BatchKey,
    spec: ExamSpec,
    order: Vec<String>,
    drafts: HashMap<String, ResultDraft>,
}

impl ResultDraftStore {
    /// Starts a fresh batch. Any previous store is simply dropped by the caller;
    /// there is no merge of old drafts.
    pub fn initialize(batch: BatchKey, spec: ExamSpec, students: &[Student]) -> Self {
        let mut order = Vec::with_capacity(students.len());
        let mut drafts = HashMap::with_capacity(students.len());
        for s in students {
            if drafts.contains_key(&s.id) {
                continue;
            }
            order.push(s.id.clone());
            drafts.insert(s.id.clone(), ResultDraft::new(s));
        }
        debug!(
            class_id = %batch.class_id,
            exam_id = %batch.exam_id,
            students = order.len(),
            "draft batch initialized"
        );
        Self {
            batch,
            spec,
            order,
            drafts,
        }
    }

    pub fn batch(&self) -> &BatchKey {
        &self.batch
    }

    pub fn spec(&self) -> &ExamSpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, student_id: &str) -> Option<&ResultDraft> {
        self.drafts.get(student_id)
    }

    /// Drafts in the order the students were supplied.
    pub fn drafts(&self) -> impl Iterator<Item = &ResultDraft> {
        self.order.iter().filter_map(|id| self.drafts.get(id))
    }

    /// Validates and grades before touching the entry, so a rejected edit leaves
    /// the draft exactly as it was.
    pub fn update_marks(
        &mut self,
        student_id: &str,
        input: &MarkInput,
    ) -> Result<&ResultDraft, DraftError> {
        if !self.drafts.contains_key(student_id) {
            return Err(DraftError::UnknownStudent(student_id.to_string()));
        }
        let marks = validate_mark(input, &self.spec)?;
        let outcome = compute(marks, &self.spec)?;

        let draft = self
            .drafts
            .get_mut(student_id)
            .ok_or_else(|| DraftError::UnknownStudent(student_id.to_string()))?;
        draft.raw_marks = Some(marks);
        draft.grade = Some(outcome.grade);
        draft.status = outcome.status.into();
        draft.percentage = Some(outcome.percentage);
        Ok(draft)
    }

    pub fn update_remarks(
        &mut self,
        student_id: &str,
        text: &str,
    ) -> Result<&ResultDraft, DraftError> {
        let draft = self
            .drafts
            .get_mut(student_id)
            .ok_or_else(|| DraftError::UnknownStudent(student_id.to_string()))?;
        draft.remarks = text.to_string();
        Ok(draft)
    }

    pub fn all_marks_entered(&self) -> bool {
        self.drafts.values().all(|d| d.raw_marks.is_some())
    }

    pub fn missing_marks(&self) -> Vec<String> {
        self.drafts()
            .filter(|d| d.raw_marks.is_none())
            .map(|d| d.student_id.clone())
            .collect()
    }

    pub fn to_submission_payload(&self) -> Result<Vec<SubmissionEntry>, IncompleteDraftError> {
        let missing = self.missing_marks();
        if !missing.is_empty() {
            return Err(IncompleteDraftError { missing });
        }

        let mut out = Vec::with_capacity(self.order.len());
        for d in self.drafts() {
            let (Some(marks), Some(grade)) = (d.raw_marks, d.grade) else {
                return Err(IncompleteDraftError {
                    missing: vec![d.student_id.clone()],
                });
            };
            let status = match d.status {
                DraftStatus::Pass => PassStatus::Pass,
                DraftStatus::Fail => PassStatus::Fail,
                DraftStatus::Pending => {
                    return Err(IncompleteDraftError {
                        missing: vec![d.student_id.clone()],
                    })
                }
            };
            out.push(SubmissionEntry {
                student: d.student_id.clone(),
                marks,
                grade,
                status,
                remarks: d.remarks.clone(),
                subject: self.batch.subject_id.clone(),
                class: self.batch.class_id.clone(),
            });
        }
        Ok(out)
    }

    pub fn summary(&self) -> DraftSummary {
        let mut entered = 0usize;
        let mut pass_count = 0usize;
        let mut fail_count = 0usize;
        let mut sum_percent = 0.0;
        for d in self.drafts.values() {
            match d.status {
                DraftStatus::Pass => pass_count += 1,
                DraftStatus::Fail => fail_count += 1,
                DraftStatus::Pending => {}
            }
            if let Some(p) = d.percentage {
                entered += 1;
                sum_percent += p;
            }
        }
        DraftSummary {
            total: self.order.len(),
            entered,
            pass_count,
            fail_count,
            pending_count: self.order.len() - entered,
            average_percent: if entered > 0 {
                Some(sum_percent / entered as f64)
            } else {
                None
            },
        }
    }
}
