use serde_json::json;

use crate::grading::{compute, GradeScale};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::marks::{validate_mark, MarkInput};
use crate::model::ExamSpec;

/// Per-request scale if given, otherwise the configured default.
pub(crate) fn resolve_scale(
    state: &AppState,
    req: &Request,
) -> Result<GradeScale, serde_json::Value> {
    match req.params.get("gradeScale") {
        None => Ok(state.config.grading.scale.clone()),
        Some(v) if v.is_null() => Ok(state.config.grading.scale.clone()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            err(
                &req.id,
                "invalid_grade_scale",
                e.to_string(),
                Some(json!({ "gradeScale": v })),
            )
        }),
    }
}

fn number_param(req: &Request, key: &str) -> Result<Option<f64>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a number", key),
                Some(json!({ key: v })),
            )
        }),
    }
}

/// Builds and validates an exam spec from `totalMarks`/`passingMarks`. Both
/// absent means "look it up"; one without the other is a bad request.
pub(crate) fn spec_from_params(
    req: &Request,
    scale: GradeScale,
) -> Result<Option<ExamSpec>, serde_json::Value> {
    let total = number_param(req, "totalMarks")?;
    let passing = number_param(req, "passingMarks")?;
    let (total, passing) = match (total, passing) {
        (None, None) => return Ok(None),
        (Some(t), Some(p)) => (t, p),
        (Some(_), None) | (None, Some(_)) => {
            let missing = if total.is_none() {
                "totalMarks"
            } else {
                "passingMarks"
            };
            return Err(err(
                &req.id,
                "bad_params",
                "totalMarks and passingMarks must be given together",
                Some(json!({ "missing": missing })),
            ));
        }
    };
    let spec = ExamSpec::new(total, passing, scale);
    spec.validate()
        .map_err(|e| err(&req.id, "invalid_exam_spec", e.to_string(), None))?;
    Ok(Some(spec))
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "apiBaseUrl": state.config.api.base_url,
            "draftsOpen": state.drafts.is_some(),
            "selected": state.selection.len(),
            "publishPhase": state.publish.phase().as_str(),
        }),
    )
}

fn handle_grades_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scale = match resolve_scale(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let spec = match spec_from_params(req, scale) {
        Ok(Some(v)) => v,
        Ok(None) => {
            return err(
                &req.id,
                "bad_params",
                "missing totalMarks/passingMarks",
                None,
            )
        }
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("marks") else {
        return err(&req.id, "bad_params", "missing marks", None);
    };

    let marks = match validate_mark(&MarkInput::from_json(raw), &spec) {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code(), e.to_string(), Some(json!({ "marks": raw }))),
    };
    match compute(marks, &spec) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "marks": marks,
                "grade": outcome.grade,
                "status": outcome.status,
                "percentage": outcome.percentage,
            }),
        ),
        Err(e) => err(&req.id, "division_by_zero", e.to_string(), None),
    }
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.api.list_teacher_exams() {
        Ok(exams) => ok(&req.id, json!({ "exams": exams })),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "grades.compute" => Some(handle_grades_compute(state, req)),
        "exams.list" => Some(handle_exams_list(state, req)),
        _ => None,
    }
}
