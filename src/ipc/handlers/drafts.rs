use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::load_batch_context;
use crate::drafts::{DraftError, ResultDraftStore};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::{resolve_scale, spec_from_params};
use crate::ipc::helpers::{required_str, typed_param};
use crate::ipc::types::{AppState, Request};
use crate::marks::{MarkError, MarkInput};
use crate::model::{BatchKey, Exam, Student};

const BULK_UPDATE_MAX_EDITS: usize = 5000;

fn draft_view(store: &ResultDraftStore) -> serde_json::Value {
    json!({
        "batch": store.batch(),
        "spec": store.spec(),
        "drafts": store.drafts().collect::<Vec<_>>(),
        "allMarksEntered": store.all_marks_entered(),
        "summary": store.summary(),
    })
}

fn draft_error_details(student_id: &str, e: &DraftError) -> serde_json::Value {
    match e {
        DraftError::Mark(MarkError::NotANumber { input }) => {
            json!({ "studentId": student_id, "input": input })
        }
        DraftError::Mark(MarkError::OutOfRange { value, total }) => {
            json!({ "studentId": student_id, "value": value, "totalMarks": total })
        }
        _ => json!({ "studentId": student_id }),
    }
}

fn handle_drafts_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let exam_id = match required_str(req, "examId") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let scale = match resolve_scale(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let given_spec = match spec_from_params(req, scale.clone()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let given_students: Option<Vec<Student>> = match typed_param(req, "students") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Switching batches discards the old drafts even if the new one fails to open.
    if let Some(previous) = state.drafts.take() {
        debug!(exam_id = %previous.batch().exam_id, "previous draft batch discarded");
    }

    let api = state.api.as_ref();
    let fetched: Result<(Vec<Student>, Option<Vec<Exam>>), _> = match (&given_students, &given_spec)
    {
        (Some(students), Some(_)) => Ok((students.clone(), None)),
        (Some(students), None) => api.list_teacher_exams().map(|e| (students.clone(), Some(e))),
        (None, Some(_)) => api.list_students_by_class(&class_id).map(|s| (s, None)),
        (None, None) => load_batch_context(api, &class_id).map(|(s, e)| (s, Some(e))),
    };
    let (students, exams) = match fetched {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code(), e.to_string(), None),
    };

    let spec = match (given_spec, exams) {
        (Some(spec), _) => spec,
        (None, Some(exams)) => {
            let Some(exam) = exams.iter().find(|e| e.id == exam_id) else {
                return err(
                    &req.id,
                    "not_found",
                    "exam not found",
                    Some(json!({ "examId": exam_id })),
                );
            };
            let Some(spec) = exam.spec(scale) else {
                return err(
                    &req.id,
                    "invalid_exam_spec",
                    "exam has no totalMarks/passingMarks",
                    Some(json!({ "examId": exam_id })),
                );
            };
            if let Err(e) = spec.validate() {
                return err(&req.id, "invalid_exam_spec", e.to_string(), None);
            }
            spec
        }
        (None, None) => {
            return err(
                &req.id,
                "bad_params",
                "missing totalMarks/passingMarks",
                None,
            )
        }
    };

    let batch = BatchKey {
        class_id,
        subject_id,
        exam_id,
    };
    let store = ResultDraftStore::initialize(batch, spec, &students);
    if store.is_empty() {
        warn!(class_id = %store.batch().class_id, "draft batch opened with no students");
    }
    info!(
        exam_id = %store.batch().exam_id,
        students = store.len(),
        "drafts opened"
    );
    let view = draft_view(&store);
    state.drafts = Some(store);
    ok(&req.id, view)
}

fn handle_drafts_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.drafts.as_ref() else {
        return err(&req.id, "no_drafts", "open a draft batch first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_str()) else {
        return ok(&req.id, draft_view(store));
    };
    match store.get(student_id) {
        Some(draft) => ok(&req.id, json!({ "draft": draft })),
        None => {
            let e = DraftError::UnknownStudent(student_id.to_string());
            err(
                &req.id,
                e.code(),
                e.to_string(),
                Some(draft_error_details(student_id, &e)),
            )
        }
    }
}

fn handle_drafts_update_marks(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.drafts.as_mut() else {
        return err(&req.id, "no_drafts", "open a draft batch first", None);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("marks") else {
        return err(&req.id, "bad_params", "missing marks", None);
    };

    let updated = store
        .update_marks(student_id, &MarkInput::from_json(raw))
        .map(|d| json!(d));
    match updated {
        Ok(draft) => {
            ok(
                &req.id,
                json!({
                    "draft": draft,
                    "allMarksEntered": store.all_marks_entered(),
                }),
            )
        }
        Err(e) => {
            warn!(%student_id, code = e.code(), "marks update rejected");
            err(
                &req.id,
                e.code(),
                e.to_string(),
                Some(draft_error_details(student_id, &e)),
            )
        }
    }
}

fn handle_drafts_bulk_update_marks(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.drafts.as_mut() else {
        return err(&req.id, "no_drafts", "open a draft batch first", None);
    };
    let Some(edits) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing edits[]", None);
    };
    if edits.len() > BULK_UPDATE_MAX_EDITS {
        return err(
            &req.id,
            "bad_params",
            format!(
                "bulk payload exceeds max edits: {} > {}",
                edits.len(),
                BULK_UPDATE_MAX_EDITS
            ),
            None,
        );
    }

    let mut updated: usize = 0;
    let mut errors: Vec<serde_json::Value> = Vec::new();
    for (i, edit) in edits.iter().enumerate() {
        let Some(student_id) = edit.get("studentId").and_then(|v| v.as_str()) else {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": format!("edit at index {} missing studentId", i),
            }));
            continue;
        };
        let raw = edit.get("marks").cloned().unwrap_or(serde_json::Value::Null);
        match store.update_marks(student_id, &MarkInput::from_json(&raw)) {
            Ok(_) => updated += 1,
            Err(e) => errors.push(json!({
                "index": i,
                "studentId": student_id,
                "code": e.code(),
                "message": e.to_string(),
            })),
        }
    }

    ok(
        &req.id,
        json!({
            "updated": updated,
            "rejected": errors.len(),
            "errors": errors,
            "allMarksEntered": store.all_marks_entered(),
        }),
    )
}

fn handle_drafts_update_remarks(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.drafts.as_mut() else {
        return err(&req.id, "no_drafts", "open a draft batch first", None);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let remarks = req
        .params
        .get("remarks")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match store.update_remarks(student_id, remarks) {
        Ok(draft) => ok(&req.id, json!({ "draft": draft })),
        Err(e) => err(
            &req.id,
            e.code(),
            e.to_string(),
            Some(draft_error_details(student_id, &e)),
        ),
    }
}

fn handle_drafts_payload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.drafts.as_ref() else {
        return err(&req.id, "no_drafts", "open a draft batch first", None);
    };
    match store.to_submission_payload() {
        Ok(results) => ok(&req.id, json!({ "results": results })),
        Err(e) => err(
            &req.id,
            "incomplete_draft",
            e.to_string(),
            Some(json!({ "missing": e.missing })),
        ),
    }
}

fn handle_drafts_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.drafts.as_ref() else {
        return err(&req.id, "no_drafts", "open a draft batch first", None);
    };
    let payload = match store.to_submission_payload() {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "incomplete_draft",
                e.to_string(),
                Some(json!({ "missing": e.missing })),
            )
        }
    };
    let exam_id = store.batch().exam_id.clone();

    match state.api.submit_exam_results(&exam_id, &payload) {
        Ok(message) => {
            info!(%exam_id, count = payload.len(), "exam results submitted");
            state.drafts = None;
            ok(
                &req.id,
                json!({
                    "submitted": payload.len(),
                    "examId": exam_id,
                    "message": message,
                }),
            )
        }
        Err(e) => err(&req.id, e.code(), e.to_string(), Some(json!({ "examId": exam_id }))),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "drafts.open" => Some(handle_drafts_open(state, req)),
        "drafts.get" => Some(handle_drafts_get(state, req)),
        "drafts.updateMarks" => Some(handle_drafts_update_marks(state, req)),
        "drafts.bulkUpdateMarks" => Some(handle_drafts_bulk_update_marks(state, req)),
        "drafts.updateRemarks" => Some(handle_drafts_update_remarks(state, req)),
        "drafts.payload" => Some(handle_drafts_payload(state, req)),
        "drafts.submit" => Some(handle_drafts_submit(state, req)),
        _ => None,
    }
}
