use crate::calc::{self, ComponentKind};
use crate::ipc::error::{ok, respond, HandlerErr};
use crate::ipc::helpers::{conn, optional_str, raw_components, required_id};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, GradeFilter};
use serde_json::json;

/// Dry run of a save: what would be stored and how it would be graded.
/// Needs no workspace.
fn grades_validate(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let raw = raw_components(req);
    let valid = |v: &Option<String>, kind: ComponentKind| {
        v.as_deref().is_some_and(|s| calc::is_valid_score(s, kind))
    };
    let validated = calc::validate_components(&raw);
    let evaluation = calc::evaluate(&validated.values);
    Ok(json!({
        "canSave": !validated.values.is_empty(),
        "valid": {
            "work": valid(&raw.work, ComponentKind::Work),
            "partial1": valid(&raw.partial1, ComponentKind::Partial),
            "partial2": valid(&raw.partial2, ComponentKind::Partial),
            "exam": valid(&raw.exam, ComponentKind::Exam),
        },
        "components": validated.values,
        "rejected": validated.rejected,
        "evaluation": evaluation,
    }))
}

fn grades_save(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let student_id = required_id(req, "studentId")?;
    let subject_id = required_id(req, "subjectId")?;
    let outcome = store::save_grade(conn, student_id, subject_id, &raw_components(req))?;
    if !outcome.rejected.is_empty() {
        tracing::debug!(
            student_id,
            subject_id,
            rejected = outcome.rejected.len(),
            "grade saved with ignored inputs"
        );
    }
    Ok(json!(outcome))
}

fn grades_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let student_id = required_id(req, "studentId")?;
    let subject_id = required_id(req, "subjectId")?;
    let grade = store::get_grade(conn, student_id, subject_id)?;
    let evaluation = grade.as_ref().map(|g| calc::evaluate(&g.components));
    Ok(json!({ "grade": grade, "evaluation": evaluation }))
}

fn grades_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let student_id = required_id(req, "studentId")?;
    let subject_id = required_id(req, "subjectId")?;
    let removed = store::delete_grade(conn, student_id, subject_id)?;
    Ok(json!({ "ok": true, "removed": removed }))
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    let filter = GradeFilter {
        name_contains: optional_str(req, "nameContains").map(str::to_string),
        course_name: optional_str(req, "courseName").map(str::to_string),
    };
    let result = store::list_grades(conn, &filter)
        .map(|students| json!({ "students": students }))
        .map_err(HandlerErr::from);
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.list" => return Some(handle_grades_list(state, req)),
        "grades.validate" => grades_validate(req),
        "grades.save" => grades_save(state, req),
        "grades.get" => grades_get(state, req),
        "grades.delete" => grades_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
