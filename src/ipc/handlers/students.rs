use crate::ipc::error::{ok, respond, HandlerErr};
use crate::ipc::helpers::{conn, optional_id, required_id, required_str, sort_order};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, SortOrder};
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    // Roster view lists by id (enrolment order); pickers ask for name order.
    let result = sort_order(req, SortOrder::Id).and_then(|order| {
        let students = store::list_students(conn, order)?;
        Ok(json!({ "students": students }))
    });
    respond(&req.id, result)
}

fn students_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let student = store::get_student(conn, required_id(req, "studentId")?)?;
    Ok(json!({ "student": student }))
}

fn students_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let name = required_str(req, "name")?;
    let course_id = optional_id(req, "courseId")?;
    let student_id = store::create_student(conn, name, course_id)?;
    Ok(json!({ "studentId": student_id, "name": name.trim(), "courseId": course_id }))
}

/// Full replacement of name and course: an absent courseId clears the course.
fn students_update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let student_id = required_id(req, "studentId")?;
    let name = required_str(req, "name")?;
    let course_id = optional_id(req, "courseId")?;
    store::update_student(conn, student_id, name, course_id)?;
    Ok(json!({ "ok": true }))
}

fn students_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let summary = store::delete_student(conn, required_id(req, "studentId")?)?;
    Ok(json!({ "ok": true, "removed": summary }))
}

fn students_subjects(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let student_id = required_id(req, "studentId")?;
    let subjects = store::student_subjects(conn, student_id)?;
    Ok(json!({ "studentId": student_id, "subjects": subjects }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => return Some(handle_students_list(state, req)),
        "students.get" => students_get(state, req),
        "students.create" => students_create(state, req),
        "students.update" => students_update(state, req),
        "students.delete" => students_delete(state, req),
        "students.subjects" => students_subjects(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
