use crate::ipc::error::{ok, respond, HandlerErr};
use crate::ipc::helpers::{conn, optional_str, required_id, required_str, sort_order};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, SortOrder};
use serde_json::json;

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };
    let result = sort_order(req, SortOrder::Name).and_then(|order| {
        let courses = store::list_courses(conn, order)?;
        Ok(json!({ "courses": courses }))
    });
    respond(&req.id, result)
}

fn courses_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let course_id = required_id(req, "courseId")?;
    let course = store::get_course(conn, course_id)?;
    Ok(json!({ "course": course }))
}

fn courses_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let name = required_str(req, "name")?;
    let course_id = store::create_course(conn, name)?;
    Ok(json!({ "courseId": course_id, "name": name.trim() }))
}

fn courses_update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let course_id = required_id(req, "courseId")?;
    let name = required_str(req, "name")?;
    store::update_course(conn, course_id, name)?;
    Ok(json!({ "ok": true }))
}

fn courses_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let course_id = required_id(req, "courseId")?;
    let summary = store::delete_course(conn, course_id)?;
    Ok(json!({ "ok": true, "removed": summary }))
}

fn courses_subjects(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let course_id = required_id(req, "courseId")?;
    let subjects = store::course_subjects(conn, course_id, optional_str(req, "search"))?;
    Ok(json!({ "courseId": course_id, "subjects": subjects }))
}

fn courses_link_subject(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let course_id = required_id(req, "courseId")?;
    let subject_id = required_id(req, "subjectId")?;
    let linked = store::link_course_subject(conn, course_id, subject_id)?;
    Ok(json!({ "ok": true, "changed": linked }))
}

fn courses_unlink_subject(
    state: &AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let course_id = required_id(req, "courseId")?;
    let subject_id = required_id(req, "subjectId")?;
    let removed = store::unlink_course_subject(conn, course_id, subject_id)?;
    Ok(json!({ "ok": true, "changed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.list" => return Some(handle_courses_list(state, req)),
        "courses.get" => courses_get(state, req),
        "courses.create" => courses_create(state, req),
        "courses.update" => courses_update(state, req),
        "courses.delete" => courses_delete(state, req),
        "courses.subjects" => courses_subjects(state, req),
        "courses.linkSubject" => courses_link_subject(state, req),
        "courses.unlinkSubject" => courses_unlink_subject(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
