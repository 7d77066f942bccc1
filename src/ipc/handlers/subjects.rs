use crate::ipc::error::{ok, respond, HandlerErr};
use crate::ipc::helpers::{conn, required_id, required_str, sort_order};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, SortOrder};
use serde_json::json;

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };
    let result = sort_order(req, SortOrder::Name).and_then(|order| {
        let subjects = store::list_subjects(conn, order)?;
        Ok(json!({ "subjects": subjects }))
    });
    respond(&req.id, result)
}

fn subjects_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject = store::get_subject(conn, required_id(req, "subjectId")?)?;
    Ok(json!({ "subject": subject }))
}

fn subjects_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let name = required_str(req, "name")?;
    let subject_id = store::create_subject(conn, name)?;
    Ok(json!({ "subjectId": subject_id, "name": name.trim() }))
}

fn subjects_update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_id(req, "subjectId")?;
    store::update_subject(conn, subject_id, required_str(req, "name")?)?;
    Ok(json!({ "ok": true }))
}

fn subjects_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let summary = store::delete_subject(conn, required_id(req, "subjectId")?)?;
    Ok(json!({ "ok": true, "removed": summary }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.list" => return Some(handle_subjects_list(state, req)),
        "subjects.get" => subjects_get(state, req),
        "subjects.create" => subjects_create(state, req),
        "subjects.update" => subjects_update(state, req),
        "subjects.delete" => subjects_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
