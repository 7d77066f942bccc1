use crate::calc::RawComponents;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::store::SortOrder;
use rusqlite::Connection;

pub fn conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or_else(HandlerErr::no_workspace)
}

/// Ids arrive as JSON numbers, or as numeric strings from form fields.
fn as_id(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn required_id(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Err(HandlerErr::bad_params(format!("missing {key}"))),
        Some(v) => {
            as_id(v).ok_or_else(|| HandlerErr::bad_params(format!("{key} must be an integer id")))
        }
    }
}

/// Absent, null and "" all mean "no id".
pub fn optional_id(req: &Request, key: &str) -> Result<Option<i64>, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => as_id(v)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be an integer id"))),
    }
}

pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn sort_order(req: &Request, default: SortOrder) -> Result<SortOrder, HandlerErr> {
    match optional_str(req, "orderBy") {
        None => Ok(default),
        Some(s) => SortOrder::parse(s)
            .ok_or_else(|| HandlerErr::bad_params("orderBy must be 'name' or 'id'")),
    }
}

fn raw_component(v: Option<&serde_json::Value>) -> Option<String> {
    match v? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Score inputs are kept as typed text so the evaluator can report why a
/// value was rejected. Numbers are accepted too.
pub fn raw_components(req: &Request) -> RawComponents {
    RawComponents {
        work: raw_component(req.params.get("work")),
        partial1: raw_component(req.params.get("partial1")),
        partial2: raw_component(req.params.get("partial2")),
        exam: raw_component(req.params.get("exam")),
    }
}
