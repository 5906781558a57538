use serde_json::json;

use crate::curriculum;
use crate::error::AppResult;
use crate::ipc::error::respond;
use crate::ipc::helpers::{get_optional_str, get_required_i64, get_required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::require_admin;

fn sections_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_admin(req.caller.as_ref())?;
    let program = get_required_str(&req.params, "program")?;
    let order = get_required_i64(&req.params, "order")?;
    let title = get_required_str(&req.params, "title")?;
    let description = get_optional_str(&req.params, "description")?;
    to_json(&curriculum::create_section(
        conn,
        &program,
        order,
        &title,
        description.as_deref(),
    )?)
}

fn sections_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    let program = get_required_str(&req.params, "program")?;
    let sections = curriculum::list_sections(conn, &program)?;
    Ok(json!({ "program": program, "sections": to_json(&sections)? }))
}

fn assessments_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_admin(req.caller.as_ref())?;
    let section_id = get_required_str(&req.params, "sectionId")?;
    let title = get_required_str(&req.params, "title")?;
    let description = get_optional_str(&req.params, "description")?;
    to_json(&curriculum::create_assessment(
        conn,
        &section_id,
        &title,
        description.as_deref(),
    )?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sections.create" => sections_create(state, req),
        "sections.list" => sections_list(state, req),
        "assessments.create" => assessments_create(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
