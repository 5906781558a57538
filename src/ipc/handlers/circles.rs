use crate::circles::{self, ScheduleSlot};
use crate::error::AppResult;
use crate::ipc::error::respond;
use crate::ipc::helpers::{decode, get_required_str, get_string_list, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::{require_admin, require_caller};

fn circles_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_admin(req.caller.as_ref())?;
    let name = get_required_str(&req.params, "name")?;
    let teacher_id = get_required_str(&req.params, "teacherId")?;
    let schedule: Vec<ScheduleSlot> = match req.params.get("schedule") {
        Some(v) if !v.is_null() => decode(v, "schedule")?,
        _ => Vec::new(),
    };
    let circle = circles::create_circle(conn, &name, &teacher_id, &schedule)?;
    tracing::info!(circle = %circle.id, teacher = %teacher_id, "circle created");
    to_json(&circle)
}

fn circles_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_caller(req.caller.as_ref())?;
    let circle_id = get_required_str(&req.params, "circleId")?;
    to_json(&circles::get_circle(conn, &circle_id)?)
}

fn circles_set_students(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_admin(req.caller.as_ref())?;
    let circle_id = get_required_str(&req.params, "circleId")?;
    let students = get_string_list(&req.params, "studentIds")?;
    to_json(&circles::set_students(conn, &circle_id, &students)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "circles.create" => circles_create(state, req),
        "circles.get" => circles_get(state, req),
        "circles.setStudents" => circles_set_students(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
