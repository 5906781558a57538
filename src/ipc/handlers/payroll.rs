use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{get_required_date, get_required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::require_caller;
use crate::payroll;

fn payroll_calculate(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    let caller = require_caller(req.caller.as_ref())?;
    let teacher_id = get_required_str(&req.params, "teacherId")?;
    if !caller.is_admin() && caller.user_id != teacher_id {
        return Err(AppError::Forbidden(
            "payroll is visible to admins and the teacher only".into(),
        ));
    }
    let start = get_required_date(&req.params, "startDate")?;
    let end = get_required_date(&req.params, "endDate")?;
    to_json(&payroll::calculate(conn, &teacher_id, start, end, &state.wages)?)
}

fn payroll_rates(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    to_json(&state.wages)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "payroll.calculate" => payroll_calculate(state, req),
        "payroll.rates" => payroll_rates(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
