use serde::Deserialize;
use serde_json::json;

use crate::attendance::{self, WorkLogFilter};
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{
    decode, get_optional_date, get_optional_str, get_required_date, get_required_f64,
    get_required_str, get_string_list, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{date_key, require_caller, AttendanceStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordIn {
    student_id: String,
    status: String,
}

fn attendance_record(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    let caller = require_caller(req.caller.as_ref())?;
    let circle_id = get_required_str(&req.params, "circleId")?;
    let date = get_required_date(&req.params, "date")?;
    let raw: Vec<RecordIn> = match req.params.get("records") {
        Some(v) => decode(v, "records")?,
        None => return Err(AppError::validation("missing records")),
    };
    let mut records = Vec::with_capacity(raw.len());
    for r in raw {
        let status = AttendanceStatus::parse(&r.status).ok_or_else(|| {
            AppError::validation(format!(
                "status for {} must be Present, Absent, Late or Excused",
                r.student_id
            ))
        })?;
        records.push((r.student_id, status));
    }
    to_json(&attendance::record_attendance(
        conn, caller, &circle_id, date, &records,
    )?)
}

fn attendance_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_caller(req.caller.as_ref())?;
    let circle_id = get_required_str(&req.params, "circleId")?;
    let date = date_key(get_required_date(&req.params, "date")?);
    match attendance::get_attendance(conn, &circle_id, &date)? {
        Some(a) => to_json(&a),
        None => Err(AppError::not_found("attendance")),
    }
}

fn worklogs_record(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    let caller = require_caller(req.caller.as_ref())?;
    let circle_id = get_required_str(&req.params, "circleId")?;
    let date = get_required_date(&req.params, "date")?;
    let duration = get_required_f64(&req.params, "duration")?;
    let notes = get_optional_str(&req.params, "notes")?;
    let attendees = get_string_list(&req.params, "attendees")?;
    to_json(&attendance::record_work_log(
        conn,
        caller,
        &circle_id,
        date,
        duration,
        notes.as_deref(),
        &attendees,
    )?)
}

fn worklogs_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    let caller = require_caller(req.caller.as_ref())?;
    let mut filter = WorkLogFilter {
        teacher_id: get_optional_str(&req.params, "teacherId")?,
        circle_id: get_optional_str(&req.params, "circleId")?,
        start: get_optional_date(&req.params, "startDate")?,
        end: get_optional_date(&req.params, "endDate")?,
    };
    // Teachers only see their own logs.
    if !caller.is_admin() {
        if filter
            .teacher_id
            .as_deref()
            .is_some_and(|t| t != caller.user_id)
        {
            return Err(AppError::Forbidden("cannot list another teacher's logs".into()));
        }
        filter.teacher_id = Some(caller.user_id.clone());
    }
    let logs = attendance::list_work_logs(conn, &filter)?;
    Ok(json!({ "workLogs": to_json(&logs)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.record" => attendance_record(state, req),
        "attendance.get" => attendance_get(state, req),
        "worklogs.record" => worklogs_record(state, req),
        "worklogs.list" => worklogs_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
