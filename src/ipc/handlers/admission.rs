use serde_json::json;

use crate::admission::{self, ApplicantDetails};
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{decode, get_optional_str, get_raw_str, get_required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::{require_admin, ApplicationStatus, Role};
use crate::notify::Notification;

fn applications_submit(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    let details: ApplicantDetails = decode(&req.params, "application")?;
    let app = admission::submit_application(conn, &details)?;
    tracing::info!(application = %app.id, program = %app.details.program, "application submitted");
    to_json(&app)
}

fn applications_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_admin(req.caller.as_ref())?;
    let status = match get_optional_str(&req.params, "status")? {
        Some(raw) => Some(ApplicationStatus::parse(&raw).ok_or_else(|| {
            AppError::validation("status must be Pending, Approved or Rejected")
        })?),
        None => None,
    };
    let apps = admission::list_applications(conn, status)?;
    Ok(json!({ "applications": to_json(&apps)? }))
}

fn applications_approve(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_admin(req.caller.as_ref())?;
    let application_id = get_required_str(&req.params, "applicationId")?;
    let username = get_required_str(&req.params, "username")?;
    let password = get_raw_str(&req.params, "password")?;
    let adm = admission::approve_application(conn, &application_id, &username, &password)?;

    state.notifier.publish(
        &adm.user_id,
        Notification::new(
            "application.approved",
            json!({ "program": adm.program, "username": adm.username }),
        ),
    );
    let mut out = to_json(&adm)?;
    out["message"] = json!("application approved");
    Ok(out)
}

fn applications_reject(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_admin(req.caller.as_ref())?;
    let application_id = get_required_str(&req.params, "applicationId")?;
    to_json(&admission::reject_application(conn, &application_id)?)
}

fn users_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    require_admin(req.caller.as_ref())?;
    let username = get_required_str(&req.params, "username")?;
    let password = get_raw_str(&req.params, "password")?;
    let full_name = get_required_str(&req.params, "fullName")?;
    let role_raw = get_required_str(&req.params, "role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| AppError::validation("role must be Student, Teacher, Admin or Parent"))?;
    let user_id = admission::create_user(conn, &username, &password, &full_name, role)?;
    Ok(json!({
        "userId": user_id,
        "username": username,
        "fullName": full_name,
        "role": role.as_str(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "applications.submit" => applications_submit(state, req),
        "applications.list" => applications_list(state, req),
        "applications.approve" => applications_approve(state, req),
        "applications.reject" => applications_reject(state, req),
        "users.create" => users_create(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
