//! REST surface. Every route is translated into a router request, so the
//! HTTP and stdio transports share validation, authorization and errors.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::AppError;
use crate::ipc::{handle_request, AppState, Request};
use crate::model::{Caller, Role};

pub type SharedState = Arc<Mutex<AppState>>;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/progress/student/:student_id", get(progress_get))
        .route("/progress/complete-assessment", post(progress_complete))
        .route("/payroll/calculate", post(payroll_calculate))
        .route("/payroll/rates", get(payroll_rates))
        .route(
            "/applications",
            post(applications_submit).get(applications_list),
        )
        .route("/applications/:id/approve", post(applications_approve))
        .route("/applications/:id/reject", post(applications_reject))
        .route("/attendance", post(attendance_record))
        .route("/attendance/:circle_id/:date", get(attendance_get))
        .route("/worklogs", post(worklogs_record).get(worklogs_list))
        .route("/users", post(users_create))
        .route("/sections", post(sections_create).get(sections_list))
        .route("/assessments", post(assessments_create))
        .route("/circles", post(circles_create))
        .route("/circles/:id", get(circles_get))
        .route("/circles/:id/students", put(circles_set_students))
        .with_state(state)
}

pub fn status_for(code: &str) -> StatusCode {
    match code {
        "bad_params" | "precondition_failed" | "db_open_failed" => StatusCode::BAD_REQUEST,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "forbidden" => StatusCode::FORBIDDEN,
        "not_found" | "not_implemented" => StatusCode::NOT_FOUND,
        "conflict" => StatusCode::CONFLICT,
        "no_workspace" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(code: &str, message: &str) -> Response {
    (
        status_for(code),
        Json(json!({ "code": code, "message": message })),
    )
        .into_response()
}

fn caller_from_headers(headers: &HeaderMap) -> Result<Option<Caller>, AppError> {
    let read = |name: &str| -> Result<Option<String>, AppError> {
        match headers.get(name) {
            None => Ok(None),
            Some(v) => v
                .to_str()
                .map(|s| Some(s.trim().to_string()))
                .map_err(|_| AppError::validation(format!("{} header is not valid text", name))),
        }
    };
    match (read(USER_ID_HEADER)?, read(USER_ROLE_HEADER)?) {
        (None, None) => Ok(None),
        (Some(user_id), Some(role)) if !user_id.is_empty() => {
            let role = Role::parse(&role)
                .ok_or_else(|| AppError::validation(format!("unknown role {}", role)))?;
            Ok(Some(Caller { user_id, role }))
        }
        _ => Err(AppError::validation(format!(
            "{} and {} must be sent together",
            USER_ID_HEADER, USER_ROLE_HEADER
        ))),
    }
}

fn into_response(resp: Value) -> Response {
    if resp.get("ok").and_then(|v| v.as_bool()) == Some(true) {
        let result = resp.get("result").cloned().unwrap_or(Value::Null);
        return (StatusCode::OK, Json(result)).into_response();
    }
    let code = resp["error"]["code"].as_str().unwrap_or("internal");
    let message = resp["error"]["message"]
        .as_str()
        .unwrap_or("internal server error");
    error_response(code, message)
}

async fn dispatch(state: SharedState, headers: &HeaderMap, method: &str, params: Value) -> Response {
    let caller = match caller_from_headers(headers) {
        Ok(c) => c,
        Err(e) => return error_response(e.code(), &e.public_message()),
    };
    let req = Request {
        id: Uuid::new_v4().to_string(),
        method: method.to_string(),
        params,
        caller,
    };

    // rusqlite is blocking; keep it off the async workers.
    let joined = tokio::task::spawn_blocking(move || {
        let mut guard = match state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        handle_request(&mut guard, req)
    })
    .await;

    match joined {
        Ok(resp) => into_response(resp),
        Err(e) => {
            tracing::error!(error = %e, method, "request task failed");
            error_response("internal", "internal server error")
        }
    }
}

type JsonBody = Result<Json<Value>, JsonRejection>;

/// Body rejections (bad JSON, wrong content type) use the same error shape as
/// every other failure.
fn json_body(body: JsonBody) -> Result<Value, Response> {
    body.map(|Json(v)| v).map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected request body");
        error_response("bad_params", &rejection.body_text())
    })
}

async fn dispatch_json(
    state: SharedState,
    headers: &HeaderMap,
    method: &str,
    body: JsonBody,
) -> Response {
    match json_body(body) {
        Ok(params) => dispatch(state, headers, method, params).await,
        Err(resp) => resp,
    }
}

fn with_field(body: Value, key: &str, value: impl Into<Value>) -> Value {
    let mut obj = match body {
        Value::Object(m) => m,
        _ => serde_json::Map::new(),
    };
    obj.insert(key.to_string(), value.into());
    Value::Object(obj)
}

fn query_params(q: HashMap<String, String>) -> Value {
    Value::Object(q.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}

async fn health(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    dispatch(state, &headers, "health", json!({})).await
}

async fn progress_get(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(student_id): Path<String>,
) -> Response {
    dispatch(
        state,
        &headers,
        "progress.get",
        json!({ "studentId": student_id }),
    )
    .await
}

async fn progress_complete(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    dispatch_json(state, &headers, "progress.completeAssessment", body).await
}

async fn payroll_calculate(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    dispatch_json(state, &headers, "payroll.calculate", body).await
}

async fn payroll_rates(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    dispatch(state, &headers, "payroll.rates", json!({})).await
}

async fn applications_submit(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    dispatch_json(state, &headers, "applications.submit", body).await
}

async fn applications_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    dispatch(state, &headers, "applications.list", query_params(q)).await
}

async fn applications_approve(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: JsonBody,
) -> Response {
    let body = match json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let params = with_field(body, "applicationId", id);
    dispatch(state, &headers, "applications.approve", params).await
}

async fn applications_reject(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    dispatch(
        state,
        &headers,
        "applications.reject",
        json!({ "applicationId": id }),
    )
    .await
}

async fn attendance_record(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    dispatch_json(state, &headers, "attendance.record", body).await
}

async fn attendance_get(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((circle_id, date)): Path<(String, String)>,
) -> Response {
    dispatch(
        state,
        &headers,
        "attendance.get",
        json!({ "circleId": circle_id, "date": date }),
    )
    .await
}

async fn worklogs_record(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    dispatch_json(state, &headers, "worklogs.record", body).await
}

async fn worklogs_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    dispatch(state, &headers, "worklogs.list", query_params(q)).await
}

async fn users_create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    dispatch_json(state, &headers, "users.create", body).await
}

async fn sections_create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    dispatch_json(state, &headers, "sections.create", body).await
}

async fn sections_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    dispatch(state, &headers, "sections.list", query_params(q)).await
}

async fn assessments_create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    dispatch_json(state, &headers, "assessments.create", body).await
}

async fn circles_create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    dispatch_json(state, &headers, "circles.create", body).await
}

async fn circles_get(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    dispatch(state, &headers, "circles.get", json!({ "circleId": id })).await
}

async fn circles_set_students(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: JsonBody,
) -> Response {
    let body = match json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let params = with_field(body, "circleId", id);
    dispatch(state, &headers, "circles.setStudents", params).await
}
