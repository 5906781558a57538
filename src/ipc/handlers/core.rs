use crate::db;
use crate::error::AppError;
use crate::ipc::error::{err, fail, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return fail(&req.id, &AppError::validation("missing params.path"));
    };

    let shown = path.to_string_lossy().to_string();
    match select_workspace(state, path) {
        Ok(path) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => {
            tracing::warn!(error = ?e, workspace = %shown, "workspace open failed");
            err(
                &req.id,
                "db_open_failed",
                format!("{e:#}"),
                Some(json!({ "path": shown })),
            )
        }
    }
}

/// Open (creating if needed) the database under `path` and make it current.
pub fn select_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<PathBuf> {
    let conn = db::open_db(&path)?;
    tracing::info!(workspace = %path.display(), "workspace opened");
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    Ok(path)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
