use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{get_optional_str, get_required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::{require_caller, Role};
use crate::notify::Notification;
use crate::progress::{self, AssessmentSubmission};

fn progress_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    let caller = require_caller(req.caller.as_ref())?;
    let student_id = get_required_str(&req.params, "studentId")?;
    if caller.role == Role::Student && caller.user_id != student_id {
        return Err(AppError::Forbidden(
            "students may only view their own progress".into(),
        ));
    }
    to_json(&progress::get_progress(conn, &student_id)?)
}

fn progress_complete_assessment(
    state: &mut AppState,
    req: &Request,
) -> AppResult<serde_json::Value> {
    let conn = state.conn()?;
    let caller = require_caller(req.caller.as_ref())?;
    if !matches!(caller.role, Role::Teacher | Role::Admin) {
        return Err(AppError::Forbidden(
            "only teachers and admins may record assessments".into(),
        ));
    }
    let sub = AssessmentSubmission {
        student_id: get_required_str(&req.params, "studentId")?,
        section_id: get_required_str(&req.params, "sectionId")?,
        assessment_id: get_required_str(&req.params, "assessmentId")?,
        grade: get_required_str(&req.params, "grade")?,
        notes: get_optional_str(&req.params, "notes")?,
    };
    let outcome = progress::complete_assessment(conn, &sub, &caller.user_id)?;

    let p = &outcome.progress;
    state.notifier.publish(
        &sub.student_id,
        Notification::new(
            "assessment.completed",
            json!({
                "sectionId": sub.section_id,
                "assessmentId": sub.assessment_id,
                "grade": sub.grade,
            }),
        ),
    );
    if outcome.advanced {
        state.notifier.publish(
            &sub.student_id,
            Notification::new(
                "progress.advanced",
                json!({
                    "sectionId": p.current_section.id,
                    "order": p.current_section.order,
                    "title": p.current_section.title,
                }),
            ),
        );
    }
    if outcome.program_completed {
        state.notifier.publish(
            &sub.student_id,
            Notification::new("program.completed", json!({ "program": p.program })),
        );
    }
    to_json(p)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "progress.get" => progress_get(state, req),
        "progress.completeAssessment" => progress_complete_assessment(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
