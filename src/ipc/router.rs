use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::progress::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::payroll::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::admission::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::curriculum::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::circles::try_handle(state, &req) {
        return resp;
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::{Caller, Role};
    use crate::notify::{Notification, Notifier};
    use crate::payroll::WageTable;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, Notification)>>);

    impl Notifier for Recorder {
        fn publish(&self, user_id: &str, notification: Notification) {
            self.0
                .lock()
                .expect("recorder lock")
                .push((user_id.to_string(), notification));
        }
    }

    fn admin() -> Option<Caller> {
        Some(Caller {
            user_id: "admin".into(),
            role: Role::Admin,
        })
    }

    fn call(
        state: &mut AppState,
        method: &str,
        params: serde_json::Value,
        caller: Option<Caller>,
    ) -> serde_json::Value {
        handle_request(
            state,
            Request {
                id: "t".into(),
                method: method.into(),
                params,
                caller,
            },
        )
    }

    fn result(v: serde_json::Value) -> serde_json::Value {
        assert_eq!(v["ok"], json!(true), "unexpected error: {}", v);
        v["result"].clone()
    }

    fn error_code(v: &serde_json::Value) -> &str {
        v["error"]["code"].as_str().unwrap_or("")
    }

    #[test]
    fn methods_need_a_workspace() {
        let mut state = AppState::new(WageTable::default(), Arc::new(Recorder::default()));
        let resp = call(&mut state, "progress.get", json!({ "studentId": "x" }), admin());
        assert_eq!(error_code(&resp), "no_workspace");
        let resp = call(&mut state, "nope.nothing", json!({}), None);
        assert_eq!(error_code(&resp), "not_implemented");
    }

    #[test]
    fn completing_assessments_notifies_the_student() {
        let recorder = Arc::new(Recorder::default());
        let mut state = AppState::new(WageTable::default(), recorder.clone());
        state.db = Some(db::open_in_memory().expect("db"));

        let s1 = result(call(
            &mut state,
            "sections.create",
            json!({ "program": "Reading 7+", "order": 1, "title": "Letters" }),
            admin(),
        ));
        let s2 = result(call(
            &mut state,
            "sections.create",
            json!({ "program": "Reading 7+", "order": 2, "title": "Words" }),
            admin(),
        ));
        let a1 = result(call(
            &mut state,
            "assessments.create",
            json!({ "sectionId": s1["id"], "title": "Letters check" }),
            admin(),
        ));
        let app = result(call(
            &mut state,
            "applications.submit",
            json!({ "fullName": "Ali", "program": "Reading 7+", "priceCategory": "Standard" }),
            None,
        ));
        let adm = result(call(
            &mut state,
            "applications.approve",
            json!({ "applicationId": app["id"], "username": "ali", "password": "secret1" }),
            admin(),
        ));
        let student = adm["userId"].as_str().expect("userId").to_string();

        let teacher = Some(Caller {
            user_id: "t1".into(),
            role: Role::Teacher,
        });
        let updated = result(call(
            &mut state,
            "progress.completeAssessment",
            json!({
                "studentId": student,
                "sectionId": s1["id"],
                "assessmentId": a1["id"],
                "grade": "Passed",
                "notes": "fluent"
            }),
            teacher,
        ));
        assert_eq!(updated["currentSection"]["id"], s2["id"]);
        assert_eq!(updated["completedAssessments"][0]["teacher"], json!("t1"));

        let events: Vec<String> = recorder
            .0
            .lock()
            .expect("lock")
            .iter()
            .filter(|(user, _)| user == &student)
            .map(|(_, n)| n.event.clone())
            .collect();
        assert_eq!(
            events,
            vec![
                "application.approved".to_string(),
                "assessment.completed".to_string(),
                "progress.advanced".to_string()
            ]
        );
    }

    #[test]
    fn students_cannot_record_or_peek() {
        let mut state = AppState::new(WageTable::default(), Arc::new(Recorder::default()));
        state.db = Some(db::open_in_memory().expect("db"));
        let student = Some(Caller {
            user_id: "s1".into(),
            role: Role::Student,
        });
        let resp = call(
            &mut state,
            "progress.completeAssessment",
            json!({ "studentId": "s1", "sectionId": "a", "assessmentId": "b", "grade": "Passed" }),
            student.clone(),
        );
        assert_eq!(error_code(&resp), "forbidden");
        let resp = call(&mut state, "progress.get", json!({ "studentId": "s2" }), student);
        assert_eq!(error_code(&resp), "forbidden");
        let resp = call(&mut state, "progress.get", json!({ "studentId": "s2" }), None);
        assert_eq!(error_code(&resp), "unauthorized");
    }
}
