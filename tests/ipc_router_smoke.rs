
use serde_json::json;
use test_support::{admin, request, request_as, spawn_sidecar, temp_dir};

const METHODS: &[&str] = &[
    "progress.get",
    "progress.completeAssessment",
    "payroll.calculate",
    "payroll.rates",
    "applications.submit",
    "applications.list",
    "applications.approve",
    "applications.reject",
    "users.create",
    "attendance.record",
    "attendance.get",
    "worklogs.record",
    "worklogs.list",
    "sections.create",
    "sections.list",
    "assessments.create",
    "circles.create",
    "circles.get",
    "circles.setStudents",
];

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("school-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert_eq!(health["result"]["workspacePath"], json!(null));

    // Before a workspace is selected every data method reports it.
    let early = request_as(
        &mut stdin,
        &mut reader,
        "2",
        "sections.list",
        json!({ "program": "Reading 7+" }),
        Some(admin()),
    );
    assert_eq!(early["error"]["code"], json!("no_workspace"));

    let selected = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], json!(true));
    assert!(workspace.join("school.sqlite3").exists());

    for (n, method) in METHODS.iter().enumerate() {
        let id = format!("m{}", n);
        let resp = request_as(&mut stdin, &mut reader, &id, method, json!({}), Some(admin()));
        if resp["ok"] == json!(false) {
            assert_ne!(
                resp["error"]["code"],
                json!("not_implemented"),
                "unexpected unknown method for {}",
                method
            );
        }
    }

    let unknown = request(&mut stdin, &mut reader, "9", "grades.export", json!({}));
    assert_eq!(unknown["error"]["code"], json!("not_implemented"));
}

#[test]
fn malformed_lines_do_not_stop_the_loop() {
    use std::io::{BufRead, Write};

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(v["error"]["code"], json!("bad_json"));

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
}

#[test]
fn unusable_workspace_path_reports_db_open_failed() {
    let dir = temp_dir("school-bad-workspace");
    let blocker = dir.join("not-a-dir");
    std::fs::write(&blocker, b"occupied").expect("write file");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": blocker.to_string_lossy() }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("db_open_failed"));
    let message = resp["error"]["message"].as_str().unwrap_or("");
    assert!(message.contains("creating workspace"), "{}", message);
    assert_eq!(resp["error"]["details"]["path"], json!(blocker.to_string_lossy()));

    let health = request(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_eq!(health["result"]["workspacePath"], json!(null));
}
