
use serde_json::json;
use test_support::{
    admit_student, as_teacher, error_code, request_as, request_ok_as, seed_program,
    select_workspace, spawn_sidecar,
};

#[test]
fn passing_advances_and_other_grades_hold() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "school-progress-advance");
    let program = seed_program(&mut stdin, &mut reader, "Reading 7+", 3);
    let ali = admit_student(&mut stdin, &mut reader, "ali", "Reading 7+", "Standard");
    let teacher = Some(as_teacher("teacher-1"));

    let start = request_ok_as(
        &mut stdin,
        &mut reader,
        "1",
        "progress.get",
        json!({ "studentId": ali }),
        teacher.clone(),
    );
    assert_eq!(start["currentSection"]["order"], json!(1));
    assert_eq!(start["completedAssessments"], json!([]));

    let held = request_ok_as(
        &mut stdin,
        &mut reader,
        "2",
        "progress.completeAssessment",
        json!({
            "studentId": ali,
            "sectionId": program[0].0,
            "assessmentId": program[0].1,
            "grade": "Needs Improvement",
            "notes": "review the long vowels"
        }),
        teacher.clone(),
    );
    assert_eq!(held["currentSection"]["order"], json!(1));
    let history = held["completedAssessments"].as_array().expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["grade"], json!("Needs Improvement"));
    assert_eq!(history[0]["notes"], json!("review the long vowels"));

    let advanced = request_ok_as(
        &mut stdin,
        &mut reader,
        "3",
        "progress.completeAssessment",
        json!({
            "studentId": ali,
            "sectionId": program[0].0,
            "assessmentId": program[0].1,
            "grade": "Passed"
        }),
        teacher,
    );
    assert_eq!(advanced["currentSection"]["order"], json!(2));
    assert_eq!(advanced["currentSection"]["id"], json!(program[1].0));
    assert_eq!(advanced["completedAssessments"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(advanced["completedAt"], json!(null));
}

#[test]
fn passing_the_last_section_keeps_the_cursor() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "school-progress-last");
    let program = seed_program(&mut stdin, &mut reader, "Reciting", 1);
    let ali = admit_student(&mut stdin, &mut reader, "ali", "Reciting", "Discount");

    let done = request_ok_as(
        &mut stdin,
        &mut reader,
        "1",
        "progress.completeAssessment",
        json!({
            "studentId": ali,
            "sectionId": program[0].0,
            "assessmentId": program[0].1,
            "grade": "Passed"
        }),
        Some(as_teacher("teacher-1")),
    );
    assert_eq!(done["currentSection"]["id"], json!(program[0].0));
    assert_eq!(done["completedAssessments"].as_array().map(|a| a.len()), Some(1));
    assert!(done["completedAt"].is_string());
}

#[test]
fn unknown_student_and_missing_fields() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "school-progress-errors");
    let program = seed_program(&mut stdin, &mut reader, "Reading 7+", 1);

    let missing = request_as(
        &mut stdin,
        &mut reader,
        "1",
        "progress.completeAssessment",
        json!({
            "studentId": "ghost",
            "sectionId": program[0].0,
            "assessmentId": program[0].1,
            "grade": "Passed"
        }),
        Some(as_teacher("teacher-1")),
    );
    assert_eq!(error_code(&missing), "not_found");

    let no_grade = request_as(
        &mut stdin,
        &mut reader,
        "2",
        "progress.completeAssessment",
        json!({ "studentId": "ghost", "sectionId": program[0].0, "assessmentId": program[0].1 }),
        Some(as_teacher("teacher-1")),
    );
    assert_eq!(error_code(&no_grade), "bad_params");

    let no_progress = request_as(
        &mut stdin,
        &mut reader,
        "3",
        "progress.get",
        json!({ "studentId": "ghost" }),
        Some(as_teacher("teacher-1")),
    );
    assert_eq!(error_code(&no_progress), "not_found");
}
