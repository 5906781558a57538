//! Student progression through a program.
//!
//! Each student has a single progress row whose `current_section_id` is a
//! cursor on the program's ordered sections. Recording an assessment always
//! appends to the history; a `Passed` grade moves the cursor to the section
//! with the next `order`, when there is one.

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::curriculum::{self, Section};
use crate::error::{AppError, AppResult};
use crate::model::{now_rfc3339, GRADE_PASSED};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedAssessment {
    pub section: String,
    pub assessment: String,
    pub teacher: String,
    pub grade: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub assessment_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub id: String,
    pub student: String,
    pub program: String,
    pub current_section: Section,
    pub completed_assessments: Vec<CompletedAssessment>,
    pub version: i64,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct AssessmentSubmission {
    pub student_id: String,
    pub section_id: String,
    pub assessment_id: String,
    pub grade: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub progress: StudentProgress,
    pub advanced: bool,
    pub program_completed: bool,
}

struct ProgressRow {
    id: String,
    program: String,
    current_section_id: String,
    version: i64,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn load_row(conn: &Connection, student_id: &str) -> AppResult<Option<ProgressRow>> {
    Ok(conn
        .query_row(
            "SELECT id, program, current_section_id, version, completed_at, created_at, updated_at
             FROM student_progress
             WHERE student_id = ?",
            [student_id],
            |r| {
                Ok(ProgressRow {
                    id: r.get(0)?,
                    program: r.get(1)?,
                    current_section_id: r.get(2)?,
                    version: r.get(3)?,
                    completed_at: r.get(4)?,
                    created_at: r.get(5)?,
                    updated_at: r.get(6)?,
                })
            },
        )
        .optional()?)
}

fn load_history(conn: &Connection, progress_id: &str) -> AppResult<Vec<CompletedAssessment>> {
    let mut stmt = conn.prepare(
        "SELECT section_id, assessment_id, teacher_id, grade, notes, assessment_date
         FROM completed_assessments
         WHERE progress_id = ?
         ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([progress_id], |r| {
            Ok(CompletedAssessment {
                section: r.get(0)?,
                assessment: r.get(1)?,
                teacher: r.get(2)?,
                grade: r.get(3)?,
                notes: r.get(4)?,
                assessment_date: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn current_section(conn: &Connection, row: &ProgressRow) -> AppResult<Section> {
    curriculum::get_section(conn, &row.current_section_id)?.ok_or_else(|| {
        AppError::Internal(format!(
            "progress {} points at missing section {}",
            row.id, row.current_section_id
        ))
    })
}

pub fn get_progress(conn: &Connection, student_id: &str) -> AppResult<StudentProgress> {
    let row = load_row(conn, student_id)?.ok_or_else(|| AppError::not_found("student progress"))?;
    let section = current_section(conn, &row)?;
    let history = load_history(conn, &row.id)?;
    Ok(StudentProgress {
        id: row.id,
        student: student_id.to_string(),
        program: row.program,
        current_section: section,
        completed_assessments: history,
        version: row.version,
        completed_at: row.completed_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Create the progress row for a newly admitted student. Callers run this
/// inside their own transaction.
pub fn seed_progress(
    conn: &Connection,
    student_id: &str,
    program: &str,
    first_section_id: &str,
) -> AppResult<String> {
    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO student_progress(
            id, student_id, program, current_section_id, version, completed_at, created_at, updated_at
         ) VALUES(?, ?, ?, ?, 0, NULL, ?, ?)",
        (&id, student_id, program, first_section_id, &now, &now),
    )?;
    Ok(id)
}

/// Write the cursor only if the row is still at `expected_version`. Another
/// connection on the same workspace file may have moved it since it was read.
fn store_cursor(
    conn: &Connection,
    progress_id: &str,
    expected_version: i64,
    cursor: &str,
    completed_at: Option<&str>,
    now: &str,
) -> AppResult<()> {
    let changed = conn.execute(
        "UPDATE student_progress
         SET current_section_id = ?, completed_at = ?, version = version + 1, updated_at = ?
         WHERE id = ? AND version = ?",
        (cursor, completed_at, now, progress_id, expected_version),
    )?;
    if changed == 0 {
        return Err(AppError::Conflict(
            "progress was modified concurrently; retry".into(),
        ));
    }
    Ok(())
}

pub fn complete_assessment(
    conn: &Connection,
    sub: &AssessmentSubmission,
    teacher_id: &str,
) -> AppResult<CompletionOutcome> {
    let grade = sub.grade.trim();
    if grade.is_empty() {
        return Err(AppError::validation("grade must not be empty"));
    }

    let tx = conn.unchecked_transaction()?;

    let row = load_row(&tx, &sub.student_id)?
        .ok_or_else(|| AppError::not_found("student progress"))?;
    let section = curriculum::get_section(&tx, &sub.section_id)?
        .ok_or_else(|| AppError::not_found("section"))?;
    if section.program != row.program {
        return Err(AppError::validation(format!(
            "section belongs to {}, student is enrolled in {}",
            section.program, row.program
        )));
    }
    let assessment = curriculum::get_assessment(&tx, &sub.assessment_id)?
        .ok_or_else(|| AppError::not_found("assessment"))?;
    if assessment.section_id != sub.section_id {
        return Err(AppError::validation(
            "assessment does not belong to the given section",
        ));
    }

    let now = now_rfc3339();
    let seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM completed_assessments WHERE progress_id = ?",
        [&row.id],
        |r| r.get(0),
    )?;
    tx.execute(
        "INSERT INTO completed_assessments(
            id, progress_id, seq, section_id, assessment_id, teacher_id, grade, notes, assessment_date
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &row.id,
            seq,
            &sub.section_id,
            &sub.assessment_id,
            teacher_id,
            grade,
            &sub.notes,
            &now,
        ),
    )?;

    let mut next_cursor = row.current_section_id.clone();
    let mut completed_at = row.completed_at.clone();
    let mut advanced = false;
    let mut program_completed = false;
    if grade == GRADE_PASSED {
        let current = current_section(&tx, &row)?;
        match curriculum::section_at(&tx, &row.program, current.order + 1)? {
            Some(next) => {
                next_cursor = next.id;
                advanced = true;
            }
            None => {
                program_completed = true;
                if completed_at.is_none() {
                    completed_at = Some(now.clone());
                }
            }
        }
    }

    store_cursor(
        &tx,
        &row.id,
        row.version,
        &next_cursor,
        completed_at.as_deref(),
        &now,
    )?;
    tx.commit()?;

    tracing::info!(
        student = %sub.student_id,
        grade,
        advanced,
        program_completed,
        "assessment recorded"
    );

    Ok(CompletionOutcome {
        progress: get_progress(conn, &sub.student_id)?,
        advanced,
        program_completed,
    })
}
