//! Curriculum master data: programs are ordered chains of sections, and each
//! section carries at most one assessment.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub program: String,
    pub order: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub section_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

const SECTION_COLUMNS: &str = "id, program, sort_order, title, description";

fn section_from_row(r: &Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: r.get(0)?,
        program: r.get(1)?,
        order: r.get(2)?,
        title: r.get(3)?,
        description: r.get(4)?,
    })
}

pub fn create_section(
    conn: &Connection,
    program: &str,
    order: i64,
    title: &str,
    description: Option<&str>,
) -> AppResult<Section> {
    let program = program.trim();
    let title = title.trim();
    if program.is_empty() {
        return Err(AppError::validation("program must not be empty"));
    }
    if title.is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }
    if order < 1 {
        return Err(AppError::validation("order must be >= 1"));
    }

    let section = Section {
        id: Uuid::new_v4().to_string(),
        program: program.to_string(),
        order,
        title: title.to_string(),
        description: description.map(|s| s.to_string()),
    };
    conn.execute(
        "INSERT INTO sections(id, program, sort_order, title, description) VALUES(?, ?, ?, ?, ?)",
        (
            &section.id,
            &section.program,
            section.order,
            &section.title,
            &section.description,
        ),
    )?;
    Ok(section)
}

pub fn list_sections(conn: &Connection, program: &str) -> AppResult<Vec<Section>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM sections WHERE program = ? ORDER BY sort_order",
        SECTION_COLUMNS
    ))?;
    let rows = stmt
        .query_map([program], section_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_section(conn: &Connection, section_id: &str) -> AppResult<Option<Section>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM sections WHERE id = ?", SECTION_COLUMNS),
            [section_id],
            section_from_row,
        )
        .optional()?)
}

/// Section at a given position of a program, if one is defined.
pub fn section_at(conn: &Connection, program: &str, order: i64) -> AppResult<Option<Section>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM sections WHERE program = ? AND sort_order = ?",
                SECTION_COLUMNS
            ),
            (program, order),
            section_from_row,
        )
        .optional()?)
}

pub fn first_section(conn: &Connection, program: &str) -> AppResult<Option<Section>> {
    section_at(conn, program, 1)
}

pub fn create_assessment(
    conn: &Connection,
    section_id: &str,
    title: &str,
    description: Option<&str>,
) -> AppResult<Assessment> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }
    if get_section(conn, section_id)?.is_none() {
        return Err(AppError::not_found("section"));
    }

    let assessment = Assessment {
        id: Uuid::new_v4().to_string(),
        section_id: section_id.to_string(),
        title: title.to_string(),
        description: description.map(|s| s.to_string()),
    };
    // UNIQUE(section_id) turns a second assessment for the section into a
    // validation error.
    conn.execute(
        "INSERT INTO assessments(id, section_id, title, description) VALUES(?, ?, ?, ?)",
        (
            &assessment.id,
            &assessment.section_id,
            &assessment.title,
            &assessment.description,
        ),
    )?;
    Ok(assessment)
}

pub fn get_assessment(conn: &Connection, assessment_id: &str) -> AppResult<Option<Assessment>> {
    Ok(conn
        .query_row(
            "SELECT id, section_id, title, description FROM assessments WHERE id = ?",
            [assessment_id],
            |r| {
                Ok(Assessment {
                    id: r.get(0)?,
                    section_id: r.get(1)?,
                    title: r.get(2)?,
                    description: r.get(3)?,
                })
            },
        )
        .optional()?)
}
