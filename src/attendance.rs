//! Attendance sheets and teacher work logs.
//!
//! Both are keyed by a natural key, `(circle, date)` for attendance and
//! `(teacher, circle, date)` for work logs. Submitting again for the same key
//! replaces the stored record, so there is never more than one row per key.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::circles::authorize_circle_write;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::model::{date_key, now_rfc3339, AttendanceStatus, Caller};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: String,
    pub circle_id: String,
    pub date: String,
    pub recorded_by: String,
    pub records: Vec<AttendanceRecord>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkLog {
    pub id: String,
    pub teacher_id: String,
    pub circle_id: String,
    pub date: String,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub attendees: Vec<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct WorkLogFilter {
    pub teacher_id: Option<String>,
    pub circle_id: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

fn check_members<'a, I>(conn: &Connection, circle_id: &str, ids: I) -> AppResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let members: HashSet<String> = db::circle_student_ids(conn, circle_id)?.into_iter().collect();
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(AppError::validation(format!("student {} listed twice", id)));
        }
        if !members.contains(id) {
            return Err(AppError::validation(format!(
                "student {} is not a member of this circle",
                id
            )));
        }
    }
    Ok(())
}

pub fn record_attendance(
    conn: &Connection,
    caller: &Caller,
    circle_id: &str,
    date: NaiveDate,
    records: &[(String, AttendanceStatus)],
) -> AppResult<Attendance> {
    authorize_circle_write(conn, circle_id, caller)?;
    check_members(conn, circle_id, records.iter().map(|(id, _)| id.as_str()))?;

    let date = date_key(date);
    let now = now_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO attendance(id, circle_id, date, recorded_by, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(circle_id, date) DO UPDATE SET
           recorded_by = excluded.recorded_by,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            circle_id,
            &date,
            &caller.user_id,
            &now,
        ),
    )?;
    let attendance_id: String = tx.query_row(
        "SELECT id FROM attendance WHERE circle_id = ? AND date = ?",
        (circle_id, &date),
        |r| r.get(0),
    )?;
    tx.execute(
        "DELETE FROM attendance_records WHERE attendance_id = ?",
        [&attendance_id],
    )?;
    for (student_id, status) in records {
        tx.execute(
            "INSERT INTO attendance_records(attendance_id, student_id, status) VALUES(?, ?, ?)",
            (&attendance_id, student_id, status.as_str()),
        )?;
    }
    tx.commit()?;

    tracing::info!(circle = circle_id, date = %date, records = records.len(), "attendance recorded");
    get_attendance(conn, circle_id, &date)?.ok_or_else(|| {
        AppError::Internal("attendance vanished after upsert".into())
    })
}

pub fn get_attendance(conn: &Connection, circle_id: &str, date: &str) -> AppResult<Option<Attendance>> {
    let head: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, recorded_by, updated_at FROM attendance WHERE circle_id = ? AND date = ?",
            (circle_id, date),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((id, recorded_by, updated_at)) = head else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT student_id, status FROM attendance_records WHERE attendance_id = ? ORDER BY student_id",
    )?;
    let records = stmt
        .query_map([&id], |r| {
            Ok(AttendanceRecord {
                student_id: r.get(0)?,
                status: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(Attendance {
        id,
        circle_id: circle_id.to_string(),
        date: date.to_string(),
        recorded_by,
        records,
        updated_at,
    }))
}

/// The log is attributed to the circle's teacher, also when an admin
/// submits it on their behalf.
pub fn record_work_log(
    conn: &Connection,
    caller: &Caller,
    circle_id: &str,
    date: NaiveDate,
    duration: f64,
    notes: Option<&str>,
    attendees: &[String],
) -> AppResult<WorkLog> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(AppError::validation("duration must be a positive number of hours"));
    }
    let teacher_id = authorize_circle_write(conn, circle_id, caller)?;
    check_members(conn, circle_id, attendees.iter().map(|s| s.as_str()))?;

    let date = date_key(date);
    let now = now_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO work_logs(id, teacher_id, circle_id, date, duration, notes, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(teacher_id, circle_id, date) DO UPDATE SET
           duration = excluded.duration,
           notes = excluded.notes,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            &teacher_id,
            circle_id,
            &date,
            duration,
            notes,
            &now,
        ),
    )?;
    let log_id: String = tx.query_row(
        "SELECT id FROM work_logs WHERE teacher_id = ? AND circle_id = ? AND date = ?",
        (&teacher_id, circle_id, &date),
        |r| r.get(0),
    )?;
    tx.execute("DELETE FROM work_log_attendees WHERE work_log_id = ?", [&log_id])?;
    for student_id in attendees {
        tx.execute(
            "INSERT INTO work_log_attendees(work_log_id, student_id) VALUES(?, ?)",
            (&log_id, student_id),
        )?;
    }
    tx.commit()?;

    tracing::info!(
        teacher = %teacher_id,
        circle = circle_id,
        date = %date,
        duration,
        attendees = attendees.len(),
        "work log recorded"
    );
    Ok(WorkLog {
        id: log_id,
        teacher_id,
        circle_id: circle_id.to_string(),
        date,
        duration,
        notes: notes.map(|s| s.to_string()),
        attendees: {
            let mut a = attendees.to_vec();
            a.sort();
            a
        },
        updated_at: now,
    })
}

pub fn list_work_logs(conn: &Connection, filter: &WorkLogFilter) -> AppResult<Vec<WorkLog>> {
    let start = filter.start.map(date_key);
    let end = filter.end.map(date_key);
    let mut stmt = conn.prepare(
        "SELECT id, teacher_id, circle_id, date, duration, notes, updated_at
         FROM work_logs
         WHERE (?1 IS NULL OR teacher_id = ?1)
           AND (?2 IS NULL OR circle_id = ?2)
           AND (?3 IS NULL OR date >= ?3)
           AND (?4 IS NULL OR date <= ?4)
         ORDER BY date, circle_id",
    )?;
    let mut logs = stmt
        .query_map((&filter.teacher_id, &filter.circle_id, &start, &end), |r| {
            Ok(WorkLog {
                id: r.get(0)?,
                teacher_id: r.get(1)?,
                circle_id: r.get(2)?,
                date: r.get(3)?,
                duration: r.get(4)?,
                notes: r.get(5)?,
                attendees: Vec::new(),
                updated_at: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut att_stmt = conn.prepare(
        "SELECT student_id FROM work_log_attendees WHERE work_log_id = ? ORDER BY student_id",
    )?;
    for log in logs.iter_mut() {
        log.attendees = att_stmt
            .query_map([&log.id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
    }
    Ok(logs)
}
