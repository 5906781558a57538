use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::model::{now_rfc3339, Caller, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    pub id: String,
    pub name: String,
    pub teacher: String,
    pub students: Vec<String>,
    pub schedule: Vec<ScheduleSlot>,
}

const DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

fn validate_schedule(schedule: &[ScheduleSlot]) -> AppResult<()> {
    for slot in schedule {
        if !DAYS.contains(&slot.day.as_str()) {
            return Err(AppError::validation(format!(
                "schedule day must be a weekday name, got {}",
                slot.day
            )));
        }
        let start = chrono::NaiveTime::parse_from_str(&slot.start_time, "%H:%M");
        let end = chrono::NaiveTime::parse_from_str(&slot.end_time, "%H:%M");
        match (start, end) {
            (Ok(s), Ok(e)) if s < e => {}
            _ => {
                return Err(AppError::validation(
                    "schedule times must be HH:MM with startTime before endTime",
                ))
            }
        }
    }
    Ok(())
}

pub fn create_circle(
    conn: &Connection,
    name: &str,
    teacher_id: &str,
    schedule: &[ScheduleSlot],
) -> AppResult<Circle> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name must not be empty"));
    }
    match db::user_role(conn, teacher_id)?.as_deref() {
        None => return Err(AppError::not_found("teacher")),
        Some("Teacher") => {}
        Some(_) => return Err(AppError::validation("circle teacher must have the Teacher role")),
    }
    validate_schedule(schedule)?;

    let schedule_json = serde_json::to_string(schedule)
        .map_err(|e| AppError::Internal(format!("encode schedule: {}", e)))?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO circles(id, name, teacher_id, schedule_json, created_at) VALUES(?, ?, ?, ?, ?)",
        (&id, name, teacher_id, &schedule_json, now_rfc3339()),
    )?;
    Ok(Circle {
        id,
        name: name.to_string(),
        teacher: teacher_id.to_string(),
        students: Vec::new(),
        schedule: schedule.to_vec(),
    })
}

pub fn get_circle(conn: &Connection, circle_id: &str) -> AppResult<Circle> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT name, teacher_id, schedule_json FROM circles WHERE id = ?",
            [circle_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((name, teacher, schedule_json)) = row else {
        return Err(AppError::not_found("circle"));
    };
    let schedule: Vec<ScheduleSlot> = serde_json::from_str(&schedule_json)
        .map_err(|e| AppError::Internal(format!("decode schedule for {}: {}", circle_id, e)))?;
    Ok(Circle {
        id: circle_id.to_string(),
        name,
        teacher,
        students: db::circle_student_ids(conn, circle_id)?,
        schedule,
    })
}

/// Replace the circle's membership with `student_ids`.
pub fn set_students(conn: &Connection, circle_id: &str, student_ids: &[String]) -> AppResult<Circle> {
    if db::circle_teacher(conn, circle_id)?.is_none() {
        return Err(AppError::not_found("circle"));
    }
    let mut seen = HashSet::new();
    for sid in student_ids {
        if !seen.insert(sid.as_str()) {
            return Err(AppError::validation(format!("duplicate student {}", sid)));
        }
        match db::user_role(conn, sid)?.as_deref() {
            Some("Student") => {}
            Some(_) => {
                return Err(AppError::validation(format!("{} is not a student", sid)));
            }
            None => return Err(AppError::NotFound(format!("student {} not found", sid))),
        }
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM circle_students WHERE circle_id = ?", [circle_id])?;
    for sid in student_ids {
        tx.execute(
            "INSERT INTO circle_students(circle_id, student_id) VALUES(?, ?)",
            (circle_id, sid),
        )?;
    }
    tx.commit()?;
    get_circle(conn, circle_id)
}

/// Only the circle's own teacher or an admin may write records for it.
/// Returns the circle's teacher id.
pub fn authorize_circle_write(
    conn: &Connection,
    circle_id: &str,
    caller: &Caller,
) -> AppResult<String> {
    let teacher = db::circle_teacher(conn, circle_id)?.ok_or_else(|| AppError::not_found("circle"))?;
    let allowed = caller.role == Role::Admin
        || (caller.role == Role::Teacher && caller.user_id == teacher);
    if !allowed {
        return Err(AppError::Forbidden(
            "only the circle's teacher or an admin may record for this circle".into(),
        ));
    }
    Ok(teacher)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_user(conn: &Connection, id: &str, role: &str) {
        conn.execute(
            "INSERT INTO users(id, username, password_hash, full_name, role, created_at)
             VALUES(?, ?, 'x', ?, ?, '2024-01-01T00:00:00Z')",
            (id, id, id, role),
        )
        .expect("user");
    }

    #[test]
    fn only_owner_or_admin_may_write() {
        let conn = db::open_in_memory().expect("db");
        insert_user(&conn, "t1", "Teacher");
        insert_user(&conn, "t2", "Teacher");
        let c = create_circle(&conn, "Morning", "t1", &[]).expect("circle");

        let owner = Caller {
            user_id: "t1".into(),
            role: Role::Teacher,
        };
        let other = Caller {
            user_id: "t2".into(),
            role: Role::Teacher,
        };
        let admin = Caller {
            user_id: "root".into(),
            role: Role::Admin,
        };
        assert_eq!(authorize_circle_write(&conn, &c.id, &owner).expect("owner"), "t1");
        assert_eq!(authorize_circle_write(&conn, &c.id, &admin).expect("admin"), "t1");
        let e = authorize_circle_write(&conn, &c.id, &other).expect_err("other");
        assert_eq!(e.code(), "forbidden");
        let e = authorize_circle_write(&conn, "missing", &admin).expect_err("missing");
        assert_eq!(e.code(), "not_found");
    }

    #[test]
    fn membership_is_replaced() {
        let conn = db::open_in_memory().expect("db");
        insert_user(&conn, "t1", "Teacher");
        insert_user(&conn, "s1", "Student");
        insert_user(&conn, "s2", "Student");
        let slots = vec![ScheduleSlot {
            day: "Saturday".into(),
            start_time: "10:00".into(),
            end_time: "11:30".into(),
        }];
        let c = create_circle(&conn, "Morning", "t1", &slots).expect("circle");

        set_students(&conn, &c.id, &["s1".into(), "s2".into()]).expect("set");
        let after = set_students(&conn, &c.id, &["s2".into()]).expect("reset");
        assert_eq!(after.students, vec!["s2".to_string()]);
        assert_eq!(after.schedule, slots);

        let e = set_students(&conn, &c.id, &["t1".into()]).expect_err("teacher as student");
        assert_eq!(e.code(), "bad_params");
    }

    #[test]
    fn bad_schedule_is_rejected() {
        let conn = db::open_in_memory().expect("db");
        insert_user(&conn, "t1", "Teacher");
        let e = create_circle(
            &conn,
            "Evening",
            "t1",
            &[ScheduleSlot {
                day: "Someday".into(),
                start_time: "10:00".into(),
                end_time: "09:00".into(),
            }],
        )
        .expect_err("schedule");
        assert_eq!(e.code(), "bad_params");
    }
}
