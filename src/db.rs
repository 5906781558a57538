use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "school.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("creating workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            full_name TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('Student', 'Teacher', 'Admin', 'Parent')),
            student_profile_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // price_category is free text; payroll rates unknown values at zero.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_profiles(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            date_of_birth TEXT,
            gender TEXT,
            email TEXT,
            phone TEXT,
            parent_name TEXT,
            parent_phone TEXT,
            address TEXT,
            program TEXT NOT NULL,
            price_category TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS applications(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            date_of_birth TEXT,
            gender TEXT,
            email TEXT,
            phone TEXT,
            parent_name TEXT,
            parent_phone TEXT,
            address TEXT,
            program TEXT NOT NULL,
            price_category TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'Pending'
                CHECK(status IN ('Pending', 'Approved', 'Rejected')),
            created_at TEXT NOT NULL,
            reviewed_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            program TEXT NOT NULL,
            sort_order INTEGER NOT NULL CHECK(sort_order >= 1),
            title TEXT NOT NULL,
            description TEXT,
            UNIQUE(program, sort_order)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            description TEXT,
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_progress(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            program TEXT NOT NULL,
            current_section_id TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id),
            FOREIGN KEY(current_section_id) REFERENCES sections(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS completed_assessments(
            id TEXT PRIMARY KEY,
            progress_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            section_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            grade TEXT NOT NULL,
            notes TEXT,
            assessment_date TEXT NOT NULL,
            UNIQUE(progress_id, seq),
            FOREIGN KEY(progress_id) REFERENCES student_progress(id),
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS circles(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            schedule_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_circles_teacher ON circles(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS circle_students(
            circle_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(circle_id, student_id),
            FOREIGN KEY(circle_id) REFERENCES circles(id),
            FOREIGN KEY(student_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            circle_id TEXT NOT NULL,
            date TEXT NOT NULL,
            recorded_by TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(circle_id, date),
            FOREIGN KEY(circle_id) REFERENCES circles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            attendance_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('Present', 'Absent', 'Late', 'Excused')),
            PRIMARY KEY(attendance_id, student_id),
            FOREIGN KEY(attendance_id) REFERENCES attendance(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS work_logs(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            circle_id TEXT NOT NULL,
            date TEXT NOT NULL,
            duration REAL NOT NULL CHECK(duration > 0),
            notes TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE(teacher_id, circle_id, date),
            FOREIGN KEY(teacher_id) REFERENCES users(id),
            FOREIGN KEY(circle_id) REFERENCES circles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_work_logs_teacher_date ON work_logs(teacher_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS work_log_attendees(
            work_log_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(work_log_id, student_id),
            FOREIGN KEY(work_log_id) REFERENCES work_logs(id)
        )",
        [],
    )?;

    Ok(())
}

pub fn user_exists(conn: &Connection, user_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM users WHERE id = ?", [user_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

pub fn user_role(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT role FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()
}

pub fn circle_teacher(conn: &Connection, circle_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT teacher_id FROM circles WHERE id = ?",
        [circle_id],
        |r| r.get(0),
    )
    .optional()
}

pub fn circle_student_ids(conn: &Connection, circle_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM circle_students WHERE circle_id = ? ORDER BY student_id",
    )?;
    let ids = stmt
        .query_map([circle_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
}
