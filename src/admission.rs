//! Applications, admission approval and account creation.

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::curriculum;
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::model::{now_rfc3339, ApplicationStatus, PriceCategory, Role};
use crate::progress;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Personal fields shared by an application and the student profile it
/// becomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantDetails {
    pub full_name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub parent_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub program: String,
    pub price_category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    #[serde(flatten)]
    pub details: ApplicantDetails,
    pub status: String,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    pub application_id: String,
    pub user_id: String,
    pub student_profile_id: String,
    pub progress_id: String,
    pub username: String,
    pub program: String,
    pub first_section_id: String,
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

fn validate_credentials(username: &str, password: &str) -> AppResult<()> {
    if username.is_empty() {
        return Err(AppError::validation("username must not be empty"));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(AppError::validation("username must not contain whitespace"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn username_taken(conn: &Connection, username: &str) -> AppResult<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM users WHERE username = ?", [username], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Insert a user row. The UNIQUE(username) constraint is the authority; a
/// violation surfaces as the same error as the pre-check.
fn insert_user(
    conn: &Connection,
    username: &str,
    password: &str,
    full_name: &str,
    role: Role,
) -> AppResult<String> {
    let hash = hash_password(password)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, password_hash, full_name, role, student_profile_id, created_at)
         VALUES(?, ?, ?, ?, ?, NULL, ?)",
        (&id, username, &hash, full_name, role.as_str(), now_rfc3339()),
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::validation("username already taken")
        } else {
            AppError::from(e)
        }
    })?;
    Ok(id)
}

/// Staff and parent accounts. Students are only created through admission.
pub fn create_user(
    conn: &Connection,
    username: &str,
    password: &str,
    full_name: &str,
    role: Role,
) -> AppResult<String> {
    let username = username.trim();
    validate_credentials(username, password)?;
    if full_name.trim().is_empty() {
        return Err(AppError::validation("fullName must not be empty"));
    }
    if role == Role::Student {
        return Err(AppError::validation(
            "student accounts are created by approving an application",
        ));
    }
    let id = insert_user(conn, username, password, full_name.trim(), role)?;
    tracing::info!(user = %id, role = role.as_str(), "user created");
    Ok(id)
}

pub fn submit_application(conn: &Connection, details: &ApplicantDetails) -> AppResult<Application> {
    if details.full_name.trim().is_empty() {
        return Err(AppError::validation("fullName must not be empty"));
    }
    if details.program.trim().is_empty() {
        return Err(AppError::validation("program must not be empty"));
    }
    if PriceCategory::parse(&details.price_category).is_none() {
        return Err(AppError::validation(
            "priceCategory must be one of Discount, Standard, Non-Arab",
        ));
    }

    let app = Application {
        id: Uuid::new_v4().to_string(),
        details: ApplicantDetails {
            full_name: details.full_name.trim().to_string(),
            program: details.program.trim().to_string(),
            price_category: details.price_category.trim().to_string(),
            ..details.clone()
        },
        status: ApplicationStatus::Pending.as_str().to_string(),
        created_at: now_rfc3339(),
        reviewed_at: None,
    };
    let d = &app.details;
    conn.execute(
        "INSERT INTO applications(
            id, full_name, date_of_birth, gender, email, phone, parent_name, parent_phone,
            address, program, price_category, status, created_at, reviewed_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
        (
            &app.id,
            &d.full_name,
            &d.date_of_birth,
            &d.gender,
            &d.email,
            &d.phone,
            &d.parent_name,
            &d.parent_phone,
            &d.address,
            &d.program,
            &d.price_category,
            &app.status,
            &app.created_at,
        ),
    )?;
    Ok(app)
}

const APPLICATION_COLUMNS: &str = "id, full_name, date_of_birth, gender, email, phone, parent_name,
    parent_phone, address, program, price_category, status, created_at, reviewed_at";

fn application_from_row(r: &Row<'_>) -> rusqlite::Result<Application> {
    Ok(Application {
        id: r.get(0)?,
        details: ApplicantDetails {
            full_name: r.get(1)?,
            date_of_birth: r.get(2)?,
            gender: r.get(3)?,
            email: r.get(4)?,
            phone: r.get(5)?,
            parent_name: r.get(6)?,
            parent_phone: r.get(7)?,
            address: r.get(8)?,
            program: r.get(9)?,
            price_category: r.get(10)?,
        },
        status: r.get(11)?,
        created_at: r.get(12)?,
        reviewed_at: r.get(13)?,
    })
}

pub fn get_application(conn: &Connection, id: &str) -> AppResult<Option<Application>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM applications WHERE id = ?", APPLICATION_COLUMNS),
            [id],
            application_from_row,
        )
        .optional()?)
}

pub fn list_applications(
    conn: &Connection,
    status: Option<ApplicationStatus>,
) -> AppResult<Vec<Application>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM applications WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at, id",
        APPLICATION_COLUMNS
    ))?;
    let rows = stmt
        .query_map([status.map(|s| s.as_str())], application_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn pending_application(conn: &Connection, id: &str) -> AppResult<Application> {
    let app = get_application(conn, id)?.ok_or_else(|| AppError::not_found("application"))?;
    if app.status != ApplicationStatus::Pending.as_str() {
        return Err(AppError::PreconditionFailed(format!(
            "application is already {}",
            app.status
        )));
    }
    Ok(app)
}

pub fn reject_application(conn: &Connection, id: &str) -> AppResult<Application> {
    pending_application(conn, id)?;
    conn.execute(
        "UPDATE applications SET status = ?, reviewed_at = ? WHERE id = ? AND status = 'Pending'",
        (ApplicationStatus::Rejected.as_str(), now_rfc3339(), id),
    )?;
    get_application(conn, id)?.ok_or_else(|| AppError::not_found("application"))
}

/// Turn a pending application into a student account, profile and progress
/// record. Every write happens in one transaction: a failure anywhere leaves
/// no user, profile or progress behind and the application stays pending.
pub fn approve_application(
    conn: &Connection,
    application_id: &str,
    username: &str,
    password: &str,
) -> AppResult<Admission> {
    let username = username.trim();
    let app = pending_application(conn, application_id)?;
    validate_credentials(username, password)?;
    if username_taken(conn, username)? {
        return Err(AppError::validation("username already taken"));
    }
    let first = curriculum::first_section(conn, &app.details.program)?.ok_or_else(|| {
        AppError::PreconditionFailed(format!(
            "program {} has no first section (order 1) defined",
            app.details.program
        ))
    })?;

    let tx = conn.unchecked_transaction()?;
    let user_id = insert_user(&tx, username, password, &app.details.full_name, Role::Student)?;

    // Copy the profile field by field so nothing else on the application
    // leaks into it.
    let d = &app.details;
    let profile_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO student_profiles(
            id, user_id, full_name, date_of_birth, gender, email, phone, parent_name,
            parent_phone, address, program, price_category, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &profile_id,
            &user_id,
            &d.full_name,
            &d.date_of_birth,
            &d.gender,
            &d.email,
            &d.phone,
            &d.parent_name,
            &d.parent_phone,
            &d.address,
            &d.program,
            &d.price_category,
            now_rfc3339(),
        ),
    )?;
    tx.execute(
        "UPDATE users SET student_profile_id = ? WHERE id = ?",
        (&profile_id, &user_id),
    )?;
    let progress_id = progress::seed_progress(&tx, &user_id, &d.program, &first.id)?;
    let changed = tx.execute(
        "UPDATE applications SET status = ?, reviewed_at = ? WHERE id = ? AND status = 'Pending'",
        (ApplicationStatus::Approved.as_str(), now_rfc3339(), application_id),
    )?;
    if changed == 0 {
        return Err(AppError::Conflict(
            "application was reviewed concurrently".into(),
        ));
    }
    tx.commit()?;

    tracing::info!(
        application = application_id,
        user = %user_id,
        program = %d.program,
        "application approved"
    );
    Ok(Admission {
        application_id: application_id.to_string(),
        user_id,
        student_profile_id: profile_id,
        progress_id,
        username: username.to_string(),
        program: d.program.clone(),
        first_section_id: first.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::create_section;
    use crate::db;

    fn details(program: &str) -> ApplicantDetails {
        ApplicantDetails {
            full_name: "Ali Hassan".into(),
            parent_name: Some("Hassan".into()),
            program: program.into(),
            price_category: "Standard".into(),
            ..Default::default()
        }
    }

    #[test]
    fn approval_creates_user_profile_and_progress() {
        let conn = db::open_in_memory().expect("db");
        let first = create_section(&conn, "Reading 7+", 1, "Letters", None).expect("section");
        let app = submit_application(&conn, &details("Reading 7+")).expect("submit");

        let adm = approve_application(&conn, &app.id, "ali", "secret1").expect("approve");
        assert_eq!(adm.first_section_id, first.id);

        let (role, hash, profile): (String, String, Option<String>) = conn
            .query_row(
                "SELECT role, password_hash, student_profile_id FROM users WHERE id = ?",
                [&adm.user_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .expect("user row");
        assert_eq!(role, "Student");
        assert!(hash.starts_with("$argon2"));
        assert_ne!(hash, "secret1");
        assert_eq!(profile.as_deref(), Some(adm.student_profile_id.as_str()));

        let p = progress::get_progress(&conn, &adm.user_id).expect("progress");
        assert_eq!(p.current_section.id, first.id);
        assert_eq!(
            get_application(&conn, &app.id).expect("get").map(|a| a.status),
            Some("Approved".to_string())
        );

        let again = approve_application(&conn, &app.id, "ali2", "secret1").expect_err("twice");
        assert_eq!(again.code(), "precondition_failed");
    }

    #[test]
    fn program_without_first_section_creates_nothing() {
        let conn = db::open_in_memory().expect("db");
        let app = submit_application(&conn, &details("Memorizing")).expect("submit");
        let e = approve_application(&conn, &app.id, "ali", "secret1").expect_err("no section");
        assert_eq!(e.code(), "precondition_failed");
        assert_eq!(db::count_rows(&conn, "users").expect("users"), 0);
        assert_eq!(db::count_rows(&conn, "student_profiles").expect("profiles"), 0);
        assert_eq!(db::count_rows(&conn, "student_progress").expect("progress"), 0);
        assert_eq!(
            get_application(&conn, &app.id).expect("get").map(|a| a.status),
            Some("Pending".to_string())
        );
    }

    #[test]
    fn taken_username_is_a_clean_validation_error() {
        let conn = db::open_in_memory().expect("db");
        create_section(&conn, "Reading 7+", 1, "Letters", None).expect("section");
        create_user(&conn, "ustadh", "secret1", "Teacher One", Role::Teacher).expect("teacher");
        let app = submit_application(&conn, &details("Reading 7+")).expect("submit");
        let e = approve_application(&conn, &app.id, "ustadh", "secret1").expect_err("taken");
        assert_eq!(e.code(), "bad_params");
        assert_eq!(e.to_string(), "username already taken");

        // The constraint path reports the same error as the pre-check.
        let e = insert_user(&conn, "ustadh", "secret1", "X", Role::Parent).expect_err("dup");
        assert_eq!(e.to_string(), "username already taken");
    }

    #[test]
    fn submit_validates_price_category() {
        let conn = db::open_in_memory().expect("db");
        let mut d = details("Reading 7+");
        d.price_category = "Premium".into();
        assert_eq!(
            submit_application(&conn, &d).expect_err("category").code(),
            "bad_params"
        );
    }

    #[test]
    fn reject_and_list() {
        let conn = db::open_in_memory().expect("db");
        let a = submit_application(&conn, &details("Reading 7+")).expect("a");
        submit_application(&conn, &details("Reading 7+")).expect("b");
        reject_application(&conn, &a.id).expect("reject");
        let pending = list_applications(&conn, Some(ApplicationStatus::Pending)).expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(list_applications(&conn, None).expect("all").len(), 2);
    }
}
