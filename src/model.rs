use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Grade that advances a student's progress cursor.
pub const GRADE_PASSED: &str = "Passed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Student,
    Teacher,
    Admin,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Teacher => "Teacher",
            Role::Admin => "Admin",
            Role::Parent => "Parent",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim() {
            "Student" => Some(Role::Student),
            "Teacher" => Some(Role::Teacher),
            "Admin" => Some(Role::Admin),
            "Parent" => Some(Role::Parent),
            _ => None,
        }
    }
}

/// Identity of whoever issued a request. Resolved before it reaches us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn require_caller(caller: Option<&Caller>) -> AppResult<&Caller> {
    caller.ok_or_else(|| AppError::Unauthorized("caller identity required".into()))
}

pub fn require_admin(caller: Option<&Caller>) -> AppResult<&Caller> {
    let c = require_caller(caller)?;
    if !c.is_admin() {
        return Err(AppError::Forbidden("admin role required".into()));
    }
    Ok(c)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceCategory {
    Discount,
    Standard,
    #[serde(rename = "Non-Arab")]
    NonArab,
}

impl PriceCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceCategory::Discount => "Discount",
            PriceCategory::Standard => "Standard",
            PriceCategory::NonArab => "Non-Arab",
        }
    }

    pub fn parse(raw: &str) -> Option<PriceCategory> {
        match raw.trim() {
            "Discount" => Some(PriceCategory::Discount),
            "Standard" => Some(PriceCategory::Standard),
            "Non-Arab" => Some(PriceCategory::NonArab),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Excused => "Excused",
        }
    }

    pub fn parse(raw: &str) -> Option<AttendanceStatus> {
        match raw.trim() {
            "Present" => Some(AttendanceStatus::Present),
            "Absent" => Some(AttendanceStatus::Absent),
            "Late" => Some(AttendanceStatus::Late),
            "Excused" => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "Pending",
            ApplicationStatus::Approved => "Approved",
            ApplicationStatus::Rejected => "Rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<ApplicationStatus> {
        match raw.trim() {
            "Pending" => Some(ApplicationStatus::Pending),
            "Approved" => Some(ApplicationStatus::Approved),
            "Rejected" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }
}

/// Calendar dates travel as `YYYY-MM-DD` and are stored the same way, so
/// lexical order in SQLite matches date order.
pub fn parse_date(key: &str, raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("{} must be YYYY-MM-DD", key)))
}

pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_category_uses_hyphenated_wire_name() {
        assert_eq!(PriceCategory::parse("Non-Arab"), Some(PriceCategory::NonArab));
        assert_eq!(PriceCategory::NonArab.as_str(), "Non-Arab");
        assert_eq!(PriceCategory::parse("NonArab"), None);
        let v = serde_json::to_value(PriceCategory::NonArab).expect("ser");
        assert_eq!(v, serde_json::json!("Non-Arab"));
    }

    #[test]
    fn parse_date_rejects_other_formats() {
        assert!(parse_date("date", "2024-01-10").is_ok());
        assert!(parse_date("date", "10/01/2024").is_err());
        assert!(parse_date("date", "2024-02-30").is_err());
    }

    #[test]
    fn admin_gate() {
        let teacher = Caller {
            user_id: "t1".into(),
            role: Role::Teacher,
        };
        assert_eq!(require_admin(None).unwrap_err().code(), "unauthorized");
        assert_eq!(require_admin(Some(&teacher)).unwrap_err().code(), "forbidden");
    }
}
