use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::model::{date_key, PriceCategory};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WageRate {
    /// Share of the student fee owed to the teacher. Reported alongside the
    /// rate but not used in the earnings formula.
    pub percentage: f64,
    pub hourly_rate: f64,
}

/// Hourly rate per price category. Earnings accrue per attendee, so a
/// session with three students earns three times the rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WageTable {
    #[serde(rename = "Standard")]
    pub standard: WageRate,
    #[serde(rename = "Discount")]
    pub discount: WageRate,
    #[serde(rename = "Non-Arab")]
    pub non_arab: WageRate,
}

impl Default for WageTable {
    fn default() -> Self {
        WageTable {
            standard: WageRate {
                percentage: 65.0,
                hourly_rate: 4.46875,
            },
            discount: WageRate {
                percentage: 65.0,
                hourly_rate: 3.65625,
            },
            non_arab: WageRate {
                percentage: 65.0,
                hourly_rate: 5.28125,
            },
        }
    }
}

impl WageTable {
    pub fn rate(&self, category: PriceCategory) -> WageRate {
        match category {
            PriceCategory::Standard => self.standard,
            PriceCategory::Discount => self.discount,
            PriceCategory::NonArab => self.non_arab,
        }
    }

    /// Rate for a stored category string. Unknown or missing categories have
    /// no rate.
    pub fn rate_for(&self, raw: Option<&str>) -> Option<WageRate> {
        raw.and_then(PriceCategory::parse).map(|c| self.rate(c))
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, r) in [
            ("Standard", self.standard),
            ("Discount", self.discount),
            ("Non-Arab", self.non_arab),
        ] {
            if !r.hourly_rate.is_finite() || r.hourly_rate < 0.0 {
                return Err(format!("{} hourlyRate must be a non-negative number", name));
            }
            if !r.percentage.is_finite() || !(0.0..=100.0).contains(&r.percentage) {
                return Err(format!("{} percentage must be between 0 and 100", name));
            }
        }
        Ok(())
    }
}

pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone)]
pub struct Session {
    pub work_log_id: String,
    pub circle_id: String,
    pub date: String,
    pub duration: f64,
    /// Stored price category of each attendee; `None` when the attendee has
    /// no student profile.
    pub attendee_categories: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEarnings {
    pub work_log_id: String,
    pub circle_id: String,
    pub date: String,
    pub duration: f64,
    pub attendee_count: usize,
    pub session_earnings: f64,
    pub unrated_attendees: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollReport {
    pub teacher_id: String,
    pub period: Period,
    pub total_hours: f64,
    pub total_earnings: f64,
    pub breakdown: Vec<SessionEarnings>,
    pub rates: WageTable,
}

pub fn summarize(
    teacher_id: &str,
    period: Period,
    sessions: &[Session],
    table: &WageTable,
) -> PayrollReport {
    let mut total_hours = 0.0;
    let mut total_earnings = 0.0;
    let mut breakdown = Vec::with_capacity(sessions.len());

    for s in sessions {
        let mut earned = 0.0;
        let mut unrated = 0;
        for cat in &s.attendee_categories {
            match table.rate_for(cat.as_deref()) {
                Some(r) => earned += r.hourly_rate * s.duration,
                None => unrated += 1,
            }
        }
        if unrated > 0 {
            tracing::warn!(
                work_log = %s.work_log_id,
                unrated,
                "attendees without a known price category earn nothing"
            );
        }
        total_hours += s.duration;
        total_earnings += earned;
        breakdown.push(SessionEarnings {
            work_log_id: s.work_log_id.clone(),
            circle_id: s.circle_id.clone(),
            date: s.date.clone(),
            duration: s.duration,
            attendee_count: s.attendee_categories.len(),
            session_earnings: round_2(earned),
            unrated_attendees: unrated,
        });
    }

    PayrollReport {
        teacher_id: teacher_id.to_string(),
        period,
        total_hours: round_2(total_hours),
        total_earnings: round_2(total_earnings),
        breakdown,
        rates: table.clone(),
    }
}

fn load_sessions(
    conn: &Connection,
    teacher_id: &str,
    start: &str,
    end: &str,
) -> AppResult<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, circle_id, date, duration
         FROM work_logs
         WHERE teacher_id = ? AND date >= ? AND date <= ?
         ORDER BY date, circle_id",
    )?;
    let mut sessions = stmt
        .query_map((teacher_id, start, end), |r| {
            Ok(Session {
                work_log_id: r.get(0)?,
                circle_id: r.get(1)?,
                date: r.get(2)?,
                duration: r.get(3)?,
                attendee_categories: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if sessions.is_empty() {
        return Ok(sessions);
    }

    let mut cat_stmt = conn.prepare(
        "SELECT wla.work_log_id, sp.price_category
         FROM work_log_attendees wla
         JOIN work_logs wl ON wl.id = wla.work_log_id
         LEFT JOIN student_profiles sp ON sp.user_id = wla.student_id
         WHERE wl.teacher_id = ? AND wl.date >= ? AND wl.date <= ?
         ORDER BY wla.work_log_id, wla.student_id",
    )?;
    let mut by_log: HashMap<String, Vec<Option<String>>> = HashMap::new();
    let rows = cat_stmt.query_map((teacher_id, start, end), |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
    })?;
    for row in rows {
        let (log_id, cat) = row?;
        by_log.entry(log_id).or_default().push(cat);
    }
    for s in sessions.iter_mut() {
        if let Some(cats) = by_log.remove(&s.work_log_id) {
            s.attendee_categories = cats;
        }
    }
    Ok(sessions)
}

pub fn calculate(
    conn: &Connection,
    teacher_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    table: &WageTable,
) -> AppResult<PayrollReport> {
    if start > end {
        return Err(AppError::validation("startDate must not be after endDate"));
    }
    if !db::user_exists(conn, teacher_id)? {
        return Err(AppError::not_found("teacher"));
    }
    let (start_key, end_key) = (date_key(start), date_key(end));
    let sessions = load_sessions(conn, teacher_id, &start_key, &end_key)?;
    let report = summarize(
        teacher_id,
        Period {
            start_date: start_key,
            end_date: end_key,
        },
        &sessions,
        table,
    );
    tracing::info!(
        teacher = teacher_id,
        sessions = report.breakdown.len(),
        total_hours = report.total_hours,
        total_earnings = report.total_earnings,
        "payroll calculated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, duration: f64, cats: &[Option<&str>]) -> Session {
        Session {
            work_log_id: id.into(),
            circle_id: "c1".into(),
            date: "2024-01-10".into(),
            duration,
            attendee_categories: cats.iter().map(|c| c.map(|s| s.to_string())).collect(),
        }
    }

    fn period() -> Period {
        Period {
            start_date: "2024-01-01".into(),
            end_date: "2024-01-31".into(),
        }
    }

    #[test]
    fn two_standard_attendees_for_two_hours() {
        let table = WageTable::default();
        let r = summarize(
            "t1",
            period(),
            &[session("w1", 2.0, &[Some("Standard"), Some("Standard")])],
            &table,
        );
        assert_eq!(r.breakdown[0].session_earnings, 17.88);
        assert_eq!(r.breakdown[0].attendee_count, 2);
        assert_eq!(r.total_hours, 2.0);
        assert_eq!(r.total_earnings, 17.88);
    }

    #[test]
    fn earnings_scale_with_attendees() {
        let table = WageTable::default();
        let one = summarize("t1", period(), &[session("a", 1.0, &[Some("Discount")])], &table);
        let three = summarize(
            "t1",
            period(),
            &[session(
                "b",
                1.0,
                &[Some("Discount"), Some("Discount"), Some("Discount")],
            )],
            &table,
        );
        assert_eq!(three.total_earnings, round_2(3.0 * 3.65625));
        assert_eq!(one.total_earnings, round_2(3.65625));
    }

    #[test]
    fn unknown_categories_contribute_zero() {
        let table = WageTable::default();
        let r = summarize(
            "t1",
            period(),
            &[session(
                "w1",
                1.5,
                &[Some("Non-Arab"), Some("Scholarship"), None],
            )],
            &table,
        );
        let s = &r.breakdown[0];
        assert_eq!(s.attendee_count, 3);
        assert_eq!(s.unrated_attendees, 2);
        assert_eq!(s.session_earnings, round_2(1.5 * 5.28125));
    }

    #[test]
    fn totals_sum_over_sessions() {
        let table = WageTable::default();
        let r = summarize(
            "t1",
            period(),
            &[
                session("w1", 1.0, &[Some("Standard")]),
                session("w2", 0.5, &[Some("Non-Arab"), Some("Discount")]),
                session("w3", 2.0, &[]),
            ],
            &table,
        );
        let expected = 4.46875 + 0.5 * (5.28125 + 3.65625);
        assert_eq!(r.total_earnings, round_2(expected));
        assert_eq!(r.total_hours, 3.5);
        assert_eq!(r.breakdown[2].session_earnings, 0.0);
    }

    #[test]
    fn wage_table_validation() {
        let mut t = WageTable::default();
        assert!(t.validate().is_ok());
        t.discount.hourly_rate = -1.0;
        assert!(t.validate().is_err());
    }
}
