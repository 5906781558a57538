use chrono::NaiveDate;
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};
use crate::model::parse_date;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> AppResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> AppResult<Option<String>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(AppError::validation(format!("{} must be a string", key))),
    }
}

/// Unlike `get_required_str`, passwords are taken verbatim.
pub fn get_raw_str(params: &serde_json::Value, key: &str) -> AppResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| AppError::validation(format!("missing {}", key)))
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> AppResult<NaiveDate> {
    let raw = get_required_str(params, key)?;
    parse_date(key, &raw)
}

pub fn get_optional_date(params: &serde_json::Value, key: &str) -> AppResult<Option<NaiveDate>> {
    match get_optional_str(params, key)? {
        Some(raw) => parse_date(key, &raw).map(Some),
        None => Ok(None),
    }
}

pub fn get_required_f64(params: &serde_json::Value, key: &str) -> AppResult<f64> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| AppError::validation(format!("{} must be a number", key)))
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> AppResult<i64> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| AppError::validation(format!("{} must be an integer", key)))
}

pub fn get_string_list(params: &serde_json::Value, key: &str) -> AppResult<Vec<String>> {
    let Some(v) = params.get(key) else {
        return Ok(Vec::new());
    };
    let Some(items) = v.as_array() else {
        return Err(AppError::validation(format!("{} must be an array", key)));
    };
    items
        .iter()
        .map(|it| {
            it.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| AppError::validation(format!("{} must contain strings", key)))
        })
        .collect()
}

pub fn decode<T: DeserializeOwned>(value: &serde_json::Value, what: &str) -> AppResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| AppError::validation(format!("invalid {}: {}", what, e)))
}

pub fn to_json<T: serde::Serialize>(value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(format!("encode response: {}", e)))
}
