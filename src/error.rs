use rusqlite::ErrorCode;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Failure taxonomy shared by every operation. Each variant maps to one
/// router error code (and one HTTP status on the HTTP transport).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("select a workspace first")]
    NoWorkspace,

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "bad_params",
            AppError::PreconditionFailed(_) => "precondition_failed",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::NoWorkspace => "no_workspace",
            AppError::Database(_) => "db_error",
            AppError::Internal(_) => "internal",
        }
    }

    /// Message safe to hand back to a caller. Server-side failures are
    /// reduced to a generic message; the raw error goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        // Constraint violations (unique keys, checks) are caller mistakes and
        // carry the constraint message through.
        if let rusqlite::Error::SqliteFailure(ref f, ref msg) = e {
            if f.code == ErrorCode::ConstraintViolation {
                let detail = msg.clone().unwrap_or_else(|| f.to_string());
                return AppError::Validation(detail);
            }
        }
        AppError::Database(e)
    }
}

pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
