use rusqlite::ErrorCode;
use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage failure: {context}")]
    Internal {
        context: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            source: None,
        }
    }

    /// HTTP-style status a controller should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Conflict(_) => 409,
            Self::BadRequest(_) => 400,
            Self::Timeout => 504,
            Self::Cancelled => 499,
            Self::DataIntegrity(_) | Self::Internal { .. } | Self::Io(_) | Self::Config(_) => 500,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// True when SQLite gave up waiting for another writer's lock.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Internal { source: Some(rusqlite::Error::SqliteFailure(code, _)), .. }
                if matches!(code.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }
}

/// Classifies raw SQLite failures so engine text never reaches callers
/// uninterpreted. The original error stays reachable through `source()`.
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound,
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        Self::Conflict("resource already exists".to_string())
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        Self::DataIntegrity("referenced resource does not exist".to_string())
                    }
                    _ => Self::DataIntegrity("constraint violated".to_string()),
                }
            }
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == ErrorCode::OperationInterrupted =>
            {
                Self::Cancelled
            }
            rusqlite::Error::FromSqlConversionFailure(column, _, _) => {
                Self::DataIntegrity(format!("column {column} holds an unreadable value"))
            }
            other => Self::Internal {
                context: "database operation failed".to_string(),
                source: Some(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(extended_code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(extended_code), None)
    }

    #[test]
    fn test_no_rows_is_not_found() {
        let err = Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err = Error::from(sqlite_failure(ffi::SQLITE_CONSTRAINT_UNIQUE));
        assert!(err.is_conflict());
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_foreign_key_violation_is_data_integrity() {
        let err = Error::from(sqlite_failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY));
        assert!(matches!(err, Error::DataIntegrity(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_lock_wait_failure_is_busy() {
        let err = Error::from(sqlite_failure(ffi::SQLITE_BUSY));
        assert!(err.is_busy());
        assert!(!Error::from(sqlite_failure(ffi::SQLITE_CONSTRAINT_UNIQUE)).is_busy());
    }

    #[test]
    fn test_interrupt_is_cancelled() {
        let err = Error::from(sqlite_failure(ffi::SQLITE_INTERRUPT));
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_internal_hides_engine_text() {
        let err = Error::from(rusqlite::Error::InvalidQuery);
        assert_eq!(err.to_string(), "storage failure: database operation failed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
