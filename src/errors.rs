//! Typed error hierarchy for taskboard.
//!
//! Two top-level enums cover the two places errors are surfaced:
//! - `BoardError`: task store, property validation and HTTP handlers
//! - `ConfigError`: loading and validating `taskboard.toml`

use thiserror::Error;

/// Errors from the board subsystem: store access, validation and limits.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Task {id} not found")]
    TaskNotFound { id: i64 },

    #[error("User {id} not found")]
    UserNotFound { id: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid property '{name}': {reason}")]
    InvalidProperty { name: String, reason: String },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BoardError {
    pub fn invalid_property(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProperty {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_error_task_not_found_carries_id() {
        let err = BoardError::TaskNotFound { id: 42 };
        match &err {
            BoardError::TaskNotFound { id } => assert_eq!(*id, 42),
            _ => panic!("Expected TaskNotFound"),
        }
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn invalid_property_names_the_property() {
        let err = BoardError::invalid_property("Due", "not a date");
        assert_eq!(err.to_string(), "Invalid property 'Due': not a date");
    }

    #[test]
    fn rate_limited_reports_retry_delay() {
        let err = BoardError::RateLimited {
            retry_after_secs: 12,
        };
        assert!(err.to_string().contains("12s"));
    }

    #[test]
    fn board_error_converts_from_anyhow() {
        let err: BoardError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, BoardError::Other(_)));
    }

    #[test]
    fn config_error_read_failed_carries_path() {
        use std::path::PathBuf;
        let path = PathBuf::from("/etc/taskboard.toml");
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = ConfigError::ReadFailed {
            path: path.clone(),
            source: io_err,
        };
        match &err {
            ConfigError::ReadFailed { path: p, source: s } => {
                assert_eq!(p, &path);
                assert_eq!(s.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected ReadFailed"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&BoardError::LockPoisoned);
        assert_std_error(&ConfigError::InvalidValue {
            key: "server.port".into(),
            message: "must be non-zero".into(),
        });
    }
}
