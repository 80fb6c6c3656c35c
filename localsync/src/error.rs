//! Error types for localsync
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized to the presentation layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local cache timed out, failed to open, or returned an I/O failure
    #[error("Local cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Network or API failure talking to the remote service
    #[error("Remote service unreachable: {0}")]
    RemoteUnreachable(String),

    /// Remote service answered but rejected a mutation
    #[error("Remote rejected {operation}: {reason}")]
    ConflictOnMutation {
        operation: &'static str,
        reason: String,
    },

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Collection controller has shut down")]
    ControllerClosed,

    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Whether retrying the same operation later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::CacheUnavailable(_) | AppError::RemoteUnreachable(_) | AppError::Database(_)
        )
    }

    /// Turn a remote error into the mutation taxonomy, keeping transport failures as-is
    pub fn rejected(self, operation: &'static str) -> Self {
        match self {
            AppError::RemoteUnreachable(_) => self,
            other => AppError::ConflictOnMutation {
                operation,
                reason: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.is_client_error() => AppError::ConflictOnMutation {
                operation: "request",
                reason: format!("HTTP {}", status),
            },
            _ => AppError::RemoteUnreachable(err.to_string()),
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_keeps_transport_failures() {
        let err = AppError::RemoteUnreachable("connection refused".to_string()).rejected("delete");
        assert!(matches!(err, AppError::RemoteUnreachable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_rejected_wraps_other_failures() {
        let err = AppError::Generic("boom".to_string()).rejected("edit");
        match err {
            AppError::ConflictOnMutation { operation, reason } => {
                assert_eq!(operation, "edit");
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_serializes_as_message() {
        let err = AppError::ItemNotFound("abc".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Item not found: abc\"");
    }

    #[test]
    fn test_serializes_nested_in_payload() {
        let errors = vec![
            AppError::CacheUnavailable("locked".to_string()),
            AppError::ConflictOnMutation {
                operation: "delete",
                reason: "HTTP 409".to_string(),
            },
        ];
        let value = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                "Local cache unavailable: locked",
                "Remote rejected delete: HTTP 409"
            ])
        );
    }
}
