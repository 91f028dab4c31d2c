//! Error types shared by the façade, the store and the RPC layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for affordance operations.
pub type Result<T> = std::result::Result<T, AffordError>;

/// The three error kinds reported to RPC callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    SystemFailure,
}

#[derive(Debug, Error)]
pub enum AffordError {
    #[error("obstacle '{0}' not found")]
    UnknownObstacle(String),

    #[error("no affordance configuration for type '{0}'")]
    UnknownAffordanceType(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("system failure: {0}")]
    SystemFailure(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An error reported by the remote end of an RPC connection.
    #[error("remote call failed: {message}")]
    Remote { kind: ErrorKind, message: String },
}

impl AffordError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AffordError::UnknownObstacle(_) | AffordError::UnknownAffordanceType(_) => {
                ErrorKind::NotFound
            }
            AffordError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AffordError::SystemFailure(_) | AffordError::Io(_) | AffordError::Json(_) => {
                ErrorKind::SystemFailure
            }
            AffordError::Remote { kind, .. } => *kind,
        }
    }

    pub(crate) fn poisoned() -> Self {
        AffordError::SystemFailure("problem solver lock poisoned".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_wire_categories() {
        assert_eq!(
            AffordError::UnknownObstacle("floor".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AffordError::UnknownAffordanceType("Lean".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AffordError::InvalidArgument("x".into()).kind(),
            ErrorKind::InvalidArgument
        );
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(AffordError::from(io).kind(), ErrorKind::SystemFailure);
    }

    #[test]
    fn remote_errors_keep_their_kind() {
        let err = AffordError::Remote {
            kind: ErrorKind::InvalidArgument,
            message: "bad".into(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "remote call failed: bad");
    }

    #[test]
    fn error_kind_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
