use thiserror::Error;

use crate::state::Scope;

/// Failure reported by a remote collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// The interactive sign-in flow failed (as opposed to being declined).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("sign-in failed: {0}")]
pub struct SignInError(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The user declined or failed sign-in. Terminates the workflow.
    #[error("authentication aborted")]
    AuthAborted,
    #[error("failed to fetch {scope}: {source}")]
    RemoteFetchFailed {
        scope: Scope,
        #[source]
        source: ServiceError,
    },
    /// The edit addressed a row that is not part of the current list.
    #[error("edit target row {row} is outside the loaded list (len {len})")]
    InvalidEditTarget { row: usize, len: usize },
}

impl PipelineError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthAborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_aborted_is_terminal() {
        assert!(PipelineError::AuthAborted.is_terminal());
        assert!(!PipelineError::InvalidEditTarget { row: 4, len: 2 }.is_terminal());
        assert!(!PipelineError::RemoteFetchFailed {
            scope: Scope::Permissions,
            source: ServiceError::Unavailable("offline".into()),
        }
        .is_terminal());
    }

    #[test]
    fn remote_fetch_failed_names_scope_and_cause() {
        let err = PipelineError::RemoteFetchFailed {
            scope: Scope::Applications,
            source: ServiceError::Rejected {
                status: 403,
                message: "forbidden".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("applications"), "got: {msg}");
        assert!(msg.contains("forbidden"), "got: {msg}");
    }
}
