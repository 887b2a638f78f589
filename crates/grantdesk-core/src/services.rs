//! Contracts of the remote collaborators consumed by the pipeline.

use async_trait::async_trait;
use grantdesk_telemetry as telemetry;
use tracing::error;

use crate::error::{ServiceError, SignInError};
use crate::model::{Application, ServicePermissionEntry};
use crate::session::Session;

#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn list_applications(&self, session: &Session) -> Result<Vec<Application>, ServiceError>;

    /// Used by the registration flow; the pipeline only consumes the
    /// resulting `app_id` as a preferred selection.
    async fn register_application(
        &self,
        session: &Session,
        display_name: &str,
    ) -> Result<Application, ServiceError>;
}

#[async_trait]
pub trait PermissionsService: Send + Sync {
    async fn list_permissions(
        &self,
        session: &Session,
        object_id: &str,
    ) -> Result<Vec<ServicePermissionEntry>, ServiceError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignInOutcome {
    Authenticated(Session),
    Declined,
}

#[async_trait]
pub trait InteractiveSignIn: Send + Sync {
    async fn prompt(&self) -> Result<SignInOutcome, SignInError>;
}

/// Fire-and-forget sink for user-visible failures. Implementations must not
/// block or panic.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, message: &str, cause: &(dyn std::error::Error + 'static));
}

/// Reports through `tracing` and the telemetry event stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, message: &str, cause: &(dyn std::error::Error + 'static)) {
        let cause = cause.to_string();
        error!(%cause, "{message}");
        telemetry::event("pipeline.error", &[("message", message), ("cause", &cause)]);
    }
}
