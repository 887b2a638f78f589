use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{AuthGate, AuthOutcome};
use crate::error::PipelineError;
use crate::model::{Application, ServicePermissionEntry};
use crate::projector::PERMISSIONS_FETCH_FAILED;
use crate::services::{ErrorReporter, PermissionsService};
use crate::state::{LoadState, Scope};

/// Fetches the per-service permission grants of one application.
///
/// The Loading transition is published by the consumer when the request is
/// made, so this loader only produces terminal states.
#[derive(Clone)]
pub struct PermissionListLoader {
    auth: Arc<AuthGate>,
    permissions: Arc<dyn PermissionsService>,
    reporter: Arc<dyn ErrorReporter>,
}

impl PermissionListLoader {
    pub fn new(
        auth: Arc<AuthGate>,
        permissions: Arc<dyn PermissionsService>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            auth,
            permissions,
            reporter,
        }
    }

    pub async fn load(
        &self,
        app: &Application,
    ) -> Result<LoadState<Vec<ServicePermissionEntry>>, PipelineError> {
        let session = match self.auth.ensure_authenticated().await {
            AuthOutcome::Ready(session) => session,
            AuthOutcome::Aborted => return Err(PipelineError::AuthAborted),
        };

        match self
            .permissions
            .list_permissions(&session, &app.object_id)
            .await
        {
            Ok(entries) if entries.is_empty() => {
                debug!(object_id = %app.object_id, "application exposes no services");
                Ok(LoadState::Empty)
            }
            Ok(entries) => {
                info!(object_id = %app.object_id, count = entries.len(), "permissions loaded");
                Ok(LoadState::Ready(entries))
            }
            Err(err) => {
                let failure = PipelineError::RemoteFetchFailed {
                    scope: Scope::Permissions,
                    source: err.clone(),
                };
                self.reporter.report(PERMISSIONS_FETCH_FAILED, &failure);
                Ok(LoadState::Error(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::testing::{
        app, entry, test_session, RecordingReporter, ScriptedPermissions, ScriptedSignIn,
    };

    fn loader(
        permissions: ScriptedPermissions,
    ) -> (PermissionListLoader, Arc<ScriptedPermissions>, Arc<RecordingReporter>) {
        let permissions = Arc::new(permissions);
        let reporter = Arc::new(RecordingReporter::default());
        let auth = Arc::new(
            AuthGate::new(Arc::new(ScriptedSignIn::declining()), reporter.clone())
                .with_session(test_session()),
        );
        (
            PermissionListLoader::new(auth, permissions.clone(), reporter.clone()),
            permissions,
            reporter,
        )
    }

    #[tokio::test]
    async fn fetches_by_object_id() {
        let rows = vec![entry("Mail", &[("Mail.Read", true)])];
        let (loader, permissions, _) =
            loader(ScriptedPermissions::default().respond("obj-x", Ok(rows.clone())));

        assert_eq!(loader.load(&app("x")).await, Ok(LoadState::Ready(rows)));
        assert_eq!(permissions.calls(), vec!["obj-x".to_string()]);
    }

    #[tokio::test]
    async fn no_services_is_empty() {
        let (loader, _, reporter) =
            loader(ScriptedPermissions::default().respond("obj-x", Ok(Vec::new())));

        assert_eq!(loader.load(&app("x")).await, Ok(LoadState::Empty));
        assert_eq!(reporter.count(), 0);
    }

    #[tokio::test]
    async fn network_failure_is_reported_once() {
        let cause = ServiceError::Unavailable("connection reset".into());
        let (loader, _, reporter) =
            loader(ScriptedPermissions::default().respond("obj-o1", Err(cause.clone())));

        let target = Application::new("o1-app", "obj-o1", "O1");
        assert_eq!(loader.load(&target).await, Ok(LoadState::Error(cause)));
        assert_eq!(reporter.messages(), vec![PERMISSIONS_FETCH_FAILED.to_string()]);
    }
}
