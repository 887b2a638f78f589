use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{AuthGate, AuthOutcome};
use crate::error::PipelineError;
use crate::projector::APPS_FETCH_FAILED;
use crate::services::{DirectoryService, ErrorReporter};
use crate::state::{ApplicationList, LoadState, Scope};

/// Fetches the applications registered for the signed-in identity.
#[derive(Clone)]
pub struct ApplicationListLoader {
    auth: Arc<AuthGate>,
    directory: Arc<dyn DirectoryService>,
    reporter: Arc<dyn ErrorReporter>,
}

impl ApplicationListLoader {
    pub fn new(
        auth: Arc<AuthGate>,
        directory: Arc<dyn DirectoryService>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            auth,
            directory,
            reporter,
        }
    }

    /// Only `Err(PipelineError::AuthAborted)` is returned; remote failures
    /// become `LoadState::Error` after being reported.
    pub async fn load(
        &self,
        preferred_app_id: Option<&str>,
    ) -> Result<LoadState<ApplicationList>, PipelineError> {
        let session = match self.auth.ensure_authenticated().await {
            AuthOutcome::Ready(session) => session,
            AuthOutcome::Aborted => return Err(PipelineError::AuthAborted),
        };

        match self.directory.list_applications(&session).await {
            Ok(apps) => {
                let count = apps.len();
                match ApplicationList::resolve(apps, preferred_app_id) {
                    Some(list) => {
                        info!(count, selected = list.default_index(), "applications loaded");
                        Ok(LoadState::Ready(list))
                    }
                    None => {
                        debug!("no applications configured");
                        Ok(LoadState::Empty)
                    }
                }
            }
            Err(err) => {
                let failure = PipelineError::RemoteFetchFailed {
                    scope: Scope::Applications,
                    source: err.clone(),
                };
                self.reporter.report(APPS_FETCH_FAILED, &failure);
                Ok(LoadState::Error(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::testing::{app, RecordingReporter, ScriptedDirectory, ScriptedSignIn};

    struct Fixture {
        sign_in: Arc<ScriptedSignIn>,
        directory: Arc<ScriptedDirectory>,
        reporter: Arc<RecordingReporter>,
        loader: ApplicationListLoader,
    }

    fn fixture(sign_in: ScriptedSignIn, directory: ScriptedDirectory) -> Fixture {
        let sign_in = Arc::new(sign_in);
        let directory = Arc::new(directory);
        let reporter = Arc::new(RecordingReporter::default());
        let auth = Arc::new(AuthGate::new(sign_in.clone(), reporter.clone()));
        let loader = ApplicationListLoader::new(auth, directory.clone(), reporter.clone());
        Fixture {
            sign_in,
            directory,
            reporter,
            loader,
        }
    }

    #[tokio::test]
    async fn empty_directory_is_empty_not_error() {
        let f = fixture(
            ScriptedSignIn::accepting(),
            ScriptedDirectory::with_apps(Vec::new()),
        );

        assert_eq!(f.loader.load(None).await, Ok(LoadState::Empty));
        assert_eq!(f.reporter.count(), 0);
    }

    #[tokio::test]
    async fn preferred_id_resolves_default_selection() {
        let f = fixture(
            ScriptedSignIn::accepting(),
            ScriptedDirectory::with_apps(vec![app("x"), app("y")]),
        );

        let state = f.loader.load(Some("y")).await.expect("not aborted");
        let list = state.ready().expect("ready");
        assert_eq!(list.len(), 2);
        assert_eq!(list.default_index(), 1);
    }

    #[tokio::test]
    async fn aborted_sign_in_skips_the_fetch() {
        let f = fixture(
            ScriptedSignIn::declining(),
            ScriptedDirectory::with_apps(vec![app("x")]),
        );

        assert_eq!(f.loader.load(None).await, Err(PipelineError::AuthAborted));
        assert_eq!(f.directory.call_count(), 0);
        assert_eq!(f.sign_in.prompt_count(), 1);
        assert_eq!(f.reporter.count(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_and_becomes_error_state() {
        let cause = ServiceError::Unavailable("directory offline".into());
        let f = fixture(
            ScriptedSignIn::accepting(),
            ScriptedDirectory::failing(cause.clone()),
        );

        assert_eq!(f.loader.load(None).await, Ok(LoadState::Error(cause)));
        assert_eq!(f.reporter.messages(), vec![APPS_FETCH_FAILED.to_string()]);
    }
}
