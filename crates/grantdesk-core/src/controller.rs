use std::io;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::auth::AuthGate;
use crate::dispatcher::{DispatcherOptions, Pipeline, TaskDispatcher};
use crate::edit::PermissionEditBroker;
use crate::error::PipelineError;
use crate::mailbox::{Mailbox, PipelineEvent};
use crate::model::{Application, PermissionSet, ServicePermissionEntry};
use crate::projector::{self, ApplicationPicker, PermissionTable, Projection};
use crate::state::{ApplicationList, LoadState, Scope};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowStatus {
    Active,
    /// Sign-in was aborted. No further loads are issued or applied.
    Cancelled,
}

/// State owned by the single consumer context.
///
/// Every mutation of the displayed scope state happens here, either through
/// a request method or by applying an event taken from the mailbox. Worker
/// tasks only ever produce events.
pub struct ConfigController {
    dispatcher: TaskDispatcher,
    mailbox: Mailbox,
    auth: Arc<AuthGate>,
    apps: LoadState<ApplicationList>,
    permissions: LoadState<PermissionEditBroker>,
    selected: Option<usize>,
    status: WorkflowStatus,
}

impl ConfigController {
    pub fn start(pipeline: Pipeline, options: DispatcherOptions) -> io::Result<Self> {
        let auth = pipeline.auth().clone();
        let (dispatcher, mailbox) = TaskDispatcher::start(pipeline, options)?;
        Ok(Self {
            dispatcher,
            mailbox,
            auth,
            apps: LoadState::Idle,
            permissions: LoadState::Idle,
            selected: None,
            status: WorkflowStatus::Active,
        })
    }

    pub fn selected_application(&self) -> Option<&Application> {
        self.apps.ready()?.get(self.selected?)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn current_apps_state(&self) -> &LoadState<ApplicationList> {
        &self.apps
    }

    pub fn current_permissions_state(&self) -> LoadState<Vec<ServicePermissionEntry>> {
        match &self.permissions {
            LoadState::Idle => LoadState::Idle,
            LoadState::Loading => LoadState::Loading,
            LoadState::Empty => LoadState::Empty,
            LoadState::Error(err) => LoadState::Error(err.clone()),
            LoadState::Ready(broker) => LoadState::Ready(broker.entries().to_vec()),
        }
    }

    pub fn workflow_status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn picker(&self) -> ApplicationPicker {
        projector::project_picker(&self.apps, self.selected)
    }

    pub fn table(&self) -> Projection<PermissionTable> {
        projector::project_table(&self.apps, &self.permissions)
    }

    /// Starts a fresh applications load. The selection and the permissions
    /// scope are reset, and any permissions result still in flight is stale.
    pub fn request_apps_reload(&mut self, preferred_app_id: Option<String>) {
        if self.is_cancelled() {
            debug!("workflow cancelled; ignoring applications reload");
            return;
        }

        self.apps = LoadState::Loading;
        self.selected = None;
        self.permissions = LoadState::Idle;
        self.dispatcher.invalidate(Scope::Permissions);

        if let Err(err) = self.dispatcher.load_applications(preferred_app_id) {
            error!("failed to schedule applications load: {err}");
            self.apps = LoadState::Error(err);
        }
    }

    /// Selects the application at `index` of the Ready list and loads its
    /// permissions. Returns false if there is no such entry or the workflow
    /// has been cancelled.
    pub fn select_application(&mut self, index: usize) -> bool {
        if self.is_cancelled() {
            debug!(index, "workflow cancelled; ignoring selection");
            return false;
        }
        let Some(app) = self.apps.ready().and_then(|list| list.get(index)).cloned() else {
            warn!(index, "selection outside the application list");
            return false;
        };
        self.request_permissions_reload(app);
        true
    }

    /// Selects `app` and reloads its permissions. Ignored unless `app` is
    /// part of the Ready application list.
    pub fn request_permissions_reload(&mut self, app: Application) {
        if self.is_cancelled() {
            debug!("workflow cancelled; ignoring permissions reload");
            return;
        }

        let Some(index) = self
            .apps
            .ready()
            .and_then(|list| list.position_of_object_id(&app.object_id))
        else {
            warn!(app_id = %app.app_id, "permissions reload for an application that is not listed");
            return;
        };

        self.selected = Some(index);
        self.permissions = LoadState::Loading;
        if let Err(err) = self.dispatcher.load_permissions(app) {
            error!("failed to schedule permissions load: {err}");
            self.permissions = LoadState::Error(err);
        }
    }

    /// Replaces the permission set of one row of the loaded table.
    ///
    /// An edit that no longer addresses a loaded row is discarded and logged;
    /// callers may ignore the error.
    pub fn submit_permission_edit(
        &mut self,
        row: usize,
        permissions: PermissionSet,
    ) -> Result<ServicePermissionEntry, PipelineError> {
        let result = match self.permissions.ready_mut() {
            Some(broker) => broker.apply_edit(row, permissions),
            None => Err(PipelineError::InvalidEditTarget { row, len: 0 }),
        };
        if let Err(err) = &result {
            warn!("permission edit discarded: {err}");
        }
        result
    }

    pub fn sign_out_and_reload(&mut self) {
        self.auth.sign_out();
        self.request_apps_reload(None);
    }

    pub fn apply(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::WorkflowCancelled { scope } => {
                info!(%scope, "sign-in aborted; cancelling workflow");
                self.status = WorkflowStatus::Cancelled;
                self.dispatcher.invalidate(Scope::Applications);
                self.dispatcher.invalidate(Scope::Permissions);
            }
            PipelineEvent::ApplicationsLoaded { seq, state } => {
                if !self.accepts(Scope::Applications, seq) {
                    return;
                }
                self.apps = state;
                if let Some(index) = self.apps.ready().map(ApplicationList::default_index) {
                    self.select_application(index);
                }
            }
            PipelineEvent::PermissionsLoaded { seq, app, state } => {
                if !self.accepts(Scope::Permissions, seq) {
                    return;
                }
                self.permissions = state.map(|entries| PermissionEditBroker::new(app, entries));
            }
        }
    }

    /// Applies whatever the workers have delivered so far.
    pub fn poll_events(&mut self) -> usize {
        let batch = self.mailbox.try_recv();
        let count = batch.len();
        for event in batch {
            self.apply(event);
        }
        count
    }

    /// Waits for the next batch of events and applies it. Returns false once
    /// the worker pool has shut down.
    pub async fn next_events(&mut self) -> bool {
        let batch = self.mailbox.recv().await;
        if batch.is_empty() {
            return false;
        }
        for event in batch {
            self.apply(event);
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        self.is_cancelled() || (self.apps.is_settled() && self.permissions.is_settled())
    }

    /// Drives the controller until no load is pending or the workflow is
    /// cancelled.
    pub async fn run_until_settled(&mut self) -> WorkflowStatus {
        while !self.is_settled() {
            if !self.next_events().await {
                warn!("worker pool stopped with loads pending");
                break;
            }
        }
        self.status
    }

    fn is_cancelled(&self) -> bool {
        self.status == WorkflowStatus::Cancelled
    }

    fn accepts(&self, scope: Scope, seq: u64) -> bool {
        if self.is_cancelled() {
            debug!(%scope, seq, "workflow cancelled; dropping result");
            return false;
        }
        if !self.dispatcher.is_current(scope, seq) {
            debug!(%scope, seq, "dropping stale result");
            return false;
        }
        true
    }
}
