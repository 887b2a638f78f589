//! Scripted in-memory collaborators for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};

use crate::error::{ServiceError, SignInError};
use crate::model::{Application, Permission, PermissionSet, Service, ServicePermissionEntry};
use crate::services::{
    DirectoryService, ErrorReporter, InteractiveSignIn, PermissionsService, SignInOutcome,
};
use crate::session::Session;

pub(crate) fn test_session() -> Session {
    Session::issue("dev@contoso.test", None)
}

pub(crate) fn app(id: &str) -> Application {
    Application::new(id, format!("obj-{id}"), format!("App {id}"))
}

pub(crate) fn entry(service: &str, permissions: &[(&str, bool)]) -> ServicePermissionEntry {
    ServicePermissionEntry::new(
        Service::new(service.to_ascii_lowercase(), service),
        permissions
            .iter()
            .map(|(name, enabled)| Permission::new(*name, *enabled))
            .collect::<PermissionSet>(),
    )
}

/// Counts calls and optionally holds each call until released.
struct CallGate {
    calls: watch::Sender<usize>,
    permits: Option<Arc<Semaphore>>,
}

impl CallGate {
    fn open() -> Self {
        Self {
            calls: watch::channel(0).0,
            permits: None,
        }
    }

    fn gated() -> Self {
        Self {
            calls: watch::channel(0).0,
            permits: Some(Arc::new(Semaphore::new(0))),
        }
    }

    async fn enter(&self) {
        self.calls.send_modify(|count| *count += 1);
        if let Some(permits) = &self.permits {
            if let Ok(permit) = permits.acquire().await {
                permit.forget();
            }
        }
    }

    fn release(&self) {
        if let Some(permits) = &self.permits {
            permits.add_permits(1);
        }
    }

    fn count(&self) -> usize {
        *self.calls.borrow()
    }

    async fn wait_for(&self, n: usize) {
        let mut rx = self.calls.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

pub(crate) struct ScriptedSignIn {
    outcome: Result<bool, SignInError>,
    gate: CallGate,
}

impl ScriptedSignIn {
    pub(crate) fn accepting() -> Self {
        Self {
            outcome: Ok(true),
            gate: CallGate::open(),
        }
    }

    pub(crate) fn declining() -> Self {
        Self {
            outcome: Ok(false),
            gate: CallGate::open(),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            outcome: Err(SignInError(message.to_string())),
            gate: CallGate::open(),
        }
    }

    pub(crate) fn gated(self) -> Self {
        Self {
            gate: CallGate::gated(),
            ..self
        }
    }

    pub(crate) fn release(&self) {
        self.gate.release();
    }

    pub(crate) fn prompt_count(&self) -> usize {
        self.gate.count()
    }

    pub(crate) async fn wait_for_prompts(&self, n: usize) {
        self.gate.wait_for(n).await;
    }
}

#[async_trait]
impl InteractiveSignIn for ScriptedSignIn {
    async fn prompt(&self) -> Result<SignInOutcome, SignInError> {
        self.gate.enter().await;
        match &self.outcome {
            Ok(true) => Ok(SignInOutcome::Authenticated(test_session())),
            Ok(false) => Ok(SignInOutcome::Declined),
            Err(err) => Err(err.clone()),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub(crate) fn count(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, message: &str, cause: &(dyn std::error::Error + 'static)) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((message.to_string(), cause.to_string()));
    }
}

/// Fixed application list. With [`ScriptedDirectory::hold_first_call`] the
/// first fetch waits for [`ScriptedDirectory::release`]; later fetches
/// answer immediately.
pub(crate) struct ScriptedDirectory {
    response: Mutex<Result<Vec<Application>, ServiceError>>,
    calls: AtomicUsize,
    first_call: CallGate,
}

impl ScriptedDirectory {
    pub(crate) fn with_apps(apps: Vec<Application>) -> Self {
        Self {
            response: Mutex::new(Ok(apps)),
            calls: AtomicUsize::new(0),
            first_call: CallGate::open(),
        }
    }

    pub(crate) fn failing(err: ServiceError) -> Self {
        Self {
            response: Mutex::new(Err(err)),
            calls: AtomicUsize::new(0),
            first_call: CallGate::open(),
        }
    }

    pub(crate) fn hold_first_call(self) -> Self {
        Self {
            first_call: CallGate::gated(),
            ..self
        }
    }

    pub(crate) fn release(&self) {
        self.first_call.release();
    }

    pub(crate) async fn wait_for_first_call(&self) {
        self.first_call.wait_for(1).await;
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryService for ScriptedDirectory {
    async fn list_applications(&self, session: &Session) -> Result<Vec<Application>, ServiceError> {
        assert!(session.is_valid(), "directory called without a valid session");
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.first_call.enter().await;
        }
        self.response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn register_application(
        &self,
        _session: &Session,
        display_name: &str,
    ) -> Result<Application, ServiceError> {
        let id = display_name.to_ascii_lowercase().replace(' ', "-");
        let registered = app(&id);
        if let Ok(apps) = self
            .response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            apps.push(registered.clone());
        }
        Ok(registered)
    }
}

/// Permission lists keyed by object id; individual ids can be gated so
/// their responses complete in a test-chosen order.
#[derive(Default)]
pub(crate) struct ScriptedPermissions {
    responses: HashMap<String, Result<Vec<ServicePermissionEntry>, ServiceError>>,
    gates: HashMap<String, CallGate>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPermissions {
    pub(crate) fn respond(
        mut self,
        object_id: &str,
        response: Result<Vec<ServicePermissionEntry>, ServiceError>,
    ) -> Self {
        self.responses.insert(object_id.to_string(), response);
        self
    }

    pub(crate) fn gate(mut self, object_id: &str) -> Self {
        self.gates.insert(object_id.to_string(), CallGate::gated());
        self
    }

    pub(crate) fn release(&self, object_id: &str) {
        if let Some(gate) = self.gates.get(object_id) {
            gate.release();
        }
    }

    pub(crate) async fn wait_for_call(&self, object_id: &str) {
        if let Some(gate) = self.gates.get(object_id) {
            gate.wait_for(1).await;
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PermissionsService for ScriptedPermissions {
    async fn list_permissions(
        &self,
        session: &Session,
        object_id: &str,
    ) -> Result<Vec<ServicePermissionEntry>, ServiceError> {
        assert!(session.is_valid(), "permissions called without a valid session");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(object_id.to_string());
        if let Some(gate) = self.gates.get(object_id) {
            gate.enter().await;
        }
        self.responses
            .get(object_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
