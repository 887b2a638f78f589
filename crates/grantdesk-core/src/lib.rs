//! Asynchronous load pipeline behind the application permissions dialog.

pub mod apps;
pub mod auth;
pub mod catalog;
pub mod controller;
pub mod dispatcher;
pub mod edit;
pub mod error;
pub mod mailbox;
pub mod model;
pub mod permissions;
pub mod projector;
pub mod services;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

pub use auth::{AuthGate, AuthOutcome};
pub use catalog::JsonCatalog;
pub use controller::{ConfigController, WorkflowStatus};
pub use dispatcher::{DispatcherOptions, Pipeline, TaskDispatcher};
pub use edit::PermissionEditBroker;
pub use error::{PipelineError, ServiceError, SignInError};
pub use mailbox::{Mailbox, PipelineEvent};
pub use model::{Application, Permission, PermissionSet, Service, ServicePermissionEntry};
pub use projector::{ApplicationPicker, PermissionRow, PermissionTable, Projection};
pub use services::{
    DirectoryService, ErrorReporter, InteractiveSignIn, PermissionsService, SignInOutcome,
    TracingErrorReporter,
};
pub use session::Session;
pub use state::{ApplicationList, LoadState, Scope};
