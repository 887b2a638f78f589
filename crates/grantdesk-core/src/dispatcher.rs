use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use futures_util::FutureExt;
use grantdesk_telemetry as telemetry;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::apps::ApplicationListLoader;
use crate::auth::AuthGate;
use crate::error::{PipelineError, ServiceError};
use crate::mailbox::{EventQueue, EventSender, Mailbox, PipelineEvent, DEFAULT_EVENT_QUEUE_SIZE};
use crate::model::Application;
use crate::permissions::PermissionListLoader;
use crate::services::{DirectoryService, ErrorReporter, PermissionsService};
use crate::state::{LoadState, Scope};

const COMMAND_QUEUE_SIZE: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatcherOptions {
    pub worker_threads: usize,
    pub max_in_flight: usize,
    pub event_queue_size: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_in_flight: 4,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
        }
    }
}

/// Loaders and the gate they share, cloned into every worker task.
#[derive(Clone)]
pub struct Pipeline {
    auth: Arc<AuthGate>,
    apps: ApplicationListLoader,
    permissions: PermissionListLoader,
}

impl Pipeline {
    pub fn new(
        auth: Arc<AuthGate>,
        directory: Arc<dyn DirectoryService>,
        permissions: Arc<dyn PermissionsService>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            apps: ApplicationListLoader::new(auth.clone(), directory, reporter.clone()),
            permissions: PermissionListLoader::new(auth.clone(), permissions, reporter),
            auth,
        }
    }

    pub fn auth(&self) -> &Arc<AuthGate> {
        &self.auth
    }
}

#[derive(Clone, Debug)]
enum WorkerCommand {
    LoadApplications {
        seq: u64,
        preferred_app_id: Option<String>,
    },
    LoadPermissions {
        seq: u64,
        app: Application,
    },
}

impl WorkerCommand {
    fn scope(&self) -> Scope {
        match self {
            WorkerCommand::LoadApplications { .. } => Scope::Applications,
            WorkerCommand::LoadPermissions { .. } => Scope::Permissions,
        }
    }

    fn seq(&self) -> u64 {
        match self {
            WorkerCommand::LoadApplications { seq, .. }
            | WorkerCommand::LoadPermissions { seq, .. } => *seq,
        }
    }

    /// The event delivered when the load could not produce a state itself.
    fn failure_event(&self, err: ServiceError) -> PipelineEvent {
        match self {
            WorkerCommand::LoadApplications { seq, .. } => PipelineEvent::ApplicationsLoaded {
                seq: *seq,
                state: LoadState::Error(err),
            },
            WorkerCommand::LoadPermissions { seq, app } => PipelineEvent::PermissionsLoaded {
                seq: *seq,
                app: app.clone(),
                state: LoadState::Error(err),
            },
        }
    }
}

/// Latest issued request number per scope. Written only by the consumer;
/// workers read it to skip loads that were superseded before they started.
#[derive(Debug, Default)]
struct ScopeSequences {
    apps: AtomicU64,
    permissions: AtomicU64,
}

impl ScopeSequences {
    fn slot(&self, scope: Scope) -> &AtomicU64 {
        match scope {
            Scope::Applications => &self.apps,
            Scope::Permissions => &self.permissions,
        }
    }

    fn advance(&self, scope: Scope) -> u64 {
        self.slot(scope).fetch_add(1, Ordering::SeqCst) + 1
    }

    fn latest(&self, scope: Scope) -> u64 {
        self.slot(scope).load(Ordering::SeqCst)
    }
}

/// Schedules loader work on a background worker pool and hands results to
/// the consumer through a [`Mailbox`].
pub struct TaskDispatcher {
    cmd_tx: mpsc::Sender<WorkerCommand>,
    sequences: Arc<ScopeSequences>,
}

impl TaskDispatcher {
    pub fn start(pipeline: Pipeline, options: DispatcherOptions) -> io::Result<(Self, Mailbox)> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCommand>(COMMAND_QUEUE_SIZE);
        let (events, mailbox) = EventQueue::new(options.event_queue_size);
        let sequences = Arc::new(ScopeSequences::default());

        let worker = Worker {
            pipeline,
            events,
            sequences: sequences.clone(),
            permits: Arc::new(Semaphore::new(options.max_in_flight.max(1))),
        };

        // The runtime lives on its own thread so that dropping the
        // dispatcher from inside an async consumer never drops a runtime.
        thread::Builder::new()
            .name("grantdesk-dispatcher".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(options.worker_threads.max(1))
                    .thread_name("grantdesk-worker")
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        error!("failed to build worker runtime: {err}");
                        return;
                    }
                };
                rt.block_on(worker.run(cmd_rx));
            })?;

        Ok((Self { cmd_tx, sequences }, mailbox))
    }

    pub fn load_applications(&self, preferred_app_id: Option<String>) -> Result<u64, ServiceError> {
        let seq = self.sequences.advance(Scope::Applications);
        self.submit(WorkerCommand::LoadApplications {
            seq,
            preferred_app_id,
        })?;
        Ok(seq)
    }

    pub fn load_permissions(&self, app: Application) -> Result<u64, ServiceError> {
        let seq = self.sequences.advance(Scope::Permissions);
        self.submit(WorkerCommand::LoadPermissions { seq, app })?;
        Ok(seq)
    }

    /// Marks every outstanding load for `scope` as stale without scheduling
    /// a new one.
    pub fn invalidate(&self, scope: Scope) -> u64 {
        self.sequences.advance(scope)
    }

    pub fn is_current(&self, scope: Scope, seq: u64) -> bool {
        self.sequences.latest(scope) == seq
    }

    fn submit(&self, cmd: WorkerCommand) -> Result<(), ServiceError> {
        self.cmd_tx.try_send(cmd).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                ServiceError::Internal("worker queue is full".into())
            }
            mpsc::error::TrySendError::Closed(_) => {
                ServiceError::Internal("worker pool is not running".into())
            }
        })
    }
}

struct Worker {
    pipeline: Pipeline,
    events: EventSender,
    sequences: Arc<ScopeSequences>,
    permits: Arc<Semaphore>,
}

impl Worker {
    async fn run(self, mut cmd_rx: mpsc::Receiver<WorkerCommand>) {
        let this = Arc::new(self);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    tasks.spawn(Arc::clone(&this).execute(cmd));
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = result {
                        if !err.is_cancelled() {
                            error!("loader task failed: {err}");
                        }
                    }
                }
            }
        }

        // Consumer is gone; nothing left to deliver to.
        tasks.shutdown().await;
        debug!("dispatcher stopped");
    }

    async fn execute(self: Arc<Self>, cmd: WorkerCommand) {
        let scope = cmd.scope();
        let seq = cmd.seq();

        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            return;
        };
        if self.sequences.latest(scope) != seq {
            debug!(%scope, seq, "superseded before start; skipping");
            return;
        }

        telemetry::event("pipeline.load.start", &[("scope", scope.as_str())]);
        let outcome = AssertUnwindSafe(self.load(cmd.clone())).catch_unwind().await;
        let event = match outcome {
            Ok(Ok(event)) => event,
            Ok(Err(err)) if err.is_terminal() => PipelineEvent::WorkflowCancelled { scope },
            Ok(Err(err)) => cmd.failure_event(ServiceError::Internal(err.to_string())),
            Err(_) => {
                error!(%scope, seq, "loader panicked");
                cmd.failure_event(ServiceError::Internal("loader task panicked".into()))
            }
        };

        let result = match &event {
            PipelineEvent::ApplicationsLoaded { state, .. } => state.label(),
            PipelineEvent::PermissionsLoaded { state, .. } => state.label(),
            PipelineEvent::WorkflowCancelled { .. } => "cancelled",
        };
        telemetry::event(
            "pipeline.load.result",
            &[("scope", scope.as_str()), ("result", result)],
        );

        if !self.events.send(event) {
            debug!(%scope, seq, "merged into an event already queued");
        }
    }

    async fn load(&self, cmd: WorkerCommand) -> Result<PipelineEvent, PipelineError> {
        match cmd {
            WorkerCommand::LoadApplications {
                seq,
                preferred_app_id,
            } => {
                let state = self
                    .pipeline
                    .apps
                    .load(preferred_app_id.as_deref())
                    .await?;
                Ok(PipelineEvent::ApplicationsLoaded { seq, state })
            }
            WorkerCommand::LoadPermissions { seq, app } => {
                let state = self.pipeline.permissions.load(&app).await?;
                Ok(PipelineEvent::PermissionsLoaded { seq, app, state })
            }
        }
    }
}
