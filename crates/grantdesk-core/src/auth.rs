use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::projector::AUTH_FAILED;
use crate::services::{ErrorReporter, InteractiveSignIn, SignInOutcome};
use crate::session::Session;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Ready(Session),
    Aborted,
}

struct HeldSession {
    session: Session,
    epoch: u64,
}

/// Sole owner and mutator of the process-wide [`Session`].
///
/// `ensure_authenticated` calls are serialized by the slot lock, so at most
/// one interactive prompt runs at a time. `sign_out` advances the epoch
/// without waiting for the lock: a session obtained under an older epoch is
/// treated as absent, including one produced by a prompt that was still
/// running when sign-out happened.
pub struct AuthGate {
    slot: Mutex<Option<HeldSession>>,
    epoch: AtomicU64,
    sign_in: Arc<dyn InteractiveSignIn>,
    reporter: Arc<dyn ErrorReporter>,
}

impl AuthGate {
    pub fn new(sign_in: Arc<dyn InteractiveSignIn>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            slot: Mutex::new(None),
            epoch: AtomicU64::new(0),
            sign_in,
            reporter,
        }
    }

    /// Seeds the gate with a previously issued session (e.g. a token cache).
    pub fn with_session(self, session: Session) -> Self {
        let held = HeldSession { session, epoch: 0 };
        Self {
            slot: Mutex::new(Some(held)),
            ..self
        }
    }

    pub async fn ensure_authenticated(&self) -> AuthOutcome {
        let mut slot = self.slot.lock().await;
        let epoch = self.epoch.load(Ordering::SeqCst);
        let now = grantdesk_util::now_millis();

        if let Some(held) = slot.as_ref() {
            if held.epoch == epoch && held.session.is_valid_at(now) {
                return AuthOutcome::Ready(held.session.clone());
            }
            debug!("held session is stale or expired; discarding");
        }
        *slot = None;

        info!("no valid session; starting interactive sign-in");
        match self.sign_in.prompt().await {
            Ok(SignInOutcome::Authenticated(session)) => {
                if !session.is_valid() {
                    warn!("sign-in returned an unusable session");
                    return AuthOutcome::Aborted;
                }
                info!(account = %session.account, "signed in");
                *slot = Some(HeldSession {
                    session: session.clone(),
                    epoch,
                });
                AuthOutcome::Ready(session)
            }
            Ok(SignInOutcome::Declined) => {
                info!("sign-in declined");
                AuthOutcome::Aborted
            }
            Err(err) => {
                self.reporter.report(AUTH_FAILED, &err);
                AuthOutcome::Aborted
            }
        }
    }

    /// Invalidates the session. Idempotent and never blocks.
    pub fn sign_out(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut slot) = self.slot.try_lock() {
            *slot = None;
        }
        info!(epoch, "signed out");
    }

    /// The currently valid session, if any. Never prompts.
    pub async fn current_session(&self) -> Option<Session> {
        let slot = self.slot.lock().await;
        let epoch = self.epoch.load(Ordering::SeqCst);
        slot.as_ref()
            .filter(|held| held.epoch == epoch && held.session.is_valid())
            .map(|held| held.session.clone())
    }
}
