use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::model::{Application, ServicePermissionEntry};
use crate::state::{ApplicationList, LoadState, Scope};

pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 64;
// One result per scope plus a cancellation.
const MIN_EVENT_QUEUE_SIZE: usize = 3;

/// Results handed from the worker pool to the consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    ApplicationsLoaded {
        seq: u64,
        state: LoadState<ApplicationList>,
    },
    PermissionsLoaded {
        seq: u64,
        app: Application,
        state: LoadState<Vec<ServicePermissionEntry>>,
    },
    /// Sign-in was declined or failed; the workflow must stop.
    WorkflowCancelled { scope: Scope },
}

impl PipelineEvent {
    fn load_key(&self) -> Option<(Scope, u64)> {
        match self {
            PipelineEvent::ApplicationsLoaded { seq, .. } => Some((Scope::Applications, *seq)),
            PipelineEvent::PermissionsLoaded { seq, .. } => Some((Scope::Permissions, *seq)),
            PipelineEvent::WorkflowCancelled { .. } => None,
        }
    }
}

pub(crate) struct EventQueue {
    queue: Mutex<VecDeque<PipelineEvent>>,
    max_len: usize,
}

/// Producer end. Once every sender is dropped the mailbox reports closure.
#[derive(Clone)]
pub(crate) struct EventSender {
    inner: Arc<EventQueue>,
    notify: mpsc::Sender<()>,
}

/// Consumer end of the handoff. Owned by the single consumer context.
pub struct Mailbox {
    queue: Arc<EventQueue>,
    notify_rx: mpsc::Receiver<()>,
}

impl EventQueue {
    pub(crate) fn new(max_len: usize) -> (EventSender, Mailbox) {
        let (notify, notify_rx) = mpsc::channel(1);
        let queue = Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            max_len: max_len.max(MIN_EVENT_QUEUE_SIZE),
        });
        (
            EventSender {
                inner: Arc::clone(&queue),
                notify,
            },
            Mailbox { queue, notify_rx },
        )
    }

    fn drain(&self) -> Vec<PipelineEvent> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }

    /// Returns `(queued, was_empty)`; `queued` is false when the event was
    /// merged into one already waiting.
    fn push(&self, event: PipelineEvent) -> (bool, bool) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let was_empty = queue.is_empty();

        // A queued result for the same scope is superseded by a newer one.
        if let Some((scope, seq)) = event.load_key() {
            if let Some(existing) = queue
                .iter_mut()
                .find(|queued| matches!(queued.load_key(), Some((s, _)) if s == scope))
            {
                if let Some((_, queued_seq)) = existing.load_key() {
                    if queued_seq <= seq {
                        *existing = event;
                    }
                }
                return (false, false);
            }
        }

        if event.load_key().is_none() && queue.iter().any(|queued| queued.load_key().is_none()) {
            return (false, false);
        }

        if queue.len() >= self.max_len {
            queue.pop_front();
        }

        queue.push_back(event);
        (true, was_empty)
    }
}

impl EventSender {
    pub(crate) fn send(&self, event: PipelineEvent) -> bool {
        let (queued, was_empty) = self.inner.push(event);
        if was_empty {
            let _ = self.notify.try_send(());
        }
        queued
    }
}

impl Mailbox {
    /// Waits until at least one event is queued and takes all of them.
    /// Returns an empty batch once the worker side has shut down.
    pub async fn recv(&mut self) -> Vec<PipelineEvent> {
        loop {
            let batch = self.queue.drain();
            if !batch.is_empty() {
                return batch;
            }
            if self.notify_rx.recv().await.is_none() {
                return Vec::new();
            }
        }
    }

    /// Takes whatever is queued without waiting.
    pub fn try_recv(&mut self) -> Vec<PipelineEvent> {
        while self.notify_rx.try_recv().is_ok() {}
        self.queue.drain()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_secs(2);

    fn apps_loaded(seq: u64) -> PipelineEvent {
        PipelineEvent::ApplicationsLoaded {
            seq,
            state: LoadState::Empty,
        }
    }

    fn permissions_loaded(seq: u64) -> PipelineEvent {
        PipelineEvent::PermissionsLoaded {
            seq,
            app: crate::testing::app("x"),
            state: LoadState::Empty,
        }
    }

    #[tokio::test]
    async fn recv_returns_events_in_push_order() {
        let (sender, mut mailbox) = EventQueue::new(8);
        sender.send(apps_loaded(1));
        sender.send(permissions_loaded(1));

        let batch = timeout(TEST_TIMEOUT, mailbox.recv())
            .await
            .expect("recv timed out");
        assert_eq!(batch, vec![apps_loaded(1), permissions_loaded(1)]);
        assert!(mailbox.try_recv().is_empty());
    }

    #[test]
    fn newer_result_replaces_queued_result_for_same_scope() {
        let (sender, mut mailbox) = EventQueue::new(8);
        assert!(sender.send(apps_loaded(1)));
        assert!(!sender.send(apps_loaded(3)));
        assert!(!sender.send(apps_loaded(2)));

        assert_eq!(mailbox.try_recv(), vec![apps_loaded(3)]);
    }

    #[test]
    fn cancellation_is_queued_once_next_to_pending_results() {
        let (sender, mut mailbox) = EventQueue::new(1);
        let cancel = PipelineEvent::WorkflowCancelled {
            scope: Scope::Applications,
        };
        sender.send(apps_loaded(1));
        sender.send(permissions_loaded(1));
        assert!(sender.send(cancel.clone()));
        assert!(!sender.send(PipelineEvent::WorkflowCancelled {
            scope: Scope::Permissions,
        }));

        assert_eq!(
            mailbox.try_recv(),
            vec![apps_loaded(1), permissions_loaded(1), cancel]
        );
    }

    #[tokio::test]
    async fn recv_reports_closure_after_last_sender_drops() {
        let (sender, mut mailbox) = EventQueue::new(8);
        sender.send(apps_loaded(2));
        drop(sender);

        let first = timeout(TEST_TIMEOUT, mailbox.recv()).await.expect("recv");
        assert_eq!(first, vec![apps_loaded(2)]);
        let closed = timeout(TEST_TIMEOUT, mailbox.recv()).await.expect("recv");
        assert!(closed.is_empty());
    }

    #[tokio::test]
    async fn wakes_consumer_for_events_pushed_after_a_drain() {
        let (sender, mut mailbox) = EventQueue::new(8);
        sender.send(apps_loaded(1));
        assert_eq!(mailbox.try_recv().len(), 1);

        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.send(permissions_loaded(4));
        });

        let batch = timeout(TEST_TIMEOUT, mailbox.recv())
            .await
            .expect("recv timed out");
        assert_eq!(batch, vec![permissions_loaded(4)]);
        producer.await.expect("producer");
    }
}
