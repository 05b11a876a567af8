//! Single-flight admission queue.
//!
//! At most one request per pipeline holds the execution slot. Everyone else
//! waits in strict FIFO order on a one-shot grant; when the slot is released
//! the queue hands it directly to the next live waiter. No task polls.
//!
//! ```text
//!   enqueue ──▶ [waiting: B, C, D] ──grant──▶ active: A ──release──▶ grant B
//! ```
//!
//! Invariants, upheld under the state mutex:
//!
//! - `active` is either empty or holds exactly one request;
//! - a request id is in `waiting` or in `active`, never both;
//! - grants are issued in enqueue order;
//! - an aborted request keeps the slot until its [`Ticket`] drops, so nothing
//!   new starts while its exchange is still being torn down.
//!
//! The mutex is never held across an `.await`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, Notify};
use tracing::debug;

use crate::RequestId;

/// Signal fired when the active request must stop.
pub(crate) type AbortSignal = Arc<Notify>;

/// Ids currently known to the admission queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// The request holding the execution slot.
    pub active: Option<RequestId>,
    /// Waiting requests, head first.
    pub queued: Vec<RequestId>,
}

impl QueueSnapshot {
    /// `true` when nothing is active or waiting.
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.queued.is_empty()
    }
}

struct Waiter {
    id: RequestId,
    grant: oneshot::Sender<AbortSignal>,
}

struct Active {
    id: RequestId,
    abort: AbortSignal,
    aborted: bool,
}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<Waiter>,
    active: Option<Active>,
}

/// Result of [`AdmissionQueue::enqueue`].
pub(crate) enum Admission {
    /// The slot was free and nobody was waiting.
    Granted(AbortSignal),
    /// Resolves with the abort signal once admitted, or with an error if the
    /// queue was cleared first.
    Waiting(oneshot::Receiver<AbortSignal>),
}

#[derive(Default)]
pub(crate) struct AdmissionQueue {
    state: Mutex<QueueState>,
}

impl AdmissionQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `id` to the queue, granting the slot immediately if possible.
    pub(crate) fn enqueue(&self, id: RequestId) -> Admission {
        let mut state = self.lock();
        if state.active.is_none() && state.waiting.is_empty() {
            let abort = AbortSignal::default();
            state.active = Some(Active {
                id,
                abort: abort.clone(),
                aborted: false,
            });
            debug!(request_id = %id, "admitted immediately");
            return Admission::Granted(abort);
        }

        let (grant, receiver) = oneshot::channel();
        state.waiting.push_back(Waiter { id, grant });
        debug!(request_id = %id, position = state.waiting.len(), "queued");
        Admission::Waiting(receiver)
    }

    /// Gives up the slot held by `id` and admits the next waiter.
    ///
    /// A no-op if `id` does not hold the slot.
    pub(crate) fn release(&self, id: RequestId) {
        let mut state = self.lock();
        if state.active.as_ref().map(|a| a.id) != Some(id) {
            return;
        }
        state.active = None;
        Self::admit_next(&mut state);
    }

    /// Removes `id` wherever it is: out of the waiting list, or out of the
    /// active slot. Used when a caller drops its future.
    pub(crate) fn withdraw(&self, id: RequestId) {
        let mut state = self.lock();
        if let Some(pos) = state.waiting.iter().position(|w| w.id == id) {
            state.waiting.remove(pos);
            debug!(request_id = %id, "withdrawn from queue");
            return;
        }
        if state.active.as_ref().map(|a| a.id) == Some(id) {
            state.active = None;
            Self::admit_next(&mut state);
        }
    }

    /// Drops every waiter and aborts the active request.
    ///
    /// Each waiter's grant is dropped, so it resolves as canceled without ever
    /// starting. The active request is signalled and marked aborted but keeps
    /// the slot until its ticket drops. Returns its id the first time it is
    /// aborted so the caller can abort the transport.
    pub(crate) fn cancel_all(&self) -> Option<RequestId> {
        let mut state = self.lock();
        let dropped = state.waiting.len();
        state.waiting.clear();
        let aborted = match state.active.as_mut() {
            Some(active) if !active.aborted => {
                active.aborted = true;
                active.abort.notify_one();
                Some(active.id)
            }
            _ => None,
        };
        debug!(dropped, aborted = aborted.is_some(), "admission queue cleared");
        aborted
    }

    /// An aborted request still draining is not reported as active.
    pub(crate) fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        QueueSnapshot {
            active: state.active.as_ref().filter(|a| !a.aborted).map(|a| a.id),
            queued: state.waiting.iter().map(|w| w.id).collect(),
        }
    }

    fn admit_next(state: &mut QueueState) {
        while let Some(waiter) = state.waiting.pop_front() {
            let abort = AbortSignal::default();
            if waiter.grant.send(abort.clone()).is_ok() {
                debug!(request_id = %waiter.id, "admitted from queue");
                state.active = Some(Active {
                    id: waiter.id,
                    abort,
                    aborted: false,
                });
                return;
            }
            // The waiting caller went away without withdrawing; skip it.
        }
    }
}

/// Keeps a request's place in the [`AdmissionQueue`] and gives it up on drop.
pub(crate) struct Ticket {
    queue: Arc<AdmissionQueue>,
    id: RequestId,
}

impl Ticket {
    pub(crate) fn new(queue: Arc<AdmissionQueue>, id: RequestId) -> Self {
        Self { queue, id }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.queue.withdraw(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<RequestId> {
        (0..n).map(|_| RequestId::new_random()).collect()
    }

    #[test]
    fn first_request_is_granted_immediately() {
        let queue = AdmissionQueue::default();
        let a = RequestId::new_random();
        assert!(matches!(queue.enqueue(a), Admission::Granted(_)));
        assert_eq!(queue.snapshot().active, Some(a));
    }

    #[tokio::test]
    async fn release_grants_waiters_in_fifo_order() {
        let queue = AdmissionQueue::default();
        let ids = ids(3);
        let _a = queue.enqueue(ids[0]);
        let Admission::Waiting(b) = queue.enqueue(ids[1]) else {
            panic!("b should wait")
        };
        let Admission::Waiting(mut c) = queue.enqueue(ids[2]) else {
            panic!("c should wait")
        };
        assert_eq!(queue.snapshot().queued, vec![ids[1], ids[2]]);

        queue.release(ids[0]);
        assert!(b.await.is_ok());
        assert!(c.try_recv().is_err());
        assert_eq!(queue.snapshot().active, Some(ids[1]));

        queue.release(ids[1]);
        assert!(c.await.is_ok());
        assert_eq!(queue.snapshot().active, Some(ids[2]));
    }

    #[tokio::test]
    async fn abandoned_waiters_are_skipped() {
        let queue = AdmissionQueue::default();
        let ids = ids(3);
        let _a = queue.enqueue(ids[0]);
        let b = queue.enqueue(ids[1]);
        let Admission::Waiting(c) = queue.enqueue(ids[2]) else {
            panic!("c should wait")
        };
        drop(b);

        queue.release(ids[0]);
        assert!(c.await.is_ok());
        assert_eq!(queue.snapshot().active, Some(ids[2]));
    }

    #[tokio::test]
    async fn cancel_all_empties_everything() {
        let queue = AdmissionQueue::default();
        let ids = ids(2);
        let Admission::Granted(abort) = queue.enqueue(ids[0]) else {
            panic!("a should be granted")
        };
        let Admission::Waiting(b) = queue.enqueue(ids[1]) else {
            panic!("b should wait")
        };

        assert_eq!(queue.cancel_all(), Some(ids[0]));
        assert!(b.await.is_err());
        assert!(queue.snapshot().is_idle());
        // The stored permit completes the abort wait immediately.
        abort.notified().await;
        // Already aborted; nothing new to abort.
        assert_eq!(queue.cancel_all(), None);
    }

    #[tokio::test]
    async fn aborted_request_holds_the_slot_until_released() {
        let queue = AdmissionQueue::default();
        let ids = ids(2);
        let _a = queue.enqueue(ids[0]);
        queue.cancel_all();

        let Admission::Waiting(mut c) = queue.enqueue(ids[1]) else {
            panic!("c must wait for the aborted request to finish")
        };
        assert!(c.try_recv().is_err());
        assert_eq!(queue.snapshot().queued, vec![ids[1]]);

        queue.release(ids[0]);
        assert!(c.await.is_ok());
        assert_eq!(queue.snapshot().active, Some(ids[1]));
    }

    #[test]
    fn dropping_an_active_ticket_admits_the_next_waiter() {
        let queue = Arc::new(AdmissionQueue::default());
        let ids = ids(2);
        let _a = queue.enqueue(ids[0]);
        let _b = queue.enqueue(ids[1]);

        drop(Ticket::new(queue.clone(), ids[0]));
        assert_eq!(queue.snapshot().active, Some(ids[1]));

        drop(Ticket::new(queue.clone(), ids[1]));
        assert!(queue.snapshot().is_idle());
    }
}
