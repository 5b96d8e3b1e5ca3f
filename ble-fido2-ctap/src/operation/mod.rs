//! Ceremony operations
//!
//! An operation moves through `Idle -> Started -> {Completed | Stopped}`.
//! Completion, session-reported stop, session unavailability, timeout and
//! caller cancellation all race to settle the same [`Lifecycle`]; whichever
//! arrives first wins and every later trigger is a no-op.

mod create;
mod get;

pub use create::CreateOperation;
pub use get::GetOperation;

use crate::error::{Error, Result};
use crate::session::SessionCapabilities;
use crate::types::UserVerificationRequirement;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Observable state of a ceremony operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Started,
    Completed,
    Stopped(Error),
}

struct Slot<T> {
    state: OperationState,
    result: Option<oneshot::Sender<Result<T>>>,
    timer: Option<JoinHandle<()>>,
}

/// Once-only settlement of a ceremony result
pub(crate) struct Lifecycle<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Lifecycle<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: OperationState::Idle,
                result: None,
                timer: None,
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> OperationState {
        self.slot().state.clone()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.slot().state == OperationState::Started
    }

    /// Move from `Idle` to `Started` and hand out the result receiver
    pub(crate) fn begin(&self) -> Result<oneshot::Receiver<Result<T>>> {
        let mut slot = self.slot();
        if slot.state != OperationState::Idle {
            tracing::debug!(state = ?slot.state, "operation already started or stopped");
            return Err(Error::BadOperation);
        }
        let (tx, rx) = oneshot::channel();
        slot.state = OperationState::Started;
        slot.result = Some(tx);
        Ok(rx)
    }

    /// Attach the lifetime timer; aborted at once if already settled
    pub(crate) fn arm_timer(&self, timer: JoinHandle<()>) {
        let mut slot = self.slot();
        if slot.state == OperationState::Started {
            slot.timer = Some(timer);
        } else {
            timer.abort();
        }
    }

    /// Resolve with success; returns false if the operation was not running
    pub(crate) fn complete(&self, value: T) -> bool {
        let (timer, result) = {
            let mut slot = self.slot();
            if slot.state != OperationState::Started {
                tracing::debug!(state = ?slot.state, "completion after settlement ignored");
                return false;
            }
            slot.state = OperationState::Completed;
            (slot.timer.take(), slot.result.take())
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(result) = result {
            let _ = result.send(Ok(value));
        }
        true
    }

    /// Single stop path: flag, timer, session, then the caller
    ///
    /// Returns false when the operation was already settled. The lock is
    /// released before `cancel_session` runs so a session may re-enter.
    pub(crate) fn stop(&self, reason: Error, cancel_session: impl FnOnce(&Error)) -> bool {
        let (timer, result) = {
            let mut slot = self.slot();
            if matches!(
                slot.state,
                OperationState::Completed | OperationState::Stopped(_)
            ) {
                tracing::debug!(state = ?slot.state, "already stopped");
                return false;
            }
            if slot.state == OperationState::Idle {
                slot.state = OperationState::Stopped(reason);
                return true;
            }
            slot.state = OperationState::Stopped(reason.clone());
            (slot.timer.take(), slot.result.take())
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        cancel_session(&reason);
        if let Some(result) = result {
            let _ = result.send(Err(reason));
        }
        true
    }
}

/// A ceremony driven against one authenticator session
pub(crate) trait Ceremony: Send + Sync + Sized + 'static {
    type Output: Send + 'static;

    fn lifecycle(&self) -> &Lifecycle<Self::Output>;

    fn lifetime(&self) -> Duration;

    /// Install `listener` on the session and start it
    fn open_session(&self, listener: Listener<Self>);

    fn cancel_session(&self, reason: Error);

    /// Every stop trigger ends here
    fn stop(&self, reason: Error) {
        tracing::debug!(%reason, "stop");
        self.lifecycle()
            .stop(reason, |reason| self.cancel_session(reason.clone()));
    }
}

/// Run `ceremony` to its single outcome
///
/// Fails with [`Error::BadOperation`] if it was already started or stopped.
pub(crate) async fn drive<C: Ceremony>(ceremony: &Arc<C>) -> Result<C::Output> {
    tracing::debug!("start");
    let receiver = ceremony.lifecycle().begin()?;

    let weak = Arc::downgrade(ceremony);
    let lifetime = ceremony.lifetime();
    ceremony.lifecycle().arm_timer(tokio::spawn(async move {
        tokio::time::sleep(lifetime).await;
        if let Some(ceremony) = weak.upgrade() {
            tracing::debug!("ceremony timed out");
            ceremony.stop(Error::Timeout);
        }
    }));

    ceremony.open_session(Listener {
        ceremony: Arc::downgrade(ceremony),
    });

    settled(receiver).await
}

/// Session listener that holds its ceremony weakly
pub(crate) struct Listener<C> {
    ceremony: Weak<C>,
}

impl<C: Ceremony> Listener<C> {
    pub(crate) fn with_ceremony(&self, f: impl FnOnce(&C)) {
        match self.ceremony.upgrade() {
            Some(ceremony) => f(&ceremony),
            None => tracing::trace!("event for a dropped operation"),
        }
    }

    pub(crate) fn unavailable(&self) {
        tracing::debug!("session unavailable");
        self.with_ceremony(|ceremony| ceremony.stop(Error::NotAllowed));
    }

    pub(crate) fn stopped(&self, reason: Error) {
        tracing::debug!(%reason, "session stopped");
        self.with_ceremony(|ceremony| ceremony.stop(reason));
    }
}

/// Whether user verification should be performed for `requirement`
pub(crate) fn judge_user_verification<S: SessionCapabilities + ?Sized>(
    requirement: UserVerificationRequirement,
    session: &S,
) -> bool {
    match requirement {
        UserVerificationRequirement::Required => true,
        UserVerificationRequirement::Discouraged => false,
        UserVerificationRequirement::Preferred => session.can_perform_user_verification(),
    }
}

/// Await the settled result; a dropped sender means the operation vanished
pub(crate) async fn settled<T>(receiver: oneshot::Receiver<Result<T>>) -> Result<T> {
    receiver.await.unwrap_or(Err(Error::Cancelled))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_complete_resolves_once() {
        let lifecycle = Lifecycle::<u32>::new();
        let rx = lifecycle.begin().unwrap();

        assert!(lifecycle.complete(7));
        assert!(!lifecycle.complete(8));
        assert!(!lifecycle.stop(Error::Timeout, |_| panic!("session cancelled after completion")));

        assert_eq!(settled(rx).await, Ok(7));
        assert_eq!(lifecycle.state(), OperationState::Completed);
    }

    #[tokio::test]
    async fn test_stop_cancels_session_once() {
        let lifecycle = Lifecycle::<u32>::new();
        let rx = lifecycle.begin().unwrap();
        let cancels = AtomicUsize::new(0);

        assert!(lifecycle.stop(Error::NotAllowed, |reason| {
            assert_eq!(*reason, Error::NotAllowed);
            cancels.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!lifecycle.stop(Error::Timeout, |_| {
            cancels.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert_eq!(settled(rx).await, Err(Error::NotAllowed));
        assert_eq!(lifecycle.state(), OperationState::Stopped(Error::NotAllowed));
    }

    #[tokio::test]
    async fn test_begin_twice_is_bad_operation() {
        let lifecycle = Lifecycle::<u32>::new();
        let _rx = lifecycle.begin().unwrap();
        assert!(matches!(lifecycle.begin(), Err(Error::BadOperation)));
        assert!(lifecycle.is_started());
    }

    #[tokio::test]
    async fn test_stop_before_begin() {
        let lifecycle = Lifecycle::<u32>::new();
        assert!(lifecycle.stop(Error::Cancelled, |_| panic!("no session to cancel")));
        assert!(matches!(lifecycle.begin(), Err(Error::BadOperation)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_aborted_on_completion() {
        let lifecycle = Lifecycle::<u32>::new();
        let rx = lifecycle.begin().unwrap();

        let fired = std::sync::Arc::new(AtomicUsize::new(0));
        let flag = fired.clone();
        lifecycle.arm_timer(tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(lifecycle.complete(1));
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(settled(rx).await, Ok(1));
    }

    /// Ceremony whose session never answers
    struct Silent {
        lifecycle: Lifecycle<u32>,
        listener: Mutex<Option<Listener<Silent>>>,
        cancels: AtomicUsize,
    }

    impl Silent {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                lifecycle: Lifecycle::new(),
                listener: Mutex::new(None),
                cancels: AtomicUsize::new(0),
            })
        }
    }

    impl Ceremony for Silent {
        type Output = u32;

        fn lifecycle(&self) -> &Lifecycle<u32> {
            &self.lifecycle
        }

        fn lifetime(&self) -> Duration {
            Duration::from_secs(10)
        }

        fn open_session(&self, listener: Listener<Self>) {
            *self.listener.lock().unwrap() = Some(listener);
        }

        fn cancel_session(&self, _reason: Error) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_times_out_once() {
        let ceremony = Silent::new();

        assert_eq!(drive(&ceremony).await, Err(Error::Timeout));
        assert_eq!(ceremony.cancels.load(Ordering::SeqCst), 1);

        let listener = ceremony.listener.lock().unwrap().take().unwrap();
        listener.stopped(Error::NotAllowed);
        listener.unavailable();
        assert_eq!(ceremony.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(ceremony.lifecycle.state(), OperationState::Stopped(Error::Timeout));

        assert!(matches!(drive(&ceremony).await, Err(Error::BadOperation)));
    }

    #[tokio::test]
    async fn test_drive_settles_on_session_stop() {
        let ceremony = Silent::new();
        let runner = {
            let ceremony = ceremony.clone();
            tokio::spawn(async move { drive(&ceremony).await })
        };

        let listener = loop {
            if let Some(listener) = ceremony.listener.lock().unwrap().take() {
                break listener;
            }
            tokio::task::yield_now().await;
        };
        listener.unavailable();

        assert_eq!(runner.await.unwrap(), Err(Error::NotAllowed));
        assert_eq!(ceremony.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_outliving_ceremony() {
        let ceremony = Silent::new();
        let listener = Listener {
            ceremony: Arc::downgrade(&ceremony),
        };
        drop(ceremony);
        listener.stopped(Error::Cancelled);
        listener.with_ceremony(|_| panic!("ceremony was dropped"));
    }

    #[tokio::test]
    async fn test_dropped_lifecycle_reports_cancelled() {
        let lifecycle = Lifecycle::<u32>::new();
        let rx = lifecycle.begin().unwrap();
        drop(lifecycle);
        assert_eq!(settled(rx).await, Err(Error::Cancelled));
    }
}
