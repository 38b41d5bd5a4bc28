//! Coordination primitives for the per-send background tasks.
//!
//! [`ReadinessCell`] turns the "run exactly once, everyone else waits" rule
//! of the readiness ceremony into an explicit state cell with an atomic
//! claim. [`ErrorSlot`] replaces a raw shared error channel with a buffer
//! sized for its writers, so a late writer can never block on a reader that
//! already got its answer.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tracing::debug;

use crate::error::BootstrapError;

/// Outcome of the readiness ceremony as observed by waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadinessState {
    /// The ceremony has not finished yet.
    Pending,
    /// Encryption state is unlocked; sending may proceed.
    Ready,
    /// The ceremony failed; the send must abort.
    Failed(BootstrapError),
}

/// One-shot readiness signal with an atomic claim.
///
/// The first sync batch to claim the cell runs the ceremony; later batches
/// and the foreground flow await the terminal state, which is written at
/// most once.
#[derive(Debug)]
pub(crate) struct ReadinessCell {
    claimed: AtomicBool,
    state: watch::Sender<ReadinessState>,
}

impl ReadinessCell {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ReadinessState::Pending);
        ReadinessCell {
            claimed: AtomicBool::new(false),
            state,
        }
    }

    /// Attempt to claim the ceremony run. Only the first caller wins.
    pub(crate) fn try_claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    /// Publish the terminal state. Completions after the first are ignored.
    pub(crate) fn complete(&self, outcome: Result<(), BootstrapError>) {
        let next = match outcome {
            Ok(()) => ReadinessState::Ready,
            Err(error) => ReadinessState::Failed(error),
        };
        self.state.send_if_modified(|state| {
            if *state == ReadinessState::Pending {
                *state = next.clone();
                true
            } else {
                debug!("ignoring readiness completion after the terminal state");
                false
            }
        });
    }

    /// Wait for the terminal state.
    pub(crate) async fn wait(&self) -> Result<(), BootstrapError> {
        let mut rx = self.state.subscribe();
        loop {
            match rx.borrow_and_update().clone() {
                ReadinessState::Pending => {}
                ReadinessState::Ready => return Ok(()),
                ReadinessState::Failed(error) => return Err(error),
            }
            if rx.changed().await.is_err() {
                // The sender is a field of this cell, which the borrow on
                // `self` keeps alive for the whole wait.
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> ReadinessState {
        self.state.borrow().clone()
    }
}

impl Default for ReadinessCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffered first-error slot shared by the background writers.
#[derive(Debug)]
pub(crate) struct ErrorSlot<E> {
    tx: mpsc::Sender<E>,
    rx: Mutex<mpsc::Receiver<E>>,
}

impl<E: std::fmt::Display> ErrorSlot<E> {
    /// Slot with room for one failure per writer.
    pub(crate) fn new(writers: usize) -> Self {
        let (tx, rx) = mpsc::channel(writers.max(1));
        ErrorSlot {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Record a terminal failure. Never blocks; once the buffer is full the
    /// call has already been decided and the surplus value is dropped.
    pub(crate) fn offer(&self, error: E) {
        use mpsc::error::TrySendError;

        match self.tx.try_send(error) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) | Err(TrySendError::Closed(dropped)) => {
                debug!(error = %dropped, "error slot already decided, dropping follow-up failure");
            }
        }
    }

    /// First failure offered by any writer. Pends forever when none ever
    /// arrives, so a select can race it against the success path.
    pub(crate) async fn first(&self) -> E {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(error) => error,
            // The slot holds its own sender, so the channel cannot close.
            None => std::future::pending().await,
        }
    }
}
