//! Background synchronization loop owning the readiness ceremony.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bootstrap;
use crate::client::ProtocolClient;
use crate::error::{Error, TransportError};
use crate::signal::{ErrorSlot, ReadinessCell};
use crate::types::RecoveryKey;

/// Handle over the spawned sync task.
///
/// The loop is claimed-by-construction: whoever starts the coordinator also
/// owns stopping it, and `shutdown` both cancels and joins so no task
/// outlives the send that spawned it.
pub(crate) struct SyncCoordinator {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncCoordinator {
    pub(crate) fn start(
        client: Arc<dyn ProtocolClient>,
        recovery_key: RecoveryKey,
        readiness: Arc<ReadinessCell>,
        errors: Arc<ErrorSlot<Error>>,
    ) -> Self {
        let stop = CancellationToken::new();
        let task = tokio::spawn(run_sync_loop(
            client,
            recovery_key,
            readiness,
            errors,
            stop.clone(),
        ));
        SyncCoordinator { stop, task }
    }

    /// Cancel the loop and wait for the task to unwind.
    pub(crate) async fn shutdown(self) {
        self.stop.cancel();
        if let Err(error) = self.task.await
            && error.is_panic()
        {
            warn!(error = %error, "sync task panicked during shutdown");
        }
    }
}

async fn run_sync_loop(
    client: Arc<dyn ProtocolClient>,
    recovery_key: RecoveryKey,
    readiness: Arc<ReadinessCell>,
    errors: Arc<ErrorSlot<Error>>,
    stop: CancellationToken,
) {
    let mut since: Option<String> = None;
    loop {
        let outcome = tokio::select! {
            _ = stop.cancelled() => {
                debug!("sync loop stopped");
                return;
            }
            outcome = client.sync_once(since.clone()) => outcome,
        };

        match outcome {
            Ok(batch) => {
                since = Some(batch.next_batch);
                // The claim makes the ceremony exactly-once even though every
                // successful batch passes through here.
                if readiness.try_claim() {
                    debug!("first sync batch arrived, running readiness ceremony");
                    let ceremony = bootstrap::run_readiness(client.as_ref(), &recovery_key).await;
                    if let Err(error) = &ceremony {
                        warn!(error = %error, "readiness ceremony failed");
                    }
                    // A failed ceremony fails the waiting send but the loop
                    // keeps syncing; the session itself is still healthy.
                    readiness.complete(ceremony);
                }
            }
            Err(error) => {
                errors.offer(Error::Transport(TransportError::SyncLoop(error)));
                return;
            }
        }
    }
}
