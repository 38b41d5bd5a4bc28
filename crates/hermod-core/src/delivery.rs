//! Delivery orchestration for a single send call.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::bootstrap;
use crate::client::{ClientFactory, ProtocolClient};
use crate::error::{AuthenticationError, DeliveryError, Error};
use crate::resolver;
use crate::signal::{ErrorSlot, ReadinessCell};
use crate::store::StoreRegistry;
use crate::sync::SyncCoordinator;
use crate::types::{
    DeliveryReceipt, MessageSpec, OutgoingContent, PickleKey, Recipient, RecoveryKey, SendRequest,
    SessionTokens,
};

/// Tasks that may publish into the shared error slot: the sync loop and the
/// send task.
const ERROR_WRITERS: usize = 2;

/// Run one send call end to end.
///
/// Blocks through validation, session restore, store attach, the readiness
/// ceremony and the send itself. Every task spawned along the way is stopped
/// and joined before this returns, success or failure.
pub(crate) async fn deliver(
    factory: &dyn ClientFactory,
    stores: &StoreRegistry,
    request: SendRequest,
) -> Result<DeliveryReceipt, Error> {
    let SendRequest {
        message_kind,
        rendering_kind,
        body,
        recipient,
        store_descriptor,
        access_token,
        recovery_key,
        pickle_key,
        homeserver_url,
        device_id,
    } = request;

    // All input validation happens before anything touches the network.
    let spec = MessageSpec::from_wire(&message_kind, &rendering_kind, body)?;
    let recipient = Recipient::parse(&recipient)?;
    let pickle_key = PickleKey::new(pickle_key);
    let recovery_key = RecoveryKey::new(recovery_key);
    let content = spec.into_content();

    let session = SessionTokens {
        access_token,
        device_id,
    };
    let client = factory
        .create(&homeserver_url, Some(&session))
        .await
        .map_err(AuthenticationError::ClientConstruction)?;
    let user_id = client
        .whoami()
        .await
        .map_err(AuthenticationError::IdentityLookup)?;
    debug!(user_id = %user_id, "session restored");

    let store = stores.open(&store_descriptor).await?;
    bootstrap::attach_encryption(client.as_ref(), &pickle_key, &store).await?;

    let readiness = Arc::new(ReadinessCell::new());
    let errors = Arc::new(ErrorSlot::new(ERROR_WRITERS));
    let coordinator = SyncCoordinator::start(
        client.clone(),
        recovery_key,
        readiness.clone(),
        errors.clone(),
    );

    let outcome = await_delivery(client, recipient, content, readiness, errors).await;
    coordinator.shutdown().await;

    match &outcome {
        Ok(receipt) => info!(event_id = %receipt.event_id, "message delivered"),
        Err(error) => warn!(error = %error, "delivery failed"),
    }
    outcome
}

/// Wait for readiness, then run the send on its own task while watching the
/// error slot for a terminal failure from either side.
async fn await_delivery(
    client: Arc<dyn ProtocolClient>,
    recipient: Recipient,
    content: OutgoingContent,
    readiness: Arc<ReadinessCell>,
    errors: Arc<ErrorSlot<Error>>,
) -> Result<DeliveryReceipt, Error> {
    tokio::select! {
        ceremony = readiness.wait() => ceremony?,
        error = errors.first() => return Err(error),
    }

    let (receipt_tx, receipt_rx) = oneshot::channel();
    let send_errors = errors.clone();
    let send_task = tokio::spawn(async move {
        match send_flow(client.as_ref(), &recipient, &content).await {
            Ok(receipt) => {
                if receipt_tx.send(receipt).is_err() {
                    debug!("receipt dropped, delivery already decided");
                }
            }
            Err(error) => send_errors.offer(error),
        }
    });

    // Biased so a failure already sitting in the slot beats the closed
    // receipt channel that follows it.
    let outcome = tokio::select! {
        biased;
        error = errors.first() => Err(error),
        receipt = receipt_rx => receipt.map_err(|_| Error::Delivery(DeliveryError::TaskLost)),
    };

    send_task.abort();
    if let Err(error) = send_task.await
        && error.is_panic()
    {
        warn!(error = %error, "send task panicked");
    }
    outcome
}

/// The ready-side pipeline: resolve, prime, send.
async fn send_flow(
    client: &dyn ProtocolClient,
    recipient: &Recipient,
    content: &OutgoingContent,
) -> Result<DeliveryReceipt, Error> {
    let conversation_id = resolver::resolve(client, recipient).await?;
    debug!(conversation = %conversation_id, "recipient resolved");

    client
        .prime_conversation(&conversation_id)
        .await
        .map_err(DeliveryError::StateFetch)?;

    let event_id = client
        .send_message(&conversation_id, content)
        .await
        .map_err(DeliveryError::SendRejected)?;

    Ok(DeliveryReceipt { event_id })
}
