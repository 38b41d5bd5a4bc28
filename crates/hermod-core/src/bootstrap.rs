//! Encryption attach and the readiness ceremony.

use tracing::debug;

use crate::client::ProtocolClient;
use crate::error::{BootstrapError, ClientError};
use crate::store::StoreHandle;
use crate::types::{PickleKey, RecoveryKey};

/// Attach the crypto layer to the client.
///
/// Deterministic and safe to repeat; the exactly-once rule applies to the
/// ceremony below, not to this attach.
pub(crate) async fn attach_encryption(
    client: &dyn ProtocolClient,
    pickle_key: &PickleKey,
    store: &StoreHandle,
) -> Result<(), BootstrapError> {
    if pickle_key.is_empty() {
        return Err(BootstrapError::EmptyPickleKey);
    }
    client
        .attach_encryption(pickle_key, store)
        .await
        .map_err(|error| match error {
            ClientError::Capability(detail) => BootstrapError::IncompatibleDispatcher(detail),
            other => BootstrapError::StoreInit(other),
        })
}

/// The five-step unlock sequence gating every send.
///
/// Order is fixed: key metadata, recovery-key verification, cross-signing
/// import, device signature, master-key signature. The first failure aborts
/// the remainder and the whole send with it.
pub(crate) async fn run_readiness(
    client: &dyn ProtocolClient,
    recovery_key: &RecoveryKey,
) -> Result<(), BootstrapError> {
    debug!("fetching default secret-storage key metadata");
    client
        .fetch_default_secret_key()
        .await
        .map_err(BootstrapError::SecretStorageKey)?;

    debug!("verifying recovery passphrase");
    client
        .unlock_secret_storage(recovery_key)
        .await
        .map_err(BootstrapError::RecoveryKeyRejected)?;

    debug!("importing cross-signing secrets");
    client
        .import_cross_signing_secrets()
        .await
        .map_err(BootstrapError::CrossSigningFetch)?;

    debug!("signing own device");
    client
        .sign_own_device()
        .await
        .map_err(BootstrapError::DeviceSignature)?;

    debug!("signing own master key");
    client
        .sign_own_master_key()
        .await
        .map_err(BootstrapError::MasterKeySignature)?;

    Ok(())
}
