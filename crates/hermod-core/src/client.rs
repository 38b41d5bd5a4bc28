//! Capability seams between the orchestration core and a protocol engine.
//!
//! Production implements these over matrix-sdk; tests substitute a scripted
//! in-memory double. The surface mirrors exactly what one login or one send
//! call needs, nothing more.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::store::StoreHandle;
use crate::types::{
    Credentials, DirectMessageIndex, OutgoingContent, PickleKey, RecoveryKey, SessionTokens,
};

/// One incremental update batch produced by the synchronization loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBatch {
    /// Token identifying where the next sync call should resume.
    pub next_batch: String,
}

/// Operations the delivery pipeline requires from a protocol engine.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Password login, registering a fresh device under the given name.
    async fn login_password(
        &self,
        username: &str,
        password: &str,
        initial_device_name: &str,
    ) -> Result<Credentials, ClientError>;

    /// Confirm the identity behind the session's access token.
    async fn whoami(&self) -> Result<String, ClientError>;

    /// Attach the crypto layer backed by the opened store. Idempotent.
    async fn attach_encryption(
        &self,
        pickle_key: &PickleKey,
        store: &StoreHandle,
    ) -> Result<(), ClientError>;

    /// Run one synchronization request, resuming from `since` when given.
    async fn sync_once(&self, since: Option<String>) -> Result<SyncBatch, ClientError>;

    /// Fetch the default secret-storage key metadata.
    async fn fetch_default_secret_key(&self) -> Result<(), ClientError>;

    /// Verify the recovery passphrase and unlock secret storage with it.
    async fn unlock_secret_storage(&self, recovery_key: &RecoveryKey) -> Result<(), ClientError>;

    /// Import cross-signing material from the unlocked secret storage.
    async fn import_cross_signing_secrets(&self) -> Result<(), ClientError>;

    /// Sign this session's device with the cross-signing keys.
    async fn sign_own_device(&self) -> Result<(), ClientError>;

    /// Sign the account master key from this device.
    async fn sign_own_master_key(&self) -> Result<(), ClientError>;

    /// Read the account's direct-message index.
    async fn direct_message_index(&self) -> Result<DirectMessageIndex, ClientError>;

    /// Replace the account's direct-message index wholesale.
    async fn replace_direct_message_index(
        &self,
        index: DirectMessageIndex,
    ) -> Result<(), ClientError>;

    /// Create a private, invite-only, encrypted conversation with one user;
    /// returns the new conversation identifier.
    async fn create_direct_conversation(&self, user_id: &str) -> Result<String, ClientError>;

    /// Resolve a conversation alias through the directory.
    async fn resolve_alias(&self, alias: &str) -> Result<String, ClientError>;

    /// Warm local state for a conversation before sending into it.
    async fn prime_conversation(&self, conversation_id: &str) -> Result<(), ClientError>;

    /// Send one message event; returns the delivery identifier.
    async fn send_message(
        &self,
        conversation_id: &str,
        content: &OutgoingContent,
    ) -> Result<String, ClientError>;
}

/// Constructs protocol clients; injectable so tests can substitute a double.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Create a client for the homeserver, optionally resuming a session.
    async fn create(
        &self,
        homeserver_url: &str,
        session: Option<&SessionTokens>,
    ) -> Result<Arc<dyn ProtocolClient>, ClientError>;
}
