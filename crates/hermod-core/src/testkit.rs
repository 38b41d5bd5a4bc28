//! Scripted in-memory doubles for the protocol seams.
//!
//! `ScriptedClient` records every call it receives and replays configured
//! outcomes; tests assert on the recorded traffic. A sync call past the end
//! of the script pends forever, which is how the doubles model a quiet
//! homeserver between batches.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{ClientFactory, ProtocolClient, SyncBatch};
use crate::error::{ClientError, StoreError};
use crate::store::{StoreDescriptor, StoreHandle, StoreProvider};
use crate::types::{
    Credentials, DirectMessageIndex, OutgoingContent, PickleKey, RecoveryKey, SessionTokens,
};

pub(crate) struct ScriptedClient {
    log: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, ClientError>>,
    sync_script: Mutex<VecDeque<Result<SyncBatch, ClientError>>>,
    tokens_seen: Mutex<Vec<Option<String>>>,
    direct_index: Mutex<DirectMessageIndex>,
    replaced: Mutex<Option<DirectMessageIndex>>,
    invited: Mutex<Vec<String>>,
    outbox: Mutex<Vec<(String, OutgoingContent)>>,
    devices: Mutex<Vec<String>>,
    created_conversation: String,
    resolved_alias: String,
    send_event: String,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        ScriptedClient {
            log: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            sync_script: Mutex::new(VecDeque::new()),
            tokens_seen: Mutex::new(Vec::new()),
            direct_index: Mutex::new(DirectMessageIndex::new()),
            replaced: Mutex::new(None),
            invited: Mutex::new(Vec::new()),
            outbox: Mutex::new(Vec::new()),
            devices: Mutex::new(Vec::new()),
            created_conversation: "!created:example.org".to_owned(),
            resolved_alias: "!resolved:example.org".to_owned(),
            send_event: "$scripted:example.org".to_owned(),
        }
    }

    /// Queue `count` successful sync batches with tokens `batch-1`,
    /// `batch-2` and so on.
    pub(crate) fn with_sync_batches(self, count: usize) -> Self {
        {
            let mut script = self.sync_script.lock().expect("poisoned");
            for number in 1..=count {
                script.push_back(Ok(SyncBatch {
                    next_batch: format!("batch-{number}"),
                }));
            }
        }
        self
    }

    /// Queue a sync failure after previously queued batches.
    pub(crate) fn with_sync_failure(self, error: ClientError) -> Self {
        self.sync_script
            .lock()
            .expect("poisoned")
            .push_back(Err(error));
        self
    }

    /// Seed the direct-message index, oldest conversation first.
    pub(crate) fn with_direct_entry(self, user_id: &str, conversations: &[&str]) -> Self {
        {
            let mut index = self.direct_index.lock().expect("poisoned");
            for conversation in conversations {
                index.append(user_id, conversation);
            }
        }
        self
    }

    /// Identifier returned for a created direct conversation.
    pub(crate) fn with_created_conversation(mut self, conversation_id: &str) -> Self {
        self.created_conversation = conversation_id.to_owned();
        self
    }

    /// Identifier returned for an alias lookup.
    pub(crate) fn with_resolved_alias(mut self, conversation_id: &str) -> Self {
        self.resolved_alias = conversation_id.to_owned();
        self
    }

    /// Event identifier returned for a sent message.
    pub(crate) fn with_send_event(mut self, event_id: &str) -> Self {
        self.send_event = event_id.to_owned();
        self
    }

    /// Make every call to `operation` fail with `error`.
    pub(crate) fn fail(self, operation: &str, error: ClientError) -> Self {
        self.failures
            .lock()
            .expect("poisoned")
            .insert(operation.to_owned(), error);
        self
    }

    pub(crate) fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every recorded operation, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.log.lock().expect("poisoned").clone()
    }

    pub(crate) fn call_count(&self, operation: &str) -> usize {
        self.log
            .lock()
            .expect("poisoned")
            .iter()
            .filter(|call| *call == operation)
            .count()
    }

    /// `since` tokens seen by the sync loop, in call order.
    pub(crate) fn sync_tokens(&self) -> Vec<Option<String>> {
        self.tokens_seen.lock().expect("poisoned").clone()
    }

    /// The index written back by the most recent replacement, if any.
    pub(crate) fn replaced_index(&self) -> Option<DirectMessageIndex> {
        self.replaced.lock().expect("poisoned").clone()
    }

    pub(crate) fn invited_users(&self) -> Vec<String> {
        self.invited.lock().expect("poisoned").clone()
    }

    pub(crate) fn sent_messages(&self) -> Vec<(String, OutgoingContent)> {
        self.outbox.lock().expect("poisoned").clone()
    }

    /// Initial device names seen at login.
    pub(crate) fn device_names(&self) -> Vec<String> {
        self.devices.lock().expect("poisoned").clone()
    }

    fn begin(&self, operation: &str) -> Result<(), ClientError> {
        self.log
            .lock()
            .expect("poisoned")
            .push(operation.to_owned());
        if let Some(error) = self.failures.lock().expect("poisoned").get(operation) {
            return Err(error.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolClient for ScriptedClient {
    async fn login_password(
        &self,
        username: &str,
        _password: &str,
        initial_device_name: &str,
    ) -> Result<Credentials, ClientError> {
        self.begin("login_password")?;
        self.devices
            .lock()
            .expect("poisoned")
            .push(initial_device_name.to_owned());
        Ok(Credentials {
            homeserver_url: "https://example.org".to_owned(),
            user_id: format!("@{username}:example.org"),
            device_id: "SCRIPTEDDEV".to_owned(),
            access_token: "syt_scripted_token".to_owned(),
        })
    }

    async fn whoami(&self) -> Result<String, ClientError> {
        self.begin("whoami")?;
        Ok("@scripted:example.org".to_owned())
    }

    async fn attach_encryption(
        &self,
        _pickle_key: &PickleKey,
        _store: &StoreHandle,
    ) -> Result<(), ClientError> {
        self.begin("attach_encryption")
    }

    async fn sync_once(&self, since: Option<String>) -> Result<SyncBatch, ClientError> {
        self.begin("sync_once")?;
        self.tokens_seen.lock().expect("poisoned").push(since);
        let scripted = self.sync_script.lock().expect("poisoned").pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }

    async fn fetch_default_secret_key(&self) -> Result<(), ClientError> {
        self.begin("fetch_default_secret_key")
    }

    async fn unlock_secret_storage(&self, _recovery_key: &RecoveryKey) -> Result<(), ClientError> {
        self.begin("unlock_secret_storage")
    }

    async fn import_cross_signing_secrets(&self) -> Result<(), ClientError> {
        self.begin("import_cross_signing_secrets")
    }

    async fn sign_own_device(&self) -> Result<(), ClientError> {
        self.begin("sign_own_device")
    }

    async fn sign_own_master_key(&self) -> Result<(), ClientError> {
        self.begin("sign_own_master_key")
    }

    async fn direct_message_index(&self) -> Result<DirectMessageIndex, ClientError> {
        self.begin("direct_message_index")?;
        Ok(self.direct_index.lock().expect("poisoned").clone())
    }

    async fn replace_direct_message_index(
        &self,
        index: DirectMessageIndex,
    ) -> Result<(), ClientError> {
        self.begin("replace_direct_message_index")?;
        *self.replaced.lock().expect("poisoned") = Some(index);
        Ok(())
    }

    async fn create_direct_conversation(&self, user_id: &str) -> Result<String, ClientError> {
        self.begin("create_direct_conversation")?;
        self.invited
            .lock()
            .expect("poisoned")
            .push(user_id.to_owned());
        Ok(self.created_conversation.clone())
    }

    async fn resolve_alias(&self, _alias: &str) -> Result<String, ClientError> {
        self.begin("resolve_alias")?;
        Ok(self.resolved_alias.clone())
    }

    async fn prime_conversation(&self, _conversation_id: &str) -> Result<(), ClientError> {
        self.begin("prime_conversation")
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &OutgoingContent,
    ) -> Result<String, ClientError> {
        self.begin("send_message")?;
        self.outbox
            .lock()
            .expect("poisoned")
            .push((conversation_id.to_owned(), content.clone()));
        Ok(self.send_event.clone())
    }
}

/// Factory double handing out one shared scripted client.
pub(crate) struct ScriptedFactory {
    client: Arc<ScriptedClient>,
    history: Mutex<Vec<(String, bool)>>,
    failure: Option<ClientError>,
}

impl ScriptedFactory {
    pub(crate) fn new(client: &Arc<ScriptedClient>) -> Self {
        ScriptedFactory {
            client: client.clone(),
            history: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    /// Make every `create` call fail with `error`.
    pub(crate) fn fail_create(mut self, error: ClientError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Recorded `create` calls as (homeserver, session supplied) pairs.
    pub(crate) fn creates(&self) -> Vec<(String, bool)> {
        self.history.lock().expect("poisoned").clone()
    }

    pub(crate) fn create_count(&self) -> usize {
        self.history.lock().expect("poisoned").len()
    }
}

#[async_trait]
impl ClientFactory for ScriptedFactory {
    async fn create(
        &self,
        homeserver_url: &str,
        session: Option<&SessionTokens>,
    ) -> Result<Arc<dyn ProtocolClient>, ClientError> {
        self.history
            .lock()
            .expect("poisoned")
            .push((homeserver_url.to_owned(), session.is_some()));
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self.client.clone())
    }
}

/// Provider double claiming every descriptor and opening it in place.
pub(crate) struct ScriptedStoreProvider;

#[async_trait]
impl StoreProvider for ScriptedStoreProvider {
    fn supports(&self, _descriptor: &StoreDescriptor) -> bool {
        true
    }

    async fn open(&self, descriptor: &StoreDescriptor) -> Result<StoreHandle, StoreError> {
        Ok(StoreHandle {
            path: descriptor.path().to_owned(),
            options: descriptor.query().map(str::to_owned),
        })
    }
}
