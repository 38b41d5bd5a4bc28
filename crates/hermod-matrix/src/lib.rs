//! matrix-sdk engine behind the hermod-core client seams.
//!
//! One engine serves one login or one send call. Construction builds a
//! store-less probe client for credential work; `attach_encryption` then
//! builds the real client on top of the caller's store, and everything after
//! that runs on the attached client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hermod_core::{
    ClientError, ClientFactory, Credentials, DirectMessageIndex, Error, Messenger,
    OutgoingContent, PickleKey, ProtocolClient, RecoveryKey, SessionTokens, StoreHandle, SyncBatch,
    blocking,
};
use matrix_sdk::{
    Client, ClientBuildError, HttpError, SessionMeta,
    authentication::{SessionTokens as SdkSessionTokens, matrix::MatrixSession},
    config::SyncSettings,
    encryption::{
        CryptoStoreError,
        identities::ManualVerifyError,
        secret_storage::{SecretStore, SecretStorageError},
    },
    ruma::{
        OwnedRoomAliasId, OwnedRoomId, OwnedUserId,
        api::client::room::create_room::v3::{Request as CreateRoomRequest, RoomPreset},
        events::{
            GlobalAccountDataEventType, InitialStateEvent,
            room::{encryption::RoomEncryptionEventContent, message::RoomMessageEventContent},
        },
        serde::Raw,
        user_id,
    },
};
use tokio::sync::Mutex;

/// Store descriptor support for the sqlite backend.
pub mod store;

pub use store::{SqliteStoreProvider, default_store_registry};

/// Long-poll timeout handed to every sync request.
const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// State accumulated over the lifetime of one engine.
#[derive(Default)]
struct EngineState {
    attached: Option<Client>,
    user_id: Option<OwnedUserId>,
    secret_store: Option<SecretStore>,
}

/// matrix-sdk implementation of the protocol seams.
pub struct MatrixEngine {
    homeserver_url: String,
    session: Option<SessionTokens>,
    probe: Client,
    state: Mutex<EngineState>,
}

impl MatrixEngine {
    /// Build an engine for one homeserver, restoring the supplied session
    /// onto the probe client when one is given.
    pub async fn connect(
        homeserver_url: &str,
        session: Option<SessionTokens>,
    ) -> Result<Self, ClientError> {
        let probe = Client::builder()
            .homeserver_url(homeserver_url)
            .build()
            .await
            .map_err(map_build_error)?;
        if let Some(tokens) = &session {
            probe
                .restore_session(probe_session(tokens))
                .await
                .map_err(map_matrix_error)?;
        }
        Ok(MatrixEngine {
            homeserver_url: homeserver_url.to_owned(),
            session,
            probe,
            state: Mutex::new(EngineState::default()),
        })
    }

    /// The crypto-attached client, available after `attach_encryption`.
    async fn attached(&self) -> Result<Client, ClientError> {
        self.state
            .lock()
            .await
            .attached
            .clone()
            .ok_or_else(|| ClientError::Capability("encryption store is not attached".to_owned()))
    }

    async fn confirmed_user(&self) -> Result<OwnedUserId, ClientError> {
        self.state.lock().await.user_id.clone().ok_or_else(|| {
            ClientError::Capability("identity was not confirmed before signing".to_owned())
        })
    }

    fn lookup_room(
        &self,
        client: &Client,
        conversation_id: &str,
    ) -> Result<matrix_sdk::Room, ClientError> {
        let room_id = parse_room_id(conversation_id)?;
        client.get_room(&room_id).ok_or_else(|| {
            ClientError::InvalidReference(format!(
                "conversation '{conversation_id}' is not known to this session"
            ))
        })
    }
}

#[async_trait]
impl ProtocolClient for MatrixEngine {
    async fn login_password(
        &self,
        username: &str,
        password: &str,
        initial_device_name: &str,
    ) -> Result<Credentials, ClientError> {
        let response = self
            .probe
            .matrix_auth()
            .login_username(username, password)
            .initial_device_display_name(initial_device_name)
            .send()
            .await
            .map_err(map_matrix_error)?;
        Ok(Credentials {
            homeserver_url: self.homeserver_url.clone(),
            user_id: response.user_id.to_string(),
            device_id: response.device_id.to_string(),
            access_token: response.access_token.clone(),
        })
    }

    async fn whoami(&self) -> Result<String, ClientError> {
        let response = self.probe.whoami().await.map_err(map_http_error)?;
        let mut state = self.state.lock().await;
        state.user_id = Some(response.user_id.clone());
        Ok(response.user_id.to_string())
    }

    async fn attach_encryption(
        &self,
        pickle_key: &PickleKey,
        store: &StoreHandle,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        if state.attached.is_some() {
            return Ok(());
        }
        let tokens = self.session.as_ref().ok_or_else(|| {
            ClientError::Capability("no session tokens to attach encryption to".to_owned())
        })?;
        let user_id = state.user_id.clone().ok_or_else(|| {
            ClientError::Capability("identity was not confirmed before encryption attach".to_owned())
        })?;

        let passphrase = store_passphrase(pickle_key);
        let client = Client::builder()
            .homeserver_url(&self.homeserver_url)
            .sqlite_store(&store.path, Some(&passphrase))
            .build()
            .await
            .map_err(map_build_error)?;
        client
            .restore_session(MatrixSession {
                meta: SessionMeta {
                    user_id,
                    device_id: tokens.device_id.as_str().into(),
                },
                tokens: SdkSessionTokens {
                    access_token: tokens.access_token.clone(),
                    refresh_token: None,
                },
            })
            .await
            .map_err(map_matrix_error)?;
        state.attached = Some(client);
        Ok(())
    }

    async fn sync_once(&self, since: Option<String>) -> Result<SyncBatch, ClientError> {
        let client = self.attached().await?;
        let mut settings = SyncSettings::default().timeout(SYNC_TIMEOUT);
        if let Some(token) = since {
            settings = settings.token(token);
        }
        let response = client
            .sync_once(settings)
            .await
            .map_err(map_matrix_error)?;
        Ok(SyncBatch {
            next_batch: response.next_batch,
        })
    }

    async fn fetch_default_secret_key(&self) -> Result<(), ClientError> {
        let client = self.attached().await?;
        let enabled = client
            .encryption()
            .secret_storage()
            .is_enabled()
            .await
            .map_err(map_matrix_error)?;
        if !enabled {
            return Err(ClientError::Capability(
                "account has no default secret-storage key".to_owned(),
            ));
        }
        Ok(())
    }

    async fn unlock_secret_storage(&self, recovery_key: &RecoveryKey) -> Result<(), ClientError> {
        let client = self.attached().await?;
        let secret_store = client
            .encryption()
            .secret_storage()
            .open_secret_store(recovery_key.as_str())
            .await
            .map_err(map_secret_storage_error)?;
        self.state.lock().await.secret_store = Some(secret_store);
        Ok(())
    }

    async fn import_cross_signing_secrets(&self) -> Result<(), ClientError> {
        let state = self.state.lock().await;
        let secret_store = state
            .secret_store
            .as_ref()
            .ok_or_else(|| ClientError::Capability("secret storage is not unlocked".to_owned()))?;
        secret_store
            .import_secrets()
            .await
            .map_err(map_secret_storage_error)
    }

    async fn sign_own_device(&self) -> Result<(), ClientError> {
        let client = self.attached().await?;
        let device = client
            .encryption()
            .get_own_device()
            .await
            .map_err(map_crypto_error)?
            .ok_or_else(|| ClientError::Capability("own device is not known yet".to_owned()))?;
        device.verify().await.map_err(map_verify_error)
    }

    async fn sign_own_master_key(&self) -> Result<(), ClientError> {
        let client = self.attached().await?;
        let user_id = self.confirmed_user().await?;
        let identity = client
            .encryption()
            .get_user_identity(&user_id)
            .await
            .map_err(map_crypto_error)?
            .ok_or_else(|| {
                ClientError::Capability("own user identity is not known yet".to_owned())
            })?;
        identity.verify().await.map_err(map_verify_error)
    }

    async fn direct_message_index(&self) -> Result<DirectMessageIndex, ClientError> {
        let client = self.attached().await?;
        let raw = client
            .account()
            .fetch_account_data(GlobalAccountDataEventType::Direct)
            .await
            .map_err(map_matrix_error)?;
        match raw {
            Some(raw) => raw.deserialize_as::<DirectMessageIndex>().map_err(|err| {
                ClientError::InvalidReference(format!("malformed m.direct content: {err}"))
            }),
            None => Ok(DirectMessageIndex::new()),
        }
    }

    async fn replace_direct_message_index(
        &self,
        index: DirectMessageIndex,
    ) -> Result<(), ClientError> {
        let client = self.attached().await?;
        let content = serde_json::value::to_raw_value(&index).map_err(|err| {
            ClientError::InvalidReference(format!("unserializable m.direct content: {err}"))
        })?;
        client
            .account()
            .set_account_data_raw(GlobalAccountDataEventType::Direct, Raw::from_json(content))
            .await
            .map(|_| ())
            .map_err(map_matrix_error)
    }

    async fn create_direct_conversation(&self, user_id: &str) -> Result<String, ClientError> {
        let client = self.attached().await?;
        let user_id = parse_user_id(user_id)?;

        let mut request = CreateRoomRequest::new();
        request.preset = Some(RoomPreset::TrustedPrivateChat);
        request.is_direct = true;
        request.invite = vec![user_id];
        request.initial_state =
            vec![
                InitialStateEvent::new(RoomEncryptionEventContent::with_recommended_defaults())
                    .to_raw_any(),
            ];

        let room = client
            .create_room(request)
            .await
            .map_err(map_matrix_error)?;
        Ok(room.room_id().to_string())
    }

    async fn resolve_alias(&self, alias: &str) -> Result<String, ClientError> {
        let client = self.attached().await?;
        let alias = parse_alias(alias)?;
        let response = client
            .resolve_room_alias(&alias)
            .await
            .map_err(map_http_error)?;
        Ok(response.room_id.to_string())
    }

    async fn prime_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        let client = self.attached().await?;
        let room = self.lookup_room(&client, conversation_id)?;
        room.sync_members()
            .await
            .map(|_| ())
            .map_err(map_matrix_error)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &OutgoingContent,
    ) -> Result<String, ClientError> {
        let client = self.attached().await?;
        let room = self.lookup_room(&client, conversation_id)?;
        let response = room
            .send(event_content(content))
            .await
            .map_err(map_matrix_error)?;
        Ok(response.event_id.to_string())
    }
}

/// Factory handing out matrix-sdk backed engines.
#[derive(Debug, Default)]
pub struct MatrixEngineFactory;

#[async_trait]
impl ClientFactory for MatrixEngineFactory {
    async fn create(
        &self,
        homeserver_url: &str,
        session: Option<&SessionTokens>,
    ) -> Result<Arc<dyn ProtocolClient>, ClientError> {
        let engine = MatrixEngine::connect(homeserver_url, session.cloned()).await?;
        Ok(Arc::new(engine))
    }
}

/// Async messenger wired to the matrix engine and the sqlite store provider.
pub fn default_messenger() -> Messenger {
    Messenger::new(
        Arc::new(MatrixEngineFactory),
        Arc::new(default_store_registry()),
    )
}

/// Blocking messenger over the same defaults.
pub fn default_blocking_messenger() -> Result<blocking::Messenger, Error> {
    blocking::Messenger::new(
        Arc::new(MatrixEngineFactory),
        Arc::new(default_store_registry()),
    )
}

/// Session restored before the identity is confirmed. The homeserver only
/// checks the access token, so the user id is a placeholder until `whoami`
/// reports the real one.
fn probe_session(tokens: &SessionTokens) -> MatrixSession {
    MatrixSession {
        meta: SessionMeta {
            user_id: user_id!("@hermod-probe:localhost").to_owned(),
            device_id: tokens.device_id.as_str().into(),
        },
        tokens: SdkSessionTokens {
            access_token: tokens.access_token.clone(),
            refresh_token: None,
        },
    }
}

/// Derive the sqlite store passphrase from the pickle key bytes.
fn store_passphrase(pickle_key: &PickleKey) -> String {
    String::from_utf8_lossy(pickle_key.as_bytes()).into_owned()
}

fn event_content(content: &OutgoingContent) -> RoomMessageEventContent {
    match content {
        OutgoingContent::Plain { body } => RoomMessageEventContent::text_plain(body),
        OutgoingContent::Html { body } => RoomMessageEventContent::text_html(body, body),
        OutgoingContent::Markdown { body } => RoomMessageEventContent::text_markdown(body),
        OutgoingContent::Notice { body } => RoomMessageEventContent::notice_plain(body),
    }
}

fn parse_user_id(value: &str) -> Result<OwnedUserId, ClientError> {
    value
        .parse::<OwnedUserId>()
        .map_err(|err| ClientError::InvalidReference(format!("invalid user id '{value}': {err}")))
}

fn parse_room_id(value: &str) -> Result<OwnedRoomId, ClientError> {
    value
        .parse::<OwnedRoomId>()
        .map_err(|err| ClientError::InvalidReference(format!("invalid room id '{value}': {err}")))
}

fn parse_alias(value: &str) -> Result<OwnedRoomAliasId, ClientError> {
    value
        .parse::<OwnedRoomAliasId>()
        .map_err(|err| ClientError::InvalidReference(format!("invalid room alias '{value}': {err}")))
}

fn map_http_error(err: HttpError) -> ClientError {
    match err.as_client_api_error() {
        Some(api_err) => {
            let code = api_err
                .error_kind()
                .map(|kind| format!("{kind:?}"))
                .unwrap_or_else(|| "unknown".to_owned());
            ClientError::Api {
                status: api_err.status_code.as_u16(),
                code,
                message: api_err.to_string(),
            }
        }
        None => ClientError::Transport(err.to_string()),
    }
}

fn map_matrix_error(err: matrix_sdk::Error) -> ClientError {
    match err {
        matrix_sdk::Error::Http(http_err) => map_http_error(*http_err),
        other @ matrix_sdk::Error::AuthenticationRequired => ClientError::Api {
            status: 401,
            code: "AuthenticationRequired".to_owned(),
            message: other.to_string(),
        },
        other => ClientError::Transport(other.to_string()),
    }
}

fn map_build_error(err: ClientBuildError) -> ClientError {
    ClientError::InvalidReference(err.to_string())
}

fn map_secret_storage_error(err: SecretStorageError) -> ClientError {
    ClientError::Capability(err.to_string())
}

fn map_crypto_error(err: CryptoStoreError) -> ClientError {
    ClientError::Transport(err.to_string())
}

fn map_verify_error(err: ManualVerifyError) -> ClientError {
    ClientError::Transport(err.to_string())
}
