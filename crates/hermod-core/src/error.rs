//! Error taxonomy for the bridge.
//!
//! Every failure is terminal for the call that produced it: there are no
//! internal retries and no partial results. Engine failures cross the
//! capability seam as [`ClientError`] and are wrapped into the step-specific
//! variants at each call site, keeping the original message intact.

use thiserror::Error;

/// Failure reported by a protocol engine implementation.
///
/// Engines reduce their internal error types to this enum so the
/// orchestration core can classify failures without depending on engine
/// internals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Transport-level failure with no protocol response.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The server rejected the request at the protocol level.
    #[error("server rejected request ({status} {code}): {message}")]
    Api {
        /// HTTP status of the rejection.
        status: u16,
        /// Stable protocol error code, e.g. `M_FORBIDDEN`.
        code: String,
        /// Human-readable server message.
        message: String,
    },
    /// An identifier or input that cannot be represented on the wire.
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    /// The engine lacks a capability required for the call.
    #[error("capability unavailable: {0}")]
    Capability(String),
}

/// Login-phase failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    /// The protocol client could not be constructed.
    #[error("client construction failed: {0}")]
    ClientConstruction(#[source] ClientError),
    /// The homeserver rejected the credentials.
    #[error("login rejected: {0}")]
    Rejected(#[source] ClientError),
    /// The login request never produced a protocol response.
    #[error("login transport failure: {0}")]
    Transport(#[source] ClientError),
    /// The access token could not be mapped back to an identity.
    #[error("identity lookup failed: {0}")]
    IdentityLookup(#[source] ClientError),
}

/// Failures while attaching encryption or running the readiness ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    /// The local-state key was empty.
    #[error("local state key must not be empty")]
    EmptyPickleKey,
    /// The client's sync dispatcher cannot host the crypto layer.
    #[error("sync dispatcher does not support the crypto layer: {0}")]
    IncompatibleDispatcher(String),
    /// The encrypted store could not be initialized.
    #[error("encrypted store initialization failed: {0}")]
    StoreInit(#[source] ClientError),
    /// The default secret-storage key metadata is missing or unreadable.
    #[error("default secret-storage key unavailable: {0}")]
    SecretStorageKey(#[source] ClientError),
    /// The recovery passphrase did not verify against the key metadata.
    #[error("recovery passphrase rejected: {0}")]
    RecoveryKeyRejected(#[source] ClientError),
    /// Cross-signing secrets could not be fetched from secret storage.
    #[error("cross-signing secrets could not be fetched: {0}")]
    CrossSigningFetch(#[source] ClientError),
    /// Signing this session's device failed.
    #[error("signing own device failed: {0}")]
    DeviceSignature(#[source] ClientError),
    /// Signing the account master key failed.
    #[error("signing own master key failed: {0}")]
    MasterKeySignature(#[source] ClientError),
}

/// Recipient resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The recipient reference carries no recognized sigil.
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),
    /// The direct-message index could not be read.
    #[error("direct-message index fetch failed: {0}")]
    IndexFetch(#[source] ClientError),
    /// Creating a fresh private conversation failed.
    #[error("conversation creation failed: {0}")]
    ConversationCreate(#[source] ClientError),
    /// The alias directory lookup failed.
    #[error("alias lookup failed: {0}")]
    AliasLookup(#[source] ClientError),
}

/// Failures while dispatching the message itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The message kind is not one of the supported wire names.
    #[error("unsupported message type: {0}")]
    UnsupportedMessageKind(String),
    /// The rendering kind is not one of the supported wire names.
    #[error("unsupported rendering type: {0}")]
    UnsupportedRendering(String),
    /// Priming the conversation state before the send failed.
    #[error("conversation state fetch failed: {0}")]
    StateFetch(#[source] ClientError),
    /// The server rejected the message event.
    #[error("event send failed: {0}")]
    SendRejected(#[source] ClientError),
    /// The delivery task ended without reporting a result.
    #[error("delivery task stopped before reporting a result")]
    TaskLost,
}

/// The background synchronization loop ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The loop's sync request failed; the call cannot complete.
    #[error("synchronization loop terminated: {0}")]
    SyncLoop(#[source] ClientError),
}

/// Store descriptor and store opening failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No registered provider claims the descriptor.
    #[error("no store provider accepts descriptor {0:?}")]
    UnsupportedDescriptor(String),
    /// A missing parent directory could not be created.
    #[error("could not create store directory {path}: {detail}")]
    DirectoryCreate {
        /// Directory that failed to be created.
        path: String,
        /// Underlying filesystem error text.
        detail: String,
    },
    /// The provider failed to open the store.
    #[error("store open failed: {0}")]
    Open(String),
}

/// Top-level error returned by the facade operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The blocking facade could not start its runtime.
    #[error("async runtime could not be started: {0}")]
    Runtime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_display_keeps_server_detail() {
        let err = ClientError::Api {
            status: 403,
            code: "M_FORBIDDEN".to_owned(),
            message: "Invalid password".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "server rejected request (403 M_FORBIDDEN): Invalid password"
        );
    }

    #[test]
    fn wrapped_errors_surface_the_engine_message() {
        let err = BootstrapError::RecoveryKeyRejected(ClientError::Api {
            status: 401,
            code: "M_FORBIDDEN".to_owned(),
            message: "bad mac".to_owned(),
        });
        let text = err.to_string();
        assert!(text.starts_with("recovery passphrase rejected"));
        assert!(text.contains("bad mac"));
    }

    #[test]
    fn top_level_error_is_transparent_over_domains() {
        let err = Error::from(ResolutionError::UnknownRecipient("oops".to_owned()));
        assert_eq!(err.to_string(), "unknown recipient: oops");
    }

    #[test]
    fn unknown_recipient_message_matches_resolver_contract() {
        let err = ResolutionError::UnknownRecipient("friend:host".to_owned());
        assert_eq!(err.to_string(), "unknown recipient: friend:host");
    }
}
