//! Plain data crossing the bridge boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, ResolutionError};

/// Message kind accepted by the send operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Regular text message (`m.text`).
    Text,
    /// Unimportant automated notice (`m.notice`).
    Notice,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "m.text",
            MessageKind::Notice => "m.notice",
        }
    }
}

impl FromStr for MessageKind {
    type Err = DeliveryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "m.text" => Ok(MessageKind::Text),
            "m.notice" => Ok(MessageKind::Notice),
            other => Err(DeliveryError::UnsupportedMessageKind(other.to_owned())),
        }
    }
}

/// How a text body is rendered before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingKind {
    /// Body sent as plain text.
    Plain,
    /// Body is ready-made HTML.
    Html,
    /// Body is markdown, rendered by the engine.
    Markdown,
}

impl RenderingKind {
    /// Wire name of the rendering.
    pub fn as_str(self) -> &'static str {
        match self {
            RenderingKind::Plain => "text",
            RenderingKind::Html => "html",
            RenderingKind::Markdown => "markdown",
        }
    }
}

impl FromStr for RenderingKind {
    type Err = DeliveryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(RenderingKind::Plain),
            "html" => Ok(RenderingKind::Html),
            "markdown" => Ok(RenderingKind::Markdown),
            other => Err(DeliveryError::UnsupportedRendering(other.to_owned())),
        }
    }
}

/// Validated message content for one send, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSpec {
    pub kind: MessageKind,
    pub rendering: RenderingKind,
    pub body: String,
}

impl MessageSpec {
    /// Parse the wire-form kind and rendering names.
    ///
    /// Rejecting an unsupported name here is what keeps a bad request from
    /// ever reaching the network.
    pub fn from_wire(
        kind: &str,
        rendering: &str,
        body: impl Into<String>,
    ) -> Result<Self, DeliveryError> {
        Ok(MessageSpec {
            kind: kind.parse()?,
            rendering: rendering.parse()?,
            body: body.into(),
        })
    }

    /// Shape the outgoing content. Notices ignore the rendering and are
    /// always sent plain.
    pub fn into_content(self) -> OutgoingContent {
        match (self.kind, self.rendering) {
            (MessageKind::Notice, _) => OutgoingContent::Notice { body: self.body },
            (MessageKind::Text, RenderingKind::Plain) => OutgoingContent::Plain { body: self.body },
            (MessageKind::Text, RenderingKind::Html) => OutgoingContent::Html { body: self.body },
            (MessageKind::Text, RenderingKind::Markdown) => {
                OutgoingContent::Markdown { body: self.body }
            }
        }
    }
}

/// Content handed to the engine after kind and rendering validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingContent {
    /// Plain text event.
    Plain { body: String },
    /// Text event with ready-made HTML formatting.
    Html { body: String },
    /// Text event whose body the engine renders from markdown.
    Markdown { body: String },
    /// Plain notice event.
    Notice { body: String },
}

/// Recipient reference, classified by its leading sigil.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// `!` conversation identifier, used verbatim.
    Conversation(String),
    /// `@` user identifier, resolved through the direct-message index.
    User(String),
    /// `#` conversation alias, resolved through the directory.
    Alias(String),
}

impl Recipient {
    /// Classify a raw reference. Anything without a known sigil is rejected,
    /// including the empty string.
    pub fn parse(raw: &str) -> Result<Self, ResolutionError> {
        match raw.chars().next() {
            Some('!') => Ok(Recipient::Conversation(raw.to_owned())),
            Some('@') => Ok(Recipient::User(raw.to_owned())),
            Some('#') => Ok(Recipient::Alias(raw.to_owned())),
            _ => Err(ResolutionError::UnknownRecipient(raw.to_owned())),
        }
    }

    /// The raw reference as supplied by the caller.
    pub fn as_str(&self) -> &str {
        match self {
            Recipient::Conversation(value) | Recipient::User(value) | Recipient::Alias(value) => {
                value
            }
        }
    }
}

/// Login result handed back to the caller and replayed on later sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub homeserver_url: String,
    pub user_id: String,
    pub device_id: String,
    pub access_token: String,
}

/// Prior-session tokens supplied on send to skip a fresh login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub device_id: String,
}

/// Symmetric key protecting the local encrypted state store.
///
/// Supplied by the caller on every send and never persisted here.
#[derive(Clone, PartialEq, Eq)]
pub struct PickleKey(Vec<u8>);

impl PickleKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        PickleKey(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PickleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PickleKey({} bytes)", self.0.len())
    }
}

/// Recovery passphrase unlocking server-side secret storage.
///
/// Used exactly once per send, during the readiness ceremony.
#[derive(Clone, PartialEq, Eq)]
pub struct RecoveryKey(String);

impl RecoveryKey {
    pub fn new(passphrase: impl Into<String>) -> Self {
        RecoveryKey(passphrase.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryKey(redacted)")
    }
}

/// Account-scoped map of user identifier to known direct conversations,
/// ordered oldest first. Serializes as the raw `m.direct` content shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectMessageIndex(BTreeMap<String, Vec<String>>);

impl DirectMessageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All known conversations for a user, oldest first.
    pub fn conversations_for(&self, user_id: &str) -> &[String] {
        self.0.get(user_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Most recently recorded conversation for a user, if any.
    pub fn latest_for(&self, user_id: &str) -> Option<&str> {
        self.conversations_for(user_id).last().map(String::as_str)
    }

    /// Record a freshly created conversation as the most recent entry.
    pub fn append(&mut self, user_id: &str, conversation_id: &str) {
        self.0
            .entry(user_id.to_owned())
            .or_default()
            .push(conversation_id.to_owned());
    }
}

/// Wire-shaped send request as supplied by the host caller.
///
/// Fields stay raw; validation happens inside the send call and fails before
/// any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub message_kind: String,
    pub rendering_kind: String,
    pub body: String,
    pub recipient: String,
    pub store_descriptor: String,
    pub access_token: String,
    pub recovery_key: String,
    pub pickle_key: Vec<u8>,
    pub homeserver_url: String,
    pub device_id: String,
}

/// Successful delivery handle returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Server-assigned identifier of the delivered event.
    pub event_id: String,
}
