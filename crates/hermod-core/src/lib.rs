//! Core delivery contract for the Hermod notifier bridge.
//!
//! This crate defines the login and send operations, the delivery pipeline
//! around the readiness ceremony, recipient resolution, store descriptors,
//! and the stable error taxonomy. All protocol work happens behind the
//! [`client`] seams; the production engine lives in a sibling crate.

/// Async login/send facade.
pub mod api;
/// Blocking mirror of the async facade.
pub mod blocking;
/// Capability seams implemented by protocol engines.
pub mod client;
/// Stable error taxonomy for every operation.
pub mod error;
/// Store descriptors and the provider registry.
pub mod store;
/// Request, content, and session types crossing the bridge boundary.
pub mod types;

mod auth;
mod bootstrap;
mod delivery;
mod resolver;
mod signal;
mod sync;

#[cfg(test)]
mod testkit;

pub use api::Messenger;
pub use client::{ClientFactory, ProtocolClient, SyncBatch};
pub use error::{
    AuthenticationError, BootstrapError, ClientError, DeliveryError, Error, ResolutionError,
    StoreError, TransportError,
};
pub use store::{StoreDescriptor, StoreHandle, StoreProvider, StoreRegistry};
pub use types::{
    Credentials, DeliveryReceipt, DirectMessageIndex, MessageKind, MessageSpec, OutgoingContent,
    PickleKey, Recipient, RecoveryKey, RenderingKind, SendRequest, SessionTokens,
};
