//! Async facade over login and delivery.

use std::sync::Arc;

use crate::auth;
use crate::client::ClientFactory;
use crate::delivery;
use crate::error::Error;
use crate::store::StoreRegistry;
use crate::types::{Credentials, DeliveryReceipt, SendRequest};

/// Async entry point for the bridge.
///
/// Carries only the engine factory and the store registry; every call is
/// otherwise self-contained, so one instance can serve concurrent callers.
pub struct Messenger {
    factory: Arc<dyn ClientFactory>,
    stores: Arc<StoreRegistry>,
}

impl Messenger {
    pub fn new(factory: Arc<dyn ClientFactory>, stores: Arc<StoreRegistry>) -> Self {
        Messenger { factory, stores }
    }

    /// Password login. Returns the session material the caller must keep and
    /// replay on later sends.
    pub async fn login(
        &self,
        homeserver_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Credentials, Error> {
        auth::login(self.factory.as_ref(), homeserver_url, username, password).await
    }

    /// Deliver one message. Blocks until the homeserver accepts the event or
    /// the call fails; there is no internal deadline.
    pub async fn send_message(&self, request: SendRequest) -> Result<DeliveryReceipt, Error> {
        delivery::deliver(self.factory.as_ref(), self.stores.as_ref(), request).await
    }
}
