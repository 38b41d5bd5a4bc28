//! Blocking facade for hosts without an async runtime.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::api;
use crate::client::ClientFactory;
use crate::error::Error;
use crate::store::StoreRegistry;
use crate::types::{Credentials, DeliveryReceipt, SendRequest};

/// Blocking mirror of [`api::Messenger`], owning a private runtime.
///
/// Calls must come from outside any async context; `block_on` panics when
/// invoked from within a runtime, which is the intended guard here.
pub struct Messenger {
    inner: api::Messenger,
    runtime: Runtime,
}

impl Messenger {
    /// Build the facade together with its runtime.
    pub fn new(factory: Arc<dyn ClientFactory>, stores: Arc<StoreRegistry>) -> Result<Self, Error> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("hermod-bridge")
            .build()
            .map_err(|err| Error::Runtime(err.to_string()))?;
        Ok(Messenger {
            inner: api::Messenger::new(factory, stores),
            runtime,
        })
    }

    /// Blocking password login.
    pub fn login(
        &self,
        homeserver_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Credentials, Error> {
        self.runtime
            .block_on(self.inner.login(homeserver_url, username, password))
    }

    /// Blocking send. Returns once the homeserver accepts the event or the
    /// call fails.
    pub fn send_message(&self, request: SendRequest) -> Result<DeliveryReceipt, Error> {
        self.runtime.block_on(self.inner.send_message(request))
    }
}
