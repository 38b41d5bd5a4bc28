//! Sqlite-backed store provider.
//!
//! The descriptor path names the directory the sdk keeps its sqlite files
//! in; the actual open happens later, when the crypto layer is attached and
//! the pickle key is available to derive the passphrase.

use std::sync::Arc;

use async_trait::async_trait;
use hermod_core::{StoreDescriptor, StoreError, StoreHandle, StoreProvider, StoreRegistry};

/// Claims `sqlite`/`sqlite3` descriptors and bare absolute paths.
#[derive(Debug, Default)]
pub struct SqliteStoreProvider;

#[async_trait]
impl StoreProvider for SqliteStoreProvider {
    fn supports(&self, descriptor: &StoreDescriptor) -> bool {
        match descriptor.scheme() {
            Some(scheme) => {
                scheme.eq_ignore_ascii_case("sqlite") || scheme.eq_ignore_ascii_case("sqlite3")
            }
            None => descriptor.path().is_absolute(),
        }
    }

    async fn open(&self, descriptor: &StoreDescriptor) -> Result<StoreHandle, StoreError> {
        Ok(StoreHandle {
            path: descriptor.path().to_owned(),
            options: descriptor.query().map(str::to_owned),
        })
    }
}

/// Registry with the sqlite provider registered.
pub fn default_store_registry() -> StoreRegistry {
    StoreRegistry::new(vec![Arc::new(SqliteStoreProvider)])
}
