//! Store descriptors and the provider registry.
//!
//! A descriptor is either a bare filesystem path or `scheme://path` with an
//! optional query string. The registry is built once with an ordered list of
//! providers; the first provider whose predicate claims a descriptor opens
//! it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;

/// Parsed connection descriptor for the local encrypted store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescriptor {
    raw: String,
    scheme: Option<String>,
    path: PathBuf,
    query: Option<String>,
}

impl StoreDescriptor {
    /// Parse a raw descriptor string.
    ///
    /// Redundant separators after the scheme collapse so the path always has
    /// exactly one leading separator; a bare path passes through verbatim.
    /// The query string survives untouched for the opener.
    pub fn parse(raw: &str) -> Self {
        let (without_query, query) = match raw.split_once('?') {
            Some((head, tail)) => (head, Some(tail.to_owned())),
            None => (raw, None),
        };
        let (scheme, path) = match without_query.split_once("://") {
            Some((scheme, rest)) => {
                let collapsed = format!("/{}", rest.trim_start_matches('/'));
                (Some(scheme.to_owned()), PathBuf::from(collapsed))
            }
            None => (None, PathBuf::from(without_query)),
        };
        StoreDescriptor {
            raw: raw.to_owned(),
            scheme,
            path,
            query,
        }
    }

    /// The descriptor exactly as supplied.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Scheme portion, when one was present.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Filesystem path of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Query parameters to pass through to the opener.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}

/// Opened store handle handed to the encryption bootstrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHandle {
    /// Path backing the store.
    pub path: PathBuf,
    /// Opener options forwarded from the descriptor query string.
    pub options: Option<String>,
}

/// One storage backend: a claim predicate plus an opener.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Whether this provider handles the descriptor.
    fn supports(&self, descriptor: &StoreDescriptor) -> bool;

    /// Open (or prepare) the store behind the descriptor.
    async fn open(&self, descriptor: &StoreDescriptor) -> Result<StoreHandle, StoreError>;
}

/// Ordered provider registry, constructed once and passed into the facade.
pub struct StoreRegistry {
    providers: Vec<Arc<dyn StoreProvider>>,
}

impl StoreRegistry {
    pub fn new(providers: Vec<Arc<dyn StoreProvider>>) -> Self {
        StoreRegistry { providers }
    }

    /// Parse the descriptor, create missing parent directories, and open the
    /// store through the first provider that claims it.
    pub async fn open(&self, raw: &str) -> Result<StoreHandle, StoreError> {
        let descriptor = StoreDescriptor::parse(raw);
        let provider = self
            .providers
            .iter()
            .find(|provider| provider.supports(&descriptor))
            .ok_or_else(|| StoreError::UnsupportedDescriptor(raw.to_owned()))?;
        ensure_parent_dirs(descriptor.path())?;
        debug!(path = %descriptor.path().display(), "opening store");
        provider.open(&descriptor).await
    }
}

fn ensure_parent_dirs(path: &Path) -> Result<(), StoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|err| StoreError::DirectoryCreate {
        path: parent.display().to_string(),
        detail: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn unique_temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        env::temp_dir().join(format!("hermod-store-{name}-{nanos}"))
    }

    struct PathProvider;

    #[async_trait]
    impl StoreProvider for PathProvider {
        fn supports(&self, descriptor: &StoreDescriptor) -> bool {
            descriptor.scheme().is_none()
        }

        async fn open(&self, descriptor: &StoreDescriptor) -> Result<StoreHandle, StoreError> {
            Ok(StoreHandle {
                path: descriptor.path().to_owned(),
                options: descriptor.query().map(str::to_owned),
            })
        }
    }

    struct SchemeProvider(&'static str);

    #[async_trait]
    impl StoreProvider for SchemeProvider {
        fn supports(&self, descriptor: &StoreDescriptor) -> bool {
            descriptor.scheme() == Some(self.0)
        }

        async fn open(&self, descriptor: &StoreDescriptor) -> Result<StoreHandle, StoreError> {
            Ok(StoreHandle {
                path: descriptor.path().to_owned(),
                options: Some(self.0.to_owned()),
            })
        }
    }

    #[test]
    fn bare_path_passes_through_verbatim() {
        let descriptor = StoreDescriptor::parse("/tmp/x/db");
        assert_eq!(descriptor.scheme(), None);
        assert_eq!(descriptor.path(), Path::new("/tmp/x/db"));
        assert_eq!(descriptor.query(), None);
    }

    #[test]
    fn scheme_descriptor_gains_a_leading_separator() {
        let descriptor = StoreDescriptor::parse("scheme://tmp/x/db");
        assert_eq!(descriptor.scheme(), Some("scheme"));
        assert_eq!(descriptor.path(), Path::new("/tmp/x/db"));
    }

    #[test]
    fn redundant_separators_collapse_to_one() {
        let descriptor = StoreDescriptor::parse("scheme:////tmp/x/db");
        assert_eq!(descriptor.path(), Path::new("/tmp/x/db"));

        let single = StoreDescriptor::parse("scheme:///tmp/x/db");
        assert_eq!(single.path(), Path::new("/tmp/x/db"));
    }

    #[test]
    fn query_parameters_pass_through_unmodified() {
        let descriptor = StoreDescriptor::parse("scheme://tmp/x/db?mode=immediate");
        assert_eq!(descriptor.path(), Path::new("/tmp/x/db"));
        assert_eq!(descriptor.query(), Some("mode=immediate"));
        assert_eq!(descriptor.raw(), "scheme://tmp/x/db?mode=immediate");
    }

    #[tokio::test]
    async fn registry_rejects_unclaimed_descriptors() {
        let registry = StoreRegistry::new(vec![Arc::new(SchemeProvider("sqlite"))]);
        let err = registry
            .open("redis://tmp/cache")
            .await
            .expect_err("unclaimed descriptor must fail");
        assert_eq!(
            err,
            StoreError::UnsupportedDescriptor("redis://tmp/cache".to_owned())
        );
    }

    #[tokio::test]
    async fn registry_selects_the_first_claiming_provider() {
        let registry = StoreRegistry::new(vec![
            Arc::new(SchemeProvider("first")),
            Arc::new(SchemeProvider("second")),
            Arc::new(PathProvider),
        ]);

        let handle = registry.open("second://tmp/db").await.expect("open");
        assert_eq!(handle.options.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn registry_creates_missing_parent_directories() {
        let base = unique_temp_path("parents");
        let store_path = base.join("nested").join("store.db");
        let raw = store_path.to_string_lossy().into_owned();

        let registry = StoreRegistry::new(vec![Arc::new(PathProvider)]);
        let handle = registry.open(&raw).await.expect("open");

        assert_eq!(handle.path, store_path);
        assert!(store_path.parent().expect("parent").is_dir());

        let _ = fs::remove_dir_all(&base);
    }

    #[tokio::test]
    async fn opener_receives_query_passthrough() {
        let registry = StoreRegistry::new(vec![Arc::new(PathProvider)]);
        let handle = registry
            .open("/tmp/hermod-query-db?mode=immediate&cache=shared")
            .await
            .expect("open");
        assert_eq!(handle.options.as_deref(), Some("mode=immediate&cache=shared"));
    }
}
