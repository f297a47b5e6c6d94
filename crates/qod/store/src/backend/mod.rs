//! Document-store backends.
//!
//! [`DocumentStore`] is the seam between [`StoreClient`](crate::StoreClient)
//! and a concrete engine. The client owns timeouts, annotation and logging;
//! backends only translate typed filters and updates into engine calls.

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;

use std::sync::Arc;

use async_trait::async_trait;

use crate::document::{Document, Filter, Update};
use crate::settings::StoreSettings;
use crate::{StoreError, StoreResult};

pub use memory::InMemoryDocumentStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoDocumentStore;

/// Result of a single-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents matched before the update (0 or 1).
    pub matched: u64,
    /// Documents whose content changed.
    pub modified: u64,
    /// Whether a new document was inserted.
    pub upserted: bool,
}

/// Primitive operations of a connected document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Round trip proving the store is reachable.
    async fn ping(&self) -> StoreResult<()>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    async fn find_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>>;

    /// Update the first match; with `upsert`, insert the filter's equality
    /// fields merged with the update when nothing matches.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> StoreResult<UpdateOutcome>;

    /// Atomically update (upserting if needed) and return the post-update
    /// document.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Document>;

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<()>;

    /// Ordered insert. Returns the number of acknowledged documents.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<u64>;

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    async fn drop_collection(&self, collection: &str) -> StoreResult<()>;

    async fn drop_database(&self) -> StoreResult<()>;

    /// Release connections. Later calls fail with `NotConnected` or a
    /// driver error.
    async fn shutdown(&self) -> StoreResult<()>;
}

/// Backend chosen from the connection URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Mongo,
}

impl BackendKind {
    pub fn from_url(url: &str) -> StoreResult<Self> {
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| StoreError::Connection(format!("missing scheme in url `{url}`")))?;
        match scheme {
            "memory" => Ok(Self::Memory),
            "mongodb" | "mongodb+srv" => Ok(Self::Mongo),
            other => Err(StoreError::Connection(format!(
                "unsupported url scheme `{other}` (expected mongodb|mongodb+srv|memory)"
            ))),
        }
    }
}

/// Open the backend selected by `settings.db_url`.
pub(crate) async fn open(settings: &StoreSettings) -> StoreResult<Arc<dyn DocumentStore>> {
    match BackendKind::from_url(&settings.db_url)? {
        BackendKind::Memory => Ok(Arc::new(InMemoryDocumentStore::new())),
        #[cfg(feature = "mongodb")]
        BackendKind::Mongo => {
            let store = MongoDocumentStore::connect(
                &settings.db_url,
                &settings.db_name,
                settings.timeouts.connect(),
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongodb"))]
        BackendKind::Mongo => Err(StoreError::Connection(
            "built without the `mongodb` feature".to_string(),
        )),
    }
}
