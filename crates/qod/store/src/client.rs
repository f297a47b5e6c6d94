//! Connection lifecycle and bounded operations.
//!
//! A [`StoreClient`] is either [`Disconnected`] or [`Connected`]. Document
//! operations exist only on `StoreClient<Connected>`, which is obtained from
//! [`StoreClient::connect`]; using a client before connecting does not
//! compile. Every round trip runs under a timeout from [`TimeoutSettings`],
//! and every error is annotated with the operation that produced it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::backend::{self, DocumentStore};
use crate::document::{Document, Filter, Update};
use crate::settings::{StoreSettings, TimeoutSettings};
use crate::{ResultExt, StoreError, StoreResult};

/// State of a client that holds no backend handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disconnected;

/// State of a client holding a live backend handle.
#[derive(Clone)]
pub struct Connected {
    store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for Connected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connected")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

/// Document-store client. Cheap to clone once connected; clones share the
/// backend handle.
#[derive(Debug, Clone)]
pub struct StoreClient<S = Disconnected> {
    settings: StoreSettings,
    state: S,
}

impl<S> StoreClient<S> {
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn db_name(&self) -> &str {
        &self.settings.db_name
    }

    fn timeouts(&self) -> &TimeoutSettings {
        &self.settings.timeouts
    }
}

impl StoreClient<Disconnected> {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings,
            state: Disconnected,
        }
    }

    /// Open the backend selected by the URL scheme within the connect budget.
    #[instrument(skip(self), fields(db = %self.settings.db_name))]
    pub async fn connect(self) -> StoreResult<StoreClient<Connected>> {
        let budget = self.timeouts().connect();
        let store = bounded("connect", budget, backend::open(&self.settings))
            .await
            .context("connect")?;
        info!(backend = store.backend_name(), "connected to document store");
        Ok(self.attach(store))
    }

    /// Connect using an already opened backend, e.g. one shared by several
    /// clients.
    pub fn attach(self, store: Arc<dyn DocumentStore>) -> StoreClient<Connected> {
        StoreClient {
            settings: self.settings,
            state: Connected { store },
        }
    }

    /// Nothing to release.
    pub fn disconnect(self) -> Self {
        self
    }
}

impl StoreClient<Connected> {
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.state.store
    }

    /// Shut the backend down within the disconnect budget.
    #[instrument(skip(self), fields(db = %self.settings.db_name))]
    pub async fn disconnect(self) -> StoreResult<StoreClient<Disconnected>> {
        let budget = self.timeouts().disconnect();
        bounded("disconnect", budget, self.state.store.shutdown())
            .await
            .context("disconnect")?;
        info!("disconnected from document store");
        Ok(StoreClient::new(self.settings))
    }

    /// First document matching `filter`, or `NotFound`.
    #[instrument(level = "debug", skip(self, filter))]
    pub async fn get_one(&self, collection: &str, filter: &Filter) -> StoreResult<Document> {
        let found = self
            .op("get_one", self.state.store.find_one(collection, filter))
            .await?;
        found
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
            })
            .context("get_one")
    }

    /// Every document matching `filter`; bounded by the scan budget.
    #[instrument(level = "debug", skip(self, filter))]
    pub async fn get_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        let budget = self.timeouts().scan();
        let docs = bounded("get_many", budget, self.state.store.find_many(collection, filter))
            .await
            .context("get_many")?;
        debug!(count = docs.len(), "fetched documents");
        Ok(docs)
    }

    /// Merge `fields` into the match, inserting when nothing matches.
    /// Returns the pre-upsert matched count; 0 means a document was inserted.
    #[instrument(level = "debug", skip(self, filter, fields))]
    pub async fn upsert(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Document,
    ) -> StoreResult<u64> {
        let update = Update::set(fields);
        let outcome = self
            .op(
                "upsert",
                self.state.store.update_one(collection, filter, &update, true),
            )
            .await?;
        Ok(outcome.matched)
    }

    /// Merge `fields` into the match only. Returns 0 without error when
    /// nothing matched.
    #[instrument(level = "debug", skip(self, filter, fields))]
    pub async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Document,
    ) -> StoreResult<u64> {
        let update = Update::set(fields);
        let outcome = self
            .op(
                "update",
                self.state.store.update_one(collection, filter, &update, false),
            )
            .await?;
        Ok(outcome.matched)
    }

    /// Atomically apply `update` to the match (creating it first if absent)
    /// and return the post-update document.
    #[instrument(level = "debug", skip(self, filter, update))]
    pub async fn increment_and_fetch(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Document> {
        self.op(
            "increment_and_fetch",
            self.state.store.find_one_and_update(collection, filter, update),
        )
        .await
    }

    #[instrument(level = "debug", skip(self, document))]
    pub async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<()> {
        self.op("insert_one", self.state.store.insert_one(collection, document))
            .await
    }

    /// Insert every document or fail. A short acknowledgement is an error;
    /// documents that did land are not rolled back.
    #[instrument(level = "debug", skip(self, documents), fields(submitted = documents.len()))]
    pub async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let expected = documents.len() as u64;
        let inserted = self
            .op("insert_many", self.state.store.insert_many(collection, documents))
            .await?;
        check_inserted(expected, inserted).context("insert_many")
    }

    /// Apply each `(filter, fields)` pair in order with [`update`](Self::update).
    /// Stops at the first error or zero-match; earlier updates stay applied.
    #[instrument(level = "debug", skip(self, updates), fields(updates = updates.len()))]
    pub async fn update_many(
        &self,
        collection: &str,
        updates: Vec<(Filter, Document)>,
    ) -> StoreResult<()> {
        for (index, (filter, fields)) in updates.into_iter().enumerate() {
            let matched = self
                .update(collection, &filter, fields)
                .await
                .context("update_many")?;
            if matched == 0 {
                warn!(index, "update_many aborted on unmatched filter");
                return Err(StoreError::UpdateNotMatched { index }).context("update_many");
            }
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self, filter))]
    pub async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.op("delete_one", self.state.store.delete_one(collection, filter))
            .await
    }

    #[instrument(level = "debug", skip(self, filter))]
    pub async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.op("delete_many", self.state.store.delete_many(collection, filter))
            .await
    }

    #[instrument(level = "debug", skip(self, filter))]
    pub async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.op("count", self.state.store.count(collection, filter))
            .await
    }

    #[instrument(skip(self))]
    pub async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.op("drop_collection", self.state.store.drop_collection(collection))
            .await?;
        warn!("dropped collection");
        Ok(())
    }

    #[instrument(skip(self), fields(db = %self.settings.db_name))]
    pub async fn drop_database(&self) -> StoreResult<()> {
        self.op("drop_database", self.state.store.drop_database())
            .await?;
        warn!("dropped database");
        Ok(())
    }

    /// Run a single-document round trip under the operation budget.
    async fn op<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        bounded(operation, self.timeouts().operation(), fut)
            .await
            .context(operation)
    }
}

/// Await `fut` for at most `budget`.
pub(crate) async fn bounded<T, F>(operation: &'static str, budget: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation,
            after: budget,
        }),
    }
}

fn check_inserted(expected: u64, inserted: u64) -> StoreResult<()> {
    if inserted == expected {
        Ok(())
    } else {
        Err(StoreError::InsertCountMismatch { expected, inserted })
    }
}
