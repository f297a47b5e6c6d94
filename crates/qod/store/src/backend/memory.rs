//! In-memory reference implementation of [`DocumentStore`].
//!
//! Deterministic and test-friendly. Every operation holds the collection lock
//! for its whole duration, so find-and-update is atomic with respect to
//! concurrent callers. Production deployments use the MongoDB backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, UpdateOutcome};
use crate::document::{Document, Filter, Update};
use crate::{StoreError, StoreResult};

const ID_FIELD: &str = "_id";

/// In-memory document store holding a single database.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    open: AtomicBool,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            open: AtomicBool::new(true),
        }
    }

    /// Names of collections created so far. A collection is created by its
    /// first insert or upsert and stays until dropped, even when emptied.
    pub async fn collection_names(&self) -> Vec<String> {
        let guard = self.collections.read().await;
        let mut names = guard.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }
}

/// Apply `update` to the first match, or seed and insert when `upsert`.
/// Returns the outcome and the post-update document, if any.
fn update_in_place(
    docs: &mut Vec<Document>,
    filter: &Filter,
    update: &Update,
    upsert: bool,
) -> StoreResult<(UpdateOutcome, Option<Document>)> {
    if let Some(existing) = docs.iter_mut().find(|doc| filter.matches(doc)) {
        let mut next = existing.clone();
        update.apply(&mut next)?;
        let modified = u64::from(next != *existing);
        *existing = next.clone();
        let outcome = UpdateOutcome {
            matched: 1,
            modified,
            upserted: false,
        };
        return Ok((outcome, Some(next)));
    }

    if !upsert {
        return Ok((UpdateOutcome::default(), None));
    }

    let mut seeded = filter.seed_document()?;
    update.apply(&mut seeded)?;
    assign_id(&mut seeded);
    docs.push(seeded.clone());
    let outcome = UpdateOutcome {
        matched: 0,
        modified: 0,
        upserted: true,
    };
    Ok((outcome, Some(seeded)))
}

/// Upsert into `collection`, creating it only if the upsert succeeds.
fn upsert_in(
    collections: &mut HashMap<String, Vec<Document>>,
    collection: &str,
    filter: &Filter,
    update: &Update,
) -> StoreResult<(UpdateOutcome, Option<Document>)> {
    let created = !collections.contains_key(collection);
    let docs = collections.entry(collection.to_string()).or_default();
    let result = update_in_place(docs, filter, update, true);
    if result.is_err() && created {
        collections.remove(collection);
    }
    result
}

fn assign_id(doc: &mut Document) {
    doc.entry(ID_FIELD.to_string())
        .or_insert_with(|| Value::String(Uuid::new_v4().simple().to_string()));
}

fn push_unique(docs: &mut Vec<Document>, mut document: Document) -> StoreResult<()> {
    assign_id(&mut document);
    let id = &document[ID_FIELD];
    if docs.iter().any(|existing| existing.get(ID_FIELD) == Some(id)) {
        return Err(StoreError::DuplicateKey(format!("{ID_FIELD} {id}")));
    }
    docs.push(document);
    Ok(())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.ensure_open()
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        self.ensure_open()?;
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)))
            .cloned())
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> StoreResult<UpdateOutcome> {
        self.ensure_open()?;
        let mut guard = self.collections.write().await;
        if !upsert {
            let Some(docs) = guard.get_mut(collection) else {
                return Ok(UpdateOutcome::default());
            };
            let (outcome, _) = update_in_place(docs, filter, update, false)?;
            return Ok(outcome);
        }
        let (outcome, _) = upsert_in(&mut guard, collection, filter, update)?;
        Ok(outcome)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Document> {
        self.ensure_open()?;
        let mut guard = self.collections.write().await;
        let (_, after) = upsert_in(&mut guard, collection, filter, update)?;
        after.ok_or_else(|| StoreError::Backend("upsert returned no document".to_string()))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<()> {
        self.ensure_open()?;
        let mut guard = self.collections.write().await;
        push_unique(guard.entry(collection.to_string()).or_default(), document)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<u64> {
        self.ensure_open()?;
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        let mut inserted = 0;
        for document in documents {
            // Ordered semantics: stop at the first failure, keep what landed.
            push_unique(docs, document)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.ensure_open()?;
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };
        match docs.iter().position(|doc| filter.matches(doc)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.ensure_open()?;
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !filter.matches(doc));
        Ok((before - docs.len()) as u64)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.ensure_open()?;
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.collections.write().await.remove(collection);
        Ok(())
    }

    async fn drop_database(&self) -> StoreResult<()> {
        self.ensure_open()?;
        self.collections.write().await.clear();
        Ok(())
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}
