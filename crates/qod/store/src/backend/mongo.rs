//! MongoDB adapter for the QoD document store.
//!
//! Typed filters and updates are rendered to their wire documents and
//! converted to BSON; returned BSON is converted back to relaxed extended
//! JSON, so numbers come back as plain JSON numbers and `_id` as `{"$oid": ..}`.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document as BsonDocument};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, FindOneAndUpdateOptions, ReturnDocument, UpdateOptions};
use mongodb::{Client, Collection, Database};
use serde_json::Value;

use super::{DocumentStore, UpdateOutcome};
use crate::document::{Document, Filter, Update};
use crate::{StoreError, StoreResult};

/// MongoDB-backed document store bound to one database.
#[derive(Clone)]
pub struct MongoDocumentStore {
    client: Client,
    database: Database,
}

impl MongoDocumentStore {
    /// Build a client for `url` and ping `db_name`. The driver connects
    /// lazily, so the ping is what surfaces an unreachable server.
    pub async fn connect(url: &str, db_name: &str, connect_timeout: Duration) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(url)
            .await
            .map_err(|e| StoreError::Connection(format!("invalid mongodb url: {e}")))?;
        options.connect_timeout = Some(connect_timeout);
        options.server_selection_timeout = Some(connect_timeout);

        let client = Client::with_options(options)
            .map_err(|e| StoreError::Connection(format!("failed to create mongodb client: {e}")))?;
        let database = client.database(db_name);
        let store = Self { client, database };
        store
            .ping()
            .await
            .map_err(|e| StoreError::Connection(format!("mongodb unreachable: {e}")))?;
        Ok(store)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }
}

/// Server error code for a unique index violation (E11000).
const DUPLICATE_KEY_CODE: i32 = 11000;

fn backend(err: mongodb::error::Error) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::DuplicateKey(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|e| e.code == DUPLICATE_KEY_CODE)),
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn to_bson(doc: &Document) -> StoreResult<BsonDocument> {
    bson::to_document(doc).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_bson(doc: BsonDocument) -> StoreResult<Document> {
    match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::decode(format!(
            "expected a document from mongodb, got {other}"
        ))),
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let found = self
            .collection(collection)
            .find_one(to_bson(&filter.to_document())?, None)
            .await
            .map_err(backend)?;
        found.map(from_bson).transpose()
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .find(to_bson(&filter.to_document())?, None)
            .await
            .map_err(backend)?;
        let docs: Vec<BsonDocument> = cursor.try_collect().await.map_err(backend)?;
        docs.into_iter().map(from_bson).collect()
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> StoreResult<UpdateOutcome> {
        let options = UpdateOptions::builder().upsert(upsert).build();
        let result = self
            .collection(collection)
            .update_one(
                to_bson(&filter.to_document())?,
                to_bson(&update.to_document())?,
                options,
            )
            .await
            .map_err(backend)?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Document> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .collection(collection)
            .find_one_and_update(
                to_bson(&filter.to_document())?,
                to_bson(&update.to_document())?,
                options,
            )
            .await
            .map_err(backend)?;
        match updated {
            Some(doc) => from_bson(doc),
            None => Err(StoreError::Backend(
                "upsert returned no document".to_string(),
            )),
        }
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<()> {
        self.collection(collection)
            .insert_one(to_bson(&document)?, None)
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<u64> {
        let docs = documents
            .iter()
            .map(to_bson)
            .collect::<StoreResult<Vec<_>>>()?;
        let result = self
            .collection(collection)
            .insert_many(docs, None)
            .await
            .map_err(backend)?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let result = self
            .collection(collection)
            .delete_one(to_bson(&filter.to_document())?, None)
            .await
            .map_err(backend)?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let result = self
            .collection(collection)
            .delete_many(to_bson(&filter.to_document())?, None)
            .await
            .map_err(backend)?;
        Ok(result.deleted_count)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.collection(collection)
            .count_documents(to_bson(&filter.to_document())?, None)
            .await
            .map_err(backend)
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.collection(collection).drop(None).await.map_err(backend)
    }

    async fn drop_database(&self) -> StoreResult<()> {
        self.database.drop(None).await.map_err(backend)
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
