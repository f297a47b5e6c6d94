//! QoD document-store client.
//!
//! This crate wraps an external document database behind a small, typed
//! surface:
//! - [`Filter`] / [`Update`]: typed builders for the filter and update
//!   documents the store understands
//! - [`DocumentStore`]: backend seam, with an in-memory implementation and a
//!   MongoDB implementation behind the `mongodb` feature
//! - [`StoreClient`]: connection lifecycle plus bounded, annotated operations
//!   (get-one, get-many, upsert, conditional update, increment-and-fetch,
//!   insert, update-many, delete, count, drop)
//!
//! Design stance:
//! - Operations are only reachable on a connected client.
//! - Every round trip is time-bounded and every error carries the operation
//!   and source location that produced it. Nothing is retried.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod backend;
mod client;
pub mod document;
mod error;
mod settings;

pub use backend::{BackendKind, DocumentStore, InMemoryDocumentStore, UpdateOutcome};
#[cfg(feature = "mongodb")]
pub use backend::MongoDocumentStore;
pub use client::{Connected, Disconnected, StoreClient};
pub use document::{Document, FieldPath, Filter, Predicate, Update};
pub use error::{ResultExt, StoreError, StoreResult};
pub use settings::{StoreSettings, TimeoutSettings};
