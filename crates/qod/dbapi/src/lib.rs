//! Persistence facade for the CAMARA QoD session service.
//!
//! Three record kinds, each in its own collection:
//! - [`ProvQodAppServerData`]: provisioning per application-server address
//! - [`ServiceQodUeSession`]: service state per QoD session
//! - [`ServiceQodUeFlow`]: flow counter per (UE address, application)
//!
//! [`QodDbApi`] maps named operations onto [`qod_store`] filters and decodes
//! the results into these types. Flow counters only move through the
//! store's atomic increment-and-fetch.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod api;
mod codec;
pub mod model;

pub use api::QodDbApi;
pub use model::{
    collections, ProvQodAppServerData, QodSessionRequest, Record, ServiceQodUeFlow,
    ServiceQodUeSession,
};
pub use qod_store::{Connected, Disconnected, StoreError, StoreResult, StoreSettings};
