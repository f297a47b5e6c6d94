//! Stored record types.
//!
//! Wire names follow the documents the QoD service already writes:
//! camelCase, except `FlowCounter` and the nested `sessionReq.Qos`.
//! Optional fields are omitted when absent so a put never overwrites a
//! stored value with null.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use qod_store::{FieldPath, StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collection names.
pub mod collections {
    pub const PROV_APP_SERVER_DATA: &str = "camara.qod.provisionedData.session";
    pub const SERVICE_SESSION: &str = "camara.qod.service.session";
    pub const SERVICE_UE_FLOW: &str = "camara.qod.service.ueflow";
}

/// Wire field names used in filters and updates.
pub mod fields {
    pub const AS_IPV4_ADDR: &str = "asIpv4Addr";
    pub const UE_IPV4_ADDR: &str = "ueIpv4Addr";
    pub const SCS_AS_ID: &str = "scsAsId";
    pub const REGION: &str = "region";
    pub const QOS_PROFILES: &str = "qosProfiles";
    pub const SESSION_ID: &str = "sessionId";
    pub const SESSION_REQ: &str = "sessionReq";
    pub const QOS: &str = "Qos";
    pub const FLOW_COUNTER: &str = "FlowCounter";
}

/// Path of the QoS profile reference inside a stored session.
pub fn qos_profile_path() -> FieldPath {
    FieldPath::field(fields::SESSION_REQ).child(fields::QOS)
}

/// A typed record stored in its own collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    /// Fields that must be present (and non-null) for a document to decode.
    const REQUIRED_FIELDS: &'static [&'static str];

    /// Reject values that would not read back as written.
    fn validate(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Store-assigned id; never a record field.
pub(crate) const STORE_ID_FIELD: &str = "_id";

/// Provisioning data for an application server, keyed by its IPv4 address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvQodAppServerData {
    pub as_ipv4_addr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scs_as_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// QoS profiles the server may request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qos_profiles: Vec<String>,

    /// Any other provisioning attribute, kept as stored.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl ProvQodAppServerData {
    pub fn new(as_ipv4_addr: impl Into<String>) -> Self {
        Self {
            as_ipv4_addr: as_ipv4_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Record for ProvQodAppServerData {
    const COLLECTION: &'static str = collections::PROV_APP_SERVER_DATA;
    const REQUIRED_FIELDS: &'static [&'static str] = &[fields::AS_IPV4_ADDR];

    /// Attribute keys are stored as top-level fields, so they must be plain
    /// names that do not collide with a named field or the store id.
    fn validate(&self) -> StoreResult<()> {
        const NAMED: &[&str] = &[
            fields::AS_IPV4_ADDR,
            fields::SCS_AS_ID,
            fields::REGION,
            fields::QOS_PROFILES,
            STORE_ID_FIELD,
        ];
        for key in self.attributes.keys() {
            let problem = if key.is_empty() {
                "is empty"
            } else if key.contains('.') {
                "contains `.`"
            } else if key.starts_with('$') {
                "starts with `$`"
            } else if NAMED.contains(&key.as_str()) {
                "is a reserved field name"
            } else {
                continue;
            };
            return Err(StoreError::Serialization(format!(
                "attribute key `{key}` {problem}"
            )));
        }
        Ok(())
    }
}

/// The QoD request a session was created from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QodSessionRequest {
    /// QoS profile reference, e.g. `QOS_E`
    #[serde(rename = "Qos")]
    pub qos: String,

    /// Requested duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_ipv4_addr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ue_ports: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_ports: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
}

/// Service state of one QoD session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQodUeSession {
    pub session_id: String,

    pub ue_ipv4_addr: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scs_as_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_req: Option<QodSessionRequest>,

    /// Flow counter value allocated to this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Record for ServiceQodUeSession {
    const COLLECTION: &'static str = collections::SERVICE_SESSION;
    const REQUIRED_FIELDS: &'static [&'static str] = &[fields::SESSION_ID, fields::UE_IPV4_ADDR];
}

/// Per (UE, application) flow counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceQodUeFlow {
    #[serde(rename = "ueIpv4Addr")]
    pub ue_ipv4_addr: String,

    #[serde(rename = "scsAsId")]
    pub scs_as_id: String,

    #[serde(rename = "FlowCounter", default)]
    pub flow_counter: u64,
}

impl Record for ServiceQodUeFlow {
    const COLLECTION: &'static str = collections::SERVICE_UE_FLOW;
    const REQUIRED_FIELDS: &'static [&'static str] = &[fields::UE_IPV4_ADDR, fields::SCS_AS_ID];
}
