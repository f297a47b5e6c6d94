//! QoD persistence facade.
//!
//! Each operation builds a filter over a record's natural key, issues one
//! client call and decodes the result. There is no business logic here and
//! no state beyond the shared client handle.

use std::sync::Arc;

use qod_store::{
    Connected, Disconnected, DocumentStore, FieldPath, Filter, Predicate, ResultExt,
    StoreClient, StoreResult, StoreSettings, Update,
};
use tracing::{debug, instrument};

use crate::codec::{decode, decode_all, encode};
use crate::model::{
    collections, fields, qos_profile_path, ProvQodAppServerData, Record, ServiceQodUeFlow,
    ServiceQodUeSession,
};

/// Typed access to the QoD collections.
///
/// Constructed disconnected; [`connect`](QodDbApi::connect) yields the
/// connected facade that carries the typed operations. A connected facade
/// is `Clone + Send + Sync` and is meant to be shared across tasks.
#[derive(Debug, Clone)]
pub struct QodDbApi<S = Disconnected> {
    client: StoreClient<S>,
}

impl QodDbApi<Disconnected> {
    pub fn new(db_name: impl Into<String>, db_url: impl Into<String>) -> Self {
        Self::from_settings(StoreSettings::new(db_name, db_url))
    }

    pub fn from_settings(settings: StoreSettings) -> Self {
        Self {
            client: StoreClient::new(settings),
        }
    }

    pub async fn connect(self) -> StoreResult<QodDbApi<Connected>> {
        let client = self.client.connect().await.context("connect")?;
        Ok(QodDbApi { client })
    }

    /// Connect over an already opened backend.
    pub fn attach(self, store: Arc<dyn DocumentStore>) -> QodDbApi<Connected> {
        QodDbApi {
            client: self.client.attach(store),
        }
    }

    /// Nothing to release.
    pub fn disconnect(self) -> Self {
        self
    }
}

impl QodDbApi<Connected> {
    /// The underlying document-store client.
    pub fn client(&self) -> &StoreClient<Connected> {
        &self.client
    }

    pub async fn disconnect(self) -> StoreResult<QodDbApi<Disconnected>> {
        let client = self.client.disconnect().await.context("disconnect")?;
        Ok(QodDbApi { client })
    }

    /// Drop the whole database. Irreversible.
    pub async fn drop_db(&self) -> StoreResult<()> {
        self.client.drop_database().await.context("drop_db")
    }

    // --- provisioned application-server data ---

    #[instrument(skip(self))]
    pub async fn get_prov_app_server_data(
        &self,
        as_ipv4_addr: &str,
    ) -> StoreResult<ProvQodAppServerData> {
        let filter = Filter::all().eq(fields::AS_IPV4_ADDR, as_ipv4_addr);
        self.get_one(&filter).await.context("get_prov_app_server_data")
    }

    /// Upsert provisioning data. Returns the pre-upsert match count.
    #[instrument(skip(self, data))]
    pub async fn put_prov_app_server_data(
        &self,
        as_ipv4_addr: &str,
        data: &ProvQodAppServerData,
    ) -> StoreResult<u64> {
        let filter = Filter::all().eq(fields::AS_IPV4_ADDR, as_ipv4_addr);
        self.put(&filter, data).await.context("put_prov_app_server_data")
    }

    /// Insert several provisioning records at once. Fails unless every
    /// record is acknowledged; records already inserted stay.
    #[instrument(skip(self, data), fields(records = data.len()))]
    pub async fn put_many_prov_app_server_data(
        &self,
        data: &[ProvQodAppServerData],
    ) -> StoreResult<()> {
        let docs = data
            .iter()
            .map(encode)
            .collect::<StoreResult<Vec<_>>>()
            .context("put_many_prov_app_server_data")?;
        self.client
            .insert_many(collections::PROV_APP_SERVER_DATA, docs)
            .await
            .context("put_many_prov_app_server_data")
    }

    // --- UE flows ---

    #[instrument(skip(self))]
    pub async fn get_ue_flow(
        &self,
        ue_ipv4_addr: &str,
        scs_as_id: &str,
    ) -> StoreResult<ServiceQodUeFlow> {
        self.get_one(&flow_filter(ue_ipv4_addr, scs_as_id))
            .await
            .context("get_ue_flow")
    }

    /// Seed or overwrite a flow record. Counters are advanced with
    /// [`increment_ue_flow`](Self::increment_ue_flow), never through here.
    #[instrument(skip(self, data))]
    pub async fn put_ue_flow(
        &self,
        ue_ipv4_addr: &str,
        scs_as_id: &str,
        data: &ServiceQodUeFlow,
    ) -> StoreResult<u64> {
        self.put(&flow_filter(ue_ipv4_addr, scs_as_id), data)
            .await
            .context("put_ue_flow")
    }

    /// Atomically add one to the flow counter, creating the flow at 1 if it
    /// does not exist, and return the updated record.
    #[instrument(skip(self))]
    pub async fn increment_ue_flow(
        &self,
        ue_ipv4_addr: &str,
        scs_as_id: &str,
    ) -> StoreResult<ServiceQodUeFlow> {
        let update = Update::increment(FieldPath::field(fields::FLOW_COUNTER), 1);
        let doc = self
            .client
            .increment_and_fetch(
                collections::SERVICE_UE_FLOW,
                &flow_filter(ue_ipv4_addr, scs_as_id),
                &update,
            )
            .await
            .context("increment_ue_flow")?;
        let flow: ServiceQodUeFlow = decode(doc).context("increment_ue_flow")?;
        debug!(flow_counter = flow.flow_counter, "advanced flow counter");
        Ok(flow)
    }

    /// Every stored flow; empty when there are none.
    #[instrument(skip(self))]
    pub async fn list_ue_flows(&self) -> StoreResult<Vec<ServiceQodUeFlow>> {
        self.get_many(&Filter::all()).await.context("list_ue_flows")
    }

    // --- service sessions ---

    #[instrument(skip(self))]
    pub async fn get_ue_session(&self, session_id: &str) -> StoreResult<ServiceQodUeSession> {
        let filter = Filter::all().eq(fields::SESSION_ID, session_id);
        self.get_one(&filter).await.context("get_ue_session")
    }

    /// Upsert a session keyed by (UE address, session id). Returns the
    /// pre-upsert match count.
    #[instrument(skip(self, data))]
    pub async fn put_ue_session(
        &self,
        ue_ipv4_addr: &str,
        session_id: &str,
        data: &ServiceQodUeSession,
    ) -> StoreResult<u64> {
        let filter = Filter::all()
            .eq(fields::UE_IPV4_ADDR, ue_ipv4_addr)
            .eq(fields::SESSION_ID, session_id);
        self.put(&filter, data).await.context("put_ue_session")
    }

    /// Remove one session. Returns the number removed (0 or 1). Flows are
    /// left in place.
    #[instrument(skip(self))]
    pub async fn delete_ue_session(&self, session_id: &str) -> StoreResult<u64> {
        let filter = Filter::all().eq(fields::SESSION_ID, session_id);
        self.client
            .delete_one(collections::SERVICE_SESSION, &filter)
            .await
            .context("delete_ue_session")
    }

    #[instrument(skip(self))]
    pub async fn count_ue_sessions(&self, ue_ipv4_addr: &str, scs_as_id: &str) -> StoreResult<u64> {
        let filter = Filter::all()
            .eq(fields::UE_IPV4_ADDR, ue_ipv4_addr)
            .eq(fields::SCS_AS_ID, scs_as_id);
        self.client
            .count(collections::SERVICE_SESSION, &filter)
            .await
            .context("count_ue_sessions")
    }

    /// Sessions of a UE and application using the given QoS profile; empty
    /// when none match.
    #[instrument(skip(self))]
    pub async fn list_ue_sessions(
        &self,
        ue_ipv4_addr: &str,
        scs_as_id: &str,
        qos_profile: &str,
    ) -> StoreResult<Vec<ServiceQodUeSession>> {
        let filter = Filter::all()
            .eq(fields::UE_IPV4_ADDR, ue_ipv4_addr)
            .eq(fields::SCS_AS_ID, scs_as_id)
            .eq_nested(qos_profile_path(), qos_profile);
        self.get_many(&filter).await.context("list_ue_sessions")
    }

    async fn get_one<R: Record>(&self, filter: &Filter) -> StoreResult<R> {
        let doc = self.client.get_one(R::COLLECTION, filter).await?;
        decode(doc)
    }

    async fn get_many<R: Record>(&self, filter: &Filter) -> StoreResult<Vec<R>> {
        let docs = self.client.get_many(R::COLLECTION, filter).await?;
        decode_all(docs)
    }

    /// Upsert `record` under `filter`. The filter's key values are written
    /// over the record's own so a put cannot move a record to another key.
    async fn put<R: Record>(&self, filter: &Filter, record: &R) -> StoreResult<u64> {
        let mut doc = encode(record)?;
        for predicate in filter.predicates() {
            if let Predicate::Equals { field, value } = predicate {
                doc.insert(field.clone(), value.clone());
            }
        }
        self.client.upsert(R::COLLECTION, filter, doc).await
    }
}

fn flow_filter(ue_ipv4_addr: &str, scs_as_id: &str) -> Filter {
    Filter::all()
        .eq(fields::UE_IPV4_ADDR, ue_ipv4_addr)
        .eq(fields::SCS_AS_ID, scs_as_id)
}
