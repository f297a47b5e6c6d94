//! Property tests: whatever a put accepts, a get returns unchanged.

use proptest::prelude::*;
use qod_dbapi::{
    ProvQodAppServerData, QodDbApi, QodSessionRequest, ServiceQodUeSession, StoreError,
};
use serde_json::Value;

const RESERVED: &[&str] = &["_id", "asIpv4Addr", "scsAsId", "region", "qosProfiles"];

fn storable_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('.') && !key.starts_with('$') && !RESERVED.contains(&key)
}

fn arb_attribute_key() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-z][a-zA-Z_]{0,10}",
        1 => "[a-z]{1,4}\\.[a-z]{1,4}",
        1 => "\\$[a-z]{1,6}",
        1 => prop::sample::select(RESERVED).prop_map(|k| k.to_string()),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn arb_ipv4() -> impl Strategy<Value = String> {
    (any::<u8>(), any::<u8>(), any::<u8>(), 1u8..255)
        .prop_map(|(a, b, c, d)| format!("{a}.{b}.{c}.{d}"))
}

fn arb_attribute_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
    ]
}

fn arb_prov() -> impl Strategy<Value = ProvQodAppServerData> {
    (
        arb_ipv4(),
        proptest::option::of("[a-z0-9-]{1,12}"),
        proptest::option::of("[a-z]{2}"),
        prop::collection::vec("QOS_[A-Z]", 0..4),
        prop::collection::btree_map(arb_attribute_key(), arb_attribute_value(), 0..4),
    )
        .prop_map(|(addr, scs_as_id, region, qos_profiles, attributes)| ProvQodAppServerData {
            as_ipv4_addr: addr,
            scs_as_id,
            region,
            qos_profiles,
            attributes,
        })
}

fn arb_session() -> impl Strategy<Value = ServiceQodUeSession> {
    (
        "[a-f0-9]{8}",
        arb_ipv4(),
        "[a-z0-9]{0,8}",
        proptest::option::of(("QOS_[A-Z]", proptest::option::of(1u64..86_400))),
        proptest::option::of(any::<u32>()),
    )
        .prop_map(|(session_id, ue, app, req, flow_id)| ServiceQodUeSession {
            session_id,
            ue_ipv4_addr: ue,
            scs_as_id: app,
            session_req: req.map(|(qos, duration)| QodSessionRequest {
                qos,
                duration,
                ..Default::default()
            }),
            flow_id: flow_id.map(u64::from),
            ..Default::default()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn provisioned_data_survives_put_then_get(prov in arb_prov()) {
        let storable = prov.attributes.keys().all(|k| storable_key(k));
        let (put, loaded) = runtime().block_on(async {
            let api = QodDbApi::new("qod-prop", "memory://").connect().await.unwrap();
            let put = api.put_prov_app_server_data(&prov.as_ipv4_addr, &prov).await;
            let loaded = api.get_prov_app_server_data(&prov.as_ipv4_addr).await;
            (put, loaded)
        });
        if storable {
            prop_assert!(put.is_ok());
            prop_assert_eq!(loaded.unwrap(), prov);
        } else {
            let err = put.unwrap_err();
            prop_assert!(matches!(err.root(), StoreError::Serialization(_)));
            prop_assert!(loaded.unwrap_err().is_not_found());
        }
    }

    #[test]
    fn session_survives_put_then_get(session in arb_session()) {
        let loaded = runtime().block_on(async {
            let api = QodDbApi::new("qod-prop", "memory://").connect().await.unwrap();
            api.put_ue_session(&session.ue_ipv4_addr, &session.session_id, &session)
                .await
                .unwrap();
            api.get_ue_session(&session.session_id).await.unwrap()
        });
        prop_assert_eq!(loaded, session);
    }
}
