// End-to-end tests for `Bridge` against a wiremock cloud.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hcbridge_api::ReconnectConfig;
use hcbridge_core::{
    Bridge, BridgeConfig, CharValue, Characteristic, ConnectionState, CoreError, DeviceModel,
    RecordingSink, ServiceKind,
};

const HA_ID: &str = "BOSCH-SMV68-0001";
const BASE: &str = "/api/homeappliances/BOSCH-SMV68-0001";

// ── Helpers ─────────────────────────────────────────────────────────

fn config(server: &MockServer) -> BridgeConfig {
    let mut config = BridgeConfig::new(
        Url::parse(&server.uri()).unwrap(),
        SecretString::from("test-token".to_owned()),
    );
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(1),
    };
    config
}

async fn mount_dishwasher(server: &MockServer) {
    let events = concat!(
        "event: STATUS\n",
        "id: BOSCH-SMV68-0001\n",
        "data: {\"items\":[{\"key\":\"BSH.Common.Status.OperationState\",\"value\":\"BSH.Common.EnumType.OperationState.Finished\",\"timestamp\":1700000000}]}\n\n",
        "event: EVENT\n",
        "id: BOSCH-SMV68-0001\n",
        "data: {\"items\":[{\"key\":\"BSH.Common.Event.ProgramFinished\",\"value\":\"BSH.Common.EnumType.EventPresentState.Present\",\"timestamp\":1700000100}]}\n\n",
    );
    mount_cloud(server, true, events).await;
}

/// The dishwasher account, with its connectivity at listing time and the
/// body of the first event stream session.
async fn mount_cloud(server: &MockServer, connected: bool, events: &'static str) {
    Mock::given(method("GET"))
        .and(path("/api/homeappliances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "homeappliances": [
                { "haId": HA_ID, "name": "Dishwasher", "type": "Dishwasher", "brand": "Bosch", "connected": connected }
            ]}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{BASE}/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "status": [
                { "key": "BSH.Common.Status.OperationState", "value": "BSH.Common.EnumType.OperationState.Run" },
                { "key": "BSH.Common.Status.RemoteControlActive", "value": true }
            ]}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{BASE}/settings")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "settings": [
                { "key": "BSH.Common.Setting.PowerState", "value": "BSH.Common.EnumType.PowerState.On" },
                { "key": "BSH.Common.Setting.ChildLock", "value": false }
            ]}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{BASE}/settings/BSH.Common.Setting.PowerState")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "key": "BSH.Common.Setting.PowerState",
                "value": "BSH.Common.EnumType.PowerState.On",
                "constraints": { "allowedvalues": [
                    "BSH.Common.EnumType.PowerState.On",
                    "BSH.Common.EnumType.PowerState.Off"
                ]}
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/homeappliances/events"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(events.as_bytes().to_vec(), "text/event-stream"),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
}

async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bridge_composes_and_streams() {
    let server = MockServer::start().await;
    mount_dishwasher(&server).await;
    let sink = Arc::new(RecordingSink::default());

    let bridge = Bridge::new(config(&server), sink.clone()).unwrap();
    bridge.connect().await.unwrap();
    bridge.ready().await;

    let accessories = bridge.accessories().await;
    assert_eq!(accessories.len(), 1);
    let services = accessories[0].services();
    let kinds: Vec<_> = services.iter().map(|s| (s.id().kind, s.id().name.clone())).collect();
    assert!(kinds.contains(&(ServiceKind::Switch, "Power".into())));
    assert!(kinds.contains(&(ServiceKind::Lock, "Child Lock".into())));
    assert!(kinds.contains(&(ServiceKind::Indicator, "Remote Control".into())));
    assert!(kinds.contains(&(ServiceKind::ProgrammableButton, "Program Finished".into())));

    eventually(|| !sink.notifications().is_empty()).await;
    let finished = &sink.notifications()[0];
    assert_eq!(finished.service.name, "Program Finished");
    assert_eq!(finished.characteristic, Characteristic::ProgrammableSwitchEvent);

    let model = bridge.appliance(HA_ID).await.unwrap();
    assert!(model.is_connected());
    assert!(
        model
            .item("BSH.Common.Status.OperationState")
            .unwrap()
            .is_enum("Finished")
    );

    bridge.disconnect().await;
    assert_eq!(*bridge.connection_state().borrow(), ConnectionState::Disconnected);
    assert!(bridge.accessories().await.is_empty());
}

#[tokio::test]
async fn test_offline_appliance_is_completed_once_it_connects() {
    let server = MockServer::start().await;
    let events = concat!(
        "event: CONNECTED\n",
        "id: BOSCH-SMV68-0001\n",
        "data: {\"key\":\"BSH.Common.Appliance.Connected\",\"value\":true}\n\n",
    );
    mount_cloud(&server, false, events).await;
    let sink = Arc::new(RecordingSink::default());

    let bridge = Bridge::new(config(&server), sink.clone()).unwrap();
    bridge.connect().await.unwrap();
    bridge.ready().await;

    let accessory = Arc::clone(&bridge.accessories().await[0]);
    let names = || -> Vec<String> {
        accessory
            .services()
            .iter()
            .map(|s| s.id().name.clone())
            .collect()
    };

    eventually(|| names().contains(&"Child Lock".to_owned())).await;
    eventually(|| names().contains(&"Remote Control".to_owned())).await;

    let model = bridge.appliance(HA_ID).await.unwrap();
    assert!(model.is_connected());
    assert!(
        model
            .item("BSH.Common.Status.OperationState")
            .unwrap()
            .is_enum("Run")
    );

    bridge.disconnect().await;
}

#[tokio::test]
async fn test_power_switch_writes_setting() {
    let server = MockServer::start().await;
    mount_dishwasher(&server).await;
    Mock::given(method("PUT"))
        .and(path(format!("{BASE}/settings/BSH.Common.Setting.PowerState")))
        .and(body_json(json!({
            "data": { "key": "BSH.Common.Setting.PowerState", "value": "BSH.Common.EnumType.PowerState.Off" }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let bridge = Bridge::new(config(&server), Arc::new(RecordingSink::default())).unwrap();
    bridge.connect().await.unwrap();
    bridge.ready().await;

    let power = bridge.accessories().await[0]
        .services()
        .into_iter()
        .find(|s| s.id().name == "Power")
        .unwrap();
    power.set(Characteristic::On, CharValue::Bool(false)).await.unwrap();

    bridge.disconnect().await;
}

#[tokio::test]
async fn test_connect_fails_on_rejected_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/homeappliances"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "key": "invalid_token", "description": "The access token expired" }
        })))
        .mount(&server)
        .await;

    let bridge = Bridge::new(config(&server), Arc::new(RecordingSink::default())).unwrap();
    let err = bridge.connect().await.unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(*bridge.connection_state().borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disabled_appliance_is_skipped() {
    let server = MockServer::start().await;
    mount_dishwasher(&server).await;
    let mut config = config(&server);
    config.appliances.insert(
        HA_ID.into(),
        hcbridge_core::ApplianceOptions {
            enabled: false,
            ..Default::default()
        },
    );

    let bridge = Bridge::new(config, Arc::new(RecordingSink::default())).unwrap();
    bridge.connect().await.unwrap();

    assert!(bridge.accessories().await.is_empty());
    assert!(bridge.appliance(HA_ID).await.is_none());
    bridge.disconnect().await;
}
