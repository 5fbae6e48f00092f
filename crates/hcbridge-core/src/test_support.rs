#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::capability::{
    AccessoryServices, CompositionHost, FeaturePolicy, ModuleContext, RecordingSink,
};
use crate::capability::Accessory;
use crate::device::DeviceModel;
use crate::error::CoreError;
use crate::model::{ApplianceInfo, ApplianceType, CachedItem, DeviceEvent, SettingDescription};

/// In-memory `DeviceModel` recording every remote write.
pub(crate) struct FakeDevice {
    info: ApplianceInfo,
    items: DashMap<String, Arc<CachedItem>>,
    events: broadcast::Sender<DeviceEvent>,
    connected: watch::Sender<bool>,
    pub settings: Mutex<Vec<SettingDescription>>,
    pub details: Mutex<HashMap<String, SettingDescription>>,
    pub writes: Mutex<Vec<(String, Value)>>,
    pub stops: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl FakeDevice {
    pub fn new(name: &str) -> Self {
        Self::typed(name, ApplianceType::Dishwasher)
    }

    pub fn typed(name: &str, appliance_type: ApplianceType) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            info: ApplianceInfo {
                ha_id: format!("{name}-1"),
                name: name.into(),
                appliance_type,
                brand: None,
                model: None,
                connected: true,
            },
            items: DashMap::new(),
            events,
            connected: watch::Sender::new(true),
            settings: Mutex::default(),
            details: Mutex::default(),
            writes: Mutex::default(),
            stops: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Cache a value and publish a change event.
    pub fn set(&self, key: &str, value: Value) {
        let item = Arc::new(CachedItem {
            key: key.into(),
            value,
            unit: None,
            timestamp: Utc::now(),
        });
        self.items.insert(key.into(), Arc::clone(&item));
        let _ = self.events.send(DeviceEvent::Item(item));
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.send_replace(connected);
        let _ = self.events.send(DeviceEvent::Connected(connected));
    }

    pub fn add_setting(&self, key: &str, value: Value) {
        self.settings.lock().unwrap().push(SettingDescription {
            key: key.into(),
            value,
            constraints: None,
        });
    }

    pub fn add_detail(&self, detail: SettingDescription) {
        self.details
            .lock()
            .unwrap()
            .insert(detail.key.clone(), detail);
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().unwrap().clone()
    }
}

impl DeviceModel for FakeDevice {
    fn info(&self) -> &ApplianceInfo {
        &self.info
    }

    fn item(&self, key: &str) -> Option<Arc<CachedItem>> {
        self.items.get(key).map(|e| Arc::clone(e.value()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Like the cloud, refuses while the appliance is offline.
    fn settings(&self) -> BoxFuture<'_, Result<Vec<SettingDescription>, CoreError>> {
        let settings = self.settings.lock().unwrap().clone();
        let connected = self.is_connected();
        Box::pin(async move {
            if !connected {
                return Err(CoreError::Rejected {
                    message: "Appliance is offline".into(),
                    key: Some("SDK.Error.HomeAppliance.Connection.Initialization.Failed".into()),
                });
            }
            Ok(settings)
        })
    }

    fn setting<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<SettingDescription, CoreError>> {
        let detail = self.details.lock().unwrap().get(key).cloned();
        Box::pin(async move {
            detail.ok_or_else(|| CoreError::NotFound {
                entity_type: "setting".into(),
                identifier: key.into(),
            })
        })
    }

    fn set_setting<'a>(
        &'a self,
        key: &'a str,
        value: Value,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(CoreError::Rejected {
                    message: "Appliance is busy".into(),
                    key: Some("SDK.Error.WrongOperationState".into()),
                });
            }
            self.writes.lock().unwrap().push((key.into(), value));
            Ok(())
        })
    }

    fn stop_program(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Compose `host` against `device`, recording every outward change.
pub(crate) fn compose(
    host: CompositionHost,
    device: &Arc<FakeDevice>,
    policy: FeaturePolicy,
) -> (Accessory, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let ctx = ModuleContext::new(
        Arc::clone(device) as Arc<dyn DeviceModel>,
        Arc::new(AccessoryServices::new(device.info().name.clone(), sink.clone())),
        Arc::new(policy),
        false,
    );
    (host.compose(ctx).unwrap(), sink)
}

/// Give spawned listeners a chance to run.
pub(crate) async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
}
