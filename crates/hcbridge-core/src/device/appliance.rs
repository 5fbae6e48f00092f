// ── In-memory appliance model ──
//
// Latest value per key, fed by stream events and by status/settings reads.
// Change events are published only when a value actually changes; discrete
// `EVENT` items are published every time. Connectivity lives in its own
// `watch` channel so late subscribers see the current state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{OnceCell, broadcast, watch};
use tracing::{debug, info, warn};

use hcbridge_api::{DomainEvent, EventKind};

use super::{ApplianceApi, DeviceModel};
use crate::error::CoreError;
use crate::model::{ApplianceInfo, CachedItem, DeviceEvent, SettingDescription};

const EVENT_CHANNEL_SIZE: usize = 256;

/// Cached state of one appliance.
pub struct ApplianceModel {
    info: ApplianceInfo,
    api: Arc<dyn ApplianceApi>,
    items: DashMap<String, Arc<CachedItem>>,
    events: broadcast::Sender<DeviceEvent>,
    connected: watch::Sender<bool>,
    settings: OnceCell<Vec<SettingDescription>>,
    sessions: AtomicU64,
}

impl ApplianceModel {
    pub fn new(info: ApplianceInfo, api: Arc<dyn ApplianceApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let connected = watch::Sender::new(info.connected);
        Self {
            info,
            api,
            items: DashMap::new(),
            events,
            connected,
            settings: OnceCell::new(),
            sessions: AtomicU64::new(0),
        }
    }

    pub fn ha_id(&self) -> &str {
        &self.info.ha_id
    }

    /// Every cached item, sorted by key.
    pub fn snapshot(&self) -> Vec<Arc<CachedItem>> {
        let mut items: Vec<_> = self.items.iter().map(|e| Arc::clone(e.value())).collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Cache `item`. Returns `true` if a change event was published.
    pub fn store(&self, item: CachedItem, always_publish: bool) -> bool {
        let item = Arc::new(item);
        let changed = match self.items.insert(item.key.clone(), Arc::clone(&item)) {
            Some(previous) => previous.value != item.value || previous.unit != item.unit,
            None => true,
        };

        if !(changed || always_publish) {
            return false;
        }

        debug!(ha_id = %self.info.ha_id, key = %item.key, value = %item.value, "Item updated");
        let _ = self.events.send(DeviceEvent::Item(item));
        true
    }

    pub fn set_connected(&self, connected: bool) {
        let modified = self.connected.send_if_modified(|current| {
            let modified = *current != connected;
            *current = connected;
            modified
        });
        if modified {
            info!(ha_id = %self.info.ha_id, connected, "Appliance connectivity changed");
            let _ = self.events.send(DeviceEvent::Connected(connected));
        }
    }

    /// Fold one stream event into the cache.
    ///
    /// Returns `true` when the event brought an offline appliance back, so
    /// its state must be re-read.
    pub fn apply_event(&self, event: &DomainEvent) -> bool {
        match event.event {
            EventKind::Status | EventKind::Notify => {
                for item in event.items() {
                    self.store(item.into(), false);
                }
            }
            EventKind::Event => {
                for item in event.items() {
                    self.store(item.into(), true);
                }
            }
            EventKind::Connected | EventKind::Paired => {
                let was_offline = !self.is_connected();
                self.set_connected(true);
                return was_offline;
            }
            EventKind::Disconnected | EventKind::Depaired => self.set_connected(false),
            EventKind::KeepAlive => {}
        }
        false
    }

    /// Record the start of a stream session. Returns `true` when this is a
    /// reconnect, i.e. events may have been missed and a resync is due.
    pub fn session_started(&self) -> bool {
        self.sessions.fetch_add(1, Ordering::Relaxed) > 0
    }

    /// Re-read status and settings from the cloud.
    pub async fn resync(&self) -> Result<(), CoreError> {
        let ha_id = self.info.ha_id.as_str();
        let (status, settings) = tokio::join!(
            self.api.fetch_status(ha_id),
            self.api.fetch_settings(ha_id)
        );

        let mut changed = 0usize;
        for item in status?.into_iter().chain(settings?) {
            if self.store(item.into(), false) {
                changed += 1;
            }
        }

        self.set_connected(true);
        debug!(ha_id, changed, "Resynchronised appliance state");
        Ok(())
    }

    /// Resync, logging instead of failing.
    pub async fn resync_logged(&self) {
        if let Err(e) = self.resync().await {
            warn!(ha_id = %self.info.ha_id, error = %e, "Could not resynchronise appliance state");
        }
    }
}

impl DeviceModel for ApplianceModel {
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

    fn settings(&self) -> BoxFuture<'_, Result<Vec<SettingDescription>, CoreError>> {
        Box::pin(async move {
            let settings = self
                .settings
                .get_or_try_init(|| async {
                    let list = self.api.fetch_settings(&self.info.ha_id).await?;
                    for item in &list {
                        self.store(item.clone().into(), false);
                    }
                    Ok::<_, CoreError>(list.into_iter().map(SettingDescription::from).collect())
                })
                .await?;
            Ok(settings.clone())
        })
    }

    fn setting<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<SettingDescription, CoreError>> {
        Box::pin(async move {
            let detail = self.api.fetch_setting(&self.info.ha_id, key).await?;
            Ok(detail.into())
        })
    }

    fn set_setting<'a>(
        &'a self,
        key: &'a str,
        value: Value,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            debug!(ha_id = %self.info.ha_id, key, value = %value, "Writing setting");
            self.api.write_setting(&self.info.ha_id, key, value).await
        })
    }

    fn stop_program(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(async move {
            debug!(ha_id = %self.info.ha_id, "Stopping active program");
            self.api.stop_active_program(&self.info.ha_id).await
        })
    }
}
