// ── Device Model port ──
//
// Capability modules see an appliance only through `DeviceModel`: cached
// values, a change feed, and the two remote writes they are allowed to
// make. `ApplianceModel` is the production implementation; tests use
// their own.

mod appliance;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use hcbridge_api::{HomeConnectClient, SettingDetail, ValueItem};

use crate::error::CoreError;
use crate::model::{ApplianceInfo, CachedItem, DeviceEvent, SettingDescription};

pub use appliance::ApplianceModel;

/// Read access to one appliance's cached state plus its remote writes.
///
/// Object safe: modules hold an `Arc<dyn DeviceModel>`.
pub trait DeviceModel: Send + Sync {
    fn info(&self) -> &ApplianceInfo;

    /// Last known value of `key`.
    fn item(&self, key: &str) -> Option<Arc<CachedItem>>;

    fn is_connected(&self) -> bool;

    /// Observe connectivity. The current value is visible immediately.
    fn connectivity(&self) -> watch::Receiver<bool>;

    /// Per-key change events and connectivity changes.
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;

    /// Settings the appliance supports.
    fn settings(&self) -> BoxFuture<'_, Result<Vec<SettingDescription>, CoreError>>;

    /// One setting with its constraints.
    fn setting<'a>(&'a self, key: &'a str)
    -> BoxFuture<'a, Result<SettingDescription, CoreError>>;

    fn set_setting<'a>(&'a self, key: &'a str, value: Value)
    -> BoxFuture<'a, Result<(), CoreError>>;

    /// Stop the program that is currently running.
    fn stop_program(&self) -> BoxFuture<'_, Result<(), CoreError>>;
}

// ── ApplianceApi ────────────────────────────────────────────────────

/// The slice of the cloud API an `ApplianceModel` needs.
pub trait ApplianceApi: Send + Sync {
    fn fetch_status<'a>(&'a self, ha_id: &'a str)
    -> BoxFuture<'a, Result<Vec<ValueItem>, CoreError>>;

    fn fetch_settings<'a>(&'a self, ha_id: &'a str)
    -> BoxFuture<'a, Result<Vec<ValueItem>, CoreError>>;

    fn fetch_setting<'a>(
        &'a self,
        ha_id: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<SettingDetail, CoreError>>;

    fn write_setting<'a>(
        &'a self,
        ha_id: &'a str,
        key: &'a str,
        value: Value,
    ) -> BoxFuture<'a, Result<(), CoreError>>;

    fn stop_active_program<'a>(&'a self, ha_id: &'a str) -> BoxFuture<'a, Result<(), CoreError>>;
}

impl ApplianceApi for HomeConnectClient {
    fn fetch_status<'a>(
        &'a self,
        ha_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ValueItem>, CoreError>> {
        Box::pin(async move { Ok(self.status(ha_id).await?) })
    }

    fn fetch_settings<'a>(
        &'a self,
        ha_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ValueItem>, CoreError>> {
        Box::pin(async move { Ok(self.settings(ha_id).await?) })
    }

    fn fetch_setting<'a>(
        &'a self,
        ha_id: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<SettingDetail, CoreError>> {
        Box::pin(async move { Ok(self.setting(ha_id, key).await?) })
    }

    fn write_setting<'a>(
        &'a self,
        ha_id: &'a str,
        key: &'a str,
        value: Value,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move { Ok(self.set_setting(ha_id, key, &value).await?) })
    }

    fn stop_active_program<'a>(&'a self, ha_id: &'a str) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move { Ok(self.stop_program(ha_id).await?) })
    }
}
