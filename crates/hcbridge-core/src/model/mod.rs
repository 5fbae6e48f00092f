// ── Domain model ──
//
// The appliance as the rest of the bridge sees it: identity, the cached
// key/value state, descriptions of its settings, and the change events a
// Device Model publishes. Wire types from `hcbridge_api` are converted in
// `crate::convert`.

pub mod keys;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hcbridge_api::SettingConstraints;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

// ── ApplianceType ───────────────────────────────────────────────────

/// Appliance family, as reported in the appliance list (`type`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, EnumString)]
pub enum ApplianceType {
    CleaningRobot,
    CoffeeMaker,
    CookProcessor,
    Dishwasher,
    Dryer,
    Freezer,
    FridgeFreezer,
    Hob,
    Hood,
    Oven,
    Refrigerator,
    WarmingDrawer,
    Washer,
    WasherDryer,
    WineCooler,
    #[strum(default)]
    Other(String),
}

// ── ApplianceInfo ───────────────────────────────────────────────────

/// Identity of one appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplianceInfo {
    /// Cloud identifier (`haId`).
    pub ha_id: String,
    /// Display name: the configured override, else the cloud's name.
    pub name: String,
    pub appliance_type: ApplianceType,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub connected: bool,
}

// ── CachedItem ──────────────────────────────────────────────────────

/// Last known value of one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedItem {
    pub key: String,
    pub value: Value,
    pub unit: Option<String>,
    /// When the cloud reported the value (or when we received it, if the
    /// cloud did not say).
    pub timestamp: DateTime<Utc>,
}

impl CachedItem {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub fn as_i64(&self) -> Option<i64> {
        self.value
            .as_i64()
            .or_else(|| self.value.as_f64().map(|f| f.round() as i64))
    }

    /// True if the value is an enumeration constant ending in `.{suffix}`,
    /// e.g. `is_enum("Run")` for `BSH.Common.EnumType.OperationState.Run`.
    pub fn is_enum(&self, suffix: &str) -> bool {
        self.as_str().is_some_and(|s| enum_suffix(s) == suffix)
    }
}

/// Last dotted component of an enumeration constant.
pub fn enum_suffix(value: &str) -> &str {
    value.rsplit('.').next().unwrap_or(value)
}

// ── SettingDescription ──────────────────────────────────────────────

/// A setting the appliance supports.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingDescription {
    pub key: String,
    pub value: Value,
    pub constraints: Option<SettingConstraints>,
}

impl SettingDescription {
    /// Pick the allowed enumeration value ending in `.{suffix}`.
    pub fn allowed_value(&self, suffix: &str) -> Option<&str> {
        self.constraints
            .as_ref()?
            .allowed_values
            .as_ref()?
            .iter()
            .map(String::as_str)
            .find(|v| enum_suffix(v) == suffix)
    }

    pub fn is_writable(&self) -> bool {
        self.constraints
            .as_ref()
            .is_none_or(SettingConstraints::is_writable)
    }
}

// ── DeviceEvent ─────────────────────────────────────────────────────

/// Change notification published by a Device Model.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The cached value of `item.key` changed, or a discrete event fired.
    Item(Arc<CachedItem>),
    /// Connectivity between the cloud and the appliance changed.
    Connected(bool),
}

impl DeviceEvent {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Item(item) => Some(&item.key),
            Self::Connected(_) => None,
        }
    }
}
