// ── API-to-domain type conversions ──
//
// Bridges raw `hcbridge_api` types into `hcbridge_core::model` types.
// Timestamps arrive as epoch seconds; a missing or out-of-range timestamp
// becomes the receive time.

use chrono::{DateTime, Utc};

use hcbridge_api::{Appliance, EventItem, SettingDetail, ValueItem};

use crate::model::{ApplianceInfo, ApplianceType, CachedItem, SettingDescription};

// ── Helpers ────────────────────────────────────────────────────────

/// Convert an optional epoch-seconds timestamp to `DateTime<Utc>`.
fn epoch_or_now(epoch: Option<i64>) -> DateTime<Utc> {
    epoch
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now)
}

// ── Appliance ──────────────────────────────────────────────────────

impl From<Appliance> for ApplianceInfo {
    fn from(a: Appliance) -> Self {
        let appliance_type = a
            .appliance_type
            .parse()
            .unwrap_or(ApplianceType::Other(a.appliance_type));
        Self {
            ha_id: a.ha_id,
            name: a.name,
            appliance_type,
            brand: a.brand,
            model: a.vib,
            connected: a.connected,
        }
    }
}

// ── Cached values ──────────────────────────────────────────────────

impl From<ValueItem> for CachedItem {
    fn from(v: ValueItem) -> Self {
        Self {
            key: v.key,
            value: v.value,
            unit: v.unit,
            timestamp: Utc::now(),
        }
    }
}

impl From<&EventItem> for CachedItem {
    fn from(e: &EventItem) -> Self {
        Self {
            key: e.key.clone(),
            value: e.value.clone(),
            unit: e.unit.clone(),
            timestamp: epoch_or_now(e.timestamp),
        }
    }
}

// ── Settings ───────────────────────────────────────────────────────

impl From<ValueItem> for SettingDescription {
    fn from(v: ValueItem) -> Self {
        Self {
            key: v.key,
            value: v.value,
            constraints: None,
        }
    }
}

impl From<SettingDetail> for SettingDescription {
    fn from(d: SettingDetail) -> Self {
        Self {
            key: d.key,
            value: d.value,
            constraints: d.constraints,
        }
    }
}
