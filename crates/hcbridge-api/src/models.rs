// Wire types for the request/response API.
//
// Successful responses are wrapped as `{ "data": { ... } }`, failures as
// `{ "error": { "key": ..., "description": ... } }`.

use serde::{Deserialize, Serialize};

/// Success envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

/// Failure envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub key: Option<String>,
    pub description: Option<String>,
}

/// An appliance paired with the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appliance {
    #[serde(rename = "haId")]
    pub ha_id: String,
    pub name: String,
    /// Appliance family, e.g. `"Dishwasher"`, `"CoffeeMaker"`.
    #[serde(rename = "type")]
    pub appliance_type: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub vib: Option<String>,
    #[serde(default)]
    pub enumber: Option<String>,
    #[serde(default)]
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApplianceList {
    pub homeappliances: Vec<Appliance>,
}

/// One key/value pair from a status or settings listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueItem {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusList {
    pub status: Vec<ValueItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SettingsList {
    pub settings: Vec<ValueItem>,
}

/// Full description of a single setting, including its constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDetail {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, rename = "type")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub constraints: Option<SettingConstraints>,
}

/// Constraints on the values a setting accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingConstraints {
    #[serde(default, rename = "allowedvalues")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// `"read"` or `"readWrite"`.
    #[serde(default)]
    pub access: Option<String>,
}

impl SettingConstraints {
    pub fn is_writable(&self) -> bool {
        self.access.as_deref() != Some("read")
    }
}

/// Request body for `PUT .../settings/{key}`.
#[derive(Debug, Serialize)]
pub(crate) struct SettingWrite<'a> {
    pub data: SettingWriteData<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SettingWriteData<'a> {
    pub key: &'a str,
    pub value: &'a serde_json::Value,
}
