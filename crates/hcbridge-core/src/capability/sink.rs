// ── Protocol sink contract ──
//
// The external accessory protocol is opaque to the bridge. Modules create
// services through a `ServiceFactory`, publish characteristic values on
// them, and register handlers for writes coming from the protocol side.
// Every outward change lands in one `ProtocolSink`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Vocabulary ───────────────────────────────────────────────────────

/// Kind of protocol surface a service presents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Switch,
    Lock,
    Battery,
    ProgrammableButton,
    Indicator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Characteristic {
    On,
    Active,
    InUse,
    StatusFault,
    RemainingDuration,
    BatteryLevel,
    ChargingState,
    StatusLowBattery,
    LockCurrentState,
    LockTargetState,
    ProgrammableSwitchEvent,
    RemoteStartAllowed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl CharValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for CharValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Identity of one service within the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    pub accessory: String,
    pub kind: ServiceKind,
    pub name: String,
    pub subtype: Option<String>,
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {:?}", self.accessory, self.kind, self.name)?;
        if let Some(subtype) = &self.subtype {
            write!(f, " [{subtype}]")?;
        }
        Ok(())
    }
}

/// One outward change.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkUpdate {
    pub service: ServiceId,
    pub characteristic: Characteristic,
    pub value: CharValue,
    /// One-shot notification (e.g. a button press) rather than state.
    pub notification: bool,
}

/// Receives every outward change.
pub trait ProtocolSink: Send + Sync {
    fn publish(&self, update: SinkUpdate);
}

// ── Service ──────────────────────────────────────────────────────────

pub type SetHandler =
    Arc<dyn Fn(CharValue) -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

/// A protocol service: a named bag of characteristics.
pub struct Service {
    id: ServiceId,
    sink: Arc<dyn ProtocolSink>,
    values: Mutex<HashMap<Characteristic, CharValue>>,
    handlers: Mutex<HashMap<Characteristic, SetHandler>>,
}

impl Service {
    pub fn new(id: ServiceId, sink: Arc<dyn ProtocolSink>) -> Self {
        Self {
            id,
            sink,
            values: Mutex::default(),
            handlers: Mutex::default(),
        }
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    /// Publish a state value. Returns `false` (and publishes nothing) if
    /// it equals the last published value.
    pub fn update(&self, characteristic: Characteristic, value: CharValue) -> bool {
        {
            let mut values = lock(&self.values);
            if values.get(&characteristic) == Some(&value) {
                return false;
            }
            values.insert(characteristic, value.clone());
        }
        self.sink.publish(SinkUpdate {
            service: self.id.clone(),
            characteristic,
            value,
            notification: false,
        });
        true
    }

    /// Publish a one-shot notification. Never deduplicated.
    pub fn notify(&self, characteristic: Characteristic, value: CharValue) {
        self.sink.publish(SinkUpdate {
            service: self.id.clone(),
            characteristic,
            value,
            notification: true,
        });
    }

    /// Last published state value.
    pub fn value(&self, characteristic: Characteristic) -> Option<CharValue> {
        lock(&self.values).get(&characteristic).cloned()
    }

    /// Published state values, sorted by characteristic name.
    pub fn values(&self) -> Vec<(Characteristic, CharValue)> {
        let mut values: Vec<_> = lock(&self.values)
            .iter()
            .map(|(c, v)| (*c, v.clone()))
            .collect();
        values.sort_by_key(|(c, _)| c.to_string());
        values
    }

    /// Handle protocol-side writes to `characteristic`.
    pub fn on_set<F>(&self, characteristic: Characteristic, handler: F)
    where
        F: Fn(CharValue) -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync + 'static,
    {
        lock(&self.handlers).insert(characteristic, Arc::new(handler));
    }

    pub fn is_writable(&self, characteristic: Characteristic) -> bool {
        lock(&self.handlers).contains_key(&characteristic)
    }

    /// A write arriving from the protocol side.
    pub async fn set(&self, characteristic: Characteristic, value: CharValue) -> Result<(), CoreError> {
        let handler = lock(&self.handlers).get(&characteristic).cloned();
        let Some(handler) = handler else {
            return Err(CoreError::Unsupported {
                operation: format!("write {characteristic} on {}", self.id),
                reason: "characteristic is read-only".into(),
            });
        };
        tracing::debug!(service = %self.id, %characteristic, %value, "Protocol write");
        handler(value).await
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("values", &self.values())
            .finish_non_exhaustive()
    }
}

// ── ServiceFactory ───────────────────────────────────────────────────

/// Creates services on one accessory.
pub trait ServiceFactory: Send + Sync {
    /// Create (or return the existing) service with this identity.
    fn create(&self, kind: ServiceKind, name: &str, subtype: Option<&str>) -> Arc<Service>;

    /// Every service created so far, in creation order.
    fn services(&self) -> Vec<Arc<Service>>;
}

/// The standard factory: services of one accessory, all publishing into
/// one sink.
pub struct AccessoryServices {
    accessory: String,
    sink: Arc<dyn ProtocolSink>,
    services: Mutex<Vec<Arc<Service>>>,
}

impl AccessoryServices {
    pub fn new(accessory: impl Into<String>, sink: Arc<dyn ProtocolSink>) -> Self {
        Self {
            accessory: accessory.into(),
            sink,
            services: Mutex::default(),
        }
    }
}

impl ServiceFactory for AccessoryServices {
    fn create(&self, kind: ServiceKind, name: &str, subtype: Option<&str>) -> Arc<Service> {
        let id = ServiceId {
            accessory: self.accessory.clone(),
            kind,
            name: name.to_owned(),
            subtype: subtype.map(str::to_owned),
        };

        let mut services = lock(&self.services);
        if let Some(existing) = services.iter().find(|s| s.id == id) {
            return Arc::clone(existing);
        }

        tracing::debug!(service = %id, "Adding service");
        let service = Arc::new(Service::new(id, Arc::clone(&self.sink)));
        services.push(Arc::clone(&service));
        service
    }

    fn services(&self) -> Vec<Arc<Service>> {
        lock(&self.services).clone()
    }
}

// ── Sinks ────────────────────────────────────────────────────────────

/// Logs every update. Used when no protocol server is attached.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProtocolSink for LogSink {
    fn publish(&self, update: SinkUpdate) {
        if update.notification {
            tracing::info!(
                service = %update.service,
                characteristic = %update.characteristic,
                value = %update.value,
                "Notification"
            );
        } else {
            tracing::info!(
                service = %update.service,
                characteristic = %update.characteristic,
                value = %update.value,
                "Update"
            );
        }
    }
}

/// Keeps every update in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<SinkUpdate>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<SinkUpdate> {
        lock(&self.updates).clone()
    }

    pub fn notifications(&self) -> Vec<SinkUpdate> {
        self.updates().into_iter().filter(|u| u.notification).collect()
    }

    /// Values published for one characteristic of the named service.
    pub fn values_of(&self, name: &str, characteristic: Characteristic) -> Vec<CharValue> {
        self.updates()
            .into_iter()
            .filter(|u| u.service.name == name && u.characteristic == characteristic)
            .map(|u| u.value)
            .collect()
    }
}

impl ProtocolSink for RecordingSink {
    fn publish(&self, update: SinkUpdate) {
        lock(&self.updates).push(update);
    }
}
