// hcbridge-core: appliance models, write serialisation and accessory
// composition between hcbridge-api and a protocol sink.

pub mod bridge;
pub mod capability;
pub mod config;
pub mod convert;
pub mod device;
pub mod error;
pub mod model;
pub mod serializer;

#[cfg(test)]
mod test_support;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, ConnectionState};
pub use config::{ApplianceOptions, BridgeConfig, TlsVerification};
pub use device::{ApplianceApi, ApplianceModel, DeviceModel};
pub use error::CoreError;
pub use serializer::{Merge, Mode, UpdateSerializer};

pub use capability::{
    Accessory, CapabilityDescriptor, CapabilityModule, CharValue, Characteristic,
    CompositionHost, FeaturePolicy, FeatureRule, LogSink, ModuleContext, ModuleDescriptor,
    ProtocolSink, RecordingSink, Service, ServiceFactory, ServiceKind, SinkUpdate,
};
pub use model::{ApplianceInfo, ApplianceType, CachedItem, DeviceEvent, SettingDescription};
