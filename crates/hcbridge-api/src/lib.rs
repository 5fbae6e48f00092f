// hcbridge-api: Async Rust client for the Home Connect cloud (settings API + event stream)

pub mod client;
pub mod error;
pub mod events;
pub mod models;
pub mod transport;

pub use client::{DEFAULT_BASE_URL, HomeConnectClient};
pub use error::{Error, RequestContext};
pub use events::{
    DomainEvent, EventItem, EventKind, EventStream, FrameSource, RawFrame, ReconnectConfig,
    SessionEnvelope, SseSource, StreamState,
};
pub use models::{Appliance, SettingConstraints, SettingDetail, ValueItem};
pub use transport::{TlsMode, TransportConfig};
