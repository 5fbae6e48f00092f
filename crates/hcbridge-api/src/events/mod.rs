//! Server-sent event stream: frames, typed events, session envelopes.
//!
//! The cloud pushes appliance changes over one long-lived SSE response.
//! [`EventStream`] turns that fragile connection into an endless sequence
//! of [`SessionEnvelope`]s: every connection attempt that succeeds yields
//! `Start`, then zero or more validated [`DomainEvent`]s, then exactly one
//! `Stop`. Then it reconnects.

mod reader;
pub mod schema;
mod sse;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, RequestContext};

pub use reader::{EventStream, FrameSession, FrameSource, ReconnectConfig, StreamState};
pub use sse::SseSource;

// ── RawFrame ─────────────────────────────────────────────────────────

/// A transport-level SSE record as received. `data` is opaque text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: Option<String>,
}

impl From<eventsource_stream::Event> for RawFrame {
    fn from(ev: eventsource_stream::Event) -> Self {
        let non_empty = |s: String| (!s.is_empty()).then_some(s);
        Self {
            id: non_empty(ev.id),
            event: non_empty(ev.event),
            data: non_empty(ev.data),
        }
    }
}

impl std::fmt::Display for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "id={:?} event={:?} data={:?}",
            self.id, self.event, self.data
        )
    }
}

// ── EventKind ────────────────────────────────────────────────────────

/// Event types the cloud sends on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "KEEP-ALIVE")]
    KeepAlive,
    #[serde(rename = "STATUS")]
    Status,
    #[serde(rename = "EVENT")]
    Event,
    #[serde(rename = "NOTIFY")]
    Notify,
    #[serde(rename = "CONNECTED")]
    Connected,
    #[serde(rename = "DISCONNECTED")]
    Disconnected,
    #[serde(rename = "PAIRED")]
    Paired,
    #[serde(rename = "DEPAIRED")]
    Depaired,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        Self::KeepAlive,
        Self::Status,
        Self::Event,
        Self::Notify,
        Self::Connected,
        Self::Disconnected,
        Self::Paired,
        Self::Depaired,
    ];

    /// Wire name, e.g. `"KEEP-ALIVE"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepAlive => "KEEP-ALIVE",
            Self::Status => "STATUS",
            Self::Event => "EVENT",
            Self::Notify => "NOTIFY",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Paired => "PAIRED",
            Self::Depaired => "DEPAIRED",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Kinds that must name the appliance they concern.
    pub fn requires_id(self) -> bool {
        !matches!(self, Self::KeepAlive)
    }

    /// Kinds that must carry a payload of items.
    pub fn requires_data(self) -> bool {
        matches!(self, Self::Status | Self::Event | Self::Notify)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── DomainEvent ──────────────────────────────────────────────────────

/// One key/value change reported by an appliance.
///
/// Undocumented fields are kept in `extra` so nothing the cloud sends is
/// silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventItem {
    pub key: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayvalue: Option<String>,
    #[serde(default, rename = "haId", skip_serializing_if = "Option::is_none")]
    pub ha_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Event payload: either a batch of items or a single bare item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Batch {
        items: Vec<EventItem>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Single(EventItem),
}

impl EventData {
    pub fn items(&self) -> &[EventItem] {
        match self {
            Self::Batch { items, .. } => items,
            Self::Single(item) => std::slice::from_ref(item),
        }
    }
}

/// A validated event from the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Appliance identifier (`haId`). Absent only on keep-alives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
}

impl DomainEvent {
    pub fn ha_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn items(&self) -> &[EventItem] {
        self.data.as_ref().map_or(&[], EventData::items)
    }

    /// Parse a raw frame into a validated event.
    ///
    /// Returns the event together with any loose-mode warnings (extra
    /// fields). Malformed JSON is a [`Error::StreamParse`], a structural
    /// mismatch an [`Error::Validation`].
    pub fn from_frame(
        frame: &RawFrame,
        context: &RequestContext,
    ) -> Result<(Self, Vec<schema::SchemaIssue>), Error> {
        let assembled = assemble(frame, context)?;
        schema::validate(assembled)
    }
}

/// Turn a frame into the JSON shape the schema validates.
fn assemble(frame: &RawFrame, context: &RequestContext) -> Result<Value, Error> {
    let data = match frame.data.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(text) => Some(serde_json::from_str::<Value>(text).map_err(|e| {
            Error::StreamParse {
                message: e.to_string(),
                frame: frame.clone(),
                context: context.clone(),
            }
        })?),
    };

    // The cloud omits the SSE `id` on some events and puts the appliance
    // identifier in the payload instead. SSE decoders carry the last `id`
    // forward to frames without one, so a payload `haId` always wins and a
    // keep-alive never inherits an identifier.
    let payload_id = data
        .as_ref()
        .and_then(|d| d.get("haId"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    let id = if frame.event.as_deref() == Some(EventKind::KeepAlive.as_str()) {
        None
    } else {
        payload_id.or_else(|| frame.id.clone())
    };

    let mut object = Map::new();
    if let Some(id) = id {
        object.insert("id".into(), Value::String(id));
    }
    if let Some(event) = &frame.event {
        object.insert("event".into(), Value::String(event.clone()));
    }
    if let Some(data) = data {
        object.insert("data".into(), data);
    }
    Ok(Value::Object(object))
}

// ── SessionEnvelope ──────────────────────────────────────────────────

/// What the stream reader yields: session boundaries and the events
/// between them.
#[derive(Debug, Clone)]
pub enum SessionEnvelope {
    Start,
    Event(DomainEvent),
    /// End of a session. `error` is `None` on a normal end of stream.
    Stop { error: Option<Arc<Error>> },
}

impl SessionEnvelope {
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RequestContext {
        RequestContext::new("https://api.example.com/api/homeappliances/events")
    }

    fn frame(id: Option<&str>, event: &str, data: Option<&str>) -> RawFrame {
        RawFrame {
            id: id.map(Into::into),
            event: Some(event.into()),
            data: data.map(Into::into),
        }
    }

    #[test]
    fn notify_without_id_recovers_ha_id_from_payload() {
        let data = r#"{"haId":"A1","key":"BSH.Common.Status.OperationState","value":"BSH.Common.EnumType.OperationState.Run"}"#;
        let (event, warnings) =
            DomainEvent::from_frame(&frame(None, "NOTIFY", Some(data)), &ctx()).unwrap();

        assert_eq!(event.ha_id(), Some("A1"));
        assert_eq!(event.event, EventKind::Notify);
        assert_eq!(event.items().len(), 1);
        assert_eq!(event.items()[0].key, "BSH.Common.Status.OperationState");
        assert!(warnings.is_empty());
    }

    #[test]
    fn payload_ha_id_wins_over_carried_id() {
        let data = r#"{"haId":"A1","key":"BSH.Common.Status.DoorState"}"#;
        let (event, _) =
            DomainEvent::from_frame(&frame(Some("B2"), "NOTIFY", Some(data)), &ctx()).unwrap();
        assert_eq!(event.ha_id(), Some("A1"));
    }

    #[test]
    fn frame_id_is_used_when_payload_has_none() {
        let data = r#"{"key":"BSH.Common.Status.DoorState","value":"BSH.Common.EnumType.DoorState.Open"}"#;
        let (event, _) =
            DomainEvent::from_frame(&frame(Some("B2"), "STATUS", Some(data)), &ctx()).unwrap();
        assert_eq!(event.ha_id(), Some("B2"));
    }

    #[test]
    fn keep_alive_drops_a_carried_id() {
        let (event, _) =
            DomainEvent::from_frame(&frame(Some("B2"), "KEEP-ALIVE", None), &ctx()).unwrap();
        assert!(event.id.is_none());
    }

    #[test]
    fn malformed_json_is_parse_error_with_frame() {
        let raw = frame(Some("A1"), "STATUS", Some("{not valid json"));
        let err = DomainEvent::from_frame(&raw, &ctx()).unwrap_err();
        match err {
            Error::StreamParse { frame, context, .. } => {
                assert_eq!(frame, raw);
                assert_eq!(context, ctx());
            }
            other => panic!("expected StreamParse, got {other:?}"),
        }
    }

    #[test]
    fn keep_alive_without_id_or_data_is_accepted() {
        let (event, _) =
            DomainEvent::from_frame(&frame(None, "KEEP-ALIVE", None), &ctx()).unwrap();
        assert_eq!(event.event, EventKind::KeepAlive);
        assert!(event.id.is_none());
        assert!(event.items().is_empty());
    }

    #[test]
    fn batch_payload_yields_every_item() {
        let data = json!({
            "items": [
                {"key": "BSH.Common.Status.DoorState", "value": "BSH.Common.EnumType.DoorState.Open", "timestamp": 1_700_000_000, "level": "hint", "handling": "none", "uri": "/api/x"},
                {"key": "BSH.Common.Option.RemainingProgramTime", "value": 3600, "unit": "seconds"}
            ]
        })
        .to_string();
        let (event, warnings) =
            DomainEvent::from_frame(&frame(Some("A1"), "STATUS", Some(&data)), &ctx()).unwrap();
        assert_eq!(event.items().len(), 2);
        assert_eq!(event.items()[1].value, json!(3600));
        assert!(warnings.is_empty());
    }

    #[test]
    fn raw_frame_from_eventsource_drops_empty_fields() {
        let ev = eventsource_stream::Event {
            event: "KEEP-ALIVE".into(),
            data: String::new(),
            id: String::new(),
            retry: None,
        };
        let frame = RawFrame::from(ev);
        assert_eq!(frame.event.as_deref(), Some("KEEP-ALIVE"));
        assert!(frame.id.is_none());
        assert!(frame.data.is_none());
    }

    #[test]
    fn event_kind_wire_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_wire("BOGUS"), None);
    }
}
