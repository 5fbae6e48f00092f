//! `hcbridge events`: print the session envelopes of the event stream.

use futures_util::StreamExt;
use serde::Serialize;

use hcbridge_api::{
    DomainEvent, EventKind, EventStream, HomeConnectClient, SessionEnvelope, SseSource,
};
use hcbridge_core::BridgeConfig;

use crate::cli::{EventsArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Serializable view of one envelope.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EnvelopeRecord<'a> {
    Start,
    Event(&'a DomainEvent),
    Stop {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl<'a> From<&'a SessionEnvelope> for EnvelopeRecord<'a> {
    fn from(envelope: &'a SessionEnvelope) -> Self {
        match envelope {
            SessionEnvelope::Start => Self::Start,
            SessionEnvelope::Event(event) => Self::Event(event),
            SessionEnvelope::Stop { error } => Self::Stop {
                error: error.as_ref().map(ToString::to_string),
            },
        }
    }
}

pub async fn handle(
    client: &HomeConnectClient,
    config: &BridgeConfig,
    args: EventsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let mut stream =
        EventStream::new(SseSource::new(client.clone())).with_reconnect(config.reconnect.clone());
    if let Some(ha_id) = args.appliance {
        stream = stream.for_appliance(ha_id);
    }

    let envelopes = stream.start();
    tokio::pin!(envelopes);

    let mut seen = 0usize;
    loop {
        let envelope = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            envelope = envelopes.next() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let keep_alive = matches!(
            &envelope,
            SessionEnvelope::Event(e) if e.event == EventKind::KeepAlive
        );
        if keep_alive && args.no_keep_alive {
            continue;
        }

        let record = EnvelopeRecord::from(&envelope);
        let rendered = output::render_record(global.output, &record, |r| describe(r, color))?;
        output::print_output(&rendered, global.quiet);

        if matches!(envelope, SessionEnvelope::Event(_)) && !keep_alive {
            seen += 1;
            if args.count.is_some_and(|count| seen >= count) {
                break;
            }
        }
    }
    Ok(())
}

/// One-line text rendering of an envelope.
fn describe(record: &EnvelopeRecord<'_>, color: bool) -> String {
    match record {
        EnvelopeRecord::Start => output::dimmed("-- session started", color),
        EnvelopeRecord::Stop { error: None } => output::dimmed("-- session ended", color),
        EnvelopeRecord::Stop { error: Some(e) } => {
            output::warning(&format!("-- session failed: {e}"), color)
        }
        EnvelopeRecord::Event(event) => {
            let mut line = format!(
                "{} {}",
                output::label(event.event.as_str(), color),
                event.ha_id().unwrap_or("-")
            );
            for item in event.items() {
                line.push_str(&format!("\n  {} = {}", item.key, item.value));
            }
            line
        }
    }
}
