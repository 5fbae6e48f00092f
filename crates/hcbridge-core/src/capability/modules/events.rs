use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::capability::{
    Capability, CapabilityModule, CharValue, Characteristic, ModuleContext, ModuleDescriptor,
    Service, ServiceKind,
};
use crate::error::CoreError;
use crate::model::keys::{EVENT_CONFIRMED, EVENT_OFF, EVENT_PRESENT};
use crate::model::{CachedItem, DeviceEvent, enum_suffix};

/// Single press on a programmable button.
pub const SINGLE_PRESS: i64 = 0;

/// Discrete appliance events exposed as programmable buttons. A button
/// fires when its event becomes `Present`.
pub struct EventsModule {
    events: Vec<(&'static str, &'static str)>,
}

impl EventsModule {
    /// `events` pairs an event key with its button name.
    pub fn new(events: Vec<(&'static str, &'static str)>) -> Self {
        Self { events }
    }
}

fn handle(service: &Service, item: &CachedItem) {
    let state = item.as_str().map_or("", enum_suffix);
    match state {
        EVENT_PRESENT => {
            info!(event = %item.key, "Appliance event");
            service.notify(
                Characteristic::ProgrammableSwitchEvent,
                CharValue::Int(SINGLE_PRESS),
            );
        }
        EVENT_CONFIRMED | EVENT_OFF => {
            info!(event = %item.key, state, "Appliance event cleared");
        }
        _ => warn!(event = %item.key, value = %item.value, "Unexpected event state"),
    }
}

impl CapabilityModule for EventsModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("events").provides(Capability::Events)
    }

    fn attach(&mut self, ctx: &ModuleContext) -> Result<(), CoreError> {
        let buttons: HashMap<String, Arc<Service>> = self
            .events
            .iter()
            .filter_map(|(key, name)| {
                ctx.optional_service(
                    ServiceKind::ProgrammableButton,
                    name,
                    Some(*key),
                    Some("events"),
                )
                .map(|service| ((*key).to_owned(), service))
            })
            .collect();
        if buttons.is_empty() {
            return Ok(());
        }
        debug!(buttons = buttons.len(), "Event buttons attached");
        if let Some(first) = self.events.iter().find_map(|(key, _)| buttons.get(*key)) {
            ctx.provide(Capability::Events, Arc::clone(first));
        }

        let mut rx = ctx.device.subscribe();
        ctx.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(DeviceEvent::Item(item)) => {
                        if let Some(service) = buttons.get(&item.key) {
                            handle(service, &item);
                        }
                    }
                    Ok(DeviceEvent::Connected(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed lagged; appliance events may be lost");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::capability::{CompositionHost, FeaturePolicy};
    use crate::test_support::{FakeDevice, compose, settle};

    const FINISHED: &str = "BSH.Common.Event.ProgramFinished";
    const ABORTED: &str = "BSH.Common.Event.ProgramAborted";

    fn host() -> CompositionHost {
        CompositionHost::new().with(EventsModule::new(vec![
            (FINISHED, "Program Finished"),
            (ABORTED, "Program Aborted"),
        ]))
    }

    #[tokio::test]
    async fn present_fires_confirmed_does_not() {
        let device = Arc::new(FakeDevice::new("Dishwasher"));
        let (accessory, sink) = compose(host(), &device, FeaturePolicy::allow_all());
        accessory.ready().await;

        device.set(FINISHED, json!("BSH.Common.EnumType.EventPresentState.Present"));
        device.set(FINISHED, json!("BSH.Common.EnumType.EventPresentState.Confirmed"));
        device.set(FINISHED, json!("BSH.Common.EnumType.EventPresentState.Present"));
        settle().await;

        let notifications = sink.notifications();
        assert_eq!(notifications.len(), 2);
        assert!(notifications.iter().all(|n| n.service.name == "Program Finished"
            && n.value == CharValue::Int(SINGLE_PRESS)));
    }

    #[tokio::test]
    async fn confirmed_alone_never_fires() {
        let device = Arc::new(FakeDevice::new("Dishwasher"));
        let (accessory, sink) = compose(host(), &device, FeaturePolicy::allow_all());
        accessory.ready().await;

        device.set(ABORTED, json!("BSH.Common.EnumType.EventPresentState.Confirmed"));
        device.set(ABORTED, json!("BSH.Common.EnumType.EventPresentState.Off"));
        settle().await;

        assert!(sink.notifications().is_empty());
    }

    #[tokio::test]
    async fn unknown_state_never_fires() {
        let device = Arc::new(FakeDevice::new("Dishwasher"));
        let (accessory, sink) = compose(host(), &device, FeaturePolicy::allow_all());
        accessory.ready().await;

        device.set(FINISHED, json!("BSH.Common.EnumType.EventPresentState.Sparkling"));
        device.set(ABORTED, json!(42));
        settle().await;

        assert!(sink.notifications().is_empty());
    }

    #[tokio::test]
    async fn other_keys_are_ignored() {
        let device = Arc::new(FakeDevice::new("Dishwasher"));
        let (accessory, sink) = compose(host(), &device, FeaturePolicy::allow_all());
        accessory.ready().await;

        device.set(
            "BSH.Common.Event.SomethingElse",
            json!("BSH.Common.EnumType.EventPresentState.Present"),
        );
        settle().await;

        assert!(sink.notifications().is_empty());
        assert_eq!(accessory.services().len(), 2);
    }

    #[tokio::test]
    async fn group_disabled() {
        let device = Arc::new(FakeDevice::new("Dishwasher"));
        let policy = FeaturePolicy::default().with_group("events", false);
        let (accessory, _sink) = compose(host(), &device, policy);
        accessory.ready().await;
        assert!(accessory.services().is_empty());
    }
}
