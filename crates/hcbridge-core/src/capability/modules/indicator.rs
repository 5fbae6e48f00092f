use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::capability::{
    Capability, CapabilityModule, CharValue, Characteristic, ModuleContext, ModuleDescriptor,
    ServiceKind, keys,
};
use crate::device::DeviceModel;
use crate::error::CoreError;
use crate::model::keys::{
    BATTERY_CHARGING_STATE, BATTERY_LEVEL, REMOTE_CONTROL_ACTIVE, REMOTE_CONTROL_START_ALLOWED,
};

/// Battery level below which `StatusLowBattery` is raised.
pub const LOW_BATTERY_PERCENT: i64 = 20;

type Derive = fn(&dyn DeviceModel) -> Vec<(Characteristic, CharValue)>;

/// Read-only service whose characteristics are derived from status keys.
///
/// Attached once the appliance has reported the presence key. Appliances
/// that were offline at startup get it on their first report.
#[derive(Clone, Copy)]
pub struct IndicatorModule {
    capability: Capability,
    kind: ServiceKind,
    name: &'static str,
    group: Option<&'static str>,
    presence: &'static str,
    keys: &'static [&'static str],
    derive: Derive,
    deferred: bool,
}

impl IndicatorModule {
    pub fn battery() -> Self {
        Self {
            capability: Capability::Battery,
            kind: ServiceKind::Battery,
            name: "Battery",
            group: None,
            presence: BATTERY_LEVEL,
            keys: &[BATTERY_LEVEL, BATTERY_CHARGING_STATE],
            derive: battery,
            deferred: false,
        }
    }

    pub fn remote_control() -> Self {
        Self {
            capability: Capability::RemoteControl,
            kind: ServiceKind::Indicator,
            name: "Remote Control",
            group: Some("indicators"),
            presence: REMOTE_CONTROL_ACTIVE,
            keys: &[REMOTE_CONTROL_ACTIVE, REMOTE_CONTROL_START_ALLOWED],
            derive: remote_control,
            deferred: false,
        }
    }
}

fn battery(device: &dyn DeviceModel) -> Vec<(Characteristic, CharValue)> {
    let level = device
        .item(BATTERY_LEVEL)
        .and_then(|item| item.as_i64())
        .unwrap_or(0)
        .clamp(0, 100);
    let charging = device
        .item(BATTERY_CHARGING_STATE)
        .is_some_and(|item| item.is_enum("Charging"));

    vec![
        (Characteristic::BatteryLevel, CharValue::Int(level)),
        (Characteristic::ChargingState, CharValue::Bool(charging)),
        (
            Characteristic::StatusLowBattery,
            CharValue::Bool(level < LOW_BATTERY_PERCENT),
        ),
    ]
}

fn remote_control(device: &dyn DeviceModel) -> Vec<(Characteristic, CharValue)> {
    let flag = |key| {
        device.is_connected() && device.item(key).is_some_and(|item| item.as_bool() == Some(true))
    };

    vec![
        (Characteristic::Active, CharValue::Bool(flag(REMOTE_CONTROL_ACTIVE))),
        (
            Characteristic::RemoteStartAllowed,
            CharValue::Bool(flag(REMOTE_CONTROL_START_ALLOWED)),
        ),
        (
            Characteristic::StatusFault,
            CharValue::Bool(!device.is_connected()),
        ),
    ]
}

impl CapabilityModule for IndicatorModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new(self.capability.to_string()).provides(self.capability)
    }

    fn attach(&mut self, ctx: &ModuleContext) -> Result<(), CoreError> {
        if !ctx.allows(self.kind, self.name, self.group) {
            return Ok(());
        }
        if ctx.device.item(self.presence).is_none() {
            tracing::debug!(key = self.presence, "Not reported yet; indicator deferred");
            self.deferred = true;
            return Ok(());
        }
        self.wire(ctx);
        Ok(())
    }

    fn initialize(
        self: Box<Self>,
        ctx: Arc<ModuleContext>,
    ) -> BoxFuture<'static, Result<(), CoreError>> {
        if self.deferred {
            let module = *self;
            ctx.when_reported(module.presence, move |ctx| module.wire(ctx));
        }
        Box::pin(async { Ok(()) })
    }
}

impl IndicatorModule {
    fn wire(&self, ctx: &ModuleContext) {
        let service = ctx.factory.create(self.kind, self.name, None);
        ctx.provide(self.capability, Arc::clone(&service));

        let derive = self.derive;
        ctx.watch_status(keys(self.keys), move |device| {
            for (characteristic, value) in derive(device) {
                service.update(characteristic, value);
            }
        });
    }
}
