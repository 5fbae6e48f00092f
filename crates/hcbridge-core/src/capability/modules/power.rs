use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use crate::capability::{
    Capability, CapabilityModule, CharValue, Characteristic, ModuleContext, ModuleDescriptor,
    Service, ServiceKind, keys,
};
use crate::error::CoreError;
use crate::model::keys::{POWER_OFF, POWER_ON, POWER_STATE};
use crate::serializer::UpdateSerializer;

/// Power switch backed by `BSH.Common.Setting.PowerState`.
#[derive(Default)]
pub struct PowerModule {
    service: Option<Arc<Service>>,
}

impl PowerModule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CapabilityModule for PowerModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("power").provides(Capability::PowerSwitch)
    }

    fn attach(&mut self, ctx: &ModuleContext) -> Result<(), CoreError> {
        let Some(service) = ctx.optional_service(ServiceKind::Switch, "Power", None, None) else {
            return Ok(());
        };
        ctx.provide(Capability::PowerSwitch, Arc::clone(&service));

        let on = Arc::clone(&service);
        ctx.watch_status(keys(&[POWER_STATE]), move |device| {
            if let Some(item) = device.item(POWER_STATE) {
                on.update(Characteristic::On, CharValue::Bool(item.is_enum("On")));
            }
        });

        self.service = Some(service);
        Ok(())
    }

    fn initialize(
        self: Box<Self>,
        ctx: Arc<ModuleContext>,
    ) -> BoxFuture<'static, Result<(), CoreError>> {
        let Some(service) = self.service else {
            return Box::pin(async { Ok(()) });
        };
        ctx.when_connected("power", make_writable(service, Arc::clone(&ctx)))
    }
}

/// Accept writes if the appliance lists the power state as a setting.
async fn make_writable(service: Arc<Service>, ctx: Arc<ModuleContext>) -> Result<(), CoreError> {
    let settings = ctx.device.settings().await?;
    if !settings.iter().any(|s| s.key == POWER_STATE) {
        debug!("Power state is not a setting; switch is read-only");
        return Ok(());
    }

    // Some families only support standby.
    let off = match ctx.device.setting(POWER_STATE).await {
        Ok(detail) => detail
            .allowed_value("Off")
            .or_else(|| detail.allowed_value("Standby"))
            .unwrap_or(POWER_OFF)
            .to_owned(),
        Err(e) => {
            debug!(error = %e, "Power state constraints unavailable");
            POWER_OFF.to_owned()
        }
    };
    debug!(off = %off, "Power switch writable");

    let device = Arc::clone(&ctx.device);
    let serializer = Arc::new(UpdateSerializer::level(
        format!("{} power", ctx.name()),
        false,
        ctx.verbose,
        move |on: bool| {
            let device = Arc::clone(&device);
            let value = if on { POWER_ON.to_owned() } else { off.clone() };
            async move { device.set_setting(POWER_STATE, json!(value)).await }
        },
    ));

    service.on_set(Characteristic::On, move |value| -> BoxFuture<'static, _> {
        let Some(on) = value.as_bool() else {
            return Box::pin(async move {
                Err(CoreError::Internal(format!("power switch expects a boolean, got {value}")))
            });
        };
        Box::pin(serializer.trigger(Some(on)))
    });
    Ok(())
}
